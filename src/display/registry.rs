//! Display registry
//!
//! Probes configured displays and hands them to the display manager.
//! Without the `hdmi` feature nothing is registered and the display count
//! is always 0.

use log::{info, warn};
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::Arc;

use super::{HdmiDisplay, HotplugEvent};
use crate::config::{Config, DisplayEntry, HpdConfig};
use crate::error::{HdmiError, Result};
use crate::hw::ControllerProvider;

pub struct DisplayRegistry {
    provider: Arc<dyn ControllerProvider>,
    hpd: HpdConfig,
    debug_dir: Option<PathBuf>,
    events: Option<Sender<HotplugEvent>>,
    displays: Vec<Arc<HdmiDisplay>>,
}

impl DisplayRegistry {
    pub fn new(provider: Arc<dyn ControllerProvider>, hpd: HpdConfig) -> Self {
        Self {
            provider,
            hpd,
            debug_dir: None,
            events: None,
            displays: Vec::new(),
        }
    }

    /// Write per-display debug files under `dir`
    pub fn with_debug_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.debug_dir = dir;
        self
    }

    /// Deliver hot-plug events of displays probed from now on to `tx`
    pub fn with_events(mut self, tx: Sender<HotplugEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Build a registry and probe every configured display
    ///
    /// A display that fails to probe is skipped with a warning.
    pub fn from_config(config: &Config, provider: Arc<dyn ControllerProvider>) -> Self {
        let mut registry = Self::new(provider, config.hpd.clone()).with_debug_dir(config.debug_dir());
        registry.probe_all(&config.displays);
        registry
    }

    /// Probe a list of entries, skipping failures
    pub fn probe_all(&mut self, entries: &[DisplayEntry]) {
        for entry in entries {
            if let Err(e) = self.probe(entry) {
                warn!("Failed to probe display {}: {}", entry.name, e);
            }
        }
    }

    /// Create and register a display
    ///
    /// Returns `Ok(None)` when HDMI support is compiled out.
    pub fn probe(&mut self, entry: &DisplayEntry) -> Result<Option<Arc<HdmiDisplay>>> {
        if !cfg!(feature = "hdmi") {
            info!("HDMI support disabled, ignoring display {}", entry.name);
            return Ok(None);
        }
        if self.find(&entry.name).is_some() {
            return Err(HdmiError::InvalidArgument(format!(
                "duplicate display name {}",
                entry.name
            )));
        }

        let display = Arc::new(HdmiDisplay::new(
            entry,
            &self.hpd,
            Arc::clone(&self.provider),
            self.events.clone(),
            self.debug_dir.clone(),
        )?);
        info!(
            "Probed HDMI display {} ({}, controller {}{})",
            entry.name,
            entry.display_type.as_str(),
            entry.controller,
            if entry.non_pluggable { ", non-pluggable" } else { "" }
        );
        self.displays.push(Arc::clone(&display));
        Ok(Some(display))
    }

    /// Unregister a display, tearing down whatever is still initialized
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let idx = self
            .displays
            .iter()
            .position(|d| d.name() == name)
            .ok_or_else(|| HdmiError::InvalidArgument(format!("unknown display {}", name)))?;
        let display = self.displays.remove(idx);

        if display.is_drm_initialized() {
            if let Err(e) = display.drm_deinit() {
                warn!("{}: drm_deinit failed: {}", name, e);
            }
        }
        if display.is_dev_initialized() {
            if let Err(e) = display.dev_deinit() {
                warn!("{}: dev_deinit failed: {}", name, e);
            }
        }
        info!("Removed HDMI display {}", name);
        Ok(())
    }

    /// Number of registered displays
    pub fn num_of_displays(&self) -> u32 {
        self.displays.len() as u32
    }

    /// Up to `max_display_count` displays, in probe order
    pub fn displays(&self, max_display_count: u32) -> Vec<Arc<HdmiDisplay>> {
        self.displays
            .iter()
            .take(max_display_count as usize)
            .cloned()
            .collect()
    }

    pub fn find(&self, name: &str) -> Option<Arc<HdmiDisplay>> {
        self.displays.iter().find(|d| d.name() == name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<HdmiDisplay>> {
        self.displays.iter()
    }

    /// Forward a hot-plug interrupt to every display
    pub fn hpd_irq_all(&self) {
        for display in &self.displays {
            display.hpd_irq();
        }
    }
}
