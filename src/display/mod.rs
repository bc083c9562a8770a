//! HDMI display
//!
//! One configured HDMI output bound to a controller/PHY. All mutable
//! state lives behind `display_lock`; connector callbacks and the HPD
//! worker both take it.
//!
//! Lifecycle:
//!
//! ```text
//! probe -> dev_init -> drm_init(encoder) -> connector_post_init
//!       -> detect / get_modes / mode_valid / get_info (+ HPD events)
//!       -> connector_pre_deinit -> drm_deinit -> dev_deinit -> remove
//! ```

pub mod connector;
pub mod debugfs;
pub mod hpd;
pub mod registry;
pub mod stub;

use bitflags::bitflags;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::{DisplayEntry, DisplayType, HpdConfig};
use crate::constants::{MAX_HEIGHT, MAX_WIDTH};
use crate::edid::Edid;
use crate::error::{HdmiError, Result};
use crate::hw::{ControllerProvider, HdmiController};
use crate::mode::{DisplayMode, ModeStatus};

pub use connector::{Connector, ConnectorStatus, PollFlags};
pub use hpd::{HotplugEvent, HpdDebouncer};
pub use registry::DisplayRegistry;
pub use stub::DisabledDisplay;

/// DRM encoder object id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncoderId(pub u32);

/// DRM connector object id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConnectorId(pub u32);

/// Static properties of the HDMI display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HdmiInfo {
    pub display_type: DisplayType,
    /// Can the panel be hot plugged
    pub is_hot_pluggable: bool,
    pub is_connected: bool,
    /// Does the panel support reading EDID
    pub is_edid_supported: bool,
    /// Physical size in millimeters
    pub width_mm: u32,
    pub height_mm: u32,
}

/// Controller/PHY binding
pub struct HdmiCtrl {
    /// Acquired controller, None until dev_init
    pub ctrl: Option<Box<dyn HdmiController>>,
    /// Controller reference from the configuration
    pub ctrl_ref: u32,
    /// Controller instance id
    pub hdmi_ctrl_idx: u32,
}

/// Interface type reported to the display manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterfaceType {
    #[default]
    HdmiA,
}

bitflags! {
    /// Display capabilities
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DisplayCaps: u32 {
        const VIDEO_MODE = 1 << 0;
        const HOT_PLUG = 1 << 1;
        const EDID = 1 << 2;
    }
}

/// Display properties handed to the display manager
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DisplayInfo {
    pub intf_type: InterfaceType,
    pub num_of_h_tiles: u32,
    pub h_tile_instance: Vec<u32>,
    pub is_connected: bool,
    pub is_hot_pluggable: bool,
    pub is_edid_supported: bool,
    pub width_mm: u32,
    pub height_mm: u32,
    pub max_width: u16,
    pub max_height: u16,
    pub capabilities: DisplayCaps,
}

/// Display lifecycle and connector callbacks
///
/// Implemented by [`HdmiDisplay`] and by [`DisabledDisplay`], the fallback
/// used when HDMI support is compiled out.
pub trait DisplayOps {
    fn dev_init(&self) -> Result<()>;
    fn dev_deinit(&self) -> Result<()>;
    fn drm_init(&self, encoder: EncoderId) -> Result<()>;
    fn drm_deinit(&self) -> Result<()>;
    fn get_info(&self) -> Result<DisplayInfo>;
    fn connector_post_init(&self, connector: &mut Connector, info: &DisplayInfo) -> Result<()>;
    fn connector_pre_deinit(&self, connector: &mut Connector) -> Result<()>;
    fn connector_detect(&self, connector: &mut Connector, force: bool) -> ConnectorStatus;
    fn connector_get_modes(&self, connector: &mut Connector) -> usize;
    fn mode_valid(&self, connector: &Connector, mode: &DisplayMode) -> ModeStatus;
}

/// dev_init, drm_init and connector post_init for one display
///
/// A failing step undoes the steps before it.
pub fn attach(
    ops: &dyn DisplayOps,
    connector_id: ConnectorId,
    encoder: EncoderId,
) -> Result<Connector> {
    ops.dev_init()?;
    if let Err(e) = ops.drm_init(encoder) {
        if let Err(undo) = ops.dev_deinit() {
            warn!("dev_deinit after failed drm_init: {}", undo);
        }
        return Err(e);
    }

    let bound = ops.get_info().and_then(|info| {
        let mut connector = Connector::new(connector_id);
        ops.connector_post_init(&mut connector, &info)?;
        Ok(connector)
    });
    if bound.is_err() {
        if let Err(undo) = ops.drm_deinit() {
            warn!("drm_deinit after failed attach: {}", undo);
        }
        if let Err(undo) = ops.dev_deinit() {
            warn!("dev_deinit after failed attach: {}", undo);
        }
    }
    bound
}

/// Mutable display state, guarded by `display_lock`
pub(crate) struct DisplayState {
    pub info: HdmiInfo,
    pub ctrl: HdmiCtrl,
    /// Configured modes (non-pluggable panels)
    pub mode_list: Vec<DisplayMode>,
    pub connected: bool,
    pub is_tpg_enabled: bool,
    pub encoder: Option<EncoderId>,
    pub connector: Option<ConnectorId>,
    /// Sink EDID from the last successful get_modes
    pub edid: Option<Edid>,
    pub edid_override: Option<Vec<u8>>,
    /// Debug output directory
    pub root: Option<PathBuf>,
    /// Debounced HPD level, shared by the worker and forced detects
    pub hpd: HpdDebouncer,
    /// Physical size from configuration, 0 when the sink reports it
    pub configured_size_mm: (u32, u32),
}

impl DisplayState {
    /// Record a new connection state; returns true if it changed
    pub(crate) fn set_connected(&mut self, connected: bool) -> bool {
        let changed = self.connected != connected;
        self.connected = connected;
        self.info.is_connected = connected;
        if !connected {
            self.edid = None;
            (self.info.width_mm, self.info.height_mm) = self.configured_size_mm;
        }
        changed
    }
}

/// State shared between the display and its HPD worker
pub(crate) struct Shared {
    pub name: String,
    pub display_type: DisplayType,
    pub entry: DisplayEntry,
    display_lock: Mutex<DisplayState>,
}

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, DisplayState> {
        // A panicked holder leaves state consistent enough to keep going
        self.display_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn non_pluggable(&self) -> bool {
        self.entry.non_pluggable
    }
}

/// An HDMI display
pub struct HdmiDisplay {
    shared: Arc<Shared>,
    provider: Arc<dyn ControllerProvider>,
    hpd: HpdConfig,
    debug_dir: Option<PathBuf>,
    events: Option<Sender<HotplugEvent>>,
    hpd_work: Mutex<Option<hpd::HpdWorker>>,
}

impl HdmiDisplay {
    /// Create a display from its configuration entry
    pub fn new(
        entry: &DisplayEntry,
        hpd: &HpdConfig,
        provider: Arc<dyn ControllerProvider>,
        events: Option<Sender<HotplugEvent>>,
        debug_dir: Option<PathBuf>,
    ) -> Result<Self> {
        if entry.name.is_empty() {
            return Err(HdmiError::InvalidArgument("display has no name".to_string()));
        }
        let mode_list = entry.mode_list()?;
        if entry.non_pluggable && mode_list.is_empty() {
            return Err(HdmiError::InvalidArgument(format!(
                "non-pluggable display {} has no modes",
                entry.name
            )));
        }

        let state = DisplayState {
            info: HdmiInfo {
                display_type: entry.display_type,
                is_hot_pluggable: !entry.non_pluggable,
                is_connected: false,
                is_edid_supported: !entry.non_pluggable,
                width_mm: entry.width_mm,
                height_mm: entry.height_mm,
            },
            ctrl: HdmiCtrl {
                ctrl: None,
                ctrl_ref: entry.controller,
                hdmi_ctrl_idx: entry.controller,
            },
            mode_list,
            connected: false,
            is_tpg_enabled: false,
            encoder: None,
            connector: None,
            edid: None,
            edid_override: None,
            root: None,
            hpd: HpdDebouncer::new(Duration::from_millis(hpd.debounce_ms)),
            configured_size_mm: (entry.width_mm, entry.height_mm),
        };

        Ok(Self {
            shared: Arc::new(Shared {
                name: entry.name.clone(),
                display_type: entry.display_type,
                entry: entry.clone(),
                display_lock: Mutex::new(state),
            }),
            provider,
            hpd: hpd.clone(),
            debug_dir,
            events,
            hpd_work: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn display_type(&self) -> DisplayType {
        self.shared.display_type
    }

    pub fn non_pluggable(&self) -> bool {
        self.shared.non_pluggable()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock().connected
    }

    pub fn is_tpg_enabled(&self) -> bool {
        self.shared.lock().is_tpg_enabled
    }

    /// Number of configured modes
    pub fn num_of_modes(&self) -> u32 {
        self.shared.lock().mode_list.len() as u32
    }

    /// Configured mode list
    pub fn mode_list(&self) -> Vec<DisplayMode> {
        self.shared.lock().mode_list.clone()
    }

    /// Controller instance id (valid after dev_init)
    pub fn hdmi_ctrl_idx(&self) -> u32 {
        self.shared.lock().ctrl.hdmi_ctrl_idx
    }

    /// Connector bound by post_init
    pub fn connector_id(&self) -> Option<ConnectorId> {
        self.shared.lock().connector
    }

    /// Sink EDID from the last successful mode probe
    pub fn edid(&self) -> Option<Edid> {
        self.shared.lock().edid.clone()
    }

    pub fn is_dev_initialized(&self) -> bool {
        self.shared.lock().ctrl.ctrl.is_some()
    }

    pub fn is_drm_initialized(&self) -> bool {
        self.shared.lock().encoder.is_some()
    }

    /// Hot-plug interrupt: schedule the HPD work
    pub fn hpd_irq(&self) {
        if let Some(worker) = self.worker_slot().as_ref() {
            worker.kick();
        }
    }

    fn worker_slot(&self) -> MutexGuard<'_, Option<hpd::HpdWorker>> {
        self.hpd_work
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn stop_hpd_work(&self) {
        let worker = self.worker_slot().take();
        if let Some(worker) = worker {
            worker.stop();
        }
    }

    fn load_edid_override(&self) -> Result<Option<Vec<u8>>> {
        let Some(path) = self.shared.entry.edid_override_path() else {
            return Ok(None);
        };
        let raw = std::fs::read(&path).map_err(|e| {
            HdmiError::Config(format!("cannot read EDID override {}: {}", path.display(), e))
        })?;
        Edid::parse(&raw)?;
        info!(
            "{}: using EDID override {} ({} bytes)",
            self.name(),
            path.display(),
            raw.len()
        );
        Ok(Some(raw))
    }

    /// Acquire the controller and bring the PHY up
    pub fn dev_init(&self) -> Result<()> {
        let edid_override = self.load_edid_override()?;

        let mut st = self.shared.lock();
        if st.ctrl.ctrl.is_some() {
            return Err(HdmiError::Busy(self.name().to_string()));
        }

        let mut ctrl = self
            .provider
            .acquire(st.ctrl.ctrl_ref)
            .map_err(|e| HdmiError::NoDevice(format!("{}: {:#}", self.name(), e)))?;
        ctrl.set_power(true)?;

        st.ctrl.hdmi_ctrl_idx = ctrl.index();
        st.ctrl.ctrl = Some(ctrl);
        st.edid_override = edid_override;

        if let Some(base) = &self.debug_dir {
            match debugfs::create_root(base, self.name()) {
                Ok(root) => st.root = Some(root),
                Err(e) => warn!("{}: debug directory unavailable: {}", self.name(), e),
            }
        }

        info!(
            "{}: initialized on HDMI controller {} ({})",
            self.name(),
            st.ctrl.hdmi_ctrl_idx,
            self.display_type().as_str()
        );
        Ok(())
    }

    /// Release everything acquired by dev_init
    pub fn dev_deinit(&self) -> Result<()> {
        self.stop_hpd_work();

        let mut st = self.shared.lock();
        let Some(mut ctrl) = st.ctrl.ctrl.take() else {
            return Err(HdmiError::NotInitialized(self.name().to_string()));
        };
        if let Err(e) = ctrl.set_power(false) {
            warn!("{}: PHY power down failed: {:#}", self.name(), e);
        }

        st.encoder = None;
        st.connector = None;
        st.is_tpg_enabled = false;
        st.edid_override = None;
        st.set_connected(false);

        info!("{}: deinitialized", self.name());
        Ok(())
    }

    /// Bind the display to an encoder and start hot-plug detection
    pub fn drm_init(&self, encoder: EncoderId) -> Result<()> {
        let initial_level = {
            let mut st = self.shared.lock();
            if st.encoder.is_some() {
                return Err(HdmiError::Busy(self.name().to_string()));
            }
            let Some(ctrl) = st.ctrl.ctrl.as_mut() else {
                return Err(HdmiError::NotInitialized(self.name().to_string()));
            };

            let level = if self.non_pluggable() {
                true
            } else {
                ctrl.hpd_asserted()?
            };
            st.encoder = Some(encoder);
            st.set_connected(level);
            st.hpd.reset(level);
            level
        };

        if !self.non_pluggable() {
            let worker = hpd::HpdWorker::start(
                Arc::clone(&self.shared),
                Duration::from_millis(self.hpd.poll_interval_ms.max(1)),
                self.events.clone(),
            )
            .map_err(|e| HdmiError::Hardware(anyhow::anyhow!("cannot spawn HPD worker: {}", e)))?;
            *self.worker_slot() = Some(worker);
        }

        info!(
            "{}: bound to encoder {}, {}",
            self.name(),
            encoder.0,
            if initial_level { "connected" } else { "disconnected" }
        );
        Ok(())
    }

    /// Undo drm_init
    pub fn drm_deinit(&self) -> Result<()> {
        self.stop_hpd_work();

        let mut st = self.shared.lock();
        if st.encoder.take().is_none() {
            return Err(HdmiError::NotInitialized(self.name().to_string()));
        }
        st.connector = None;
        Ok(())
    }

    /// Display properties for the display manager
    pub fn get_info(&self) -> Result<DisplayInfo> {
        let st = self.shared.lock();
        let mut capabilities = DisplayCaps::VIDEO_MODE;
        if st.info.is_hot_pluggable {
            capabilities |= DisplayCaps::HOT_PLUG;
        }
        if st.info.is_edid_supported {
            capabilities |= DisplayCaps::EDID;
        }
        Ok(DisplayInfo {
            intf_type: InterfaceType::HdmiA,
            num_of_h_tiles: 1,
            h_tile_instance: vec![st.ctrl.hdmi_ctrl_idx],
            is_connected: st.info.is_connected,
            is_hot_pluggable: st.info.is_hot_pluggable,
            is_edid_supported: st.info.is_edid_supported,
            width_mm: st.info.width_mm,
            height_mm: st.info.height_mm,
            max_width: MAX_WIDTH,
            max_height: MAX_HEIGHT,
            capabilities,
        })
    }

    /// Drive the controller's test pattern generator
    pub fn set_tpg(&self, enable: bool) -> Result<()> {
        let mut st = self.shared.lock();
        let Some(ctrl) = st.ctrl.ctrl.as_mut() else {
            return Err(HdmiError::NotInitialized(self.name().to_string()));
        };
        ctrl.set_test_pattern(enable)
            .map_err(|_| HdmiError::Unsupported("test pattern generator"))?;
        st.is_tpg_enabled = enable;
        info!("{}: TPG {}", self.name(), if enable { "enabled" } else { "disabled" });
        debugfs::refresh(&self.shared.name, &st);
        Ok(())
    }

    /// Human-readable state summary (debugfs `dump_info`)
    pub fn dump_info(&self) -> String {
        let st = self.shared.lock();
        debugfs::dump_info(&self.shared.name, &st)
    }
}

impl Drop for HdmiDisplay {
    fn drop(&mut self) {
        self.stop_hpd_work();
    }
}

impl DisplayOps for HdmiDisplay {
    fn dev_init(&self) -> Result<()> {
        HdmiDisplay::dev_init(self)
    }

    fn dev_deinit(&self) -> Result<()> {
        HdmiDisplay::dev_deinit(self)
    }

    fn drm_init(&self, encoder: EncoderId) -> Result<()> {
        HdmiDisplay::drm_init(self, encoder)
    }

    fn drm_deinit(&self) -> Result<()> {
        HdmiDisplay::drm_deinit(self)
    }

    fn get_info(&self) -> Result<DisplayInfo> {
        HdmiDisplay::get_info(self)
    }

    fn connector_post_init(&self, connector: &mut Connector, info: &DisplayInfo) -> Result<()> {
        HdmiDisplay::connector_post_init(self, connector, info)
    }

    fn connector_pre_deinit(&self, connector: &mut Connector) -> Result<()> {
        HdmiDisplay::connector_pre_deinit(self, connector)
    }

    fn connector_detect(&self, connector: &mut Connector, force: bool) -> ConnectorStatus {
        HdmiDisplay::connector_detect(self, connector, force)
    }

    fn connector_get_modes(&self, connector: &mut Connector) -> usize {
        HdmiDisplay::connector_get_modes(self, connector)
    }

    fn mode_valid(&self, connector: &Connector, mode: &DisplayMode) -> ModeStatus {
        HdmiDisplay::mode_valid(self, connector, mode)
    }
}
