//! Configuration file management
//!
//! Loads the TOML display description (what a device tree would carry for
//! each HDMI display) plus hot-plug and debug settings.
//! Default config path: ~/.config/hdmi-display/config.toml

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[cfg(target_os = "linux")]
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
#[cfg(target_os = "linux")]
use std::sync::mpsc;

use crate::constants::{HPD_DEBOUNCE_MS, HPD_POLL_INTERVAL_MS};
use crate::error::HdmiError;
use crate::mode::{self, DisplayMode, ModeFlags, ModeType};

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hot-plug detection settings
    pub hpd: HpdConfig,
    /// DRM device settings
    pub drm: DrmConfig,
    /// Debug output settings
    pub debug: DebugConfig,
    /// HDMI displays, in probe order
    #[serde(rename = "display")]
    pub displays: Vec<DisplayEntry>,
}

/// Hot-plug detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HpdConfig {
    /// HPD level must be stable this long before a change is reported
    pub debounce_ms: u64,
    /// Sampling interval when no change is pending
    pub poll_interval_ms: u64,
}

impl Default for HpdConfig {
    fn default() -> Self {
        Self {
            debounce_ms: HPD_DEBOUNCE_MS,
            poll_interval_ms: HPD_POLL_INTERVAL_MS,
        }
    }
}

/// DRM device settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DrmConfig {
    /// DRM card node
    pub device: String,
}

impl Default for DrmConfig {
    fn default() -> Self {
        Self {
            device: "/dev/dri/card0".to_string(),
        }
    }
}

/// Debug output settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Directory for per-display dump_info/edid files (empty = disabled)
    pub dir: String,
}

/// Role of the display in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayType {
    #[default]
    Primary,
    Secondary,
    Tertiary,
}

impl DisplayType {
    pub fn as_str(self) -> &'static str {
        match self {
            DisplayType::Primary => "primary",
            DisplayType::Secondary => "secondary",
            DisplayType::Tertiary => "tertiary",
        }
    }
}

/// Panel timing given as active/porch/pulse values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomTiming {
    pub pixel_clock_khz: u32,
    pub h_active: u16,
    pub h_front_porch: u16,
    pub h_pulse_width: u16,
    pub h_back_porch: u16,
    #[serde(default)]
    pub h_active_high: bool,
    pub v_active: u16,
    pub v_front_porch: u16,
    pub v_pulse_width: u16,
    pub v_back_porch: u16,
    #[serde(default)]
    pub v_active_high: bool,
    #[serde(default)]
    pub interlaced: bool,
}

impl CustomTiming {
    pub fn to_mode(&self) -> crate::error::Result<DisplayMode> {
        let mut flags = if self.h_active_high {
            ModeFlags::PHSYNC
        } else {
            ModeFlags::NHSYNC
        };
        flags |= if self.v_active_high {
            ModeFlags::PVSYNC
        } else {
            ModeFlags::NVSYNC
        };
        if self.interlaced {
            flags |= ModeFlags::INTERLACE;
        }
        let mut mode = DisplayMode::from_porches(
            self.pixel_clock_khz,
            [
                self.h_active,
                self.h_front_porch,
                self.h_pulse_width,
                self.h_back_porch,
            ],
            [
                self.v_active,
                self.v_front_porch,
                self.v_pulse_width,
                self.v_back_porch,
            ],
            flags,
        )?;
        mode.mode_type = ModeType::USERDEF;
        Ok(mode)
    }
}

/// One HDMI display
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayEntry {
    /// Display label (unique)
    pub name: String,
    pub display_type: DisplayType,
    /// Controller reference handed to the controller provider
    pub controller: u32,
    /// Fixed panel: always connected, modes from this entry, no EDID
    pub non_pluggable: bool,
    /// Accept interlaced modes
    pub allow_interlace: bool,
    /// Additional pixel clock cap in kHz (0 = controller limit only)
    pub max_pixel_clock_khz: u32,
    /// Use this EDID file instead of reading the sink (empty = disabled)
    pub edid_override: String,
    /// Physical size override in millimeters (0 = from EDID)
    pub width_mm: u32,
    pub height_mm: u32,
    /// Mode shorthands: "1920x1080@60", "1920x1080i@50", "vic:16"
    pub modes: Vec<String>,
    /// Explicit timings
    pub custom_modes: Vec<CustomTiming>,
}

impl Default for DisplayEntry {
    fn default() -> Self {
        Self {
            name: "hdmi_display".to_string(),
            display_type: DisplayType::Primary,
            controller: 0,
            non_pluggable: false,
            allow_interlace: false,
            max_pixel_clock_khz: 0,
            edid_override: String::new(),
            width_mm: 0,
            height_mm: 0,
            modes: Vec::new(),
            custom_modes: Vec::new(),
        }
    }
}

impl DisplayEntry {
    /// Resolve the configured mode list (shorthands first, then custom timings)
    ///
    /// The first mode is marked preferred.
    pub fn mode_list(&self) -> crate::error::Result<Vec<DisplayMode>> {
        let mut modes = Vec::new();
        for spec in &self.modes {
            let mut m = mode::parse_mode_spec(spec)?;
            m.mode_type = ModeType::USERDEF;
            mode::push_unique(&mut modes, m);
        }
        for timing in &self.custom_modes {
            let m = timing.to_mode()?;
            if !m.is_well_formed() {
                return Err(HdmiError::Config(format!(
                    "custom mode {} has inconsistent timings",
                    m.name
                )));
            }
            mode::push_unique(&mut modes, m);
        }
        if let Some(first) = modes.first_mut() {
            first.mode_type |= ModeType::PREFERRED;
        }
        Ok(modes)
    }

    /// EDID override file, if configured
    pub fn edid_override_path(&self) -> Option<PathBuf> {
        (!self.edid_override.is_empty()).then(|| expand_home(&self.edid_override))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hpd: HpdConfig::default(),
            drm: DrmConfig::default(),
            debug: DebugConfig::default(),
            displays: vec![DisplayEntry::default()],
        }
    }
}

/// Expand a leading `~/` to the home directory
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

impl Config {
    const SYSTEM_CONFIG_PATH: &'static str = "/etc/hdmi-display/config.toml";

    /// Get the path that would be used for loading config
    /// Returns None if using built-in defaults
    pub fn config_path() -> Option<PathBuf> {
        // 1. HDMI_DISPLAY_CONFIG environment variable
        if let Ok(path) = std::env::var("HDMI_DISPLAY_CONFIG") {
            let p = Path::new(&path);
            if p.exists() {
                return Some(p.to_path_buf());
            }
        }

        // 2. User config: ~/.config/hdmi-display/config.toml
        if let Some(config_path) = default_config_path() {
            if config_path.exists() {
                return Some(config_path);
            }
        }

        // 3. System config: /etc/hdmi-display/config.toml
        let system_config = Path::new(Self::SYSTEM_CONFIG_PATH);
        if system_config.exists() {
            return Some(system_config.to_path_buf());
        }

        None
    }

    /// Load configuration with priority:
    /// 1. HDMI_DISPLAY_CONFIG environment variable
    /// 2. ~/.config/hdmi-display/config.toml (user config)
    /// 3. /etc/hdmi-display/config.toml (system config)
    /// 4. Built-in defaults
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            match Self::load_from_file(&path) {
                Ok(config) => {
                    info!("Loaded config: {}", path.display());
                    return config;
                }
                Err(e) => {
                    warn!("Failed to load config {}: {:#}", path.display(), e);
                }
            }
        }
        info!("Using built-in default config");
        Self::default()
    }

    /// Load settings from specified path
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse and validate TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject entries that cannot be probed
    pub fn validate(&self) -> std::result::Result<(), HdmiError> {
        for (idx, entry) in self.displays.iter().enumerate() {
            if entry.name.is_empty() {
                return Err(HdmiError::Config(format!("display #{} has no name", idx)));
            }
            if self.displays[..idx].iter().any(|d| d.name == entry.name) {
                return Err(HdmiError::Config(format!(
                    "duplicate display name \"{}\"",
                    entry.name
                )));
            }
            let modes = entry.mode_list()?;
            if entry.non_pluggable && modes.is_empty() {
                return Err(HdmiError::Config(format!(
                    "non-pluggable display \"{}\" needs at least one mode",
                    entry.name
                )));
            }
        }
        if self.hpd.poll_interval_ms == 0 {
            return Err(HdmiError::Config(
                "hpd.poll_interval_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Debug root, if enabled
    pub fn debug_dir(&self) -> Option<PathBuf> {
        (!self.debug.dir.is_empty()).then(|| expand_home(&self.debug.dir))
    }
}

/// Watches the config file for changes
#[cfg(target_os = "linux")]
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<()>,
}

#[cfg(target_os = "linux")]
impl ConfigWatcher {
    /// Start watching config file
    pub fn new(config_path: &Path) -> Result<Self> {
        let (tx, rx) = mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                // Editors often save by writing a temp file and renaming it
                use notify::EventKind;
                match event.kind {
                    EventKind::Modify(_) | EventKind::Create(_) => {
                        let _ = tx.send(());
                    }
                    _ => {}
                }
            }
        })?;

        // Watch the parent directory to catch rename operations
        let watch_path = config_path.parent().unwrap_or(config_path);
        watcher.watch(watch_path, RecursiveMode::NonRecursive)?;

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Check if config file was modified (non-blocking)
    pub fn check_reload(&self) -> bool {
        let mut changed = false;
        while self.rx.try_recv().is_ok() {
            changed = true;
        }
        changed
    }
}

/// Get default config file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("hdmi-display").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.displays.len(), 1);
        assert_eq!(config.hpd.debounce_ms, HPD_DEBOUNCE_MS);
        assert!(config.validate().is_ok());
        assert!(config.debug_dir().is_none());
    }

    #[test]
    fn test_parse_displays() {
        let config = Config::from_toml(
            r#"
            [hpd]
            debounce_ms = 50

            [[display]]
            name = "hdmi0"
            display_type = "primary"
            controller = 0

            [[display]]
            name = "panel"
            display_type = "secondary"
            controller = 1
            non_pluggable = true
            modes = ["1280x720@60", "vic:16"]

            [[display.custom_modes]]
            pixel_clock_khz = 65000
            h_active = 1024
            h_front_porch = 24
            h_pulse_width = 136
            h_back_porch = 160
            v_active = 768
            v_front_porch = 3
            v_pulse_width = 6
            v_back_porch = 29
            "#,
        )
        .unwrap();

        assert_eq!(config.hpd.debounce_ms, 50);
        assert_eq!(config.hpd.poll_interval_ms, HPD_POLL_INTERVAL_MS);
        assert_eq!(config.displays.len(), 2);
        let panel = &config.displays[1];
        assert_eq!(panel.display_type, DisplayType::Secondary);
        let modes = panel.mode_list().unwrap();
        assert_eq!(modes.len(), 3);
        assert!(modes[0].is_preferred());
        assert_eq!(modes[0].name, "1280x720");
        assert_eq!(modes[2].htotal, 1344);
        assert_eq!(modes[2].vrefresh(), 60);
    }

    #[test]
    fn test_reject_duplicate_names() {
        let res = Config::from_toml(
            r#"
            [[display]]
            name = "hdmi0"
            [[display]]
            name = "hdmi0"
            controller = 1
            "#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_reject_non_pluggable_without_modes() {
        let res = Config::from_toml(
            r#"
            [[display]]
            name = "panel"
            non_pluggable = true
            "#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_reject_unknown_display_type() {
        let res = Config::from_toml(
            r#"
            [[display]]
            name = "hdmi0"
            display_type = "sideways"
            "#,
        );
        assert!(res.is_err());
    }
}
