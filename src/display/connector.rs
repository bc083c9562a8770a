//! Connector callbacks
//!
//! The display manager owns the [`Connector`]; the display fills in its
//! status, probed modes and EDID property.

use bitflags::bitflags;
use log::{debug, info, warn};

use super::{debugfs, ConnectorId, DisplayInfo, DisplayState, EncoderId, HdmiDisplay};
use crate::constants::{HDMI14_MAX_PIXEL_CLOCK_KHZ, MAX_HEIGHT, MAX_WIDTH, MIN_PIXEL_CLOCK_KHZ};
use crate::edid::{self, Edid};
use crate::error::{HdmiError, Result};
use crate::mode::{DisplayMode, ModeFlags, ModeStatus};

/// Connection status as reported to the display manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectorStatus {
    Connected,
    Disconnected,
    #[default]
    Unknown,
}

bitflags! {
    /// How the display manager should poll the connector
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PollFlags: u32 {
        /// Hot-plug interrupts are delivered
        const HPD = 1 << 0;
        const CONNECT = 1 << 1;
        const DISCONNECT = 1 << 2;
    }
}

/// Display-manager side connector object
#[derive(Debug, Clone, Default)]
pub struct Connector {
    pub id: ConnectorId,
    pub encoder: Option<EncoderId>,
    pub status: ConnectorStatus,
    pub polled: PollFlags,
    pub probed_modes: Vec<DisplayMode>,
    /// Raw bytes of the `EDID` property
    pub edid_property: Option<Vec<u8>>,
    /// Sink is HDMI (vs DVI)
    pub is_hdmi: bool,
    pub width_mm: u32,
    pub height_mm: u32,
}

impl Connector {
    pub fn new(id: ConnectorId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// The mode flagged preferred, or the first probed mode
    pub fn preferred_mode(&self) -> Option<&DisplayMode> {
        self.probed_modes
            .iter()
            .find(|m| m.is_preferred())
            .or_else(|| self.probed_modes.first())
    }
}

impl HdmiDisplay {
    /// Bind the connector created by the display manager
    pub fn connector_post_init(&self, connector: &mut Connector, info: &DisplayInfo) -> Result<()> {
        let mut st = self.shared.lock();
        let Some(encoder) = st.encoder else {
            return Err(HdmiError::NotInitialized(self.name().to_string()));
        };
        if let Some(bound) = st.connector {
            if bound != connector.id {
                return Err(HdmiError::Busy(format!(
                    "{} already bound to connector {}",
                    self.name(),
                    bound.0
                )));
            }
        }

        st.connector = Some(connector.id);
        connector.encoder = Some(encoder);
        connector.polled = if self.non_pluggable() {
            PollFlags::empty()
        } else {
            PollFlags::HPD
        };
        connector.width_mm = info.width_mm;
        connector.height_mm = info.height_mm;

        debug!("{}: connector {} bound", self.name(), connector.id.0);
        Ok(())
    }

    /// Unbind the connector before it is destroyed
    pub fn connector_pre_deinit(&self, connector: &mut Connector) -> Result<()> {
        let mut st = self.shared.lock();
        match st.connector {
            None => return Err(HdmiError::NotInitialized(self.name().to_string())),
            Some(bound) if bound != connector.id => {
                return Err(HdmiError::InvalidArgument(format!(
                    "connector {} is not bound to {}",
                    connector.id.0,
                    self.name()
                )))
            }
            Some(_) => {}
        }

        st.connector = None;
        connector.encoder = None;
        connector.status = ConnectorStatus::Unknown;
        connector.probed_modes.clear();
        connector.edid_property = None;
        Ok(())
    }

    /// Report the connection status
    ///
    /// `force` resamples HPD now instead of trusting the debounced level.
    pub fn connector_detect(&self, connector: &mut Connector, force: bool) -> ConnectorStatus {
        let status = if self.non_pluggable() {
            ConnectorStatus::Connected
        } else {
            let mut st = self.shared.lock();
            if force {
                self.resample_hpd(&mut st);
            }
            match (&st.ctrl.ctrl, st.connected) {
                (Some(_), true) => ConnectorStatus::Connected,
                _ => ConnectorStatus::Disconnected,
            }
        };

        if connector.status != status {
            debug!("{}: connector status {:?}", self.name(), status);
        }
        connector.status = status;
        status
    }

    fn resample_hpd(&self, st: &mut DisplayState) {
        let Some(ctrl) = st.ctrl.ctrl.as_mut() else {
            return;
        };
        match ctrl.hpd_asserted() {
            Ok(level) => {
                st.hpd.reset(level);
                if st.set_connected(level) {
                    info!(
                        "{}: {} (forced detect)",
                        self.name(),
                        if level { "connected" } else { "disconnected" }
                    );
                    debugfs::refresh(&self.shared.name, st);
                }
            }
            Err(e) => warn!("{}: HPD read failed: {:#}", self.name(), e),
        }
    }

    /// Fill `connector.probed_modes`; returns the number of modes
    pub fn connector_get_modes(&self, connector: &mut Connector) -> usize {
        let mut guard = self.shared.lock();
        let st = &mut *guard;

        if self.non_pluggable() {
            connector.probed_modes = st.mode_list.clone();
            connector.is_hdmi = true;
            return connector.probed_modes.len();
        }

        if !st.connected {
            connector.probed_modes.clear();
            connector.edid_property = None;
            return 0;
        }

        let raw = match (&st.edid_override, st.ctrl.ctrl.as_mut()) {
            (Some(bytes), _) => Ok(bytes.clone()),
            (None, Some(ctrl)) => edid::read_edid(ctrl.as_mut()),
            (None, None) => Err(HdmiError::NotInitialized(self.name().to_string())),
        };

        let edid = match raw.and_then(|raw| Edid::parse(&raw)) {
            Ok(edid) => edid,
            Err(e) => {
                warn!("{}: no usable EDID: {}", self.name(), e);
                st.edid = None;
                connector.probed_modes.clear();
                connector.edid_property = None;
                debugfs::refresh(&self.shared.name, st);
                return 0;
            }
        };

        let modes = edid.modes();
        info!(
            "{}: sink {}{} offers {} modes",
            self.name(),
            edid.manufacturer,
            edid.monitor_name
                .as_deref()
                .map(|n| format!(" \"{}\"", n))
                .unwrap_or_default(),
            modes.len()
        );
        edid.hdr.log();

        // Configured size wins over the sink's
        if self.shared.entry.width_mm == 0 || self.shared.entry.height_mm == 0 {
            st.info.width_mm = edid.width_mm;
            st.info.height_mm = edid.height_mm;
        }
        connector.width_mm = st.info.width_mm;
        connector.height_mm = st.info.height_mm;
        connector.is_hdmi = edid.is_hdmi();
        connector.edid_property = Some(edid.raw().to_vec());
        connector.probed_modes = modes;

        st.edid = Some(edid);
        debugfs::refresh(&self.shared.name, st);
        connector.probed_modes.len()
    }

    /// Check a mode against the pipe, the PHY and the sink
    pub fn mode_valid(&self, _connector: &Connector, mode: &DisplayMode) -> ModeStatus {
        let st = self.shared.lock();

        if !mode.is_well_formed() {
            return ModeStatus::Bad;
        }
        if mode.flags.contains(ModeFlags::DBLSCAN) {
            return ModeStatus::NoDoubleScan;
        }
        if mode.is_interlaced() && !self.shared.entry.allow_interlace {
            return ModeStatus::NoInterlace;
        }
        if mode.hdisplay > MAX_WIDTH {
            return ModeStatus::HDisplay;
        }
        if mode.vdisplay > MAX_HEIGHT {
            return ModeStatus::VDisplay;
        }

        let (min_khz, mut max_khz) = st
            .ctrl
            .ctrl
            .as_ref()
            .map(|c| c.pixel_clock_range())
            .unwrap_or((MIN_PIXEL_CLOCK_KHZ, HDMI14_MAX_PIXEL_CLOCK_KHZ));
        if self.shared.entry.max_pixel_clock_khz != 0 {
            max_khz = max_khz.min(self.shared.entry.max_pixel_clock_khz);
        }
        if let Some(sink_khz) = st.edid.as_ref().and_then(|e| e.max_tmds_clock_khz()) {
            max_khz = max_khz.min(sink_khz);
        }

        if mode.clock < min_khz {
            return ModeStatus::ClockLow;
        }
        if mode.clock > max_khz {
            return ModeStatus::ClockHigh;
        }

        if let Some(ctrl) = st.ctrl.ctrl.as_ref() {
            let rounded = ctrl.round_pixel_clock(mode.clock);
            if rounded != mode.clock {
                debug!(
                    "{}: {} needs {} kHz, PHY gives {} kHz",
                    self.name(),
                    mode.name,
                    mode.clock,
                    rounded
                );
                return ModeStatus::ClockRange;
            }
        }

        if self.non_pluggable() && !st.mode_list.iter().any(|m| m.same_timings(mode)) {
            return ModeStatus::Bad;
        }

        ModeStatus::Ok
    }
}
