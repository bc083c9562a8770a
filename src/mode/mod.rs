//! Display modes
//!
//! Timing representation shared by EDID parsing, configured mode lists
//! and mode validation. Field layout follows the DRM mode info so modes
//! can be handed to KMS without reinterpretation.

pub mod tables;

use bitflags::bitflags;
use std::fmt;

use crate::error::{HdmiError, Result};

bitflags! {
    /// Sync polarity and scan flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModeFlags: u32 {
        const PHSYNC = 1 << 0;
        const NHSYNC = 1 << 1;
        const PVSYNC = 1 << 2;
        const NVSYNC = 1 << 3;
        const INTERLACE = 1 << 4;
        const DBLSCAN = 1 << 5;
    }
}

bitflags! {
    /// Where a mode came from
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModeType: u32 {
        const PREFERRED = 1 << 3;
        const DRIVER = 1 << 6;
        const USERDEF = 1 << 5;
    }
}

/// Result of validating a mode against the display and its sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeStatus {
    Ok,
    /// Horizontal active area exceeds the pipe limit
    HDisplay,
    /// Vertical active area exceeds the pipe limit
    VDisplay,
    ClockHigh,
    ClockLow,
    /// PHY cannot generate the exact pixel clock
    ClockRange,
    NoInterlace,
    NoDoubleScan,
    Bad,
}

impl ModeStatus {
    pub fn is_ok(self) -> bool {
        self == ModeStatus::Ok
    }
}

impl fmt::Display for ModeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModeStatus::Ok => "OK",
            ModeStatus::HDisplay => "H_ILLEGAL",
            ModeStatus::VDisplay => "V_ILLEGAL",
            ModeStatus::ClockHigh => "CLOCK_HIGH",
            ModeStatus::ClockLow => "CLOCK_LOW",
            ModeStatus::ClockRange => "CLOCK_RANGE",
            ModeStatus::NoInterlace => "NO_INTERLACE",
            ModeStatus::NoDoubleScan => "NO_DBLESCAN",
            ModeStatus::Bad => "BAD",
        };
        f.write_str(s)
    }
}

/// A display timing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayMode {
    pub name: String,
    /// Pixel clock in kHz
    pub clock: u32,
    pub hdisplay: u16,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub hskew: u16,
    pub vdisplay: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    pub vscan: u16,
    pub flags: ModeFlags,
    pub mode_type: ModeType,
}

impl DisplayMode {
    /// Build a mode from sync positions
    ///
    /// `h` and `v` are `[active, sync_start, sync_end, total]`.
    pub fn new(clock: u32, h: [u16; 4], v: [u16; 4], flags: ModeFlags) -> Self {
        let mut mode = Self {
            name: String::new(),
            clock,
            hdisplay: h[0],
            hsync_start: h[1],
            hsync_end: h[2],
            htotal: h[3],
            hskew: 0,
            vdisplay: v[0],
            vsync_start: v[1],
            vsync_end: v[2],
            vtotal: v[3],
            vscan: 0,
            flags,
            mode_type: ModeType::DRIVER,
        };
        mode.set_name();
        mode
    }

    /// Build a mode from active/porch/pulse widths (panel datasheet layout)
    ///
    /// `h` and `v` are `[active, front_porch, sync_width, back_porch]`.
    pub fn from_porches(clock: u32, h: [u16; 4], v: [u16; 4], flags: ModeFlags) -> Result<Self> {
        let sum = |t: [u16; 4]| -> Option<[u16; 4]> {
            let start = t[0].checked_add(t[1])?;
            let end = start.checked_add(t[2])?;
            let total = end.checked_add(t[3])?;
            Some([t[0], start, end, total])
        };
        match (sum(h), sum(v)) {
            (Some(h), Some(v)) => Ok(Self::new(clock, h, v, flags)),
            _ => Err(HdmiError::InvalidArgument(
                "mode timings overflow 16 bits".to_string(),
            )),
        }
    }

    /// Regenerate the `WxH[i]` name from the timings
    pub fn set_name(&mut self) {
        self.name = format!(
            "{}x{}{}",
            self.hdisplay,
            self.vdisplay,
            if self.is_interlaced() { "i" } else { "" }
        );
    }

    pub fn is_interlaced(&self) -> bool {
        self.flags.contains(ModeFlags::INTERLACE)
    }

    pub fn is_preferred(&self) -> bool {
        self.mode_type.contains(ModeType::PREFERRED)
    }

    /// Vertical refresh in Hz, rounded to the closest integer
    pub fn vrefresh(&self) -> u32 {
        if self.htotal == 0 || self.vtotal == 0 {
            return 0;
        }
        let mut num = self.clock as u64 * 1000;
        let mut den = self.htotal as u64 * self.vtotal as u64;
        if self.flags.contains(ModeFlags::INTERLACE) {
            num *= 2;
        }
        if self.flags.contains(ModeFlags::DBLSCAN) {
            den *= 2;
        }
        if self.vscan > 1 {
            den *= self.vscan as u64;
        }
        ((num + den / 2) / den) as u32
    }

    /// Timings are internally consistent (sync inside blanking, non-zero sizes)
    pub fn is_well_formed(&self) -> bool {
        self.clock > 0
            && self.hdisplay > 0
            && self.vdisplay > 0
            && self.hdisplay <= self.hsync_start
            && self.hsync_start <= self.hsync_end
            && self.hsync_end <= self.htotal
            && self.vdisplay <= self.vsync_start
            && self.vsync_start <= self.vsync_end
            && self.vsync_end <= self.vtotal
    }

    /// Same timings, ignoring name and mode type
    pub fn same_timings(&self, other: &DisplayMode) -> bool {
        self.clock == other.clock
            && self.hdisplay == other.hdisplay
            && self.hsync_start == other.hsync_start
            && self.hsync_end == other.hsync_end
            && self.htotal == other.htotal
            && self.hskew == other.hskew
            && self.vdisplay == other.vdisplay
            && self.vsync_start == other.vsync_start
            && self.vsync_end == other.vsync_end
            && self.vtotal == other.vtotal
            && self.vscan == other.vscan
            && self.flags == other.flags
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\"{}\" {}Hz {} {} {} {} {} {} {} {} {} {:#x}",
            self.name,
            self.vrefresh(),
            self.clock,
            self.hdisplay,
            self.hsync_start,
            self.hsync_end,
            self.htotal,
            self.vdisplay,
            self.vsync_start,
            self.vsync_end,
            self.vtotal,
            self.flags.bits()
        )
    }
}

/// Mode as reported by KMS (connector mode list)
impl From<&drm::control::Mode> for DisplayMode {
    fn from(mode: &drm::control::Mode) -> Self {
        let (hdisplay, vdisplay) = mode.size();
        let (hsync_start, hsync_end, htotal) = mode.hsync();
        let (vsync_start, vsync_end, vtotal) = mode.vsync();
        Self {
            name: mode.name().to_string_lossy().into_owned(),
            clock: mode.clock(),
            hdisplay,
            hsync_start,
            hsync_end,
            htotal,
            hskew: mode.hskew(),
            vdisplay,
            vsync_start,
            vsync_end,
            vtotal,
            vscan: mode.vscan(),
            // Bit layout matches DRM_MODE_FLAG_* / DRM_MODE_TYPE_*
            flags: ModeFlags::from_bits_truncate(mode.flags().bits()),
            mode_type: ModeType::from_bits_truncate(mode.mode_type().bits()),
        }
    }
}

/// Append `mode` unless an identical timing is already present
///
/// Returns true if the mode was added.
pub fn push_unique(modes: &mut Vec<DisplayMode>, mode: DisplayMode) -> bool {
    if modes.iter().any(|m| m.same_timings(&mode)) {
        return false;
    }
    modes.push(mode);
    true
}

/// Parse a mode shorthand: `WxH@R`, `WxHi@R` or `vic:N`
pub fn parse_mode_spec(spec: &str) -> Result<DisplayMode> {
    let spec = spec.trim();

    if let Some(vic) = spec.strip_prefix("vic:") {
        let vic: u8 = vic
            .trim()
            .parse()
            .map_err(|_| HdmiError::Config(format!("invalid VIC in mode \"{}\"", spec)))?;
        return tables::cea_mode(vic)
            .ok_or_else(|| HdmiError::Config(format!("unsupported VIC {}", vic)));
    }

    let (size, refresh) = spec
        .split_once('@')
        .ok_or_else(|| HdmiError::Config(format!("mode \"{}\" lacks @refresh", spec)))?;
    let refresh: u32 = refresh
        .trim()
        .parse()
        .map_err(|_| HdmiError::Config(format!("invalid refresh in mode \"{}\"", spec)))?;

    let (interlaced, size) = match size.strip_suffix('i') {
        Some(s) => (true, s),
        None => (false, size),
    };
    let (w, h) = size
        .split_once('x')
        .ok_or_else(|| HdmiError::Config(format!("mode \"{}\" lacks WxH", spec)))?;
    let w: u16 = w
        .trim()
        .parse()
        .map_err(|_| HdmiError::Config(format!("invalid width in mode \"{}\"", spec)))?;
    let h: u16 = h
        .trim()
        .parse()
        .map_err(|_| HdmiError::Config(format!("invalid height in mode \"{}\"", spec)))?;

    tables::find_mode(w, h, refresh, interlaced)
        .ok_or_else(|| HdmiError::Config(format!("no known timing for mode \"{}\"", spec)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vrefresh() {
        let mode = tables::cea_mode(16).unwrap();
        assert_eq!(mode.vrefresh(), 60);
        let ntsc = tables::cea_mode(2).unwrap();
        assert_eq!(ntsc.vrefresh(), 60);
        let interlaced = tables::cea_mode(5).unwrap();
        assert!(interlaced.is_interlaced());
        assert_eq!(interlaced.vrefresh(), 60);
        assert_eq!(interlaced.name, "1920x1080i");
    }

    #[test]
    fn test_from_porches() {
        let mode = DisplayMode::from_porches(
            148_500,
            [1920, 88, 44, 148],
            [1080, 4, 5, 36],
            ModeFlags::PHSYNC | ModeFlags::PVSYNC,
        )
        .unwrap();
        assert!(mode.same_timings(&tables::cea_mode(16).unwrap()));
        assert!(mode.is_well_formed());
    }

    #[test]
    fn test_from_porches_overflow() {
        let res = DisplayMode::from_porches(
            1000,
            [u16::MAX, 10, 10, 10],
            [480, 1, 1, 1],
            ModeFlags::empty(),
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_parse_mode_spec() {
        let mode = parse_mode_spec("1280x720@60").unwrap();
        assert_eq!(mode.clock, 74_250);
        assert_eq!(mode.htotal, 1650);

        let mode = parse_mode_spec("vic:97").unwrap();
        assert_eq!((mode.hdisplay, mode.vdisplay), (3840, 2160));
        assert_eq!(mode.vrefresh(), 60);

        let mode = parse_mode_spec("1920x1080i@50").unwrap();
        assert!(mode.is_interlaced());

        assert!(parse_mode_spec("1921x1080@60").is_err());
        assert!(parse_mode_spec("1920x1080").is_err());
        assert!(parse_mode_spec("vic:abc").is_err());
    }

    #[test]
    fn test_push_unique() {
        let mut modes = Vec::new();
        assert!(push_unique(&mut modes, tables::cea_mode(16).unwrap()));
        let mut dup = tables::cea_mode(16).unwrap();
        dup.mode_type = ModeType::PREFERRED;
        assert!(!push_unique(&mut modes, dup));
        assert!(push_unique(&mut modes, tables::cea_mode(4).unwrap()));
        assert_eq!(modes.len(), 2);
    }

    #[test]
    fn test_malformed_mode() {
        let mut mode = tables::cea_mode(4).unwrap();
        mode.hsync_start = 1000;
        assert!(!mode.is_well_formed());
    }
}
