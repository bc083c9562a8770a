//! EDID retrieval and parsing
//!
//! EDID structure:
//! - Base EDID: 128 bytes (header, vendor, basic parameters, timings,
//!   four 18-byte descriptors, extension count, checksum)
//! - Extension blocks: 128 bytes each (count at offset 126)
//! - CEA-861 extension (tag 0x02) carries video/audio/vendor data blocks

pub mod cea;
pub mod hdr;

use log::{debug, trace, warn};

use crate::constants::{
    EDID_BLOCK_SIZE, EDID_HEADER, EDID_MAX_EXTENSIONS, EDID_READ_RETRIES,
};
use crate::error::{HdmiError, Result};
use crate::hw::HdmiController;
use crate::mode::{self, tables, DisplayMode, ModeFlags, ModeType};

pub use cea::{CeaExtension, HdmiForumVsdb, HdmiVsdb, ShortVideoDescriptor};
pub use hdr::{Eotf, HdrCapabilities, HdrOutputMetadata};

/// Monitor range limits descriptor (tag 0xFD)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeLimits {
    pub min_vfreq_hz: u8,
    pub max_vfreq_hz: u8,
    pub min_hfreq_khz: u8,
    pub max_hfreq_khz: u8,
    /// Maximum pixel clock in kHz, if reported
    pub max_pixel_clock_khz: Option<u32>,
}

/// Parsed EDID
#[derive(Debug, Clone)]
pub struct Edid {
    raw: Vec<u8>,
    /// Three-letter PNP manufacturer id
    pub manufacturer: String,
    pub product_code: u16,
    pub serial: u32,
    pub week: u8,
    pub year: u16,
    pub version: u8,
    pub revision: u8,
    pub digital: bool,
    pub width_mm: u32,
    pub height_mm: u32,
    pub monitor_name: Option<String>,
    pub serial_string: Option<String>,
    pub range_limits: Option<RangeLimits>,
    /// First detailed timing is the sink's preferred mode
    pub preferred_timing: bool,
    pub detailed_modes: Vec<DisplayMode>,
    pub standard_modes: Vec<DisplayMode>,
    pub established_modes: Vec<DisplayMode>,
    pub cea: Vec<CeaExtension>,
    pub hdr: HdrCapabilities,
}

/// Verify an EDID block checksum (all bytes sum to 0 mod 256)
pub fn block_checksum_ok(block: &[u8]) -> bool {
    block.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)) == 0
}

fn fix_checksum(block: &mut [u8]) {
    let last = block.len() - 1;
    let sum = block[..last].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    block[last] = 0u8.wrapping_sub(sum);
}

/// Read a block, retrying while the checksum fails
fn read_block(ctrl: &mut dyn HdmiController, index: u8) -> Result<Option<[u8; EDID_BLOCK_SIZE]>> {
    let mut buf = [0u8; EDID_BLOCK_SIZE];
    for attempt in 0..EDID_READ_RETRIES {
        ctrl.read_edid_block(index, &mut buf)?;
        if block_checksum_ok(&buf) {
            return Ok(Some(buf));
        }
        debug!(
            "EDID block {} checksum mismatch (attempt {}/{})",
            index,
            attempt + 1,
            EDID_READ_RETRIES
        );
    }
    Ok(None)
}

/// Read the raw EDID from the sink over DDC
///
/// The base block must be valid. Extension blocks that keep failing their
/// checksum are dropped and the base block's extension count is rewritten.
pub fn read_edid(ctrl: &mut dyn HdmiController) -> Result<Vec<u8>> {
    let base = read_block(ctrl, 0)?
        .ok_or_else(|| HdmiError::Edid("base block checksum invalid".to_string()))?;
    if base[0..8] != EDID_HEADER {
        return Err(HdmiError::Edid("invalid EDID header".to_string()));
    }

    let wanted = base[126] as usize;
    if wanted > EDID_MAX_EXTENSIONS {
        warn!(
            "EDID advertises {} extension blocks, reading {}",
            wanted, EDID_MAX_EXTENSIONS
        );
    }

    let mut raw = base.to_vec();
    let mut valid = 0u8;
    for index in 1..=wanted.min(EDID_MAX_EXTENSIONS) {
        match read_block(ctrl, index as u8)? {
            Some(block) => {
                raw.extend_from_slice(&block);
                valid += 1;
            }
            None => warn!("Dropping EDID extension block {}: bad checksum", index),
        }
    }

    if valid as usize != wanted {
        raw[126] = valid;
        fix_checksum(&mut raw[..EDID_BLOCK_SIZE]);
    }

    debug!("EDID read: {} bytes ({} extensions)", raw.len(), valid);
    Ok(raw)
}

/// Decode an 18-byte detailed timing descriptor
///
/// Returns None for display descriptors (pixel clock 0) and unusable timings.
pub(crate) fn parse_detailed_timing(d: &[u8]) -> Option<(DisplayMode, (u16, u16))> {
    if d.len() < 18 {
        return None;
    }
    let clock = u16::from_le_bytes([d[0], d[1]]) as u32 * 10;
    if clock == 0 {
        return None;
    }

    let hactive = d[2] as u16 | ((d[4] as u16 & 0xF0) << 4);
    let hblank = d[3] as u16 | ((d[4] as u16 & 0x0F) << 8);
    let vactive = d[5] as u16 | ((d[7] as u16 & 0xF0) << 4);
    let vblank = d[6] as u16 | ((d[7] as u16 & 0x0F) << 8);
    let hso = d[8] as u16 | ((d[11] as u16 & 0xC0) << 2);
    let hspw = d[9] as u16 | ((d[11] as u16 & 0x30) << 4);
    let vso = (d[10] as u16 >> 4) | ((d[11] as u16 & 0x0C) << 2);
    let vspw = (d[10] as u16 & 0x0F) | ((d[11] as u16 & 0x03) << 4);
    let hsize_mm = d[12] as u16 | ((d[14] as u16 & 0xF0) << 4);
    let vsize_mm = d[13] as u16 | ((d[14] as u16 & 0x0F) << 8);
    let features = d[17];

    if hactive == 0 || vactive == 0 || hspw == 0 || vspw == 0 {
        trace!("Skipping degenerate detailed timing");
        return None;
    }

    let mut flags = ModeFlags::empty();
    // Digital separate sync carries explicit polarities
    if features & 0x18 == 0x18 {
        flags |= if features & 0x02 != 0 {
            ModeFlags::PHSYNC
        } else {
            ModeFlags::NHSYNC
        };
        flags |= if features & 0x04 != 0 {
            ModeFlags::PVSYNC
        } else {
            ModeFlags::NVSYNC
        };
    } else {
        flags |= ModeFlags::NHSYNC | ModeFlags::NVSYNC;
    }

    let h = [hactive, hactive + hso, hactive + hso + hspw, hactive + hblank];
    let mut v = [vactive, vactive + vso, vactive + vso + vspw, vactive + vblank];

    // Interlaced timings describe one field
    if features & 0x80 != 0 {
        flags |= ModeFlags::INTERLACE;
        for x in v.iter_mut() {
            *x *= 2;
        }
        v[3] |= 1;
    }

    let mut mode = DisplayMode::new(clock, h, v, flags);
    if !mode.is_well_formed() {
        trace!("Skipping inconsistent detailed timing {}", mode);
        return None;
    }
    mode.mode_type = ModeType::DRIVER;
    Some((mode, (hsize_mm, vsize_mm)))
}

fn parse_descriptor_text(data: &[u8]) -> String {
    data.iter()
        .take_while(|&&b| b != 0x0A)
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
        .collect::<String>()
        .trim()
        .to_string()
}

fn parse_vendor(raw: u16) -> String {
    [10u16, 5, 0]
        .iter()
        .map(|shift| (((raw >> shift) & 0x1F) as u8 + b'A' - 1) as char)
        .collect()
}

impl Edid {
    /// Parse and validate a raw EDID blob
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < EDID_BLOCK_SIZE {
            return Err(HdmiError::Edid(format!("EDID too short: {} bytes", raw.len())));
        }
        let base = &raw[..EDID_BLOCK_SIZE];
        if base[0..8] != EDID_HEADER {
            return Err(HdmiError::Edid("invalid EDID header".to_string()));
        }
        if !block_checksum_ok(base) {
            return Err(HdmiError::Edid("base block checksum invalid".to_string()));
        }

        let version = base[18];
        let revision = base[19];
        let mut edid = Edid {
            raw: raw.to_vec(),
            manufacturer: parse_vendor(u16::from_be_bytes([base[8], base[9]])),
            product_code: u16::from_le_bytes([base[10], base[11]]),
            serial: u32::from_le_bytes([base[12], base[13], base[14], base[15]]),
            week: base[16],
            year: 1990 + base[17] as u16,
            version,
            revision,
            digital: base[20] & 0x80 != 0,
            width_mm: base[21] as u32 * 10,
            height_mm: base[22] as u32 * 10,
            monitor_name: None,
            serial_string: None,
            range_limits: None,
            // EDID 1.4 always treats the first DTD as preferred
            preferred_timing: base[24] & 0x02 != 0 || (version == 1 && revision >= 4),
            detailed_modes: Vec::new(),
            standard_modes: Vec::new(),
            established_modes: Vec::new(),
            cea: Vec::new(),
            hdr: HdrCapabilities::default(),
        };

        edid.parse_established(&base[0x23..0x26]);
        edid.parse_standard(&base[0x26..0x36]);
        for desc in base[0x36..0x7E].chunks(18) {
            edid.parse_descriptor(desc);
        }

        if edid.width_mm == 0 || edid.height_mm == 0 {
            if let Some((_, (w, h))) = parse_detailed_timing(&base[0x36..0x48]) {
                edid.width_mm = w as u32;
                edid.height_mm = h as u32;
            }
        }

        let extension_count = base[126] as usize;
        trace!("EDID extension blocks: {}", extension_count);
        for ext_idx in 0..extension_count {
            let offset = EDID_BLOCK_SIZE * (ext_idx + 1);
            if offset + EDID_BLOCK_SIZE > raw.len() {
                warn!(
                    "EDID truncated: {} of {} extension blocks present",
                    ext_idx, extension_count
                );
                break;
            }
            let block = &raw[offset..offset + EDID_BLOCK_SIZE];
            if !block_checksum_ok(block) {
                warn!("Ignoring EDID extension {}: bad checksum", ext_idx + 1);
                continue;
            }
            match block[0] {
                cea::CEA_EXTENSION_TAG => {
                    if let Some(ext) = cea::parse_cea_extension(block, &mut edid.hdr) {
                        edid.cea.push(ext);
                    }
                }
                tag => trace!("Skipping EDID extension tag {:#04x}", tag),
            }
        }

        debug!(
            "EDID: {} {:04x} \"{}\" v{}.{}, {}x{} mm, hdmi={}",
            edid.manufacturer,
            edid.product_code,
            edid.monitor_name.as_deref().unwrap_or(""),
            edid.version,
            edid.revision,
            edid.width_mm,
            edid.height_mm,
            edid.is_hdmi()
        );
        Ok(edid)
    }

    fn parse_established(&mut self, bytes: &[u8]) {
        for (idx, entry) in tables::ESTABLISHED_TIMINGS.iter().enumerate() {
            let bit = 7 - (idx % 8);
            if bytes[idx / 8] & (1 << bit) == 0 {
                continue;
            }
            if let Some((w, h, r)) = entry {
                if let Some(mode) = tables::dmt_mode(*w, *h, *r) {
                    self.established_modes.push(mode);
                }
            }
        }
    }

    fn parse_standard(&mut self, bytes: &[u8]) {
        for pair in bytes.chunks(2) {
            let (b0, b1) = (pair[0], pair[1]);
            if (b0 == 0x01 && b1 == 0x01) || b0 == 0x00 {
                continue;
            }
            let hactive = (b0 as u16 + 31) * 8;
            let vactive = match b1 >> 6 {
                // 16:10 since EDID 1.3, 1:1 before
                0 if self.version == 1 && self.revision < 3 => hactive,
                0 => hactive * 10 / 16,
                1 => hactive * 3 / 4,
                2 => hactive * 4 / 5,
                _ => hactive * 9 / 16,
            };
            let refresh = (b1 & 0x3F) as u32 + 60;
            match tables::dmt_mode(hactive, vactive, refresh) {
                Some(mode) => self.standard_modes.push(mode),
                None => trace!(
                    "No DMT timing for standard timing {}x{}@{}",
                    hactive,
                    vactive,
                    refresh
                ),
            }
        }
    }

    fn parse_descriptor(&mut self, desc: &[u8]) {
        if desc[0] != 0 || desc[1] != 0 {
            if let Some((mode, _)) = parse_detailed_timing(desc) {
                self.detailed_modes.push(mode);
            }
            return;
        }
        let payload = &desc[5..18];
        match desc[3] {
            0xFF => self.serial_string = Some(parse_descriptor_text(payload)),
            0xFC => self.monitor_name = Some(parse_descriptor_text(payload)),
            0xFD => {
                let max_clock = desc[9] as u32 * 10_000;
                self.range_limits = Some(RangeLimits {
                    min_vfreq_hz: desc[5],
                    max_vfreq_hz: desc[6],
                    min_hfreq_khz: desc[7],
                    max_hfreq_khz: desc[8],
                    max_pixel_clock_khz: (max_clock > 0).then_some(max_clock),
                });
            }
            tag => trace!("EDID display descriptor tag {:#04x}", tag),
        }
    }

    /// Raw EDID bytes (the connector's EDID property)
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Sink advertises the HDMI vendor-specific data block
    pub fn is_hdmi(&self) -> bool {
        self.cea.iter().any(|c| c.hdmi.is_some())
    }

    /// Sink accepts basic audio
    pub fn supports_audio(&self) -> bool {
        self.cea.iter().any(|c| c.basic_audio)
    }

    /// Highest TMDS clock the sink reports, if it reports one
    pub fn max_tmds_clock_khz(&self) -> Option<u32> {
        let forum = self
            .cea
            .iter()
            .filter_map(|c| c.hdmi_forum.as_ref()?.max_tmds_char_rate_khz)
            .max();
        let hdmi = self
            .cea
            .iter()
            .filter_map(|c| c.hdmi.as_ref()?.max_tmds_clock_khz)
            .max();
        match (forum, hdmi) {
            (Some(f), Some(h)) => Some(f.max(h)),
            (f, h) => f.or(h),
        }
    }

    /// All modes in priority order, duplicates removed
    ///
    /// Detailed timings come first; if the sink flags a preferred timing the
    /// first one is marked preferred, otherwise the first native VIC is.
    pub fn modes(&self) -> Vec<DisplayMode> {
        let mut modes = Vec::new();

        for (idx, dtd) in self.detailed_modes.iter().enumerate() {
            let mut m = dtd.clone();
            if idx == 0 && self.preferred_timing {
                m.mode_type |= ModeType::PREFERRED;
            }
            mode::push_unique(&mut modes, m);
        }

        for ext in &self.cea {
            for dtd in &ext.detailed_modes {
                mode::push_unique(&mut modes, dtd.clone());
            }
        }

        let have_preferred = modes.iter().any(|m| m.is_preferred());
        let mut native_marked = false;
        for ext in &self.cea {
            for svd in &ext.svds {
                let Some(mut m) = tables::cea_mode(svd.vic) else {
                    trace!("Unsupported VIC {} in SVD", svd.vic);
                    continue;
                };
                if svd.native && !have_preferred && !native_marked {
                    m.mode_type |= ModeType::PREFERRED;
                    native_marked = true;
                }
                mode::push_unique(&mut modes, m);
            }
        }

        for m in self.standard_modes.iter().chain(self.established_modes.iter()) {
            mode::push_unique(&mut modes, m.clone());
        }

        if !modes.iter().any(|m| m.is_preferred()) {
            if let Some(first) = modes.first_mut() {
                first.mode_type |= ModeType::PREFERRED;
            }
        }

        modes
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Base block: 1080p preferred DTD, name, range limits, two established
    /// and one standard timing.
    pub(crate) fn base_block(extensions: u8) -> Vec<u8> {
        let mut b = vec![0u8; 128];
        b[0..8].copy_from_slice(&EDID_HEADER);
        b[8] = 0x10;
        b[9] = 0xAC;
        b[10] = 0x21;
        b[11] = 0x43;
        b[12] = 0x01;
        b[16] = 10;
        b[17] = 30;
        b[18] = 1;
        b[19] = 3;
        b[20] = 0x80;
        b[21] = 60;
        b[22] = 34;
        b[24] = 0x0A;
        b[0x23] = 0x21;
        b[0x26] = 0x81;
        b[0x27] = 0x80;
        for i in (0x28..0x36).step_by(2) {
            b[i] = 0x01;
            b[i + 1] = 0x01;
        }
        b[0x36..0x48].copy_from_slice(&[
            0x02, 0x3A, 0x80, 0x18, 0x71, 0x38, 0x2D, 0x40, 0x58, 0x2C, 0x45, 0x00, 0x0F,
            0x28, 0x21, 0x00, 0x00, 0x1E,
        ]);
        b[0x48..0x4D].copy_from_slice(&[0x00, 0x00, 0x00, 0xFC, 0x00]);
        b[0x4D..0x5A].copy_from_slice(b"TESTMON\n     ");
        b[0x5A..0x5F].copy_from_slice(&[0x00, 0x00, 0x00, 0xFD, 0x00]);
        b[0x5F..0x6C].copy_from_slice(&[56, 76, 30, 83, 17, 0x0A, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20]);
        b[0x6C..0x71].copy_from_slice(&[0x00, 0x00, 0x00, 0x10, 0x00]);
        b[126] = extensions;
        fix_checksum(&mut b);
        b
    }

    /// CEA block: SVDs (VIC 16 native, 4, 3, 95), HDMI VSDB at 340 MHz,
    /// HF-VSDB at 600 MHz, HDR static metadata, one 720p DTD.
    pub(crate) fn cea_block() -> Vec<u8> {
        let mut b = vec![0u8; 128];
        b[0] = 0x02;
        b[1] = 0x03;
        b[3] = 0x71;
        let data: &[u8] = &[
            0x44, 0x90, 0x04, 0x03, 0x5F, // video
            0x67, 0x03, 0x0C, 0x00, 0x10, 0x00, 0x38, 0x44, // HDMI VSDB
            0x66, 0xD8, 0x5D, 0xC4, 0x01, 0x78, 0x80, // HF-VSDB
            0xE3, 0x06, 0x0D, 0x01, // HDR static metadata
        ];
        b[4..4 + data.len()].copy_from_slice(data);
        let dtd_offset = 4 + data.len();
        b[2] = dtd_offset as u8;
        b[dtd_offset..dtd_offset + 18].copy_from_slice(&[
            0x01, 0x1D, 0x00, 0x72, 0x51, 0xD0, 0x1E, 0x20, 0x6E, 0x28, 0x55, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x1E,
        ]);
        fix_checksum(&mut b);
        b
    }

    pub(crate) fn hdmi_edid() -> Vec<u8> {
        let mut raw = base_block(1);
        raw.extend(cea_block());
        raw
    }

    #[test]
    fn test_empty_edid() {
        assert!(Edid::parse(&[]).is_err());
    }

    #[test]
    fn test_bad_header() {
        let mut raw = base_block(0);
        raw[0] = 0x12;
        assert!(Edid::parse(&raw).is_err());
    }

    #[test]
    fn test_bad_checksum() {
        let mut raw = base_block(0);
        raw[127] = raw[127].wrapping_add(1);
        assert!(Edid::parse(&raw).is_err());
    }

    #[test]
    fn test_base_block_fields() {
        let edid = Edid::parse(&base_block(0)).unwrap();
        assert_eq!(edid.manufacturer, "DEL");
        assert_eq!(edid.product_code, 0x4321);
        assert_eq!(edid.year, 2020);
        assert_eq!((edid.width_mm, edid.height_mm), (600, 340));
        assert_eq!(edid.monitor_name.as_deref(), Some("TESTMON"));
        let range = edid.range_limits.unwrap();
        assert_eq!(range.max_pixel_clock_khz, Some(170_000));
        assert!(!edid.is_hdmi());
        assert_eq!(edid.max_tmds_clock_khz(), None);
    }

    #[test]
    fn test_base_block_modes() {
        let edid = Edid::parse(&base_block(0)).unwrap();
        let modes = edid.modes();
        assert_eq!(modes[0].name, "1920x1080");
        assert!(modes[0].is_preferred());
        assert_eq!(modes[0].clock, 148_500);
        assert!(modes[0].same_timings(&tables::cea_mode(16).unwrap()));
        // 1080p DTD + 1280x1024 standard + 640x480 and 800x600 established
        assert_eq!(modes.len(), 4);
        assert!(modes.iter().any(|m| m.hdisplay == 1280 && m.vdisplay == 1024));
        assert!(modes.iter().any(|m| m.hdisplay == 800 && m.vdisplay == 600));
        assert_eq!(modes.iter().filter(|m| m.is_preferred()).count(), 1);
    }

    #[test]
    fn test_cea_extension() {
        let edid = Edid::parse(&hdmi_edid()).unwrap();
        assert!(edid.is_hdmi());
        assert!(edid.supports_audio());
        assert_eq!(edid.max_tmds_clock_khz(), Some(600_000));
        assert!(edid.hdr.hdr10);
        assert!(edid.hdr.hlg);

        let modes = edid.modes();
        // VIC 16 duplicates the DTD, VIC 4 duplicates the CEA DTD
        assert!(modes.iter().any(|m| m.hdisplay == 3840));
        assert!(modes.iter().any(|m| m.hdisplay == 720 && m.vdisplay == 480));
        assert_eq!(modes.iter().filter(|m| m.hdisplay == 1280 && m.vdisplay == 720).count(), 1);
        assert_eq!(modes.iter().filter(|m| m.is_preferred()).count(), 1);
    }

    #[test]
    fn test_truncated_extension_ignored() {
        let raw = base_block(1);
        let edid = Edid::parse(&raw).unwrap();
        assert!(edid.cea.is_empty());
    }

    #[test]
    fn test_interlaced_detailed_timing() {
        // 1920x1080i: field of 540 lines, vblank 22
        let d = [
            0x01, 0x1D, 0x80, 0x18, 0x71, 0x1C, 0x16, 0x20, 0x58, 0x2C, 0x25, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x9E,
        ];
        let (mode, _) = parse_detailed_timing(&d).unwrap();
        assert!(mode.is_interlaced());
        assert_eq!(mode.vdisplay, 1080);
        assert_eq!(mode.vtotal, 1125);
        assert_eq!(mode.vrefresh(), 60);
    }
}
