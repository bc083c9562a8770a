//! CEA-861 extension block
//!
//! Data block collection (video, audio, vendor-specific, extended tags)
//! followed by detailed timing descriptors.

use log::trace;

use super::hdr::{self, HdrCapabilities};
use super::parse_detailed_timing;
use crate::constants::{HDMI_FORUM_IEEE_OUI, HDMI_IEEE_OUI};
use crate::mode::DisplayMode;

pub const CEA_EXTENSION_TAG: u8 = 0x02;

const TAG_AUDIO: u8 = 0x01;
const TAG_VIDEO: u8 = 0x02;
const TAG_VENDOR: u8 = 0x03;
const TAG_SPEAKER: u8 = 0x04;
const TAG_EXTENDED: u8 = 0x07;

/// Short video descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortVideoDescriptor {
    pub vic: u8,
    /// Sink's native format
    pub native: bool,
}

impl ShortVideoDescriptor {
    fn decode(byte: u8) -> Self {
        // Bit 7 flags native only for VICs 1-64; 193+ are plain VICs
        if (129..=192).contains(&byte) {
            Self {
                vic: byte & 0x7F,
                native: true,
            }
        } else {
            Self {
                vic: byte,
                native: false,
            }
        }
    }
}

/// HDMI Licensing vendor-specific data block (OUI 00-0C-03)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HdmiVsdb {
    /// CEC physical address (a.b.c.d nibbles)
    pub physical_address: u16,
    pub deep_color_30: bool,
    pub deep_color_36: bool,
    pub deep_color_48: bool,
    pub deep_color_y444: bool,
    pub max_tmds_clock_khz: Option<u32>,
}

/// HDMI Forum vendor-specific data block (OUI C4-5D-D8)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HdmiForumVsdb {
    pub version: u8,
    pub max_tmds_char_rate_khz: Option<u32>,
    pub scdc_present: bool,
}

/// Parsed CEA-861 extension
#[derive(Debug, Clone, Default)]
pub struct CeaExtension {
    pub revision: u8,
    pub underscan: bool,
    pub basic_audio: bool,
    pub ycbcr444: bool,
    pub ycbcr422: bool,
    pub native_dtds: u8,
    pub svds: Vec<ShortVideoDescriptor>,
    pub hdmi: Option<HdmiVsdb>,
    pub hdmi_forum: Option<HdmiForumVsdb>,
    pub detailed_modes: Vec<DisplayMode>,
}

/// Parse a CEA-861 extension block; HDR blocks are folded into `hdr`
pub fn parse_cea_extension(block: &[u8], hdr: &mut HdrCapabilities) -> Option<CeaExtension> {
    if block.len() < 128 || block[0] != CEA_EXTENSION_TAG {
        return None;
    }

    let mut ext = CeaExtension {
        revision: block[1],
        ..Default::default()
    };

    // Byte 2: DTD begin offset (data blocks end before this), 0 = none
    let dtd_offset = block[2] as usize;
    if dtd_offset != 0 && !(4..=127).contains(&dtd_offset) {
        trace!("CEA extension: invalid DTD offset {}", dtd_offset);
        return Some(ext);
    }

    if ext.revision >= 2 {
        let flags = block[3];
        ext.underscan = flags & 0x80 != 0;
        ext.basic_audio = flags & 0x40 != 0;
        ext.ycbcr444 = flags & 0x20 != 0;
        ext.ycbcr422 = flags & 0x10 != 0;
        ext.native_dtds = flags & 0x0F;
    }

    let data_end = if dtd_offset == 0 { 4 } else { dtd_offset };
    if ext.revision >= 3 {
        parse_data_blocks(&block[4..data_end], &mut ext, hdr);
    }

    if dtd_offset != 0 {
        let mut offset = dtd_offset;
        while offset + 18 <= 127 {
            match parse_detailed_timing(&block[offset..offset + 18]) {
                Some((mode, _)) => ext.detailed_modes.push(mode),
                None if block[offset] == 0 && block[offset + 1] == 0 => break,
                None => {}
            }
            offset += 18;
        }
    }

    Some(ext)
}

fn parse_data_blocks(mut data: &[u8], ext: &mut CeaExtension, hdr: &mut HdrCapabilities) {
    while let Some((&header, rest)) = data.split_first() {
        let tag = (header >> 5) & 0x07;
        let length = (header & 0x1F) as usize;
        if length > rest.len() {
            trace!("CEA data block overruns block: tag={}, len={}", tag, length);
            break;
        }
        let payload = &rest[..length];

        match tag {
            TAG_VIDEO => ext
                .svds
                .extend(payload.iter().map(|&b| ShortVideoDescriptor::decode(b))),
            TAG_VENDOR => parse_vendor_block(payload, ext),
            TAG_EXTENDED => hdr::parse_extended_data_block(payload, hdr),
            TAG_AUDIO | TAG_SPEAKER => {
                trace!("CEA audio/speaker block: len={}", length);
            }
            _ => {
                trace!("CEA data block: tag={}, len={}", tag, length);
            }
        }

        data = &rest[length..];
    }
}

fn parse_vendor_block(payload: &[u8], ext: &mut CeaExtension) {
    if payload.len() < 3 {
        return;
    }
    let oui = payload[0] as u32 | (payload[1] as u32) << 8 | (payload[2] as u32) << 16;

    match oui {
        HDMI_IEEE_OUI if payload.len() >= 5 => {
            let dc = payload.get(5).copied().unwrap_or(0);
            let max_tmds = payload.get(6).copied().unwrap_or(0) as u32 * 5_000;
            ext.hdmi = Some(HdmiVsdb {
                physical_address: u16::from_be_bytes([payload[3], payload[4]]),
                deep_color_48: dc & 0x40 != 0,
                deep_color_36: dc & 0x20 != 0,
                deep_color_30: dc & 0x10 != 0,
                deep_color_y444: dc & 0x08 != 0,
                max_tmds_clock_khz: (max_tmds > 0).then_some(max_tmds),
            });
        }
        HDMI_FORUM_IEEE_OUI if payload.len() >= 5 => {
            let rate = payload[4] as u32 * 5_000;
            ext.hdmi_forum = Some(HdmiForumVsdb {
                version: payload[3],
                max_tmds_char_rate_khz: (rate > 0).then_some(rate),
                scdc_present: payload.get(5).map(|b| b & 0x80 != 0).unwrap_or(false),
            });
        }
        _ => trace!("Vendor-specific block OUI {:06x}", oui),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_svd_decode() {
        assert_eq!(
            ShortVideoDescriptor::decode(0x90),
            ShortVideoDescriptor { vic: 16, native: true }
        );
        assert_eq!(
            ShortVideoDescriptor::decode(0x04),
            ShortVideoDescriptor { vic: 4, native: false }
        );
        // VIC 193+ uses all 8 bits
        assert_eq!(
            ShortVideoDescriptor::decode(200),
            ShortVideoDescriptor { vic: 200, native: false }
        );
    }

    #[test]
    fn test_parse_fixture() {
        let block = crate::edid::tests::cea_block();
        let mut hdr = HdrCapabilities::default();
        let ext = parse_cea_extension(&block, &mut hdr).unwrap();
        assert_eq!(ext.revision, 3);
        assert!(ext.basic_audio);
        assert_eq!(ext.native_dtds, 1);
        assert_eq!(ext.svds.len(), 4);
        let hdmi = ext.hdmi.unwrap();
        assert_eq!(hdmi.physical_address, 0x1000);
        assert!(hdmi.deep_color_36);
        assert_eq!(hdmi.max_tmds_clock_khz, Some(340_000));
        let forum = ext.hdmi_forum.unwrap();
        assert_eq!(forum.max_tmds_char_rate_khz, Some(600_000));
        assert!(forum.scdc_present);
        assert_eq!(ext.detailed_modes.len(), 1);
        assert!(hdr.supports_hdr());
    }

    #[test]
    fn test_overrunning_data_block() {
        let mut block = vec![0u8; 128];
        block[0] = CEA_EXTENSION_TAG;
        block[1] = 3;
        block[2] = 6;
        // Video block claiming 10 bytes inside a 2 byte window
        block[4] = 0x4A;
        let mut hdr = HdrCapabilities::default();
        let ext = parse_cea_extension(&block, &mut hdr).unwrap();
        assert!(ext.svds.is_empty());
    }
}
