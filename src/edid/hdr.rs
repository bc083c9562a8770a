//! HDR and colorimetry capabilities
//!
//! Decodes the CEA-861 extended data blocks (tag 7) that describe HDR
//! static metadata, colorimetry and YCbCr 4:2:0 support, and builds the
//! `HDR_OUTPUT_METADATA` blob matching a sink's capabilities.

use log::{debug, info, trace};

const EXT_COLORIMETRY: u8 = 0x05;
const EXT_HDR_STATIC_METADATA: u8 = 0x06;
const EXT_YCBCR420_VIDEO: u8 = 0x0E;
const EXT_YCBCR420_CAPABILITY_MAP: u8 = 0x0F;

/// HDR capabilities detected from the sink's EDID
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HdrCapabilities {
    /// SMPTE ST.2084 (PQ) transfer function
    pub hdr10: bool,
    /// Hybrid Log-Gamma
    pub hlg: bool,
    /// Static metadata type 1 descriptor
    pub static_metadata_type1: bool,
    pub rec2020: bool,
    pub dci_p3: bool,
    /// Some VICs may be sent as YCbCr 4:2:0
    pub ycbcr420: bool,
    /// Desired content max luminance (cd/m2)
    pub max_luminance: Option<u16>,
    /// Desired content max frame-average luminance (cd/m2)
    pub max_fall: Option<u16>,
    /// Raw min luminance code value
    pub min_luminance: Option<u8>,
}

impl HdrCapabilities {
    pub fn supports_hdr(&self) -> bool {
        self.hdr10 || self.hlg
    }

    pub fn supports_wide_gamut(&self) -> bool {
        self.rec2020 || self.dci_p3
    }

    pub fn log(&self) {
        if self.supports_hdr() {
            info!(
                "HDR supported: HDR10={}, HLG={}, Rec2020={}, DCI-P3={}",
                self.hdr10, self.hlg, self.rec2020, self.dci_p3
            );
            if let Some(lum) = self.max_luminance {
                info!("  Max luminance: {} cd/m2", lum);
            }
        } else {
            debug!("HDR not supported by sink");
        }
    }
}

/// Luminance code value to cd/m2: 50 * 2^(cv/32)
fn decode_luminance(cv: u8) -> Option<u16> {
    (cv > 0).then(|| (50.0 * 2.0_f32.powf(cv as f32 / 32.0)) as u16)
}

/// Parse an extended data block payload (first byte is the extended tag)
pub(crate) fn parse_extended_data_block(data: &[u8], caps: &mut HdrCapabilities) {
    let Some((&extended_tag, payload)) = data.split_first() else {
        return;
    };

    match extended_tag {
        EXT_HDR_STATIC_METADATA => parse_hdr_static_metadata(payload, caps),
        EXT_COLORIMETRY => parse_colorimetry(payload, caps),
        EXT_YCBCR420_VIDEO | EXT_YCBCR420_CAPABILITY_MAP => caps.ycbcr420 = true,
        _ => {
            trace!(
                "Extended data block: tag={:#04x}, len={}",
                extended_tag,
                payload.len()
            );
        }
    }
}

fn parse_hdr_static_metadata(data: &[u8], caps: &mut HdrCapabilities) {
    let Some(&eotf) = data.first() else {
        return;
    };

    // Bit 2: SMPTE ST 2084, bit 3: HLG
    caps.hdr10 = eotf & 0x04 != 0;
    caps.hlg = eotf & 0x08 != 0;
    caps.static_metadata_type1 = data.get(1).map(|d| d & 0x01 != 0).unwrap_or(false);
    caps.max_luminance = data.get(2).copied().and_then(decode_luminance);
    caps.max_fall = data.get(3).copied().and_then(decode_luminance);
    caps.min_luminance = data.get(4).copied();

    debug!(
        "HDR EOTF support: SDR={}, PQ={}, HLG={}",
        eotf & 0x01 != 0,
        caps.hdr10,
        caps.hlg
    );
}

fn parse_colorimetry(data: &[u8], caps: &mut HdrCapabilities) {
    let Some(&flags) = data.first() else {
        return;
    };

    // Bits 5-7: BT2020 cYCC / YCC / RGB
    caps.rec2020 = flags & 0xE0 != 0;
    // Byte 1 bit 7: DCI-P3
    caps.dci_p3 = data.get(1).map(|f| f & 0x80 != 0).unwrap_or(false);

    debug!("Colorimetry: Rec2020={}, DCI-P3={}", caps.rec2020, caps.dci_p3);
}

/// Transfer function signalled in the static metadata infoframe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Eotf {
    Sdr = 0,
    /// SMPTE ST 2084
    Pq = 2,
    Hlg = 3,
}

/// HDMI Static Metadata Type 1 (CTA-861-G infoframe payload)
#[repr(C)]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HdmiMetadataType1 {
    pub eotf: u8,
    /// Static Metadata Descriptor ID
    pub metadata_type: u8,
    /// Display primaries (x, y) for R, G, B in 0.00002 units
    pub display_primaries: [[u16; 2]; 3],
    /// White point (x, y) in 0.00002 units
    pub white_point: [u16; 2],
    /// cd/m2
    pub max_display_mastering_luminance: u16,
    /// 0.0001 cd/m2
    pub min_display_mastering_luminance: u16,
    pub max_cll: u16,
    pub max_fall: u16,
}

/// Layout of the kernel's `struct hdr_output_metadata`
#[repr(C)]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HdrOutputMetadata {
    /// 0 = HDMI_STATIC_METADATA_TYPE1
    pub metadata_type: u32,
    pub hdmi_type1: HdmiMetadataType1,
}

const REC2020_PRIMARIES: [[u16; 2]; 3] = [[35400, 14600], [8500, 39850], [6550, 2300]];
const REC709_PRIMARIES: [[u16; 2]; 3] = [[32000, 16500], [15000, 30000], [7500, 3000]];
const D65_WHITE_POINT: [u16; 2] = [15635, 16450];

/// Size of the kernel struct including tail padding
const HDR_OUTPUT_METADATA_SIZE: usize = 32;

impl HdrOutputMetadata {
    /// Metadata for the best transfer function the sink accepts
    ///
    /// PQ is preferred over HLG. Luminance comes from the sink's desired
    /// content levels when it reports them.
    pub fn for_sink(caps: &HdrCapabilities) -> Option<Self> {
        let eotf = if caps.hdr10 {
            Eotf::Pq
        } else if caps.hlg {
            Eotf::Hlg
        } else {
            return None;
        };
        let max_cll = caps.max_luminance.unwrap_or(1000);
        let max_fall = caps.max_fall.unwrap_or(max_cll.min(400));
        Some(Self {
            metadata_type: 0,
            hdmi_type1: HdmiMetadataType1 {
                eotf: eotf as u8,
                metadata_type: 0,
                display_primaries: if caps.rec2020 {
                    REC2020_PRIMARIES
                } else {
                    REC709_PRIMARIES
                },
                white_point: D65_WHITE_POINT,
                max_display_mastering_luminance: max_cll,
                min_display_mastering_luminance: 1,
                max_cll,
                max_fall,
            },
        })
    }

    pub fn eotf(&self) -> Eotf {
        match self.hdmi_type1.eotf {
            2 => Eotf::Pq,
            3 => Eotf::Hlg,
            _ => Eotf::Sdr,
        }
    }

    /// Property blob bytes (native endian, as the kernel reads them)
    pub fn to_bytes(&self) -> Vec<u8> {
        let m = &self.hdmi_type1;
        let mut out = Vec::with_capacity(HDR_OUTPUT_METADATA_SIZE);
        out.extend_from_slice(&self.metadata_type.to_ne_bytes());
        out.push(m.eotf);
        out.push(m.metadata_type);
        let words = m
            .display_primaries
            .iter()
            .flatten()
            .chain(m.white_point.iter())
            .chain([
                &m.max_display_mastering_luminance,
                &m.min_display_mastering_luminance,
                &m.max_cll,
                &m.max_fall,
            ]);
        for w in words {
            out.extend_from_slice(&w.to_ne_bytes());
        }
        out.resize(HDR_OUTPUT_METADATA_SIZE, 0);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_block() {
        let mut caps = HdrCapabilities::default();
        parse_extended_data_block(&[], &mut caps);
        assert_eq!(caps, HdrCapabilities::default());
    }

    #[test]
    fn test_static_metadata() {
        let mut caps = HdrCapabilities::default();
        parse_extended_data_block(&[0x06, 0x05, 0x01, 0x60, 0x40, 0x10], &mut caps);
        assert!(caps.hdr10);
        assert!(!caps.hlg);
        assert!(caps.static_metadata_type1);
        assert_eq!(caps.max_luminance, Some(400));
        assert_eq!(caps.max_fall, Some(200));
        assert_eq!(caps.min_luminance, Some(0x10));
    }

    #[test]
    fn test_colorimetry() {
        let mut caps = HdrCapabilities::default();
        parse_extended_data_block(&[0x05, 0x80, 0x80], &mut caps);
        assert!(caps.rec2020);
        assert!(caps.dci_p3);
        assert!(caps.supports_wide_gamut());
        assert!(!caps.supports_hdr());
    }

    #[test]
    fn test_output_metadata_for_sink() {
        assert!(HdrOutputMetadata::for_sink(&HdrCapabilities::default()).is_none());

        let caps = HdrCapabilities {
            hdr10: true,
            hlg: true,
            rec2020: true,
            max_luminance: Some(600),
            ..Default::default()
        };
        let meta = HdrOutputMetadata::for_sink(&caps).unwrap();
        assert_eq!(meta.eotf(), Eotf::Pq);
        assert_eq!(meta.hdmi_type1.display_primaries, REC2020_PRIMARIES);
        assert_eq!(meta.hdmi_type1.max_cll, 600);
        assert_eq!(meta.hdmi_type1.max_fall, 400);

        let hlg_only = HdrCapabilities {
            hlg: true,
            ..Default::default()
        };
        let meta = HdrOutputMetadata::for_sink(&hlg_only).unwrap();
        assert_eq!(meta.eotf(), Eotf::Hlg);
        assert_eq!(meta.hdmi_type1.display_primaries, REC709_PRIMARIES);
    }

    #[test]
    fn test_output_metadata_bytes() {
        let caps = HdrCapabilities {
            hdr10: true,
            ..Default::default()
        };
        let bytes = HdrOutputMetadata::for_sink(&caps).unwrap().to_bytes();
        assert_eq!(bytes.len(), std::mem::size_of::<HdrOutputMetadata>());
        assert_eq!(&bytes[0..4], &0u32.to_ne_bytes());
        assert_eq!(bytes[4], Eotf::Pq as u8);
        assert_eq!(&bytes[6..8], &32000u16.to_ne_bytes());
        assert_eq!(&bytes[22..24], &1000u16.to_ne_bytes());
    }
}
