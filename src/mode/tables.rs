//! Well-known timing tables
//!
//! CEA-861 VIC timings for short video descriptors, and the subset of
//! VESA DMT timings referenced by EDID established/standard timings.

use super::{DisplayMode, ModeFlags};

struct Timing {
    clock: u32,
    h: [u16; 4],
    v: [u16; 4],
    flags: ModeFlags,
}

const PP: ModeFlags = ModeFlags::PHSYNC.union(ModeFlags::PVSYNC);
const NN: ModeFlags = ModeFlags::NHSYNC.union(ModeFlags::NVSYNC);
const NP: ModeFlags = ModeFlags::NHSYNC.union(ModeFlags::PVSYNC);
const PN: ModeFlags = ModeFlags::PHSYNC.union(ModeFlags::NVSYNC);
const PPI: ModeFlags = PP.union(ModeFlags::INTERLACE);

const fn t(clock: u32, h: [u16; 4], v: [u16; 4], flags: ModeFlags) -> Timing {
    Timing { clock, h, v, flags }
}

/// (VIC, timing)
const CEA_MODES: &[(u8, Timing)] = &[
    (1, t(25_175, [640, 656, 752, 800], [480, 490, 492, 525], NN)),
    (2, t(27_000, [720, 736, 798, 858], [480, 489, 495, 525], NN)),
    (3, t(27_000, [720, 736, 798, 858], [480, 489, 495, 525], NN)),
    (4, t(74_250, [1280, 1390, 1430, 1650], [720, 725, 730, 750], PP)),
    (5, t(74_250, [1920, 2008, 2052, 2200], [1080, 1084, 1094, 1125], PPI)),
    (16, t(148_500, [1920, 2008, 2052, 2200], [1080, 1084, 1089, 1125], PP)),
    (17, t(27_000, [720, 732, 796, 864], [576, 581, 586, 625], NN)),
    (18, t(27_000, [720, 732, 796, 864], [576, 581, 586, 625], NN)),
    (19, t(74_250, [1280, 1720, 1760, 1980], [720, 725, 730, 750], PP)),
    (20, t(74_250, [1920, 2448, 2492, 2640], [1080, 1084, 1094, 1125], PPI)),
    (31, t(148_500, [1920, 2448, 2492, 2640], [1080, 1084, 1089, 1125], PP)),
    (32, t(74_250, [1920, 2558, 2602, 2750], [1080, 1084, 1089, 1125], PP)),
    (33, t(74_250, [1920, 2448, 2492, 2640], [1080, 1084, 1089, 1125], PP)),
    (34, t(74_250, [1920, 2008, 2052, 2200], [1080, 1084, 1089, 1125], PP)),
    (93, t(297_000, [3840, 5116, 5204, 5500], [2160, 2168, 2178, 2250], PP)),
    (94, t(297_000, [3840, 4896, 4984, 5280], [2160, 2168, 2178, 2250], PP)),
    (95, t(297_000, [3840, 4016, 4104, 4400], [2160, 2168, 2178, 2250], PP)),
    (96, t(594_000, [3840, 4896, 4984, 5280], [2160, 2168, 2178, 2250], PP)),
    (97, t(594_000, [3840, 4016, 4104, 4400], [2160, 2168, 2178, 2250], PP)),
];

const DMT_MODES: &[Timing] = &[
    t(25_175, [640, 656, 752, 800], [480, 490, 492, 525], NN),
    t(31_500, [640, 664, 704, 832], [480, 489, 492, 520], NN),
    t(31_500, [640, 656, 720, 840], [480, 481, 484, 500], NN),
    t(36_000, [800, 824, 896, 1024], [600, 601, 603, 625], PP),
    t(40_000, [800, 840, 968, 1056], [600, 601, 605, 628], PP),
    t(50_000, [800, 856, 976, 1040], [600, 637, 643, 666], PP),
    t(49_500, [800, 816, 896, 1056], [600, 601, 604, 625], PP),
    t(65_000, [1024, 1048, 1184, 1344], [768, 771, 777, 806], NN),
    t(75_000, [1024, 1048, 1184, 1328], [768, 771, 777, 806], NN),
    t(78_750, [1024, 1040, 1136, 1312], [768, 769, 772, 800], PP),
    t(108_000, [1152, 1216, 1344, 1600], [864, 865, 868, 900], PP),
    t(74_250, [1280, 1390, 1430, 1650], [720, 725, 730, 750], PP),
    t(83_500, [1280, 1352, 1480, 1680], [800, 803, 809, 831], NP),
    t(108_000, [1280, 1376, 1488, 1800], [960, 961, 964, 1000], PP),
    t(108_000, [1280, 1328, 1440, 1688], [1024, 1025, 1028, 1066], PP),
    t(135_000, [1280, 1296, 1440, 1688], [1024, 1025, 1028, 1066], PP),
    t(85_500, [1366, 1436, 1579, 1792], [768, 771, 774, 798], PP),
    t(106_500, [1440, 1520, 1672, 1904], [900, 903, 909, 934], NP),
    t(108_000, [1600, 1624, 1704, 1800], [900, 901, 904, 1000], PP),
    t(146_250, [1680, 1784, 1960, 2240], [1050, 1053, 1059, 1089], NP),
    t(148_500, [1920, 2008, 2052, 2200], [1080, 1084, 1089, 1125], PP),
    t(154_000, [1920, 1968, 2000, 2080], [1200, 1203, 1209, 1235], PN),
];

/// Established timing bitmap, EDID bytes 0x23..=0x25, MSB first
///
/// Entries with no DMT timing in the table above are `None` and skipped.
pub const ESTABLISHED_TIMINGS: [Option<(u16, u16, u32)>; 17] = [
    None,                     // 720x400@70
    None,                     // 720x400@88
    Some((640, 480, 60)),
    None,                     // 640x480@67 (Apple)
    Some((640, 480, 72)),
    Some((640, 480, 75)),
    Some((800, 600, 56)),
    Some((800, 600, 60)),
    Some((800, 600, 72)),
    Some((800, 600, 75)),
    None,                     // 832x624@75 (Apple)
    None,                     // 1024x768i@87
    Some((1024, 768, 60)),
    Some((1024, 768, 70)),
    Some((1024, 768, 75)),
    Some((1280, 1024, 75)),
    None,                     // 1152x870@75 (Apple)
];

fn to_mode(timing: &Timing) -> DisplayMode {
    DisplayMode::new(timing.clock, timing.h, timing.v, timing.flags)
}

/// Timing for a CEA-861 video identification code
pub fn cea_mode(vic: u8) -> Option<DisplayMode> {
    CEA_MODES
        .iter()
        .find(|(v, _)| *v == vic)
        .map(|(_, timing)| to_mode(timing))
}

/// DMT timing matching size and nominal refresh
///
/// Nominal rates are off by one for some timings (640x480@72 runs at 72.8Hz).
pub fn dmt_mode(width: u16, height: u16, refresh: u32) -> Option<DisplayMode> {
    DMT_MODES.iter().map(to_mode).find(|m| {
        m.hdisplay == width && m.vdisplay == height && m.vrefresh().abs_diff(refresh) <= 1
    })
}

/// Look up a timing by size/refresh, CEA first then DMT
pub fn find_mode(width: u16, height: u16, refresh: u32, interlaced: bool) -> Option<DisplayMode> {
    let cea = CEA_MODES.iter().map(|(_, timing)| to_mode(timing)).find(|m| {
        m.hdisplay == width
            && m.vdisplay == height
            && m.vrefresh() == refresh
            && m.is_interlaced() == interlaced
    });
    if cea.is_some() || interlaced {
        return cea;
    }
    dmt_mode(width, height, refresh)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_table_modes_well_formed() {
        for (vic, timing) in CEA_MODES {
            assert!(to_mode(timing).is_well_formed(), "VIC {}", vic);
        }
        for timing in DMT_MODES {
            assert!(to_mode(timing).is_well_formed());
        }
    }

    #[test]
    fn test_established_entries_resolve() {
        for (w, h, r) in ESTABLISHED_TIMINGS.iter().flatten() {
            assert!(dmt_mode(*w, *h, *r).is_some(), "{}x{}@{}", w, h, r);
        }
    }

    #[test]
    fn test_unknown_vic() {
        assert!(cea_mode(0).is_none());
        assert!(cea_mode(200).is_none());
    }
}
