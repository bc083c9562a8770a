//! Global constants for hdmi-display
//!
//! Consolidates timing limits, EDID layout values and hot-plug defaults
//! to eliminate magic numbers throughout the codebase.

// ============================================================================
// Hot-plug Detection
// ============================================================================

/// Time the HPD level must stay stable before a change is reported
pub const HPD_DEBOUNCE_MS: u64 = 100;

/// HPD sampling interval when nothing is pending
pub const HPD_POLL_INTERVAL_MS: u64 = 500;

/// Main loop sleep between udev/HPD event checks in the daemon
pub const EVENT_LOOP_SLEEP_MS: u64 = 50;

// ============================================================================
// Display Limits
// ============================================================================

/// Maximum horizontal resolution the display pipe accepts
pub const MAX_WIDTH: u16 = 4096;

/// Maximum vertical resolution the display pipe accepts
pub const MAX_HEIGHT: u16 = 2160;

/// Lowest TMDS pixel clock (kHz) an HDMI link carries
pub const MIN_PIXEL_CLOCK_KHZ: u32 = 25_000;

/// HDMI 1.4 TMDS clock ceiling (kHz)
pub const HDMI14_MAX_PIXEL_CLOCK_KHZ: u32 = 340_000;

/// HDMI 2.0 TMDS character rate ceiling (kHz)
pub const HDMI20_MAX_PIXEL_CLOCK_KHZ: u32 = 600_000;

// ============================================================================
// EDID Layout
// ============================================================================

/// Size of one EDID block
pub const EDID_BLOCK_SIZE: usize = 128;

/// Fixed 8-byte header of the base EDID block
pub const EDID_HEADER: [u8; 8] = [0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00];

/// Extension blocks read beyond the base block
pub const EDID_MAX_EXTENSIONS: usize = 3;

/// Read attempts for a block that fails its checksum
pub const EDID_READ_RETRIES: usize = 3;

/// IEEE OUI of the HDMI Licensing LLC vendor-specific data block
pub const HDMI_IEEE_OUI: u32 = 0x000C03;

/// IEEE OUI of the HDMI Forum vendor-specific data block
pub const HDMI_FORUM_IEEE_OUI: u32 = 0xC45DD8;
