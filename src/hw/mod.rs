//! HDMI controller / PHY binding
//!
//! A display reaches its hardware only through [`HdmiController`]. The
//! [`ControllerProvider`] resolves the controller reference from the
//! configuration to a concrete controller at `dev_init` time.

#[cfg(target_os = "linux")]
pub mod drm;
#[cfg(target_os = "linux")]
pub mod hotplug;

#[cfg(test)]
pub(crate) mod fake;

use anyhow::Result;

use crate::constants::{EDID_BLOCK_SIZE, HDMI14_MAX_PIXEL_CLOCK_KHZ, MIN_PIXEL_CLOCK_KHZ};

/// One HDMI controller instance with its PHY
pub trait HdmiController: Send {
    /// Controller instance id
    fn index(&self) -> u32;

    /// Power the PHY/link up or down
    fn set_power(&mut self, on: bool) -> Result<()>;

    /// Current (undebounced) hot-plug detect level
    fn hpd_asserted(&mut self) -> Result<bool>;

    /// Read one 128-byte EDID block over DDC
    fn read_edid_block(&mut self, block: u8, buf: &mut [u8; EDID_BLOCK_SIZE]) -> Result<()>;

    /// Supported pixel clock range in kHz (min, max)
    fn pixel_clock_range(&self) -> (u32, u32) {
        (MIN_PIXEL_CLOCK_KHZ, HDMI14_MAX_PIXEL_CLOCK_KHZ)
    }

    /// Closest pixel clock (kHz) the PHY PLL can produce
    fn round_pixel_clock(&self, khz: u32) -> u32 {
        khz
    }

    /// Enable or disable the built-in test pattern generator
    fn set_test_pattern(&mut self, _enable: bool) -> Result<()> {
        Err(anyhow::anyhow!("test pattern generator not available"))
    }
}

/// Resolves controller references to controllers
pub trait ControllerProvider: Send + Sync {
    fn acquire(&self, ctrl_ref: u32) -> Result<Box<dyn HdmiController>>;
}
