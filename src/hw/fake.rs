//! In-memory controller for unit tests

use anyhow::{anyhow, bail, Result};
use std::sync::{Arc, Mutex};

use super::{ControllerProvider, HdmiController};
use crate::constants::EDID_BLOCK_SIZE;

/// Sink and PHY state shared between a test and its controllers
#[derive(Debug, Default)]
pub(crate) struct FakeSink {
    pub hpd: bool,
    pub powered: bool,
    pub tpg: bool,
    pub edid: Option<Vec<u8>>,
    pub edid_reads: usize,
}

pub(crate) type SharedSink = Arc<Mutex<FakeSink>>;

pub(crate) struct FakeController {
    index: u32,
    sink: SharedSink,
}

impl HdmiController for FakeController {
    fn index(&self) -> u32 {
        self.index
    }

    fn set_power(&mut self, on: bool) -> Result<()> {
        self.sink.lock().unwrap().powered = on;
        Ok(())
    }

    fn hpd_asserted(&mut self) -> Result<bool> {
        Ok(self.sink.lock().unwrap().hpd)
    }

    fn read_edid_block(&mut self, block: u8, buf: &mut [u8; EDID_BLOCK_SIZE]) -> Result<()> {
        let mut sink = self.sink.lock().unwrap();
        sink.edid_reads += 1;
        let edid = sink.edid.as_ref().ok_or_else(|| anyhow!("DDC NAK"))?;
        let offset = block as usize * EDID_BLOCK_SIZE;
        let Some(src) = edid.get(offset..offset + EDID_BLOCK_SIZE) else {
            bail!("no EDID block {}", block);
        };
        buf.copy_from_slice(src);
        Ok(())
    }

    /// PLL steps of 10 kHz
    fn round_pixel_clock(&self, khz: u32) -> u32 {
        (khz + 5) / 10 * 10
    }

    fn set_test_pattern(&mut self, enable: bool) -> Result<()> {
        self.sink.lock().unwrap().tpg = enable;
        Ok(())
    }
}

/// Controllers 0..count, all wired to the same sink
pub(crate) struct FakeProvider {
    pub sink: SharedSink,
    pub count: u32,
}

impl FakeProvider {
    pub(crate) fn new(sink: FakeSink) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
            count: 2,
        }
    }
}

impl ControllerProvider for FakeProvider {
    fn acquire(&self, ctrl_ref: u32) -> Result<Box<dyn HdmiController>> {
        if ctrl_ref >= self.count {
            bail!("controller {} not present", ctrl_ref);
        }
        Ok(Box::new(FakeController {
            index: ctrl_ref,
            sink: Arc::clone(&self.sink),
        }))
    }
}
