//! Shared fixtures: a scripted HDMI sink and EDID images

#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use std::sync::{Arc, Mutex};

use hdmi_display::constants::{EDID_BLOCK_SIZE, EDID_HEADER};
use hdmi_display::hw::{ControllerProvider, HdmiController};

#[derive(Debug, Default)]
pub struct Sink {
    pub hpd: bool,
    pub powered: bool,
    pub edid: Option<Vec<u8>>,
    /// Flip a byte of this block on every read
    pub corrupt_block: Option<u8>,
    /// Flip a byte of this block on its first n reads
    pub glitch_block: Option<(u8, u32)>,
    /// Blocks read over DDC, in order
    pub reads: Vec<u8>,
}

pub type SharedSink = Arc<Mutex<Sink>>;

struct ScriptedController {
    index: u32,
    sink: SharedSink,
}

impl HdmiController for ScriptedController {
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
        sink.reads.push(block);
        let edid = sink.edid.as_ref().ok_or_else(|| anyhow!("no sink"))?;
        let offset = block as usize * EDID_BLOCK_SIZE;
        let Some(src) = edid.get(offset..offset + EDID_BLOCK_SIZE) else {
            bail!("no block {}", block);
        };
        buf.copy_from_slice(src);
        if sink.corrupt_block == Some(block) {
            buf[10] ^= 0xFF;
        }
        if let Some((glitch, left)) = sink.glitch_block.as_mut() {
            if *glitch == block && *left > 0 {
                *left -= 1;
                buf[10] ^= 0xFF;
            }
        }
        Ok(())
    }
}

/// One sink per controller index
pub struct ScriptedProvider {
    pub sinks: Vec<SharedSink>,
}

impl ScriptedProvider {
    pub fn new(sinks: Vec<Sink>) -> Arc<Self> {
        Arc::new(Self {
            sinks: sinks.into_iter().map(|s| Arc::new(Mutex::new(s))).collect(),
        })
    }

    pub fn sink(&self, idx: usize) -> std::sync::MutexGuard<'_, Sink> {
        self.sinks[idx].lock().unwrap()
    }
}

impl ControllerProvider for ScriptedProvider {
    fn acquire(&self, ctrl_ref: u32) -> Result<Box<dyn HdmiController>> {
        let sink = self
            .sinks
            .get(ctrl_ref as usize)
            .ok_or_else(|| anyhow!("controller {} missing", ctrl_ref))?;
        Ok(Box::new(ScriptedController {
            index: ctrl_ref,
            sink: Arc::clone(sink),
        }))
    }
}

fn fix_checksum(block: &mut [u8]) {
    let sum = block[..127].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    block[127] = 0u8.wrapping_sub(sum);
}

/// EDID 1.3 base block: "SAM", 880x500 mm, 1080p60 preferred DTD, name "HDMI TV"
pub fn base_block(extensions: u8) -> Vec<u8> {
    let mut b = vec![0u8; 128];
    b[0..8].copy_from_slice(&EDID_HEADER);
    b[8] = 0x4C;
    b[9] = 0x2D;
    b[10] = 0x01;
    b[11] = 0x0F;
    b[16] = 1;
    b[17] = 32;
    b[18] = 1;
    b[19] = 3;
    b[20] = 0x80;
    b[21] = 88;
    b[22] = 50;
    b[24] = 0x0A;
    for i in (0x26..0x36).step_by(2) {
        b[i] = 0x01;
        b[i + 1] = 0x01;
    }
    b[0x36..0x48].copy_from_slice(&[
        0x02, 0x3A, 0x80, 0x18, 0x71, 0x38, 0x2D, 0x40, 0x58, 0x2C, 0x45, 0x00, 0x0F, 0x28,
        0x21, 0x00, 0x00, 0x1E,
    ]);
    b[0x48..0x4D].copy_from_slice(&[0x00, 0x00, 0x00, 0xFC, 0x00]);
    b[0x4D..0x5A].copy_from_slice(b"HDMI TV\n     ");
    b[0x5D] = 0x10;
    b[0x6F] = 0x10;
    b[126] = extensions;
    fix_checksum(&mut b);
    b
}

/// CEA-861 rev 3: VIC 16 (native), 4, 3 and an HDMI VSDB capped at 300 MHz
pub fn cea_block() -> Vec<u8> {
    let mut b = vec![0u8; 128];
    b[0] = 0x02;
    b[1] = 0x03;
    b[3] = 0x40;
    let data: &[u8] = &[
        0x43, 0x90, 0x04, 0x03, // video
        0x67, 0x03, 0x0C, 0x00, 0x10, 0x00, 0x00, 0x3C, // HDMI VSDB
    ];
    b[4..4 + data.len()].copy_from_slice(data);
    b[2] = (4 + data.len()) as u8;
    fix_checksum(&mut b);
    b
}

pub fn tv_edid() -> Vec<u8> {
    let mut raw = base_block(1);
    raw.extend(cea_block());
    raw
}

pub fn plugged_tv() -> Sink {
    Sink {
        hpd: true,
        edid: Some(tv_edid()),
        ..Default::default()
    }
}
