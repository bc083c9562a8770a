//! DRM-backed HDMI controller
//!
//! Opens a DRM device (/dev/dri/card*) and exposes each HDMI connector
//! as an [`HdmiController`]: HPD comes from the connector state, EDID from
//! the connector's `EDID` property blob, PHY power from `DPMS`.

use anyhow::{anyhow, bail, Context, Result};
use drm::control::{connector, property, Device as ControlDevice, RawResourceHandle, ResourceHandles};
use drm::Device as BasicDevice;
use log::{debug, info, warn};
use std::fs::{File, OpenOptions};
use std::os::unix::io::{AsFd, BorrowedFd};
use std::path::Path;
use std::sync::Arc;

use super::{ControllerProvider, HdmiController};
use crate::constants::{EDID_BLOCK_SIZE, HDMI20_MAX_PIXEL_CLOCK_KHZ, MIN_PIXEL_CLOCK_KHZ};
use crate::mode::DisplayMode;

const DPMS_ON: u64 = 0;
const DPMS_OFF: u64 = 3;

/// DRM device wrapper
pub struct Device {
    file: File,
    resources: ResourceHandles,
}

// Trait implementations required by drm crate
impl AsFd for Device {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl BasicDevice for Device {}
impl ControlDevice for Device {}

/// Is this an HDMI connector type
pub fn is_hdmi_connector(interface: connector::Interface) -> bool {
    matches!(
        interface,
        connector::Interface::HDMIA | connector::Interface::HDMIB
    )
}

/// Kernel-style connector name, e.g. `HDMI-A-1`
pub fn connector_name(info: &connector::Info) -> String {
    let kind = match info.interface() {
        connector::Interface::HDMIA => "HDMI-A",
        connector::Interface::HDMIB => "HDMI-B",
        _ => "Unknown",
    };
    format!("{}-{}", kind, info.interface_id())
}

/// Numeric DRM object id of a connector
pub fn connector_id(handle: connector::Handle) -> u32 {
    RawResourceHandle::from(handle).get()
}

impl Device {
    /// Open DRM device
    ///
    /// # Arguments
    /// * `path` - Device path (e.g., "/dev/dri/card0")
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening DRM device: {}", path.display());

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("Cannot open DRM device {}", path.display()))?;

        // Borrowing wrapper so resources can be queried before Self exists
        struct TempDevice<'a>(&'a File);
        impl AsFd for TempDevice<'_> {
            fn as_fd(&self) -> BorrowedFd<'_> {
                self.0.as_fd()
            }
        }
        impl BasicDevice for TempDevice<'_> {}
        impl ControlDevice for TempDevice<'_> {}

        let resources = TempDevice(&file)
            .resource_handles()
            .context("Failed to get DRM resources")?;

        info!(
            "DRM resources: connectors={}, crtcs={}, encoders={}",
            resources.connectors().len(),
            resources.crtcs().len(),
            resources.encoders().len()
        );

        Ok(Self { file, resources })
    }

    /// Get connector info
    pub fn get_connector(&self, handle: connector::Handle) -> Result<connector::Info> {
        ControlDevice::get_connector(self, handle, false)
            .with_context(|| format!("Failed to get connector {:?} info", handle))
    }

    /// HDMI connectors in kernel enumeration order
    pub fn hdmi_connectors(&self) -> Vec<(connector::Handle, connector::Info)> {
        let mut result = Vec::new();
        for &handle in self.resources.connectors() {
            match self.get_connector(handle) {
                Ok(info) if is_hdmi_connector(info.interface()) => result.push((handle, info)),
                Ok(_) => {}
                Err(e) => warn!("{:#}", e),
            }
        }
        result
    }

    /// Find a connector property by name
    fn find_property(
        &self,
        handle: connector::Handle,
        name: &str,
    ) -> Result<Option<(property::Handle, property::RawValue)>> {
        let props = self
            .get_properties(handle)
            .with_context(|| format!("Failed to get properties of {:?}", handle))?;
        let (ids, values) = props.as_props_and_values();
        for (&id, &value) in ids.iter().zip(values.iter()) {
            let info = self.get_property(id)?;
            if info.name().to_bytes() == name.as_bytes() {
                return Ok(Some((id, value)));
            }
        }
        Ok(None)
    }

    /// Raw EDID blob of a connector, if the kernel exposes one
    pub fn edid_blob(&self, handle: connector::Handle) -> Result<Option<Vec<u8>>> {
        match self.find_property(handle, "EDID")? {
            Some((_, blob_id)) if blob_id != 0 => {
                let blob = self
                    .get_property_blob(blob_id)
                    .with_context(|| format!("Failed to read EDID blob {}", blob_id))?;
                Ok(Some(blob))
            }
            _ => Ok(None),
        }
    }

    /// Set connector DPMS state
    ///
    /// Without DRM master the kernel refuses; that is reported as Ok(false).
    pub fn set_dpms(&self, handle: connector::Handle, on: bool) -> Result<bool> {
        let Some((prop, _)) = self.find_property(handle, "DPMS")? else {
            return Ok(false);
        };
        let value = if on { DPMS_ON } else { DPMS_OFF };
        match self.set_property(handle, prop, value) {
            Ok(()) => Ok(true),
            Err(e) if matches!(e.raw_os_error(), Some(libc::EACCES) | Some(libc::EPERM)) => {
                debug!("DPMS on {:?} needs DRM master, skipping", handle);
                Ok(false)
            }
            Err(e) => Err(anyhow!("Failed to set DPMS on {:?}: {}", handle, e)),
        }
    }
}

/// One HDMI connector seen as a controller
pub struct DrmController {
    device: Arc<Device>,
    handle: connector::Handle,
    index: u32,
    max_pixel_clock_khz: u32,
    edid_cache: Vec<u8>,
}

impl DrmController {
    pub fn handle(&self) -> connector::Handle {
        self.handle
    }
}

impl HdmiController for DrmController {
    fn index(&self) -> u32 {
        self.index
    }

    fn set_power(&mut self, on: bool) -> Result<()> {
        if self.device.set_dpms(self.handle, on)? {
            debug!("Connector {:?} DPMS {}", self.handle, if on { "on" } else { "off" });
        }
        Ok(())
    }

    fn hpd_asserted(&mut self) -> Result<bool> {
        let info = self.device.get_connector(self.handle)?;
        Ok(info.state() == connector::State::Connected)
    }

    fn read_edid_block(&mut self, block: u8, buf: &mut [u8; EDID_BLOCK_SIZE]) -> Result<()> {
        // Block 0 starts a new read; later blocks come from the same blob
        if block == 0 || self.edid_cache.is_empty() {
            self.edid_cache = self
                .device
                .edid_blob(self.handle)?
                .ok_or_else(|| anyhow!("Connector {:?} has no EDID", self.handle))?;
        }
        let offset = block as usize * EDID_BLOCK_SIZE;
        let Some(src) = self.edid_cache.get(offset..offset + EDID_BLOCK_SIZE) else {
            bail!(
                "EDID block {} beyond blob ({} bytes)",
                block,
                self.edid_cache.len()
            );
        };
        buf.copy_from_slice(src);
        Ok(())
    }

    fn pixel_clock_range(&self) -> (u32, u32) {
        (MIN_PIXEL_CLOCK_KHZ, self.max_pixel_clock_khz)
    }
}

/// Maps controller index N to the N-th HDMI connector of a DRM device
pub struct DrmControllerProvider {
    device: Arc<Device>,
    connectors: Vec<connector::Handle>,
    max_pixel_clock_khz: u32,
}

impl DrmControllerProvider {
    pub fn new(device: Arc<Device>) -> Self {
        let connectors: Vec<_> = device
            .hdmi_connectors()
            .into_iter()
            .map(|(handle, info)| {
                info!("HDMI controller candidate: {} ({:?})", connector_name(&info), handle);
                handle
            })
            .collect();
        Self {
            device,
            connectors,
            max_pixel_clock_khz: HDMI20_MAX_PIXEL_CLOCK_KHZ,
        }
    }

    /// Number of HDMI connectors found
    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    /// Connector handle bound to a controller index
    pub fn connector(&self, ctrl_ref: u32) -> Option<connector::Handle> {
        self.connectors.get(ctrl_ref as usize).copied()
    }

    /// Modes the kernel lists for the connector behind a controller index
    pub fn kernel_modes(&self, ctrl_ref: u32) -> Result<Vec<DisplayMode>> {
        let handle = self
            .connector(ctrl_ref)
            .ok_or_else(|| anyhow!("No HDMI connector for controller {}", ctrl_ref))?;
        let info = self.device.get_connector(handle)?;
        Ok(info.modes().iter().map(DisplayMode::from).collect())
    }

    /// DRM object ids (connector, encoder) behind a controller index
    ///
    /// The encoder is the one currently driving the connector, else the
    /// first one it can use (0 if none).
    pub fn object_ids(&self, ctrl_ref: u32) -> Option<(u32, u32)> {
        let handle = self.connector(ctrl_ref)?;
        let info = match self.device.get_connector(handle) {
            Ok(info) => info,
            Err(e) => {
                warn!("{:#}", e);
                return None;
            }
        };
        let encoder = info
            .current_encoder()
            .or_else(|| info.encoders().first().copied())
            .map(|e| RawResourceHandle::from(e).get())
            .unwrap_or(0);
        Some((connector_id(handle), encoder))
    }
}

impl ControllerProvider for DrmControllerProvider {
    fn acquire(&self, ctrl_ref: u32) -> Result<Box<dyn HdmiController>> {
        let handle = self
            .connector(ctrl_ref)
            .ok_or_else(|| anyhow!("No HDMI connector for controller {}", ctrl_ref))?;
        Ok(Box::new(DrmController {
            device: Arc::clone(&self.device),
            handle,
            index: ctrl_ref,
            max_pixel_clock_khz: self.max_pixel_clock_khz,
            edid_cache: Vec::new(),
        }))
    }
}
