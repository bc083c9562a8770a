//! DRM hotplug uevents
//!
//! Monitors udev for DRM connector changes (monitor plug/unplug). The
//! kernel's uevent is the interrupt that kicks the per-display HPD work.

use anyhow::{Context, Result};
use log::{debug, info};
use std::os::unix::io::{AsRawFd, RawFd};

/// A `HOTPLUG=1` uevent from the DRM subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrmUevent {
    /// Connector id when the kernel names one (`CONNECTOR=<id>`)
    pub connector: Option<u32>,
}

impl DrmUevent {
    /// Does this event concern the given connector id
    pub fn affects(&self, connector_id: u32) -> bool {
        self.connector.map_or(true, |id| id == connector_id)
    }
}

/// udev-based hotplug monitor for DRM devices
pub struct HotplugMonitor {
    socket: udev::MonitorSocket,
}

impl HotplugMonitor {
    /// Create a new hotplug monitor for DRM subsystem
    pub fn new() -> Result<Self> {
        let socket = udev::MonitorBuilder::new()
            .context("Failed to create udev monitor builder")?
            .match_subsystem("drm")
            .context("Failed to match drm subsystem")?
            .listen()
            .context("Failed to start udev monitor")?;

        info!("DRM hotplug monitor initialized");
        Ok(Self { socket })
    }

    /// Get the raw file descriptor for polling
    pub fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }

    /// Drain pending uevents (non-blocking)
    pub fn poll(&mut self) -> Vec<DrmUevent> {
        let mut events = Vec::new();
        for event in self.socket.iter() {
            if event.action().map(|a| a == "change").unwrap_or(false)
                && event
                    .property_value("HOTPLUG")
                    .map(|v| v == "1")
                    .unwrap_or(false)
            {
                let connector = event
                    .property_value("CONNECTOR")
                    .and_then(|v| v.to_str())
                    .and_then(|v| v.parse().ok());
                debug!(
                    "DRM hotplug uevent: {:?} connector={:?}",
                    event.devpath().to_string_lossy(),
                    connector
                );
                events.push(DrmUevent { connector });
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uevent_affects() {
        let any = DrmUevent { connector: None };
        assert!(any.affects(42));
        let one = DrmUevent { connector: Some(42) };
        assert!(one.affects(42));
        assert!(!one.affects(43));
    }
}
