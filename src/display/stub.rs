//! Display used when HDMI support is compiled out
//!
//! Every callback succeeds and reports nothing connected.

use super::{Connector, ConnectorStatus, DisplayInfo, DisplayOps, EncoderId};
use crate::error::Result;
use crate::mode::{DisplayMode, ModeStatus};

#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledDisplay;

impl DisplayOps for DisabledDisplay {
    fn dev_init(&self) -> Result<()> {
        Ok(())
    }

    fn dev_deinit(&self) -> Result<()> {
        Ok(())
    }

    fn drm_init(&self, _encoder: EncoderId) -> Result<()> {
        Ok(())
    }

    fn drm_deinit(&self) -> Result<()> {
        Ok(())
    }

    fn get_info(&self) -> Result<DisplayInfo> {
        Ok(DisplayInfo::default())
    }

    fn connector_post_init(&self, _connector: &mut Connector, _info: &DisplayInfo) -> Result<()> {
        Ok(())
    }

    fn connector_pre_deinit(&self, _connector: &mut Connector) -> Result<()> {
        Ok(())
    }

    fn connector_detect(&self, connector: &mut Connector, _force: bool) -> ConnectorStatus {
        connector.status = ConnectorStatus::Disconnected;
        ConnectorStatus::Disconnected
    }

    fn connector_get_modes(&self, _connector: &mut Connector) -> usize {
        0
    }

    fn mode_valid(&self, _connector: &Connector, _mode: &DisplayMode) -> ModeStatus {
        ModeStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::ConnectorId;

    #[test]
    fn test_disabled_display() {
        let d = DisabledDisplay;
        let mut c = Connector::new(ConnectorId(7));
        assert!(d.dev_init().is_ok());
        assert!(d.drm_init(EncoderId(1)).is_ok());
        assert_eq!(d.connector_detect(&mut c, true), ConnectorStatus::Disconnected);
        assert_eq!(d.connector_get_modes(&mut c), 0);
        assert_eq!(d.get_info().unwrap(), DisplayInfo::default());
        let mode = crate::mode::tables::cea_mode(16).unwrap();
        assert_eq!(d.mode_valid(&c, &mode), ModeStatus::Ok);
        assert!(d.drm_deinit().is_ok());
        assert!(d.dev_deinit().is_ok());
    }
}
