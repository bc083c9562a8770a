//! hdmi-display - HDMI display driver interface
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │        Display manager (main loop)       │
//! ├──────────────────────────────────────────┤
//! │  DisplayRegistry → HdmiDisplay (ops)     │
//! │        ↓                  ↑ HPD worker   │
//! │  EDID parser / mode tables / validation  │
//! │        ↓                                 │
//! │  HdmiController (DRM connector backend)  │
//! └──────────────────────────────────────────┘
//! ```

pub mod config;
pub mod constants;
pub mod display;
pub mod edid;
pub mod error;
pub mod hw;
pub mod mode;

pub use display::{
    Connector, ConnectorId, ConnectorStatus, DisplayInfo, DisplayOps, DisplayRegistry, EncoderId,
    HdmiDisplay, HotplugEvent,
};
pub use error::{HdmiError, Result};
