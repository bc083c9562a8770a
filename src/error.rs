//! Error types for the HDMI display API
//!
//! Backend code uses `anyhow` internally; everything crossing the
//! display API boundary is folded into [`HdmiError`].

use thiserror::Error;

/// Errors returned by display lifecycle and connector operations
#[derive(Debug, Error)]
pub enum HdmiError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("display {0} is not initialized")]
    NotInitialized(String),

    #[error("display {0} is already initialized")]
    Busy(String),

    #[error("no HDMI controller for {0}")]
    NoDevice(String),

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("EDID: {0}")]
    Edid(String),

    #[error("configuration: {0}")]
    Config(String),

    #[error("hardware: {0:#}")]
    Hardware(#[from] anyhow::Error),
}

impl HdmiError {
    /// Negative errno equivalent, for callers that expect kernel-style codes
    pub fn errno(&self) -> i32 {
        let code = match self {
            HdmiError::InvalidArgument(_) | HdmiError::Config(_) => libc::EINVAL,
            HdmiError::NotInitialized(_) | HdmiError::NoDevice(_) => libc::ENODEV,
            HdmiError::Busy(_) => libc::EBUSY,
            HdmiError::Unsupported(_) => libc::EOPNOTSUPP,
            HdmiError::Edid(_) | HdmiError::Hardware(_) => libc::EIO,
        };
        -code
    }
}

pub type Result<T> = std::result::Result<T, HdmiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(HdmiError::Busy("hdmi".into()).errno(), -libc::EBUSY);
        assert_eq!(
            HdmiError::NotInitialized("hdmi".into()).errno(),
            -libc::ENODEV
        );
        assert_eq!(HdmiError::Unsupported("tpg").errno(), -libc::EOPNOTSUPP);
        let hw: HdmiError = anyhow::anyhow!("i2c nack").into();
        assert_eq!(hw.errno(), -libc::EIO);
    }
}
