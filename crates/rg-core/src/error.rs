//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Error types surfaced by the inverter facade."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use rg_client::{ClientError, ErrorKind};
use rg_i18n::I18nError;
use thiserror::Error;

/// Errors produced by [`crate::Redgiant`].
#[derive(Debug, Error)]
pub enum RedgiantError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    I18n(#[from] I18nError),
    #[error("unknown device {0}")]
    UnknownDevice(i64),
    #[error("device type {0} has no default services")]
    UnsupportedDeviceType(i64),
    #[error("invalid device type {actual} for device {device_id}; expected {expected}")]
    InvalidDeviceType {
        device_id: i64,
        actual: i64,
        expected: i64,
    },
    #[error("no device of type {0} is attached")]
    NoSummaryDevice(i64),
    #[error("failed to decode {context}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl RedgiantError {
    /// Errors after which no further request can succeed without a new session.
    pub fn is_terminal(&self) -> bool {
        match self {
            RedgiantError::Client(ClientError::NotConnected) => true,
            RedgiantError::Client(err) => err.kind() == ErrorKind::Disconnected,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, RedgiantError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_errors() {
        assert!(RedgiantError::from(ClientError::NotConnected).is_terminal());
        assert!(RedgiantError::from(ClientError::Disconnected {
            attempts: 3,
            reason: "closed".into(),
        })
        .is_terminal());
        assert!(!RedgiantError::from(ClientError::Server {
            service: "real".into(),
            code: 2,
            message: "unsupported".into(),
        })
        .is_terminal());
        assert!(!RedgiantError::UnknownDevice(9).is_terminal());
    }

    #[test]
    fn invalid_device_type_message() {
        let err = RedgiantError::InvalidDeviceType {
            device_id: 2,
            actual: 44,
            expected: 35,
        };
        assert_eq!(
            err.to_string(),
            "invalid device type 44 for device 2; expected 35"
        );
    }
}
