//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Error taxonomy of the inverter protocol client."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use thiserror::Error;

use crate::transport::TransportError;

/// Classification used by the facade to decide whether a failure is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Precondition, decode, or HTTP failures surfaced to the caller as-is.
    Ordinary,
    /// The session is gone (socket failure or session-lost response code).
    SessionLost,
    /// The device answered with a non-recoverable result code.
    FatalServer,
    /// Every reconnect attempt failed.
    Disconnected,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("session not connected")]
    NotConnected,
    #[error("transport failure during {service}: {source}")]
    Transport {
        service: String,
        #[source]
        source: TransportError,
    },
    #[error("session lost during {service} (code {code}: {message})")]
    SessionLost {
        service: String,
        code: i64,
        message: String,
    },
    #[error("device rejected {service} with code {code}: {message}")]
    Server {
        service: String,
        code: i64,
        message: String,
    },
    #[error("failed to decode {context}: {source}")]
    Decode {
        context: String,
        payload: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("parameters for {service} must be a JSON object")]
    InvalidParams { service: String },
    #[error("failed to build http client: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("http request to {path} failed: {source}")]
    Http {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unable to re-establish session after {attempts} attempts: {reason}")]
    Disconnected { attempts: u32, reason: String },
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Transport { .. } | ClientError::SessionLost { .. } => {
                ErrorKind::SessionLost
            }
            ClientError::Server { .. } => ErrorKind::FatalServer,
            ClientError::Disconnected { .. } => ErrorKind::Disconnected,
            ClientError::NotConnected
            | ClientError::Decode { .. }
            | ClientError::InvalidParams { .. }
            | ClientError::HttpClient(_)
            | ClientError::Http { .. } => ErrorKind::Ordinary,
        }
    }

    /// Result code reported by the device, when the error carries one.
    pub fn code(&self) -> Option<i64> {
        match self {
            ClientError::SessionLost { code, .. } | ClientError::Server { code, .. } => {
                Some(*code)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_variants() {
        let lost = ClientError::SessionLost {
            service: "real".into(),
            code: 106,
            message: "token expired".into(),
        };
        assert_eq!(lost.kind(), ErrorKind::SessionLost);
        assert_eq!(lost.code(), Some(106));

        let fatal = ClientError::Server {
            service: "real".into(),
            code: 2,
            message: "bad request".into(),
        };
        assert_eq!(fatal.kind(), ErrorKind::FatalServer);

        let transport = ClientError::Transport {
            service: "ping".into(),
            source: TransportError::Closed,
        };
        assert_eq!(transport.kind(), ErrorKind::SessionLost);
        assert_eq!(transport.code(), None);

        assert_eq!(ClientError::NotConnected.kind(), ErrorKind::Ordinary);
        assert_eq!(
            ClientError::Disconnected {
                attempts: 3,
                reason: "refused".into()
            }
            .kind(),
            ErrorKind::Disconnected
        );
    }

    #[test]
    fn messages_name_the_service() {
        let err = ClientError::Server {
            service: "direct".into(),
            code: 7,
            message: "denied".into(),
        };
        assert_eq!(err.to_string(), "device rejected direct with code 7: denied");
    }
}
