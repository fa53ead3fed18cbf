//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Protocol client for the Sungrow dongle control API."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
pub mod client;
pub mod envelope;
pub mod error;
pub mod heartbeat;
pub mod retry;
pub mod transport;

pub use client::ProtocolClient;
pub use envelope::{FrameDisposition, Response, ResponseStatus};
pub use error::{ClientError, ErrorKind};
pub use retry::ReconnectPolicy;
pub use transport::TransportError;
