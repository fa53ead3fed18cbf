//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared configuration and tracing primitives for the gateway."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Shared primitives for the Redgiant gateway workspace.
//! This crate exposes configuration loading, the vendor profile tables, and
//! the tracing bootstrap consumed by the client, facade, and CLI crates.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, DeviceConfig, DeviceTypeProfile, LoadedAppConfig, LoggingConfig, SessionConfig,
    SummaryProfile, VendorProfile,
};
pub use logging::{init_tracing, LogFormat};
