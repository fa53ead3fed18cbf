//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Typed facade over the Sungrow dongle."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Inventory, measurements, and the power summary of a Sungrow installation.

pub mod error;
pub mod facade;
pub mod summary;
pub mod types;

pub use error::{RedgiantError, Result};
pub use facade::Redgiant;
pub use rg_i18n::Language;
pub use types::{About, Device, DirectMeasurement, RealMeasurement, State, Summary};
