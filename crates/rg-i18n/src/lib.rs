//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Localization of vendor measurement codes."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Resolves vendor i18n codes (`I18N_COMMON_TOTAL_DCPOWER`, ...) to display text.
//!
//! Codes may carry template arguments separated by [`ARGUMENT_DELIMITER`]:
//! `I18N_COMMON_MPPT_VOLTAGE%@1` resolves the template `MPPT{0} Voltage` to
//! `MPPT1 Voltage`.

mod error;
mod language;
mod localizer;
mod properties;

pub use error::I18nError;
pub use language::Language;
pub use localizer::{
    render_template, split_code, CodeMap, Localizer, StaticLocalizer, ARGUMENT_DELIMITER,
};
pub use properties::{parse_properties, PropertiesLocalizer};
