//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Localization of vendor measurement codes."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fmt;
use std::str::FromStr;

use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::I18nError;

/// Languages the dongle ships tables for. `None` disables localization.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, SerializeDisplay, DeserializeFromStr,
)]
pub enum Language {
    #[default]
    None,
    Chinese,
    English,
    German,
    Dutch,
    Polish,
}

impl Language {
    pub const ALL: [Language; 6] = [
        Language::None,
        Language::Chinese,
        Language::English,
        Language::German,
        Language::Dutch,
        Language::Polish,
    ];

    /// File stem of the table on the device, `None` for [`Language::None`].
    pub fn tag(&self) -> Option<&'static str> {
        match self {
            Language::None => None,
            Language::Chinese => Some("zh_CN"),
            Language::English => Some("en_US"),
            Language::German => Some("de_DE"),
            Language::Dutch => Some("nl_NL"),
            Language::Polish => Some("pl_PL"),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag().unwrap_or("none"))
    }
}

impl FromStr for Language {
    type Err = I18nError;

    /// Accepts full tags in either separator style (`en_US`, `en-us`) or bare
    /// language codes (`en`), case-insensitively.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        let language = match normalized.as_str() {
            "" | "none" => Language::None,
            "zh" | "zh_cn" => Language::Chinese,
            "en" | "en_us" => Language::English,
            "de" | "de_de" => Language::German,
            "nl" | "nl_nl" => Language::Dutch,
            "pl" | "pl_pl" => Language::Polish,
            _ => return Err(I18nError::UnknownLanguage(value.to_owned())),
        };
        Ok(language)
    }
}
