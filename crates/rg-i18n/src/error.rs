//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Localization of vendor measurement codes."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use thiserror::Error;

use crate::Language;

#[derive(Debug, Error)]
pub enum I18nError {
    #[error("failed to fetch {lang} localization table: {source}")]
    Fetch {
        lang: Language,
        #[source]
        source: reqwest::Error,
    },
    #[error("malformed line {line_number} in {lang} localization table: {line:?}")]
    MalformedLine {
        lang: Language,
        line_number: usize,
        line: String,
    },
    #[error("no localization table loaded for {0}")]
    MissingTable(Language),
    #[error("no {lang} localization for {code}")]
    NotFound { code: String, lang: Language },
    #[error("template of {code} references argument {index} but only {available} were supplied")]
    TemplateArgument {
        code: String,
        index: usize,
        available: usize,
    },
    #[error("unknown language '{0}'")]
    UnknownLanguage(String),
    #[error("failed to build http client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

impl I18nError {
    /// Lookup failures a caller may replace with the raw code.
    ///
    /// Template argument mismatches are excluded: they indicate a broken table
    /// or code and must not be papered over.
    pub fn is_fallback_safe(&self) -> bool {
        matches!(
            self,
            I18nError::Fetch { .. }
                | I18nError::MalformedLine { .. }
                | I18nError::MissingTable(_)
                | I18nError::NotFound { .. }
        )
    }
}
