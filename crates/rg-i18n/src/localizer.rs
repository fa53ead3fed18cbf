//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Localization of vendor measurement codes."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::properties::parse_properties;
use crate::{I18nError, Language};

/// Separates the table key from positional template arguments inside a code.
pub const ARGUMENT_DELIMITER: &str = "%@";

pub type CodeMap = HashMap<String, String>;

/// Resolves codes to display text for a language.
#[async_trait]
pub trait Localizer: Send + Sync {
    /// Table for `lang`, loaded on first use.
    async fn code_map(&self, lang: Language) -> Result<Arc<CodeMap>, I18nError>;

    /// Localize `code`; [`Language::None`] returns the code unchanged.
    async fn localize(&self, code: &str, lang: Language) -> Result<String, I18nError> {
        if lang == Language::None {
            return Ok(code.to_owned());
        }
        let (key, args) = split_code(code);
        let table = self.code_map(lang).await?;
        let template = table.get(key).ok_or_else(|| I18nError::NotFound {
            code: code.to_owned(),
            lang,
        })?;
        render_template(code, template, &args)
    }
}

/// Split `KEY%@a%@b` into `("KEY", ["a", "b"])`.
pub fn split_code(code: &str) -> (&str, Vec<&str>) {
    let mut parts = code.split(ARGUMENT_DELIMITER);
    let key = parts.next().unwrap_or_default();
    (key, parts.collect())
}

/// Substitute `{N}` placeholders with `args[N]`.
///
/// Without arguments the template is returned untouched. Braces that do not
/// enclose a decimal index are copied literally.
pub fn render_template(code: &str, template: &str, args: &[&str]) -> Result<String, I18nError> {
    if args.is_empty() {
        return Ok(template.to_owned());
    }

    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let placeholder = after
            .find('}')
            .map(|close| &after[..close])
            .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()));
        match placeholder {
            Some(digits) => {
                let index = digits.parse::<usize>().unwrap_or(usize::MAX);
                let arg = args.get(index).ok_or_else(|| I18nError::TemplateArgument {
                    code: code.to_owned(),
                    index,
                    available: args.len(),
                })?;
                rendered.push_str(arg);
                rest = &after[digits.len() + 1..];
            }
            None => {
                rendered.push('{');
                rest = after;
            }
        }
    }
    rendered.push_str(rest);
    Ok(rendered)
}

/// In-memory tables, for offline use and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticLocalizer {
    tables: HashMap<Language, Arc<CodeMap>>,
}

impl StaticLocalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I, K, V>(mut self, lang: Language, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let table = entries
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        self.tables.insert(lang, Arc::new(table));
        self
    }

    /// Load a table from properties text (`KEY=text` per line).
    pub fn with_properties(mut self, lang: Language, body: &str) -> Result<Self, I18nError> {
        let table = parse_properties(lang, body)?;
        self.tables.insert(lang, Arc::new(table));
        Ok(self)
    }
}

#[async_trait]
impl Localizer for StaticLocalizer {
    async fn code_map(&self, lang: Language) -> Result<Arc<CodeMap>, I18nError> {
        self.tables
            .get(&lang)
            .cloned()
            .ok_or(I18nError::MissingTable(lang))
    }
}
