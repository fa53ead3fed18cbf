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
use rg_common::{DeviceConfig, SessionConfig};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::localizer::{CodeMap, Localizer};
use crate::{I18nError, Language};

/// Parse a `KEY=text` document. Every non-empty line must contain `=`; the
/// first one separates key and text.
pub fn parse_properties(lang: Language, body: &str) -> Result<CodeMap, I18nError> {
    let mut table = CodeMap::new();
    for (index, line) in body.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        let Some((key, text)) = line.split_once('=') else {
            return Err(I18nError::MalformedLine {
                lang,
                line_number: index + 1,
                line: line.to_owned(),
            });
        };
        table.insert(key.to_owned(), text.to_owned());
    }
    Ok(table)
}

/// Fetches `/i18n/{tag}.properties` from the dongle, once per language.
///
/// The cache lock is held across the fetch so concurrent first lookups share
/// one request. Failed fetches leave nothing behind and are retried on the
/// next lookup.
pub struct PropertiesLocalizer {
    base_url: String,
    http: reqwest::Client,
    tables: Mutex<HashMap<Language, Arc<CodeMap>>>,
}

impl std::fmt::Debug for PropertiesLocalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertiesLocalizer")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl PropertiesLocalizer {
    pub fn new(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            http,
            tables: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_device(device: &DeviceConfig, session: &SessionConfig) -> Result<Self, I18nError> {
        let http = reqwest::Client::builder()
            .timeout(session.http_timeout)
            .danger_accept_invalid_certs(device.accept_invalid_certs)
            .build()
            .map_err(I18nError::HttpClient)?;
        Ok(Self::new(
            format!("{}://{}", device.http_scheme(), device.host),
            http,
        ))
    }

    pub fn table_url(&self, lang: Language) -> Option<String> {
        lang.tag()
            .map(|tag| format!("{}/i18n/{}.properties", self.base_url, tag))
    }

    /// Languages whose table is currently cached.
    pub async fn cached_languages(&self) -> Vec<Language> {
        let tables = self.tables.lock().await;
        Language::ALL
            .into_iter()
            .filter(|lang| tables.contains_key(lang))
            .collect()
    }

    async fn fetch(&self, lang: Language, url: &str) -> Result<CodeMap, I18nError> {
        let fetch_error = |source: reqwest::Error| I18nError::Fetch { lang, source };
        let body = self
            .http
            .get(url)
            .send()
            .await
            .map_err(fetch_error)?
            .error_for_status()
            .map_err(fetch_error)?
            .text()
            .await
            .map_err(fetch_error)?;
        parse_properties(lang, &body)
    }
}

#[async_trait]
impl Localizer for PropertiesLocalizer {
    async fn code_map(&self, lang: Language) -> Result<Arc<CodeMap>, I18nError> {
        let Some(url) = self.table_url(lang) else {
            return Ok(Arc::new(CodeMap::new()));
        };

        let mut tables = self.tables.lock().await;
        if let Some(table) = tables.get(&lang) {
            return Ok(table.clone());
        }

        debug!(lang = %lang, url = %url, "fetching localization table");
        match self.fetch(lang, &url).await {
            Ok(table) => {
                debug!(lang = %lang, entries = table.len(), "localization table cached");
                let table = Arc::new(table);
                tables.insert(lang, table.clone());
                Ok(table)
            }
            Err(err) => {
                warn!(lang = %lang, error = %err, "localization table unavailable");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_may_contain_separator() {
        let table = parse_properties(
            Language::English,
            "A=first\r\n\nB=x=y\nC=\n",
        )
        .unwrap();
        assert_eq!(table["A"], "first");
        assert_eq!(table["B"], "x=y");
        assert_eq!(table["C"], "");
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn malformed_line_fails_whole_table() {
        let err = parse_properties(Language::German, "A=1\nbroken\nC=3").unwrap_err();
        match err {
            I18nError::MalformedLine {
                lang,
                line_number,
                line,
            } => {
                assert_eq!(lang, Language::German);
                assert_eq!(line_number, 2);
                assert_eq!(line, "broken");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn whitespace_only_line_is_malformed() {
        let err = parse_properties(Language::Polish, "A=1\n   \nB=2").unwrap_err();
        assert!(matches!(
            err,
            I18nError::MalformedLine { line_number: 2, ref line, .. } if line == "   "
        ));
    }

    #[test]
    fn urls_use_language_tag() {
        let localizer =
            PropertiesLocalizer::new("https://192.168.1.20/", reqwest::Client::new());
        assert_eq!(
            localizer.table_url(Language::Dutch).unwrap(),
            "https://192.168.1.20/i18n/nl_NL.properties"
        );
        assert!(localizer.table_url(Language::None).is_none());
    }
}
