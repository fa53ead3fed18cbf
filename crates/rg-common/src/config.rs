//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared configuration and tracing primitives for the gateway."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_username() -> String {
    "user".to_owned()
}

fn default_password() -> String {
    "pw1111".to_owned()
}

fn default_secure() -> bool {
    true
}

fn default_accept_invalid_certs() -> bool {
    true
}

fn default_language_tag() -> String {
    "zh_cn".to_owned()
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(3)
}

fn default_reconnect_attempts() -> u32 {
    3
}

fn default_reconnect_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_power_scale() -> f64 {
    1e3
}

fn default_level_scale() -> f64 {
    1e-2
}

/// Primary configuration object for the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub profile: VendorProfile,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "RG_CONFIG";

    /// Load configuration from disk, respecting the `RG_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.device.validate()?;
        self.session.validate()?;
        self.profile.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Connection details for the inverter dongle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Host (and optional port) of the device, e.g. `192.168.1.20` or `10.0.0.5:8082`.
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_password")]
    pub password: String,
    /// Use `wss`/`https` instead of `ws`/`http`.
    #[serde(default = "default_secure")]
    pub secure: bool,
    /// The dongle ships a self-signed certificate.
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,
    /// Language tag sent with every request.
    #[serde(default = "default_language_tag")]
    pub language_tag: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            username: default_username(),
            password: default_password(),
            secure: default_secure(),
            accept_invalid_certs: default_accept_invalid_certs(),
            language_tag: default_language_tag(),
        }
    }
}

impl DeviceConfig {
    /// Convenience constructor used by tests and the CLI overrides.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(anyhow!("device.host must not be empty"));
        }
        Ok(())
    }

    /// Scheme used for the persistent socket.
    pub fn socket_scheme(&self) -> &'static str {
        if self.secure {
            "wss"
        } else {
            "ws"
        }
    }

    /// Scheme used for the plain HTTP endpoints.
    pub fn http_scheme(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }
}

/// Timing knobs of the protocol session.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(rename = "heartbeat_interval_secs", default = "default_heartbeat_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub heartbeat_interval: Duration,
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
    #[serde(rename = "reconnect_delay_ms", default = "default_reconnect_delay")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub reconnect_delay: Duration,
    #[serde(rename = "read_timeout_secs", default = "default_read_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub read_timeout: Duration,
    #[serde(rename = "http_timeout_secs", default = "default_http_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub http_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: default_heartbeat_interval(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay: default_reconnect_delay(),
            read_timeout: default_read_timeout(),
            http_timeout: default_http_timeout(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.reconnect_attempts == 0 {
            return Err(anyhow!("session.reconnect_attempts must be at least 1"));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(anyhow!("session.heartbeat_interval_secs must be positive"));
        }
        if self.read_timeout.is_zero() {
            return Err(anyhow!("session.read_timeout_secs must be positive"));
        }
        Ok(())
    }
}

/// Vendor-specific tables: default services per device type and the summary formula.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorProfile {
    /// Keyed by the decimal device type (`dev_type`).
    #[serde(default = "VendorProfile::default_device_types")]
    pub device_types: IndexMap<String, DeviceTypeProfile>,
    #[serde(default)]
    pub summary: SummaryProfile,
}

impl VendorProfile {
    fn default_device_types() -> IndexMap<String, DeviceTypeProfile> {
        let mut types = IndexMap::new();
        types.insert(
            "35".to_owned(),
            DeviceTypeProfile {
                real_services: vec!["real".to_owned(), "real_battery".to_owned()],
                direct_services: vec!["direct".to_owned()],
            },
        );
        types.insert(
            "44".to_owned(),
            DeviceTypeProfile {
                real_services: vec!["real".to_owned()],
                direct_services: Vec::new(),
            },
        );
        types
    }

    /// Look up the service table for a device type.
    pub fn device_type(&self, device_type: i64) -> Option<&DeviceTypeProfile> {
        self.device_types.get(&device_type.to_string())
    }

    pub fn validate(&self) -> Result<()> {
        for key in self.device_types.keys() {
            key.parse::<i64>()
                .with_context(|| format!("profile.device_types key '{key}' is not an integer"))?;
        }
        let summary_type = self.summary.device_type;
        match self.device_type(summary_type) {
            Some(profile) if !profile.real_services.is_empty() => Ok(()),
            _ => Err(anyhow!(
                "summary device type {summary_type} has no real services configured"
            )),
        }
    }
}

impl Default for VendorProfile {
    fn default() -> Self {
        Self {
            device_types: Self::default_device_types(),
            summary: SummaryProfile::default(),
        }
    }
}

/// Default services queried when the caller does not name any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTypeProfile {
    #[serde(default)]
    pub real_services: Vec<String>,
    #[serde(default)]
    pub direct_services: Vec<String>,
}

/// Measurement keys and scale factors feeding the power summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryProfile {
    pub device_type: i64,
    pub feed_key: String,
    pub total_active_power_key: String,
    pub charge_key: String,
    pub discharge_key: String,
    pub total_dc_power_key: String,
    pub load_active_power_key: String,
    pub soc_key: String,
    #[serde(default = "default_power_scale")]
    pub power_scale: f64,
    #[serde(default = "default_level_scale")]
    pub level_scale: f64,
}

impl Default for SummaryProfile {
    fn default() -> Self {
        Self {
            device_type: 35,
            feed_key: "I18N_CONFIG_KEY_4060".to_owned(),
            total_active_power_key: "I18N_COMMON_FEED_NETWORK_TOTAL_ACTIVE_POWER".to_owned(),
            charge_key: "I18N_CONFIG_KEY_3921".to_owned(),
            discharge_key: "I18N_CONFIG_KEY_3907".to_owned(),
            total_dc_power_key: "I18N_COMMON_TOTAL_DCPOWER".to_owned(),
            load_active_power_key: "I18N_COMMON_LOAD_TOTAL_ACTIVE_POWER".to_owned(),
            soc_key: "I18N_COMMON_BATTERY_SOC".to_owned(),
            power_scale: default_power_scale(),
            level_scale: default_level_scale(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Optional directory for a daily rolling JSON log file.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_vendor_tables() {
        let profile = VendorProfile::default();
        let hybrid = profile.device_type(35).expect("hybrid inverter profile");
        assert_eq!(hybrid.real_services, vec!["real", "real_battery"]);
        assert_eq!(hybrid.direct_services, vec!["direct"]);
        assert!(profile.device_type(44).unwrap().direct_services.is_empty());
        assert!(profile.device_type(7).is_none());
        assert_eq!(profile.summary.power_scale, 1000.0);
    }

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config: AppConfig = r#"
            [device]
            host = "192.168.1.20"
        "#
        .parse()
        .unwrap();
        assert_eq!(config.device.username, "user");
        assert_eq!(config.device.socket_scheme(), "wss");
        assert_eq!(config.session.reconnect_attempts, 3);
        assert_eq!(config.session.heartbeat_interval, Duration::from_secs(3));
        assert_eq!(config.session.reconnect_delay, Duration::from_millis(1000));
    }

    #[test]
    fn session_overrides_use_unit_suffixes() {
        let config: AppConfig = r#"
            [device]
            host = "inverter.local"
            secure = false

            [session]
            heartbeat_interval_secs = 10
            reconnect_attempts = 5
            reconnect_delay_ms = 250
            read_timeout_secs = 4
        "#
        .parse()
        .unwrap();
        assert_eq!(config.device.http_scheme(), "http");
        assert_eq!(config.session.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.session.reconnect_attempts, 5);
        assert_eq!(config.session.reconnect_delay, Duration::from_millis(250));
        assert_eq!(config.session.read_timeout, Duration::from_secs(4));
    }

    #[test]
    fn empty_host_is_rejected() {
        let err = "[device]\nhost = \"  \"\n".parse::<AppConfig>().unwrap_err();
        assert!(err.to_string().contains("device.host"));
    }

    #[test]
    fn zero_reconnect_attempts_is_rejected() {
        let result = r#"
            [device]
            host = "inverter.local"
            [session]
            reconnect_attempts = 0
        "#
        .parse::<AppConfig>();
        assert!(result.is_err());
    }

    #[test]
    fn summary_type_without_real_services_is_rejected() {
        let result = r#"
            [device]
            host = "inverter.local"
            [profile.summary]
            device_type = 99
        "#
        .parse::<AppConfig>();
        assert!(result.is_err());
    }
}
