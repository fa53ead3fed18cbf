//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Typed inverter operations layered over the protocol client."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use rg_client::ProtocolClient;
use rg_common::{AppConfig, VendorProfile};
use rg_i18n::{Language, Localizer, PropertiesLocalizer};
use rg_logging::{rg_warn, SessionContext};
use rg_metrics::{SessionMetrics, SharedRegistry, SummaryMetrics};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use crate::error::{RedgiantError, Result};
use crate::summary;
use crate::types::{
    About, Device, DirectMeasurement, Listing, RawDatapoint, RawDirectPoint, RealMeasurement,
    State, Summary,
};

const ABOUT_PATH: &str = "/about/list";
const LOCALIZED_VALUE_PREFIX: &str = "I18N_";

const SERIAL_NUMBER_CODE: &str = "I18N_COMMON_DEVICE_SN";
const VERSION_CODE: &str = "I18N_COMMON_VERSION";
const SOFTWARE_VERSION_CODE: &str = "I18N_COMMON_APPLI_SOFT_VERSION";
const BUILD_VERSION_CODE: &str = "I18N_COMMON_BUILD_SOFT_VERSION";

/// Which default table applies when no services are named.
#[derive(Debug, Clone, Copy)]
enum ServiceTable {
    Real,
    Direct,
}

/// Facade over one inverter dongle.
///
/// Bracket calls with [`Redgiant::connect`] and [`Redgiant::close`]. The
/// device inventory is fetched once and kept for the facade's lifetime.
pub struct Redgiant {
    client: ProtocolClient,
    localizer: Arc<dyn Localizer>,
    profile: VendorProfile,
    devices: OnceCell<BTreeMap<i64, Device>>,
    summary_metrics: Option<SummaryMetrics>,
}

impl Redgiant {
    pub fn new(client: ProtocolClient, localizer: Arc<dyn Localizer>, profile: VendorProfile) -> Self {
        Self {
            client,
            localizer,
            profile,
            devices: OnceCell::new(),
            summary_metrics: None,
        }
    }

    /// Wire up the client, the device's properties tables, and optional metrics.
    pub fn from_config(config: &AppConfig, registry: Option<SharedRegistry>) -> anyhow::Result<Self> {
        let (session_metrics, summary_metrics) = match registry {
            Some(registry) => (
                Some(SessionMetrics::new(registry.clone())?),
                Some(SummaryMetrics::new(registry)?),
            ),
            None => (None, None),
        };
        let client = ProtocolClient::new(
            config.device.clone(),
            config.session.clone(),
            session_metrics,
        )
        .context("failed to build protocol client")?;
        let localizer = PropertiesLocalizer::from_device(&config.device, &config.session)
            .context("failed to build localizer")?;

        let mut facade = Self::new(client, Arc::new(localizer), config.profile.clone());
        facade.summary_metrics = summary_metrics;
        Ok(facade)
    }

    pub fn with_summary_metrics(mut self, metrics: SummaryMetrics) -> Self {
        self.summary_metrics = Some(metrics);
        self
    }

    pub fn client(&self) -> &ProtocolClient {
        &self.client
    }

    pub fn profile(&self) -> &VendorProfile {
        &self.profile
    }

    pub async fn connect(&self) -> Result<()> {
        self.client.connect().await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.client.close().await;
    }

    pub async fn about(&self) -> Result<About> {
        let data = self.client.get(ABOUT_PATH, &[]).await?;
        let listing: Listing<RawDatapoint> = decode(ABOUT_PATH, data)?;
        let mut values: HashMap<String, String> = listing
            .list
            .into_iter()
            .map(|point| (point.data_name, point.data_value))
            .collect();
        let mut take = |code: &str| values.remove(code).unwrap_or_default();
        Ok(About {
            serial_number: take(SERIAL_NUMBER_CODE),
            version: take(VERSION_CODE),
            software_version: take(SOFTWARE_VERSION_CODE),
            build_version: take(BUILD_VERSION_CODE),
        })
    }

    pub async fn state(&self) -> Result<State> {
        let data = self.client.call("state", json!({})).await?;
        decode("state", data)
    }

    /// Attached devices ordered by id.
    pub async fn devices(&self) -> Result<Vec<Device>> {
        Ok(self.device_map().await?.values().cloned().collect())
    }

    pub async fn device(&self, device_id: i64) -> Result<Device> {
        self.device_map()
            .await?
            .get(&device_id)
            .cloned()
            .ok_or(RedgiantError::UnknownDevice(device_id))
    }

    /// First attached device the power summary can be computed for.
    pub async fn summary_device(&self) -> Result<Device> {
        let device_type = self.profile.summary.device_type;
        self.device_map()
            .await?
            .values()
            .find(|device| device.device_type == device_type)
            .cloned()
            .ok_or(RedgiantError::NoSummaryDevice(device_type))
    }

    /// Measurements of `device_id` localized into `lang`.
    ///
    /// With no `services` the device type's default list is queried and a
    /// failing service is skipped. Named services must all succeed.
    pub async fn real_data(
        &self,
        device_id: i64,
        lang: Language,
        services: &[&str],
    ) -> Result<Vec<RealMeasurement>> {
        let points: Vec<RawDatapoint> = self
            .collect(device_id, services, ServiceTable::Real)
            .await?;
        let mut measurements = Vec::with_capacity(points.len());
        for point in points {
            let localized_name = self.localize_or_raw(&point.data_name, lang).await?;
            let value = if point.data_value.starts_with(LOCALIZED_VALUE_PREFIX) {
                self.localize_or_raw(&point.data_value, lang).await?
            } else {
                point.data_value
            };
            measurements.push(RealMeasurement {
                i18n_code: point.data_name,
                localized_name,
                value,
                unit: point.data_unit,
            });
        }
        Ok(measurements)
    }

    /// Per-string DC voltage and current of `device_id`.
    pub async fn direct_data(
        &self,
        device_id: i64,
        lang: Language,
        services: &[&str],
    ) -> Result<Vec<DirectMeasurement>> {
        let points: Vec<RawDirectPoint> = self
            .collect(device_id, services, ServiceTable::Direct)
            .await?;
        let mut measurements = Vec::with_capacity(points.len());
        for point in points {
            measurements.push(DirectMeasurement {
                localized_name: self.localize_or_raw(&point.name, lang).await?,
                i18n_code: point.name,
                voltage: point.voltage,
                voltage_unit: point.voltage_unit,
                current: point.current,
                current_unit: point.current_unit,
            });
        }
        Ok(measurements)
    }

    /// Grid, battery, PV, and load power flows of a summary-capable device.
    pub async fn summary(&self, device_id: i64) -> Result<Summary> {
        let device = self.device(device_id).await?;
        let expected = self.profile.summary.device_type;
        if device.device_type != expected {
            return Err(RedgiantError::InvalidDeviceType {
                device_id,
                actual: device.device_type,
                expected,
            });
        }

        let measurements = self.real_data(device_id, Language::None, &[]).await?;
        let summary = summary::compute(&self.profile.summary, &measurements);
        if let Some(metrics) = &self.summary_metrics {
            metrics.set(
                summary.grid_power,
                summary.battery_power,
                summary.pv_power,
                summary.load_power,
                summary.battery_level,
            );
        }
        Ok(summary)
    }

    async fn device_map(&self) -> Result<&BTreeMap<i64, Device>> {
        self.devices
            .get_or_try_init(|| async {
                trace!("fetching device list");
                let data = self
                    .client
                    .call("devicelist", json!({"is_check_token": "0", "type": "0"}))
                    .await?;
                let listing: Listing<Device> = decode("devicelist", data)?;
                debug!(count = listing.list.len(), "device list cached");
                Ok::<_, RedgiantError>(
                    listing
                        .list
                        .into_iter()
                        .map(|device| (device.id, device))
                        .collect(),
                )
            })
            .await
    }

    async fn collect<T: DeserializeOwned>(
        &self,
        device_id: i64,
        services: &[&str],
        table: ServiceTable,
    ) -> Result<Vec<T>> {
        let device = self.device(device_id).await?;
        let strict = !services.is_empty();
        let services: Vec<String> = if strict {
            services.iter().map(|service| (*service).to_owned()).collect()
        } else {
            let profile = self
                .profile
                .device_type(device.device_type)
                .ok_or(RedgiantError::UnsupportedDeviceType(device.device_type))?;
            match table {
                ServiceTable::Real => profile.real_services.clone(),
                ServiceTable::Direct => profile.direct_services.clone(),
            }
        };

        let mut points = Vec::new();
        for service in &services {
            match self.fetch_list::<T>(device_id, service).await {
                Ok(mut batch) => points.append(&mut batch),
                Err(err) if strict || err.is_terminal() => return Err(err),
                Err(err) => {
                    rg_warn!(
                        context = SessionContext::new()
                            .with_host(self.client.host())
                            .with_service(service),
                        "skipping service for device {device_id}: {err}"
                    );
                }
            }
        }
        Ok(points)
    }

    async fn fetch_list<T: DeserializeOwned>(&self, device_id: i64, service: &str) -> Result<Vec<T>> {
        let params = json!({
            "dev_id": device_id.to_string(),
            "time123456": Utc::now().timestamp(),
        });
        let data = self.client.call(service, params).await?;
        let listing: Listing<T> = decode(service, data)?;
        Ok(listing.list)
    }

    /// Localize `code`, keeping it raw when the table is unavailable or lacks it.
    async fn localize_or_raw(&self, code: &str, lang: Language) -> Result<String> {
        match self.localizer.localize(code, lang).await {
            Ok(text) => Ok(text),
            Err(err) if err.is_fallback_safe() => {
                debug!(code, %lang, error = %err, "localization fallback");
                Ok(code.to_owned())
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl std::fmt::Debug for Redgiant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redgiant")
            .field("client", &self.client)
            .field("devices_cached", &self.devices.initialized())
            .finish_non_exhaustive()
    }
}

fn decode<T: DeserializeOwned>(context: &str, data: Value) -> Result<T> {
    serde_json::from_value(data).map_err(|source| RedgiantError::Decode {
        context: context.to_owned(),
        source,
    })
}
