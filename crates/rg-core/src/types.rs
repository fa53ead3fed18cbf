//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Domain records decoded from the dongle's payloads."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Wire names are accepted on input, camelCase is produced on output.
//! The dongle is inconsistent about quoting numbers, so numeric fields accept
//! both JSON numbers and numeric strings.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};

/// Payloads listing records under `list`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Listing<T> {
    #[serde(default = "Vec::new")]
    pub list: Vec<T>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Integer(i64),
    Float(f64),
    Flag(bool),
    Null,
}

/// `"0"`/`"1"` or `0`/`1` as bool; anything else is rejected.
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Scalar::deserialize(deserializer)? {
        Scalar::Text(text) if text == "0" => Ok(false),
        Scalar::Text(text) if text == "1" => Ok(true),
        Scalar::Integer(0) => Ok(false),
        Scalar::Integer(1) => Ok(true),
        _ => Err(de::Error::custom("expected a 0/1 connection flag")),
    }
}

/// Any scalar rendered as text; `null` becomes the empty string.
fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Text(text) => text,
        Scalar::Integer(value) => value.to_string(),
        Scalar::Float(value) => value.to_string(),
        Scalar::Flag(value) => value.to_string(),
        Scalar::Null => String::new(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct About {
    pub serial_number: String,
    pub version: String,
    pub software_version: String,
    pub build_version: String,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct State {
    #[serde(rename(deserialize = "total_fault"))]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub total_faults: i64,
    #[serde(rename(deserialize = "total_alarm"))]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub total_alarms: i64,
    #[serde(rename(deserialize = "wireless_conn_sts"), deserialize_with = "flag")]
    pub wireless_connection: bool,
    #[serde(rename(deserialize = "wifi_conn_sts"), deserialize_with = "flag")]
    pub wifi_connection: bool,
    #[serde(rename(deserialize = "eth_conn_sts"), deserialize_with = "flag")]
    pub ethernet1_connection: bool,
    #[serde(rename(deserialize = "eth2_conn_sts"), deserialize_with = "flag")]
    pub ethernet2_connection: bool,
    #[serde(rename(deserialize = "cloud_conn_sts"), deserialize_with = "flag")]
    pub cloud_connection: bool,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Device {
    #[serde(rename(deserialize = "dev_id"))]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub id: i64,
    #[serde(rename(deserialize = "dev_code"), default)]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub code: i64,
    #[serde(rename(serialize = "type", deserialize = "dev_type"))]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub device_type: i64,
    #[serde(rename(deserialize = "dev_protocol"), default)]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub protocol: i64,
    #[serde(rename(deserialize = "dev_sn"), default, deserialize_with = "text")]
    pub serial_number: String,
    #[serde(rename(deserialize = "dev_name"), default, deserialize_with = "text")]
    pub name: String,
    #[serde(rename(deserialize = "dev_model"), default, deserialize_with = "text")]
    pub model: String,
    #[serde(rename(deserialize = "dev_special"), default, deserialize_with = "text")]
    pub special: String,
    #[serde(default)]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub inv_type: i64,
    #[serde(default, deserialize_with = "text")]
    pub port_name: String,
    #[serde(rename(deserialize = "phys_addr"), default)]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub physical_address: i64,
    #[serde(rename(deserialize = "logc_addr"), default)]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub logical_address: i64,
    #[serde(default)]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub link_status: i64,
    #[serde(default)]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub init_status: i64,
}

/// One `list` entry of `real`-style services and `/about/list`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct RawDatapoint {
    pub data_name: String,
    #[serde(default, deserialize_with = "text")]
    pub data_value: String,
    #[serde(default, deserialize_with = "text")]
    pub data_unit: String,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct RawDirectPoint {
    #[serde(alias = "data_name")]
    pub name: String,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub voltage: f64,
    #[serde(default, deserialize_with = "text")]
    pub voltage_unit: String,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub current: f64,
    #[serde(default, deserialize_with = "text")]
    pub current_unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealMeasurement {
    pub i18n_code: String,
    pub localized_name: String,
    pub value: String,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMeasurement {
    pub i18n_code: String,
    pub localized_name: String,
    pub voltage: f64,
    pub voltage_unit: String,
    pub current: f64,
    pub current_unit: String,
}

/// Power flows in watts; `battery_level` is a fraction in `0..=1`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub grid_power: f64,
    pub battery_power: f64,
    pub pv_power: f64,
    pub load_power: f64,
    pub battery_level: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn device_accepts_numbers_and_numeric_strings() {
        let devices: Listing<Device> = serde_json::from_value(json!({
            "list": [
                {"dev_id": 1, "dev_type": 35, "dev_code": 3343, "dev_sn": "A22", "phys_addr": "1"},
                {"dev_id": "2", "dev_type": "44", "dev_sn": 12345, "link_status": "1"}
            ]
        }))
        .unwrap();
        assert_eq!(devices.list[0].device_type, 35);
        assert_eq!(devices.list[0].physical_address, 1);
        assert_eq!(devices.list[1].id, 2);
        assert_eq!(devices.list[1].serial_number, "12345");
        assert_eq!(devices.list[1].link_status, 1);

        let out = serde_json::to_value(&devices.list[0]).unwrap();
        assert_eq!(out["type"], 35);
        assert_eq!(out["serialNumber"], "A22");
        assert_eq!(out["physicalAddress"], 1);
    }

    #[test]
    fn device_rejects_non_numeric_id() {
        let result = serde_json::from_value::<Device>(json!({"dev_id": "x", "dev_type": 35}));
        assert!(result.is_err());
    }

    #[test]
    fn state_flags_accept_strings_and_numbers() {
        let state: State = serde_json::from_value(json!({
            "service": "state",
            "total_fault": "0",
            "total_alarm": 2,
            "wireless_conn_sts": "1",
            "wifi_conn_sts": 0,
            "eth_conn_sts": 1,
            "eth2_conn_sts": "0",
            "cloud_conn_sts": "1"
        }))
        .unwrap();
        assert_eq!(state.total_alarms, 2);
        assert!(state.wireless_connection);
        assert!(!state.wifi_connection);
        assert!(state.ethernet1_connection);
        assert!(state.cloud_connection);
        let out = serde_json::to_value(&state).unwrap();
        assert_eq!(out["ethernet2Connection"], false);
    }

    #[test]
    fn state_flags_reject_other_values() {
        let result = serde_json::from_value::<State>(json!({
            "total_fault": "0",
            "total_alarm": "0",
            "wireless_conn_sts": "2",
            "wifi_conn_sts": "0",
            "eth_conn_sts": "0",
            "eth2_conn_sts": "0",
            "cloud_conn_sts": "0"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn direct_points_decode_numeric_strings() {
        let points: Listing<RawDirectPoint> = serde_json::from_value(json!({
            "list": [
                {"name": "I18N_MPPT%@1", "voltage": "352.1", "voltage_unit": "V", "current": 4.2, "current_unit": "A"},
                {"data_name": "I18N_MPPT%@2", "voltage": 0, "current": "0"}
            ]
        }))
        .unwrap();
        assert_eq!(points.list[0].voltage, 352.1);
        assert_eq!(points.list[0].current, 4.2);
        assert_eq!(points.list[1].name, "I18N_MPPT%@2");
        assert_eq!(points.list[1].voltage_unit, "");
    }

    #[test]
    fn datapoint_values_become_text() {
        let point: RawDatapoint =
            serde_json::from_value(json!({"data_name": "I18N_A", "data_value": 3.5, "data_unit": null}))
                .unwrap();
        assert_eq!(point.data_value, "3.5");
        assert_eq!(point.data_unit, "");
    }

    #[test]
    fn measurements_serialize_camel_case() {
        let measurement = RealMeasurement {
            i18n_code: "I18N_A".into(),
            localized_name: "A".into(),
            value: "1".into(),
            unit: "kW".into(),
        };
        let out = serde_json::to_value(&measurement).unwrap();
        assert_eq!(out["i18nCode"], "I18N_A");
        assert_eq!(out["localizedName"], "A");
    }
}
