//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "02-fixtures"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Canned replies of a hybrid inverter installation."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use serde_json::{json, Value};

use crate::MockDevice;

/// Hybrid inverter with battery (device type 35).
pub const HYBRID_DEVICE_ID: i64 = 1;
/// Energy meter (device type 44).
pub const METER_DEVICE_ID: i64 = 2;

pub const SERIAL_NUMBER: &str = "B2281302388";

/// Partial English table; several codes used by the fixtures are left out on purpose.
pub const EN_US_PROPERTIES: &str = "\
I18N_COMMON_TOTAL_DCPOWER=Total DC Power
I18N_COMMON_LOAD_TOTAL_ACTIVE_POWER=Load Power
I18N_CONFIG_KEY_4060=Feed-in Power
I18N_COMMON_FEED_NETWORK_TOTAL_ACTIVE_POWER=Total Active Power
I18N_COMMON_RUNNING_STATUS=Running Status
I18N_COMMON_RUNNING=Running
I18N_CONFIG_KEY_3921=Battery Charging Power
I18N_CONFIG_KEY_3907=Battery Discharging Power
I18N_COMMON_BATTERY_SOC=Battery Level (SOC)
I18N_COMMON_MPPT_VOLTAGE=MPPT{0} Voltage
I18N_COMMON_GRID_FREQUENCY=Grid Frequency
";

pub fn device_list() -> Value {
    json!({
        "count": 2,
        "list": [
            {
                "dev_id": HYBRID_DEVICE_ID,
                "dev_code": 3343,
                "dev_type": 35,
                "dev_protocol": 2,
                "dev_sn": "A2231234567",
                "dev_name": "SH10RT(COM1-001)",
                "dev_model": "SH10RT",
                "dev_special": "0",
                "inv_type": 0,
                "port_name": "COM1",
                "phys_addr": "1",
                "logc_addr": "1",
                "link_status": 1,
                "init_status": 1
            },
            {
                "dev_id": "2",
                "dev_code": "6",
                "dev_type": "44",
                "dev_protocol": "0",
                "dev_sn": "",
                "dev_name": "Energy Meter(COM2-254)",
                "dev_model": "DTSU666",
                "dev_special": "0",
                "inv_type": "0",
                "port_name": "COM2",
                "phys_addr": "254",
                "logc_addr": "2",
                "link_status": "1",
                "init_status": "1"
            }
        ]
    })
}

pub fn state() -> Value {
    json!({
        "total_fault": "0",
        "total_alarm": "1",
        "wireless_conn_sts": "1",
        "wifi_conn_sts": "0",
        "eth_conn_sts": 1,
        "eth2_conn_sts": "0",
        "cloud_conn_sts": "1"
    })
}

pub fn about() -> Value {
    json!({
        "count": 5,
        "list": [
            {"data_name": "I18N_COMMON_DEVICE_SN", "data_value": SERIAL_NUMBER, "data_unit": ""},
            {"data_name": "I18N_COMMON_VERSION", "data_value": "WINET-SV200.001.00.P023", "data_unit": ""},
            {"data_name": "I18N_COMMON_APPLI_SOFT_VERSION", "data_value": "WINET-SV200.001.00.P023", "data_unit": ""},
            {"data_name": "I18N_COMMON_BUILD_SOFT_VERSION", "data_value": "M_WiNet-S_V01_V01_A", "data_unit": ""},
            {"data_name": "I18N_COMMON_WIFI_MODULE", "data_value": "WiNet-S", "data_unit": ""}
        ]
    })
}

/// Inverter measurements; with [`battery_data`] they yield grid 4000 W,
/// battery 1500 W, PV 3000 W, load 2500 W, and a level of 0.8.
pub fn real_data() -> Value {
    json!({
        "count": 7,
        "list": [
            {"data_name": "I18N_COMMON_RUNNING_STATUS", "data_value": "I18N_COMMON_RUNNING", "data_unit": ""},
            {"data_name": "I18N_COMMON_TOTAL_DCPOWER", "data_value": "3.00", "data_unit": "kW"},
            {"data_name": "I18N_COMMON_LOAD_TOTAL_ACTIVE_POWER", "data_value": "2.50", "data_unit": "kW"},
            {"data_name": "I18N_CONFIG_KEY_4060", "data_value": "5.00", "data_unit": "kW"},
            {"data_name": "I18N_COMMON_FEED_NETWORK_TOTAL_ACTIVE_POWER", "data_value": "1.00", "data_unit": "kW"},
            {"data_name": "I18N_COMMON_GRID_FREQUENCY", "data_value": "50.00", "data_unit": "Hz"},
            {"data_name": "I18N_COMMON_DAILY_FEED_NETWORK_PV", "data_value": "--", "data_unit": "kWh"}
        ]
    })
}

pub fn battery_data() -> Value {
    json!({
        "count": 3,
        "list": [
            {"data_name": "I18N_CONFIG_KEY_3921", "data_value": "2.00", "data_unit": "kW"},
            {"data_name": "I18N_CONFIG_KEY_3907", "data_value": "0.50", "data_unit": "kW"},
            {"data_name": "I18N_COMMON_BATTERY_SOC", "data_value": "80.0", "data_unit": "%"}
        ]
    })
}

pub fn direct_data() -> Value {
    json!({
        "count": 2,
        "list": [
            {"name": "I18N_COMMON_MPPT_VOLTAGE%@1", "voltage": "352.1", "voltage_unit": "V", "current": "4.2", "current_unit": "A"},
            {"name": "I18N_COMMON_MPPT_VOLTAGE%@2", "voltage": 0, "voltage_unit": "V", "current": 0.0, "current_unit": "A"}
        ]
    })
}

pub fn meter_data() -> Value {
    json!({
        "count": 1,
        "list": [
            {"data_name": "I18N_COMMON_GRID_FREQUENCY", "data_value": "49.98", "data_unit": "Hz"}
        ]
    })
}

/// Script `device` as a hybrid inverter with an attached energy meter.
pub fn load_hybrid_inverter(device: &MockDevice) {
    device.set_reply("devicelist", device_list());
    device.set_reply("state", state());
    device.set_device_reply("real", HYBRID_DEVICE_ID, real_data());
    device.set_device_reply("real_battery", HYBRID_DEVICE_ID, battery_data());
    device.set_device_reply("direct", HYBRID_DEVICE_ID, direct_data());
    device.set_device_reply("real", METER_DEVICE_ID, meter_data());
    device.set_http_reply("/about/list", about());
    device.set_translations("en_US", EN_US_PROPERTIES);
}
