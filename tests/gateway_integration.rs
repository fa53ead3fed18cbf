//! ---
//! ems_section: "15-testing-qa-runbook"
//! ems_subsection: "integration-tests"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "End-to-end gateway runs from a configuration file against the mock dongle."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::time::Duration;

use rg_common::AppConfig;
use rg_core::{Language, Redgiant, RedgiantError};
use rg_metrics::{new_registry, render_text};
use rg_testharness::fixtures::{HYBRID_DEVICE_ID, METER_DEVICE_ID, SERIAL_NUMBER};
use rg_testharness::MockDevice;
use tempfile::tempdir;

fn write_config(device: &MockDevice, extra: &str) -> anyhow::Result<(tempfile::TempDir, AppConfig)> {
    let dir = tempdir()?;
    let path = dir.path().join("rgctl.toml");
    let body = format!(
        r#"
[device]
host = "{host}"
secure = false

[session]
heartbeat_interval_secs = 600
reconnect_attempts = 2
reconnect_delay_ms = 10
read_timeout_secs = 2
http_timeout_secs = 5

[logging]
format = "pretty"
{extra}
"#,
        host = device.address()
    );
    fs::write(&path, body)?;
    let loaded = AppConfig::load_with_source(&[path.clone()])?;
    assert_eq!(loaded.source, path);
    Ok((dir, loaded.config))
}

#[tokio::test]
async fn configured_gateway_reports_installation() -> anyhow::Result<()> {
    let device = MockDevice::hybrid_inverter().await?;
    let (_dir, config) = write_config(&device, "")?;
    let registry = new_registry();
    let gateway = Redgiant::from_config(&config, Some(registry.clone()))?;
    gateway.connect().await?;

    let about = gateway.about().await?;
    assert_eq!(about.serial_number, SERIAL_NUMBER);

    let devices = gateway.devices().await?;
    assert_eq!(devices.len(), 2);

    let summary_device = gateway.summary_device().await?;
    assert_eq!(summary_device.id, HYBRID_DEVICE_ID);
    let summary = gateway.summary(summary_device.id).await?;
    assert!((summary.grid_power - 4000.0).abs() < 1e-9);
    assert!((summary.battery_level - 0.8).abs() < 1e-9);

    let english = gateway
        .real_data(HYBRID_DEVICE_ID, Language::English, &[])
        .await?;
    assert!(english
        .iter()
        .any(|m| m.localized_name == "Battery Level (SOC)" && m.value == "80.0"));

    let text = render_text(&registry)?;
    assert!(text.contains("rg_session_calls_total"));
    assert!(text.contains("rg_session_connected 1"));
    assert!(text.contains("rg_summary_load_power_watts 2500"));

    gateway.close().await;
    device.shutdown().await
}

#[tokio::test]
async fn vendor_tables_come_from_configuration() -> anyhow::Result<()> {
    let device = MockDevice::hybrid_inverter().await?;
    let (_dir, config) = write_config(
        &device,
        r#"
[profile.device_types.35]
real_services = ["real"]
direct_services = []

[profile.device_types.44]
real_services = ["real"]
direct_services = []

[profile.summary]
device_type = 44
total_dc_power_key = "I18N_COMMON_GRID_FREQUENCY"
power_scale = 1.0
"#,
    )?;
    let gateway = Redgiant::from_config(&config, None)?;
    gateway.connect().await?;

    let inverter = gateway
        .real_data(HYBRID_DEVICE_ID, Language::None, &[])
        .await?;
    assert_eq!(inverter.len(), 7);
    assert_eq!(device.calls("real_battery"), 0);

    match gateway.summary(HYBRID_DEVICE_ID).await {
        Err(RedgiantError::InvalidDeviceType { expected: 44, .. }) => {}
        other => panic!("unexpected result: {other:?}"),
    }
    let meter = gateway.summary(METER_DEVICE_ID).await?;
    assert!((meter.pv_power - 49.98).abs() < 1e-9);

    gateway.close().await;
    device.shutdown().await
}

#[tokio::test]
async fn gateway_survives_dongle_restart() -> anyhow::Result<()> {
    let device = MockDevice::hybrid_inverter().await?;
    let (_dir, config) = write_config(&device, "")?;
    let gateway = Redgiant::from_config(&config, None)?;
    gateway.connect().await?;
    gateway.devices().await?;

    device.hang_up_on("real");
    let measurements = gateway
        .real_data(HYBRID_DEVICE_ID, Language::None, &["real"])
        .await?;
    assert_eq!(measurements.len(), 7);
    assert_eq!(device.connections(), 2);

    gateway.close().await;
    device.shutdown().await
}

#[tokio::test]
async fn heartbeat_keeps_configured_session_alive() -> anyhow::Result<()> {
    let device = MockDevice::hybrid_inverter().await?;
    let (_dir, mut config) = write_config(&device, "")?;
    config.session.heartbeat_interval = Duration::from_millis(50);
    let gateway = Redgiant::from_config(&config, None)?;
    gateway.connect().await?;

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(device.calls("ping") >= 2);
    assert_eq!(gateway.state().await?.total_alarms, 1);

    gateway.close().await;
    let pings = device.calls("ping");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(device.calls("ping"), pings);

    device.shutdown().await
}

#[tokio::test]
async fn unreachable_dongle_fails_to_connect() -> anyhow::Result<()> {
    let device = MockDevice::start().await?;
    let (_dir, config) = write_config(&device, "")?;
    device.shutdown().await?;

    let gateway = Redgiant::from_config(&config, None)?;
    assert!(gateway.connect().await.is_err());
    assert!(matches!(
        gateway.state().await,
        Err(err) if err.is_terminal()
    ));
    Ok(())
}
