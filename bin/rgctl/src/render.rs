//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Table and JSON output of the operator CLI."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use anyhow::Result;
use rg_core::{About, Device, DirectMeasurement, RealMeasurement, State, Summary};
use serde::Serialize;

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

pub fn about(about: &About, json: bool) -> Result<()> {
    if json {
        return print_json(about);
    }
    println!("Serial number:    {}", about.serial_number);
    println!("Version:          {}", about.version);
    println!("Software version: {}", about.software_version);
    println!("Build version:    {}", about.build_version);
    Ok(())
}

pub fn state(state: &State, json: bool) -> Result<()> {
    if json {
        return print_json(state);
    }
    println!("Faults:    {}", state.total_faults);
    println!("Alarms:    {}", state.total_alarms);
    println!("Wireless:  {}", yes_no(state.wireless_connection));
    println!("WiFi:      {}", yes_no(state.wifi_connection));
    println!("Ethernet1: {}", yes_no(state.ethernet1_connection));
    println!("Ethernet2: {}", yes_no(state.ethernet2_connection));
    println!("Cloud:     {}", yes_no(state.cloud_connection));
    Ok(())
}

pub fn devices(devices: &[Device], json: bool) -> Result<()> {
    if json {
        return print_json(devices);
    }
    println!("{:>4}  {:>5}  {:<16}  {:<12}  NAME", "ID", "TYPE", "SERIAL", "MODEL");
    for device in devices {
        println!(
            "{:>4}  {:>5}  {:<16}  {:<12}  {}",
            device.id, device.device_type, device.serial_number, device.model, device.name
        );
    }
    Ok(())
}

pub fn real(measurements: &[RealMeasurement], json: bool) -> Result<()> {
    if json {
        return print_json(measurements);
    }
    let width = measurements
        .iter()
        .map(|m| m.localized_name.chars().count())
        .max()
        .unwrap_or(0);
    for m in measurements {
        println!("{:<width$}  {} {}", m.localized_name, m.value, m.unit);
    }
    Ok(())
}

pub fn direct(measurements: &[DirectMeasurement], json: bool) -> Result<()> {
    if json {
        return print_json(measurements);
    }
    let width = measurements
        .iter()
        .map(|m| m.localized_name.chars().count())
        .max()
        .unwrap_or(0);
    for m in measurements {
        println!(
            "{:<width$}  {:>8.1} {:<2}  {:>6.1} {}",
            m.localized_name, m.voltage, m.voltage_unit, m.current, m.current_unit
        );
    }
    Ok(())
}

pub fn summary(summary: &Summary, json: bool) -> Result<()> {
    if json {
        return print_json(summary);
    }
    println!("Grid:    {:>8.2} kW", summary.grid_power / 1000.0);
    println!("Battery: {:>8.2} kW", summary.battery_power / 1000.0);
    println!("PV:      {:>8.2} kW", summary.pv_power / 1000.0);
    println!("Load:    {:>8.2} kW", summary.load_power / 1000.0);
    println!("Level:   {:>8.1} %", summary.battery_level * 100.0);
    Ok(())
}
