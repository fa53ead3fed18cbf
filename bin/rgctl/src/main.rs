//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Operator CLI for querying a Sungrow inverter."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rg_common::{init_tracing, AppConfig};
use rg_core::{Language, Redgiant};
use rg_metrics::{new_registry, render_text};
use tracing::{debug, info};

mod render;

#[derive(Debug, Parser)]
#[command(author, version, about = "Query a Sungrow inverter over its dongle", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, env = "RG_HOST", help = "Dongle host, overrides the configuration")]
    host: Option<String>,

    #[arg(long, env = "RG_PASSWORD", hide_env_values = true, help = "Login password")]
    password: Option<String>,

    #[arg(long, help = "Print JSON instead of tables")]
    json: bool,

    #[arg(long, help = "Print collected metrics after the command")]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Dongle serial number and firmware versions")]
    About,
    #[command(about = "Fault, alarm, and connectivity state")]
    State,
    #[command(about = "Devices attached to the dongle")]
    Devices,
    #[command(about = "Measurements of one device")]
    Real(MeasurementArgs),
    #[command(about = "DC voltage and current per string")]
    Direct(MeasurementArgs),
    #[command(about = "Grid, battery, PV, and load power flows")]
    Summary {
        #[arg(long, value_name = "ID", help = "Device id; defaults to the first summary-capable device")]
        device: Option<i64>,
    },
}

#[derive(Debug, Args)]
struct MeasurementArgs {
    /// Device id as listed by `devices`.
    device: i64,

    /// Language of the measurement names (`none` keeps raw codes).
    #[arg(long, default_value = "en_US")]
    lang: Language,

    /// Service to query; repeat for several. Defaults to the device type's list.
    #[arg(long = "service", value_name = "NAME")]
    services: Vec<String>,
}

impl MeasurementArgs {
    fn services(&self) -> Vec<&str> {
        self.services.iter().map(String::as_str).collect()
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/rgctl.toml"));

    let mut config = match AppConfig::load_with_source(&candidates) {
        Ok(loaded) => {
            debug!(source = %loaded.source.display(), "configuration loaded");
            loaded.config
        }
        // A host on the command line is enough to run without a file.
        Err(err) if cli.config.is_none() && cli.host.is_some() => {
            debug!(error = %err, "no configuration file; using defaults");
            AppConfig::default()
        }
        Err(err) => return Err(err),
    };
    if let Some(host) = &cli.host {
        config.device.host = host.clone();
    }
    if let Some(password) = &cli.password {
        config.device.password = password.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing("rgctl", &config.logging)?;

    let registry = cli.metrics.then(new_registry);
    let facade = Redgiant::from_config(&config, registry.clone())?;
    facade
        .connect()
        .await
        .with_context(|| format!("failed to connect to {}", config.device.host))?;
    info!(host = %config.device.host, "connected");

    let outcome = run(&cli, &facade).await;
    facade.close().await;
    outcome?;

    if let Some(registry) = registry {
        print!("{}", render_text(&registry)?);
    }
    Ok(())
}

async fn run(cli: &Cli, facade: &Redgiant) -> Result<()> {
    let json = cli.json;
    match &cli.command {
        Commands::About => {
            let about = facade.about().await.context("about request failed")?;
            render::about(&about, json)
        }
        Commands::State => {
            let state = facade.state().await.context("state request failed")?;
            render::state(&state, json)
        }
        Commands::Devices => {
            let devices = facade.devices().await.context("device list request failed")?;
            render::devices(&devices, json)
        }
        Commands::Real(args) => {
            let measurements = facade
                .real_data(args.device, args.lang, &args.services())
                .await
                .with_context(|| format!("real data of device {} failed", args.device))?;
            render::real(&measurements, json)
        }
        Commands::Direct(args) => {
            let measurements = facade
                .direct_data(args.device, args.lang, &args.services())
                .await
                .with_context(|| format!("direct data of device {} failed", args.device))?;
            render::direct(&measurements, json)
        }
        Commands::Summary { device } => {
            let device_id = match device {
                Some(id) => *id,
                None => facade.summary_device().await?.id,
            };
            let summary = facade
                .summary(device_id)
                .await
                .with_context(|| format!("summary of device {device_id} failed"))?;
            render::summary(&summary, json)
        }
    }
}
