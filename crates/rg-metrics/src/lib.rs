//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Metrics collection and export utilities."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use prometheus::{
    Gauge, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Shared registry type used across the gateway crates.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Encode every family in the registry using the Prometheus text format.
pub fn render_text(registry: &Registry) -> Result<String> {
    let families = registry.gather();
    TextEncoder::new()
        .encode_to_string(&families)
        .context("failed to encode metrics")
}

/// Metrics recorded by the protocol session.
#[derive(Clone)]
pub struct SessionMetrics {
    registry: SharedRegistry,
    calls_total: IntCounterVec,
    call_seconds: HistogramVec,
    dropped_frames_total: IntCounterVec,
    reconnects_total: IntCounterVec,
    connected: IntGauge,
}

impl SessionMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let calls_total = IntCounterVec::new(
            Opts::new(
                "rg_session_calls_total",
                "Socket calls issued to the device by service and outcome",
            ),
            &["service", "outcome"],
        )?;
        registry.register(Box::new(calls_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.001, 2.0, 16)
            .context("failed to construct histogram buckets")?;
        let call_seconds = HistogramVec::new(
            HistogramOpts::new(
                "rg_session_call_seconds",
                "Round trip duration of socket calls including discarded frames",
            )
            .buckets(buckets),
            &["service"],
        )?;
        registry.register(Box::new(call_seconds.clone()))?;

        let dropped_frames_total = IntCounterVec::new(
            Opts::new(
                "rg_session_dropped_frames_total",
                "Unsolicited or mismatched frames discarded by the read loop",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(dropped_frames_total.clone()))?;

        let reconnects_total = IntCounterVec::new(
            Opts::new(
                "rg_session_reconnects_total",
                "Reconnect cycles by final outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(reconnects_total.clone()))?;

        let connected = IntGauge::with_opts(Opts::new(
            "rg_session_connected",
            "Indicator (0/1) whether the session is authenticated",
        ))?;
        registry.register(Box::new(connected.clone()))?;

        Ok(Self {
            registry,
            calls_total,
            call_seconds,
            dropped_frames_total,
            reconnects_total,
            connected,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn observe_call(&self, service: &str, outcome: &str, elapsed: Duration) {
        self.calls_total
            .with_label_values(&[service, outcome])
            .inc();
        self.call_seconds
            .with_label_values(&[service])
            .observe(elapsed.as_secs_f64());
    }

    pub fn inc_dropped_frame(&self, reason: &str) {
        self.dropped_frames_total.with_label_values(&[reason]).inc();
    }

    pub fn record_reconnect(&self, outcome: &str) {
        self.reconnects_total.with_label_values(&[outcome]).inc();
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.set(if connected { 1 } else { 0 });
    }

    /// Read back a call counter; used by tests and the CLI.
    pub fn calls(&self, service: &str, outcome: &str) -> u64 {
        self.calls_total
            .with_label_values(&[service, outcome])
            .get()
    }

    pub fn dropped_frames(&self, reason: &str) -> u64 {
        self.dropped_frames_total.with_label_values(&[reason]).get()
    }

    pub fn reconnects(&self, outcome: &str) -> u64 {
        self.reconnects_total.with_label_values(&[outcome]).get()
    }
}

impl std::fmt::Debug for SessionMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMetrics").finish_non_exhaustive()
    }
}

/// Gauges mirroring the latest power summary.
#[derive(Clone, Debug)]
pub struct SummaryMetrics {
    grid_power: Gauge,
    battery_power: Gauge,
    pv_power: Gauge,
    load_power: Gauge,
    battery_level: Gauge,
}

impl SummaryMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let gauge = |name: &str, help: &str| -> Result<Gauge> {
            let gauge = Gauge::with_opts(Opts::new(name, help))?;
            registry.register(Box::new(gauge.clone()))?;
            Ok(gauge)
        };
        Ok(Self {
            grid_power: gauge("rg_summary_grid_power_watts", "Power drawn from the grid")?,
            battery_power: gauge(
                "rg_summary_battery_power_watts",
                "Battery charge (positive) or discharge (negative) power",
            )?,
            pv_power: gauge("rg_summary_pv_power_watts", "Photovoltaic DC power")?,
            load_power: gauge("rg_summary_load_power_watts", "Household load power")?,
            battery_level: gauge(
                "rg_summary_battery_level_ratio",
                "Battery state of charge as a fraction",
            )?,
        })
    }

    pub fn set(
        &self,
        grid_power: f64,
        battery_power: f64,
        pv_power: f64,
        load_power: f64,
        battery_level: f64,
    ) {
        self.grid_power.set(grid_power);
        self.battery_power.set(battery_power);
        self.pv_power.set(pv_power);
        self.load_power.set(load_power);
        self.battery_level.set(battery_level);
    }
}

pub use prometheus;
