//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Structured session logging adapters."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Session-scoped logging helpers shared by the protocol client and the facade.

pub mod macros;

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct SessionContext<'a> {
    /// Device host the session talks to.
    pub host: Option<&'a str>,
    /// Service verb in flight, if any.
    pub service: Option<&'a str>,
    /// Reconnect attempt counter (1-indexed).
    pub attempt: Option<u32>,
}

impl<'a> SessionContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the device host.
    pub fn with_host(mut self, host: &'a str) -> Self {
        self.host = Some(host);
        self
    }

    /// Attach the service verb.
    pub fn with_service(mut self, service: &'a str) -> Self {
        self.service = Some(service);
        self
    }

    /// Attach a reconnect attempt counter.
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }
}

/// High-level outcome used when emitting session lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEventOutcome {
    /// The operation completed successfully.
    Success,
    /// The operation failed or was aborted.
    Fault,
}

impl SessionEventOutcome {
    /// Label used for the `outcome` field and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEventOutcome::Success => "success",
            SessionEventOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized session lifecycle event (connected, disconnected, reconnect).
pub fn log_session_event(
    context: Option<&SessionContext>,
    event: &str,
    message: &str,
    outcome: SessionEventOutcome,
) {
    let default_ctx = SessionContext::default();
    let ctx = context.unwrap_or(&default_ctx);
    match outcome {
        SessionEventOutcome::Success => tracing::info!(
            event,
            outcome = outcome.as_str(),
            host = ctx.host.unwrap_or(""),
            service = ctx.service.unwrap_or(""),
            attempt = ctx.attempt.unwrap_or_default(),
            message = %message
        ),
        SessionEventOutcome::Fault => tracing::error!(
            event,
            outcome = outcome.as_str(),
            host = ctx.host.unwrap_or(""),
            service = ctx.service.unwrap_or(""),
            attempt = ctx.attempt.unwrap_or_default(),
            message = %message
        ),
    }
}
