//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Structured session logging adapters."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
/// Emit an informational log enriched with session context.
#[macro_export]
macro_rules! rg_info {
    (context = $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            tracing::Level::INFO,
            host = ctx.host.unwrap_or(""),
            service = ctx.service.unwrap_or(""),
            attempt = ctx.attempt.unwrap_or_default(),
            message = %format_args!($($arg)+)
        );
    }};
    ($($arg:tt)+) => {{
        let ctx = &$crate::SessionContext::default();
        tracing::event!(
            tracing::Level::INFO,
            host = ctx.host.unwrap_or(""),
            service = ctx.service.unwrap_or(""),
            attempt = ctx.attempt.unwrap_or_default(),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit a debug log enriched with session context.
#[macro_export]
macro_rules! rg_debug {
    (context = $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            tracing::Level::DEBUG,
            host = ctx.host.unwrap_or(""),
            service = ctx.service.unwrap_or(""),
            attempt = ctx.attempt.unwrap_or_default(),
            message = %format_args!($($arg)+)
        );
    }};
    ($($arg:tt)+) => {{
        let ctx = &$crate::SessionContext::default();
        tracing::event!(
            tracing::Level::DEBUG,
            host = ctx.host.unwrap_or(""),
            service = ctx.service.unwrap_or(""),
            attempt = ctx.attempt.unwrap_or_default(),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit a warning enriched with session context.
#[macro_export]
macro_rules! rg_warn {
    (context = $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            tracing::Level::WARN,
            host = ctx.host.unwrap_or(""),
            service = ctx.service.unwrap_or(""),
            attempt = ctx.attempt.unwrap_or_default(),
            message = %format_args!($($arg)+)
        );
    }};
    ($($arg:tt)+) => {{
        let ctx = &$crate::SessionContext::default();
        tracing::event!(
            tracing::Level::WARN,
            host = ctx.host.unwrap_or(""),
            service = ctx.service.unwrap_or(""),
            attempt = ctx.attempt.unwrap_or_default(),
            message = %format_args!($($arg)+)
        );
    }};
}
