//! # Structured Logging Module
//!
//! Environment-aware structured logging for the order service.
//!
//! The filter comes from `RUST_LOG` when set, otherwise from the environment
//! name in `ORDERS_ENV` or `APP_ENV`. `ORDERS_LOG_FORMAT=json` switches the
//! console output to one JSON object per line.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));
        let json = wants_json_output();

        let layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        // A subscriber may already be installed, e.g. by a test harness
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Current environment name
pub fn get_environment() -> String {
    std::env::var("ORDERS_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

fn wants_json_output() -> bool {
    std::env::var("ORDERS_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Log a pipeline event for one order in a uniform shape
pub fn log_order_operation(
    operation: &str,
    order_uid: Option<&str>,
    offset: Option<i64>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        order_uid = order_uid,
        offset = offset,
        status = %status,
        details = details,
        "📋 ORDER_OPERATION"
    );
}
