// Tracing initialization with configurable and reloadable log level,
// plus a tracer that mirrors the ops log into the trace stream.
use std::sync::OnceLock;

use aclcache_core::events::EventBroadcaster;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, tracing_subscriber::Registry>> =
    OnceLock::new();

pub fn init_tracing() {
    init_tracing_with_level("info");
}

pub fn init_tracing_with_level(level: &str) {
    // Prefer RUST_LOG from env, otherwise use provided level string.
    let base_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    let (reload_layer, handle) = reload::Layer::new(base_filter);
    let _ = LOG_RELOAD_HANDLE.set(handle);

    let _ = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer())
        .try_init();
}

/// Apply a new logging level at runtime if reload handle is configured.
pub fn apply_logging_level(level: &str) {
    if let Some(handle) = LOG_RELOAD_HANDLE.get() {
        let _ = handle.modify(|f| {
            *f = EnvFilter::new(level);
        });
    }
}

/// Logs every ops-log event at debug level until the bus closes.
pub fn spawn_ops_log_tracer(broadcaster: &EventBroadcaster) -> JoinHandle<()> {
    let mut rx = broadcaster.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => debug!(
                    target: "aclcache::opslog",
                    event_type = %event.event_type,
                    keyword = %event.keyword,
                    record_id = %event.record_id,
                    detail = ?event.detail,
                    "ops log"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Ops log tracer lagged behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
