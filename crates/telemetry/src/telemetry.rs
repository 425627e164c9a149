use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{prelude::*, EnvFilter, Registry};

/// How request/response pairs are rendered on stdout. `Off` disables the
/// fmt layer entirely (metrics and tracing spans still run); `Pretty` is for
/// local development, `Json` for anything whose logs get shipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLogging {
    Off,
    Pretty,
    Json,
}

macro_rules! stdio_layer {
    () => {
        tracing_subscriber::fmt::layer().with_level(true).with_target(true).with_thread_ids(true)
    };
}

/// Drop guard returned by [`init_telemetry`]. Holding it keeps the global
/// subscriber installed; dropping it is otherwise a no-op. Use
/// [`TelemetryGuard::prometheus_handle`] to wire a `/metrics` route as a
/// `poem::Endpoint` that renders the handle on each scrape.
pub struct TelemetryGuard {
    prometheus: Option<PrometheusHandle>,
}

impl TelemetryGuard {
    pub fn prometheus_handle(&self) -> Option<PrometheusHandle> {
        self.prometheus.clone()
    }
}

/// Installs a `tracing-subscriber` registry (`EnvFilter` + fmt layer per
/// `console_logging`) as the global default, and a Prometheus metrics
/// recorder. `env_filter_default` is used when `RUST_LOG` is unset.
///
/// Must be called once, from the binary's `main`, inside a Tokio runtime
/// (the Prometheus exporter spawns its scrape-server task on the current
/// runtime).
pub fn init_telemetry(console_logging: ConsoleLogging, env_filter_default: &str) -> TelemetryGuard {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(env_filter_default));

    let result = match console_logging {
        ConsoleLogging::Json => {
            tracing::subscriber::set_global_default(Registry::default().with(env_filter).with(stdio_layer!().json()))
        },
        ConsoleLogging::Pretty => {
            tracing::subscriber::set_global_default(Registry::default().with(env_filter).with(stdio_layer!().pretty()))
        },
        ConsoleLogging::Off => tracing::subscriber::set_global_default(Registry::default().with(env_filter)),
    };
    if let Err(err) = result {
        eprintln!("failed to install global tracing subscriber: {err}");
    }

    let prometheus = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            eprintln!("failed to install Prometheus recorder: {err}");
            None
        },
    };

    TelemetryGuard { prometheus }
}
