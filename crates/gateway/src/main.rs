mod file_store;
mod handlers;
mod routes;

use std::{net::SocketAddr, sync::Arc};

use billing_cache::CacheLayer;
use billing_common::config::BillingConfig;
use billing_store::ObjectStore;
use billing_telemetry::{init_telemetry, ConsoleLogging};
use billing_writeback::WritebackEngine;
use clap::Parser;
use poem::{listener::TcpListener, Server};

use crate::{file_store::FileObjectStore, routes::build_app};

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ConsoleLoggingArg {
    Off,
    Pretty,
    Json,
}

impl From<ConsoleLoggingArg> for ConsoleLogging {
    fn from(value: ConsoleLoggingArg) -> Self {
        match value {
            ConsoleLoggingArg::Off => ConsoleLogging::Off,
            ConsoleLoggingArg::Pretty => ConsoleLogging::Pretty,
            ConsoleLoggingArg::Json => ConsoleLogging::Json,
        }
    }
}

#[derive(Parser, Debug)]
#[clap(name = "billing-gateway", about = "Demonstration HTTP front end for the billing enforcement core")]
struct Args {
    /// Address the HTTP server binds to.
    #[clap(long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Directory backing the durable object store.
    #[clap(long, default_value = "./data")]
    store_root: std::path::PathBuf,

    /// Console log rendering.
    #[clap(long, value_enum, default_value = "pretty")]
    console_logging: ConsoleLoggingArg,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let telemetry = init_telemetry(args.console_logging.into(), "info");

    let config = Arc::new(BillingConfig::from_env());
    let store: Arc<dyn ObjectStore> = Arc::new(FileObjectStore::new(args.store_root.clone()));
    let cache = Arc::new(CacheLayer::new(store.clone(), config.cache_ttl_ms));
    let writeback = Arc::new(WritebackEngine::new(store.clone(), cache.clone(), &config));

    tracing::info!(bind = %args.bind, store_root = %args.store_root.display(), "starting billing gateway");

    let app = build_app(cache, config, writeback, telemetry.prometheus_handle());
    Server::new(TcpListener::bind(args.bind)).run(app).await?;
    Ok(())
}
