//! The staticdhcpd binary: configuration file in, serving loop out.
//!
//! Usage: `staticdhcpd [config.json]`. The configuration file is a JSON
//! rendition of [`Config`]; unset fields keep their contract defaults.

use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use staticdhcp::config::DefaultHooks;
use staticdhcp::db::ini::IniDatabase;
use staticdhcp::db::{build_cache, CachingDatabase, Database, NullDatabase};
use staticdhcp::stats::{Statistics, StatsObserver, StatsRegistry};
use staticdhcp::{Config, DhcpService};

/// Writes every statistics record into the log stream
struct TraceStats;

impl StatsObserver for TraceStats {
    fn emit(&self, statistics: &Statistics) {
        debug!(
            packet_type = %statistics.packet_type,
            source = %statistics.source_address,
            mac = statistics.mac.map(|m| m.to_string()),
            ip = statistics.ip.map(|i| i.to_string()),
            processed = statistics.processed,
            pxe = statistics.pxe,
            seconds = statistics.processing_time,
            "statistics"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "staticdhcpd.json".to_string());
    let config_file = std::fs::File::open(&config_path)
        .with_context(|| format!("unable to open configuration at '{}'", config_path))?;
    let config: Config = serde_json::from_reader(config_file)
        .with_context(|| format!("unable to parse configuration at '{}'", config_path))?;
    config.validate()?;

    let cache = build_cache(&config);
    let database: Arc<dyn Database> = match &config.ini_file {
        Some(path) => Arc::new(CachingDatabase::new(
            IniDatabase::open(path)
                .with_context(|| format!("unable to load database '{}'", path.display()))?,
            cache,
            config.database_concurrency_limit,
        )),
        None => {
            warn!("no reference database configured; every MAC will be unknown");
            Arc::new(CachingDatabase::new(
                NullDatabase,
                cache,
                config.database_concurrency_limit,
            ))
        }
    };

    let stats = Arc::new(StatsRegistry::new());
    stats.register(Arc::new(TraceStats));

    let service = DhcpService::new(&config, database, Arc::new(DefaultHooks), stats)?;
    tokio::select! {
        result = service.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            Ok(())
        }
    }
}
