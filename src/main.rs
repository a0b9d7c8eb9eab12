// ------------------------------------------------------------
// Module declarations
// ------------------------------------------------------------
//
// - config:     Configuration structs loaded from JSON
// - schema:     Rate / state event definitions
// - util:       Time and number parsing helpers
// - subgraph:   GraphQL-over-HTTP transport
// - sink:       Output sinks handed to scrapers
// - protocols:  Protocol scrapers and scraper registry
// - collector:  Update loop per protocol
// - publisher:  Drains output channels into the ingest master
// - metrics:    Global runtime counters
//
mod config;
mod schema;
mod util;
mod subgraph;
mod sink;
mod protocols;
mod collector;
mod publisher;
mod metrics;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Context;
use log::{error, info, warn};
use rustls::crypto::{CryptoProvider, ring};
use tokio::time::sleep;

use collector::runner::run_protocol;
use config::{Config, load_config};
use metrics::METRICS;
use protocols::get_scraper;
use publisher::{IngestPool, forward};
use schema::{RateEvent, StateEvent};
use sink::DefiSinks;

const DEFAULT_CONFIG_PATH: &str = "config.json";
const METRICS_INTERVAL: Duration = Duration::from_secs(10);

// ------------------------------------------------------------
// Application entry point
// ------------------------------------------------------------
//
// Responsibilities:
// - Initialize logging and the rustls crypto backend
// - Load configuration
// - Wire scrapers -> output channels -> ingest pool
// - Start enabled protocol scrapers
// - Run until the publisher stops
//
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = config_path();
    let config: Config = load_config(&config_path)?;

    init_logging(config.debug_log());
    info!("loaded configuration from {}", config_path);

    // rustls >= 0.23 needs an explicit provider before the first TLS handshake
    if CryptoProvider::install_default(ring::default_provider()).is_err() {
        warn!("rustls crypto provider was already installed");
    }

    // --------------------------------------------------------
    // Output side: bounded channels drained into the ingest pool
    // --------------------------------------------------------
    let timeout = config.channel.send_timeout();
    let (rate_sink, rate_rx) = sink::channel::<RateEvent>(config.channel.capacity, timeout);
    let (state_sink, state_rx) = sink::channel::<StateEvent>(config.channel.capacity, timeout);
    let sinks = DefiSinks {
        rates: rate_sink,
        states: state_sink,
    };

    let pool = IngestPool::new(
        config.ingest.url.clone(),
        &config.ingest.key,
        config.debug_log(),
        config.ingest.connections,
        config.ingest.demo.unwrap_or(false),
    );
    let publisher = tokio::spawn(forward(rate_rx, state_rx, Arc::new(pool)));

    tokio::spawn(async {
        loop {
            sleep(METRICS_INTERVAL).await;
            info!("[METRICS] {}", METRICS.summary());
        }
    });

    // --------------------------------------------------------
    // Start all enabled protocol scrapers
    // --------------------------------------------------------
    let http_timeout = Duration::from_secs(config.http.timeout_secs);
    let mut started = 0;

    for protocol_cfg in config.protocols.iter().filter(|p| p.enabled) {
        let Some(scraper) = get_scraper(protocol_cfg, sinks.clone(), http_timeout)
            .with_context(|| format!("creating scraper '{}'", protocol_cfg.name))?
        else {
            error!("protocol '{}' is not supported", protocol_cfg.name);
            continue;
        };

        METRICS.protocols_active.fetch_add(1, Ordering::Relaxed);
        run_protocol(scraper, protocol_cfg.interval());
        started += 1;
    }

    if started == 0 {
        anyhow::bail!("no enabled and supported protocols in {}", config_path);
    }

    // The scrapers hold the only remaining sink handles, so the
    // publisher runs for as long as any of them does.
    drop(sinks);
    publisher.await.context("publisher task failed")?;

    Ok(())
}

/// First CLI argument, then `COLLECTOR_CONFIG`, then `config.json`.
fn config_path() -> String {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("COLLECTOR_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` when the config asks for it.
fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}
