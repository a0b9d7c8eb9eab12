//! Protocol scraper registry and factory
//!
//! All protocol-specific logic lives in dedicated scraper modules.
//! The rest of the application interacts exclusively through the
//! `ProtocolScraper` trait.

pub mod scraper;
pub mod nuo;

use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::config::ProtocolConfig;
use crate::sink::DefiSinks;
use crate::subgraph::SubgraphClient;
use scraper::ProtocolScraper;

/// Returns a scraper instance for a configured protocol.
///
/// RETURNS:
/// - `Ok(Some(..))` if the protocol is supported
/// - `Ok(None)` if the name is unknown
/// - `Err` if the scraper's HTTP client cannot be built
///
/// CONTRACT:
/// - `cfg.name` must match the scraper's `name()`
/// - `cfg.endpoint` overrides the scraper's built-in subgraph URL
///
pub fn get_scraper(
    cfg: &ProtocolConfig,
    sinks: DefiSinks,
    http_timeout: Duration,
) -> anyhow::Result<Option<Arc<dyn ProtocolScraper>>> {
    let scraper: Arc<dyn ProtocolScraper> = match cfg.name.as_str() {
        "nuo" => {
            let endpoint = cfg.endpoint.as_deref().unwrap_or(nuo::NUO_SUBGRAPH_URL);
            let client = SubgraphClient::new(endpoint, http_timeout)?;
            debug!("nuo scraper querying {}", client.endpoint());
            Arc::new(nuo::NuoScraper::new(Arc::new(client), cfg.info.clone(), sinks))
        }
        _ => return Ok(None),
    };

    Ok(Some(scraper))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ProtocolInfo, RateEvent, StateEvent};
    use crate::sink::testing::CollectSink;

    fn sinks() -> DefiSinks {
        DefiSinks {
            rates: Arc::new(CollectSink::<RateEvent>::default()),
            states: Arc::new(CollectSink::<StateEvent>::default()),
        }
    }

    fn protocol(name: &str) -> ProtocolConfig {
        ProtocolConfig {
            name: name.into(),
            enabled: true,
            endpoint: None,
            interval_secs: 60,
            info: ProtocolInfo {
                name: name.to_uppercase(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn resolves_nuo() {
        let scraper = get_scraper(&protocol("nuo"), sinks(), Duration::from_secs(5))
            .unwrap()
            .expect("nuo is registered");
        assert_eq!(scraper.name(), "nuo");
    }

    #[test]
    fn unknown_protocol_is_none() {
        let scraper = get_scraper(&protocol("compound"), sinks(), Duration::from_secs(5)).unwrap();
        assert!(scraper.is_none());
    }
}
