use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Context;
use log::{debug, info};
use serde::{Deserialize, Deserializer};

use crate::{
    metrics::METRICS,
    schema::{ProtocolInfo, RateEvent, StateEvent},
    sink::DefiSinks,
    subgraph::{GraphQlResponse, SubgraphSource},
    util,
};

use super::scraper::ProtocolScraper;

/// Public Nuo Network subgraph.
pub const NUO_SUBGRAPH_URL: &str = "https://api.thegraph.com/subgraphs/name/sudeepb02/nuonetwork";

/// Market id whose liquidated total is reported as the USD total.
pub const USDC_MARKET: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";

/// Market id whose settled total is reported as the ETH total.
pub const ETH_MARKET: &str = "0x0000000000000000000000000000000000000000";

const ASSET_LABEL: &str = "Nuo";

const USERS_QUERY: &str = r#"
{
  users {
    id
    lastUpdateTimestamp
    liquidityRate
    name
    price {
      id
    }
    totalOrdersLiquidated
    totalOrdersSettled
  }
}
"#;

#[derive(Debug, Deserialize, Default)]
pub struct NuoData {
    #[serde(default)]
    pub users: Vec<NuoUser>,
}

/// One market entity as returned by the subgraph.
///
/// Every field tolerates `null` or absence and decodes to its zero
/// value, so one malformed record never fails the whole batch; bad
/// figures surface later, per record, when they are parsed.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NuoUser {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,

    #[serde(default, deserialize_with = "int_or_string")]
    pub last_update_timestamp: i64,

    #[serde(default, deserialize_with = "null_as_default")]
    pub liquidity_rate: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub price: PriceRef,

    #[serde(default, deserialize_with = "null_as_default")]
    pub total_orders_liquidated: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub total_orders_settled: String,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PriceRef {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
}

fn null_as_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

// Subgraph BigInt fields come back either as JSON numbers or strings.
fn int_or_string<'de, D: Deserializer<'de>>(de: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Str(String),
    }

    match Option::<Raw>::deserialize(de)? {
        None => Ok(0),
        Some(Raw::Int(v)) => Ok(v),
        Some(Raw::Str(s)) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Last record with the given id, if any.
fn find_market<'a>(users: &'a [NuoUser], id: &str) -> Option<&'a NuoUser> {
    users.iter().rev().find(|u| u.id == id)
}

/// Nuo Network lending scraper.
///
/// Maps the subgraph's per-market order totals onto lending and
/// borrowing figures. Pure field mapping: no retries, no caching.
pub struct NuoScraper {
    source: Arc<dyn SubgraphSource>,
    protocol: ProtocolInfo,
    sinks: DefiSinks,
}

impl NuoScraper {
    pub fn new(source: Arc<dyn SubgraphSource>, protocol: ProtocolInfo, sinks: DefiSinks) -> Self {
        Self {
            source,
            protocol,
            sinks,
        }
    }

    async fn fetch_markets(&self) -> anyhow::Result<Vec<NuoUser>> {
        let body = self.source.post_query(USERS_QUERY).await.inspect_err(|_| {
            METRICS.fetch_errors.fetch_add(1, Ordering::Relaxed);
        })?;

        let response: GraphQlResponse<NuoData> = serde_json::from_str(&body)
            .context("decoding nuo subgraph response")
            .inspect_err(|_| {
                METRICS.parse_errors.fetch_add(1, Ordering::Relaxed);
            })?;

        let data = response.into_data().inspect_err(|_| {
            METRICS.fetch_errors.fetch_add(1, Ordering::Relaxed);
        })?;

        debug!("nuo: fetched {} markets", data.users.len());
        Ok(data.users)
    }

    fn rate_for(&self, market: &NuoUser) -> anyhow::Result<RateEvent> {
        debug!(
            "market {} ({}) price {} liquidity rate {} updated at {}",
            market.id, market.name, market.price.id, market.liquidity_rate, market.last_update_timestamp
        );

        let lending_rate = util::parse_figure(&market.total_orders_liquidated, "totalOrdersLiquidated")
            .with_context(|| format!("market {}", market.id))?;
        let borrowing_rate = util::parse_figure(&market.total_orders_settled, "totalOrdersSettled")
            .with_context(|| format!("market {}", market.id))?;

        Ok(RateEvent {
            timestamp: util::now_ms(),
            asset: ASSET_LABEL.to_string(),
            protocol: self.protocol.clone(),
            lending_rate,
            borrowing_rate,
        })
    }
}

fn figure_or_zero(market: Option<&NuoUser>, field: &str, pick: fn(&NuoUser) -> &str) -> anyhow::Result<f64> {
    match market {
        Some(m) => util::parse_figure(pick(m), field).with_context(|| format!("market {}", m.id)),
        None => Ok(0.0),
    }
}

#[async_trait::async_trait]
impl ProtocolScraper for NuoScraper {

    fn name(&self) -> &'static str {
        "nuo"
    }

    async fn update_rate(&self) -> anyhow::Result<()> {
        info!("updating DeFi rates for {}", self.protocol.name);

        let markets = self.fetch_markets().await?;

        for market in &markets {
            let rate = self.rate_for(market).inspect_err(|_| {
                METRICS.parse_errors.fetch_add(1, Ordering::Relaxed);
            })?;

            debug!("writing DeFi rate {:?}", rate);
            self.sinks.rates.put(rate).await.context("sending rate event")?;
            METRICS.rates_emitted.fetch_add(1, Ordering::Relaxed);
        }

        info!("rate update complete for {} ({} markets)", self.protocol.name, markets.len());
        Ok(())
    }

    async fn update_state(&self) -> anyhow::Result<()> {
        info!("updating DeFi state for {}", self.protocol.name);

        let markets = self.fetch_markets().await?;

        let total_usd = figure_or_zero(
            find_market(&markets, USDC_MARKET),
            "totalOrdersLiquidated",
            |m| m.total_orders_liquidated.as_str(),
        );
        let total_eth = figure_or_zero(
            find_market(&markets, ETH_MARKET),
            "totalOrdersSettled",
            |m| m.total_orders_settled.as_str(),
        );
        let (total_usd, total_eth) = match (total_usd, total_eth) {
            (Ok(usd), Ok(eth)) => (usd, eth),
            (Err(e), _) | (_, Err(e)) => {
                METRICS.parse_errors.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        let state = StateEvent {
            timestamp: util::now_ms(),
            protocol: self.protocol.name.clone(),
            total_usd,
            total_eth,
        };

        debug!("writing DeFi state {:?}", state);
        self.sinks.states.put(state).await.context("sending state event")?;
        METRICS.states_emitted.fetch_add(1, Ordering::Relaxed);

        info!("state update complete for {}", self.protocol.name);
        Ok(())
    }
}
