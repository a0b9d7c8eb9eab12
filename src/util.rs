//! Small helpers shared by scrapers.
//!
//! No protocol-specific logic should live here.

use anyhow::Context;

/// Returns the current Unix timestamp in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Parse a subgraph numeric string into `f64`.
///
/// Subgraphs encode BigDecimal values as strings. `field` names the
/// source field in the error context.
pub fn parse_figure(raw: &str, field: &str) -> anyhow::Result<f64> {
    raw.trim()
        .parse::<f64>()
        .with_context(|| format!("invalid number in `{field}`: {raw:?}"))
}
