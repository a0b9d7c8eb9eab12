/// ProtocolScraper is the abstraction layer between:
/// - The generic collector runtime (timer, error accounting)
/// - Protocol-specific subgraph queries and field mapping
///
/// Each protocol implementation must:
/// - Fetch its markets from the remote source
/// - Normalize figures into `RateEvent` / `StateEvent`
/// - Push results into the injected `DefiSinks`
///
/// THREAD SAFETY:
/// - Must be Send + Sync
/// - Instances are shared with the runner task via `Arc`
///
#[async_trait::async_trait]
pub trait ProtocolScraper: Send + Sync {

    /// Returns the scraper identifier.
    ///
    /// CONTRACT:
    /// - Must match `protocols[].name` in configuration
    fn name(&self) -> &'static str;

    /// Fetches all markets and emits one `RateEvent` per market.
    ///
    /// Stops at the first record that fails to parse. Events already
    /// sent for the current batch stay sent.
    async fn update_rate(&self) -> anyhow::Result<()>;

    /// Fetches all markets and emits exactly one `StateEvent`.
    async fn update_state(&self) -> anyhow::Result<()>;
}
