/// Collector module
///
/// Groups the logic responsible for:
/// - Starting protocol scrapers
/// - Driving their update cycles on a timer
/// - Accounting for failed cycles
///
/// Protocol-specific logic MUST NOT live here; it belongs to the
/// scrapers under `protocols`.
pub mod runner;
