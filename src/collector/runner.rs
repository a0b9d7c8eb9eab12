use std::sync::Arc;
use std::sync::atomic::Ordering;

use log::{debug, error, info};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};

use crate::{
    metrics::METRICS,
    protocols::scraper::ProtocolScraper,
};

/// Outcome of one update cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub rate_ok: bool,
    pub state_ok: bool,
}

/// Runs one rate update followed by one state update.
///
/// A failure in either step is logged and counted; it never
/// prevents the other step from running.
pub async fn run_cycle(scraper: &dyn ProtocolScraper) -> CycleReport {
    METRICS.cycles_run.fetch_add(1, Ordering::Relaxed);

    let rate_ok = match scraper.update_rate().await {
        Ok(()) => true,
        Err(e) => {
            error!("[{}] rate update failed: {:#}", scraper.name(), e);
            false
        }
    };

    let state_ok = match scraper.update_state().await {
        Ok(()) => true,
        Err(e) => {
            error!("[{}] state update failed: {:#}", scraper.name(), e);
            false
        }
    };

    CycleReport { rate_ok, state_ok }
}

/// Starts the periodic update loop for a single protocol.
///
/// The first cycle runs immediately. Slow cycles delay the next
/// tick instead of bursting to catch up.
///
/// GUARANTEES:
/// - The loop never exits voluntarily; abort the handle to stop it
/// - Errors are retried on the next tick, not sooner
///
pub fn run_protocol(scraper: Arc<dyn ProtocolScraper>, every: Duration) -> JoinHandle<()> {
    info!("starting {} scraper, interval {:?}", scraper.name(), every);

    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let report = run_cycle(scraper.as_ref()).await;
            if report.rate_ok && report.state_ok {
                debug!("[{}] cycle complete", scraper.name());
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingScraper {
        rate_calls: AtomicUsize,
        state_calls: AtomicUsize,
        fail_rate: bool,
    }

    impl CountingScraper {
        fn new(fail_rate: bool) -> Self {
            Self {
                rate_calls: AtomicUsize::new(0),
                state_calls: AtomicUsize::new(0),
                fail_rate,
            }
        }
    }

    #[async_trait::async_trait]
    impl ProtocolScraper for CountingScraper {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn update_rate(&self) -> anyhow::Result<()> {
            self.rate_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_rate {
                anyhow::bail!("subgraph down");
            }
            Ok(())
        }

        async fn update_state(&self) -> anyhow::Result<()> {
            self.state_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn cycle_runs_both_updates() {
        let s = CountingScraper::new(false);

        let report = run_cycle(&s).await;

        assert_eq!(report, CycleReport { rate_ok: true, state_ok: true });
        assert_eq!(s.rate_calls.load(Ordering::SeqCst), 1);
        assert_eq!(s.state_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rate_failure_does_not_skip_state() {
        let s = CountingScraper::new(true);

        let report = run_cycle(&s).await;

        assert!(!report.rate_ok);
        assert!(report.state_ok);
        assert_eq!(s.state_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn protocol_loop_ticks_on_interval() {
        let s = Arc::new(CountingScraper::new(false));
        let handle = run_protocol(s.clone(), Duration::from_secs(60));

        // first tick fires immediately
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(s.rate_calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(s.rate_calls.load(Ordering::SeqCst), 3);
        assert_eq!(s.state_calls.load(Ordering::SeqCst), 3);

        handle.abort();
    }
}
