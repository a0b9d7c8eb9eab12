use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::mpsc;

use crate::metrics::METRICS;
use crate::schema::{RateEvent, StateEvent};

/// Write-only output endpoint handed to scrapers.
///
/// Scrapers never see where records go; the receiving side
/// (publisher, tests, storage) is wired up by `main`.
#[async_trait::async_trait]
pub trait RecordSink<T: Send + 'static>: Send + Sync {
    async fn put(&self, item: T) -> anyhow::Result<()>;
}

// ------------------------------------------------------------
// Channel-backed sink
// ------------------------------------------------------------
//
// Bounded mpsc queue. Without a timeout `put` waits for capacity;
// with one, a full queue fails the put once the timeout elapses.
//
pub struct ChannelSink<T> {
    tx: mpsc::Sender<T>,
    send_timeout: Option<Duration>,
}

impl<T> ChannelSink<T> {
    pub fn new(tx: mpsc::Sender<T>, send_timeout: Option<Duration>) -> Self {
        Self { tx, send_timeout }
    }
}

/// Creates a bounded channel and wraps its sender in a `ChannelSink`.
pub fn channel<T>(
    capacity: usize,
    send_timeout: Option<Duration>,
) -> (Arc<ChannelSink<T>>, mpsc::Receiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (Arc::new(ChannelSink::new(tx, send_timeout)), rx)
}

#[async_trait::async_trait]
impl<T: Send + 'static> RecordSink<T> for ChannelSink<T> {
    async fn put(&self, item: T) -> anyhow::Result<()> {
        match self.send_timeout {
            None => self
                .tx
                .send(item)
                .await
                .map_err(|_| anyhow!("output channel closed")),

            Some(timeout) => match self.tx.send_timeout(item, timeout).await {
                Ok(()) => Ok(()),
                Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                    METRICS.dropped_records.fetch_add(1, Ordering::Relaxed);
                    Err(anyhow!("output channel full for {:?}", timeout))
                }
                Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                    Err(anyhow!("output channel closed"))
                }
            },
        }
    }
}

/// The pair of sinks every protocol scraper writes into.
#[derive(Clone)]
pub struct DefiSinks {
    pub rates: Arc<dyn RecordSink<RateEvent>>,
    pub states: Arc<dyn RecordSink<StateEvent>>,
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use tokio::sync::Mutex;

    /// Records everything it receives.
    pub struct CollectSink<T> {
        pub items: Mutex<Vec<T>>,
    }

    impl<T> Default for CollectSink<T> {
        fn default() -> Self {
            Self { items: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait::async_trait]
    impl<T: Send + 'static> RecordSink<T> for CollectSink<T> {
        async fn put(&self, item: T) -> anyhow::Result<()> {
            self.items.lock().await.push(item);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_delivers_in_order() {
        let (sink, mut rx) = channel::<u32>(4, None);
        sink.put(1).await.unwrap();
        sink.put(2).await.unwrap();

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
    }

    #[tokio::test]
    async fn put_fails_when_receiver_dropped() {
        let (sink, rx) = channel::<u32>(4, None);
        drop(rx);

        assert!(sink.put(1).await.is_err());
    }

    #[tokio::test]
    async fn full_channel_times_out() {
        let (sink, mut rx) = channel::<u32>(1, Some(Duration::from_millis(20)));
        sink.put(1).await.unwrap();

        let err = sink.put(2).await.unwrap_err();
        assert!(err.to_string().contains("full"));

        // the first record is still there, the second was refused
        assert_eq!(rx.recv().await, Some(1));
        assert!(rx.try_recv().is_err());
    }
}
