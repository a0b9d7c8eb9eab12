use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Result, anyhow};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use rand::random_range;
use tokio::sync::{Mutex, Notify, mpsc, watch};
use tokio::time::{Duration, sleep};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::metrics::METRICS;
use crate::schema::{DefiMessage, RateEvent, StateEvent};
use crate::sink::RecordSink;

const QUEUE_CAPACITY: usize = 10_000;
const RECONNECT_DELAY: Duration = Duration::from_secs(30);
const PING_INTERVAL: Duration = Duration::from_secs(30);
const SEND_ATTEMPTS: usize = 3;

/// Login frame expected by the ingest master.
pub fn login_message(key: &str) -> String {
    format!("key={}&role=collector", key)
}

/// ============================================================
/// IngestSender
/// ============================================================
///
/// A single persistent WebSocket connection to the ingest master.
///
/// Responsibilities:
/// - Perform login handshake
/// - Send JSON messages from an internal queue
/// - Send periodic JSON pings
/// - Reconnect automatically when the connection drops
///
/// Messages are dropped (and counted) when the queue is full.
pub struct IngestSender {
    /// Queue feeding the current connection; replaced on every reconnect.
    queue: Arc<Mutex<mpsc::Sender<String>>>,

    /// Flips to `true` after the first successful login.
    connected: watch::Receiver<bool>,
}

impl IngestSender {

    /// Starts a persistent reconnect loop to the master.
    ///
    /// Never fails; connection errors are logged and retried after
    /// `reconnect_delay`. Each connection gets a fresh queue, installed
    /// as soon as the previous one drops, so records sent while
    /// reconnecting are buffered for the next connection.
    pub fn connect_loop(url: String, login: String, debug: bool, reconnect_delay: Duration) -> Self {
        let (tx, mut rx) = mpsc::channel::<String>(QUEUE_CAPACITY);
        let queue = Arc::new(Mutex::new(tx));
        let (connected_tx, connected) = watch::channel(false);

        tokio::spawn({
            let queue = queue.clone();

            async move {
                loop {
                    if let Err(e) = Self::try_connect(&url, &login, debug, rx, &connected_tx).await {
                        warn!("ingest connection to {} lost: {:#}", url, e);
                    }
                    METRICS.ingest_reconnects.fetch_add(1, Ordering::Relaxed);

                    let (tx, next_rx) = mpsc::channel::<String>(QUEUE_CAPACITY);
                    *queue.lock().await = tx;
                    rx = next_rx;

                    sleep(reconnect_delay).await;
                }
            }
        });

        Self { queue, connected }
    }

    /// Runs one connection until it fails or the master closes it.
    async fn try_connect(
        url: &str,
        login: &str,
        debug: bool,
        mut rx: mpsc::Receiver<String>,
        connected: &watch::Sender<bool>,
    ) -> Result<()> {
        let (ws, _) = connect_async(url).await?;
        let (mut write, mut read) = ws.split();

        let closed = Arc::new(Notify::new());

        write.send(Message::Text(login.to_string().into())).await?;
        if debug {
            debug!("ingest login sent to {}", url);
        }
        connected.send_replace(true);

        // Reader: drain incoming frames, signal the writer on EOF
        tokio::spawn({
            let closed = closed.clone();

            async move {
                while let Some(Ok(msg)) = read.next().await {
                    if debug && msg.is_text() {
                        debug!("[ingest recv] {}", msg.to_text().unwrap_or_default());
                    }
                }
                closed.notify_one();
            }
        });

        let mut ping = tokio::time::interval(PING_INTERVAL);

        loop {
            tokio::select! {
                Some(json) = rx.recv() => {
                    if debug {
                        debug!("[ingest send] {}", json);
                    }
                    write.send(Message::Text(json.into())).await?;
                }

                _ = ping.tick() => {
                    write.send(Message::Text(r#"{"op":"ping"}"#.into())).await?;
                }

                _ = closed.notified() => {
                    return Err(anyhow!("ingest master closed the connection"));
                }
            }
        }
    }

    /// Enqueues a serialized message for the current connection.
    ///
    /// Waits for the first login, then never blocks: a full queue
    /// drops the message.
    pub async fn send(&self, json: String) -> Result<()> {
        let mut connected = self.connected.clone();
        connected
            .wait_for(|up| *up)
            .await
            .map_err(|_| anyhow!("ingest sender stopped"))?;

        let tx = self.queue.lock().await.clone();
        match tx.try_send(json) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                METRICS.dropped_records.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => Err(anyhow!("ingest queue error: {}", e)),
        }
    }
}

/// ============================================================
/// IngestPool
/// ============================================================
///
/// Several `IngestSender` connections behind one `RecordSink`.
///
/// DEMO MODE:
/// - No network connections
/// - Messages are logged at info level
pub struct IngestPool {
    senders: Vec<IngestSender>,
    demo: bool,
}

impl IngestPool {
    pub fn new(url: String, key: &str, debug: bool, count: usize, demo: bool) -> Self {
        if demo {
            warn!("ingest pool running in DEMO mode");
        }

        let senders = if demo {
            Vec::new()
        } else {
            (0..count)
                .map(|_| {
                    IngestSender::connect_loop(url.clone(), login_message(key), debug, RECONNECT_DELAY)
                })
                .collect()
        };

        Self { senders, demo }
    }

    /// Sends a message through a randomly selected connection,
    /// retrying a few times before giving up.
    pub async fn send(&self, msg: &DefiMessage) -> Result<()> {
        let json = serde_json::to_string(msg)?;

        if self.demo {
            info!("DEMO -> {}", json);
            return Ok(());
        }
        if self.senders.is_empty() {
            return Err(anyhow!("ingest pool has no connections"));
        }

        for _ in 0..SEND_ATTEMPTS {
            let idx = random_range(0..self.senders.len());
            if self.senders[idx].send(json.clone()).await.is_ok() {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }

        Err(anyhow!("all ingest connections unavailable"))
    }
}

#[async_trait::async_trait]
impl RecordSink<DefiMessage> for IngestPool {
    async fn put(&self, item: DefiMessage) -> Result<()> {
        self.send(&item).await
    }
}

/// Drains the rate and state channels into `out`.
///
/// Returns once both channels are closed and empty. Publish failures
/// are logged and counted; the record is not retried.
pub async fn forward(
    mut rates: mpsc::Receiver<RateEvent>,
    mut states: mpsc::Receiver<StateEvent>,
    out: Arc<dyn RecordSink<DefiMessage>>,
) {
    let mut rates_open = true;
    let mut states_open = true;

    while rates_open || states_open {
        let msg = tokio::select! {
            r = rates.recv(), if rates_open => match r {
                Some(r) => DefiMessage::Rate(r),
                None => {
                    rates_open = false;
                    continue;
                }
            },
            s = states.recv(), if states_open => match s {
                Some(s) => DefiMessage::State(s),
                None => {
                    states_open = false;
                    continue;
                }
            },
        };

        match out.put(msg).await {
            Ok(()) => {
                METRICS.records_forwarded.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                METRICS.publish_errors.fetch_add(1, Ordering::Relaxed);
                warn!("failed to publish record: {:#}", e);
            }
        }
    }

    info!("output channels closed, publisher stopping");
}
