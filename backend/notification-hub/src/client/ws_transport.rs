//! WebSocket transport over tokio-tungstenite
//!
//! Drops the server did not ask for (errors, heartbeat silence, abrupt EOF)
//! are retried here with bounded backoff. A close frame from the server ends
//! the connection task; the caller decides whether to reconnect.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use resilience::{with_timeout_result, Backoff, BackoffConfig};

use super::transport::{DisconnectReason, EventSink, Transport, TransportEvent};
use crate::config::ClientConfig;
use crate::error::SyncError;
use crate::websocket::{ClientFrame, ServerEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WsTransport {
    url: String,
    connect_timeout: Duration,
    heartbeat_timeout: Duration,
    reconnect: BackoffConfig,
    epoch: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
    outbound: Mutex<Option<mpsc::UnboundedSender<ClientFrame>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl WsTransport {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            url: config.ws_url.clone(),
            connect_timeout: config.request_timeout,
            heartbeat_timeout: config.heartbeat_timeout,
            reconnect: config.reconnect.clone(),
            epoch: Arc::new(AtomicU64::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
            outbound: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    fn url_with_token(&self, token: &str) -> String {
        let sep = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}token={}", self.url, sep, token)
    }
}

async fn dial(url: &str, timeout: Duration) -> Result<WsStream, String> {
    with_timeout_result(timeout, connect_async(url))
        .await
        .map(|(stream, _response)| stream)
        .map_err(|e| e.to_string())
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, token: &str, sink: EventSink) -> Result<(), SyncError> {
        let previous = lock(&self.task).take();
        if let Some(previous) = previous {
            previous.abort();
        }
        self.closed.store(false, Ordering::SeqCst);

        let url = self.url_with_token(token);
        let stream = dial(&url, self.connect_timeout)
            .await
            .map_err(SyncError::ConnectionError)?;

        // Install the sender before announcing the epoch; the join is sent in
        // response to `Connected`.
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.outbound) = Some(tx);

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        info!(epoch, "WebSocket connected");
        let _ = sink.send(TransportEvent::Connected { epoch });

        let link = Link {
            url,
            connect_timeout: self.connect_timeout,
            heartbeat_timeout: self.heartbeat_timeout,
            reconnect: self.reconnect.clone(),
            epoch: Arc::clone(&self.epoch),
            closed: Arc::clone(&self.closed),
            sink,
        };
        *lock(&self.task) = Some(tokio::spawn(link.run(stream, rx)));
        Ok(())
    }

    fn send(&self, frame: ClientFrame) -> Result<(), SyncError> {
        match lock(&self.outbound).as_ref() {
            Some(tx) => tx
                .send(frame)
                .map_err(|_| SyncError::ConnectionError("connection task has stopped".to_string())),
            None => Err(SyncError::ConnectionError("not connected".to_string())),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Dropping the sender lets the connection task send a close frame and exit
        lock(&self.outbound).take();
    }
}

/// State owned by the background connection task
struct Link {
    url: String,
    connect_timeout: Duration,
    heartbeat_timeout: Duration,
    reconnect: BackoffConfig,
    epoch: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
    sink: EventSink,
}

impl Link {
    async fn run(self, mut stream: WsStream, mut outbound: mpsc::UnboundedReceiver<ClientFrame>) {
        loop {
            let reason = self.drive(&mut stream, &mut outbound).await;
            debug!(reason = %reason, "WebSocket disconnected");
            let _ = self.sink.send(TransportEvent::Disconnected(reason.clone()));

            match reason {
                DisconnectReason::ServerInitiated | DisconnectReason::ClientInitiated => return,
                _ => {}
            }

            match self.redial().await {
                Some(next) => {
                    stream = next;
                    // Frames queued for the dead connection are stale
                    while outbound.try_recv().is_ok() {}
                    let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
                    info!(epoch, "WebSocket reconnected");
                    let _ = self.sink.send(TransportEvent::Connected { epoch });
                }
                None => return,
            }
        }
    }

    /// Dials up to `max_attempts` times, the first one immediately, the same
    /// budget `retry_with_backoff` spends.
    async fn redial(&self) -> Option<WsStream> {
        let mut backoff = Backoff::new(self.reconnect.clone());
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return None;
            }
            match dial(&self.url, self.connect_timeout).await {
                Ok(stream) => return Some(stream),
                Err(e) => warn!(
                    error = %e,
                    attempt = backoff.attempts() + 1,
                    "WebSocket reconnect failed"
                ),
            }

            match backoff.next_delay() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => {
                    warn!(attempts = backoff.attempts(), "WebSocket reconnect budget exhausted");
                    let _ = self.sink.send(TransportEvent::GaveUp);
                    return None;
                }
            }
        }
    }

    async fn drive(
        &self,
        stream: &mut WsStream,
        outbound: &mut mpsc::UnboundedReceiver<ClientFrame>,
    ) -> DisconnectReason {
        let silence = tokio::time::sleep(self.heartbeat_timeout);
        tokio::pin!(silence);

        loop {
            tokio::select! {
                incoming = stream.next() => {
                    silence.as_mut().reset(Instant::now() + self.heartbeat_timeout);
                    match incoming {
                        Some(Ok(Message::Text(text))) => match ServerEvent::from_json(text.as_str()) {
                            Ok(event) => {
                                let _ = self.sink.send(TransportEvent::Message(event));
                            }
                            Err(e) => warn!(error = %e, "Ignoring malformed server event"),
                        },
                        Some(Ok(Message::Close(frame))) => {
                            debug!(frame = ?frame, "Server sent close");
                            return DisconnectReason::ServerInitiated;
                        }
                        // Pings are answered by tungstenite on the next read
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return DisconnectReason::TransportError(e.to_string()),
                        None => return DisconnectReason::TransportError("stream ended".to_string()),
                    }
                }
                frame = outbound.recv() => match frame {
                    Some(frame) => {
                        let json = match frame.to_json() {
                            Ok(json) => json,
                            Err(e) => {
                                warn!(error = %e, "Failed to encode client frame");
                                continue;
                            }
                        };
                        if let Err(e) = stream.send(Message::Text(json.into())).await {
                            return DisconnectReason::TransportError(e.to_string());
                        }
                    }
                    None => {
                        let _ = stream.close(None).await;
                        return DisconnectReason::ClientInitiated;
                    }
                },
                _ = &mut silence => return DisconnectReason::PingTimeout,
            }
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }
}
