//! Test doubles for the client side
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;

use resilience::BackoffConfig;

use super::api::{NotificationApi, PageRequest};
use super::session::NotificationView;
use super::transport::{DisconnectReason, EventSink, Transport, TransportEvent};
use crate::error::SyncError;
use crate::models::{Notification, NotificationId, RecipientScope};
use crate::websocket::{ClientFrame, ServerEvent};

/// Admin-scoped notification created `minute` minutes after a fixed origin.
/// The title mirrors the id.
pub fn notification_at(id: &str, minute: i64, read: bool) -> Notification {
    let origin = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
    Notification {
        id: id.into(),
        recipient_scope: RecipientScope::Admin,
        title: id.to_string(),
        message: format!("message for {}", id),
        created_at: origin + ChronoDuration::minutes(minute),
        read,
        payload: None,
    }
}

pub fn fast_backoff(max_attempts: u32) -> BackoffConfig {
    BackoffConfig {
        max_attempts,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        multiplier: 2.0,
        jitter: false,
    }
}

pub async fn wait_for(
    view: &mut watch::Receiver<NotificationView>,
    predicate: impl Fn(&NotificationView) -> bool,
) -> NotificationView {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            {
                let current = view.borrow_and_update();
                if predicate(&current) {
                    return current.clone();
                }
            }
            view.changed().await.expect("session stopped");
        }
    })
    .await
    .expect("view never matched")
}

pub async fn eventually(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held")
}

#[derive(Default)]
struct TransportState {
    sink: Option<EventSink>,
    sent: Vec<ClientFrame>,
    epoch: u64,
    opens: u32,
    failures: u32,
    closed: bool,
}

/// In-process transport that records frames and lets tests inject events
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<TransportState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` opens fail; zero clears pending failures.
    pub fn fail_next_opens(&self, n: u32) {
        self.state.lock().unwrap().failures = n;
    }

    pub fn opens(&self) -> u32 {
        self.state.lock().unwrap().opens
    }

    pub fn sent(&self) -> Vec<ClientFrame> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn joins(&self, room: &str) -> usize {
        self.sent()
            .iter()
            .filter(|f| matches!(f, ClientFrame::Join { room: r } if r.as_str() == room))
            .count()
    }

    pub fn leaves(&self, room: &str) -> usize {
        self.sent()
            .iter()
            .filter(|f| matches!(f, ClientFrame::Leave { room: r } if r.as_str() == room))
            .count()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn emit(&self, event: TransportEvent) {
        let state = self.state.lock().unwrap();
        let sink = state.sink.as_ref().expect("transport never opened");
        sink.send(event).expect("session is gone");
    }

    pub fn deliver(&self, notification: Notification) {
        self.emit(TransportEvent::Message(ServerEvent::NotificationCreated(
            notification,
        )));
    }

    pub fn drop_connection(&self, reason: DisconnectReason) {
        self.emit(TransportEvent::Disconnected(reason));
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, _token: &str, sink: EventSink) -> Result<(), SyncError> {
        let mut state = self.state.lock().unwrap();
        state.opens += 1;
        state.sink = Some(sink.clone());
        if state.failures > 0 {
            state.failures -= 1;
            return Err(SyncError::ConnectionError("connection refused".into()));
        }
        state.epoch += 1;
        state.closed = false;
        let _ = sink.send(TransportEvent::Connected { epoch: state.epoch });
        Ok(())
    }

    fn send(&self, frame: ClientFrame) -> Result<(), SyncError> {
        self.state.lock().unwrap().sent.push(frame);
        Ok(())
    }

    fn close(&self) {
        self.state.lock().unwrap().closed = true;
    }
}

#[derive(Default)]
struct ApiState {
    pages: VecDeque<Result<Vec<Notification>, SyncError>>,
    requests: Vec<PageRequest>,
    confirmed: Vec<NotificationId>,
    fail_confirm: bool,
}

/// Scripted REST collaborator. Unscripted fetches return an empty page.
#[derive(Default)]
pub struct MockApi {
    state: Mutex<ApiState>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_page(&self, items: Vec<Notification>) {
        self.state.lock().unwrap().pages.push_back(Ok(items));
    }

    pub fn push_failure(&self, error: SyncError) {
        self.state.lock().unwrap().pages.push_back(Err(error));
    }

    pub fn fail_confirmations(&self, fail: bool) {
        self.state.lock().unwrap().fail_confirm = fail;
    }

    pub fn requests(&self) -> Vec<PageRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn confirmed(&self) -> Vec<NotificationId> {
        self.state.lock().unwrap().confirmed.clone()
    }
}

#[async_trait]
impl NotificationApi for MockApi {
    async fn fetch_page(
        &self,
        _scope: &RecipientScope,
        request: &PageRequest,
    ) -> Result<Vec<Notification>, SyncError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());
        state.pages.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn confirm_read(&self, id: &NotificationId) -> Result<(), SyncError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_confirm {
            return Err(SyncError::ConfirmReadFailed {
                id: id.clone(),
                reason: "status 503 Service Unavailable".into(),
            });
        }
        state.confirmed.push(id.clone());
        Ok(())
    }
}
