//! Session-scoped notification service
//!
//! Everything that touches the cache runs on one dispatch loop fed by a
//! single channel: transport events, host commands and the completions of
//! spawned network calls. Completions that arrive after teardown are
//! dropped through the liveness flag.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::api::{NotificationApi, PageRequest};
use super::cache::ClientCache;
use super::connection::{ConnectionManager, ConnectionStatus, ConnectionUpdate};
use super::pagination::Paginator;
use super::reconciler::{ConfirmOutcome, ReadReconciler};
use super::transport::{Transport, TransportEvent};
use crate::config::ClientConfig;
use crate::error::SyncError;
use crate::models::{Cursor, Notification, NotificationId, RecipientScope};
use crate::websocket::ServerEvent;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    MarkRead(NotificationId),
    MarkAllRead,
    LoadMore,
    /// Drop the cache and start again from the newest page
    Refresh,
    Retry,
    Logout,
}

#[derive(Debug)]
pub enum SessionEvent {
    Transport(TransportEvent),
    Command(Command),
    PageLoaded {
        generation: u64,
        result: Result<Vec<Notification>, SyncError>,
    },
    /// Page fetched after a rejoin, newest first, until it meets the cache
    CaughtUp {
        generation: u64,
        result: Result<Vec<Notification>, SyncError>,
    },
    ReadConfirmed(ConfirmOutcome),
}

/// What the host renders
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationView {
    pub items: Vec<Notification>,
    pub unread_count: usize,
    pub has_more: bool,
    pub loading: bool,
    pub status: ConnectionStatus,
}

impl Default for NotificationView {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            unread_count: 0,
            has_more: true,
            loading: false,
            status: ConnectionStatus::Idle,
        }
    }
}

pub struct NotificationSession {
    scope: RecipientScope,
    cache: ClientCache,
    paginator: Paginator,
    reconciler: ReadReconciler,
    connection: ConnectionManager,
    api: Arc<dyn NotificationApi>,
    events: mpsc::UnboundedSender<SessionEvent>,
    view: watch::Sender<NotificationView>,
    errors: mpsc::UnboundedSender<SyncError>,
    alive: Arc<AtomicBool>,
    generation: u64,
}

impl NotificationSession {
    /// Start a session for an authenticated user. Requires a tokio runtime.
    pub fn start(
        config: &ClientConfig,
        token: impl Into<String>,
        scope: RecipientScope,
        api: Arc<dyn NotificationApi>,
        transport: Arc<dyn Transport>,
    ) -> SessionHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (transport_tx, mut transport_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(NotificationView::default());
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();

        let forward = events_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = transport_rx.recv().await {
                if forward.send(SessionEvent::Transport(event)).is_err() {
                    break;
                }
            }
        });

        let session = NotificationSession {
            connection: ConnectionManager::new(
                transport,
                transport_tx,
                token,
                &scope,
                config.reconnect.clone(),
            ),
            scope,
            cache: ClientCache::new(),
            paginator: Paginator::new(config.page_size),
            reconciler: ReadReconciler::new(Arc::clone(&api)),
            api,
            events: events_tx.clone(),
            view: view_tx,
            errors: errors_tx,
            alive: Arc::new(AtomicBool::new(true)),
            generation: 0,
        };

        SessionHandle {
            events: events_tx,
            view: view_rx,
            errors: errors_rx,
            task: Some(tokio::spawn(session.run(events_rx))),
        }
    }

    async fn run(mut self, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        info!(scope = %self.scope, room = %self.connection.room(), "Notification session started");
        self.connection.connect();
        self.load_page();
        self.publish();

        while let Some(event) = events.recv().await {
            if !self.dispatch(event) {
                break;
            }
            self.publish();
        }

        self.alive.store(false, Ordering::SeqCst);
        self.connection.teardown();
        self.publish();
        info!(scope = %self.scope, "Notification session closed");
    }

    /// Returns `false` once the session should stop.
    fn dispatch(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Transport(TransportEvent::Message(message)) => {
                self.on_server_event(message)
            }
            SessionEvent::Transport(event) => match self.connection.handle(&event) {
                ConnectionUpdate::Joined { rejoin: true } => self.catch_up(None),
                ConnectionUpdate::Joined { rejoin: false } | ConnectionUpdate::Unchanged => {}
                ConnectionUpdate::Error(e) => self.report(e),
            },
            SessionEvent::Command(Command::Logout) => return false,
            SessionEvent::Command(command) => self.on_command(command),
            SessionEvent::PageLoaded { generation, result } => {
                if generation != self.generation {
                    debug!(generation, "Discarding page from before refresh");
                    return true;
                }
                match result {
                    Ok(items) => {
                        let fetched = items.len();
                        let added = self.paginator.complete(&mut self.cache, items);
                        debug!(fetched, added, has_more = self.paginator.has_more(), "Page merged");
                    }
                    Err(e) => {
                        self.paginator.fail();
                        self.report(e);
                    }
                }
            }
            SessionEvent::CaughtUp { generation, result } => {
                if generation != self.generation {
                    return true;
                }
                match result {
                    Ok(items) => {
                        let fetched = items.len();
                        let boundary = items.last().map(Notification::cursor);
                        let added = self.cache.ingest_all(items);
                        debug!(fetched, added, "Caught up after reconnect");
                        if let Some(boundary) = boundary {
                            self.continue_catch_up(fetched, added, boundary);
                        }
                    }
                    Err(e) => self.report(e),
                }
            }
            SessionEvent::ReadConfirmed(outcome) => {
                if let Some(e) = self.reconciler.settle(outcome) {
                    self.report(e);
                }
            }
        }
        true
    }

    fn on_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::NotificationCreated(notification) => {
                let id = notification.id.clone();
                if self.cache.ingest(notification) {
                    debug!(id = %id, "Live notification");
                } else {
                    debug!(id = %id, "Duplicate delivery ignored");
                }
            }
            ServerEvent::Error { code, message } => {
                self.report(SyncError::ConnectionError(format!("{}: {}", code, message)))
            }
            other => debug!(event = ?other, "Server event"),
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::MarkRead(id) => {
                if let Some(pending) = self.reconciler.mark_read(&mut self.cache, &id) {
                    self.spawn(async move { SessionEvent::ReadConfirmed(pending.send().await) });
                }
            }
            Command::MarkAllRead => {
                if let Some(pending) = self.reconciler.mark_all_read(&mut self.cache) {
                    self.spawn(async move { SessionEvent::ReadConfirmed(pending.send().await) });
                }
            }
            Command::LoadMore => self.load_page(),
            Command::Refresh => {
                self.generation += 1;
                self.cache.clear();
                self.paginator.reset();
                self.load_page();
            }
            Command::Retry => {
                self.connection.retry();
                if self.cache.is_empty() {
                    self.load_page();
                }
            }
            Command::Logout => {}
        }
    }

    fn load_page(&mut self) {
        let Some(request) = self.paginator.begin(&self.cache) else {
            return;
        };
        self.fetch(request, |generation, result| SessionEvent::PageLoaded {
            generation,
            result,
        });
    }

    fn catch_up(&mut self, before: Option<Cursor>) {
        let request = PageRequest {
            limit: self.paginator.page_size(),
            before,
        };
        self.fetch(request, |generation, result| SessionEvent::CaughtUp {
            generation,
            result,
        });
    }

    /// A full page of unseen items that still sits above older cached
    /// entries leaves a gap; keep paging down until the two meet.
    fn continue_catch_up(&mut self, fetched: usize, added: usize, boundary: Cursor) {
        let full = fetched >= self.paginator.page_size() as usize;
        let older_cached = self
            .cache
            .oldest_cursor()
            .map_or(false, |oldest| oldest < boundary);
        if full && added == fetched && older_cached {
            self.catch_up(Some(boundary));
        }
    }

    fn fetch<F>(&self, request: PageRequest, complete: F)
    where
        F: FnOnce(u64, Result<Vec<Notification>, SyncError>) -> SessionEvent + Send + 'static,
    {
        let api = Arc::clone(&self.api);
        let scope = self.scope.clone();
        let generation = self.generation;
        self.spawn(async move {
            let result = api.fetch_page(&scope, &request).await;
            complete(generation, result)
        });
    }

    fn spawn<F>(&self, work: F)
    where
        F: Future<Output = SessionEvent> + Send + 'static,
    {
        let alive = Arc::clone(&self.alive);
        let events = self.events.clone();
        tokio::spawn(async move {
            let event = work.await;
            if alive.load(Ordering::SeqCst) {
                let _ = events.send(event);
            }
        });
    }

    fn report(&self, error: SyncError) {
        if !matches!(error, SyncError::ConfirmReadFailed { .. }) {
            warn!(error = %error, "Notification sync degraded");
        }
        let _ = self.errors.send(error);
    }

    fn publish(&self) {
        let view = NotificationView {
            items: self.cache.items().to_vec(),
            unread_count: self.cache.unread_count(),
            has_more: self.paginator.has_more(),
            loading: self.paginator.in_flight(),
            status: self.connection.status(),
        };
        self.view.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }
}

/// Host-side handle. Dropping it logs the session out.
pub struct SessionHandle {
    events: mpsc::UnboundedSender<SessionEvent>,
    view: watch::Receiver<NotificationView>,
    errors: mpsc::UnboundedReceiver<SyncError>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    fn command(&self, command: Command) {
        if self.events.send(SessionEvent::Command(command)).is_err() {
            debug!("Notification session already closed");
        }
    }

    pub fn mark_read(&self, id: impl Into<NotificationId>) {
        self.command(Command::MarkRead(id.into()));
    }

    pub fn mark_all_read(&self) {
        self.command(Command::MarkAllRead);
    }

    pub fn load_more(&self) {
        self.command(Command::LoadMore);
    }

    pub fn refresh(&self) {
        self.command(Command::Refresh);
    }

    /// Reconnect after going offline and reload an empty cache
    pub fn retry(&self) {
        self.command(Command::Retry);
    }

    pub fn view(&self) -> watch::Receiver<NotificationView> {
        self.view.clone()
    }

    pub fn snapshot(&self) -> NotificationView {
        self.view.borrow().clone()
    }

    pub async fn next_error(&mut self) -> Option<SyncError> {
        self.errors.recv().await
    }

    pub fn try_next_error(&mut self) -> Option<SyncError> {
        self.errors.try_recv().ok()
    }

    /// Leave the room, close the connection and wait for the session to stop.
    pub async fn logout(mut self) {
        self.command(Command::Logout);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.events.send(SessionEvent::Command(Command::Logout));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::{
        eventually, fast_backoff, notification_at, wait_for, MockApi, MockTransport,
    };
    use crate::client::transport::DisconnectReason;
    use std::time::Duration;

    const ROOM: &str = "admin:all";

    fn config(page_size: u32) -> ClientConfig {
        ClientConfig {
            page_size,
            reconnect: fast_backoff(3),
            ..ClientConfig::default()
        }
    }

    fn start(
        page_size: u32,
        api: &Arc<MockApi>,
        transport: &Arc<MockTransport>,
    ) -> SessionHandle {
        NotificationSession::start(
            &config(page_size),
            "token",
            RecipientScope::Admin,
            api.clone(),
            transport.clone(),
        )
    }

    fn unread_three() -> Vec<Notification> {
        vec![
            notification_at("n3", 3, false),
            notification_at("n2", 2, false),
            notification_at("n1", 1, false),
        ]
    }

    fn ids(view: &NotificationView) -> Vec<&str> {
        view.items.iter().map(|n| n.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_empty_backend() {
        let api = Arc::new(MockApi::new());
        api.push_page(Vec::new());
        let transport = Arc::new(MockTransport::new());
        let handle = start(20, &api, &transport);

        let view = wait_for(&mut handle.view(), |v| {
            !v.loading && !v.has_more && v.status == ConnectionStatus::Online
        })
        .await;
        assert!(view.items.is_empty());
        assert_eq!(view.unread_count, 0);
    }

    #[tokio::test]
    async fn test_live_push_with_new_id() {
        let api = Arc::new(MockApi::new());
        api.push_page(unread_three());
        let transport = Arc::new(MockTransport::new());
        let handle = start(20, &api, &transport);
        let mut view = handle.view();
        wait_for(&mut view, |v| v.items.len() == 3 && v.status == ConnectionStatus::Online).await;

        transport.deliver(notification_at("n4", 4, false));
        let v = wait_for(&mut view, |v| v.items.len() == 4).await;
        assert_eq!(v.unread_count, 4);
        assert_eq!(ids(&v), vec!["n4", "n3", "n2", "n1"]);
    }

    #[tokio::test]
    async fn test_duplicate_push_changes_nothing() {
        let api = Arc::new(MockApi::new());
        api.push_page(unread_three());
        let transport = Arc::new(MockTransport::new());
        let handle = start(20, &api, &transport);
        let mut view = handle.view();
        wait_for(&mut view, |v| v.items.len() == 3 && v.status == ConnectionStatus::Online).await;

        transport.deliver(notification_at("n2", 2, false));
        // Marker processed after the duplicate
        transport.deliver(notification_at("n9", 9, true));
        let v = wait_for(&mut view, |v| v.items.iter().any(|n| n.id.as_str() == "n9")).await;
        assert_eq!(v.items.len(), 4);
        assert_eq!(v.unread_count, 3);
    }

    #[tokio::test]
    async fn test_mark_read_decrements_by_one() {
        let api = Arc::new(MockApi::new());
        api.push_page(vec![notification_at("n1", 1, false)]);
        let transport = Arc::new(MockTransport::new());
        let handle = start(20, &api, &transport);
        let mut view = handle.view();
        wait_for(&mut view, |v| v.unread_count == 1).await;

        handle.mark_read("n1");
        let v = wait_for(&mut view, |v| v.items[0].read).await;
        assert_eq!(v.unread_count, 0);

        eventually(|| api.confirmed() == vec![NotificationId::from("n1")]).await;

        handle.mark_read("n1");
        eventually(|| api.confirmed().len() == 2).await;
        assert_eq!(handle.snapshot().unread_count, 0);
    }

    #[tokio::test]
    async fn test_failed_confirmation_keeps_read_state() {
        let api = Arc::new(MockApi::new());
        api.push_page(unread_three());
        api.fail_confirmations(true);
        let transport = Arc::new(MockTransport::new());
        let mut handle = start(20, &api, &transport);
        let mut view = handle.view();
        wait_for(&mut view, |v| v.items.len() == 3).await;

        handle.mark_read("n2");
        let err = tokio::time::timeout(Duration::from_secs(2), handle.next_error())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(err, SyncError::ConfirmReadFailed { ref id, .. } if id.as_str() == "n2"));

        let v = handle.snapshot();
        assert!(v.items.iter().find(|n| n.id.as_str() == "n2").unwrap().read);
        assert_eq!(v.unread_count, 2);
    }

    #[tokio::test]
    async fn test_mark_all_read() {
        let api = Arc::new(MockApi::new());
        api.push_page(unread_three());
        let transport = Arc::new(MockTransport::new());
        let handle = start(20, &api, &transport);
        let mut view = handle.view();
        wait_for(&mut view, |v| v.items.len() == 3).await;

        handle.mark_all_read();
        let v = wait_for(&mut view, |v| v.unread_count == 0).await;
        assert!(v.items.iter().all(|n| n.read));
        eventually(|| api.confirmed().len() == 3).await;
    }

    #[tokio::test]
    async fn test_server_drop_rejoins_exactly_once() {
        let api = Arc::new(MockApi::new());
        let transport = Arc::new(MockTransport::new());
        let mut handle = start(20, &api, &transport);
        eventually(|| transport.joins(ROOM) == 1).await;

        // Two failed attempts before the reconnect succeeds
        transport.fail_next_opens(2);
        transport.drop_connection(DisconnectReason::ServerInitiated);

        let mut view = handle.view();
        wait_for(&mut view, |v| v.status == ConnectionStatus::Online).await;
        eventually(|| transport.joins(ROOM) == 2).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(transport.joins(ROOM), 2);
        assert_eq!(transport.opens(), 4);
        assert!(matches!(
            handle.try_next_error(),
            Some(SyncError::ConnectionError(_))
        ));
    }

    #[tokio::test]
    async fn test_rejoin_fetches_missed_notifications() {
        let api = Arc::new(MockApi::new());
        api.push_page(vec![notification_at("n1", 1, false)]);
        let transport = Arc::new(MockTransport::new());
        let handle = start(20, &api, &transport);
        let mut view = handle.view();
        wait_for(&mut view, |v| v.items.len() == 1 && v.status == ConnectionStatus::Online).await;

        // Published while the connection was down
        api.push_page(vec![notification_at("n2", 2, false), notification_at("n1", 1, false)]);
        transport.drop_connection(DisconnectReason::ServerInitiated);

        let v = wait_for(&mut view, |v| v.items.len() == 2).await;
        assert_eq!(ids(&v), vec!["n2", "n1"]);
        assert_eq!(v.unread_count, 2);
    }

    #[tokio::test]
    async fn test_rejoin_pages_until_gap_is_closed() {
        let api = Arc::new(MockApi::new());
        api.push_page(vec![notification_at("n1", 1, false), notification_at("n0", 0, true)]);
        let transport = Arc::new(MockTransport::new());
        let handle = start(2, &api, &transport);
        let mut view = handle.view();
        wait_for(&mut view, |v| v.items.len() == 2 && v.status == ConnectionStatus::Online).await;

        // Four missed while down, two per page, then the overlap
        api.push_page(vec![notification_at("n5", 5, false), notification_at("n4", 4, false)]);
        api.push_page(vec![notification_at("n3", 3, false), notification_at("n2", 2, false)]);
        api.push_page(vec![notification_at("n1", 1, false), notification_at("n0", 0, true)]);
        transport.drop_connection(DisconnectReason::ServerInitiated);

        let v = wait_for(&mut view, |v| v.items.len() == 6).await;
        assert_eq!(ids(&v), vec!["n5", "n4", "n3", "n2", "n1", "n0"]);
        assert_eq!(v.unread_count, 5);

        eventually(|| api.requests().len() == 4).await;
        let before: Vec<Option<String>> = api
            .requests()
            .iter()
            .map(|r| r.before.as_ref().map(|c| c.id.to_string()))
            .collect();
        assert_eq!(
            before,
            vec![None, None, Some("n4".to_string()), Some("n2".to_string())]
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(api.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_load_more_appends_older_items() {
        let api = Arc::new(MockApi::new());
        api.push_page(vec![
            notification_at("n5", 5, false),
            notification_at("n4", 4, true),
            notification_at("n3", 3, false),
        ]);
        api.push_page(vec![notification_at("n2", 2, false), notification_at("n1", 1, true)]);
        let transport = Arc::new(MockTransport::new());
        let handle = start(3, &api, &transport);
        let mut view = handle.view();
        let first = wait_for(&mut view, |v| v.items.len() == 3 && !v.loading).await;
        assert!(first.has_more);

        handle.load_more();
        let v = wait_for(&mut view, |v| v.items.len() == 5).await;
        assert_eq!(ids(&v), vec!["n5", "n4", "n3", "n2", "n1"]);
        assert!(!v.has_more);
        assert_eq!(v.unread_count, 3);

        let requests = api.requests();
        assert_eq!(requests[1].before.as_ref().unwrap().id, NotificationId::from("n3"));
    }

    #[tokio::test]
    async fn test_fetch_failure_then_retry() {
        let api = Arc::new(MockApi::new());
        api.push_failure(SyncError::FetchFailed("status 500".into()));
        let transport = Arc::new(MockTransport::new());
        let mut handle = start(20, &api, &transport);

        let err = tokio::time::timeout(Duration::from_secs(2), handle.next_error())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(err, SyncError::FetchFailed("status 500".into()));
        assert!(handle.snapshot().items.is_empty());

        api.push_page(vec![notification_at("n1", 1, false)]);
        handle.retry();
        let v = wait_for(&mut handle.view(), |v| v.items.len() == 1).await;
        assert_eq!(v.unread_count, 1);
    }

    #[tokio::test]
    async fn test_offline_after_budget_until_retry() {
        let api = Arc::new(MockApi::new());
        let transport = Arc::new(MockTransport::new());
        transport.fail_next_opens(100);
        let mut handle = start(20, &api, &transport);
        let mut view = handle.view();

        wait_for(&mut view, |v| v.status == ConnectionStatus::Offline).await;
        let mut saw_exhausted = false;
        while let Some(err) = handle.try_next_error() {
            saw_exhausted |= err == SyncError::ReconnectExhausted { attempts: 3 };
        }
        assert!(saw_exhausted);
        assert_eq!(transport.joins(ROOM), 0);

        transport.fail_next_opens(0);
        handle.retry();
        wait_for(&mut view, |v| v.status == ConnectionStatus::Online).await;
        eventually(|| transport.joins(ROOM) == 1).await;
    }

    #[tokio::test]
    async fn test_refresh_reloads_from_newest() {
        let api = Arc::new(MockApi::new());
        api.push_page(unread_three());
        let transport = Arc::new(MockTransport::new());
        let handle = start(20, &api, &transport);
        let mut view = handle.view();
        wait_for(&mut view, |v| v.items.len() == 3).await;

        api.push_page(vec![notification_at("n7", 7, true)]);
        handle.refresh();
        let v = wait_for(&mut view, |v| v.items.len() == 1).await;
        assert_eq!(ids(&v), vec!["n7"]);
        assert_eq!(v.unread_count, 0);
        assert!(api.requests().iter().all(|r| r.before.is_none()));
    }

    #[tokio::test]
    async fn test_logout_leaves_and_closes() {
        let api = Arc::new(MockApi::new());
        let transport = Arc::new(MockTransport::new());
        let handle = start(20, &api, &transport);
        let view = handle.view();
        eventually(|| transport.joins(ROOM) == 1).await;

        handle.logout().await;

        assert!(transport.is_closed());
        assert_eq!(transport.leaves(ROOM), 1);
        assert_eq!(view.borrow().status, ConnectionStatus::Closed);
    }

    #[tokio::test]
    async fn test_dropping_handle_tears_down() {
        let api = Arc::new(MockApi::new());
        let transport = Arc::new(MockTransport::new());
        let handle = start(20, &api, &transport);
        eventually(|| transport.joins(ROOM) == 1).await;

        drop(handle);
        eventually(|| transport.is_closed()).await;
        assert_eq!(transport.leaves(ROOM), 1);
    }
}
