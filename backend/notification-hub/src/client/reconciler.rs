//! Optimistic read-state with server confirmation
//!
//! Local state flips to read before the confirmation is sent. A failed
//! confirmation keeps the optimistic state; the failure is logged and
//! handed back so the session can surface it.

use std::sync::Arc;
use tracing::warn;

use super::api::NotificationApi;
use super::cache::ClientCache;
use crate::error::SyncError;
use crate::models::NotificationId;

pub struct ReadReconciler {
    api: Arc<dyn NotificationApi>,
}

/// A confirmation that still has to be sent
pub struct PendingConfirm {
    ids: Vec<NotificationId>,
    api: Arc<dyn NotificationApi>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmOutcome {
    pub ids: Vec<NotificationId>,
    pub result: Result<(), SyncError>,
}

impl PendingConfirm {
    pub fn ids(&self) -> &[NotificationId] {
        &self.ids
    }

    pub async fn send(self) -> ConfirmOutcome {
        let result = match self.ids.as_slice() {
            [id] => self.api.confirm_read(id).await,
            ids => self.api.confirm_read_many(ids).await,
        };
        ConfirmOutcome {
            ids: self.ids,
            result,
        }
    }
}

impl ReadReconciler {
    pub fn new(api: Arc<dyn NotificationApi>) -> Self {
        Self { api }
    }

    /// Apply locally, then confirm. Ids not in the cache are ignored.
    ///
    /// An entry that is already read is confirmed again; the server treats
    /// repeated confirmations as no-ops.
    pub fn mark_read(&self, cache: &mut ClientCache, id: &NotificationId) -> Option<PendingConfirm> {
        if !cache.contains(id) {
            return None;
        }
        cache.mark_read(id);
        Some(self.pending(vec![id.clone()]))
    }

    /// Flip every unread entry and confirm them in one call.
    pub fn mark_all_read(&self, cache: &mut ClientCache) -> Option<PendingConfirm> {
        let changed = cache.mark_all_read();
        if changed.is_empty() {
            None
        } else {
            Some(self.pending(changed))
        }
    }

    /// Settle a finished confirmation. Optimistic state is kept either way.
    pub fn settle(&self, outcome: ConfirmOutcome) -> Option<SyncError> {
        match outcome.result {
            Ok(()) => None,
            Err(e) => {
                warn!(
                    error = %e,
                    count = outcome.ids.len(),
                    "Read confirmation failed, keeping local state"
                );
                Some(e)
            }
        }
    }

    fn pending(&self, ids: Vec<NotificationId>) -> PendingConfirm {
        PendingConfirm {
            ids,
            api: Arc::clone(&self.api),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::{notification_at, MockApi};

    fn setup() -> (Arc<MockApi>, ReadReconciler, ClientCache) {
        let api = Arc::new(MockApi::new());
        let reconciler = ReadReconciler::new(api.clone());
        let mut cache = ClientCache::new();
        cache.ingest_all(vec![
            notification_at("n1", 1, false),
            notification_at("n2", 2, false),
            notification_at("n3", 3, true),
        ]);
        (api, reconciler, cache)
    }

    #[tokio::test]
    async fn test_mark_read_is_optimistic() {
        let (api, reconciler, mut cache) = setup();

        let pending = reconciler.mark_read(&mut cache, &"n1".into()).unwrap();
        // Applied before the call resolves
        assert!(cache.get(&"n1".into()).unwrap().read);
        assert_eq!(cache.unread_count(), 1);
        assert!(api.confirmed().is_empty());

        let outcome = pending.send().await;
        assert!(reconciler.settle(outcome).is_none());
        assert_eq!(api.confirmed(), vec![NotificationId::from("n1")]);
    }

    #[tokio::test]
    async fn test_mark_read_twice_never_goes_negative() {
        let (_api, reconciler, mut cache) = setup();
        reconciler.mark_read(&mut cache, &"n1".into());
        reconciler.mark_read(&mut cache, &"n1".into());
        assert!(cache.get(&"n1".into()).unwrap().read);
        assert_eq!(cache.unread_count(), 1);
        assert_eq!(cache.unread_count(), cache.recount_unread());
    }

    #[tokio::test]
    async fn test_unknown_id_is_ignored() {
        let (_api, reconciler, mut cache) = setup();
        assert!(reconciler.mark_read(&mut cache, &"missing".into()).is_none());
        assert_eq!(cache.unread_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_confirmation_keeps_optimistic_state() {
        let (api, reconciler, mut cache) = setup();
        api.fail_confirmations(true);

        let pending = reconciler.mark_read(&mut cache, &"n2".into()).unwrap();
        let err = reconciler.settle(pending.send().await).unwrap();

        assert!(matches!(err, SyncError::ConfirmReadFailed { ref id, .. } if id.as_str() == "n2"));
        assert!(cache.get(&"n2".into()).unwrap().read);
        assert_eq!(cache.unread_count(), 1);
    }

    #[tokio::test]
    async fn test_mark_all_read_confirms_changed_entries() {
        let (api, reconciler, mut cache) = setup();

        let pending = reconciler.mark_all_read(&mut cache).unwrap();
        let mut ids = pending.ids().to_vec();
        ids.sort();
        assert_eq!(ids, vec![NotificationId::from("n1"), NotificationId::from("n2")]);
        assert_eq!(cache.unread_count(), 0);

        assert!(reconciler.settle(pending.send().await).is_none());
        let mut confirmed = api.confirmed();
        confirmed.sort();
        assert_eq!(confirmed, ids);

        assert!(reconciler.mark_all_read(&mut cache).is_none());
    }
}
