/// Ordered, deduplicated notification cache for one client session
///
/// Entries stay sorted newest-first by `(created_at, id)`. Live pushes and
/// fetched pages go through the same `ingest` path, so an id is only ever
/// stored once whichever way it arrives first.
use std::collections::HashSet;

use crate::models::{Cursor, Notification, NotificationId};

#[derive(Debug, Default)]
pub struct ClientCache {
    entries: Vec<Notification>,
    ids: HashSet<NotificationId>,
    unread: usize,
}

impl ClientCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at its ordered position. Returns `false` for a known id, in
    /// which case nothing changes.
    pub fn ingest(&mut self, notification: Notification) -> bool {
        if self.ids.contains(&notification.id) {
            return false;
        }

        let key = (notification.created_at, &notification.id);
        let pos = self
            .entries
            .partition_point(|e| (e.created_at, &e.id) > key);

        self.ids.insert(notification.id.clone());
        if !notification.read {
            self.unread += 1;
        }
        self.entries.insert(pos, notification);
        true
    }

    /// Ingest in order; returns how many were new.
    pub fn ingest_all(&mut self, notifications: impl IntoIterator<Item = Notification>) -> usize {
        let mut added = 0;
        for notification in notifications {
            if self.ingest(notification) {
                added += 1;
            }
        }
        added
    }

    /// Returns `true` if the entry went from unread to read.
    pub fn mark_read(&mut self, id: &NotificationId) -> bool {
        match self.entries.iter_mut().find(|e| &e.id == id) {
            Some(entry) if !entry.read => {
                entry.read = true;
                self.unread = self.unread.saturating_sub(1);
                true
            }
            _ => false,
        }
    }

    /// Mark every unread entry read; returns the ids that changed.
    pub fn mark_all_read(&mut self) -> Vec<NotificationId> {
        let changed: Vec<NotificationId> = self
            .entries
            .iter_mut()
            .filter(|e| !e.read)
            .map(|e| {
                e.read = true;
                e.id.clone()
            })
            .collect();
        self.unread = 0;
        changed
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }

    /// Count unread entries from scratch
    pub fn recount_unread(&self) -> usize {
        self.entries.iter().filter(|e| !e.read).count()
    }

    pub fn items(&self) -> &[Notification] {
        &self.entries
    }

    pub fn get(&self, id: &NotificationId) -> Option<&Notification> {
        self.entries.iter().find(|e| &e.id == id)
    }

    pub fn contains(&self, id: &NotificationId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Backfill boundary: the oldest cached entry
    pub fn oldest_cursor(&self) -> Option<Cursor> {
        self.entries.last().map(Notification::cursor)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.ids.clear();
        self.unread = 0;
    }
}
