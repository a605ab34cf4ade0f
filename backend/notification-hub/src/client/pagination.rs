//! Cursor-based backfill of older history

use super::api::PageRequest;
use super::cache::ClientCache;
use crate::models::Notification;
use crate::store::ListQuery;

/// Tracks whether older pages remain and whether one is being fetched.
///
/// The boundary is always the oldest cached entry, so the cursor only moves
/// back in time and a cleared cache restarts from the newest page.
#[derive(Debug)]
pub struct Paginator {
    page_size: u32,
    has_more: bool,
    in_flight: bool,
}

impl Paginator {
    /// The page size is held to the server's listing cap, otherwise every
    /// full page would read as the last one.
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size.clamp(1, ListQuery::MAX_LIMIT),
            has_more: true,
            in_flight: false,
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Next request, or `None` when exhausted or a fetch is already running.
    pub fn begin(&mut self, cache: &ClientCache) -> Option<PageRequest> {
        if !self.has_more || self.in_flight {
            return None;
        }
        self.in_flight = true;
        Some(PageRequest {
            limit: self.page_size,
            before: cache.oldest_cursor(),
        })
    }

    /// Merge a fetched page; returns how many entries were new.
    pub fn complete(&mut self, cache: &mut ClientCache, items: Vec<Notification>) -> usize {
        self.in_flight = false;
        self.has_more = items.len() as u32 >= self.page_size;
        cache.ingest_all(items)
    }

    /// A failed fetch leaves the cache and `has_more` untouched.
    pub fn fail(&mut self) {
        self.in_flight = false;
    }

    pub fn reset(&mut self) {
        self.has_more = true;
        self.in_flight = false;
    }
}
