//! Recovery of completion-list origins for completion-item resolve.
//!
//! A resolve request only carries the item itself. Every completion list the
//! router returns is tagged with an id pointing at a cached
//! [`CompletionRequestContext`], so the resolve can be routed back to the
//! server and virtual document that produced the item.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use url::Url;

use crate::document::LanguageKind;
use crate::error::LockResultExt;

/// Default number of completion lists whose origin is remembered.
pub const DEFAULT_CAPACITY: usize = 10;

/// Where a completion list came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequestContext {
    pub host_document_uri: Url,
    pub projected_uri: Url,
    pub projected_kind: LanguageKind,
    /// Name of the backing server that answered.
    pub server_name: String,
}

/// Bounded FIFO cache of completion contexts keyed by opaque ids.
///
/// Lookups racing an eviction simply miss.
pub struct CompletionRequestContextCache {
    capacity: AtomicUsize,
    next_id: AtomicU64,
    entries: Mutex<VecDeque<(u64, Arc<CompletionRequestContext>)>>,
}

impl Default for CompletionRequestContextCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl CompletionRequestContextCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: AtomicUsize::new(capacity.max(1)),
            next_id: AtomicU64::new(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Change the capacity; the oldest entries are evicted if needed.
    pub fn set_capacity(&self, capacity: usize) {
        let capacity = capacity.max(1);
        self.capacity.store(capacity, Ordering::Relaxed);
        if let Ok(mut entries) = self.entries.lock().recover_poison("completion_cache.set_capacity") {
            while entries.len() > capacity {
                entries.pop_front();
            }
        }
    }

    /// Remember `context` and return the id to embed in completion items.
    pub fn set(&self, context: CompletionRequestContext) -> u64 {
        self.insert(Arc::new(context))
    }

    pub fn insert(&self, context: Arc<CompletionRequestContext>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let capacity = self.capacity();
        if let Ok(mut entries) = self.entries.lock().recover_poison("completion_cache.insert") {
            while entries.len() >= capacity {
                entries.pop_front();
            }
            entries.push_back((id, context));
        }
        id
    }

    pub fn get(&self, id: u64) -> Option<Arc<CompletionRequestContext>> {
        let entries = self.entries.lock().recover_poison("completion_cache.get").ok()?;
        entries
            .iter()
            .find(|(entry_id, _)| *entry_id == id)
            .map(|(_, context)| Arc::clone(context))
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .recover_poison("completion_cache.len")
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
