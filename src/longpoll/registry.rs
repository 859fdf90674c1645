//! # Category Registry
//!
//! Maps category names to their event buffer and parked tickets.
//!
//! Each category has its own mutex; the map lock is held only for
//! lookup, insertion or removal, never while a category is being modified.
//!
//! Lock order is map, then category. A category removed from the map is
//! marked retired under its own lock; callers holding a stale `Arc` see the
//! flag and look the category up again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use serde::Serialize;

use super::coordinator::WaiterSet;
use super::errors::{LongpollError, LongpollResult};
use super::store::EventBuffer;

/// State guarded by a category's lock
#[derive(Debug)]
pub(crate) struct CategoryState {
    pub(crate) buffer: EventBuffer,
    pub(crate) waiters: WaiterSet,
    /// Set once the entry has been removed from the registry
    pub(crate) retired: bool,
}

impl CategoryState {
    /// Never published to and nobody waiting
    pub(crate) fn is_idle(&self) -> bool {
        self.buffer.is_empty() && self.buffer.last_sequence() == 0 && self.waiters.len() == 0
    }
}

/// One category's buffer and waiter set
#[derive(Debug)]
pub struct CategoryEntry {
    name: String,
    state: Mutex<CategoryState>,
}

impl CategoryEntry {
    fn new(name: String, capacity: usize, ttl: Duration) -> Self {
        Self {
            name,
            state: Mutex::new(CategoryState {
                buffer: EventBuffer::new(capacity, ttl),
                waiters: WaiterSet::default(),
                retired: false,
            }),
        }
    }

    /// Category name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn lock(&self) -> LongpollResult<MutexGuard<'_, CategoryState>> {
        self.state.lock().map_err(|_| LongpollError::poisoned())
    }

    /// Point-in-time view of this category
    pub fn stats(&self) -> LongpollResult<CategoryStats> {
        let state = self.lock()?;
        Ok(CategoryStats {
            category: self.name.clone(),
            buffered: state.buffer.len(),
            waiting: state.waiters.len(),
            last_sequence: state.buffer.last_sequence(),
        })
    }
}

/// Category statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryStats {
    pub category: String,
    pub buffered: usize,
    pub waiting: usize,
    pub last_sequence: u64,
}

/// Registry of categories
#[derive(Debug)]
pub struct CategoryRegistry {
    /// Entries by category name
    entries: RwLock<HashMap<String, Arc<CategoryEntry>>>,

    /// Buffer capacity for new categories
    capacity: usize,

    /// Event TTL for new categories
    ttl: Duration,

    /// Set by `drain`; no category can be created afterwards
    sealed: AtomicBool,
}

impl CategoryRegistry {
    /// Create a new registry
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity,
            ttl,
            sealed: AtomicBool::new(false),
        }
    }

    /// Look up a category
    pub fn get(&self, name: &str) -> LongpollResult<Option<Arc<CategoryEntry>>> {
        let entries = self.entries.read().map_err(|_| LongpollError::poisoned())?;
        Ok(entries.get(name).cloned())
    }

    /// Look up a category, creating it if absent.
    ///
    /// Fails with `ManagerClosed` once the registry has been drained.
    pub fn get_or_create(&self, name: &str) -> LongpollResult<Arc<CategoryEntry>> {
        if let Some(entry) = self.get(name)? {
            return Ok(entry);
        }

        let mut entries = self.entries.write().map_err(|_| LongpollError::poisoned())?;
        if self.sealed.load(Ordering::SeqCst) {
            return Err(LongpollError::ManagerClosed);
        }
        let entry = entries
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CategoryEntry::new(name.to_string(), self.capacity, self.ttl)));
        Ok(Arc::clone(entry))
    }

    /// All current entries. The map lock is released on return.
    pub fn snapshot(&self) -> LongpollResult<Vec<Arc<CategoryEntry>>> {
        let entries = self.entries.read().map_err(|_| LongpollError::poisoned())?;
        Ok(entries.values().cloned().collect())
    }

    /// Remove the given entries if they are still registered and still idle.
    /// Returns how many were removed.
    pub fn remove_idle(&self, candidates: &[Arc<CategoryEntry>]) -> LongpollResult<usize> {
        if candidates.is_empty() {
            return Ok(0);
        }

        let mut entries = self.entries.write().map_err(|_| LongpollError::poisoned())?;
        let mut removed = 0;
        for candidate in candidates {
            // The name may have been re-created since the candidate was picked
            let registered = entries
                .get(candidate.name())
                .is_some_and(|entry| Arc::ptr_eq(entry, candidate));
            if !registered {
                continue;
            }

            let retired = match candidate.lock() {
                Ok(mut state) if state.is_idle() => {
                    state.retired = true;
                    true
                }
                _ => false,
            };
            if retired {
                entries.remove(candidate.name());
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove and return every entry; later `get_or_create` calls fail
    pub fn drain(&self) -> LongpollResult<Vec<Arc<CategoryEntry>>> {
        let mut entries = self.entries.write().map_err(|_| LongpollError::poisoned())?;
        self.sealed.store(true, Ordering::SeqCst);
        Ok(entries.drain().map(|(_, entry)| entry).collect())
    }

    /// Number of categories
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
