//! Per-archive cache of nested archives.

use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use tracing::trace;

use crate::{Archive, Result};

type Slot = Arc<Mutex<Option<Arc<Archive>>>>;

/// Nested archives materialized from the entries of one parent archive.
///
/// Keys are entry names inside the owning archive. Because every archive owns
/// its own cache, the effective key is (parent instance, entry name) and two
/// different parents never share children. Each key has its own slot lock,
/// so concurrent misses on one key parse once while other keys proceed.
/// Failed opens leave nothing behind.
#[derive(Default)]
pub struct NestedArchiveCache {
    slots: Mutex<HashMap<String, Slot>>,
}

impl NestedArchiveCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the archive cached under `name`, or materialize it with `open`.
    ///
    /// Callers racing on the same `name` block until the first one finishes;
    /// all of them receive the same instance.
    pub fn get_or_try_insert_with<F>(&self, name: &str, open: F) -> Result<Arc<Archive>>
    where
        F: FnOnce() -> Result<Archive>,
    {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry_ref(name).or_default())
        };

        let mut guard = slot.lock();
        if let Some(archive) = guard.as_ref() {
            trace!(name, "nested archive cache hit");
            return Ok(Arc::clone(archive));
        }

        match open() {
            Ok(archive) => {
                let archive = Arc::new(archive);
                *guard = Some(Arc::clone(&archive));
                Ok(archive)
            }
            Err(err) => {
                // Never wait on the map lock while holding a slot.
                drop(guard);
                self.discard_empty(name, &slot);
                Err(err)
            }
        }
    }

    /// The cached archive for `name`, if one has been materialized.
    pub fn get(&self, name: &str) -> Option<Arc<Archive>> {
        let slot = self.slots.lock().get(name).cloned()?;
        let archive = slot.lock().clone();
        archive
    }

    /// Number of materialized nested archives.
    pub fn len(&self) -> usize {
        self.snapshot()
            .iter()
            .filter(|slot| slot.lock().is_some())
            .count()
    }

    /// Check whether nothing has been materialized.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached archive.
    ///
    /// Handles already given out stay valid; later lookups parse afresh.
    /// Slots busy with an open at the time of the call are kept, so an
    /// in-flight open still publishes the one instance every waiter gets.
    pub fn clear(&self) {
        self.slots.lock().retain(|_, slot| slot.try_lock().is_none());
    }

    fn snapshot(&self) -> Vec<Slot> {
        self.slots.lock().values().cloned().collect()
    }

    fn discard_empty(&self, name: &str, slot: &Slot) {
        let mut slots = self.slots.lock();
        // A slot that is locked belongs to a retrying opener; leave it.
        let unused = slots.get(name).is_some_and(|current| {
            Arc::ptr_eq(current, slot) && current.try_lock().is_some_and(|guard| guard.is_none())
        });
        if unused {
            slots.remove(name);
        }
    }
}

impl fmt::Debug for NestedArchiveCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock();
        let mut names: Vec<&String> = slots.keys().collect();
        names.sort();
        f.debug_struct("NestedArchiveCache")
            .field("entries", &names)
            .finish()
    }
}
