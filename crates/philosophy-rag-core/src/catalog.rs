//! Per-school index slots with swap-on-completion rebuilds.
//!
//! Each configured school owns one slot holding an `Arc<KnowledgeIndex>`.
//! Readers clone the `Arc` under a short read lock and then search without
//! holding any lock, so an in-flight search keeps using the index it started
//! with even if a rebuild lands meanwhile.
//!
//! Builds are single-writer per school: [`IndexCatalog::begin_rebuild`]
//! hands out a [`RebuildGuard`] and refuses a second one until the first is
//! committed or dropped. The new index only becomes visible in
//! [`RebuildGuard::commit`], in a single pointer swap.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::{RagError, Result};
use crate::index::KnowledgeIndex;

#[derive(Debug, Default)]
struct Slot {
    current: RwLock<Option<Arc<KnowledgeIndex>>>,
    building: AtomicBool,
}

impl Slot {
    fn load(&self) -> Option<Arc<KnowledgeIndex>> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn store(&self, index: Arc<KnowledgeIndex>) {
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(index);
    }
}

/// Lookup table from school id to its live index.
#[derive(Debug, Default)]
pub struct IndexCatalog {
    slots: BTreeMap<String, Slot>,
}

impl IndexCatalog {
    /// Create a catalog with one empty slot per school id.
    pub fn new<I, S>(school_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            slots: school_ids
                .into_iter()
                .map(|id| (id.into(), Slot::default()))
                .collect(),
        }
    }

    /// Current index of a school.
    pub fn get(&self, school_id: &str) -> Result<Arc<KnowledgeIndex>> {
        self.slot(school_id)?
            .load()
            .filter(|index| !index.is_empty())
            .ok_or_else(|| RagError::IndexNotReady {
                school: school_id.to_string(),
            })
    }

    pub fn contains(&self, school_id: &str) -> bool {
        self.slots.contains_key(school_id)
    }

    pub fn is_ready(&self, school_id: &str) -> bool {
        self.get(school_id).is_ok()
    }

    pub fn school_ids(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Install a fully built index (e.g. one loaded from disk).
    ///
    /// Fails with `RebuildInProgress` while a guarded rebuild of the same
    /// school is running, so a stale load never clobbers a fresh build.
    /// The install claims the same build lock as [`begin_rebuild`](Self::begin_rebuild)
    /// for the duration of the swap.
    pub fn install(&self, index: KnowledgeIndex) -> Result<()> {
        self.begin_rebuild(index.school_id())?.commit(index)?;
        Ok(())
    }

    /// Claim exclusive build rights for one school.
    pub fn begin_rebuild(&self, school_id: &str) -> Result<RebuildGuard<'_>> {
        let slot = self.slot(school_id)?;
        slot.building
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| RagError::RebuildInProgress {
                school: school_id.to_string(),
            })?;
        Ok(RebuildGuard {
            school_id: school_id.to_string(),
            slot,
        })
    }

    fn slot(&self, school_id: &str) -> Result<&Slot> {
        self.slots
            .get(school_id)
            .ok_or_else(|| RagError::UnknownSchool(school_id.to_string()))
    }
}

/// Exclusive right to replace one school's index.
///
/// Dropping the guard without committing leaves the previous index live.
#[derive(Debug)]
pub struct RebuildGuard<'a> {
    school_id: String,
    slot: &'a Slot,
}

impl RebuildGuard<'_> {
    pub fn school_id(&self) -> &str {
        &self.school_id
    }

    /// Publish the new index and release the build lock.
    pub fn commit(self, index: KnowledgeIndex) -> Result<Arc<KnowledgeIndex>> {
        if index.school_id() != self.school_id {
            return Err(RagError::Config(format!(
                "rebuild of '{}' cannot install an index for '{}'",
                self.school_id,
                index.school_id()
            )));
        }
        let index = Arc::new(index);
        self.slot.store(Arc::clone(&index));
        Ok(index)
    }
}

impl Drop for RebuildGuard<'_> {
    fn drop(&mut self) {
        self.slot.building.store(false, Ordering::Release);
    }
}
