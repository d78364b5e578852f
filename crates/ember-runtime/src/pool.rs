//! Slot allocator boundary.
//!
//! Every submitted task borrows a slot for its closure and result storage.
//! The engine only needs "allocate a tagged slot, release it"; the block
//! strategy behind it is the allocator's business.
//!
//! [`TaggedPool`] is the default allocator: it keeps per-tag byte accounting
//! and can enforce a total budget, which is how exhaustion surfaces as a
//! failed submission.

use crate::error::ScopeError;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Opaque identifier of an allocated slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(u64);

impl SlotId {
    /// Creates a slot id from an allocator-defined value.
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Storage provider for task and result slots.
///
/// `tag` names the owner for diagnostics (the engine passes the scope name).
/// Returning `None` means the allocator is exhausted.
pub trait SlotAllocator: Send + Sync + fmt::Debug {
    /// Reserves `size` bytes under `tag`.
    fn allocate(&self, tag: &str, size: usize) -> Option<SlotId>;

    /// Releases a slot previously returned by [`allocate`](Self::allocate).
    fn deallocate(&self, slot: SlotId);
}

/// RAII guard over an allocated slot.
///
/// The slot is returned to its allocator when the lease drops, which for a
/// task is when it has been executed or cancelled.
pub struct SlotLease {
    pool: Arc<dyn SlotAllocator>,
    slot: SlotId,
}

impl SlotLease {
    /// Allocates a slot from `pool`.
    ///
    /// # Errors
    ///
    /// [`ScopeError::PoolExhausted`] if the allocator refuses.
    pub fn acquire(
        pool: &Arc<dyn SlotAllocator>,
        tag: &str,
        size: usize,
    ) -> Result<Self, ScopeError> {
        let slot = pool
            .allocate(tag, size)
            .ok_or_else(|| ScopeError::PoolExhausted {
                tag: tag.to_string(),
                requested: size,
            })?;
        Ok(Self {
            pool: Arc::clone(pool),
            slot,
        })
    }

    /// Returns the leased slot id.
    #[must_use]
    pub fn slot(&self) -> SlotId {
        self.slot
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        self.pool.deallocate(self.slot);
    }
}

impl fmt::Debug for SlotLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SlotLease").field(&self.slot).finish()
    }
}

/// Point-in-time usage of a [`TaggedPool`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolUsage {
    /// Bytes currently allocated.
    pub in_use_bytes: usize,
    /// Highest `in_use_bytes` observed.
    pub peak_bytes: usize,
    /// Number of live slots.
    pub live_slots: usize,
    /// Total budget, if bounded.
    pub capacity_bytes: Option<usize>,
    /// Bytes in use per tag.
    pub by_tag: BTreeMap<String, usize>,
}

#[derive(Debug, Default)]
struct PoolState {
    next_id: u64,
    live: HashMap<SlotId, (String, usize)>,
    in_use: usize,
    peak: usize,
    by_tag: BTreeMap<String, usize>,
}

/// Default slot allocator with per-tag accounting and an optional budget.
///
/// # Example
///
/// ```
/// use ember_runtime::{SlotAllocator, TaggedPool};
///
/// let pool = TaggedPool::bounded(128);
/// let a = pool.allocate("device", 100).unwrap();
/// assert!(pool.allocate("device", 100).is_none());
///
/// pool.deallocate(a);
/// assert_eq!(pool.usage().in_use_bytes, 0);
/// ```
#[derive(Debug, Default)]
pub struct TaggedPool {
    capacity: Option<usize>,
    state: Mutex<PoolState>,
}

impl TaggedPool {
    /// Creates a pool without a budget.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Creates a pool that refuses allocations beyond `capacity_bytes`.
    #[must_use]
    pub fn bounded(capacity_bytes: usize) -> Self {
        Self {
            capacity: Some(capacity_bytes),
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Returns current usage.
    #[must_use]
    pub fn usage(&self) -> PoolUsage {
        let state = self.state.lock();
        PoolUsage {
            in_use_bytes: state.in_use,
            peak_bytes: state.peak,
            live_slots: state.live.len(),
            capacity_bytes: self.capacity,
            by_tag: state.by_tag.clone(),
        }
    }
}

impl SlotAllocator for TaggedPool {
    fn allocate(&self, tag: &str, size: usize) -> Option<SlotId> {
        let mut state = self.state.lock();
        let in_use = state.in_use.checked_add(size)?;
        if self.capacity.is_some_and(|cap| in_use > cap) {
            return None;
        }

        state.next_id += 1;
        let slot = SlotId(state.next_id);
        state.in_use = in_use;
        state.peak = state.peak.max(in_use);
        *state.by_tag.entry(tag.to_string()).or_default() += size;
        state.live.insert(slot, (tag.to_string(), size));
        Some(slot)
    }

    fn deallocate(&self, slot: SlotId) {
        let mut state = self.state.lock();
        let Some((tag, size)) = state.live.remove(&slot) else {
            return;
        };
        state.in_use -= size;
        if let Some(bytes) = state.by_tag.get_mut(&tag) {
            *bytes -= size;
            if *bytes == 0 {
                state.by_tag.remove(&tag);
            }
        }
    }
}
