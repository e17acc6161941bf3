use tracing::{debug, info, warn};

use crate::error::{Result, SoundError};

/// Stable index of a pooled object. Never reused for a different object
/// while the pool is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub usize);

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle hooks for pooled objects: create on a miss, take on every
/// acquire, return on every release, destroy at teardown.
pub trait PoolPolicy<T> {
    fn create(&mut self) -> Result<T>;

    fn on_take(&mut self, _item: &mut T) {}

    fn on_return(&mut self, _item: &mut T) {}

    fn on_destroy(&mut self, item: T) {
        drop(item);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub created: usize,
    pub free: usize,
    pub checked_out: usize,
    pub max_size: usize,
}

#[derive(Debug)]
struct Slot<T> {
    item: T,
    checked_out: bool,
}

/// Bounded object pool. Objects are created lazily up to `max_size` and
/// live until `teardown`; the pool never shrinks.
#[derive(Debug)]
pub struct Pool<T, P> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    policy: P,
    max_size: usize,
    strict: bool,
    closed: bool,
}

impl<T, P: PoolPolicy<T>> Pool<T, P> {
    /// `capacity` only sizes the bookkeeping up front.
    pub fn new(policy: P, capacity: usize, max_size: usize, strict: bool) -> Self {
        let capacity = capacity.min(max_size);
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::with_capacity(capacity),
            policy,
            max_size,
            strict,
            closed: false,
        }
    }

    pub fn acquire(&mut self) -> Result<SlotId> {
        if self.closed {
            return Err(SoundError::PoolClosed);
        }

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                if self.slots.len() >= self.max_size {
                    warn!(max = self.max_size, "pool exhausted");
                    return Err(SoundError::PoolExhausted { max: self.max_size });
                }
                let item = self.policy.create()?;
                self.slots.push(Slot {
                    item,
                    checked_out: false,
                });
                debug!(created = self.slots.len(), "pool created object");
                self.slots.len() - 1
            }
        };

        let slot = &mut self.slots[index];
        slot.checked_out = true;
        self.policy.on_take(&mut slot.item);
        Ok(SlotId(index))
    }

    /// Return an object. Releasing something that is not checked out is
    /// an error under strict accounting and a logged no-op otherwise.
    pub fn release(&mut self, id: SlotId) -> Result<()> {
        if self.closed {
            return Err(SoundError::PoolClosed);
        }

        let slot = self
            .slots
            .get_mut(id.0)
            .ok_or(SoundError::UnknownVoice(id))?;

        if !slot.checked_out {
            if self.strict {
                return Err(SoundError::DoubleRelease(id));
            }
            warn!(slot = %id, "ignoring release of object that is not checked out");
            return Ok(());
        }

        self.policy.on_return(&mut slot.item);
        slot.checked_out = false;
        self.free.push(id.0);
        Ok(())
    }

    /// Create objects straight into the free list, up to `count` total.
    pub fn prewarm(&mut self, count: usize) -> Result<usize> {
        if self.closed {
            return Err(SoundError::PoolClosed);
        }

        let target = count.min(self.max_size);
        let mut made = 0;
        while self.slots.len() < target {
            let item = self.policy.create()?;
            self.slots.push(Slot {
                item,
                checked_out: false,
            });
            self.free.push(self.slots.len() - 1);
            made += 1;
        }
        Ok(made)
    }

    /// Destroy every object, checked out or not. The pool rejects all use
    /// afterwards.
    pub fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.free.clear();

        let destroyed = self.slots.len();
        for slot in self.slots.drain(..) {
            self.policy.on_destroy(slot.item);
        }
        info!(destroyed, "pool torn down");
    }

    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.slots.get(id.0).map(|s| &s.item)
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        self.slots.get_mut(id.0).map(|s| &mut s.item)
    }

    pub fn is_checked_out(&self, id: SlotId) -> bool {
        self.slots.get(id.0).map(|s| s.checked_out).unwrap_or(false)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn created(&self) -> usize {
        self.slots.len()
    }

    pub fn free_ids(&self) -> impl Iterator<Item = SlotId> + '_ {
        self.free.iter().map(|&i| SlotId(i))
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.slots.len(),
            free: self.free.len(),
            checked_out: self.slots.len() - self.free.len(),
            max_size: self.max_size,
        }
    }
}
