//! Object pooling for allocation-heavy per-frame math.
//!
//! A pool hands out values by ownership: [`acquire`] moves a value out,
//! [`release`] moves it back after running the reset hook. Values released
//! beyond `max_size` are dropped rather than retained, bounding the pool's
//! footprint after a usage spike.
//!
//! [`acquire`]: ObjectPool::acquire
//! [`release`]: ObjectPool::release

use std::fmt;

use glam::Vec3;

/// Default retention cap for a pool's free list.
pub const DEFAULT_MAX_SIZE: usize = 1024;

/// Usage counters for one pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Values ever constructed by the factory (warmup included).
    pub created: u64,
    /// Total `acquire` calls.
    pub acquired: u64,
    /// Total accepted `release` calls.
    pub released: u64,
    /// Values currently sitting in the free list.
    pub available: usize,
    /// Values currently checked out.
    pub active: usize,
}

impl PoolStats {
    /// Fraction of acquires served from the free list instead of the
    /// factory, in `0.0..=1.0`. Zero before the first acquire.
    pub fn hit_rate(&self) -> f64 {
        if self.acquired == 0 {
            return 0.0;
        }
        self.acquired.saturating_sub(self.created) as f64 / self.acquired as f64
    }
}

/// A bounded free-list pool over any `T`.
pub struct ObjectPool<T> {
    factory: Box<dyn FnMut() -> T>,
    reset: Box<dyn FnMut(&mut T)>,
    free: Vec<T>,
    max_size: usize,
    active: usize,
    created: u64,
    acquired: u64,
    released: u64,
}

impl<T> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("free", &self.free.len())
            .field("active", &self.active)
            .field("max_size", &self.max_size)
            .finish()
    }
}

impl<T> ObjectPool<T> {
    /// A pool with [`DEFAULT_MAX_SIZE`] retention.
    pub fn new(
        factory: impl FnMut() -> T + 'static,
        reset: impl FnMut(&mut T) + 'static,
    ) -> Self {
        Self::with_max_size(factory, reset, DEFAULT_MAX_SIZE)
    }

    /// A pool retaining at most `max_size` free values. A cap of zero is
    /// nonsensical (every release would drop) and is bumped to one.
    pub fn with_max_size(
        factory: impl FnMut() -> T + 'static,
        reset: impl FnMut(&mut T) + 'static,
        max_size: usize,
    ) -> Self {
        Self {
            factory: Box::new(factory),
            reset: Box::new(reset),
            free: Vec::new(),
            max_size: max_size.max(1),
            active: 0,
            created: 0,
            acquired: 0,
            released: 0,
        }
    }

    /// Pre-populate the free list with `count` fresh values (capped at
    /// `max_size`).
    pub fn warmup(&mut self, count: usize) {
        let target = count.min(self.max_size);
        while self.free.len() < target {
            let value = (self.factory)();
            self.created += 1;
            self.free.push(value);
        }
    }

    /// Take a value out of the pool, constructing one if the free list is
    /// empty.
    pub fn acquire(&mut self) -> T {
        self.acquired += 1;
        self.active += 1;
        match self.free.pop() {
            Some(value) => value,
            None => {
                self.created += 1;
                (self.factory)()
            }
        }
    }

    /// Return a value. The reset hook runs first so a stale value can never
    /// re-enter circulation. Returning more values than were acquired is a
    /// caller bug; the extra value is logged and dropped.
    ///
    /// Detection is by outstanding count only. Values move by ownership, so
    /// there is no per-instance identity to track: a foreign value handed in
    /// while others are checked out is indistinguishable from a legitimate
    /// release and is accepted (and reset) like any other.
    pub fn release(&mut self, mut value: T) {
        if self.active == 0 {
            tracing::warn!("pool release without matching acquire, dropping value");
            return;
        }
        self.active -= 1;
        self.released += 1;
        (self.reset)(&mut value);
        if self.free.len() < self.max_size {
            self.free.push(value);
        }
    }

    /// Acquire `count` values, run `f` over them, and release them all --
    /// even if `f` panics.
    pub fn scoped<R>(&mut self, count: usize, f: impl FnOnce(&mut [T]) -> R) -> R {
        struct Restock<'a, T> {
            pool: &'a mut ObjectPool<T>,
            items: Vec<T>,
        }
        impl<T> Drop for Restock<'_, T> {
            fn drop(&mut self) {
                for item in self.items.drain(..) {
                    self.pool.release(item);
                }
            }
        }

        let items: Vec<T> = (0..count).map(|_| self.acquire()).collect();
        let mut guard = Restock { pool: self, items };
        f(&mut guard.items)
    }

    /// Current counters. `available` and `active` are instantaneous, the
    /// rest are lifetime totals.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created,
            acquired: self.acquired,
            released: self.released,
            available: self.free.len(),
            active: self.active,
        }
    }

    /// Drop every pooled value and zero the counters.
    pub fn clear(&mut self) {
        self.free.clear();
        self.active = 0;
        self.created = 0;
        self.acquired = 0;
        self.released = 0;
    }
}

/// Pool of scratch [`Vec3`]s for per-frame vector math. Values come back
/// zeroed.
#[derive(Debug)]
pub struct VecPool {
    inner: ObjectPool<Vec3>,
}

impl Default for VecPool {
    fn default() -> Self {
        Self::new()
    }
}

impl VecPool {
    pub fn new() -> Self {
        Self {
            inner: ObjectPool::new(|| Vec3::ZERO, |v| *v = Vec3::ZERO),
        }
    }

    pub fn warmup(&mut self, count: usize) {
        self.inner.warmup(count);
    }

    pub fn acquire(&mut self) -> Vec3 {
        self.inner.acquire()
    }

    pub fn release(&mut self, value: Vec3) {
        self.inner.release(value);
    }

    /// Scratch space for a computation: `f` gets `count` zeroed vectors that
    /// return to the pool afterwards.
    pub fn scoped<R>(&mut self, count: usize, f: impl FnOnce(&mut [Vec3]) -> R) -> R {
        self.inner.scoped(count, f)
    }

    pub fn stats(&self) -> PoolStats {
        self.inner.stats()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
