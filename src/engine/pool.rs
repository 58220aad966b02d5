//! Engine access control
//!
//! Engine handles are expensive to create (initialization plus license
//! activation) and unsafe to share, so the process creates them once and
//! leases them out through this pool.
//!
//! # Design
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                         EnginePool                             │
//! │                                                                │
//! │  acquire() → EngineLease → engine calls → drop()              │
//! │      ↑             ↓                          ↓                │
//! │  [wait on free]  [lock slot]           [slot back on free]     │
//! │                                        [notify one waiter]     │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! With one slot, every engine operation in the process is serialized.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::{EngineError, RecognitionEngine};

/// Bounded pool of engine handles
pub struct EnginePool {
    /// One mutex per handle; a slot index on the free list is unlocked
    slots: Vec<Mutex<Box<dyn RecognitionEngine>>>,
    /// Indices of handles nobody is using
    free: Mutex<Vec<usize>>,
    /// Signalled whenever a slot returns or the pool closes
    returned: Condvar,
    closed: AtomicBool,
    /// Leases currently held
    active: AtomicUsize,
    /// Leases handed out since startup
    served: AtomicUsize,
}

impl EnginePool {
    /// Build a pool over already started engines
    pub fn new(engines: Vec<Box<dyn RecognitionEngine>>) -> Self {
        let free = (0..engines.len()).rev().collect();

        Self {
            slots: engines.into_iter().map(Mutex::new).collect(),
            free: Mutex::new(free),
            returned: Condvar::new(),
            closed: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            served: AtomicUsize::new(0),
        }
    }

    /// Lease a handle, blocking until one is free
    ///
    /// Returns a RAII guard that puts the handle back on drop.
    pub fn acquire(&self) -> Result<EngineLease<'_>, EngineError> {
        if self.slots.is_empty() {
            return Err(EngineError::new("acquire", "engine pool has no handles"));
        }

        let slot = {
            let mut free = self.free.lock();
            loop {
                if self.closed.load(Ordering::Acquire) {
                    return Err(EngineError::new("acquire", "engine pool is shut down"));
                }
                if let Some(slot) = free.pop() {
                    break slot;
                }
                self.returned.wait(&mut free);
            }
        };

        self.active.fetch_add(1, Ordering::Relaxed);
        self.served.fetch_add(1, Ordering::Relaxed);

        Ok(EngineLease {
            engine: self.slots[slot].lock(),
            slot,
            pool: self,
        })
    }

    fn give_back(&self, slot: usize) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        self.free.lock().push(slot);
        self.returned.notify_one();
    }

    /// Close the pool and release every handle
    ///
    /// Waits for in-flight leases to finish. Pending and future `acquire`
    /// calls fail. Returns the number of handles released.
    pub fn shutdown(&self) -> usize {
        {
            let _free = self.free.lock();
            self.closed.store(true, Ordering::Release);
        }
        self.returned.notify_all();

        for slot in &self.slots {
            let mut engine = slot.lock();
            tracing::debug!(engine = engine.name(), "Releasing engine handle");
            engine.release();
        }

        self.slots.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.slots.len(),
            active: self.active.load(Ordering::Relaxed),
            available: self.free.lock().len(),
            served: self.served.load(Ordering::Relaxed),
        }
    }
}

/// RAII guard - returns the handle to the pool on drop
pub struct EngineLease<'a> {
    engine: MutexGuard<'a, Box<dyn RecognitionEngine>>,
    slot: usize,
    pool: &'a EnginePool,
}

impl Deref for EngineLease<'_> {
    type Target = dyn RecognitionEngine;

    fn deref(&self) -> &Self::Target {
        &**self.engine
    }
}

impl DerefMut for EngineLease<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut **self.engine
    }
}

impl Drop for EngineLease<'_> {
    fn drop(&mut self) {
        self.pool.give_back(self.slot);
    }
}

/// Pool statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    /// Number of engine handles
    pub size: usize,
    /// Handles currently leased
    pub active: usize,
    /// Handles waiting on the free list
    pub available: usize,
    /// Leases handed out since startup
    pub served: usize,
}

/// Shared engine pool for the application
pub type SharedEnginePool = Arc<EnginePool>;
