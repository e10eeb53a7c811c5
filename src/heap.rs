//! Shared cell arena, duplication locks and the visited bitset
//!
//! The heap is a flat array of atomic 64-bit cells addressed by position.
//! Workers own disjoint slices of it for allocation, so the common case is a
//! relaxed load or store into a region no other thread touches. The two
//! places where cells genuinely cross threads are covered explicitly:
//!
//! - binder and endpoint slots are published with release stores and read
//!   with acquire loads (see [`crate::worker::Worker::subst`]), so a consumer
//!   that observes a delivered pointer also observes the whole subtree built
//!   before it was delivered;
//! - traversal through a duplication node is guarded by a one-byte spin flag
//!   per cell, acquired with a test-and-set and released with a plain
//!   release store.
//!
//! The visited bitset used by the normalizer lives here as well since it is
//! indexed by heap position and shared by every worker during a pass.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::ptr::Ptr;

/// Heap construction errors.
#[derive(Debug, thiserror::Error)]
pub enum HeapError {
    /// A zero-cell arena cannot hold a seed term.
    #[error("heap must have at least one cell")]
    Empty,
    /// Positions are 32-bit; a larger arena would not be addressable.
    #[error("heap of {0} cells exceeds the 2^32 addressable positions")]
    TooLarge(u64),
}

/// The shared arena: cells, per-cell lock flags, and the visited bitset.
pub struct Heap {
    node: Box<[AtomicU64]>,
    lock: Box<[AtomicU8]>,
    seen: Box<[AtomicU64]>,
}

impl Heap {
    /// Allocates an arena of `words` cells, all vacant, all unlocked.
    pub fn new(words: u64) -> Result<Self, HeapError> {
        if words == 0 {
            return Err(HeapError::Empty);
        }
        if words > 1 << 32 {
            return Err(HeapError::TooLarge(words));
        }
        let n = words as usize;
        let vacant = Ptr::nil().word();
        let node = (0..n).map(|_| AtomicU64::new(vacant)).collect();
        let lock = (0..n).map(|_| AtomicU8::new(0)).collect();
        let seen = (0..n.div_ceil(64)).map(|_| AtomicU64::new(0)).collect();
        Ok(Heap { node, lock, seen })
    }

    /// Number of cells in the arena.
    pub fn words(&self) -> u64 {
        self.node.len() as u64
    }

    /// Reads the cell at `loc`.
    pub fn load(&self, loc: u64) -> Ptr {
        Ptr::from_word(self.node[loc as usize].load(Ordering::Relaxed))
    }

    /// Reads the cell at `loc`, synchronizing with a release store made by
    /// another worker's substitution.
    pub fn load_acquire(&self, loc: u64) -> Ptr {
        Ptr::from_word(self.node[loc as usize].load(Ordering::Acquire))
    }

    /// Writes `ptr` into the cell at `loc` and returns it.
    pub fn link(&self, loc: u64, ptr: Ptr) -> Ptr {
        self.node[loc as usize].store(ptr.word(), Ordering::Relaxed);
        ptr
    }

    /// Publishes `ptr` into the cell at `loc` for another worker to consume.
    pub fn store_release(&self, loc: u64, ptr: Ptr) {
        self.node[loc as usize].store(ptr.word(), Ordering::Release);
    }

    /// Tries to take the duplication flag of the cell at `loc`. Returns
    /// `false` when another worker already holds it.
    pub fn try_lock(&self, loc: u64) -> bool {
        self.lock[loc as usize].swap(1, Ordering::Acquire) == 0
    }

    /// Releases the duplication flag of the cell at `loc`.
    pub fn unlock(&self, loc: u64) {
        self.lock[loc as usize].store(0, Ordering::Release);
    }

    /// Whether the normalizer already visited `loc` this pass.
    pub fn seen(&self, loc: u64) -> bool {
        let word = self.seen[(loc >> 6) as usize].load(Ordering::Acquire);
        (word >> (loc & 0x3F)) & 1 == 1
    }

    /// Marks `loc` visited for the current pass.
    pub fn mark_seen(&self, loc: u64) {
        self.seen[(loc >> 6) as usize].fetch_or(1 << (loc & 0x3F), Ordering::AcqRel);
    }

    /// Forgets all visit marks. Called by the pass driver while every other
    /// worker is parked.
    pub fn clear_seen(&self) {
        for word in self.seen.iter() {
            word.store(0, Ordering::Relaxed);
        }
    }
}
