//! Worker-local state, allocation and the mailbox pool
//!
//! Each worker owns a contiguous slice of the heap (`space` cells starting
//! at `tid * space`) and allocates from it with a bump cursor, falling back
//! to a per-size free-list of reclaimed blocks. Nothing here is shared, so
//! the allocation fast path is a couple of integer operations.
//!
//! Workers cooperate through one mailbox each: `work` carries a task or the
//! stop request, `result` carries the normalized pointer back to whoever
//! forked the task. Both fields are a mutex-guarded option paired with a
//! condition variable. Work is routed by position-derived worker id, so
//! there is no queue and no stealing; a task is only ever posted to a worker
//! that is known to be idle.

use std::sync::{Condvar, Mutex};

use tracing::{debug, error, trace};

use crate::heap::Heap;
use crate::program::Program;
use crate::ptr::{Ptr, Tag};

/// Largest node arity the allocator accepts. Wider constructors and calls
/// are rejected when the rule table is built.
pub const MAX_ARITY: u64 = 16;

/// Size of the duplication-color space. Each worker seeds its color counter
/// at an even offset into it so concurrently minted colors never collide.
pub const MAX_DUPS: u64 = 1 << 24;

/// Worker-local evaluation state. Rule implementations receive a mutable
/// reference to this and go through it for every heap effect.
pub struct Worker<'rt> {
    pub(crate) tid: u64,
    pub(crate) heap: &'rt Heap,
    pub(crate) prog: &'rt Program,
    pub(crate) pool: &'rt Pool,
    space: u64,
    used: u64,
    free: Vec<Vec<u64>>,
    cost: u64,
    dups: u64,
}

impl<'rt> Worker<'rt> {
    pub(crate) fn new(
        tid: u64,
        heap: &'rt Heap,
        prog: &'rt Program,
        pool: &'rt Pool,
        space: u64,
        used: u64,
    ) -> Self {
        Worker {
            tid,
            heap,
            prog,
            pool,
            space,
            used,
            free: (0..=MAX_ARITY).map(|_| Vec::new()).collect(),
            cost: 0,
            dups: MAX_DUPS * tid / pool.size() as u64,
        }
    }

    /// This worker's id.
    pub fn tid(&self) -> u64 {
        self.tid
    }

    /// The shared arena.
    pub fn heap(&self) -> &'rt Heap {
        self.heap
    }

    /// The rule table.
    pub fn program(&self) -> &'rt Program {
        self.prog
    }

    /// Rewrites performed by this worker so far.
    pub fn cost(&self) -> u64 {
        self.cost
    }

    /// Counts one rewrite.
    pub fn inc_cost(&mut self) {
        self.cost += 1;
    }

    /// Cells allocated from this worker's slice so far.
    pub(crate) fn used(&self) -> u64 {
        self.used
    }

    /// Mints a duplication color no other live duplication uses.
    pub fn fresh_color(&mut self) -> u64 {
        let col = self.dups & (MAX_DUPS - 1);
        self.dups += 1;
        col
    }

    /// Claims `size` consecutive cells exclusive to this worker and returns
    /// the first position. `size == 0` returns a sentinel position that must
    /// never be dereferenced. Aborts when the worker's slice is exhausted.
    pub fn alloc(&mut self, size: u64) -> u64 {
        debug_assert!(size <= MAX_ARITY);
        if size == 0 {
            return 0;
        }
        if let Some(reuse) = self.free[size as usize].pop() {
            return reuse;
        }
        if self.used + size > self.space {
            error!(
                tid = self.tid,
                used = self.used,
                space = self.space,
                size,
                "heap slice exhausted"
            );
            panic!(
                "out of heap: worker {} used {} of {} cells and needs {} more",
                self.tid, self.used, self.space, size
            );
        }
        let loc = self.tid * self.space + self.used;
        self.used += size;
        loc
    }

    /// Releases the `size`-cell block at `loc`. Reclamation is deliberately
    /// deferred: the block stays reachable garbage until process exit, and
    /// the free-list only grows through explicit reuse decisions. See
    /// DESIGN.md.
    pub fn clear(&mut self, loc: u64, size: u64) {
        let _ = (loc, size);
    }

    /// Hands an erased term to the collector. Unreachable cells are left in
    /// place; no global sweep exists or is needed.
    pub fn collect(&mut self, term: Ptr) {
        trace!(tid = self.tid, ?term, "erased");
    }

    /// Reads the `slot`-th cell of the node `term` points at.
    pub fn ask(&self, term: Ptr, slot: u64) -> Ptr {
        debug_assert!(
            term.tag() > Tag::Var,
            "slot read through a variable pointer {term:?}"
        );
        self.heap.load(term.loc(slot))
    }

    /// Delivers `ptr` to the binder or endpoint slot at `var`. An ERA in the
    /// slot means the binder was discarded, in which case the delivered term
    /// is collected instead. The release store pairs with the acquire load
    /// performed by whichever worker consumes the slot.
    pub fn subst(&mut self, var: u64, ptr: Ptr) {
        let old = self.heap.load_acquire(var);
        if old.tag() != Tag::Era {
            self.heap.store_release(var, ptr);
        } else {
            self.collect(ptr);
        }
    }

    /// Mailbox loop of a forked worker. Returns the final (cost, used) pair
    /// at stop.
    pub(crate) fn serve(mut self) -> (u64, u64) {
        loop {
            match self.pool.wait_work(self.tid) {
                Job::Stop => {
                    debug!(tid = self.tid, cost = self.cost, "worker stopped");
                    return (self.cost, self.used);
                }
                Job::Normal { host, sidx, slen } => {
                    trace!(tid = self.tid, host, sidx, slen, "task accepted");
                    let done = crate::normal::normal_go(&mut self, host, sidx, slen);
                    self.pool.put_result(self.tid, done);
                }
            }
        }
    }
}

/// A task posted to a worker's mailbox.
pub(crate) enum Job {
    /// Normalize the subgraph at `host` using worker ids `sidx..sidx+slen`.
    Normal { host: u64, sidx: u64, slen: u64 },
    /// Exit the mailbox loop.
    Stop,
}

struct Mailbox {
    work: Mutex<Option<Job>>,
    work_cv: Condvar,
    result: Mutex<Option<Ptr>>,
    result_cv: Condvar,
}

impl Mailbox {
    fn new() -> Self {
        Mailbox {
            work: Mutex::new(None),
            work_cv: Condvar::new(),
            result: Mutex::new(None),
            result_cv: Condvar::new(),
        }
    }
}

/// One mailbox per worker.
pub(crate) struct Pool {
    boxes: Vec<Mailbox>,
}

impl Pool {
    pub(crate) fn new(size: usize) -> Self {
        Pool {
            boxes: (0..size).map(|_| Mailbox::new()).collect(),
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.boxes.len()
    }

    /// Posts a normalization task to `tid`.
    pub(crate) fn fork(&self, tid: u64, host: u64, sidx: u64, slen: u64) {
        let mbox = &self.boxes[tid as usize];
        let mut slot = mbox.work.lock().expect("worker mailbox poisoned");
        *slot = Some(Job::Normal { host, sidx, slen });
        mbox.work_cv.notify_one();
    }

    /// Blocks until `tid` publishes the result of its current task.
    pub(crate) fn join(&self, tid: u64) -> Ptr {
        let mbox = &self.boxes[tid as usize];
        let mut slot = mbox.result.lock().expect("worker mailbox poisoned");
        loop {
            if let Some(done) = slot.take() {
                return done;
            }
            slot = mbox.result_cv.wait(slot).expect("worker mailbox poisoned");
        }
    }

    /// Asks `tid` to exit its mailbox loop.
    pub(crate) fn stop(&self, tid: u64) {
        let mbox = &self.boxes[tid as usize];
        let mut slot = mbox.work.lock().expect("worker mailbox poisoned");
        *slot = Some(Job::Stop);
        mbox.work_cv.notify_one();
    }

    fn wait_work(&self, tid: u64) -> Job {
        let mbox = &self.boxes[tid as usize];
        let mut slot = mbox.work.lock().expect("worker mailbox poisoned");
        loop {
            if let Some(job) = slot.take() {
                return job;
            }
            slot = mbox.work_cv.wait(slot).expect("worker mailbox poisoned");
        }
    }

    fn put_result(&self, tid: u64, done: Ptr) {
        let mbox = &self.boxes[tid as usize];
        let mut slot = mbox.result.lock().expect("worker mailbox poisoned");
        *slot = Some(done);
        mbox.result_cv.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::Program;

    #[test]
    fn bump_regions_of_distinct_workers_never_overlap() {
        let heap = Heap::new(64).unwrap();
        let prog = Program::new();
        let pool = Pool::new(2);
        let mut w0 = Worker::new(0, &heap, &prog, &pool, 32, 0);
        let mut w1 = Worker::new(1, &heap, &prog, &pool, 32, 0);
        let mut taken = Vec::new();
        for _ in 0..4 {
            let a = w0.alloc(3);
            let b = w1.alloc(3);
            taken.push((a, a + 3));
            taken.push((b, b + 3));
        }
        for (i, &(s0, e0)) in taken.iter().enumerate() {
            for &(s1, e1) in &taken[i + 1..] {
                assert!(e0 <= s1 || e1 <= s0, "blocks {s0}..{e0} and {s1}..{e1} overlap");
            }
        }
    }

    #[test]
    fn zero_sized_allocations_return_the_sentinel() {
        let heap = Heap::new(8).unwrap();
        let prog = Program::new();
        let pool = Pool::new(1);
        let mut w = Worker::new(0, &heap, &prog, &pool, 8, 0);
        assert_eq!(w.alloc(0), 0);
        assert_eq!(w.used(), 0);
    }

    #[test]
    #[should_panic(expected = "out of heap")]
    fn exhausting_a_slice_aborts_with_a_report() {
        let heap = Heap::new(8).unwrap();
        let prog = Program::new();
        let pool = Pool::new(1);
        let mut w = Worker::new(0, &heap, &prog, &pool, 4, 0);
        w.alloc(3);
        w.alloc(3);
    }

    #[test]
    fn subst_delivers_into_a_live_slot_and_erases_into_a_dead_one() {
        let heap = Heap::new(8).unwrap();
        let prog = Program::new();
        let pool = Pool::new(1);
        let mut w = Worker::new(0, &heap, &prog, &pool, 8, 0);
        heap.link(2, Ptr::arg(0));
        w.subst(2, Ptr::num(7));
        assert_eq!(heap.load(2), Ptr::num(7));
        heap.link(3, Ptr::era());
        w.subst(3, Ptr::num(9));
        assert_eq!(heap.load(3), Ptr::era());
    }

    #[test]
    fn color_sources_are_disjoint_across_workers() {
        let heap = Heap::new(8).unwrap();
        let prog = Program::new();
        let pool = Pool::new(4);
        let mut cols = Vec::new();
        for tid in 0..4 {
            let mut w = Worker::new(tid, &heap, &prog, &pool, 2, 0);
            for _ in 0..3 {
                cols.push(w.fresh_color());
            }
        }
        let mut dedup = cols.clone();
        dedup.sort_unstable();
        dedup.dedup();
        assert_eq!(dedup.len(), cols.len());
    }

    #[test]
    fn mailbox_round_trip() {
        let pool = Pool::new(2);
        pool.fork(1, 42, 1, 1);
        match pool.wait_work(1) {
            Job::Normal { host, sidx, slen } => {
                assert_eq!((host, sidx, slen), (42, 1, 1));
            }
            Job::Stop => panic!("expected a task"),
        }
        pool.put_result(1, Ptr::num(5));
        assert_eq!(pool.join(1), Ptr::num(5));
    }
}
