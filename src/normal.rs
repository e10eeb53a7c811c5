//! Full normalization and the parallel driver
//!
//! [`normal_go`] alternates weak-head reduction at the current position with
//! recursive descent into child positions. When a node exposes two or more
//! independent children and the worker stride is wide enough, the stride is
//! split evenly and the tail children are posted to the workers owning the
//! sub-strides; the current worker keeps the first child in-line and joins
//! the rest before returning.
//!
//! Numeric operations are treated as values while strides are wide, so a
//! balanced arithmetic tree fans out across workers instead of serializing
//! on its spine. [`normal`] therefore runs one parallel pass and then
//! iterates unit-stride passes until the rewrite counter stops moving. The
//! visited bitset keeps shared subgraphs from being walked twice within a
//! pass and is reset between passes.

use std::thread;

use tracing::{debug, trace};

use crate::heap::Heap;
use crate::program::Program;
use crate::ptr::{Ptr, Tag};
use crate::reduce::reduce;
use crate::worker::{Pool, Worker};

/// What a finished run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Output {
    /// Total rewrites performed across all workers.
    pub cost: u64,
    /// Total cells claimed across all worker slices, seed included.
    pub size: u64,
    /// The normalized pointer left at the root position.
    pub root: Ptr,
}

/// Parameter validation errors of [`run`].
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// At least the coordinator worker must exist.
    #[error("worker count must be at least 1")]
    NoWorkers,
    /// Every worker needs a non-empty slice of the arena.
    #[error("{workers} workers over {words} cells leave some worker an empty slice")]
    SliceTooSmall {
        /// Requested worker count.
        workers: usize,
        /// Arena size in cells.
        words: u64,
    },
    /// The seed graph must fit inside the coordinator's slice.
    #[error("seed of {size} cells exceeds the {space}-cell worker slice")]
    SeedTooLarge {
        /// Seed size in cells.
        size: u64,
        /// Per-worker slice size in cells.
        space: u64,
    },
}

/// Normalizes the subgraph at `host`, farming independent children out to
/// the workers in `sidx..sidx+slen`.
pub(crate) fn normal_go(w: &mut Worker<'_>, host: u64, sidx: u64, slen: u64) -> Ptr {
    let term = w.heap.load(host);
    if w.heap.seen(host) {
        return term;
    }
    let term = reduce(w, host, slen);
    w.heap.mark_seen(host);

    let mut locs: Vec<u64> = Vec::new();
    match term.tag() {
        Tag::Lam => locs.push(term.loc(1)),
        Tag::App | Tag::Sup => {
            locs.push(term.loc(0));
            locs.push(term.loc(1));
        }
        Tag::Dp0 | Tag::Dp1 => locs.push(term.loc(2)),
        Tag::Op2 => {
            if slen > 1 {
                locs.push(term.loc(0));
                locs.push(term.loc(1));
            }
        }
        Tag::Ctr | Tag::Cal => {
            for i in 0..w.prog.arity_of(term.ext()) {
                locs.push(term.loc(i));
            }
        }
        _ => {}
    }

    let forks = locs.len() as u64;
    if forks >= 2 && slen >= forks {
        let stride = slen / forks;
        for (i, &loc) in locs.iter().enumerate().skip(1) {
            let tid = sidx + i as u64 * stride;
            w.pool.fork(tid, loc, tid, stride);
        }
        let done = normal_go(w, locs[0], sidx, stride);
        w.heap.link(locs[0], done);
        for (i, &loc) in locs.iter().enumerate().skip(1) {
            let done = w.pool.join(sidx + i as u64 * stride);
            w.heap.link(loc, done);
        }
    } else {
        for &loc in &locs {
            let done = normal_go(w, loc, sidx, slen);
            w.heap.link(loc, done);
        }
    }
    term
}

/// Runs `normal_go` to its fixpoint: one wide pass, then unit-stride passes
/// until a pass performs no rewrite.
pub(crate) fn normal(w: &mut Worker<'_>, host: u64, sidx: u64, slen: u64) -> Ptr {
    trace!(host, sidx, slen, "wide pass");
    w.heap.clear_seen();
    normal_go(w, host, sidx, slen);
    loop {
        let before = w.cost();
        trace!(cost = before, "unit pass");
        w.heap.clear_seen();
        let done = normal_go(w, host, 0, 1);
        if w.cost() == before {
            return done;
        }
    }
}

/// Normalizes the graph rooted at `host`.
///
/// The caller pre-builds the seed graph in `heap` cells `0..size` and states
/// how many workers to spread the arena over. Worker 0 runs on the calling
/// thread and doubles as the coordinator; the others are spawned here and
/// joined before returning.
pub fn run(
    prog: &Program,
    heap: &Heap,
    size: u64,
    host: u64,
    workers: usize,
) -> Result<Output, RunError> {
    if workers == 0 {
        return Err(RunError::NoWorkers);
    }
    let space = heap.words() / workers as u64;
    if space == 0 {
        return Err(RunError::SliceTooSmall {
            workers,
            words: heap.words(),
        });
    }
    if size > space {
        return Err(RunError::SeedTooLarge { size, space });
    }

    let pool = Pool::new(workers);
    debug!(workers, words = heap.words(), space, "normalizing");

    let output = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers - 1);
        for tid in 1..workers as u64 {
            let pool = &pool;
            handles.push(scope.spawn(move || {
                Worker::new(tid, heap, prog, pool, space, 0).serve()
            }));
        }

        let mut zero = Worker::new(0, heap, prog, &pool, space, size);
        let root = normal(&mut zero, host, 0, workers as u64);

        for tid in 1..workers as u64 {
            pool.stop(tid);
        }
        let mut cost = zero.cost();
        let mut used = zero.used();
        for handle in handles {
            match handle.join() {
                Ok((c, u)) => {
                    cost += c;
                    used += u;
                }
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        Output {
            cost,
            size: used,
            root,
        }
    });

    debug!(cost = output.cost, size = output.size, "normal form reached");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::program::{Program, MAIN};
    use crate::ptr::Oper;
    use crate::readback::readback;

    fn trace_init() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn bump(at: &mut u64, n: u64) -> u64 {
        let loc = *at;
        *at += n;
        loc
    }

    /// Checks the normal-form shape over the reachable graph: no beta or
    /// commutation redex survives, and no duplication sits on a value.
    fn assert_normal(heap: &Heap, prog: &Program, term: Ptr, seen: &mut HashSet<u64>) {
        if !seen.insert(term.word()) {
            return;
        }
        match term.tag() {
            Tag::Lam => assert_normal(heap, prog, heap.load(term.loc(1)), seen),
            Tag::App => {
                let head = heap.load(term.loc(0));
                assert!(
                    head.tag() != Tag::Lam && head.tag() != Tag::Sup,
                    "application head still reducible: {head:?}"
                );
                assert_normal(heap, prog, head, seen);
                assert_normal(heap, prog, heap.load(term.loc(1)), seen);
            }
            Tag::Sup => {
                assert_normal(heap, prog, heap.load(term.loc(0)), seen);
                assert_normal(heap, prog, heap.load(term.loc(1)), seen);
            }
            Tag::Dp0 | Tag::Dp1 => {
                let body = heap.load(term.loc(2));
                assert!(
                    !matches!(
                        body.tag(),
                        Tag::Lam | Tag::Sup | Tag::Ctr | Tag::Num | Tag::Era
                    ),
                    "duplication left sitting on a value: {body:?}"
                );
                assert_normal(heap, prog, body, seen);
            }
            Tag::Op2 => {
                let a = heap.load(term.loc(0));
                let b = heap.load(term.loc(1));
                assert!(
                    a.tag() != Tag::Num || b.tag() != Tag::Num,
                    "numeric redex survived"
                );
                assert_normal(heap, prog, a, seen);
                assert_normal(heap, prog, b, seen);
            }
            Tag::Ctr | Tag::Cal => {
                for i in 0..prog.arity_of(term.ext()) {
                    assert_normal(heap, prog, heap.load(term.loc(i)), seen);
                }
            }
            _ => {}
        }
    }

    fn check_normal(heap: &Heap, prog: &Program, root: Ptr) {
        assert_normal(heap, prog, root, &mut HashSet::new());
    }

    #[test]
    fn validates_run_parameters() {
        let prog = Program::new();
        let heap = Heap::new(8).unwrap();
        assert!(matches!(run(&prog, &heap, 1, 0, 0), Err(RunError::NoWorkers)));
        assert!(matches!(
            run(&prog, &heap, 1, 0, 16),
            Err(RunError::SliceTooSmall { .. })
        ));
        assert!(matches!(
            run(&prog, &heap, 6, 0, 2),
            Err(RunError::SeedTooLarge { .. })
        ));
    }

    #[test]
    fn s1_entry_rule_applies_the_identity() {
        let mut prog = Program::new();
        let main = prog
            .define(
                "Main",
                1,
                |_, frames, host, _| {
                    frames.revisit(host);
                    true
                },
                |w, host, term| {
                    w.inc_cost();
                    let lam = w.alloc(2);
                    let app = w.alloc(2);
                    let h = w.heap();
                    h.link(lam, Ptr::arg(0));
                    h.link(lam + 1, Ptr::var(lam));
                    h.link(app, Ptr::lam(lam));
                    h.link(app + 1, w.ask(term, 0));
                    w.clear(term.loc(0), 1);
                    h.link(host, Ptr::app(app));
                    true
                },
            )
            .unwrap();
        assert_eq!(main, MAIN);

        let heap = Heap::new(256).unwrap();
        heap.link(0, Ptr::cal(MAIN, 1));
        heap.link(1, Ptr::num(42));
        let out = run(&prog, &heap, 2, 0, 1).unwrap();
        assert_eq!(out.root, Ptr::num(42));
        assert_eq!(out.cost, 2);
        assert_eq!(readback(&heap, &prog, out.root), "42");
    }

    /// `λf.λx.(f (f x))` with an explicit duplication of `f`.
    fn church_two(heap: &Heap, at: &mut u64, col: u64) -> Ptr {
        let lam_f = bump(at, 2);
        let dup = bump(at, 3);
        let lam_x = bump(at, 2);
        let app_in = bump(at, 2);
        let app_out = bump(at, 2);
        heap.link(lam_f, Ptr::arg(0));
        heap.link(lam_f + 1, Ptr::lam(lam_x));
        heap.link(dup, Ptr::arg(0));
        heap.link(dup + 1, Ptr::arg(0));
        heap.link(dup + 2, Ptr::var(lam_f));
        heap.link(lam_x, Ptr::arg(0));
        heap.link(lam_x + 1, Ptr::app(app_out));
        heap.link(app_out, Ptr::dp0(col, dup));
        heap.link(app_out + 1, Ptr::app(app_in));
        heap.link(app_in, Ptr::dp1(col, dup));
        heap.link(app_in + 1, Ptr::var(lam_x));
        Ptr::lam(lam_f)
    }

    fn seed_church_squared(heap: &Heap, prog: &Program) -> u64 {
        let s_id = 0;
        let z_id = 1;
        assert_eq!(prog.name_of(s_id), Some("S"));
        let mut at = 1;
        let two_a = church_two(heap, &mut at, 8);
        let two_b = church_two(heap, &mut at, 9);
        let lam_s = bump(&mut at, 2);
        let ctr_s = bump(&mut at, 1);
        heap.link(lam_s, Ptr::arg(0));
        heap.link(lam_s + 1, Ptr::ctr(s_id, ctr_s));
        heap.link(ctr_s, Ptr::var(lam_s));
        let a1 = bump(&mut at, 2);
        heap.link(a1, two_a);
        heap.link(a1 + 1, two_b);
        let a2 = bump(&mut at, 2);
        heap.link(a2, Ptr::app(a1));
        heap.link(a2 + 1, Ptr::lam(lam_s));
        let a3 = bump(&mut at, 2);
        heap.link(a3, Ptr::app(a2));
        heap.link(a3 + 1, Ptr::ctr(z_id, 0));
        heap.link(0, Ptr::app(a3));
        at
    }

    #[test]
    fn s2_church_two_squared_matches_across_worker_counts() {
        let mut renders = Vec::new();
        for workers in [1usize, 4] {
            let mut prog = Program::new();
            prog.ctor("S", 1).unwrap();
            prog.ctor("Z", 0).unwrap();
            let heap = Heap::new(1 << 16).unwrap();
            let size = seed_church_squared(&heap, &prog);
            let out = run(&prog, &heap, size, 0, workers).unwrap();
            check_normal(&heap, &prog, out.root);
            renders.push(readback(&heap, &prog, out.root));
        }
        assert_eq!(renders[0], "(S (S (S (S (Z)))))");
        assert_eq!(renders[0], renders[1]);
    }

    #[test]
    fn s3_superposed_operand_commutes_through_addition() {
        let prog = Program::new();
        let heap = Heap::new(256).unwrap();
        // (+ {10 20} 5)
        let sup = 1;
        heap.link(sup, Ptr::num(10));
        heap.link(sup + 1, Ptr::num(20));
        let op = 3;
        heap.link(op, Ptr::sup(2, sup));
        heap.link(op + 1, Ptr::num(5));
        heap.link(0, Ptr::op2(Oper::Add as u64, op));
        let out = run(&prog, &heap, 5, 0, 1).unwrap();
        check_normal(&heap, &prog, out.root);
        assert_eq!(readback(&heap, &prog, out.root), "<15 25>");
    }

    #[test]
    fn s4_distinct_colors_commute_a_duplicated_superposition() {
        let mut prog = Program::new();
        prog.ctor("Pair", 2).unwrap();
        let heap = Heap::new(256).unwrap();
        // dup a b = {1 2} under a fresh color; (Pair a b)
        let sup = 1;
        heap.link(sup, Ptr::num(1));
        heap.link(sup + 1, Ptr::num(2));
        let dup = 3;
        heap.link(dup, Ptr::arg(0));
        heap.link(dup + 1, Ptr::arg(0));
        heap.link(dup + 2, Ptr::sup(1, sup));
        let pair = 6;
        heap.link(pair, Ptr::dp0(0, dup));
        heap.link(pair + 1, Ptr::dp1(0, dup));
        heap.link(0, Ptr::ctr(0, pair));
        let out = run(&prog, &heap, 8, 0, 1).unwrap();
        // one commutation plus one copy per branch number
        assert_eq!(out.cost, 3);
        assert_eq!(readback(&heap, &prog, out.root), "(Pair <1 2> <1 2>)");
    }

    fn seed_sum_tree(heap: &Heap, at: &mut u64, depth: u64) -> Ptr {
        if depth == 0 {
            return Ptr::num(1);
        }
        let node = bump(at, 2);
        let lhs = seed_sum_tree(heap, at, depth - 1);
        let rhs = seed_sum_tree(heap, at, depth - 1);
        heap.link(node, lhs);
        heap.link(node + 1, rhs);
        Ptr::op2(Oper::Add as u64, node)
    }

    #[test]
    fn s5_deep_sum_fans_out_without_changing_the_cost() {
        trace_init();
        let depth = 16;
        let mut costs = Vec::new();
        for workers in [1usize, 8] {
            let prog = Program::new();
            let heap = Heap::new((1 << 18) * workers as u64).unwrap();
            let mut at = 1;
            let root = seed_sum_tree(&heap, &mut at, depth);
            heap.link(0, root);
            let out = run(&prog, &heap, at, 0, workers).unwrap();
            assert_eq!(out.root, Ptr::num(1 << depth));
            check_normal(&heap, &prog, out.root);
            assert_eq!(readback(&heap, &prog, out.root), "65536");
            costs.push(out.cost);
        }
        // every internal node rewrites exactly once, whatever the schedule
        assert_eq!(costs[0], (1 << depth) - 1);
        assert_eq!(costs[0], costs[1]);
    }

    #[test]
    fn s6_erased_argument_is_never_evaluated() {
        let mut prog = Program::new();
        let loop_id = prog
            .define(
                "Loop",
                0,
                |_, frames, host, _| {
                    frames.revisit(host);
                    true
                },
                |w, host, _| {
                    w.inc_cost();
                    w.heap().link(host, Ptr::cal(0, 0));
                    true
                },
            )
            .unwrap();
        let heap = Heap::new(256).unwrap();
        // ((λ_.7) (Loop))
        let lam = 1;
        heap.link(lam, Ptr::era());
        heap.link(lam + 1, Ptr::num(7));
        let app = 3;
        heap.link(app, Ptr::lam(lam));
        heap.link(app + 1, Ptr::cal(loop_id, 0));
        heap.link(0, Ptr::app(app));
        let out = run(&prog, &heap, 5, 0, 1).unwrap();
        assert_eq!(out.root, Ptr::num(7));
        assert_eq!(out.cost, 1);
        assert_eq!(readback(&heap, &prog, out.root), "7");
    }

    #[test]
    fn superposed_strict_argument_commutes_through_a_call() {
        let mut prog = Program::new();
        // (Double n) = (* n 2), strict in n
        prog.define(
            "Double",
            1,
            |_, frames, host, term| {
                frames.revisit(host);
                frames.descend(term.loc(0));
                true
            },
            |w, host, term| {
                let argn = w.ask(term, 0);
                match argn.tag() {
                    Tag::Sup => {
                        crate::rules::cal_sup(w, host, term, argn, 0);
                        true
                    }
                    Tag::Num => {
                        w.inc_cost();
                        let op = w.alloc(2);
                        let h = w.heap();
                        h.link(op, argn);
                        h.link(op + 1, Ptr::num(2));
                        w.clear(term.loc(0), 1);
                        h.link(host, Ptr::op2(Oper::Mul as u64, op));
                        true
                    }
                    _ => false,
                }
            },
        )
        .unwrap();
        let heap = Heap::new(256).unwrap();
        // (Double {1 2})
        let sup = 1;
        heap.link(sup, Ptr::num(1));
        heap.link(sup + 1, Ptr::num(2));
        let cal = 3;
        heap.link(cal, Ptr::sup(5, sup));
        heap.link(0, Ptr::cal(MAIN, cal));
        let out = run(&prog, &heap, 4, 0, 1).unwrap();
        assert_eq!(readback(&heap, &prog, out.root), "<2 4>");
    }

    #[test]
    fn rule_built_duplication_shares_its_argument() {
        let mut prog = Program::new();
        // (Twice n) = (+ n n) through a fresh duplication
        prog.define(
            "Twice",
            1,
            |_, frames, host, _| {
                frames.revisit(host);
                true
            },
            |w, host, term| {
                w.inc_cost();
                let col = w.fresh_color();
                let dup = w.alloc(3);
                let op = w.alloc(2);
                let h = w.heap();
                h.link(dup, Ptr::arg(0));
                h.link(dup + 1, Ptr::arg(0));
                h.link(dup + 2, w.ask(term, 0));
                h.link(op, Ptr::dp0(col, dup));
                h.link(op + 1, Ptr::dp1(col, dup));
                w.clear(term.loc(0), 1);
                h.link(host, Ptr::op2(Oper::Add as u64, op));
                true
            },
        )
        .unwrap();
        let heap = Heap::new(256).unwrap();
        heap.link(0, Ptr::cal(MAIN, 1));
        heap.link(1, Ptr::num(21));
        let out = run(&prog, &heap, 2, 0, 1).unwrap();
        assert_eq!(out.root, Ptr::num(42));
        assert_eq!(out.cost, 3);
    }

    fn seed_random_ops(heap: &Heap, at: &mut u64, rng: &mut StdRng, depth: u64) -> Ptr {
        if depth == 0 || rng.gen_ratio(1, 5) {
            return Ptr::num(rng.gen_range(0..1000));
        }
        let node = bump(at, 2);
        let lhs = seed_random_ops(heap, at, rng, depth - 1);
        let rhs = seed_random_ops(heap, at, rng, depth - 1);
        heap.link(node, lhs);
        heap.link(node + 1, rhs);
        Ptr::op2(rng.gen_range(0..16), node)
    }

    #[test]
    fn random_numeric_trees_agree_across_worker_counts() {
        for round in 0..16u64 {
            let mut renders = Vec::new();
            for workers in [1usize, 4] {
                let prog = Program::new();
                let heap = Heap::new((1 << 12) * workers as u64).unwrap();
                let mut rng = StdRng::seed_from_u64(round);
                let mut at = 1;
                let root = seed_random_ops(&heap, &mut at, &mut rng, 6);
                heap.link(0, root);
                let out = run(&prog, &heap, at, 0, workers).unwrap();
                assert_eq!(out.root.tag(), Tag::Num);
                renders.push(readback(&heap, &prog, out.root));
            }
            assert_eq!(renders[0], renders[1], "round {round}");
        }
    }
}
