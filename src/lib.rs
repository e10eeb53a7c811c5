//! Crate root: public surface, canonical constants, and runtime-wide invariants
//!
//! This crate is the core of a massively parallel functional evaluator. A
//! program lives in a flat heap of tagged 64-bit cells; reduction is graph
//! rewriting driven to normal form by a pool of worker threads, with sharing
//! preserved through explicit duplication nodes in the interaction-net
//! style. The front-end that compiles source text into a rule table, and the
//! CLI around it, are separate concerns: this crate takes a seed graph plus
//! a [`Program`] and hands back statistics and a normalized root.
//!
//! ## Invariants (runtime-wide)
//!
//! - **Ownership by position.** Each worker allocates from its own slice of
//!   the arena and is the only writer of cells it allocated, until a
//!   substitution hands a subtree to whichever worker reaches it next.
//!   Substitution is the sole cross-worker publication point and is
//!   release/acquire fenced; see [`worker::Worker::subst`].
//! - **Duplication flags.** Traversing into a duplication body requires the
//!   node's one-byte flag. Contention is never waited out: the loser treats
//!   the endpoint as a value and a later pass retries.
//! - **Colors.** Superpositions and duplications carry a 24-bit color;
//!   equal colors annihilate, distinct colors commute. Workers mint colors
//!   from disjoint ranges of the [`MAX_DUPS`] space.
//! - **Numbers.** Unboxed integers are 60 bits and every arithmetic result
//!   is folded back into that range ([`NUM_MASK`]).
//!
//! Failure modes follow the same split everywhere: construction and
//! parameter validation return precise errors, while conditions that mean
//! the graph or the rule table is broken (heap exhaustion, vacant cells in
//! head position) abort.

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms)]

/// Tagged cell words, node tags and numeric operators.
pub mod ptr;

/// Shared cell arena, duplication locks and the visited bitset.
pub mod heap;

/// Worker-local state, allocation and the mailbox pool.
pub mod worker;

/// Rule table: compiled function and constructor dispatch.
pub mod program;

/// Built-in interaction rules.
pub mod rules;

/// Weak-head reduction.
pub mod reduce;

/// Full normalization and the parallel driver.
pub mod normal;

/// Normal-form serialization.
pub mod readback;

pub use crate::heap::{Heap, HeapError};
pub use crate::normal::{run, Output, RunError};
pub use crate::program::{ApplyFn, Fun, Program, ProgramError, VisitFn, MAIN};
pub use crate::ptr::{Oper, Ptr, Tag, NUM_MASK};
pub use crate::readback::readback;
pub use crate::reduce::{reduce, Frames};
pub use crate::worker::{Worker, MAX_ARITY, MAX_DUPS};
