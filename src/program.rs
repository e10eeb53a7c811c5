//! Rule table: compiled function and constructor dispatch
//!
//! The front-end compiles every function of the source program into two
//! callbacks sharing one id space with the constructors:
//!
//! - the **visit** callback runs when the reducer first meets a call in head
//!   position. It demands whichever arguments the rules pattern-match on by
//!   queueing continuation frames, and answers whether it queued anything.
//! - the **apply** callback runs once those arguments are in weak head form.
//!   It matches the rules, builds the right-hand side from fresh
//!   allocations, substitutes the bound variables, and answers whether it
//!   rewrote.
//!
//! Constructors occupy plain entries whose callbacks never fire; they exist
//! so arity and name lookups work uniformly for CTR and CAL words.

use crate::ptr::Ptr;
use crate::reduce::Frames;
use crate::worker::{Worker, MAX_ARITY};

/// Conventional id of the entry function.
pub const MAIN: u64 = 0;

/// Head-position demand callback (step 0 of a compiled rule).
pub type VisitFn = fn(&mut Worker<'_>, &mut Frames, u64, Ptr) -> bool;

/// Pattern-match and rewrite callback (step 1 of a compiled rule).
pub type ApplyFn = fn(&mut Worker<'_>, u64, Ptr) -> bool;

/// Rule-table construction errors.
#[derive(Debug, thiserror::Error)]
pub enum ProgramError {
    /// Node arity is capped; wider signatures must be curried by the
    /// front-end.
    #[error("{name} has arity {arity}, nodes are capped at {max} slots", max = MAX_ARITY)]
    ArityTooLarge {
        /// Offending function or constructor name.
        name: String,
        /// Declared arity.
        arity: u64,
    },
}

/// One function or constructor entry.
pub struct Fun {
    /// Source-level name, used by the readback printer.
    pub name: String,
    /// Number of argument slots.
    pub arity: u64,
    /// Step-0 dispatcher.
    pub visit: VisitFn,
    /// Step-1 dispatcher.
    pub apply: ApplyFn,
}

/// The id-indexed table of functions and constructors.
#[derive(Default)]
pub struct Program {
    funs: Vec<Fun>,
}

fn inert_visit(_: &mut Worker<'_>, _: &mut Frames, _: u64, _: Ptr) -> bool {
    false
}

fn inert_apply(_: &mut Worker<'_>, _: u64, _: Ptr) -> bool {
    false
}

impl Program {
    /// An empty table.
    pub fn new() -> Self {
        Program::default()
    }

    /// Registers a function with its dispatcher pair and returns its id.
    /// Ids are handed out in registration order; the entry function must be
    /// registered first so it receives [`MAIN`].
    pub fn define(
        &mut self,
        name: &str,
        arity: u64,
        visit: VisitFn,
        apply: ApplyFn,
    ) -> Result<u64, ProgramError> {
        if arity > MAX_ARITY {
            return Err(ProgramError::ArityTooLarge {
                name: name.to_string(),
                arity,
            });
        }
        let id = self.funs.len() as u64;
        self.funs.push(Fun {
            name: name.to_string(),
            arity,
            visit,
            apply,
        });
        Ok(id)
    }

    /// Registers a constructor and returns its id.
    pub fn ctor(&mut self, name: &str, arity: u64) -> Result<u64, ProgramError> {
        self.define(name, arity, inert_visit, inert_apply)
    }

    /// The entry for `fid`, if registered.
    pub fn fun(&self, fid: u64) -> Option<&Fun> {
        self.funs.get(fid as usize)
    }

    /// Arity of `fid`. Unregistered ids read as nullary, so a malformed
    /// graph degrades to a leaf instead of an out-of-bounds walk.
    pub fn arity_of(&self, fid: u64) -> u64 {
        self.funs.get(fid as usize).map_or(0, |f| f.arity)
    }

    /// Name of `fid`, if registered.
    pub fn name_of(&self, fid: u64) -> Option<&str> {
        self.funs.get(fid as usize).map(|f| f.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_assigned_in_registration_order() {
        let mut prog = Program::new();
        let main = prog.define("Main", 0, inert_visit, inert_apply).unwrap();
        let cons = prog.ctor("Cons", 2).unwrap();
        let nil = prog.ctor("Nil", 0).unwrap();
        assert_eq!(main, MAIN);
        assert_eq!(cons, 1);
        assert_eq!(nil, 2);
        assert_eq!(prog.name_of(1), Some("Cons"));
        assert_eq!(prog.arity_of(2), 0);
    }

    #[test]
    fn unknown_ids_read_as_nullary_and_nameless() {
        let prog = Program::new();
        assert_eq!(prog.arity_of(99), 0);
        assert!(prog.name_of(99).is_none());
        assert!(prog.fun(99).is_none());
    }

    #[test]
    fn oversized_arities_are_rejected() {
        let mut prog = Program::new();
        let err = prog.ctor("Wide", MAX_ARITY + 1).unwrap_err();
        assert!(matches!(err, ProgramError::ArityTooLarge { arity: 17, .. }));
    }
}
