//! Normal-form serialization
//!
//! Walks a (usually normalized) graph and renders it as text: `@xN body`
//! for lambdas, `(f a)` for applications, `<a b>` for superpositions,
//! decimal for numbers, `(Name args..)` for constructors and calls. A
//! duplication endpoint renders as its body viewed from that endpoint's
//! side, which is tracked per color on a direction stack; a superposition
//! whose color has a pending direction collapses to the chosen branch.
//!
//! Variables are named by position: a pre-pass collects every non-erased
//! binder slot in visit order and occurrences print the index of their slot
//! in that order. The pre-pass carries a seen set, so shared subgraphs and
//! the back-edges a duplication weaves are walked once.

use std::collections::{HashMap, HashSet};

use crate::heap::Heap;
use crate::program::Program;
use crate::ptr::{Oper, Ptr, Tag};

/// Renders the graph hanging from `term`.
pub fn readback(heap: &Heap, prog: &Program, term: Ptr) -> String {
    let mut vars = Vec::new();
    let mut seen = HashSet::new();
    collect_vars(heap, prog, term, &mut vars, &mut seen);
    let mut out = String::new();
    let mut dirs: HashMap<u64, Vec<u64>> = HashMap::new();
    write_term(&mut out, heap, prog, term, &vars, &mut dirs);
    out
}

fn collect_vars(
    heap: &Heap,
    prog: &Program,
    term: Ptr,
    vars: &mut Vec<u64>,
    seen: &mut HashSet<u64>,
) {
    if !seen.insert(term.word()) {
        return;
    }
    match term.tag() {
        Tag::Lam => {
            if heap.load(term.loc(0)).tag() != Tag::Era {
                vars.push(term.loc(0));
            }
            collect_vars(heap, prog, heap.load(term.loc(1)), vars, seen);
        }
        Tag::App | Tag::Sup | Tag::Op2 => {
            collect_vars(heap, prog, heap.load(term.loc(0)), vars, seen);
            collect_vars(heap, prog, heap.load(term.loc(1)), vars, seen);
        }
        Tag::Dp0 | Tag::Dp1 => {
            collect_vars(heap, prog, heap.load_acquire(term.loc(2)), vars, seen);
        }
        Tag::Ctr | Tag::Cal => {
            for i in 0..prog.arity_of(term.ext()) {
                collect_vars(heap, prog, heap.load(term.loc(i)), vars, seen);
            }
        }
        _ => {}
    }
}

fn write_term(
    out: &mut String,
    heap: &Heap,
    prog: &Program,
    term: Ptr,
    vars: &[u64],
    dirs: &mut HashMap<u64, Vec<u64>>,
) {
    match term.tag() {
        Tag::Lam => {
            out.push('@');
            if heap.load(term.loc(0)).tag() == Tag::Era {
                out.push('_');
            } else {
                match vars.iter().position(|&v| v == term.loc(0)) {
                    Some(n) => {
                        out.push('x');
                        out.push_str(&n.to_string());
                    }
                    None => out.push('?'),
                }
            }
            out.push(' ');
            write_term(out, heap, prog, heap.load(term.loc(1)), vars, dirs);
        }
        Tag::App => {
            out.push('(');
            write_term(out, heap, prog, heap.load(term.loc(0)), vars, dirs);
            out.push(' ');
            write_term(out, heap, prog, heap.load(term.loc(1)), vars, dirs);
            out.push(')');
        }
        Tag::Sup => {
            let col = term.ext();
            let head = dirs.get_mut(&col).and_then(|stack| stack.pop());
            if let Some(side) = head {
                let branch = heap.load(term.loc(side));
                write_term(out, heap, prog, branch, vars, dirs);
                dirs.entry(col).or_default().push(side);
            } else {
                out.push('<');
                write_term(out, heap, prog, heap.load(term.loc(0)), vars, dirs);
                out.push(' ');
                write_term(out, heap, prog, heap.load(term.loc(1)), vars, dirs);
                out.push('>');
            }
        }
        Tag::Dp0 | Tag::Dp1 => {
            let col = term.ext();
            let side = (term.tag() == Tag::Dp1) as u64;
            dirs.entry(col).or_default().push(side);
            let body = heap.load_acquire(term.loc(2));
            write_term(out, heap, prog, body, vars, dirs);
            if let Some(stack) = dirs.get_mut(&col) {
                stack.pop();
            }
        }
        Tag::Op2 => {
            out.push('(');
            match Oper::try_from(term.ext()) {
                Ok(ope) => out.push_str(ope.symbol()),
                Err(_) => out.push('?'),
            }
            out.push(' ');
            write_term(out, heap, prog, heap.load(term.loc(0)), vars, dirs);
            out.push(' ');
            write_term(out, heap, prog, heap.load(term.loc(1)), vars, dirs);
            out.push(')');
        }
        Tag::Num => {
            out.push_str(&term.num_val().to_string());
        }
        Tag::Ctr | Tag::Cal => {
            out.push('(');
            match prog.name_of(term.ext()) {
                Some(name) => out.push_str(name),
                None => {
                    out.push('$');
                    out.push_str(&term.ext().to_string());
                }
            }
            for i in 0..prog.arity_of(term.ext()) {
                out.push(' ');
                write_term(out, heap, prog, heap.load(term.loc(i)), vars, dirs);
            }
            out.push(')');
        }
        Tag::Var => match vars.iter().position(|&v| v == term.loc(0)) {
            Some(n) => {
                out.push('x');
                out.push_str(&n.to_string());
            }
            None => out.push('?'),
        },
        _ => out.push('?'),
    }
}
