//! Built-in interaction rules
//!
//! Every rule is local: it touches the matched nodes, a bounded number of
//! fresh cells, and the binder slots it substitutes into. Fresh cells come
//! from the calling worker's own slice, so rules never contend with each
//! other; the only cross-worker effect is the release store inside
//! [`Worker::subst`]. Each application counts one rewrite and clears the
//! consumed nodes.

use crate::ptr::{Oper, Ptr};
use crate::worker::Worker;

/// `((λx.B) A)` rewrites to `B` with `A` delivered to `x`.
pub fn app_lam(w: &mut Worker<'_>, host: u64, term: Ptr, arg0: Ptr) -> Ptr {
    w.inc_cost();
    let done = w.heap().link(host, w.ask(arg0, 1));
    let argm = w.ask(term, 1);
    w.subst(arg0.loc(0), argm);
    w.clear(term.loc(0), 2);
    w.clear(arg0.loc(0), 2);
    done
}

/// `({a b} c)` commutes to `{(a c0) (b c1)}` where `dup c0 c1 = c` under the
/// superposition's color.
pub fn app_sup(w: &mut Worker<'_>, host: u64, term: Ptr, arg0: Ptr) -> Ptr {
    w.inc_cost();
    let app0 = w.alloc(2);
    let app1 = w.alloc(2);
    let let0 = w.alloc(3);
    let par0 = w.alloc(2);
    let h = w.heap();
    h.link(let0, Ptr::arg(0));
    h.link(let0 + 1, Ptr::arg(0));
    h.link(let0 + 2, w.ask(term, 1));
    h.link(app0 + 1, Ptr::dp0(arg0.ext(), let0));
    h.link(app0, w.ask(arg0, 0));
    h.link(app1, w.ask(arg0, 1));
    h.link(app1 + 1, Ptr::dp1(arg0.ext(), let0));
    h.link(par0, Ptr::app(app0));
    h.link(par0 + 1, Ptr::app(app1));
    let done = Ptr::sup(arg0.ext(), par0);
    h.link(host, done);
    w.clear(term.loc(0), 2);
    w.clear(arg0.loc(0), 2);
    done
}

/// `dup r s = λx.B` copies the lambda: `r` and `s` each get a fresh lambda
/// whose body is one endpoint of a new duplication of `B`, and `x` becomes
/// the superposition of the fresh binders.
pub fn dup_lam(w: &mut Worker<'_>, term: Ptr, arg0: Ptr) {
    w.inc_cost();
    let let0 = w.alloc(3);
    let par0 = w.alloc(2);
    let lam0 = w.alloc(2);
    let lam1 = w.alloc(2);
    let h = w.heap();
    h.link(let0, Ptr::arg(0));
    h.link(let0 + 1, Ptr::arg(0));
    h.link(let0 + 2, w.ask(arg0, 1));
    h.link(par0 + 1, Ptr::var(lam1));
    h.link(par0, Ptr::var(lam0));
    h.link(lam0, Ptr::arg(0));
    h.link(lam0 + 1, Ptr::dp0(term.ext(), let0));
    h.link(lam1, Ptr::arg(0));
    h.link(lam1 + 1, Ptr::dp1(term.ext(), let0));
    w.subst(term.loc(0), Ptr::lam(lam0));
    w.subst(term.loc(1), Ptr::lam(lam1));
    w.subst(arg0.loc(0), Ptr::sup(term.ext(), par0));
    w.clear(term.loc(0), 3);
    w.clear(arg0.loc(0), 2);
}

/// `dup r s = {a b}`: equal colors annihilate (`r` gets `a`, `s` gets `b`);
/// distinct colors commute, leaving each endpoint a superposition of fresh
/// duplications of the branches.
pub fn dup_sup(w: &mut Worker<'_>, term: Ptr, arg0: Ptr) {
    if term.ext() == arg0.ext() {
        w.inc_cost();
        let a = w.ask(arg0, 0);
        let b = w.ask(arg0, 1);
        w.subst(term.loc(0), a);
        w.subst(term.loc(1), b);
        w.clear(term.loc(0), 3);
        w.clear(arg0.loc(0), 2);
    } else {
        w.inc_cost();
        let par0 = w.alloc(2);
        let let0 = w.alloc(3);
        let par1 = w.alloc(2);
        let let1 = w.alloc(3);
        let h = w.heap();
        h.link(let0, Ptr::arg(0));
        h.link(let0 + 1, Ptr::arg(0));
        h.link(let0 + 2, w.ask(arg0, 0));
        h.link(let1, Ptr::arg(0));
        h.link(let1 + 1, Ptr::arg(0));
        h.link(let1 + 2, w.ask(arg0, 1));
        h.link(par1, Ptr::dp1(term.ext(), let0));
        h.link(par1 + 1, Ptr::dp1(term.ext(), let1));
        h.link(par0, Ptr::dp0(term.ext(), let0));
        h.link(par0 + 1, Ptr::dp0(term.ext(), let1));
        w.subst(term.loc(0), Ptr::sup(arg0.ext(), par0));
        w.subst(term.loc(1), Ptr::sup(arg0.ext(), par1));
        w.clear(term.loc(0), 3);
        w.clear(arg0.loc(0), 2);
    }
}

/// `dup r s = (K a1 .. an)` copies the constructor, duplicating every field.
/// Nullary constructors are shared as plain words.
pub fn dup_ctr(w: &mut Worker<'_>, term: Ptr, arg0: Ptr) {
    w.inc_cost();
    let func = arg0.ext();
    let arit = w.program().arity_of(func);
    if arit == 0 {
        w.subst(term.loc(0), Ptr::ctr(func, 0));
        w.subst(term.loc(1), Ptr::ctr(func, 0));
        w.clear(term.loc(0), 3);
    } else {
        let ctr0 = w.alloc(arit);
        let ctr1 = w.alloc(arit);
        for i in 0..arit {
            let leti = w.alloc(3);
            let h = w.heap();
            h.link(leti, Ptr::arg(0));
            h.link(leti + 1, Ptr::arg(0));
            h.link(leti + 2, w.ask(arg0, i));
            h.link(ctr0 + i, Ptr::dp0(term.ext(), leti));
            h.link(ctr1 + i, Ptr::dp1(term.ext(), leti));
        }
        w.subst(term.loc(0), Ptr::ctr(func, ctr0));
        w.subst(term.loc(1), Ptr::ctr(func, ctr1));
        w.clear(arg0.loc(0), arit);
        w.clear(term.loc(0), 3);
    }
}

/// `dup r s = N` copies the unboxed number to both endpoints.
pub fn dup_num(w: &mut Worker<'_>, term: Ptr, arg0: Ptr) {
    w.inc_cost();
    w.subst(term.loc(0), arg0);
    w.subst(term.loc(1), arg0);
    w.clear(term.loc(0), 3);
}

/// `dup r s = *` erases both endpoints.
pub fn dup_era(w: &mut Worker<'_>, term: Ptr) {
    w.inc_cost();
    w.subst(term.loc(0), Ptr::era());
    w.subst(term.loc(1), Ptr::era());
    w.clear(term.loc(0), 3);
}

/// `(op a b)` with two numbers reduces to the operator's value under the
/// 60-bit mask. Unassigned operator ids compute 0.
pub fn op2_num(w: &mut Worker<'_>, host: u64, term: Ptr, arg0: Ptr, arg1: Ptr) -> Ptr {
    w.inc_cost();
    let a = arg0.num_val();
    let b = arg1.num_val();
    let c = match Oper::try_from(term.ext()) {
        Ok(ope) => ope.apply(a, b),
        Err(_) => 0,
    };
    let done = Ptr::num(c);
    w.clear(term.loc(0), 2);
    w.heap().link(host, done);
    done
}

/// `(op .. {a b} ..)` commutes the operation through the superposed operand
/// at slot `n`, duplicating the other operand.
pub fn op2_sup(w: &mut Worker<'_>, host: u64, term: Ptr, n: u64) -> Ptr {
    w.inc_cost();
    let sup = w.ask(term, n);
    let other = w.ask(term, 1 - n);
    let op20 = w.alloc(2);
    let op21 = w.alloc(2);
    let let0 = w.alloc(3);
    let par0 = w.alloc(2);
    let h = w.heap();
    h.link(let0, Ptr::arg(0));
    h.link(let0 + 1, Ptr::arg(0));
    h.link(let0 + 2, other);
    h.link(op20 + (1 - n), Ptr::dp0(sup.ext(), let0));
    h.link(op20 + n, w.ask(sup, 0));
    h.link(op21 + n, w.ask(sup, 1));
    h.link(op21 + (1 - n), Ptr::dp1(sup.ext(), let0));
    h.link(par0, Ptr::op2(term.ext(), op20));
    h.link(par0 + 1, Ptr::op2(term.ext(), op21));
    let done = Ptr::sup(sup.ext(), par0);
    h.link(host, done);
    done
}

/// `(F .. {a b} ..)` with the superposition at argument `n` commutes the
/// call: every other argument is duplicated and the result superposes two
/// calls, one per branch. Compiled apply callbacks invoke this when a strict
/// argument turns out superposed.
pub fn cal_sup(w: &mut Worker<'_>, host: u64, term: Ptr, argn: Ptr, n: u64) -> Ptr {
    w.inc_cost();
    let func = term.ext();
    let arit = w.program().arity_of(func);
    let fun0 = w.alloc(arit);
    let fun1 = w.alloc(arit);
    let par0 = w.alloc(2);
    for i in 0..arit {
        if i != n {
            let leti = w.alloc(3);
            let argi = w.ask(term, i);
            let h = w.heap();
            h.link(fun0 + i, Ptr::dp0(argn.ext(), leti));
            h.link(fun1 + i, Ptr::dp1(argn.ext(), leti));
            h.link(leti, Ptr::arg(0));
            h.link(leti + 1, Ptr::arg(0));
            h.link(leti + 2, argi);
        } else {
            let h = w.heap();
            h.link(fun0 + i, w.ask(argn, 0));
            h.link(fun1 + i, w.ask(argn, 1));
        }
    }
    let h = w.heap();
    h.link(par0, Ptr::cal(func, fun0));
    h.link(par0 + 1, Ptr::cal(func, fun1));
    let done = Ptr::sup(argn.ext(), par0);
    h.link(host, done);
    w.clear(term.loc(0), arit);
    w.clear(argn.loc(0), 2);
    done
}
