//! Weak-head reduction
//!
//! [`reduce`] drives the graph at one position to weak head normal form with
//! an explicit continuation stack. Each frame is two machine words: the host
//! position to return to and the phase to resume in. The descend phase walks
//! into head positions until it reaches a value or a locked duplication; the
//! revisit phase fires whichever rewrite rule the freshly reduced head
//! enables and loops.
//!
//! Duplication traversal is the one place two workers can race, so the
//! reducer takes the target node's flag before reading through an endpoint.
//! A held flag is not waited on: the endpoint is treated as a value and a
//! later sequential pass picks the redex up once the owner is done.

use crate::ptr::{Ptr, Tag};
use crate::rules;
use crate::worker::Worker;

struct Frame {
    host: u64,
    revisit: bool,
}

/// Continuation stack of the reducer. Step-0 dispatchers push onto this to
/// demand argument evaluation before their rules match.
#[derive(Default)]
pub struct Frames {
    items: Vec<Frame>,
}

impl Frames {
    /// An empty stack.
    pub fn new() -> Self {
        Frames::default()
    }

    /// Queues `host` to be revisited once everything pushed after it has
    /// been reduced.
    pub fn revisit(&mut self, host: u64) {
        self.items.push(Frame {
            host,
            revisit: true,
        });
    }

    /// Queues `host` for a descend visit. Frames pop in reverse push order,
    /// so the argument demanded first must be pushed last.
    pub fn descend(&mut self, host: u64) {
        self.items.push(Frame {
            host,
            revisit: false,
        });
    }

    /// Whether any continuation is pending.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn pop(&mut self) -> Option<Frame> {
        self.items.pop()
    }
}

/// Reduces the term at `root` to weak head normal form and returns the
/// pointer left there. `slen` is the width of the worker stride driving this
/// position; a stride of 1 asks for eager numeric reduction, wider strides
/// leave OP2 nodes alone so the normalizer can fan their operands out.
pub fn reduce(w: &mut Worker<'_>, root: u64, slen: u64) -> Ptr {
    let mut stack = Frames::new();
    let mut host = root;
    let mut revisit = false;

    'next: loop {
        let term = w.heap.load(host);

        if !revisit {
            debug_assert!(term.tag() != Tag::Nil, "vacant cell in head position at {host}");
            match term.tag() {
                Tag::App => {
                    stack.revisit(host);
                    host = term.loc(0);
                    continue 'next;
                }
                Tag::Dp0 | Tag::Dp1 => {
                    if w.heap.try_lock(term.loc(0)) {
                        let side = (term.tag() == Tag::Dp1) as u64;
                        let bound = w.heap.load_acquire(term.loc(side));
                        if bound.tag() == Tag::Arg {
                            stack.revisit(host);
                            host = term.loc(2);
                            continue 'next;
                        }
                        w.heap.link(host, bound);
                        w.clear(term.loc(side), 1);
                        w.heap.unlock(term.loc(0));
                        continue 'next;
                    }
                    // another worker owns this duplication; a later pass
                    // retries it
                }
                Tag::Var => {
                    let bound = w.heap.load_acquire(term.loc(0));
                    if bound.tag() != Tag::Arg && bound.tag() != Tag::Era {
                        w.heap.link(host, bound);
                        w.clear(term.loc(0), 1);
                        continue 'next;
                    }
                }
                Tag::Op2 => {
                    if slen == 1 || !stack.is_empty() {
                        stack.revisit(host);
                        stack.descend(term.loc(0));
                        host = term.loc(1);
                        continue 'next;
                    }
                }
                Tag::Cal => {
                    // a demanding dispatcher queues its continuation frames;
                    // an inert one leaves the call in weak head form
                    if let Some(fun) = w.prog.fun(term.ext()) {
                        (fun.visit)(w, &mut stack, host, term);
                    }
                }
                _ => {}
            }
        } else {
            match term.tag() {
                Tag::App => {
                    let arg0 = w.ask(term, 0);
                    match arg0.tag() {
                        Tag::Lam => {
                            rules::app_lam(w, host, term, arg0);
                            revisit = false;
                            continue 'next;
                        }
                        Tag::Sup => {
                            rules::app_sup(w, host, term, arg0);
                        }
                        _ => {}
                    }
                }
                Tag::Dp0 | Tag::Dp1 => {
                    let arg0 = w.heap.load_acquire(term.loc(2));
                    match arg0.tag() {
                        Tag::Lam => {
                            rules::dup_lam(w, term, arg0);
                            w.heap.unlock(term.loc(0));
                            revisit = false;
                            continue 'next;
                        }
                        Tag::Sup => {
                            rules::dup_sup(w, term, arg0);
                            w.heap.unlock(term.loc(0));
                            revisit = false;
                            continue 'next;
                        }
                        Tag::Num => {
                            rules::dup_num(w, term, arg0);
                            w.heap.unlock(term.loc(0));
                            revisit = false;
                            continue 'next;
                        }
                        Tag::Ctr => {
                            rules::dup_ctr(w, term, arg0);
                            w.heap.unlock(term.loc(0));
                            revisit = false;
                            continue 'next;
                        }
                        Tag::Era => {
                            rules::dup_era(w, term);
                            w.heap.unlock(term.loc(0));
                            revisit = false;
                            continue 'next;
                        }
                        _ => {
                            // the body is stuck; give the duplication back
                            w.heap.unlock(term.loc(0));
                        }
                    }
                }
                Tag::Op2 => {
                    let arg0 = w.ask(term, 0);
                    let arg1 = w.ask(term, 1);
                    if arg0.tag() == Tag::Num && arg1.tag() == Tag::Num {
                        rules::op2_num(w, host, term, arg0, arg1);
                    } else if arg0.tag() == Tag::Sup {
                        rules::op2_sup(w, host, term, 0);
                    } else if arg1.tag() == Tag::Sup {
                        rules::op2_sup(w, host, term, 1);
                    }
                }
                Tag::Cal => {
                    if let Some(fun) = w.prog.fun(term.ext()) {
                        if (fun.apply)(w, host, term) {
                            revisit = false;
                            continue 'next;
                        }
                    }
                }
                _ => {}
            }
        }

        match stack.pop() {
            Some(frame) => {
                host = frame.host;
                revisit = frame.revisit;
            }
            None => break,
        }
    }

    w.heap.load(root)
}
