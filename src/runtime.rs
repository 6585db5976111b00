// Copyright 2026 the greenlet contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Per-thread runtime state.
//!
//! Greenlets are `!Send`/`!Sync` by construction (see [`crate::greenlet`]),
//! so every piece of mutable scheduling state lives behind a single
//! `thread_local!`, created on first use by each thread rather than as a
//! process-wide static.

use crate::greenlet::GreenletInner;
use crate::value::Value;
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

pub(crate) struct Runtime {
    /// The greenlet whose code is presently executing on this thread.
    pub(crate) current: Rc<GreenletInner>,
    /// Staged destination of an in-flight switch; `None` outside of one.
    pub(crate) target: Option<Rc<GreenletInner>>,
    /// The value being handed across an in-flight switch.
    pub(crate) pass_around: Option<Value>,
    /// A body panic awaiting delivery to whoever resumes after the
    /// finish-redirect to the parent.
    pub(crate) pending_panic: Option<Box<dyn Any + Send + 'static>>,
    /// This thread's unkillable root greenlet.
    pub(crate) main: Rc<GreenletInner>,
    /// Stand-in for host-runtime state (e.g. interpreter recursion depth)
    /// that must be snapshotted before a switch and restored after.
    pub(crate) host_recursion_depth: u32,
}

impl Runtime {
    fn new() -> Self {
        let main = Rc::new(GreenletInner::new_main());
        Runtime {
            current: main.clone(),
            target: None,
            pass_around: None,
            pending_panic: None,
            main,
            host_recursion_depth: 0,
        }
    }
}

thread_local! {
    pub(crate) static RUNTIME: RefCell<Runtime> = RefCell::new(Runtime::new());
}

/// Returns the greenlet currently executing on this thread.
pub(crate) fn current_inner() -> Rc<GreenletInner> {
    RUNTIME.with(|rt| rt.borrow().current.clone())
}

/// Returns this thread's main greenlet.
pub(crate) fn main_inner() -> Rc<GreenletInner> {
    RUNTIME.with(|rt| rt.borrow().main.clone())
}
