// Copyright 2026 the greenlet contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Greenlet creation, the initial bootstrap, and shutdown-on-destroy.

use crate::error::Error;
use crate::runtime::{current_inner, main_inner, RUNTIME};
use crate::switch::do_switch;
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

/// Private unwind payload used to deliver the shutdown signal into a
/// suspended greenlet body. Never exposed outside this crate: a body that
/// wants to run cleanup on shutdown wraps its own suspension point (a call
/// to `switch`) the way it would wrap any other panic.
struct ShutdownSignal;

/// The state kept per coroutine in the reference implementation this is
/// modeled on, minus the object-system fields this crate has no host for.
pub(crate) struct GreenletInner {
    /// Address this greenlet's resident stack slice starts at; `0` while
    /// this greenlet is the one currently running (its true value is
    /// whatever the live `rsp` happens to be, which isn't meaningful to
    /// read back until it is suspended again).
    pub(crate) stack_start: Cell<usize>,
    /// Upper bound of this greenlet's slice; `usize::MAX` for the
    /// unkillable main greenlet, `0` once finished.
    pub(crate) stack_stop: Cell<usize>,
    /// Heap copy of `[stack_start, stack_start + len)` while this greenlet
    /// is not resident on the real stack. Empty means nothing has been
    /// spilled yet (this greenlet's slice is still untouched on the real
    /// stack, or it has never run).
    pub(crate) stack_copy: RefCell<Vec<u8>>,
    /// Non-owning: whichever greenlet was resident just below this one the
    /// last time this one was suspended. Never walked past main.
    pub(crate) stack_prev: RefCell<Option<Weak<GreenletInner>>>,
    /// Owning: keeps every ancestor alive for as long as any descendant is.
    pub(crate) parent: RefCell<Option<Rc<GreenletInner>>>,
    /// Set once the body has returned, panicked, or converted a shutdown
    /// signal into a normal return.
    pub(crate) finished: Cell<bool>,
    /// Set by [`shutdown`] immediately before switching into a suspended
    /// greenlet to destroy it; cleared and turned into a panic the moment
    /// that greenlet resumes inside its own `switch` call.
    pub(crate) shutdown_requested: Cell<bool>,
    /// Distinguishes the creation-time return from `plant` (the save-only
    /// switch back to the creator) from the later resume-into-body return
    /// through that exact same call site — the "explicit resumption flag"
    /// realization of the classic returns-twice bootstrap.
    bootstrap_entered: Cell<bool>,
    /// Taken exactly once, the first time this greenlet is actually
    /// switched into from the outside.
    body: RefCell<Option<Box<dyn FnOnce(Value) -> Value>>>,
}

impl GreenletInner {
    pub(crate) fn new_main() -> Self {
        GreenletInner {
            stack_start: Cell::new(0),
            stack_stop: Cell::new(usize::MAX),
            stack_copy: RefCell::new(Vec::new()),
            stack_prev: RefCell::new(None),
            parent: RefCell::new(None),
            finished: Cell::new(false),
            shutdown_requested: Cell::new(false),
            bootstrap_entered: Cell::new(true),
            body: RefCell::new(None),
        }
    }

    pub(crate) fn is_main(&self) -> bool {
        self.stack_stop.get() == usize::MAX
    }
}

/// A cooperatively-scheduled stackful coroutine sharing this thread's one
/// native call stack with every other greenlet.
///
/// `Greenlet` is a cheap, reference-counted handle: cloning it does not
/// duplicate the underlying coroutine, it hands out another owning
/// reference to the same one, exactly like `greenlet.greenlet` objects in
/// the system this is modeled on.
pub struct Greenlet(pub(crate) Rc<GreenletInner>, PhantomData<*mut ()>);

impl Clone for Greenlet {
    fn clone(&self) -> Self {
        Greenlet(self.0.clone(), PhantomData)
    }
}

impl fmt::Debug for Greenlet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Greenlet")
            .field("main", &self.0.is_main())
            .field("finished", &self.0.finished.get())
            .finish()
    }
}

impl PartialEq for Greenlet {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Greenlet {}

impl Greenlet {
    /// Creates a new greenlet whose parent is the greenlet currently
    /// running.
    ///
    /// `body` does not run yet: creation only plants the bootstrap frame.
    /// It runs lazily, the first time this greenlet is switched into.
    ///
    /// # Panics
    ///
    /// Panics if the heap allocation needed to plant the bootstrap frame
    /// fails.
    pub fn new<F>(body: F) -> Self
    where
        F: FnOnce(Value) -> Value + 'static,
    {
        Self::with_parent(current(), body)
    }

    /// Creates a new greenlet with an explicit parent.
    ///
    /// # Panics
    ///
    /// Panics if the heap allocation needed to plant the bootstrap frame
    /// fails.
    pub fn with_parent<F>(parent: Greenlet, body: F) -> Self
    where
        F: FnOnce(Value) -> Value + 'static,
    {
        let inner = Rc::new(GreenletInner {
            stack_start: Cell::new(0),
            stack_stop: Cell::new(0),
            stack_copy: RefCell::new(Vec::new()),
            stack_prev: RefCell::new(None),
            parent: RefCell::new(Some(parent.0.clone())),
            finished: Cell::new(false),
            shutdown_requested: Cell::new(false),
            bootstrap_entered: Cell::new(false),
            body: RefCell::new(Some(Box::new(body))),
        });
        plant(&inner);
        Greenlet(inner, PhantomData)
    }

    /// Transfers control to this greenlet, carrying `value`, and blocks
    /// until some other greenlet switches back to the caller.
    ///
    /// Returns whatever that eventual switch-back delivers. If this
    /// greenlet's body has already finished, the switch is silently
    /// redirected to its nearest unfinished ancestor.
    ///
    /// # Panics
    ///
    /// If the shutdown signal fires on the caller itself — either because
    /// `shutdown` marked it for destruction before this very call (the
    /// caller's body has not switched out even once yet) or because it
    /// fires on whichever greenlet ends up resuming after this switch
    /// returns — this re-raises that signal as a panic, so that any
    /// `catch_unwind` the body installed around its own suspension point
    /// runs its cleanup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SpillAllocation`] if a stack slice couldn't be
    /// spilled to make room for the switch; returns
    /// [`Error::BodyPanicked`] if the greenlet that ends up resuming
    /// finished by unwinding with something other than the shutdown
    /// signal.
    pub fn switch(&self, value: Value) -> Result<Value, Error> {
        // Checked before attempting the switch too: a greenlet that
        // `shutdown` is destroying before it was ever actually switched into
        // only observes that request the first time its own body reaches a
        // suspension point, which is exactly here, before any stack motion
        // happens.
        if current_inner().shutdown_requested.replace(false) {
            std::panic::panic_any(ShutdownSignal);
        }
        let result = do_switch(self.0.clone(), value)?;
        if current_inner().shutdown_requested.replace(false) {
            std::panic::panic_any(ShutdownSignal);
        }
        Ok(result)
    }

    /// True once the body has returned, panicked, or been shut down.
    pub fn is_finished(&self) -> bool {
        self.0.finished.get()
    }

    /// This greenlet's current parent, if any. Only the main greenlet of a
    /// thread has none.
    pub fn parent(&self) -> Option<Greenlet> {
        self.0
            .parent
            .borrow()
            .clone()
            .map(|inner| Greenlet(inner, PhantomData))
    }

    /// Reassigns this greenlet's parent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CyclicParent`] if `new_parent` is this greenlet
    /// itself, or has this greenlet among its own ancestors, without
    /// changing anything.
    pub fn set_parent(&self, new_parent: Greenlet) -> Result<(), Error> {
        let mut cursor = Some(new_parent.0.clone());
        while let Some(candidate) = cursor {
            if Rc::ptr_eq(&candidate, &self.0) {
                return Err(Error::CyclicParent);
            }
            cursor = candidate.parent.borrow().clone();
        }
        *self.0.parent.borrow_mut() = Some(new_parent.0.clone());
        Ok(())
    }
}

impl Drop for Greenlet {
    fn drop(&mut self) {
        // `bootstrap_entered` is set during construction's own planting
        // switch, so it is true for every constructed greenlet, whether or
        // not anyone has ever switched into it for real; the shutdown dance
        // covers both cases identically (see `run_body`/`shutdown`). Only
        // the last handle to an unfinished greenlet triggers it; a finished
        // one has nothing left to clean up, and any other handle means this
        // isn't really going away.
        if Rc::strong_count(&self.0) == 1 && self.0.bootstrap_entered.get() && !self.0.finished.get() {
            shutdown(&self.0);
        }
    }
}

/// Returns the greenlet currently executing on this thread.
pub fn current() -> Greenlet {
    Greenlet(current_inner(), PhantomData)
}

/// Returns this thread's main greenlet: the one every other greenlet on
/// this thread is, directly or transitively, a descendant of. It never
/// finishes and its parent is always `None`.
pub fn main() -> Greenlet {
    Greenlet(main_inner(), PhantomData)
}

/// Plants the bootstrap frame for a freshly constructed greenlet: runs its
/// first (save-only) switch synchronously so that its stack extent and
/// chain position exist the instant `new`/`with_parent` returns, without
/// running any of the caller's `body` yet.
fn plant(g: &Rc<GreenletInner>) {
    // A stack-local byte whose address marks the shallow edge of this
    // greenlet's slice, the same role `&dummymarker` plays in the
    // reference implementation's `g_initialstub`.
    let marker: u8 = 0;
    g.stack_stop.set(std::ptr::from_ref(&marker) as usize);

    let creator = current_inner();
    *g.stack_prev.borrow_mut() = Some(Rc::downgrade(&creator));
    RUNTIME.with(|rt| rt.borrow_mut().current = g.clone());

    let resumed = do_switch(creator, Value::none()).expect("the planting switch cannot fail: it never spills");

    if g.bootstrap_entered.replace(true) {
        // Second arrival at this exact call site: we were actually switched
        // into from the outside. Run the body for real; this never returns.
        run_body(g.clone(), resumed);
        unreachable!("run_body diverges by redirecting to the parent chain");
    }
    // First arrival: creation is complete, fall through back to `new`.
}

/// Runs a greenlet's body to completion (including via the shutdown signal),
/// then redirects to its parent chain since it is now finished.
fn run_body(g: Rc<GreenletInner>, input: Value) -> ! {
    let body = g
        .body
        .borrow_mut()
        .take()
        .expect("a greenlet's body is consumed exactly once");

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| body(input)));
    g.finished.set(true);

    match outcome {
        Ok(result) => {
            let _ = do_switch(g.clone(), result);
        }
        Err(payload) if payload.downcast_ref::<ShutdownSignal>().is_some() => {
            log::debug!("greenlet finished via shutdown signal");
            let _ = do_switch(g.clone(), Value::none());
        }
        Err(payload) => {
            RUNTIME.with(|rt| rt.borrow_mut().pending_panic = Some(payload));
            let _ = do_switch(g.clone(), Value::none());
        }
    }

    unreachable!("switching away from a finished greenlet must not return to it")
}

/// Destroys a greenlet suspended mid-body: delivers the shutdown signal by
/// switching into it so its own `catch_unwind` (installed by `run_body`
/// around the body closure) can run any cleanup the body's exception
/// handling would have run, then lets it finish normally.
///
/// Because switching away from a now-finished greenlet redirects to its
/// parent chain rather than necessarily back to this call site, this
/// assumes the usual single-threaded-tree usage where a greenlet's parent
/// chain does lead back to whoever is dropping the last reference to it.
fn shutdown(g: &Rc<GreenletInner>) {
    log::debug!("dropping unfinished greenlet, delivering shutdown signal");
    g.shutdown_requested.set(true);
    match do_switch(g.clone(), Value::none()) {
        Ok(_) => {}
        Err(Error::BodyPanicked(payload)) => {
            // The body raised something other than the shutdown signal on
            // its way out; that's still a finished greenlet, just drop the
            // payload rather than letting a destructor unwind.
            drop(payload);
        }
        Err(Error::SpillAllocation) => {
            log::error!("allocation failure while shutting down a dropped greenlet");
        }
        Err(Error::CyclicParent) => unreachable!("do_switch never returns CyclicParent"),
    }
    if current_inner().shutdown_requested.replace(false) {
        // We were resumed directly without the signal having fired in `g`
        // (e.g. it had already finished by the time control reached us);
        // nothing further to do.
    }
}
