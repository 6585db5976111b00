// Copyright 2026 the greenlet contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The switch engine: resolve a target, hand off a value, and invoke the
//! architecture trampoline that actually moves the hardware stack pointer.

use crate::arch;
use crate::error::Error;
use crate::greenlet::GreenletInner;
use crate::runtime::RUNTIME;
use crate::stack_slice::{refill, spill};
use crate::value::Value;
use std::rc::Rc;

/// Sentinel returned by [`save_state_trampoline`] when a spill needed to make
/// room for the switch couldn't allocate. A genuine `stack_start - stackref`
/// difference landing on this exact value is astronomically unlikely and is
/// accepted as the tradeoff for not needing a second return channel out of
/// naked assembly.
pub(crate) const SAVE_STATE_FAILED: isize = isize::MIN;

/// Snapshot of host-runtime state that must survive a pause and be restored
/// when this call frame resumes. There is no real host interpreter attached
/// to this core, so this stands in for the frame pointer / recursion counter
/// a real one would carry: a single counter, saved before the trampoline
/// runs and restored once it returns.
struct HostFrame {
    recursion_depth: u32,
}

impl HostFrame {
    fn capture() -> Self {
        RUNTIME.with(|rt| HostFrame {
            recursion_depth: rt.borrow().host_recursion_depth,
        })
    }

    fn restore(self) {
        RUNTIME.with(|rt| rt.borrow_mut().host_recursion_depth = self.recursion_depth);
    }
}

/// Walks `parent` links until reaching a greenlet that hasn't finished,
/// matching the auto-redirect behavior required when switching to a
/// finished target.
fn resolve_finished(mut g: Rc<GreenletInner>) -> Rc<GreenletInner> {
    while g.finished.get() {
        let parent = g
            .parent
            .borrow()
            .clone()
            .expect("a finished greenlet must have a parent (main never finishes)");
        g = parent;
    }
    g
}

/// Debug-only check of the chain/parent-topology invariants against
/// whichever greenlet is presently `current`. A no-op in release builds;
/// every individual check is a `debug_assert!` so a violation panics with a
/// message naming the broken invariant rather than failing silently.
#[cfg(debug_assertions)]
fn check_invariants() {
    RUNTIME.with(|rt| {
        let current = rt.borrow().current.clone();

        // Invariant 1: current is never finished.
        debug_assert!(!current.finished.get(), "current greenlet must never be finished");

        // Invariants 2, 6, 7: the stack_prev chain from current is acyclic,
        // terminates at main, contains no finished greenlet, and is
        // address-ordered on a downward-growing stack. Invariants 3, 4: each
        // chain member's saved-byte count is either zero or exactly its
        // extent's size.
        let mut seen_chain = Vec::new();
        let mut cursor = current.clone();
        loop {
            let ptr = Rc::as_ptr(&cursor);
            debug_assert!(!seen_chain.contains(&ptr), "stack_prev chain contains a cycle");
            seen_chain.push(ptr);
            debug_assert!(
                !cursor.finished.get(),
                "a finished greenlet must not appear in the stack_prev chain"
            );

            let stop = cursor.stack_stop.get();
            let start = cursor.stack_start.get();
            let saved = cursor.stack_copy.borrow().len();
            debug_assert!(
                saved == 0 || (start != 0 && saved == stop.wrapping_sub(start)),
                "stack_copy length must be 0 or exactly cover [stack_start, stack_stop)"
            );

            if cursor.is_main() {
                break;
            }
            let prev = cursor.stack_prev.borrow().clone().and_then(|weak| weak.upgrade());
            match prev {
                Some(p) => {
                    if start != 0 && p.stack_start.get() != 0 {
                        debug_assert!(
                            stop <= p.stack_start.get(),
                            "chain elements must be address-ordered on a downward-growing stack"
                        );
                    }
                    cursor = p;
                }
                None => break,
            }
        }

        // Invariant 5: the parent tree is acyclic.
        let mut seen_parents = Vec::new();
        let mut p = Some(current);
        while let Some(g) = p {
            let ptr = Rc::as_ptr(&g);
            debug_assert!(!seen_parents.contains(&ptr), "parent chain contains a cycle");
            seen_parents.push(ptr);
            p = g.parent.borrow().clone();
        }
    });
}

#[cfg(not(debug_assertions))]
fn check_invariants() {}

/// Transfers control to `target`, carrying `value`, and returns whatever the
/// party that eventually switches back delivers.
///
/// This is the engine beneath the public, panic-propagating wrapper on
/// [`crate::Greenlet::switch`].
pub(crate) fn do_switch(target: Rc<GreenletInner>, value: Value) -> Result<Value, Error> {
    check_invariants();
    let target = resolve_finished(target);
    let current = RUNTIME.with(|rt| rt.borrow().current.clone());

    if Rc::ptr_eq(&target, &current) {
        // Switching to oneself is a documented no-op rendezvous: no stack
        // motion, the value just passes straight through.
        check_invariants();
        return Ok(value);
    }

    let host_frame = HostFrame::capture();
    RUNTIME.with(|rt| {
        let mut rt = rt.borrow_mut();
        rt.target = Some(target);
        rt.pass_around = Some(value);
    });

    // Safety: `target`/`pass_around` are staged above, and `save_state`/
    // `restore_state` (invoked by the trampoline) only ever run with the
    // runtime borrow released, so the `RefCell` borrows they each take do
    // not overlap with this function's or each other's.
    let status = unsafe { arch::switch_trampoline() };

    if status != 0 {
        RUNTIME.with(|rt| {
            let mut rt = rt.borrow_mut();
            rt.target = None;
            rt.pass_around = None;
        });
        return Err(Error::SpillAllocation);
    }

    host_frame.restore();

    if let Some(payload) = RUNTIME.with(|rt| rt.borrow_mut().pending_panic.take()) {
        return Err(Error::BodyPanicked(payload));
    }

    let value = RUNTIME
        .with(|rt| rt.borrow_mut().pass_around.take())
        .expect("pass_around must be populated by whoever switched back to us");
    check_invariants();
    Ok(value)
}

/// Called from the trampoline with the about-to-be-inactive stack pointer.
/// Walks the `stack_prev` chain spilling everything between `current` and
/// the staged target, mirroring `slp_save_state`/`g_save` in the original
/// implementation. Returns the `stack_start - stackref` delta the trampoline
/// should add to `rsp`/`rbp`, or [`SAVE_STATE_FAILED`] if a spill couldn't
/// allocate (in which case the switch is aborted and nothing has moved).
#[allow(
    clippy::cast_possible_wrap,
    reason = "stack pointer difference fits isize on every supported target"
)]
pub(crate) extern "C" fn save_state_trampoline(stackref: usize) -> isize {
    RUNTIME.with(|rt| {
        let mut rt = rt.borrow_mut();
        let target = rt
            .target
            .clone()
            .expect("save_state invoked without a staged target");
        let target_stop = target.stack_stop.get();

        let mut cursor = rt.current.clone();
        cursor.stack_start.set(stackref);

        loop {
            if cursor.stack_stop.get() >= target_stop {
                break;
            }
            if cursor.stack_stop.get() != 0 {
                let stop = cursor.stack_stop.get();
                if spill(&cursor, stop).is_err() {
                    return SAVE_STATE_FAILED;
                }
            }
            let prev = cursor.stack_prev.borrow().clone();
            cursor = match prev.and_then(|weak| weak.upgrade()) {
                Some(p) => p,
                None => {
                    log::error!("stack_prev chain is corrupt: walked off the end before reaching main");
                    panic!("corrupted greenlet stack_prev chain");
                }
            };
        }

        if !Rc::ptr_eq(&cursor, &target) && spill(&cursor, target_stop).is_err() {
            return SAVE_STATE_FAILED;
        }

        // The walk's final position becomes the outgoing greenlet's new
        // neighbor once the incoming one adopts its place in the chain.
        rt.current = cursor;

        let start = target.stack_start.get();
        if start == 0 {
            // `0` means target is still the actually-resident greenlet (it
            // has never been suspended, e.g. main on the very first switch,
            // or a greenlet mid-`plant`ing switching back to its creator who
            // hasn't moved). Nothing to move: the diff is zero.
            0
        } else {
            start.wrapping_sub(stackref) as isize
        }
    })
}

/// Called from the trampoline once `rsp`/`rbp` have been moved onto the
/// target's reclaimed region. Refills the target's heap-saved bytes (if any)
/// and splices it into the chain as the new resident.
pub(crate) extern "C" fn restore_state_trampoline() {
    RUNTIME.with(|rt| {
        let mut rt = rt.borrow_mut();
        let target = rt
            .target
            .take()
            .expect("restore_state invoked without a staged target");
        if !target.stack_copy.borrow().is_empty() {
            refill(&target);
        }
        *target.stack_prev.borrow_mut() = Some(Rc::downgrade(&rt.current));
        rt.current = target;
    });
}
