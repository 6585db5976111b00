// Copyright 2026 the greenlet contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Spilling and refilling slices of the one shared native stack.
//!
//! A greenlet owns the address range `[stack_start, stack_stop)` while it is
//! resident on the real stack. When another greenlet needs that range,
//! [`spill`] copies it out to a heap buffer; when this greenlet becomes
//! resident again, [`refill`] copies it back in before the trampoline
//! un-adjusts `rsp`/`rbp` onto it.

use crate::error::Error;
use crate::greenlet::GreenletInner;
use std::rc::Rc;

/// Ensures `g`'s heap copy covers `[g.stack_start, up_to)`, growing it if the
/// previously-saved region was smaller.
///
/// `up_to` is always an address at or above `g.stack_start` (shallower in a
/// downward-growing stack): either another chain member's own `stack_stop`,
/// or the switch target's `stack_stop` for the greenlet straddling it.
pub(crate) fn spill(g: &Rc<GreenletInner>, up_to: usize) -> Result<(), Error> {
    let start = g.stack_start.get();
    debug_assert_ne!(start, 0, "spilling a greenlet with no live stack_start");
    debug_assert!(up_to >= start, "spill range must not be inverted");

    let want = up_to - start;
    let mut copy = g.stack_copy.borrow_mut();
    let have = copy.len();
    if want <= have {
        return Ok(());
    }

    let mut grown = Vec::new();
    grown
        .try_reserve_exact(want)
        .map_err(|_| Error::SpillAllocation)?;
    grown.resize(want, 0);
    grown[..have].copy_from_slice(&copy);

    // Safety: `[start + have, start + want)` is part of the live native
    // stack that the chain walk in `save_state` has determined is not yet
    // spilled and is not owned by any greenlet below `g` in the chain, so it
    // is safe to read here before it is overwritten by whichever greenlet
    // reclaims the region.
    let fresh = unsafe { std::slice::from_raw_parts((start + have) as *const u8, want - have) };
    grown[have..].copy_from_slice(fresh);

    log::trace!(
        "spill: {} new bytes for [{:#x}, {:#x})",
        want - have,
        start + have,
        start + want
    );
    *copy = grown;
    Ok(())
}

/// Copies `g`'s heap-saved bytes back onto the native stack at `g.stack_start`
/// and clears the heap copy. A no-op if nothing was ever spilled.
///
/// # Safety
///
/// The caller (the trampoline, via `restore_state`) must have already
/// adjusted the live stack pointer so that `[g.stack_start, g.stack_start +
/// len)` is free for `g` to reclaim.
pub(crate) fn refill(g: &Rc<GreenletInner>) {
    let mut copy = g.stack_copy.borrow_mut();
    if copy.is_empty() {
        return;
    }
    let start = g.stack_start.get();
    log::trace!("refill: {} bytes at {:#x}", copy.len(), start);
    // Safety: see function doc comment; `start` is this greenlet's own
    // reclaimed stack region, sized exactly to `copy.len()`.
    unsafe {
        std::ptr::copy_nonoverlapping(copy.as_ptr(), start as *mut u8, copy.len());
    }
    copy.clear();
}
