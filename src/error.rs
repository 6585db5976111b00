// Copyright 2026 the greenlet contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::any::Any;
use std::fmt;

/// Errors reported by switching, spilling, or re-parenting a greenlet.
pub enum Error {
    /// A heap allocation needed to spill part of the shared stack failed.
    ///
    /// The switch that triggered this did not take place: both the caller
    /// and the target remain exactly where they were.
    SpillAllocation,

    /// [`Greenlet::set_parent`](crate::Greenlet::set_parent) was asked to
    /// install a parent that is, directly or transitively, the greenlet
    /// itself.
    CyclicParent,

    /// The greenlet's body unwound with something other than the shutdown
    /// signal. The payload is exactly what [`std::panic::catch_unwind`]
    /// caught, for the caller to resume or inspect.
    BodyPanicked(Box<dyn Any + Send + 'static>),
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SpillAllocation => f.write_str("SpillAllocation"),
            Error::CyclicParent => f.write_str("CyclicParent"),
            Error::BodyPanicked(_) => f.write_str("BodyPanicked(..)"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SpillAllocation => {
                write!(f, "failed to allocate heap storage to spill a stack slice")
            }
            Error::CyclicParent => {
                write!(f, "cannot make a greenlet its own ancestor")
            }
            Error::BodyPanicked(_) => {
                write!(f, "greenlet body terminated by an unhandled panic")
            }
        }
    }
}

impl core::error::Error for Error {}
