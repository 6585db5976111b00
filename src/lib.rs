// Copyright 2026 the greenlet contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Single-threaded, cooperative stackful coroutines ("greenlets") that
//! switch slices of *one* shared native call stack.
//!
//! Unlike coroutine crates that give each task its own independently
//! allocated stack, every [`Greenlet`] on a thread takes turns being the
//! resident of that thread's one real stack. Switching away from a greenlet
//! spills the portion of the stack it occupies to a heap buffer; switching
//! back refills it before handing control back. This is the design
//! `greenlet`'s C extension and Stackless Python's `slp_switch` use, not
//! the corosensei-style independent-stack approach.
//!
//! Greenlets form a tree rooted at each thread's [`main`] greenlet: every
//! greenlet has a `parent`, defaulting to whichever greenlet created it.
//! [`Greenlet::switch`] transfers control (and a value) to any other
//! greenlet on the same thread; switching into a greenlet whose body has
//! already finished redirects to its nearest unfinished ancestor.
//!
//! ```
//! use greenlet::{current, Greenlet, Value};
//!
//! let adder = Greenlet::new(|input| {
//!     let mut total = input.downcast::<i64>().unwrap();
//!     loop {
//!         let delta = current()
//!             .parent()
//!             .unwrap()
//!             .switch(Value::new(total))
//!             .unwrap()
//!             .downcast::<i64>()
//!             .unwrap();
//!         total += delta;
//!     }
//! });
//!
//! assert_eq!(
//!     *adder.switch(Value::new(1i64)).unwrap().downcast_ref::<i64>().unwrap(),
//!     1
//! );
//! assert_eq!(
//!     *adder.switch(Value::new(10i64)).unwrap().downcast_ref::<i64>().unwrap(),
//!     11
//! );
//! ```
//!
//! Greenlets are `!Send`/`!Sync`: every handle is pinned to the thread it
//! was created on, enforced at compile time rather than checked at runtime.

mod arch;
mod error;
mod greenlet;
mod runtime;
mod stack_slice;
mod switch;
mod value;

pub use error::Error;
pub use greenlet::{current, main, Greenlet};
pub use value::Value;
