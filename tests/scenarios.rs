// Copyright 2026 the greenlet contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use greenlet::{current, main, Greenlet, Value};
use std::cell::Cell;
use std::rc::Rc;

#[test]
fn generator_style_producer() {
    let evens = Greenlet::new(|input| {
        let limit = *input.downcast_ref::<u32>().unwrap();
        let mut n = 0u32;
        while n < limit {
            current().parent().unwrap().switch(Value::new(n)).unwrap();
            n += 2;
        }
        Value::new(n)
    });

    let mut collected = Vec::new();
    let mut reply = evens.switch(Value::new(6u32)).unwrap();
    while !evens.is_finished() {
        collected.push(*reply.downcast_ref::<u32>().unwrap());
        reply = evens.switch(Value::none()).unwrap();
    }

    assert_eq!(collected, vec![0, 2, 4]);
    assert!(evens.is_finished());
}

#[test]
fn main_greenlet_has_no_parent() {
    assert_eq!(main().parent(), None);
    assert_eq!(current(), main());
}

#[test]
fn three_way_tree_delivers_to_the_right_leaf() {
    let hub = Greenlet::new(|_| Value::none());
    let left = Greenlet::with_parent(hub.clone(), |input| {
        let n = *input.downcast_ref::<i32>().unwrap();
        current().parent().unwrap().switch(Value::new(format!("left:{n}")))
            .unwrap()
    });
    let right = Greenlet::with_parent(hub.clone(), |input| {
        let n = *input.downcast_ref::<i32>().unwrap();
        current().parent().unwrap().switch(Value::new(format!("right:{n}")))
            .unwrap()
    });

    let got = left.switch(Value::new(1i32)).unwrap().downcast::<String>().unwrap();
    assert_eq!(got, "left:1");

    let got = right.switch(Value::new(2i32)).unwrap().downcast::<String>().unwrap();
    assert_eq!(got, "right:2");

    assert_eq!(left.parent().unwrap(), hub);
    assert_eq!(right.parent().unwrap(), hub);
}

#[test]
fn reparenting_mid_life_changes_future_redirects() {
    let old_home = Greenlet::new(|v| v);
    let new_home = Greenlet::new(|v| v);
    let nomad = Greenlet::with_parent(old_home.clone(), |v| v);

    assert_eq!(nomad.parent().unwrap(), old_home);
    nomad.set_parent(new_home.clone()).unwrap();
    assert_eq!(nomad.parent().unwrap(), new_home);

    // Finish `nomad`, then confirm a later switch to it redirects to its
    // *current* parent, not the one it had at creation.
    nomad.switch(Value::none()).unwrap();
    assert!(nomad.is_finished());
    assert_eq!(nomad.parent().unwrap(), new_home);
}

#[test]
fn shutdown_propagates_through_a_chain_of_generators() {
    let inner_ran_cleanup = Rc::new(Cell::new(false));
    let outer_ran_cleanup = Rc::new(Cell::new(false));

    let inner_flag = inner_ran_cleanup.clone();
    let inner = Greenlet::new(move |_| {
        struct Cleanup(Rc<Cell<bool>>);
        impl Drop for Cleanup {
            fn drop(&mut self) {
                self.0.set(true);
            }
        }
        let _c = Cleanup(inner_flag);
        loop {
            current().parent().unwrap().switch(Value::none()).unwrap();
        }
    });

    let outer_flag = outer_ran_cleanup.clone();
    let inner_for_outer = inner.clone();
    let outer = Greenlet::new(move |_| {
        struct Cleanup(Rc<Cell<bool>>);
        impl Drop for Cleanup {
            fn drop(&mut self) {
                self.0.set(true);
            }
        }
        let _c = Cleanup(outer_flag);
        inner_for_outer.switch(Value::none()).unwrap();
        loop {
            current().parent().unwrap().switch(Value::none()).unwrap();
        }
    });
    inner.set_parent(outer.clone()).unwrap();

    outer.switch(Value::none()).unwrap();
    assert!(!inner_ran_cleanup.get());
    assert!(!outer_ran_cleanup.get());

    drop(outer);
    assert!(outer_ran_cleanup.get());

    drop(inner);
    assert!(inner_ran_cleanup.get());
}
