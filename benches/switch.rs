// Copyright 2026 the greenlet contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use criterion::measurement::Measurement;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use greenlet::{current, Greenlet, Value};

fn ping_pong_switch<M: Measurement + 'static>(name: &str, c: &mut Criterion<M>) {
    let echo = Greenlet::new(|mut input| loop {
        input = current().parent().unwrap().switch(input).unwrap();
    });

    c.bench_function(name, |b| {
        b.iter(|| echo.switch(black_box(Value::new(0usize))).unwrap());
    });
}

fn greenlet_creation<M: Measurement + 'static>(name: &str, c: &mut Criterion<M>) {
    c.bench_function(name, |b| {
        b.iter(|| {
            let g = Greenlet::new(|input| input);
            black_box(&g);
        });
    });
}

fn switch_time(c: &mut Criterion) {
    ping_pong_switch("switch_time", c);
}
fn creation_time(c: &mut Criterion) {
    greenlet_creation("creation_time", c);
}

criterion_group!(
    name = time;
    config = Criterion::default();
    targets = switch_time, creation_time
);

cfg_if::cfg_if! {
    if #[cfg(any(target_arch = "x86", target_arch = "x86_64"))] {
        use criterion_cycles_per_byte::CyclesPerByte;

        fn switch_cycles(c: &mut Criterion<CyclesPerByte>) {
            ping_pong_switch("switch_cycles", c);
        }
        fn creation_cycles(c: &mut Criterion<CyclesPerByte>) {
            greenlet_creation("creation_cycles", c);
        }

        criterion_group!(
            name = cycles;
            config = Criterion::default().with_measurement(CyclesPerByte);
            targets = switch_cycles, creation_cycles
        );

        criterion_main!(cycles, time);
    } else {
        criterion_main!(time);
    }
}
