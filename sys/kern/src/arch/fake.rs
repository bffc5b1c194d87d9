// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host stand-ins for the arch layer.
//!
//! These exist so the crate (and everything stacked on the host-testable
//! `kerncore` beneath it) builds under `cargo build`/`cargo test` on a
//! desktop. None of them can actually run a task; the entry points that
//! would start one panic instead.

use core::sync::atomic::{AtomicU32, Ordering};

macro_rules! klog {
    ($s:expr) => {};
    ($s:expr, $($tt:tt)*) => {};
}

macro_rules! uassert {
    ($cond:expr) => {
        assert!($cond)
    };
}

static CRIT_NESTING: AtomicU32 = AtomicU32::new(0);

#[no_mangle]
pub extern "C" fn raw_critical_enter() {}

#[no_mangle]
pub extern "C" fn raw_critical_exit() {}

pub fn enter_critical() {
    let n = CRIT_NESTING.load(Ordering::Relaxed);
    CRIT_NESTING.store(n + 1, Ordering::Relaxed);
}

pub fn exit_critical() {
    let n = CRIT_NESTING.load(Ordering::Relaxed);
    uassert!(n != 0);
    CRIT_NESTING.store(n - 1, Ordering::Relaxed);
}

pub fn pend_switch() {}

pub const STACK_FILL: u32 = 0xdead_beef;

const FRAME_WORDS: usize = 16;

pub const MIN_STACK_WORDS: usize = FRAME_WORDS;

pub fn initialize_task_stack(_entry: fn(), stack: &mut [u32]) -> *mut u32 {
    let n = stack.len();
    uassert!(n >= MIN_STACK_WORDS);
    for word in stack.iter_mut() {
        *word = STACK_FILL;
    }
    &mut stack[n - FRAME_WORDS] as *mut u32
}

pub fn configure_interrupts() {}

pub fn start_idle(_stack_top: *mut u32) -> ! {
    panic!("entering the idle task on a host");
}

pub fn disable_interrupts() {}

pub unsafe fn enable_interrupts() {}

pub fn wait_for_interrupt() {
    core::hint::spin_loop();
}
