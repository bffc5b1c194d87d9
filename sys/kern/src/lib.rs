// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![cfg_attr(target_os = "none", no_std)]

//! A tiny preemptive multitasking kernel for single-core Cortex-M0-class
//! microcontrollers.
//!
//! The kernel provides fixed-priority scheduling with round-robin rotation
//! inside each priority level, tick-driven timed sleeps, blocking byte-queue
//! and counting-semaphore IPC, and a two-level interrupt regime that leaves
//! a configured set of "realtime" interrupt sources unmasked even inside
//! kernel critical sections. There is no memory protection and no dynamic
//! task creation: every task, queue, and semaphore is registered before the
//! scheduler starts and lives until power-off.
//!
//! # Design principles
//!
//! While this isn't a *deeply* principled kernel, a few ideas appear
//! consistently:
//!
//! 1. Static configuration. The system takes a single shape specified at
//!    compile time (`app` module); there is nothing to allocate.
//! 2. A strong preference for safe code. Everything that can live in the
//!    portable, host-testable `kerncore` crate does; `unsafe` is confined
//!    to the arch layer and the singleton access it guards.
//! 3. Simple and clear algorithms over fast and clever ones. List walks
//!    are linear; the task count is small.
//!
//! # What the board provides
//!
//! The kernel is SoC-independent and expects three things from board code:
//! the vector-table entry for [`app::YIELD_IRQ`] routed to the
//! `ContextSwitch` handler symbol, a periodic timer interrupt on
//! [`app::TICK_IRQ`] whose handler acknowledges the peripheral and calls
//! [`tick`], and a panic handler.

#[macro_use]
pub mod arch;

pub mod app;
pub mod profiling;
pub mod queue;
pub mod sem;
pub mod startup;
pub mod time;

pub use kerncore::{
    ConfigError, Priority, Queue, QueueIndex, RealtimeWaker, SemIndex,
    Semaphore, Task, TaskFlags, TaskIndex, Ticks, Wait,
};

pub use arch::{enter_critical, exit_critical};
pub use queue::{read_queue, read_queue_irq, write_queue, write_queue_irq};
pub use sem::{signal_semaphore, wait_semaphore};
pub use startup::{
    add_queue, add_semaphore, add_task, configure_power_hooks, start_kernel,
    PowerHooks, Stack,
};
pub use time::{
    now, realtime_waker, sleep, sleep_until, tick, wake_task_realtime,
};

/// Requests a scheduling pass by pending the scheduler interrupt. The
/// actual switch happens once the interrupt mask allows it, so this is safe
/// to call inside a critical section -- the switch is simply delivered at
/// the exit. Callable from task context or kernel-serviceable interrupt
/// handlers (realtime handlers use [`wake_task_realtime`] instead).
pub fn yield_now() {
    arch::pend_switch();
}
