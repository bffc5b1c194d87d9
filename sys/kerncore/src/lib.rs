// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Tests get the standard library; everything else is no_std. Watch out,
// though: rust-analyzer tends to check with `test` enabled, so the editor
// will happily accept code that only a real target build rejects.
#![cfg_attr(not(test), no_std)]

//! Portable kernel core.
//!
//! This crate holds the parts of the kernel that don't need a particular
//! machine under them: the task table and its intrusive index lists, the
//! scheduler election and wake logic, the tick arithmetic, and the blocking
//! protocol shared by byte queues and counting semaphores. Everything here is
//! plain data plus methods; the clock, the interrupt masks, and the actual
//! stack switching live in the `kern` crate's `arch` layer, and time always
//! arrives as a parameter.
//!
//! Keeping this crate free of statics and architecture is what lets the
//! scheduler run under `cargo test` on a desktop.

pub mod err;
pub mod queue;
pub mod sched;
pub mod task;
pub mod time;

pub use err::{ConfigError, WouldBlock};
pub use queue::{Queue, Semaphore};
pub use sched::Kernel;
pub use task::{
    Priority, QueueIndex, RealtimeWaker, SemIndex, Task, TaskFlags, TaskIndex,
    WaitChannel,
};
pub use time::{Ticks, Wait};
