// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Common error-handling support.
//!
//! There are deliberately few error types here. Registration is the only
//! fallible configuration step, and the IPC fast paths distinguish exactly
//! one condition -- "can't make progress right now" -- which the blocking
//! wrappers turn into either a retry or a plain `false` return.

/// An error detected while registering a task, queue, or semaphore before
/// the scheduler starts.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    /// The task's priority is not below the configured priority count.
    PriorityOutOfRange,
    /// The fixed-capacity task table is full.
    TaskTableFull,
    /// The fixed-capacity queue table is full.
    QueueTableFull,
    /// The fixed-capacity semaphore table is full.
    SemaphoreTableFull,
    /// The task's stack is not 8-byte aligned.
    StackMisaligned,
    /// The task's stack can't hold even the initial register frame.
    StackTooSmall,
    /// A queue's backing storage can't hold any data at all: the spare
    /// slot consumes one byte, so at least two are required.
    StorageTooSmall,
    /// A semaphore arrived with more initial units than its ceiling.
    SemaphoreAboveCeiling,
    /// Registration was attempted after the scheduler started; all kernel
    /// objects must exist before boot completes.
    AlreadyStarted,
}

/// Returned by the non-blocking queue and semaphore primitives when the
/// request can't be satisfied at the current fill level.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WouldBlock;
