// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The kernel objects tasks can block on: byte queues and counting
//! semaphores.
//!
//! Both carry a singly linked list of waiting tasks, and both wake *every*
//! waiter on any successful operation rather than distinguishing readers
//! from writers (or waiters from signalers). That is deliberately
//! unsophisticated: woken tasks simply reassess their request on their next
//! pass through the scheduler, and correctness never depends on guessing
//! which side a waiter was on.

use bytering::ByteRing;

use crate::task::TaskIndex;

/// A fixed-capacity byte queue with blocking readers and writers.
///
/// The storage is borrowed for `'static` so a queue can sit in a named
/// `static` next to its buffer. Usable capacity is one less than the storage
/// length (see [`ByteRing`]); transfers move their whole buffer or nothing.
#[derive(Debug)]
pub struct Queue {
    pub(crate) ring: ByteRing<'static>,
    /// Head of the list of tasks currently blocked on this queue.
    pub(crate) blocked: Option<TaskIndex>,
}

impl Queue {
    /// Creates a queue over `storage`, with usable capacity
    /// `storage.len() - 1`. Storage shorter than two bytes can hold nothing
    /// and is rejected when the queue is registered.
    pub fn new(storage: &'static mut [u8]) -> Self {
        Queue {
            ring: ByteRing::new(storage),
            blocked: None,
        }
    }

    /// The largest transfer this queue can ever carry.
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

/// A counting semaphore with the same blocking protocol as [`Queue`]:
/// `wait` blocks while the count is zero, `signal` blocks while the count
/// is at its ceiling.
#[derive(Debug)]
pub struct Semaphore {
    pub(crate) value: u32,
    pub(crate) max: u32,
    /// Head of the list of tasks currently blocked on this semaphore.
    pub(crate) blocked: Option<TaskIndex>,
}

impl Semaphore {
    /// Creates a semaphore with `initial` units available and a ceiling of
    /// `max`. Usable in `static` initializers. An `initial` above the
    /// ceiling is rejected when the semaphore is registered.
    pub const fn new(initial: u32, max: u32) -> Self {
        Semaphore {
            value: initial,
            max,
            blocked: None,
        }
    }

    /// The number of units currently available.
    pub fn value(&self) -> u32 {
        self.value
    }
}
