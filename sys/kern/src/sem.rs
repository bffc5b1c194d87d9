// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Blocking counting-semaphore operations.
//!
//! These share the queue code's blocking protocol wholesale: a semaphore
//! is just a wait channel whose "fill level" is a counter. `wait` blocks
//! while the count is zero; `signal` blocks while the count sits at its
//! ceiling. Both sides release every waiter on success.

use kerncore::{SemIndex, Wait, WaitChannel};

use crate::queue::block_until;

/// Takes one unit from `sem`, blocking within the wait budget while none
/// are available. Returns `true` on success, `false` on timeout.
///
/// Task context only, outside any critical section.
pub fn wait_semaphore(sem: SemIndex, wait: Wait) -> bool {
    block_until(WaitChannel::Semaphore(sem), wait, |k| {
        k.try_wait_semaphore(sem)
    })
}

/// Returns one unit to `sem`, blocking within the wait budget while the
/// count is at its ceiling. Returns `true` on success, `false` on timeout.
///
/// Task context only, outside any critical section.
pub fn signal_semaphore(sem: SemIndex, wait: Wait) -> bool {
    block_until(WaitChannel::Semaphore(sem), wait, |k| {
        k.try_signal_semaphore(sem)
    })
}
