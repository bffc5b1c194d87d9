// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Blocking byte-queue operations, task and interrupt flavors.
//!
//! A transfer moves exactly the caller's buffer length or nothing at all.
//! The blocking flavors loop under the task-context critical section:
//! attempt, and on failure either give up (deadline passed) or park the
//! task on the queue's blocked list and yield. Waking is deliberately
//! coarse -- any successful operation releases every waiter, and each
//! reassesses its own request on its next pass through here.

use kerncore::{QueueIndex, Wait, WaitChannel, WouldBlock};

use crate::arch;
use crate::startup::{with_kernel, KernelState};
use crate::time::now;

/// Reads exactly `buf.len()` bytes from `queue` into `buf`. Returns `true`
/// on success; `false` if the wait budget ran out first.
///
/// `buf.len()` must be no larger than the queue's capacity (one less than
/// its storage); an oversized request can never succeed and fails
/// immediately rather than blocking forever.
///
/// Task context only, outside any critical section.
pub fn read_queue(queue: QueueIndex, buf: &mut [u8], wait: Wait) -> bool {
    if !fits(queue, buf.len()) {
        return false;
    }
    block_until(WaitChannel::Queue(queue), wait, |k| {
        k.try_read_queue(queue, buf)
    })
}

/// Writes all of `buf` into `queue`. Semantics mirror [`read_queue`].
pub fn write_queue(queue: QueueIndex, buf: &[u8], wait: Wait) -> bool {
    if !fits(queue, buf.len()) {
        return false;
    }
    block_until(WaitChannel::Queue(queue), wait, |k| {
        k.try_write_queue(queue, buf)
    })
}

/// Non-blocking read for kernel-serviceable interrupt handlers: one
/// attempt under the low-level critical section, releasing any blocked
/// tasks on success. Returns whether the transfer happened.
///
/// Never call this from a realtime handler; those lines are unmasked
/// inside critical sections and would race the kernel.
pub fn read_queue_irq(queue: QueueIndex, buf: &mut [u8]) -> bool {
    arch::raw_critical_enter();
    let result = with_kernel(|k| {
        if buf.len() > k.queue(queue).capacity() {
            return Err(WouldBlock);
        }
        k.try_read_queue(queue, buf)
    });
    if let Ok(woke_waiters) = result {
        if woke_waiters {
            arch::pend_switch();
        }
    }
    arch::raw_critical_exit();
    result.is_ok()
}

/// Non-blocking write for kernel-serviceable interrupt handlers; see
/// [`read_queue_irq`].
pub fn write_queue_irq(queue: QueueIndex, buf: &[u8]) -> bool {
    arch::raw_critical_enter();
    let result = with_kernel(|k| {
        if buf.len() > k.queue(queue).capacity() {
            return Err(WouldBlock);
        }
        k.try_write_queue(queue, buf)
    });
    if let Ok(woke_waiters) = result {
        if woke_waiters {
            arch::pend_switch();
        }
    }
    arch::raw_critical_exit();
    result.is_ok()
}

/// The shared blocking protocol: retry `attempt` until it succeeds or the
/// wait budget is spent, parking the caller on `ch` in between. `attempt`
/// returns whether it released any waiters, in which case we yield so they
/// can reconsider before we move on.
pub(crate) fn block_until(
    ch: WaitChannel,
    wait: Wait,
    mut attempt: impl FnMut(&mut KernelState) -> Result<bool, WouldBlock>,
) -> bool {
    let deadline = wait.deadline_from(now());
    loop {
        arch::enter_critical();
        match with_kernel(&mut attempt) {
            Ok(woke_waiters) => {
                if woke_waiters {
                    arch::pend_switch();
                }
                arch::exit_critical();
                return true;
            }
            Err(WouldBlock) => {
                let give_up = match wait {
                    Wait::None => true,
                    Wait::Forever => false,
                    Wait::Ticks(_) => {
                        deadline.is_some_and(|d| d.is_due(now()))
                    }
                };
                if give_up {
                    arch::exit_critical();
                    return false;
                }
                with_kernel(|k| k.block_current_on(ch, deadline));
                arch::pend_switch();
                // The switch away lands here, as the mask is restored; by
                // the time exit returns we've been elected again and it's
                // time to reassess.
                arch::exit_critical();
            }
        }
    }
}

/// Checks a transfer size against a queue's capacity, outside the retry
/// loop since neither ever changes.
fn fits(queue: QueueIndex, amount: usize) -> bool {
    arch::enter_critical();
    let capacity = with_kernel(|k| k.queue(queue).capacity());
    arch::exit_critical();
    debug_assert!(amount <= capacity, "transfer can never fit this queue");
    amount <= capacity
}
