// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The kernel clock, timed sleeps, and the realtime wake hook.

use core::sync::atomic::{AtomicU32, Ordering};

use kerncore::{RealtimeWaker, TaskIndex, Ticks};

use crate::arch;
use crate::profiling;
use crate::startup::with_kernel;

/// The kernel clock, in ticks. Written only by the tick handler; the pair
/// of plain load/store below is fine (and is all ARMv6-M offers anyway).
static TICKS: AtomicU32 = AtomicU32::new(0);

/// Reads the kernel clock. The counter wraps; hold on to [`Ticks`] values
/// and let their arithmetic deal with it rather than comparing raw
/// numbers.
pub fn now() -> Ticks {
    Ticks::from(TICKS.load(Ordering::Relaxed))
}

/// Advances the kernel clock by one tick and pends the scheduler if the
/// running task has a runnable peer or some sleeper has come due -- when
/// neither holds, a tick costs one list scan and no context switch.
///
/// Call this from the board's timer interrupt handler, after acknowledging
/// the peripheral. That interrupt must be the line named by
/// [`crate::app::TICK_IRQ`] so it sits in the SYS priority band.
pub fn tick() {
    profiling::event_tick_isr_enter();
    let now = Ticks::from(TICKS.load(Ordering::Relaxed).wrapping_add(1));
    TICKS.store(now.into(), Ordering::Relaxed);

    // The scan must not race a queue operation from a device interrupt,
    // which outranks this handler.
    arch::raw_critical_enter();
    let preempt = with_kernel(|k| k.needs_preempt(now));
    arch::raw_critical_exit();

    if preempt {
        arch::pend_switch();
    }
    profiling::event_tick_isr_exit();
}

/// Blocks the calling task until the kernel clock reaches `deadline`. A
/// deadline at or before the current tick yields and comes straight back.
///
/// Task context only; never from an interrupt handler.
pub fn sleep_until(deadline: Ticks) {
    arch::enter_critical();
    with_kernel(|k| k.sleep_current_until(deadline));
    arch::pend_switch();
    // The switch away happens as the critical section ends; we return
    // here once the deadline has passed (or a realtime wake moved it).
    arch::exit_critical();
}

/// Blocks the calling task for `ticks_to_sleep` ticks from now.
pub fn sleep(ticks_to_sleep: u32) {
    sleep_until(now().offset(ticks_to_sleep));
}

/// Captures the handle a realtime interrupt handler may use to wake
/// `task`. Call from task context after registration, and hand the result
/// to the handler through a `static`.
pub fn realtime_waker(task: TaskIndex) -> RealtimeWaker {
    arch::enter_critical();
    let waker = with_kernel(|k| k.task(task).realtime_waker());
    arch::exit_critical();
    waker
}

/// Wakes a (presumably sleeping) task from a REALTIME interrupt handler:
/// rewrites the task's wake deadline to the current tick and pends the
/// scheduler. If the target isn't sleeping, the only effect is the pended
/// scheduling pass -- nothing is corrupted.
///
/// This is the sole kernel call permitted from realtime context, which
/// runs even inside kernel critical sections and must therefore never
/// touch the kernel's lists.
pub fn wake_task_realtime(waker: RealtimeWaker) {
    waker.post(now());
    arch::pend_switch();
}
