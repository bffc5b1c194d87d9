// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Application-specific compile-time configuration.
//!
//! The kernel takes a single shape per build; these constants are that
//! shape. They are consts rather than runtime values so the interrupt mask
//! policy and table sizes compile down to immediates. Edit them to fit the
//! application -- the values below match the reference board (an STM32L0
//! part with its timer on LPTIM1 and a spare NVIC line used for the
//! scheduler).

/// Number of task priority levels. Priority 0 is the most important; the
/// idle task occupies `NUM_PRIORITIES - 1`.
pub const NUM_PRIORITIES: usize = 4;

/// Capacity of the task table, including the idle task.
pub const MAX_TASKS: usize = 8;

/// Capacity of the queue table.
pub const MAX_QUEUES: usize = 4;

/// Capacity of the semaphore table.
pub const MAX_SEMAPHORES: usize = 4;

/// Size of the idle task's private stack, in words.
pub const IDLE_STACK_WORDS: usize = 48;

/// NVIC lines the kernel never masks, as a bitmask over interrupts 0..32.
/// Handlers on these lines run even inside kernel critical sections and
/// therefore must not call any kernel API except
/// [`crate::wake_task_realtime`].
pub const REALTIME_IRQS: u32 = 1 << 22;

/// Kernel-serviceable lines demoted below the default band, for sources
/// that should defer to everything else.
pub const LOW_PRIO_IRQS: u32 = (1 << 28) | (1 << 29);

/// NVIC line used to trigger the scheduler. Nothing else may use this
/// line; a spare one works well. The board's vector table must route it to
/// the `ContextSwitch` handler symbol.
pub const YIELD_IRQ: u32 = 31;

/// NVIC line of the board timer that drives the kernel clock. Its handler
/// acknowledges the peripheral and calls [`crate::tick`].
pub const TICK_IRQ: u32 = 13;

/// Hardware priority values for the bands, using the two implemented
/// priority bits of ARMv6-M (0 is the most urgent). The yield and tick
/// sources sit in the SYS band, below every kernel-serviceable device
/// interrupt, so the scheduler never preempts a device handler.
pub const HIGH_IRQ_PRIORITY: u8 = 0;
pub const MID_IRQ_PRIORITY: u8 = 1;
pub const LOW_IRQ_PRIORITY: u8 = 2;
pub const SYS_IRQ_PRIORITY: u8 = 3;

// The scheduler and clock must be maskable or critical sections fall apart.
const _: () = assert!(REALTIME_IRQS & (1 << YIELD_IRQ) == 0);
const _: () = assert!(REALTIME_IRQS & (1 << TICK_IRQ) == 0);
// At least one application level above idle.
const _: () = assert!(NUM_PRIORITIES >= 2);
const _: () = assert!(MAX_TASKS >= 2);
