// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Task control blocks and the handles that name kernel objects.

use core::ptr::NonNull;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::time::Ticks;

/// Scheduling priority. Numerically lower values are *more* important; 0 is
/// the most important priority in the system, and the idle task sits at the
/// configured maximum.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(transparent)]
pub struct Priority(pub u8);

impl Priority {
    /// Checks if `self` is strictly more important than `other`.
    ///
    /// Currently, numerically lower priorities are more important.
    pub fn is_more_important_than(self, other: Self) -> bool {
        self.0 < other.0
    }

    /// Checks if `self` is at least as important as `other`. This is the
    /// comparison the scheduler uses when deciding whether a freshly woken
    /// task displaces the one it just elected.
    pub fn is_at_least_as_important_as(self, other: Self) -> bool {
        self.0 <= other.0
    }

    pub(crate) fn index(self) -> usize {
        usize::from(self.0)
    }
}

/// Index of a registered task in the kernel's task table. This doubles as
/// the task's public handle; tasks are never destroyed, so an index stays
/// valid for the life of the system.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TaskIndex(pub(crate) u8);

impl TaskIndex {
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

/// Index of a registered queue in the kernel's queue table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct QueueIndex(pub(crate) u8);

/// Index of a registered semaphore in the kernel's semaphore table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SemIndex(pub(crate) u8);

/// Back-reference from a blocked task to the object it is waiting on. This
/// is a lookup handle only -- clearing it from another actor is how waiters
/// get released -- and never implies ownership.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WaitChannel {
    Queue(QueueIndex),
    Semaphore(SemIndex),
}

bitflags::bitflags! {
    /// Task state bits. A task with no bits set is runnable. `SLEEPING` and
    /// `BLOCKED` may coexist, denoting a blocking call with a timeout.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct TaskFlags: u8 {
        /// Waiting for the kernel clock to reach `wake_at`.
        const SLEEPING = 1 << 0;
        /// Waiting on a queue or semaphore (see `wait_for`).
        const BLOCKED = 1 << 1;
    }
}

/// Internal representation of a task.
///
/// Tasks are allocated by the application (typically as `static`s) and
/// handed to the kernel at registration, which assumes ownership of all list
/// linkage. The fields are private to this crate so the scheduler's
/// invariants -- a task is on exactly one of the runnable and suspended
/// lists, the blocked links agree with `wait_for`, and so on -- can't be
/// disturbed from outside.
#[derive(Debug)]
pub struct Task {
    /// Saved stack pointer while the task is switched out. Opaque to
    /// portable code: only the context-switch handler reads or writes the
    /// memory it points at.
    pub(crate) saved_sp: *mut u32,
    /// Base of the task's private stack region, for bounds and post-mortem
    /// inspection. The kernel itself never dereferences this.
    stack_base: *mut u32,
    /// Length of the stack region in 32-bit words.
    stack_words: usize,
    priority: Priority,
    pub(crate) flags: TaskFlags,
    /// Absolute tick at which a sleeping task should wake. Atomic because a
    /// realtime interrupt may rewrite it while the kernel is mid-schedule;
    /// it is the only task field such an interrupt may touch.
    wake_at: AtomicU32,
    /// What the task is blocked on, if anything.
    pub(crate) wait_for: Option<WaitChannel>,
    // Intrusive list links. The task table itself serves as the global
    // registry; these cover the other memberships.
    pub(crate) next_runnable: Option<TaskIndex>,
    pub(crate) next_suspended: Option<TaskIndex>,
    pub(crate) next_blocked: Option<TaskIndex>,
}

impl Task {
    /// Creates an empty, unregistered task block, suitable for a `static`.
    pub const fn new() -> Self {
        Task {
            saved_sp: core::ptr::null_mut(),
            stack_base: core::ptr::null_mut(),
            stack_words: 0,
            priority: Priority(0),
            flags: TaskFlags::empty(),
            wake_at: AtomicU32::new(0),
            wait_for: None,
            next_runnable: None,
            next_suspended: None,
            next_blocked: None,
        }
    }

    /// Fills in the execution context at registration time: the synthetic
    /// saved stack pointer produced by the architecture layer, the stack
    /// extent, and the priority.
    pub fn initialize(
        &mut self,
        saved_sp: *mut u32,
        stack_base: *mut u32,
        stack_words: usize,
        priority: Priority,
    ) {
        self.saved_sp = saved_sp;
        self.stack_base = stack_base;
        self.stack_words = stack_words;
        self.priority = priority;
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Returns a reference to the task's current state bits, for inspection.
    pub fn flags(&self) -> TaskFlags {
        self.flags
    }

    /// Returns the stack region as (base, length in words), so that layers
    /// above the kernel can add canary or watermark checks. The kernel does
    /// not detect stack overflow itself.
    pub fn stack_extent(&self) -> (*mut u32, usize) {
        (self.stack_base, self.stack_words)
    }

    pub(crate) fn wake_deadline(&self) -> Ticks {
        Ticks::from(self.wake_at.load(Ordering::Relaxed))
    }

    pub(crate) fn set_wake_deadline(&mut self, deadline: Ticks) {
        self.wake_at.store(deadline.into(), Ordering::Relaxed);
    }

    /// Produces the handle a realtime interrupt handler may hold on this
    /// task. Captured once, after registration, in task context.
    pub fn realtime_waker(&self) -> RealtimeWaker {
        RealtimeWaker {
            wake_at: NonNull::from(&self.wake_at),
        }
    }
}

/// A realtime interrupt's one permitted window into the kernel: the address
/// of a single task's atomic wake deadline. Holding one of these does not
/// grant access to any kernel list, which is exactly the point -- realtime
/// handlers run with kernel critical sections still open.
#[derive(Copy, Clone, Debug)]
pub struct RealtimeWaker {
    wake_at: NonNull<AtomicU32>,
}

impl RealtimeWaker {
    /// Rewrites the target task's wake deadline to `now`. If the task is
    /// sleeping, the next scheduling pass will wake it; if not, this has no
    /// effect at all.
    pub fn post(&self, now: Ticks) {
        // Safety: the pointer was derived from a registered task's
        // `wake_at` field, tasks are never deallocated once registered, and
        // the field is atomic, so a store can race kernel code harmlessly.
        unsafe { self.wake_at.as_ref() }.store(now.into(), Ordering::Relaxed);
    }
}

// Safety: the waker only permits atomic stores to a field that is never
// moved after registration.
unsafe impl Send for RealtimeWaker {}
unsafe impl Sync for RealtimeWaker {}
