// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel startup and object registration.
//!
//! Everything the kernel will ever schedule is registered here, before
//! [`start_kernel`] runs; after that the tables are closed. The kernel
//! state itself is a singleton, reached through [`with_kernel`] under the
//! interrupt-mask discipline described there.

use core::cell::UnsafeCell;
use core::ptr::addr_of_mut;
use core::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use kerncore::{
    ConfigError, Priority, Queue, QueueIndex, SemIndex, Semaphore, Task,
    TaskIndex,
};

use crate::app;
use crate::arch;

/// The kernel, shaped by this application's configuration.
pub type KernelState = kerncore::Kernel<
    { app::MAX_TASKS },
    { app::MAX_QUEUES },
    { app::MAX_SEMAPHORES },
    { app::NUM_PRIORITIES },
>;

struct KernelCell(UnsafeCell<KernelState>);

// Safety: aliasing on the singleton is prevented by the interrupt-mask
// discipline documented on `with_kernel`, not by a lock.
unsafe impl Sync for KernelCell {}

static KERNEL: KernelCell = KernelCell(UnsafeCell::new(KernelState::new()));

/// Flipped once by `start_kernel`; registration is refused afterwards.
static STARTED: AtomicBool = AtomicBool::new(false);

/// Runs `body` against the kernel singleton.
///
/// # Caller contract
///
/// No kernel-serviceable interrupt may be able to preempt the caller: hold
/// the critical section, be the switch or tick handler (which take the
/// low-level mask themselves), or run before `start_kernel`. Realtime
/// handlers must never call this -- their whole interface is
/// [`kerncore::RealtimeWaker`]. This discipline is what stands in for
/// `&mut` exclusivity on the singleton, so getting it wrong is immediately
/// undefined behavior, not just a race.
pub(crate) fn with_kernel<R>(body: impl FnOnce(&mut KernelState) -> R) -> R {
    // Safety: see above.
    body(unsafe { &mut *KERNEL.0.get() })
}

/// A task stack region with the 8-byte alignment the hardware requires.
/// Declare one as a `static` next to its task.
#[repr(C, align(8))]
pub struct Stack<const WORDS: usize>(pub [u32; WORDS]);

impl<const WORDS: usize> Stack<WORDS> {
    pub const fn new() -> Self {
        Self([0; WORDS])
    }
}

impl<const WORDS: usize> Default for Stack<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

/// Registers a task that will run `entry` on `stack` at `priority`, making
/// it runnable immediately. Priority 0 is the most important; the least
/// important level belongs to the kernel's idle task.
///
/// `entry` is expected to loop forever. If it returns, the task lands in a
/// terminal trap and never runs again, but the rest of the system carries
/// on.
///
/// Fails if the stack is not 8-byte aligned or is too small for the
/// initial register frame, if the priority is out of range, if the task
/// table is full, or if the scheduler has already started.
pub fn add_task(
    entry: fn(),
    task: &'static mut Task,
    stack: &'static mut [u32],
    priority: Priority,
) -> Result<TaskIndex, ConfigError> {
    if STARTED.load(Ordering::Relaxed) {
        return Err(ConfigError::AlreadyStarted);
    }
    if stack.as_ptr() as usize & 0x7 != 0 {
        return Err(ConfigError::StackMisaligned);
    }
    if stack.len() < arch::MIN_STACK_WORDS {
        return Err(ConfigError::StackTooSmall);
    }
    let stack_base = stack.as_mut_ptr();
    let stack_words = stack.len();
    let sp = arch::initialize_task_stack(entry, stack);
    task.initialize(sp, stack_base, stack_words, priority);
    let index = with_kernel(|k| k.add_task(task))?;
    klog!("kern: task {} registered at priority {}", index.index(), priority.0);
    Ok(index)
}

/// Registers a queue. The returned index is the handle every queue
/// operation takes.
///
/// Fails if the queue's storage is too short to hold any data, if the
/// queue table is full, or if the scheduler has already started.
pub fn add_queue(queue: &'static mut Queue) -> Result<QueueIndex, ConfigError> {
    if STARTED.load(Ordering::Relaxed) {
        return Err(ConfigError::AlreadyStarted);
    }
    with_kernel(|k| k.add_queue(queue))
}

/// Registers a semaphore.
///
/// Fails if the semaphore's initial count exceeds its ceiling, if the
/// semaphore table is full, or if the scheduler has already started.
pub fn add_semaphore(
    sem: &'static mut Semaphore,
) -> Result<SemIndex, ConfigError> {
    if STARTED.load(Ordering::Relaxed) {
        return Err(ConfigError::AlreadyStarted);
    }
    with_kernel(|k| k.add_semaphore(sem))
}

/// Board-supplied power management hooks.
///
/// If you provide a `PowerHooks`, you provide every hook; stub an entry
/// with `|| ()` if you don't want it.
pub struct PowerHooks {
    /// Called by the idle task instead of a plain wait-for-interrupt. May
    /// take the device into as deep a sleep mode as it likes, but must
    /// restore the system clock before returning.
    pub low_power_idle: fn(),
}

/// Supplies the kernel with power hooks. Normally called once, from board
/// setup, before `start_kernel`.
pub fn configure_power_hooks(hooks: &'static PowerHooks) {
    POWER_HOOKS.store(hooks as *const _ as *mut _, Ordering::Relaxed);
}

/// Written by `configure_power_hooks`, read by the idle loop. Null means
/// no hooks were provided. Relaxed ordering throughout: written once at
/// startup, read many times.
static POWER_HOOKS: AtomicPtr<PowerHooks> =
    AtomicPtr::new(core::ptr::null_mut());

fn power_hooks() -> Option<&'static PowerHooks> {
    let p = POWER_HOOKS.load(Ordering::Relaxed);
    if p.is_null() {
        None
    } else {
        // Safety: only ever written from a valid `&'static`.
        unsafe { Some(&*p) }
    }
}

/// The idle task is the kernel's own: always runnable at the least
/// important priority, so the scheduler always has someone to elect and
/// never busy-waits for work.
static mut IDLE_TASK: Task = Task::new();
static mut IDLE_STACK: Stack<{ app::IDLE_STACK_WORDS }> = Stack::new();

/// Body of the idle task: hand the CPU away, then nap until something
/// happens.
pub(crate) fn idle_main() {
    // Boot left interrupts masked; from here on the world may preempt us.
    // The pended scheduler interrupt fires right now and performs the
    // first context switch away from this stack.
    unsafe { arch::enable_interrupts() };
    loop {
        crate::yield_now();
        match power_hooks() {
            Some(hooks) => (hooks.low_power_idle)(),
            None => arch::wait_for_interrupt(),
        }
    }
}

/// Starts the scheduler and never returns.
///
/// Masks interrupts, registers the idle task, programs the NVIC priority
/// bands, enables the yield and tick interrupts, pends the first
/// scheduling pass, and turns the boot path into the idle task by jumping
/// onto its stack in thread/process-stack mode. Registration is closed
/// from here on.
///
/// The board must have its timer ready to start delivering ticks, and its
/// vector table must route [`app::YIELD_IRQ`] to the `ContextSwitch`
/// handler.
///
/// # Safety
///
/// Call exactly once per boot, from the reset path, after all tasks,
/// queues, and semaphores are registered.
pub unsafe fn start_kernel() -> ! {
    arch::disable_interrupts();
    klog!("kern: starting");

    // Safety: the reset path runs once, so these two statics have no other
    // live references; both are handed to the kernel for good.
    let idle_task: &'static mut Task = unsafe { &mut *addr_of_mut!(IDLE_TASK) };
    let idle_stack: &'static mut [u32] =
        unsafe { &mut (*addr_of_mut!(IDLE_STACK)).0 };

    let lowest = Priority((app::NUM_PRIORITIES - 1) as u8);
    let Ok(idle) = add_task(idle_main, idle_task, idle_stack, lowest) else {
        panic!("idle task registration failed");
    };
    // The CPU is about to be running idle's (empty) stack directly, not
    // the synthetic frame add_task built: declare idle current so the
    // first switch saves its context in the right place.
    with_kernel(|k| k.set_current(idle));
    STARTED.store(true, Ordering::Relaxed);

    arch::configure_interrupts();
    arch::pend_switch();

    let stack_top = unsafe {
        (addr_of_mut!(IDLE_STACK) as *mut u32).add(app::IDLE_STACK_WORDS)
    };
    arch::start_idle(stack_top)
}
