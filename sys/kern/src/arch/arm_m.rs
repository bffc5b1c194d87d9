// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Architecture support for ARMv6-M, with ARMv7-M accepted by the same
//! paths (soft-float ABI assumed; FP register context is not preserved).
//!
//! # The two-level interrupt regime, on hardware
//!
//! The kernel partitions NVIC lines into bands by hardware priority:
//! realtime sources at the most urgent level, ordinary kernel-serviceable
//! devices in the middle, and the scheduler trigger plus the tick timer at
//! the least urgent level so they can never preempt a device handler.
//! Masking for critical sections is done with the NVIC enable registers
//! rather than PRIMASK, because that's the only way to keep the realtime
//! band deliverable while everything else is held off: the enter sequence
//! reads `ICER[0]` (which reads back the currently-enabled set), writes a
//! mask that disables everything except the realtime lines, and stashes
//! what was enabled for the matching exit to restore. The read-modify-write
//! is wrapped in a very short PRIMASK disable so it can't be torn.
//!
//! # Notes on the context switch
//!
//! On any interrupt, the processor stacks a small subset of machine state
//! (r0-r3, r12, lr, pc, xPSR) on the interrupted task's process stack and
//! then calls our handler, which is a normal Rust function following the
//! normal calling convention. That's fine as long as the code you return to
//! is the same code that called you -- but in a context switch, it isn't.
//!
//! So the scheduler trigger gets a hand-written handler: it pushes the
//! remaining registers (the "software frame", r4-r11) below the hardware
//! frame, hands the resulting stack pointer to `switch_entry`, and restores
//! whichever stack pointer comes back. Switching tasks is thus equivalent
//! to swapping the process stack pointer. Everything else -- `yield`, the
//! tick handler, queue operations from interrupts -- just pends that
//! trigger and lets it run when the mask allows, which is also what
//! guarantees a yield requested inside a critical section is delivered at
//! the exit and not in the middle.
//!
//! The trigger is an ordinary NVIC line ([`crate::app::YIELD_IRQ`]) rather
//! than PendSV, so that it participates in the ICER/ISER mask policy like
//! every other kernel interrupt. The board points its vector at the
//! `ContextSwitch` symbol defined here.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::app;
use crate::startup::with_kernel;

/// Log things from kernel context. This macro is made visible to the rest
/// of the kernel by a chain of `#[macro_use]` attributes, but its
/// implementation is very architecture-specific at the moment.
///
/// There are two ways to log: via semihosting (the `klog-semihosting`
/// feature) or via the Instrumentation Trace Macrocell (the `klog-itm`
/// feature, ARMv7-M and up -- M0-class parts have no ITM). With neither
/// feature enabled, `klog!` compiles out entirely, which is the default.
#[cfg(not(any(feature = "klog-semihosting", feature = "klog-itm")))]
macro_rules! klog {
    ($s:expr) => {};
    ($s:expr, $($tt:tt)*) => {};
}

#[cfg(feature = "klog-itm")]
macro_rules! klog {
    ($s:expr) => {
        #[allow(unused_unsafe)]
        unsafe {
            let stim = &mut (*cortex_m::peripheral::ITM::PTR).stim[0];
            cortex_m::iprintln!(stim, $s);
        }
    };
    ($s:expr, $($tt:tt)*) => {
        #[allow(unused_unsafe)]
        unsafe {
            let stim = &mut (*cortex_m::peripheral::ITM::PTR).stim[0];
            cortex_m::iprintln!(stim, $s, $($tt)*);
        }
    };
}

#[cfg(feature = "klog-semihosting")]
macro_rules! klog {
    ($s:expr) => { let _ = cortex_m_semihosting::hprintln!($s); };
    ($s:expr, $($tt:tt)*) => {
        let _ = cortex_m_semihosting::hprintln!($s, $($tt)*);
    };
}

macro_rules! uassert {
    ($cond:expr) => {
        if !$cond {
            panic!("Assertion failed!");
        }
    };
}

/// NVIC enable mask saved by the outermost critical-section entry, with
/// the realtime bits already cleared. Lifecycle: written at each outermost
/// enter, consumed by the matching exit.
static ENABLED_IRQS: AtomicU32 = AtomicU32::new(0);

/// Task-context critical-section nesting depth.
///
/// Plain load/store is deliberate twice over: ARMv6-M has no fetch-and-add,
/// and the counter is only touched from task context (never from handlers),
/// so there is exactly one mutator at a time.
static CRIT_NESTING: AtomicU32 = AtomicU32::new(0);

/// Low-level critical section entry: masks every kernel-serviceable and
/// system interrupt, leaving the realtime band deliverable. NOT nestable --
/// a second call would overwrite the saved mask. Task code wants
/// [`enter_critical`] instead; this flavor is for the switch handler and
/// IRQ-context queue operations.
#[no_mangle]
pub extern "C" fn raw_critical_enter() {
    let nvic = unsafe { &*cortex_m::peripheral::NVIC::PTR };
    // All interrupts go away for three instructions so the ICER
    // read-modify-write can't be torn by a realtime arrival.
    cortex_m::interrupt::disable();
    let enabled = nvic.icer[0].read();
    unsafe { nvic.icer[0].write(!app::REALTIME_IRQS) };
    unsafe { cortex_m::interrupt::enable() };
    ENABLED_IRQS.store(enabled & !app::REALTIME_IRQS, Ordering::Relaxed);
}

/// Low-level critical section exit: re-enables whatever the matching
/// [`raw_critical_enter`] disabled. Any scheduler pend that accumulated in
/// the meantime is delivered on the way out of this write.
#[no_mangle]
pub extern "C" fn raw_critical_exit() {
    let nvic = unsafe { &*cortex_m::peripheral::NVIC::PTR };
    unsafe { nvic.iser[0].write(ENABLED_IRQS.load(Ordering::Relaxed)) };
}

/// Enters the task-context critical section. Freely nestable; only the
/// outermost call touches the hardware. While held, no kernel-serviceable
/// interrupt can run -- but realtime interrupts still can, which is why
/// they're forbidden from touching kernel data.
pub fn enter_critical() {
    if CRIT_NESTING.load(Ordering::Relaxed) == 0 {
        raw_critical_enter();
    }
    let n = CRIT_NESTING.load(Ordering::Relaxed);
    CRIT_NESTING.store(n + 1, Ordering::Relaxed);
}

/// Exits the task-context critical section; the outermost call restores
/// the interrupt mask (and with it, any pended context switch).
pub fn exit_critical() {
    let n = CRIT_NESTING.load(Ordering::Relaxed);
    uassert!(n != 0);
    CRIT_NESTING.store(n - 1, Ordering::Relaxed);
    if n == 1 {
        raw_critical_exit();
    }
}

/// Pends the scheduler interrupt. The switch runs once the current
/// interrupt (and any critical section) unwinds.
pub fn pend_switch() {
    let nvic = unsafe { &*cortex_m::peripheral::NVIC::PTR };
    unsafe { nvic.ispr[0].write(1 << app::YIELD_IRQ) };
}

/// Fill pattern for fresh stacks, visible in a post-mortem to show how
/// deep a task has ever gotten.
pub const STACK_FILL: u32 = 0xdead_beef;

/// Hardware frame (r0-r3, r12, lr, pc, xPSR) plus software frame (r4-r11).
const FRAME_WORDS: usize = 16;

/// The smallest stack that can hold the initial register frame.
pub const MIN_STACK_WORDS: usize = FRAME_WORDS;

/// Initially we just set the Thumb mode bit, the minimum required.
const INITIAL_PSR: u32 = 1 << 24;

/// EXC_RETURN value selecting "thread mode, process stack, no FP state".
const EXC_RETURN_CONST: u32 = 0xFFFF_FFFD;

/// Sets up `stack` as if `entry` had just been switched out by the
/// `ContextSwitch` handler, so the first restore of this context executes
/// `entry` on a clean frame. Returns the synthetic saved stack pointer.
///
/// The caller has validated alignment and size. If `entry` ever returns it
/// lands in [`task_exit_trap`].
pub fn initialize_task_stack(entry: fn(), stack: &mut [u32]) -> *mut u32 {
    let n = stack.len();
    uassert!(n >= MIN_STACK_WORDS);
    for word in stack.iter_mut() {
        *word = STACK_FILL;
    }
    stack[n - 1] = INITIAL_PSR;
    stack[n - 2] = entry as usize as u32;
    stack[n - 3] = task_exit_trap as usize as u32;
    &mut stack[n - FRAME_WORDS] as *mut u32
}

/// Terminal trap for a task body that returns. This is a fatal bug in that
/// task, not something to recover: the task spins here forever while the
/// rest of the system carries on scheduling around it.
extern "C" fn task_exit_trap() {
    loop {
        cortex_m::asm::nop();
    }
}

// Handler for the scheduler interrupt. The board's vector table routes
// `app::YIELD_IRQ` here.
//
// On entry the hardware has already pushed the caller-saved half of the
// register file onto the process stack. We push the callee-saved half below
// it, bracket the scheduling pass with the low-level critical section
// (other kernel-serviceable interrupts outrank us and would otherwise race
// the list walks), and resume whatever stack pointer `switch_entry` hands
// back.
cfg_if::cfg_if! {
    if #[cfg(armv6m)] {
        core::arch::global_asm!{"
            .section .text.ContextSwitch
            .globl ContextSwitch
            .type ContextSwitch,function
            ContextSwitch:
                @ Push the software frame below the hardware frame. v6-M
                @ store-multiple only covers low registers, so the high ones
                @ go through r4-r7 in a second pass.
                mrs r0, psp
                subs r0, r0, #16
                stmia r0!, {{r4-r7}}
                mov r4, r8
                mov r5, r9
                mov r6, r10
                mov r7, r11
                subs r0, r0, #32
                stmia r0!, {{r4-r7}}
                subs r0, r0, #16
                @ Kernel lists are about to be walked; mask everything but
                @ the realtime band. r4 keeps the sp across the calls.
                mov r4, r0
                bl raw_critical_enter
                mov r0, r4
                bl switch_entry
                mov r4, r0
                bl raw_critical_exit
                mov r0, r4
                @ Restore the incoming task's software frame, high half
                @ first (it sits lowest).
                ldmia r0!, {{r4-r7}}
                mov r8, r4
                mov r9, r5
                mov r10, r6
                mov r11, r7
                ldmia r0!, {{r4-r7}}
                msr psp, r0
                @ Return to thread mode on the process stack.
                ldr r0, ={exc_return}
                bx r0
            ",
            exc_return = const EXC_RETURN_CONST,
        }
    } else if #[cfg(any(armv7m, armv8m))] {
        core::arch::global_asm!{"
            .section .text.ContextSwitch
            .globl ContextSwitch
            .type ContextSwitch,function
            ContextSwitch:
                mrs r0, psp
                stmdb r0!, {{r4-r11}}
                mov r4, r0
                bl raw_critical_enter
                mov r0, r4
                bl switch_entry
                mov r4, r0
                bl raw_critical_exit
                mov r0, r4
                ldmia r0!, {{r4-r11}}
                msr psp, r0
                ldr r0, ={exc_return}
                bx r0
            ",
            exc_return = const EXC_RETURN_CONST,
        }
    } else {
        compile_error!("missing ContextSwitch impl for ARM profile");
    }
}

/// The Rust side of the context switch, called from the handler between
/// the save and restore halves with the outgoing task's laden stack
/// pointer. Runs under the low-level critical section.
#[no_mangle]
unsafe extern "C" fn switch_entry(sp: *mut u32) -> *mut u32 {
    crate::profiling::event_switch_enter();
    let new_sp = with_kernel(|k| {
        k.save_stack_pointer(sp);
        k.reschedule(crate::time::now());
        crate::profiling::event_context_switch(k.current().index());
        k.resume_stack_pointer()
    });
    crate::profiling::event_switch_exit();
    new_sp
}

/// Programs every NVIC line's priority from the configured bands and
/// enables the yield and tick interrupts. Runs with interrupts globally
/// disabled, before the first task.
pub fn configure_interrupts() {
    let nvic = unsafe { &*cortex_m::peripheral::NVIC::PTR };

    for irq in 0..32u32 {
        let band = if irq == app::YIELD_IRQ || irq == app::TICK_IRQ {
            app::SYS_IRQ_PRIORITY
        } else if app::REALTIME_IRQS & (1 << irq) != 0 {
            app::HIGH_IRQ_PRIORITY
        } else if app::LOW_PRIO_IRQS & (1 << irq) != 0 {
            app::LOW_IRQ_PRIORITY
        } else {
            app::MID_IRQ_PRIORITY
        };

        cfg_if::cfg_if! {
            if #[cfg(armv6m)] {
                // On ARMv6 there are 8 IPR registers, each holding 4
                // interrupt priorities in the top 2 bits of each byte.
                // Do not believe what the docs for the `cortex_m` crate
                // suggest -- the IPR registers on ARMv6-M are 32 bits wide.
                let reg = (irq / 4) as usize;
                let shift = (irq % 4) * 8 + 6;
                let v = nvic.ipr[reg].read() & !(0b11 << shift);
                unsafe {
                    nvic.ipr[reg].write(v | u32::from(band) << shift);
                }
            } else if #[cfg(any(armv7m, armv8m))] {
                // IPR registers on ARMv7/8 are modeled as `u8` by
                // `cortex_m`, with the priority in the top bits.
                unsafe { nvic.ipr[irq as usize].write(band << 6) };
            } else {
                compile_error!("missing IRQ priorities for ARM profile");
            }
        }
    }

    unsafe {
        nvic.iser[0].write((1 << app::YIELD_IRQ) | (1 << app::TICK_IRQ));
    }
}

/// Switches the CPU onto the idle task's stack in thread/process-stack
/// mode and enters the idle loop. The already-pended scheduler interrupt
/// then performs the first real context switch the moment the idle task
/// enables interrupts; from the CPU's perspective, idle was always
/// running. Never returns.
pub fn start_idle(stack_top: *mut u32) -> ! {
    unsafe {
        core::arch::asm!("
            @ Select the process stack for thread mode, then load it.
            movs r1, #2
            msr CONTROL, r1
            isb
            mov sp, r0
            bx r2
            ",
            in("r0") stack_top,
            in("r2") crate::startup::idle_main as fn() as usize,
            options(noreturn),
        )
    }
}

/// Masks interrupts at the core (PRIMASK). Startup only.
pub fn disable_interrupts() {
    cortex_m::interrupt::disable();
}

/// Unmasks interrupts at the core.
///
/// # Safety
///
/// Caller asserts that kernel data is in a consistent state and that being
/// preempted is acceptable.
pub unsafe fn enable_interrupts() {
    unsafe { cortex_m::interrupt::enable() }
}

/// Architectural wait-for-interrupt, used by the idle task when no
/// low-power hook is configured.
pub fn wait_for_interrupt() {
    cortex_m::asm::wfi();
}
