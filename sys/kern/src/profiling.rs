// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel online profiling support.
//!
//! This is intended to help measure the timing of context switches, tick
//! handling, and the like, as an aid to debugging or optimization work.
//!
//! Because the kernel is SoC-independent, this module does not assume any
//! particular way of getting profiling information out. Instead, a target
//! that wants profiling populates an [`EventsTable`] and hands it to
//! [`configure_events_table`] from its startup routine. A typical
//! implementation sets and clears GPIOs that an external logic analyzer
//! watches; whatever you do, keep the hooks fast and mind the probe
//! effect.

use core::sync::atomic::{AtomicPtr, Ordering};

/// Hooks provided by board setup code if it wants kernel profiling.
///
/// If you provide an `EventsTable`, you provide every hook; stub out an
/// event you don't care about with `|| ()`. That costs one indirect call
/// on the stubbed event but saves a null check on all the others.
pub struct EventsTable {
    /// Called on entry to the context-switch handler's scheduling pass.
    pub switch_enter: fn(),
    /// Called on exit from the scheduling pass, before the new context is
    /// restored.
    pub switch_exit: fn(),
    /// Called on entry to the kernel's tick handler.
    pub tick_isr_enter: fn(),
    /// Called on exit from the kernel's tick handler.
    pub tick_isr_exit: fn(),
    /// Called whenever the running task changes, with the index of the
    /// task about to run.
    pub context_switch: fn(usize),
}

/// Supplies the kernel with an events table. Normally called once, from
/// board setup, though nothing breaks if you swap tables later.
pub fn configure_events_table(table: &'static EventsTable) {
    EVENTS_TABLE.store(table as *const _ as *mut _, Ordering::Relaxed);
}

/// Written by `configure_events_table`, read at every event site. Null
/// means profiling is off. Relaxed ordering throughout: written once at
/// startup and read many times, and memory barriers have non-zero cost.
static EVENTS_TABLE: AtomicPtr<EventsTable> =
    AtomicPtr::new(core::ptr::null_mut());

fn table() -> Option<&'static EventsTable> {
    let p = EVENTS_TABLE.load(Ordering::Relaxed);
    if p.is_null() {
        None
    } else {
        // We only write this pointer from a valid `&'static`, and we're
        // handing out a shared reference, so this should be ok...
        unsafe { Some(&*p) }
    }
}

// The switch events only have call sites in the real handler, which the
// host build replaces with stubs.
#[cfg_attr(not(target_arch = "arm"), allow(dead_code))]
pub(crate) fn event_switch_enter() {
    if let Some(t) = table() {
        (t.switch_enter)()
    }
}

#[cfg_attr(not(target_arch = "arm"), allow(dead_code))]
pub(crate) fn event_switch_exit() {
    if let Some(t) = table() {
        (t.switch_exit)()
    }
}

pub(crate) fn event_tick_isr_enter() {
    if let Some(t) = table() {
        (t.tick_isr_enter)()
    }
}

pub(crate) fn event_tick_isr_exit() {
    if let Some(t) = table() {
        (t.tick_isr_exit)()
    }
}

#[cfg_attr(not(target_arch = "arm"), allow(dead_code))]
pub(crate) fn event_context_switch(index: usize) {
    if let Some(t) = table() {
        (t.context_switch)(index)
    }
}
