// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The kernel proper: object registries, the scheduler's lists, and the
//! blocking protocol.
//!
//! # Structure
//!
//! All kernel state lives in one [`Kernel`] value, parameterized by the
//! table capacities and the number of priority levels. Tasks, queues, and
//! semaphores are allocated by the application and registered before the
//! scheduler starts; the kernel owns every list link from then on. List
//! membership is by index -- each task carries `Option<TaskIndex>` links for
//! its priority's runnable list, the single suspended list, and at most one
//! wait channel's blocked list -- so there is no pointer graph to corrupt
//! and the whole structure can be exercised on a host.
//!
//! # Concurrency contract
//!
//! Nothing in this crate takes a lock. Callers -- the `kern` crate -- must
//! guarantee that every `&mut Kernel` method runs with kernel-serviceable
//! interrupts masked (the critical section, the switch handler, or the time
//! before the scheduler starts). Realtime interrupts stay unmasked
//! throughout and are therefore not allowed to touch any of this state;
//! their entire interface is [`crate::task::RealtimeWaker`].

use crate::err::{ConfigError, WouldBlock};
use crate::queue::{Queue, Semaphore};
use crate::task::{
    Priority, QueueIndex, SemIndex, Task, TaskFlags, TaskIndex, WaitChannel,
};
use crate::time::Ticks;

/// Kernel state: registries, per-priority runnable lists, the suspended
/// list, and the running task.
///
/// Type parameters are the compile-time configuration: `NT` task slots
/// (including the idle task), `NQ` queue slots, `NS` semaphore slots, and
/// `NP` priority levels (0 is most important; the idle task occupies
/// `NP - 1`).
pub struct Kernel<
    const NT: usize,
    const NQ: usize,
    const NS: usize,
    const NP: usize,
> {
    tasks: [Option<&'static mut Task>; NT],
    queues: [Option<&'static mut Queue>; NQ],
    sems: [Option<&'static mut Semaphore>; NS],
    /// Head of the runnable list for each priority level. The running task
    /// is always at the head of its level's list.
    runnable: [Option<TaskIndex>; NP],
    /// Head of the single list of sleeping and blocked tasks.
    suspended: Option<TaskIndex>,
    current: TaskIndex,
}

impl<const NT: usize, const NQ: usize, const NS: usize, const NP: usize>
    Kernel<NT, NQ, NS, NP>
{
    /// Creates an empty kernel, suitable for a `static`.
    pub const fn new() -> Self {
        const NO_TASK: Option<&'static mut Task> = None;
        const NO_QUEUE: Option<&'static mut Queue> = None;
        const NO_SEM: Option<&'static mut Semaphore> = None;
        const NO_LINK: Option<TaskIndex> = None;
        Kernel {
            tasks: [NO_TASK; NT],
            queues: [NO_QUEUE; NQ],
            sems: [NO_SEM; NS],
            runnable: [NO_LINK; NP],
            suspended: None,
            current: TaskIndex(0),
        }
    }

    /// Registers `task`, which must already have its context initialized,
    /// making it runnable at the head of its priority's list.
    pub fn add_task(
        &mut self,
        task: &'static mut Task,
    ) -> Result<TaskIndex, ConfigError> {
        let priority = task.priority();
        if priority.index() >= NP {
            return Err(ConfigError::PriorityOutOfRange);
        }
        let slot = self
            .tasks
            .iter()
            .position(|s| s.is_none())
            .ok_or(ConfigError::TaskTableFull)?;
        let ti = TaskIndex(slot as u8);
        task.flags = TaskFlags::empty();
        task.next_runnable = self.runnable[priority.index()];
        self.tasks[slot] = Some(task);
        self.runnable[priority.index()] = Some(ti);
        Ok(ti)
    }

    /// Registers a queue. The spare-slot convention needs at least two
    /// bytes of backing to store anything, so shorter storage is refused
    /// here rather than left to block every transfer forever.
    pub fn add_queue(
        &mut self,
        queue: &'static mut Queue,
    ) -> Result<QueueIndex, ConfigError> {
        if queue.capacity() == 0 {
            return Err(ConfigError::StorageTooSmall);
        }
        let slot = self
            .queues
            .iter()
            .position(|s| s.is_none())
            .ok_or(ConfigError::QueueTableFull)?;
        self.queues[slot] = Some(queue);
        Ok(QueueIndex(slot as u8))
    }

    /// Registers a semaphore, refusing one whose count already sits above
    /// its ceiling.
    pub fn add_semaphore(
        &mut self,
        sem: &'static mut Semaphore,
    ) -> Result<SemIndex, ConfigError> {
        if sem.value > sem.max {
            return Err(ConfigError::SemaphoreAboveCeiling);
        }
        let slot = self
            .sems
            .iter()
            .position(|s| s.is_none())
            .ok_or(ConfigError::SemaphoreTableFull)?;
        self.sems[slot] = Some(sem);
        Ok(SemIndex(slot as u8))
    }

    /// Index of the task that owns the CPU (or is about to, between an
    /// election and the context restore).
    pub fn current(&self) -> TaskIndex {
        self.current
    }

    /// Forces the running-task pointer. Startup uses this once, to declare
    /// that the CPU is executing on the idle task's stack before the first
    /// real election happens.
    pub fn set_current(&mut self, ti: TaskIndex) {
        self.current = ti;
    }

    /// Shared view of a task, for inspection.
    pub fn task(&self, ti: TaskIndex) -> &Task {
        self.tasks[ti.index()].as_deref().unwrap()
    }

    /// Shared view of a queue.
    pub fn queue(&self, qi: QueueIndex) -> &Queue {
        self.queues[usize::from(qi.0)].as_deref().unwrap()
    }

    /// Shared view of a semaphore.
    pub fn semaphore(&self, si: SemIndex) -> &Semaphore {
        self.sems[usize::from(si.0)].as_deref().unwrap()
    }

    fn task_mut(&mut self, ti: TaskIndex) -> &mut Task {
        self.tasks[ti.index()].as_deref_mut().unwrap()
    }

    fn queue_mut(&mut self, qi: QueueIndex) -> &mut Queue {
        self.queues[usize::from(qi.0)].as_deref_mut().unwrap()
    }

    fn sem_mut(&mut self, si: SemIndex) -> &mut Semaphore {
        self.sems[usize::from(si.0)].as_deref_mut().unwrap()
    }

    /// Records the outgoing task's stack pointer, freshly laden with its
    /// register frame. Step one of a context switch.
    pub fn save_stack_pointer(&mut self, sp: *mut u32) {
        let cur = self.current;
        self.task_mut(cur).saved_sp = sp;
    }

    /// Reads back the stack pointer of whichever task won the election.
    pub fn resume_stack_pointer(&self) -> *mut u32 {
        self.task(self.current).saved_sp
    }

    /// Picks the next task to run at time `now`.
    ///
    /// This is the scheduling pass the switch handler runs between saving
    /// one register frame and restoring another:
    ///
    /// 1. Elect the head of the highest-priority non-empty runnable list,
    ///    first rotating the outgoing task to the tail of its level if it's
    ///    still at the head -- that rotation is what round-robins peers.
    /// 2. Walk the suspended list and wake every task whose sleep deadline
    ///    has passed or whose block has been released, moving each to the
    ///    *head* of its priority's runnable list. A wakee that is at least
    ///    as important as the tentative electee displaces it.
    ///
    /// All wakeups due at `now` are handled in this single pass. The walk
    /// keeps an explicit previous-link cursor and captures each node's
    /// successor before unlinking, so removals never derail the iteration.
    pub fn reschedule(&mut self, now: Ticks) {
        let outgoing = self.current;
        for p in 0..NP {
            let Some(head) = self.runnable[p] else {
                continue;
            };
            if head == outgoing {
                self.rotate_runnable(p);
            }
            // Non-empty before rotation implies non-empty after.
            self.current = self.runnable[p].unwrap();
            break;
        }
        // If every list was empty the election above fell through and
        // `current` is unchanged. That only happens if the caller failed to
        // register an idle task, since idle never leaves its list.

        let mut prev: Option<TaskIndex> = None;
        let mut cursor = self.suspended;
        while let Some(ti) = cursor {
            let t = self.task(ti);
            let next = t.next_suspended;
            let due = t.flags.contains(TaskFlags::SLEEPING)
                && t.wake_deadline().is_due(now);
            let released =
                t.flags.contains(TaskFlags::BLOCKED) && t.wait_for.is_none();
            if due || released {
                match prev {
                    Some(pi) => self.task_mut(pi).next_suspended = next,
                    None => self.suspended = next,
                }
                // A waiter that timed out is still linked on its wait
                // channel; detach it there too.
                if let Some(ch) = self.task_mut(ti).wait_for.take() {
                    self.unlink_blocked(ch, ti);
                }
                let priority = {
                    let t = self.task_mut(ti);
                    t.flags = TaskFlags::empty();
                    t.next_suspended = None;
                    t.priority()
                };
                self.push_runnable_front(ti, priority);
                let elected = self.task(self.current).priority();
                if priority.is_at_least_as_important_as(elected) {
                    self.current = ti;
                }
            } else {
                prev = Some(ti);
            }
            cursor = next;
        }
    }

    /// Decides whether a tick at time `now` warrants preemption: either the
    /// running task has a runnable peer at its own priority, or some
    /// sleeper's deadline has passed. Read-only, so the tick interrupt
    /// stays cheap when nothing is due.
    pub fn needs_preempt(&self, now: Ticks) -> bool {
        let Some(cur) = self.tasks[self.current.index()].as_deref() else {
            // Tick before any registration; nothing to do.
            return false;
        };
        if cur.next_runnable.is_some() {
            return true;
        }
        let mut cursor = self.suspended;
        while let Some(ti) = cursor {
            let t = self.task(ti);
            if t.flags.contains(TaskFlags::SLEEPING)
                && t.wake_deadline().is_due(now)
            {
                return true;
            }
            cursor = t.next_suspended;
        }
        false
    }

    /// Moves the running task to the suspended list until `deadline`. The
    /// caller must follow up by yielding.
    pub fn sleep_current_until(&mut self, deadline: Ticks) {
        self.remove_current_from_runnable();
        let cur = self.current;
        let head = self.suspended;
        {
            let t = self.task_mut(cur);
            t.flags.insert(TaskFlags::SLEEPING);
            t.set_wake_deadline(deadline);
            t.next_suspended = head;
        }
        self.suspended = Some(cur);
    }

    /// Moves the running task onto `ch`'s blocked list and the suspended
    /// list. With a deadline the task also sleeps, so a timeout can free
    /// it; without one it waits until some operation on the channel
    /// releases it. The caller must follow up by yielding.
    pub fn block_current_on(
        &mut self,
        ch: WaitChannel,
        deadline: Option<Ticks>,
    ) {
        self.remove_current_from_runnable();
        let cur = self.current;
        let blocked_head = self.blocked_head(ch);
        let suspended_head = self.suspended;
        {
            let t = self.task_mut(cur);
            t.next_blocked = blocked_head;
            t.wait_for = Some(ch);
            match deadline {
                Some(d) => {
                    t.flags.insert(TaskFlags::BLOCKED | TaskFlags::SLEEPING);
                    t.set_wake_deadline(d);
                }
                None => t.flags.insert(TaskFlags::BLOCKED),
            }
            t.next_suspended = suspended_head;
        }
        *self.blocked_head_mut(ch) = Some(cur);
        self.suspended = Some(cur);
    }

    /// Attempts to move `buf.len()` bytes out of queue `qi`, all or
    /// nothing. On success, every task blocked on the queue is released and
    /// the returned flag says whether there were any -- if so, the caller
    /// should yield so they can reassess.
    pub fn try_read_queue(
        &mut self,
        qi: QueueIndex,
        buf: &mut [u8],
    ) -> Result<bool, WouldBlock> {
        if self.queue_mut(qi).ring.dequeue_into(buf).is_err() {
            return Err(WouldBlock);
        }
        Ok(self.wake_all_blocked(WaitChannel::Queue(qi)))
    }

    /// Attempts to move all of `data` into queue `qi`. Success semantics
    /// mirror [`Self::try_read_queue`].
    pub fn try_write_queue(
        &mut self,
        qi: QueueIndex,
        data: &[u8],
    ) -> Result<bool, WouldBlock> {
        if self.queue_mut(qi).ring.enqueue(data).is_err() {
            return Err(WouldBlock);
        }
        Ok(self.wake_all_blocked(WaitChannel::Queue(qi)))
    }

    /// Attempts to take one unit from semaphore `si`. Success semantics
    /// mirror [`Self::try_read_queue`].
    pub fn try_wait_semaphore(
        &mut self,
        si: SemIndex,
    ) -> Result<bool, WouldBlock> {
        let s = self.sem_mut(si);
        if s.value == 0 {
            return Err(WouldBlock);
        }
        s.value -= 1;
        Ok(self.wake_all_blocked(WaitChannel::Semaphore(si)))
    }

    /// Attempts to return one unit to semaphore `si`, which blocks (in the
    /// calling wrapper) while the count sits at its ceiling.
    pub fn try_signal_semaphore(
        &mut self,
        si: SemIndex,
    ) -> Result<bool, WouldBlock> {
        let s = self.sem_mut(si);
        if s.value >= s.max {
            return Err(WouldBlock);
        }
        s.value += 1;
        Ok(self.wake_all_blocked(WaitChannel::Semaphore(si)))
    }

    /// Releases every task on `ch`'s blocked list by clearing its
    /// back-reference; the next scheduling pass moves them to their
    /// runnable lists. Returns whether there was anyone to release.
    ///
    /// Waiters are not told *why* they woke -- readers, writers, and
    /// signalers all just retry.
    fn wake_all_blocked(&mut self, ch: WaitChannel) -> bool {
        let mut cursor = self.blocked_head(ch);
        let had_waiters = cursor.is_some();
        while let Some(ti) = cursor {
            let t = self.task_mut(ti);
            t.wait_for = None;
            cursor = t.next_blocked.take();
        }
        *self.blocked_head_mut(ch) = None;
        had_waiters
    }

    /// Removes `ti` from `ch`'s blocked list: ordinary singly-linked-list
    /// removal, used when a waiter times out.
    fn unlink_blocked(&mut self, ch: WaitChannel, ti: TaskIndex) {
        let mut prev: Option<TaskIndex> = None;
        let mut cursor = self.blocked_head(ch);
        while let Some(ci) = cursor {
            let next = self.task(ci).next_blocked;
            if ci == ti {
                match prev {
                    Some(pi) => self.task_mut(pi).next_blocked = next,
                    None => *self.blocked_head_mut(ch) = next,
                }
                self.task_mut(ci).next_blocked = None;
                return;
            }
            prev = Some(ci);
            cursor = next;
        }
    }

    fn blocked_head(&self, ch: WaitChannel) -> Option<TaskIndex> {
        match ch {
            WaitChannel::Queue(qi) => self.queue(qi).blocked,
            WaitChannel::Semaphore(si) => self.semaphore(si).blocked,
        }
    }

    fn blocked_head_mut(&mut self, ch: WaitChannel) -> &mut Option<TaskIndex> {
        match ch {
            WaitChannel::Queue(qi) => &mut self.queue_mut(qi).blocked,
            WaitChannel::Semaphore(si) => &mut self.sem_mut(si).blocked,
        }
    }

    /// Pops the running task off its runnable list. It is always the head
    /// (the election guarantees it), so this is O(1).
    fn remove_current_from_runnable(&mut self) {
        let cur = self.current;
        let p = self.task(cur).priority().index();
        debug_assert_eq!(self.runnable[p], Some(cur));
        let next = self.task_mut(cur).next_runnable.take();
        self.runnable[p] = next;
    }

    fn push_runnable_front(&mut self, ti: TaskIndex, priority: Priority) {
        let head = self.runnable[priority.index()];
        self.task_mut(ti).next_runnable = head;
        self.runnable[priority.index()] = Some(ti);
    }

    /// Moves the head of runnable list `p` to its tail, so equal-priority
    /// peers take turns. No-op for a single-entry list.
    fn rotate_runnable(&mut self, p: usize) {
        let Some(head) = self.runnable[p] else {
            return;
        };
        let Some(second) = self.task_mut(head).next_runnable.take() else {
            return;
        };
        self.runnable[p] = Some(second);
        let mut tail = second;
        while let Some(next) = self.task(tail).next_runnable {
            tail = next;
        }
        self.task_mut(tail).next_runnable = Some(head);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestKernel = Kernel<8, 2, 2, 4>;
    const IDLE_PRIO: u8 = 3;

    fn task(priority: u8) -> &'static mut Task {
        let t = Box::leak(Box::new(Task::new()));
        t.initialize(
            core::ptr::null_mut(),
            core::ptr::null_mut(),
            0,
            Priority(priority),
        );
        t
    }

    fn queue(storage_len: usize) -> &'static mut Queue {
        let storage = Box::leak(vec![0u8; storage_len].into_boxed_slice());
        Box::leak(Box::new(Queue::new(storage)))
    }

    fn sem(initial: u32, max: u32) -> &'static mut Semaphore {
        Box::leak(Box::new(Semaphore::new(initial, max)))
    }

    /// Registers tasks at `prios` in order, then the idle task, then runs
    /// the boot-time election the way `start_kernel` does.
    fn boot(prios: &[u8]) -> (TestKernel, Vec<TaskIndex>, TaskIndex) {
        let mut k = TestKernel::new();
        let ids = prios
            .iter()
            .map(|&p| k.add_task(task(p)).unwrap())
            .collect();
        let idle = k.add_task(task(IDLE_PRIO)).unwrap();
        k.set_current(idle);
        k.reschedule(Ticks::from(0));
        k.check_invariants();
        (k, ids, idle)
    }

    impl<const NT: usize, const NQ: usize, const NS: usize, const NP: usize>
        Kernel<NT, NQ, NS, NP>
    {
        fn collect_runnable(&self, p: usize) -> Vec<TaskIndex> {
            let mut v = Vec::new();
            let mut cursor = self.runnable[p];
            while let Some(ti) = cursor {
                v.push(ti);
                cursor = self.task(ti).next_runnable;
            }
            v
        }

        fn collect_suspended(&self) -> Vec<TaskIndex> {
            let mut v = Vec::new();
            let mut cursor = self.suspended;
            while let Some(ti) = cursor {
                v.push(ti);
                cursor = self.task(ti).next_suspended;
            }
            v
        }

        fn collect_blocked(&self, ch: WaitChannel) -> Vec<TaskIndex> {
            let mut v = Vec::new();
            let mut cursor = self.blocked_head(ch);
            while let Some(ti) = cursor {
                v.push(ti);
                cursor = self.task(ti).next_blocked;
            }
            v
        }

        /// Asserts the structural invariants that must hold at every
        /// quiescent point.
        fn check_invariants(&self) {
            let suspended = self.collect_suspended();
            for (i, slot) in self.tasks.iter().enumerate() {
                let Some(t) = slot.as_deref() else { continue };
                let ti = TaskIndex(i as u8);
                let runnable_hits: usize = (0..NP)
                    .map(|p| {
                        self.collect_runnable(p)
                            .iter()
                            .filter(|&&x| x == ti)
                            .count()
                    })
                    .sum();
                let suspended_hits =
                    suspended.iter().filter(|&&x| x == ti).count();
                assert_eq!(
                    runnable_hits + suspended_hits,
                    1,
                    "task {i} must be on exactly one list"
                );
                if t.flags().is_empty() {
                    assert_eq!(runnable_hits, 1, "runnable task {i} listed");
                    assert!(self
                        .collect_runnable(t.priority().index())
                        .contains(&ti));
                    assert!(t.wait_for.is_none());
                } else {
                    assert_eq!(suspended_hits, 1, "suspended task {i} listed");
                }
                if let Some(ch) = t.wait_for {
                    assert!(t.flags().contains(TaskFlags::BLOCKED));
                    assert!(
                        self.collect_blocked(ch).contains(&ti),
                        "task {i} back-reference must match its blocked list"
                    );
                }
            }
            for (qslot, q) in self.queues.iter().enumerate() {
                let Some(q) = q.as_deref() else { continue };
                assert!(q.ring.len() <= q.capacity());
                let ch = WaitChannel::Queue(QueueIndex(qslot as u8));
                for w in self.collect_blocked(ch) {
                    let t = self.task(w);
                    assert!(t.flags().contains(TaskFlags::BLOCKED));
                    assert_eq!(t.wait_for, Some(ch));
                    assert!(suspended.contains(&w));
                }
            }
            for (sslot, s) in self.sems.iter().enumerate() {
                let Some(s) = s.as_deref() else { continue };
                assert!(s.value <= s.max);
                let ch = WaitChannel::Semaphore(SemIndex(sslot as u8));
                for w in self.collect_blocked(ch) {
                    let t = self.task(w);
                    assert!(t.flags().contains(TaskFlags::BLOCKED));
                    assert_eq!(t.wait_for, Some(ch));
                    assert!(suspended.contains(&w));
                }
            }
        }
    }

    #[test]
    fn registration_errors() {
        let mut k = TestKernel::new();
        assert_eq!(
            k.add_task(task(4)),
            Err(ConfigError::PriorityOutOfRange)
        );
        for _ in 0..8 {
            k.add_task(task(0)).unwrap();
        }
        assert_eq!(k.add_task(task(0)), Err(ConfigError::TaskTableFull));
        // One byte of backing is all spare slot; nothing would ever fit.
        assert_eq!(k.add_queue(queue(1)), Err(ConfigError::StorageTooSmall));
        assert_eq!(
            k.add_semaphore(sem(3, 2)),
            Err(ConfigError::SemaphoreAboveCeiling)
        );
        for _ in 0..2 {
            k.add_queue(queue(4)).unwrap();
        }
        assert_eq!(k.add_queue(queue(4)), Err(ConfigError::QueueTableFull));
        for _ in 0..2 {
            k.add_semaphore(sem(0, 1)).unwrap();
        }
        assert_eq!(
            k.add_semaphore(sem(0, 1)),
            Err(ConfigError::SemaphoreTableFull)
        );
    }

    #[test]
    fn equal_priority_peers_round_robin() {
        let (mut k, ids, _idle) = boot(&[1, 1]);
        // Registration pushes at the head, so the later task leads.
        assert_eq!(k.current(), ids[1]);
        let mut runs = [0u32; 2];
        let mut last = k.current();
        for _ in 0..6 {
            k.reschedule(Ticks::from(0));
            k.check_invariants();
            assert_ne!(k.current(), last, "peers must alternate");
            last = k.current();
            runs[ids.iter().position(|&t| t == last).unwrap()] += 1;
        }
        assert_eq!(runs, [3, 3]);
    }

    #[test]
    fn more_important_level_always_wins() {
        let (mut k, ids, _idle) = boot(&[1, 0, 1]);
        assert_eq!(k.current(), ids[1]);
        for _ in 0..4 {
            k.reschedule(Ticks::from(0));
            assert_eq!(k.current(), ids[1]);
        }
        k.check_invariants();
    }

    #[test]
    fn sleeper_wakes_at_its_deadline_and_preempts() {
        let (mut k, ids, _idle) = boot(&[0, 1]);
        let (a, b) = (ids[0], ids[1]);
        assert_eq!(k.current(), a);

        k.sleep_current_until(Ticks::from(10));
        k.reschedule(Ticks::from(0));
        k.check_invariants();
        assert_eq!(k.current(), b);
        assert!(k.task(a).flags().contains(TaskFlags::SLEEPING));

        assert!(!k.needs_preempt(Ticks::from(9)));
        assert!(k.needs_preempt(Ticks::from(10)));

        k.reschedule(Ticks::from(10));
        k.check_invariants();
        assert_eq!(k.current(), a);
        assert!(k.task(a).flags().is_empty());
    }

    #[test]
    fn wakee_displaces_equal_priority_electee() {
        let (mut k, ids, _idle) = boot(&[1, 1]);
        let (a, b) = (ids[0], ids[1]);
        assert_eq!(k.current(), b);

        k.sleep_current_until(Ticks::from(1));
        k.reschedule(Ticks::from(0));
        assert_eq!(k.current(), a);

        // b comes due; it is inserted at the head of the level and takes
        // precedence over the tentatively re-elected a.
        k.reschedule(Ticks::from(1));
        k.check_invariants();
        assert_eq!(k.current(), b);
        assert_eq!(k.collect_runnable(1), vec![b, a]);
    }

    #[test]
    fn all_wakeups_due_at_once_happen_in_one_pass() {
        let (mut k, ids, idle) = boot(&[1, 2, 2]);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        assert_eq!(k.current(), a);

        k.sleep_current_until(Ticks::from(5));
        k.reschedule(Ticks::from(0));
        assert_eq!(k.current(), c);
        k.sleep_current_until(Ticks::from(5));
        k.reschedule(Ticks::from(0));
        assert_eq!(k.current(), b);
        k.sleep_current_until(Ticks::from(5));
        k.reschedule(Ticks::from(0));
        assert_eq!(k.current(), idle);

        k.reschedule(Ticks::from(5));
        k.check_invariants();
        assert_eq!(k.current(), a, "most important wakee runs");
        assert!(k.collect_suspended().is_empty());
        assert!(k.task(b).flags().is_empty());
        assert!(k.task(c).flags().is_empty());
    }

    #[test]
    fn suspended_walk_survives_unlinking_head_and_tail() {
        // Regression test: an earlier version of the walk cleared a woken
        // task's next link before advancing and quit early. Here the first
        // and last entries of the suspended list come due in the same pass
        // while the middle one stays.
        let (mut k, ids, _idle) = boot(&[1, 1, 1]);
        let (s1, s2, s3) = (ids[0], ids[1], ids[2]);
        assert_eq!(k.current(), s3);

        k.sleep_current_until(Ticks::from(10)); // s3
        k.reschedule(Ticks::from(0));
        assert_eq!(k.current(), s2);
        k.sleep_current_until(Ticks::from(100)); // s2
        k.reschedule(Ticks::from(0));
        assert_eq!(k.current(), s1);
        k.sleep_current_until(Ticks::from(10)); // s1
        k.reschedule(Ticks::from(0));
        assert_eq!(k.collect_suspended(), vec![s1, s2, s3]);

        k.reschedule(Ticks::from(10));
        k.check_invariants();
        assert_eq!(k.collect_suspended(), vec![s2]);
        assert!(k.task(s1).flags().is_empty());
        assert!(k.task(s3).flags().is_empty());
    }

    #[test]
    fn timed_out_waiter_is_unlinked_from_mid_blocked_list() {
        let (mut k, ids, idle) = boot(&[1, 1, 1]);
        let (s1, s2, s3) = (ids[0], ids[1], ids[2]);
        let qi = k.add_queue(queue(4)).unwrap();
        let ch = WaitChannel::Queue(qi);

        // Block in the order s3, s2, s1 so the list reads s1, s2, s3 and
        // the timeout victim s2 sits in the middle.
        assert_eq!(k.current(), s3);
        k.block_current_on(ch, Some(Ticks::from(100)));
        k.reschedule(Ticks::from(0));
        assert_eq!(k.current(), s2);
        k.block_current_on(ch, Some(Ticks::from(5)));
        k.reschedule(Ticks::from(0));
        assert_eq!(k.current(), s1);
        k.block_current_on(ch, Some(Ticks::from(100)));
        k.reschedule(Ticks::from(0));
        assert_eq!(k.current(), idle);
        assert_eq!(k.collect_blocked(ch), vec![s1, s2, s3]);
        k.check_invariants();

        k.reschedule(Ticks::from(5));
        k.check_invariants();
        assert_eq!(k.current(), s2);
        assert!(k.task(s2).flags().is_empty());
        assert_eq!(k.task(s2).wait_for, None);
        assert_eq!(k.collect_blocked(ch), vec![s1, s3]);
    }

    #[test]
    fn queue_write_releases_blocked_reader() {
        let (mut k, ids, _idle) = boot(&[0, 1]);
        let (reader, writer) = (ids[0], ids[1]);
        let qi = k.add_queue(queue(6)).unwrap();

        assert_eq!(k.current(), reader);
        let mut buf = [0u8; 2];
        assert_eq!(k.try_read_queue(qi, &mut buf), Err(WouldBlock));
        k.block_current_on(WaitChannel::Queue(qi), None);
        k.reschedule(Ticks::from(0));
        k.check_invariants();
        assert_eq!(k.current(), writer);

        // The write succeeds and reports a waiter to be woken.
        assert_eq!(k.try_write_queue(qi, b"ab"), Ok(true));
        k.reschedule(Ticks::from(0));
        k.check_invariants();
        assert_eq!(k.current(), reader);
        assert_eq!(k.try_read_queue(qi, &mut buf), Ok(false));
        assert_eq!(&buf, b"ab");
    }

    #[test]
    fn blocked_writer_recovers_after_interrupt_drain() {
        let (mut k, ids, _idle) = boot(&[0, 1]);
        let (writer, drainer) = (ids[0], ids[1]);
        let qi = k.add_queue(queue(6)).unwrap();

        assert_eq!(k.current(), writer);
        assert_eq!(k.try_write_queue(qi, b"abcde"), Ok(false));
        assert_eq!(k.try_write_queue(qi, b"f"), Err(WouldBlock));
        k.block_current_on(WaitChannel::Queue(qi), None);
        k.reschedule(Ticks::from(0));
        assert_eq!(k.current(), drainer);

        // What read_queue_irq does under the raw critical section.
        let mut one = [0u8; 1];
        assert_eq!(k.try_read_queue(qi, &mut one), Ok(true));
        assert_eq!(&one, b"a");

        k.reschedule(Ticks::from(0));
        k.check_invariants();
        assert_eq!(k.current(), writer);
        assert_eq!(k.try_write_queue(qi, b"f"), Ok(false));
        let mut rest = [0u8; 5];
        assert_eq!(k.try_read_queue(qi, &mut rest), Ok(false));
        assert_eq!(&rest, b"bcdef");
    }

    #[test]
    fn realtime_wake_shortens_a_sleep() {
        let (mut k, ids, _idle) = boot(&[0, 1]);
        let a = ids[0];
        let waker = k.task(a).realtime_waker();

        assert_eq!(k.current(), a);
        k.sleep_current_until(Ticks::from(5));
        k.reschedule(Ticks::from(0));
        assert_eq!(k.current(), ids[1]);

        waker.post(Ticks::from(2));
        assert!(k.needs_preempt(Ticks::from(2)));
        k.reschedule(Ticks::from(2));
        k.check_invariants();
        assert_eq!(k.current(), a);
    }

    #[test]
    fn realtime_wake_of_runnable_task_is_harmless() {
        let (mut k, ids, _idle) = boot(&[0]);
        let waker = k.task(ids[0]).realtime_waker();
        waker.post(Ticks::from(7));
        k.reschedule(Ticks::from(7));
        k.check_invariants();
        assert_eq!(k.current(), ids[0]);
        assert!(k.task(ids[0]).flags().is_empty());
    }

    #[test]
    fn semaphore_wait_blocks_and_signal_releases() {
        let (mut k, ids, _idle) = boot(&[0, 1]);
        let (taker, giver) = (ids[0], ids[1]);
        let si = k.add_semaphore(sem(1, 2)).unwrap();
        let ch = WaitChannel::Semaphore(si);

        assert_eq!(k.current(), taker);
        assert_eq!(k.try_wait_semaphore(si), Ok(false));
        assert_eq!(k.semaphore(si).value(), 0);
        assert_eq!(k.try_wait_semaphore(si), Err(WouldBlock));
        k.block_current_on(ch, None);
        k.reschedule(Ticks::from(0));
        assert_eq!(k.current(), giver);

        assert_eq!(k.try_signal_semaphore(si), Ok(true));
        k.reschedule(Ticks::from(0));
        k.check_invariants();
        assert_eq!(k.current(), taker);
        assert_eq!(k.try_wait_semaphore(si), Ok(false));
    }

    #[test]
    fn semaphore_signal_blocks_at_ceiling() {
        let (mut k, _ids, _idle) = boot(&[0]);
        let si = k.add_semaphore(sem(2, 2)).unwrap();
        assert_eq!(k.try_signal_semaphore(si), Err(WouldBlock));
        assert_eq!(k.semaphore(si).value(), 2);
    }

    #[test]
    fn idle_runs_when_everyone_sleeps() {
        let (mut k, ids, idle) = boot(&[0]);
        k.sleep_current_until(Ticks::from(1000));
        k.reschedule(Ticks::from(0));
        k.check_invariants();
        assert_eq!(k.current(), idle);
        assert!(!k.needs_preempt(Ticks::from(999)));
        assert!(k.needs_preempt(Ticks::from(1000)));
        k.reschedule(Ticks::from(1000));
        assert_eq!(k.current(), ids[0]);
    }

    #[test]
    fn sleep_near_the_counter_wrap_wakes_on_time() {
        let (mut k, ids, idle) = boot(&[0]);
        let start = Ticks::from(u32::MAX - 2);
        k.sleep_current_until(start.offset(5));
        k.reschedule(start);
        assert_eq!(k.current(), idle);
        assert!(!k.needs_preempt(start.offset(4)));
        assert!(k.needs_preempt(start.offset(5)));
        k.reschedule(start.offset(5)); // tick value 2, post-wrap
        k.check_invariants();
        assert_eq!(k.current(), ids[0]);
    }

    #[test]
    fn empty_transfer_succeeds_and_still_wakes() {
        let (mut k, ids, _idle) = boot(&[0, 1]);
        let qi = k.add_queue(queue(4)).unwrap();
        assert_eq!(k.current(), ids[0]);
        k.block_current_on(WaitChannel::Queue(qi), None);
        k.reschedule(Ticks::from(0));
        assert_eq!(k.try_write_queue(qi, b""), Ok(true));
        k.reschedule(Ticks::from(0));
        k.check_invariants();
        assert_eq!(k.current(), ids[0]);
    }
}
