// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Implementation of tasks and the scheduler.
//!
//! Tasks live in a static pool, filled once during boot and never recycled.
//! Each control block owns its stack buffer outright; the saved-register
//! frame a trap pushes lives *on that stack*, and the control block keeps
//! only the frame address (its `sp`). That address sits at offset 0 of the
//! struct because the trap vector stores to it and loads from it directly.
//!
//! The scheduler is priority round-robin: the highest-priority READY or
//! RUNNING task wins, ties go to the first candidate at or after
//! `current + 1` in pool order, and the priority-0 idle task is selected
//! only when nothing else can run.

use crate::arch;
use crate::startup::{NUM_TASKS, TASK_STACK_SIZE};
use crate::time::Timestamp;
use abi::{Priority, SysError, TaskId, TaskName, TaskSnapshot, TaskState};
use unwrap_lite::UnwrapLite;

/// Pattern written into fresh stacks below the forged frame, to make stack
/// consumption visible in a debugger.
const STACK_FILL: u32 = 0x5afe_57ac;

/// A task's stack buffer. Kept 16-aligned so that both the buffer top and
/// the forged frame meet the RISC-V stack alignment rule.
#[repr(C, align(16))]
struct TaskStack([u8; TASK_STACK_SIZE]);

/// Internal representation of a task.
///
/// The fields are private so the scheduling invariants stay in this module.
/// `sp` must remain the first field: the trap vector addresses it as
/// `0(task)`.
#[repr(C)]
pub struct Task {
    /// Address of the saved-register frame on this task's stack. Written by
    /// the trap prologue on every trap, read by the epilogue on resume.
    /// Zero only while the slot is vacant.
    sp: usize,
    // NOTE: sp must stay first; the offset is part of the trap ABI.
    id: TaskId,
    name: TaskName,
    priority: Priority,
    state: TaskState,
    /// Absolute wake time while `state` is `Blocked`.
    wake_at: Option<Timestamp>,
    /// Task entry point, kept so the frame can be forged (and in principle
    /// re-forged) in place.
    entry: usize,
    stack: TaskStack,
}

impl Task {
    /// Produces an unoccupied pool slot.
    fn vacant(index: u8) -> Self {
        Task {
            sp: 0,
            id: TaskId(index),
            name: TaskName::default(),
            priority: Priority::IDLE,
            state: TaskState::Terminated,
            wake_at: None,
            entry: 0,
            stack: TaskStack([0; TASK_STACK_SIZE]),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn wake_at(&self) -> Option<Timestamp> {
        self.wake_at
    }

    /// Checks if this task is in a potentially schedulable state.
    pub fn is_schedulable(&self) -> bool {
        matches!(self.state, TaskState::Ready | TaskState::Running)
    }

    /// Returns a reference to the saved machine state for the task.
    ///
    /// The frame lives on the task's own stack; `sp` always designates a
    /// live frame once the task has been created (forged at creation,
    /// rewritten by every trap), so the dereference is sound inside the
    /// trap critical section.
    pub fn save(&self) -> &arch::SavedState {
        uassert!(self.sp != 0);
        unsafe { &*(self.sp as *const arch::SavedState) }
    }

    /// Returns a mutable reference to the saved machine state for the task.
    pub fn save_mut(&mut self) -> &mut arch::SavedState {
        uassert!(self.sp != 0);
        unsafe { &mut *(self.sp as *mut arch::SavedState) }
    }

    /// Writes the initial saved-register frame to the high end of the stack
    /// buffer, so that the first resume of this task lands at its entry
    /// point.
    ///
    /// The frame and the addresses recorded in it point into the control
    /// block's own stack buffer, so this must run -- and if need be, run
    /// again -- only once the block sits at its permanent address.
    ///
    /// All general registers start as zero except: `ra` and the saved pc
    /// both point at the entry, `sp` holds the stack top, and `gp` inherits
    /// the kernel's own value so the task addresses the same globals.
    pub fn reinitialize(&mut self) {
        let entry = self.entry;
        let base = self.stack.0.as_mut_ptr() as usize;
        let top = (base + TASK_STACK_SIZE) & !0xF;
        let frame_addr = top - core::mem::size_of::<arch::SavedState>();
        uassert!(frame_addr % 16 == 0);
        uassert!(frame_addr > base);

        let mut frame = arch::SavedState::default();
        frame.set_pc(entry);
        frame.set_ra(entry);
        frame.set_sp(top);
        frame.set_gp(arch::read_gp());

        // Safety: frame_addr and the fill span lie inside this task's own
        // stack buffer, which nothing else references yet.
        unsafe {
            let mut word = base as *mut u32;
            while (word as usize) < frame_addr {
                word.write(STACK_FILL);
                word = word.add(1);
            }
            core::ptr::write(frame_addr as *mut arch::SavedState, frame);
        }
        self.sp = frame_addr;
    }

    fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: u32::from(self.id.0),
            state: self.state.into(),
            priority: u32::from(self.priority.0),
            sp: self.sp as u32,
            wake_at: self.wake_at.map(u64::from).unwrap_or(0),
            name: *self.name.as_bytes(),
        }
    }
}

/// Interface that must be implemented by the `arch::SavedState` frame type.
/// This gives architecture-independent access to the syscall argument and
/// return slots for the rest of the kernel.
pub trait ArchState: Default {
    /// Reads syscall argument register 0.
    fn arg0(&self) -> usize;
    /// Reads syscall argument register 1.
    fn arg1(&self) -> usize;
    /// Reads syscall argument register 2.
    fn arg2(&self) -> usize;
    /// Reads syscall argument register 3.
    fn arg3(&self) -> usize;
    /// Reads syscall argument register 4.
    fn arg4(&self) -> usize;
    /// Reads syscall argument register 5.
    fn arg5(&self) -> usize;

    /// Reads the syscall descriptor (number).
    fn syscall_descriptor(&self) -> u32;

    /// Writes the syscall return slot.
    fn ret0(&mut self, _: usize);

    /// Records a failure response code in the return slot.
    fn set_error_response(&mut self, e: SysError) {
        self.ret0(e.response_code() as usize);
    }
}

/// Return value for operations that can have scheduling implications. This
/// is marked `must_use` because forgetting to act on a switch request would
/// leave a blocked or suspended task on the CPU.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[must_use]
pub enum NextTask {
    /// It's fine to keep running whatever task we were just running.
    Same,
    /// The current task may no longer run; the scheduler has to pick.
    Other,
}

/// The static task pool plus the scheduler's bookkeeping.
pub struct TaskTable {
    tasks: [Task; NUM_TASKS],
    /// Occupied slots; `tasks[..count]` were created, the rest are vacant.
    count: usize,
    /// Slot of the task whose frame the trap epilogue will restore, once
    /// the first selection has happened.
    current: Option<usize>,
}

impl TaskTable {
    /// Produces an empty pool with no current task.
    pub fn new() -> Self {
        TaskTable {
            tasks: core::array::from_fn(|i| Task::vacant(i as u8)),
            count: 0,
            current: None,
        }
    }

    /// Claims a pool slot for a new task. The returned id is the slot
    /// index and stays valid forever. The task cannot run until
    /// `initialize_frames` has forged its first frame.
    pub fn create(
        &mut self,
        entry: usize,
        name: &str,
        priority: Priority,
    ) -> Result<TaskId, SysError> {
        if self.count == NUM_TASKS {
            return Err(SysError::TooManyTasks);
        }
        let task = &mut self.tasks[self.count];
        task.name = TaskName::from(name);
        task.priority = priority;
        task.state = TaskState::Ready;
        task.wake_at = None;
        task.entry = entry;
        self.count += 1;
        Ok(task.id)
    }

    /// Forges the initial frame of every created task. Call exactly once,
    /// after the table has reached its permanent home: the frames record
    /// absolute addresses into the control blocks themselves, so a table
    /// that moves afterwards would strand them.
    pub fn initialize_frames(&mut self) {
        for task in &mut self.tasks[..self.count] {
            task.reinitialize();
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn task(&self, index: usize) -> &Task {
        &self.tasks[index]
    }

    pub fn task_mut(&mut self, index: usize) -> &mut Task {
        &mut self.tasks[index]
    }

    /// Slot of the task currently holding the CPU.
    ///
    /// # Panics
    ///
    /// Before the first `schedule` call; by then the trap path is not live
    /// yet, so nothing legitimate can ask.
    pub fn current_index(&self) -> usize {
        self.current.unwrap_lite()
    }

    /// Transitions the current task RUNNING -> BLOCKED until `wake`.
    /// The caller must follow up with a reschedule.
    pub fn sleep_current(&mut self, wake: Timestamp) {
        let idx = self.current_index();
        self.tasks[idx].state = TaskState::Blocked;
        self.tasks[idx].wake_at = Some(wake);
    }

    /// Marks a task SUSPENDED. Suspending the caller itself demands an
    /// immediate reschedule, reported through the returned hint. The idle
    /// task may not be suspended; the system would have nothing left to
    /// run dry on.
    pub fn suspend(&mut self, id: TaskId) -> Result<NextTask, SysError> {
        let idx = self.check_id(id)?;
        if self.tasks[idx].priority.is_idle() {
            return Err(SysError::RefusedIdle);
        }
        self.tasks[idx].state = TaskState::Suspended;
        self.tasks[idx].wake_at = None;
        if Some(idx) == self.current {
            Ok(NextTask::Other)
        } else {
            Ok(NextTask::Same)
        }
    }

    /// SUSPENDED -> READY. A no-op for tasks in any other state.
    pub fn resume(&mut self, id: TaskId) -> Result<(), SysError> {
        let idx = self.check_id(id)?;
        if self.tasks[idx].state == TaskState::Suspended {
            self.tasks[idx].state = TaskState::Ready;
        }
        Ok(())
    }

    /// Copies up to `cap` task snapshots out through `emit`. Returns the
    /// number emitted.
    pub fn snapshot(
        &self,
        cap: usize,
        mut emit: impl FnMut(usize, TaskSnapshot),
    ) -> usize {
        let n = self.count.min(cap);
        for i in 0..n {
            emit(i, self.tasks[i].snapshot());
        }
        n
    }

    fn check_id(&self, id: TaskId) -> Result<usize, SysError> {
        let idx = id.index();
        if idx >= self.count {
            return Err(SysError::NotFound);
        }
        Ok(idx)
    }

    /// Recomputes the selection and records it as current. Runs in three
    /// phases:
    ///
    /// 1. Wake sweep: every BLOCKED task whose wake time has arrived
    ///    becomes READY.
    /// 2. Candidate search: scan the pool circularly from `current + 1`,
    ///    considering READY/RUNNING tasks of non-idle priority; keep the
    ///    highest priority seen, first-encountered winning ties. The
    ///    rotated starting point is what gives round-robin fairness within
    ///    a priority band.
    /// 3. Idle fallback: with no candidate, take a READY/RUNNING priority-0
    ///    task. Absent one, the selection is left unchanged.
    ///
    /// The selected task is promoted to RUNNING; a previously-RUNNING task
    /// that lost the CPU is demoted to READY. BLOCKED and SUSPENDED tasks
    /// are never demoted here.
    pub fn schedule(&mut self, now: Timestamp) -> usize {
        for task in &mut self.tasks[..self.count] {
            if task.state == TaskState::Blocked {
                if let Some(wake) = task.wake_at {
                    if wake <= now {
                        task.state = TaskState::Ready;
                        task.wake_at = None;
                    }
                }
            }
        }

        let n = self.count;
        uassert!(n > 0);
        let start = match self.current {
            Some(c) => (c + 1) % n,
            None => 0,
        };
        let search_order = (start..n).chain(0..start);
        let mut choice: Option<(usize, Priority)> = None;
        for i in search_order {
            let task = &self.tasks[i];
            if !task.is_schedulable() || task.priority.is_idle() {
                continue;
            }
            if let Some((_, prio)) = choice {
                if !task.priority.is_higher_than(prio) {
                    continue;
                }
            }
            choice = Some((i, task.priority));
        }

        let choice = choice.map(|(i, _)| i).or_else(|| {
            (0..n).find(|&i| {
                self.tasks[i].is_schedulable()
                    && self.tasks[i].priority.is_idle()
            })
        });

        let next = match choice {
            Some(i) => i,
            // Nothing runnable and no idle task: keep the previous
            // selection in place.
            None => return self.current.unwrap_lite(),
        };

        if self.tasks[next].state == TaskState::Ready {
            self.tasks[next].state = TaskState::Running;
        }
        if let Some(prev) = self.current {
            if prev != next && self.tasks[prev].state == TaskState::Running {
                self.tasks[prev].state = TaskState::Ready;
            }
        }
        self.current = Some(next);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRY: usize = 0x2000_0000;

    fn table_with(specs: &[(&str, u8)]) -> TaskTable {
        let mut table = TaskTable::new();
        for (name, prio) in specs {
            table.create(ENTRY, name, Priority(*prio)).unwrap();
        }
        table
    }

    fn t(cycles: u64) -> Timestamp {
        Timestamp::from(cycles)
    }

    #[test]
    fn create_fills_pool_then_refuses() {
        let mut table = TaskTable::new();
        for i in 0..NUM_TASKS {
            let id = table.create(ENTRY, "filler", Priority(1)).unwrap();
            assert_eq!(id.index(), i);
        }
        assert_eq!(
            table.create(ENTRY, "straw", Priority(1)),
            Err(SysError::TooManyTasks)
        );
    }

    #[test]
    fn forged_frame_resumes_at_entry() {
        let mut table = TaskTable::new();
        table.create(ENTRY, "idle", Priority(0)).unwrap();
        table.initialize_frames();
        let task = table.task(0);
        assert_eq!(task.save().pc(), ENTRY);
        assert_eq!(task.sp % 16, 0);
        let stack_base = task.stack.0.as_ptr() as usize;
        assert!(task.sp > stack_base);
        assert!(task.sp < stack_base + TASK_STACK_SIZE);
        // The frame records a stack pointer above itself, inside the buffer.
        assert_eq!(
            task.save().sp(),
            task.sp + core::mem::size_of::<arch::SavedState>()
        );
    }

    #[test]
    fn equal_priorities_round_robin() {
        let mut table = table_with(&[("idle", 0), ("a", 1), ("b", 1)]);
        let first = table.schedule(t(0));
        let second = table.schedule(t(0));
        let third = table.schedule(t(0));
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(third, 1);
        assert_eq!(table.task(1).state(), TaskState::Running);
        assert_eq!(table.task(2).state(), TaskState::Ready);
    }

    #[test]
    fn higher_priority_always_wins() {
        let mut table = table_with(&[("idle", 0), ("lo", 1), ("hi", 2)]);
        for _ in 0..10 {
            assert_eq!(table.schedule(t(0)), 2);
        }
        assert_eq!(table.task(2).state(), TaskState::Running);
        assert_eq!(table.task(1).state(), TaskState::Ready);
    }

    #[test]
    fn idle_selected_only_when_nothing_else_can_run() {
        let mut table = table_with(&[("idle", 0), ("worker", 1)]);
        assert_eq!(table.schedule(t(0)), 1);

        table.sleep_current(t(1_000));
        assert_eq!(table.schedule(t(0)), 0, "sleeper parked, idle runs");
        assert_eq!(table.task(0).state(), TaskState::Running);

        // Wake sweep brings the worker back and idle steps aside.
        assert_eq!(table.schedule(t(1_000)), 1);
        assert_eq!(table.task(0).state(), TaskState::Ready);
        assert_eq!(table.task(1).state(), TaskState::Running);
    }

    #[test]
    fn sleeping_task_stays_blocked_until_wake_time() {
        let mut table = table_with(&[("idle", 0), ("napper", 1)]);
        table.schedule(t(0));
        table.sleep_current(t(500));

        assert_eq!(table.schedule(t(499)), 0);
        assert_eq!(table.task(1).state(), TaskState::Blocked);
        assert_eq!(table.task(1).wake_at(), Some(t(500)));

        assert_eq!(table.schedule(t(500)), 1);
        assert_eq!(table.task(1).wake_at(), None);
    }

    #[test]
    fn selection_unchanged_without_candidates_or_idle() {
        let mut table = table_with(&[("solo", 1)]);
        assert_eq!(table.schedule(t(0)), 0);
        table.sleep_current(t(1_000_000));
        // No candidate, no idle task: selection must not move, and the
        // blocked task must not be promoted.
        assert_eq!(table.schedule(t(0)), 0);
        assert_eq!(table.task(0).state(), TaskState::Blocked);
    }

    #[test]
    fn suspend_and_resume_lifecycle() {
        let mut table = table_with(&[("idle", 0), ("a", 1), ("b", 1)]);
        table.schedule(t(0));

        // Suspending another task does not demand a switch.
        assert_eq!(table.suspend(TaskId(2)), Ok(NextTask::Same));
        assert_eq!(table.task(2).state(), TaskState::Suspended);

        // Suspended tasks are skipped by the scheduler.
        assert_eq!(table.schedule(t(0)), 1);
        assert_eq!(table.schedule(t(0)), 1);

        // Resume is Suspended -> Ready, and a no-op on anything else.
        table.resume(TaskId(2)).unwrap();
        assert_eq!(table.task(2).state(), TaskState::Ready);
        table.resume(TaskId(2)).unwrap();
        assert_eq!(table.task(2).state(), TaskState::Ready);

        // Self-suspend must report that the CPU needs a new owner.
        let current = table.current_index();
        assert_eq!(
            table.suspend(TaskId(current as u8)),
            Ok(NextTask::Other)
        );
        assert_ne!(table.schedule(t(0)), current);
    }

    #[test]
    fn suspend_validates_targets() {
        let mut table = table_with(&[("idle", 0), ("a", 1)]);
        assert_eq!(table.suspend(TaskId(0)), Err(SysError::RefusedIdle));
        assert_eq!(table.suspend(TaskId(7)), Err(SysError::NotFound));
        assert_eq!(table.resume(TaskId(7)), Err(SysError::NotFound));
    }

    #[test]
    fn every_ready_task_is_eventually_selected() {
        // Property from the scheduling contract: with k tasks in one
        // priority band, nobody waits more than the band size.
        let mut table = table_with(&[
            ("idle", 0),
            ("a", 1),
            ("b", 1),
            ("c", 1),
            ("d", 1),
        ]);
        let mut seen = [0u32; 5];
        for _ in 0..20 {
            seen[table.schedule(t(0))] += 1;
        }
        assert_eq!(seen[0], 0, "idle must starve while others are ready");
        for (i, &n) in seen.iter().enumerate().skip(1) {
            assert_eq!(n, 5, "task {} must get an even share", i);
        }
    }

    #[test]
    fn snapshot_reports_live_state() {
        let mut table = table_with(&[("idle", 0), ("worker", 3)]);
        table.schedule(t(0));

        let mut snaps = [None; NUM_TASKS];
        let n = table.snapshot(NUM_TASKS, |i, s| snaps[i] = Some(s));
        assert_eq!(n, 2);

        let worker = snaps[1].unwrap();
        assert_eq!(worker.id, 1);
        assert_eq!(worker.priority, 3);
        assert_eq!(worker.state, u32::from(TaskState::Running));
        assert_eq!(&worker.name[..6], b"worker");

        // cap limits the copy.
        let n = table.snapshot(1, |_, _| ());
        assert_eq!(n, 1);
    }
}
