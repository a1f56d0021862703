// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Call-gate ABI definitions, shared between the kernel and task code.
//!
//! Everything in here is observed from both sides of an `ecall`: syscall
//! numbers, response codes, the snapshot record marshalled by GET_TASKS, and
//! the mutex cell the LOCK/UNLOCK services operate on. Layouts are frozen;
//! change them on both sides at once or not at all.

#![cfg_attr(not(test), no_std)]

use core::cell::UnsafeCell;

use serde::{Deserialize, Serialize};
use zerocopy::{AsBytes, FromBytes};

/// Maximum number of bytes in a task name. One more byte of storage is kept
/// so a full-length name still carries a terminator.
pub const MAX_NAME_LEN: usize = 15;

/// Maximum number of bytes in a file name, matching the directory entry's
/// fixed name field. Names shorter than this are null-padded on disk.
pub const FS_NAME_LEN: usize = 28;

/// Identifies a task by its slot in the static pool. Slots are assigned in
/// creation order at boot and never recycled.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(transparent)]
pub struct TaskId(pub u8);

impl TaskId {
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

/// Scheduling priority of a task.
///
/// Numerically greater priorities are more important. Priority 0 is reserved
/// for the idle task and is only ever selected when nothing else can run, so
/// ordinary tasks start at 1.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[repr(transparent)]
pub struct Priority(pub u8);

impl Priority {
    pub const IDLE: Self = Priority(0);

    /// Checks if `self` is strictly more important than `other`.
    pub fn is_higher_than(self, other: Self) -> bool {
        self.0 > other.0
    }

    pub fn is_idle(self) -> bool {
        self.0 == 0
    }
}

/// Task life-cycle state, as exposed through GET_TASKS.
///
/// The discriminants are part of the snapshot wire format.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum TaskState {
    /// Eligible for selection.
    Ready = 0,
    /// Currently holding the CPU.
    Running = 1,
    /// Sleeping until an absolute wake time.
    Blocked = 2,
    /// Parked by SUSPEND until a RESUME.
    Suspended = 3,
    /// Slot retired; never scheduled.
    Terminated = 4,
}

impl From<TaskState> for u32 {
    fn from(s: TaskState) -> u32 {
        s as u32
    }
}

impl core::convert::TryFrom<u32> for TaskState {
    type Error = ();

    fn try_from(x: u32) -> Result<Self, ()> {
        match x {
            0 => Ok(Self::Ready),
            1 => Ok(Self::Running),
            2 => Ok(Self::Blocked),
            3 => Ok(Self::Suspended),
            4 => Ok(Self::Terminated),
            _ => Err(()),
        }
    }
}

/// Fixed-size task name storage: up to `MAX_NAME_LEN` bytes, null-padded.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[repr(transparent)]
pub struct TaskName(pub [u8; MAX_NAME_LEN + 1]);

impl TaskName {
    pub fn as_bytes(&self) -> &[u8; MAX_NAME_LEN + 1] {
        &self.0
    }
}

impl From<&str> for TaskName {
    /// Copies at most `MAX_NAME_LEN` bytes; longer names are truncated.
    fn from(s: &str) -> Self {
        let mut name = TaskName::default();
        let n = s.len().min(MAX_NAME_LEN);
        name.0[..n].copy_from_slice(&s.as_bytes()[..n]);
        name
    }
}

/// Enumeration of syscall numbers, carried in `a7`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum Sysnum {
    Yield = 0,
    Write = 1,
    Sleep = 2,
    Lock = 3,
    Unlock = 4,
    GetTasks = 5,
    Peek = 6,
    Poke = 7,
    HeapInfo = 8,
    Malloc = 9,
    Free = 10,
    Defrag = 11,
    Suspend = 12,
    Resume = 13,
    FsCreate = 14,
    FsWrite = 15,
    FsRead = 16,
    FsList = 17,
    FsDelete = 18,
    FsFormat = 19,
}

/// We're using an explicit `TryFrom` impl for `Sysnum` instead of
/// `FromPrimitive` because the kernel doesn't depend on `num-traits` and this
/// seems okay.
impl core::convert::TryFrom<u32> for Sysnum {
    type Error = ();

    fn try_from(x: u32) -> Result<Self, ()> {
        match x {
            0 => Ok(Self::Yield),
            1 => Ok(Self::Write),
            2 => Ok(Self::Sleep),
            3 => Ok(Self::Lock),
            4 => Ok(Self::Unlock),
            5 => Ok(Self::GetTasks),
            6 => Ok(Self::Peek),
            7 => Ok(Self::Poke),
            8 => Ok(Self::HeapInfo),
            9 => Ok(Self::Malloc),
            10 => Ok(Self::Free),
            11 => Ok(Self::Defrag),
            12 => Ok(Self::Suspend),
            13 => Ok(Self::Resume),
            14 => Ok(Self::FsCreate),
            15 => Ok(Self::FsWrite),
            16 => Ok(Self::FsRead),
            17 => Ok(Self::FsList),
            18 => Ok(Self::FsDelete),
            19 => Ok(Self::FsFormat),
            _ => Err(()),
        }
    }
}

/// Failure codes for kernel services.
///
/// Services report success as zero or a non-negative payload in `a0`, and
/// failure as the negated discriminant, so every code here must stay small
/// and positive.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum SysError {
    /// `a7` held a number outside the syscall table.
    NoSys = 1,
    /// The task pool is full.
    TooManyTasks = 2,
    /// No task / file with that id or name.
    NotFound = 3,
    /// SUSPEND was aimed at the idle task.
    RefusedIdle = 4,
    /// A pointer argument was null, out of range, misaligned, or failed the
    /// allocator's header check.
    BadAddress = 5,
    /// A file with that name already exists.
    Exists = 6,
    /// The inode table is exhausted.
    NoInode = 7,
    /// The root directory has no vacant entry.
    DirFull = 8,
    /// Data does not fit in the direct-block array.
    TooLarge = 9,
    /// No free data blocks remain.
    NoSpace = 10,
    /// A file name exceeds `FS_NAME_LEN`.
    NameTooLong = 11,
}

impl SysError {
    /// The value placed in the caller's `a0`.
    pub fn response_code(self) -> u32 {
        (-(self as i32)) as u32
    }

    /// Recovers an error from a raw response word, if it encodes one.
    pub fn from_response_code(code: u32) -> Option<Self> {
        match code as i32 {
            -1 => Some(Self::NoSys),
            -2 => Some(Self::TooManyTasks),
            -3 => Some(Self::NotFound),
            -4 => Some(Self::RefusedIdle),
            -5 => Some(Self::BadAddress),
            -6 => Some(Self::Exists),
            -7 => Some(Self::NoInode),
            -8 => Some(Self::DirFull),
            -9 => Some(Self::TooLarge),
            -10 => Some(Self::NoSpace),
            -11 => Some(Self::NameTooLong),
            _ => None,
        }
    }
}

/// Interprets a raw `a0` return word as a service result.
pub fn check_response(ret: usize) -> Result<u32, SysError> {
    let word = ret as u32;
    match SysError::from_response_code(word) {
        Some(e) => Err(e),
        None => Ok(word),
    }
}

/// Per-task record copied out by the GET_TASKS service, marshalled through
/// the caller's buffer with `ssmarshal`.
///
/// The layout doubles as the wire format, hence the zerocopy derives and the
/// padding-free field order.
#[derive(Copy, Clone, Debug, Serialize, Deserialize, AsBytes, FromBytes)]
#[repr(C)]
pub struct TaskSnapshot {
    pub id: u32,
    /// `TaskState` discriminant.
    pub state: u32,
    pub priority: u32,
    pub sp: u32,
    /// Absolute wake time in cycles; zero when the task has no sleep armed.
    pub wake_at: u64,
    pub name: [u8; MAX_NAME_LEN + 1],
}

/// Number of bytes one marshalled `TaskSnapshot` occupies in the GET_TASKS
/// buffer.
pub const SNAPSHOT_SIZE: usize = core::mem::size_of::<TaskSnapshot>();

/// A cooperative mutex cell.
///
/// The memory belongs to whoever declared it (normally a `static` in task
/// code); the kernel only inspects and mutates it while dispatching LOCK and
/// UNLOCK, which the trap gate serializes. There is no blocking acquire --
/// callers retry around a 0 return, yielding in between.
#[repr(C)]
pub struct Mutex {
    locked: UnsafeCell<u32>,
    owner: UnsafeCell<u32>,
}

// Safety: tasks never touch the fields directly; all access funnels through
// the kernel inside the trap critical section.
unsafe impl Sync for Mutex {}

impl Mutex {
    pub const fn new() -> Self {
        Mutex {
            locked: UnsafeCell::new(0),
            owner: UnsafeCell::new(0),
        }
    }

    /// Attempts to take the lock for `owner`. Returns `true` on acquisition.
    ///
    /// # Safety
    ///
    /// Caller must be the only thread of execution with access to the cell,
    /// i.e. the kernel inside the trap critical section.
    pub unsafe fn try_acquire(&self, owner: u32) -> bool {
        if *self.locked.get() == 0 {
            *self.locked.get() = 1;
            *self.owner.get() = owner;
            true
        } else {
            false
        }
    }

    /// Releases the lock if `owner` holds it; otherwise does nothing.
    ///
    /// # Safety
    ///
    /// Same serialization requirement as `try_acquire`.
    pub unsafe fn release(&self, owner: u32) {
        if *self.locked.get() != 0 && *self.owner.get() == owner {
            *self.locked.get() = 0;
        }
    }

    /// # Safety
    ///
    /// Same serialization requirement as `try_acquire`.
    pub unsafe fn is_locked(&self) -> bool {
        *self.locked.get() != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::TryFrom;

    #[test]
    fn sysnum_roundtrips_through_raw_words() {
        for nr in 0..20 {
            let sysnum = Sysnum::try_from(nr).unwrap();
            assert_eq!(sysnum as u32, nr);
        }
        assert!(Sysnum::try_from(20).is_err());
        assert!(Sysnum::try_from(u32::MAX).is_err());
    }

    #[test]
    fn error_codes_roundtrip_and_stay_negative() {
        let all = [
            SysError::NoSys,
            SysError::TooManyTasks,
            SysError::NotFound,
            SysError::RefusedIdle,
            SysError::BadAddress,
            SysError::Exists,
            SysError::NoInode,
            SysError::DirFull,
            SysError::TooLarge,
            SysError::NoSpace,
            SysError::NameTooLong,
        ];
        for e in all {
            let code = e.response_code();
            assert!((code as i32) < 0, "{:?} must encode negative", e);
            assert_eq!(SysError::from_response_code(code), Some(e));
        }
        assert_eq!(SysError::from_response_code(0), None);
        assert_eq!(SysError::from_response_code(0x8000_0000), None);
    }

    #[test]
    fn check_response_splits_success_from_failure() {
        assert_eq!(check_response(0), Ok(0));
        assert_eq!(check_response(1234), Ok(1234));
        assert_eq!(
            check_response(SysError::NotFound.response_code() as usize),
            Err(SysError::NotFound)
        );
    }

    #[test]
    fn snapshot_marshals_to_its_declared_size() {
        let snap = TaskSnapshot {
            id: 3,
            state: TaskState::Blocked.into(),
            priority: 2,
            sp: 0x8000_1000,
            wake_at: 0x1_0000_0000,
            name: TaskName::from("monitor").0,
        };
        let mut buf = [0u8; SNAPSHOT_SIZE + 8];
        let n = ssmarshal::serialize(&mut buf, &snap).unwrap();
        assert_eq!(n, SNAPSHOT_SIZE);

        let (back, used) =
            ssmarshal::deserialize::<TaskSnapshot>(&buf[..n]).unwrap();
        assert_eq!(used, SNAPSHOT_SIZE);
        assert_eq!(back.id, 3);
        assert_eq!(back.wake_at, 0x1_0000_0000);
        assert_eq!(&back.name, TaskName::from("monitor").as_bytes());
    }

    #[test]
    fn task_names_truncate_and_null_pad() {
        let name = TaskName::from("a-very-long-task-name");
        assert_eq!(&name.0[..MAX_NAME_LEN], b"a-very-long-tas");
        assert_eq!(name.0[MAX_NAME_LEN], 0);

        let short = TaskName::from("led");
        assert_eq!(&short.0[..3], b"led");
        assert!(short.0[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn mutex_is_exclusive_until_owner_releases() {
        let m = Mutex::new();
        unsafe {
            assert!(m.try_acquire(1));
            assert!(!m.try_acquire(2));
            // Non-owner release is a silent no-op.
            m.release(2);
            assert!(m.is_locked());
            m.release(1);
            assert!(!m.is_locked());
            assert!(m.try_acquire(2));
        }
    }
}
