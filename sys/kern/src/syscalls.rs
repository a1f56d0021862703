// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Architecture-independent syscall implementation.
//!
//! Every service has the signature
//!
//! ```ignore
//! fn service(k: &mut Kernel, caller: usize) -> Result<NextTask, SysError>;
//! ```
//!
//! where `caller` is the pool index of the task that trapped. Arguments
//! come out of the caller's saved frame through the `ArchState` accessors;
//! success return values go back the same way, into the saved `a0`. The
//! common wrapper turns a `SysError` into a negative response code, and a
//! `NextTask::Other` hint into a scheduler pass. Services that don't ask
//! for a reschedule leave the caller on the CPU.
//!
//! The trap layer guarantees we run with traps disabled, so everything in
//! here -- including the raw dereferences behind PEEK, POKE, and the mutex
//! services -- is serialized with all other kernel activity.

use core::convert::TryFrom;

use abi::{Sysnum, SysError, TaskId};
use unwrap_lite::UnwrapLite;

use crate::arch;
use crate::startup::Kernel;
use crate::task::{ArchState, NextTask};
use crate::umem::USlice;

/// Decodes and executes the syscall the current task trapped with, then
/// reports which pool slot should hold the CPU next.
pub fn safe_syscall_entry(k: &mut Kernel, caller: usize) -> usize {
    let nr = k.tasks.task(caller).save().syscall_descriptor();
    let res = match Sysnum::try_from(nr) {
        Ok(Sysnum::Yield) => Ok(NextTask::Other),
        Ok(Sysnum::Write) => sys_write(k, caller),
        Ok(Sysnum::Sleep) => sys_sleep(k, caller),
        Ok(Sysnum::Lock) => sys_lock(k, caller),
        Ok(Sysnum::Unlock) => sys_unlock(k, caller),
        Ok(Sysnum::GetTasks) => sys_get_tasks(k, caller),
        Ok(Sysnum::Peek) => sys_peek(k, caller),
        Ok(Sysnum::Poke) => sys_poke(k, caller),
        Ok(Sysnum::HeapInfo) => sys_heap_info(k, caller),
        Ok(Sysnum::Malloc) => sys_malloc(k, caller),
        Ok(Sysnum::Free) => sys_free(k, caller),
        Ok(Sysnum::Defrag) => sys_defrag(k, caller),
        Ok(Sysnum::Suspend) => sys_suspend(k, caller),
        Ok(Sysnum::Resume) => sys_resume(k, caller),
        Ok(Sysnum::FsCreate) => sys_fs_create(k, caller),
        Ok(Sysnum::FsWrite) => sys_fs_write(k, caller),
        Ok(Sysnum::FsRead) => sys_fs_read(k, caller),
        Ok(Sysnum::FsList) => sys_fs_list(k, caller),
        Ok(Sysnum::FsDelete) => sys_fs_delete(k, caller),
        Ok(Sysnum::FsFormat) => sys_fs_format(k, caller),
        Err(_) => Err(SysError::NoSys),
    };
    match res {
        Ok(NextTask::Same) => k.tasks.current_index(),
        Ok(NextTask::Other) => k.tasks.schedule(arch::now()),
        Err(e) => {
            k.tasks.task_mut(caller).save_mut().set_error_response(e);
            k.tasks.current_index()
        }
    }
}

fn sys_write(k: &mut Kernel, caller: usize) -> Result<NextTask, SysError> {
    let byte = k.tasks.task(caller).save().arg0() as u8;
    arch::putc(byte);
    k.tasks.task_mut(caller).save_mut().ret0(0);
    Ok(NextTask::Same)
}

fn sys_sleep(k: &mut Kernel, caller: usize) -> Result<NextTask, SysError> {
    let ms = k.tasks.task(caller).save().arg0() as u32;
    let wake = arch::now().offset_by_ms(ms, arch::clock_freq_khz());
    k.tasks.task_mut(caller).save_mut().ret0(0);
    k.tasks.sleep_current(wake);
    Ok(NextTask::Other)
}

/// Fetches a shared reference to the caller-owned mutex cell named by the
/// first syscall argument.
fn mutex_arg(
    k: &Kernel,
    caller: usize,
) -> Result<&'static abi::Mutex, SysError> {
    let addr = k.tasks.task(caller).save().arg0();
    if addr == 0 || addr % core::mem::align_of::<abi::Mutex>() != 0 {
        return Err(SysError::BadAddress);
    }
    // Safety: single privilege level, no protection to consult; the cell is
    // only ever mutated here, inside the trap critical section.
    Ok(unsafe { &*(addr as *const abi::Mutex) })
}

fn sys_lock(k: &mut Kernel, caller: usize) -> Result<NextTask, SysError> {
    let mutex = mutex_arg(k, caller)?;
    let owner = u32::from(k.tasks.task(caller).id().0);
    // Safety: trap serialization, see mutex_arg.
    let got = unsafe { mutex.try_acquire(owner) };
    k.tasks.task_mut(caller).save_mut().ret0(got as usize);
    Ok(NextTask::Same)
}

fn sys_unlock(k: &mut Kernel, caller: usize) -> Result<NextTask, SysError> {
    let mutex = mutex_arg(k, caller)?;
    let owner = u32::from(k.tasks.task(caller).id().0);
    // Safety: trap serialization, see mutex_arg.
    unsafe { mutex.release(owner) };
    k.tasks.task_mut(caller).save_mut().ret0(0);
    Ok(NextTask::Same)
}

fn sys_get_tasks(
    k: &mut Kernel,
    caller: usize,
) -> Result<NextTask, SysError> {
    let (addr, cap) = {
        let save = k.tasks.task(caller).save();
        (save.arg0(), save.arg1())
    };
    let n = cap.min(k.tasks.count());
    let mut slice = USlice::<u8>::from_raw(addr, n * abi::SNAPSHOT_SIZE)?;
    // Safety: trap critical section; the caller's buffer cannot move or be
    // observed until we return to it.
    let bytes = unsafe { slice.assume_writable() };
    let copied = k.tasks.snapshot(n, |i, snap| {
        let chunk =
            &mut bytes[i * abi::SNAPSHOT_SIZE..(i + 1) * abi::SNAPSHOT_SIZE];
        // Cannot fail: the chunk is exactly one record long.
        ssmarshal::serialize(chunk, &snap).unwrap_lite();
    });
    k.tasks.task_mut(caller).save_mut().ret0(copied);
    Ok(NextTask::Same)
}

fn word_addr_arg(save: &arch::SavedState) -> Result<usize, SysError> {
    let addr = save.arg0();
    if addr == 0 || addr % core::mem::align_of::<u32>() != 0 {
        return Err(SysError::BadAddress);
    }
    Ok(addr)
}

fn sys_peek(k: &mut Kernel, caller: usize) -> Result<NextTask, SysError> {
    let addr = word_addr_arg(k.tasks.task(caller).save())?;
    // Safety: this is the debug gate; the caller vouches for the address,
    // and on this single-privilege hardware we can't do better.
    let value = unsafe { core::ptr::read_volatile(addr as *const u32) };
    k.tasks.task_mut(caller).save_mut().ret0(value as usize);
    Ok(NextTask::Same)
}

fn sys_poke(k: &mut Kernel, caller: usize) -> Result<NextTask, SysError> {
    let save = k.tasks.task(caller).save();
    let addr = word_addr_arg(save)?;
    let value = save.arg1() as u32;
    // Safety: as for PEEK.
    unsafe { core::ptr::write_volatile(addr as *mut u32, value) };
    k.tasks.task_mut(caller).save_mut().ret0(0);
    Ok(NextTask::Same)
}

fn sys_heap_info(
    k: &mut Kernel,
    caller: usize,
) -> Result<NextTask, SysError> {
    let mut out = arch::KlogWriter;
    // Serial output is best-effort; a full UART FIFO must not fail the
    // syscall.
    let _ = k.heap.dump(&mut out);
    k.tasks.task_mut(caller).save_mut().ret0(0);
    Ok(NextTask::Same)
}

fn sys_malloc(k: &mut Kernel, caller: usize) -> Result<NextTask, SysError> {
    let size = k.tasks.task(caller).save().arg0();
    let addr = match k.heap.alloc(size) {
        Some(off) => k.heap.base_addr() + off as usize,
        None => 0,
    };
    k.tasks.task_mut(caller).save_mut().ret0(addr);
    Ok(NextTask::Same)
}

fn sys_free(k: &mut Kernel, caller: usize) -> Result<NextTask, SysError> {
    let addr = k.tasks.task(caller).save().arg0();
    k.heap.free_at(addr)?;
    k.tasks.task_mut(caller).save_mut().ret0(0);
    Ok(NextTask::Same)
}

fn sys_defrag(k: &mut Kernel, caller: usize) -> Result<NextTask, SysError> {
    k.heap.defrag();
    k.tasks.task_mut(caller).save_mut().ret0(0);
    Ok(NextTask::Same)
}

fn sys_suspend(k: &mut Kernel, caller: usize) -> Result<NextTask, SysError> {
    let id = task_id_arg(k.tasks.task(caller).save())?;
    let hint = k.tasks.suspend(id)?;
    k.tasks.task_mut(caller).save_mut().ret0(0);
    Ok(hint)
}

fn sys_resume(k: &mut Kernel, caller: usize) -> Result<NextTask, SysError> {
    let id = task_id_arg(k.tasks.task(caller).save())?;
    k.tasks.resume(id)?;
    k.tasks.task_mut(caller).save_mut().ret0(0);
    Ok(NextTask::Same)
}

fn task_id_arg(save: &arch::SavedState) -> Result<TaskId, SysError> {
    let raw = save.arg0();
    u8::try_from(raw)
        .map(TaskId)
        .map_err(|_| SysError::NotFound)
}

/// Builds the (name pointer, name length) pair every file syscall leads
/// with into a readable slice handle.
fn name_arg(addr: usize, len: usize) -> Result<USlice<u8>, SysError> {
    if len > abi::FS_NAME_LEN {
        return Err(SysError::NameTooLong);
    }
    USlice::from_raw(addr, len)
}

fn sys_fs_create(
    k: &mut Kernel,
    caller: usize,
) -> Result<NextTask, SysError> {
    let (addr, len) = {
        let save = k.tasks.task(caller).save();
        (save.arg0(), save.arg1())
    };
    let name = name_arg(addr, len)?;
    // Safety: trap critical section.
    k.fs.create(unsafe { name.assume_readable() })?;
    k.tasks.task_mut(caller).save_mut().ret0(0);
    Ok(NextTask::Same)
}

fn sys_fs_write(
    k: &mut Kernel,
    caller: usize,
) -> Result<NextTask, SysError> {
    let (n_addr, n_len, d_addr, d_len) = {
        let save = k.tasks.task(caller).save();
        (save.arg0(), save.arg1(), save.arg2(), save.arg3())
    };
    let name = name_arg(n_addr, n_len)?;
    let data = USlice::<u8>::from_raw(d_addr, d_len)?;
    // Safety: trap critical section.
    let written = k.fs.write(unsafe { name.assume_readable() }, unsafe {
        data.assume_readable()
    })?;
    k.tasks.task_mut(caller).save_mut().ret0(written);
    Ok(NextTask::Same)
}

fn sys_fs_read(k: &mut Kernel, caller: usize) -> Result<NextTask, SysError> {
    let (n_addr, n_len, b_addr, b_len) = {
        let save = k.tasks.task(caller).save();
        (save.arg0(), save.arg1(), save.arg2(), save.arg3())
    };
    let name = name_arg(n_addr, n_len)?;
    let mut buf = USlice::<u8>::from_raw(b_addr, b_len)?;
    // Safety: trap critical section; name and destination are task memory
    // and cannot overlap the image the kernel reads from.
    let copied = k.fs.read(unsafe { name.assume_readable() }, unsafe {
        buf.assume_writable()
    })?;
    k.tasks.task_mut(caller).save_mut().ret0(copied);
    Ok(NextTask::Same)
}

fn sys_fs_list(k: &mut Kernel, caller: usize) -> Result<NextTask, SysError> {
    let (addr, len) = {
        let save = k.tasks.task(caller).save();
        (save.arg0(), save.arg1())
    };
    let mut buf = USlice::<u8>::from_raw(addr, len)?;
    // Safety: trap critical section.
    k.fs.list(unsafe { buf.assume_writable() })?;
    k.tasks.task_mut(caller).save_mut().ret0(0);
    Ok(NextTask::Same)
}

fn sys_fs_delete(
    k: &mut Kernel,
    caller: usize,
) -> Result<NextTask, SysError> {
    let (addr, len) = {
        let save = k.tasks.task(caller).save();
        (save.arg0(), save.arg1())
    };
    let name = name_arg(addr, len)?;
    // Safety: trap critical section.
    k.fs.delete(unsafe { name.assume_readable() })?;
    k.tasks.task_mut(caller).save_mut().ret0(0);
    Ok(NextTask::Same)
}

fn sys_fs_format(
    k: &mut Kernel,
    caller: usize,
) -> Result<NextTask, SysError> {
    k.fs.format();
    k.tasks.task_mut(caller).save_mut().ret0(0);
    Ok(NextTask::Same)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::fake;
    use crate::fs::Fs;
    use crate::heap::Heap;
    use crate::irq::IrqTable;
    use crate::task::TaskTable;
    use abi::{Priority, TaskState};

    const ENTRY: usize = 0x2000_0000;
    const CYCLES_PER_MS: u32 = 1_000;

    /// The fake arch's clock and serial line are process-wide, so tests
    /// that go through a rig take turns.
    static RIG_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    struct Rig {
        _exclusive: std::sync::MutexGuard<'static, ()>,
        // Boxed so the forged frames, which point into the task control
        // blocks, survive the Rig moving around.
        k: Box<Kernel>,
        _backing: Box<[u64]>,
    }

    fn rig(tasks: &[(&str, u8)]) -> Rig {
        let exclusive =
            RIG_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        fake::set_now(0);
        arch::set_clock_freq(CYCLES_PER_MS);
        let mut backing = vec![0u64; 8192].into_boxed_slice();
        let mut heap = unsafe {
            Heap::new(backing.as_mut_ptr() as *mut u8, 8192 * 8)
        };
        let fs = Fs::mount(&mut heap).unwrap();
        let mut table = TaskTable::new();
        for (name, prio) in tasks {
            table.create(ENTRY, name, Priority(*prio)).unwrap();
        }
        let mut k = Box::new(Kernel {
            tasks: table,
            heap,
            fs,
            irq: IrqTable::new(),
        });
        k.tasks.initialize_frames();
        k.tasks.schedule(arch::now());
        Rig {
            _exclusive: exclusive,
            k,
            _backing: backing,
        }
    }

    /// Issues a syscall from whichever task currently holds the CPU and
    /// returns the raw response register from its frame.
    fn gate_raw(rig: &mut Rig, nr: Sysnum, args: [usize; 6]) -> usize {
        let caller = rig.k.tasks.current_index();
        rig.k
            .tasks
            .task_mut(caller)
            .save_mut()
            .set_syscall(nr as u32, args);
        safe_syscall_entry(&mut rig.k, caller);
        rig.k.tasks.task(caller).save().arg0()
    }

    /// Like `gate_raw`, narrowed to the 32-bit response word; fine for
    /// everything except MALLOC's host-width addresses.
    fn gate(rig: &mut Rig, nr: Sysnum, args: [usize; 6]) -> u32 {
        gate_raw(rig, nr, args) as u32
    }

    fn err(e: SysError) -> u32 {
        e.response_code()
    }

    #[test]
    fn unknown_syscall_number_is_refused() {
        let mut r = rig(&[("idle", 0), ("a", 1)]);
        let caller = r.k.tasks.current_index();
        r.k.tasks
            .task_mut(caller)
            .save_mut()
            .set_syscall(999, [0; 6]);
        safe_syscall_entry(&mut r.k, caller);
        assert_eq!(
            r.k.tasks.task(caller).save().arg0() as u32,
            err(SysError::NoSys)
        );
    }

    #[test]
    fn yield_rotates_within_the_band() {
        let mut r = rig(&[("idle", 0), ("a", 1), ("b", 1)]);
        assert_eq!(r.k.tasks.current_index(), 1);
        gate(&mut r, Sysnum::Yield, [0; 6]);
        assert_eq!(r.k.tasks.current_index(), 2);
        gate(&mut r, Sysnum::Yield, [0; 6]);
        assert_eq!(r.k.tasks.current_index(), 1);
    }

    #[test]
    fn write_reaches_the_serial_line() {
        let mut r = rig(&[("idle", 0), ("a", 1)]);
        fake::take_serial();
        assert_eq!(gate(&mut r, Sysnum::Write, [b'Q' as usize, 0, 0, 0, 0, 0]), 0);
        assert_eq!(fake::take_serial(), "Q");
    }

    #[test]
    fn sleep_blocks_caller_until_wake_time() {
        let mut r = rig(&[("idle", 0), ("sleeper", 1)]);
        fake::set_now(5_000);
        assert_eq!(gate(&mut r, Sysnum::Sleep, [100, 0, 0, 0, 0, 0]), 0);

        // The caller went to sleep and idle took over.
        assert_eq!(r.k.tasks.task(1).state(), TaskState::Blocked);
        assert_eq!(
            r.k.tasks.task(1).wake_at().map(u64::from),
            Some(5_000 + 100 * u64::from(CYCLES_PER_MS))
        );
        assert_eq!(r.k.tasks.current_index(), 0);

        // One tick short: still asleep.
        fake::set_now(5_000 + 100 * u64::from(CYCLES_PER_MS) - 1);
        r.k.tasks.schedule(arch::now());
        assert_eq!(r.k.tasks.current_index(), 0);

        fake::set_now(5_000 + 100 * u64::from(CYCLES_PER_MS));
        r.k.tasks.schedule(arch::now());
        assert_eq!(r.k.tasks.current_index(), 1);
    }

    #[test]
    fn lock_is_exclusive_until_unlocked_by_owner() {
        let mut r = rig(&[("idle", 0), ("a", 1), ("b", 1)]);
        let m = abi::Mutex::new();
        let args = [&m as *const _ as usize, 0, 0, 0, 0, 0];

        // a takes the lock.
        assert_eq!(r.k.tasks.current_index(), 1);
        assert_eq!(gate(&mut r, Sysnum::Lock, args), 1);

        // b contends: busy, and its own unlock changes nothing.
        gate(&mut r, Sysnum::Yield, [0; 6]);
        assert_eq!(r.k.tasks.current_index(), 2);
        assert_eq!(gate(&mut r, Sysnum::Lock, args), 0);
        assert_eq!(gate(&mut r, Sysnum::Unlock, args), 0);
        assert_eq!(gate(&mut r, Sysnum::Lock, args), 0);

        // Owner releases; b can now acquire.
        gate(&mut r, Sysnum::Yield, [0; 6]);
        assert_eq!(r.k.tasks.current_index(), 1);
        assert_eq!(gate(&mut r, Sysnum::Unlock, args), 0);
        gate(&mut r, Sysnum::Yield, [0; 6]);
        assert_eq!(gate(&mut r, Sysnum::Lock, args), 1);
    }

    #[test]
    fn lock_rejects_junk_pointers() {
        let mut r = rig(&[("idle", 0), ("a", 1)]);
        assert_eq!(
            gate(&mut r, Sysnum::Lock, [0, 0, 0, 0, 0, 0]),
            err(SysError::BadAddress)
        );
        assert_eq!(
            gate(&mut r, Sysnum::Lock, [0x1001, 0, 0, 0, 0, 0]),
            err(SysError::BadAddress)
        );
    }

    #[test]
    fn malloc_free_defrag_flow() {
        let mut r = rig(&[("idle", 0), ("a", 1)]);
        let a = gate_raw(&mut r, Sysnum::Malloc, [64, 0, 0, 0, 0, 0]);
        let b = gate_raw(&mut r, Sysnum::Malloc, [64, 0, 0, 0, 0, 0]);
        assert_ne!(a, 0);
        assert_ne!(b, 0);
        assert_ne!(a, b);
        assert_eq!(a % 4, 0);

        assert_eq!(gate(&mut r, Sysnum::Free, [a, 0, 0, 0, 0, 0]), 0);
        // Double free is refused.
        assert_eq!(
            gate(&mut r, Sysnum::Free, [a, 0, 0, 0, 0, 0]),
            err(SysError::BadAddress)
        );
        assert_eq!(gate(&mut r, Sysnum::Free, [b, 0, 0, 0, 0, 0]), 0);
        assert_eq!(gate(&mut r, Sysnum::Defrag, [0; 6]), 0);

        // An impossible request reports OOM as a null address, not an
        // error code.
        assert_eq!(
            gate(&mut r, Sysnum::Malloc, [usize::MAX / 2, 0, 0, 0, 0, 0]),
            0
        );
    }

    #[test]
    fn peek_and_poke_move_words() {
        let mut r = rig(&[("idle", 0), ("a", 1)]);
        let mut word: u32 = 0xfeed_f00d;
        let addr = &mut word as *mut u32 as usize;
        assert_eq!(
            gate(&mut r, Sysnum::Peek, [addr, 0, 0, 0, 0, 0]),
            0xfeed_f00d
        );
        assert_eq!(
            gate(&mut r, Sysnum::Poke, [addr, 0x1234_5678, 0, 0, 0, 0]),
            0
        );
        assert_eq!(word, 0x1234_5678);
        assert_eq!(
            gate(&mut r, Sysnum::Peek, [1, 0, 0, 0, 0, 0]),
            err(SysError::BadAddress)
        );
    }

    #[test]
    fn heap_info_emits_a_map() {
        let mut r = rig(&[("idle", 0), ("a", 1)]);
        fake::take_serial();
        assert_eq!(gate(&mut r, Sysnum::HeapInfo, [0; 6]), 0);
        let out = fake::take_serial();
        assert!(out.contains("heap:"));
        assert!(out.contains("used")); // the fs image allocation
    }

    #[test]
    fn get_tasks_marshals_snapshots() {
        let mut r = rig(&[("idle", 0), ("monitor", 2)]);
        let mut buf = [0u8; abi::SNAPSHOT_SIZE * 8];
        let n = gate(
            &mut r,
            Sysnum::GetTasks,
            [buf.as_mut_ptr() as usize, 8, 0, 0, 0, 0],
        );
        assert_eq!(n, 2);

        let (idle, _) =
            ssmarshal::deserialize::<abi::TaskSnapshot>(&buf).unwrap();
        assert_eq!(idle.id, 0);
        assert_eq!(idle.priority, 0);
        let (mon, _) = ssmarshal::deserialize::<abi::TaskSnapshot>(
            &buf[abi::SNAPSHOT_SIZE..],
        )
        .unwrap();
        assert_eq!(mon.id, 1);
        assert_eq!(mon.state, u32::from(TaskState::Running));
        assert_eq!(&mon.name[..7], b"monitor");

        // Capacity clips the copy.
        let n = gate(
            &mut r,
            Sysnum::GetTasks,
            [buf.as_mut_ptr() as usize, 1, 0, 0, 0, 0],
        );
        assert_eq!(n, 1);

        // A null buffer with nonzero capacity is refused.
        let n = gate(&mut r, Sysnum::GetTasks, [0, 4, 0, 0, 0, 0]);
        assert_eq!(n, err(SysError::BadAddress));
    }

    #[test]
    fn suspend_and_resume_through_the_gate() {
        let mut r = rig(&[("idle", 0), ("a", 1), ("b", 1)]);
        assert_eq!(r.k.tasks.current_index(), 1);

        // Park b; the CPU stays with a.
        assert_eq!(gate(&mut r, Sysnum::Suspend, [2, 0, 0, 0, 0, 0]), 0);
        assert_eq!(r.k.tasks.current_index(), 1);
        assert_eq!(r.k.tasks.task(2).state(), TaskState::Suspended);

        // Idle cannot be parked, unknown ids are reported.
        assert_eq!(
            gate(&mut r, Sysnum::Suspend, [0, 0, 0, 0, 0, 0]),
            err(SysError::RefusedIdle)
        );
        assert_eq!(
            gate(&mut r, Sysnum::Suspend, [9, 0, 0, 0, 0, 0]),
            err(SysError::NotFound)
        );

        assert_eq!(gate(&mut r, Sysnum::Resume, [2, 0, 0, 0, 0, 0]), 0);
        assert_eq!(r.k.tasks.task(2).state(), TaskState::Ready);

        // Self-suspend gives up the CPU on the spot.
        assert_eq!(gate(&mut r, Sysnum::Suspend, [1, 0, 0, 0, 0, 0]), 0);
        assert_eq!(r.k.tasks.current_index(), 2);
        assert_eq!(r.k.tasks.task(1).state(), TaskState::Suspended);
    }

    #[test]
    fn file_lifecycle_through_the_gate() {
        let mut r = rig(&[("idle", 0), ("a", 1)]);
        let name = b"config";
        let name_args =
            |rest: [usize; 4]| -> [usize; 6] {
                [
                    name.as_ptr() as usize,
                    name.len(),
                    rest[0],
                    rest[1],
                    rest[2],
                    rest[3],
                ]
            };

        assert_eq!(gate(&mut r, Sysnum::FsCreate, name_args([0; 4])), 0);
        assert_eq!(
            gate(&mut r, Sysnum::FsCreate, name_args([0; 4])),
            err(SysError::Exists)
        );

        let payload = b"baud=115200\n";
        let n = gate(
            &mut r,
            Sysnum::FsWrite,
            name_args([payload.as_ptr() as usize, payload.len(), 0, 0]),
        );
        assert_eq!(n as usize, payload.len());

        let mut readback = [0u8; 64];
        let n = gate(
            &mut r,
            Sysnum::FsRead,
            name_args([readback.as_mut_ptr() as usize, readback.len(), 0, 0]),
        );
        assert_eq!(n as usize, payload.len());
        assert_eq!(&readback[..payload.len()], payload);

        let mut listing = [0u8; 64];
        assert_eq!(
            gate(
                &mut r,
                Sysnum::FsList,
                [listing.as_mut_ptr() as usize, listing.len(), 0, 0, 0, 0],
            ),
            0
        );
        assert!(listing.starts_with(b"  config\n"));

        assert_eq!(gate(&mut r, Sysnum::FsDelete, name_args([0; 4])), 0);
        assert_eq!(
            gate(&mut r, Sysnum::FsDelete, name_args([0; 4])),
            err(SysError::NotFound)
        );

        // An over-long name never reaches the image.
        let long = [b'n'; abi::FS_NAME_LEN + 1];
        assert_eq!(
            gate(
                &mut r,
                Sysnum::FsCreate,
                [long.as_ptr() as usize, long.len(), 0, 0, 0, 0],
            ),
            err(SysError::NameTooLong)
        );

        // FORMAT wipes the namespace.
        assert_eq!(gate(&mut r, Sysnum::FsCreate, name_args([0; 4])), 0);
        assert_eq!(gate(&mut r, Sysnum::FsFormat, [0; 6]), 0);
        assert_eq!(
            gate(&mut r, Sysnum::FsDelete, name_args([0; 4])),
            err(SysError::NotFound)
        );
    }
}
