// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Task-side interface to the kernel.
//!
//! Each `sys_*` function below marshals its arguments into `a0..a5`, the
//! syscall number into `a7`, and issues `ecall`; the kernel's response
//! comes back in `a0`. The raw wrappers mirror the syscall table one to
//! one; the [`hl`] module layers the conveniences on top (cooperative
//! mutex acquisition, formatted serial output, snapshot decoding).
//!
//! Responses use the shared convention: non-negative payload on success,
//! small negative code on failure; [`abi::check_response`] splits the two.

#![no_std]

pub use abi::{
    check_response, Mutex, SysError, Sysnum, TaskSnapshot, SNAPSHOT_SIZE,
};

pub mod hl;

cfg_if::cfg_if! {
    if #[cfg(target_arch = "riscv32")] {
        #[path = "arch/riscv32.rs"]
        mod arch;
    } else {
        // Host stand-in so the workspace builds everywhere; there is no
        // kernel to call into.
        mod arch {
            pub unsafe fn ecall(_nr: u32, _args: [usize; 6]) -> usize {
                unimplemented!();
            }
        }
    }
}

#[inline(always)]
fn syscall(nr: Sysnum, args: [usize; 6]) -> usize {
    // Safety: the kernel treats every argument as untrusted; nothing we
    // pass here can violate an ABI precondition.
    unsafe { arch::ecall(nr as u32, args) }
}

/// Offers the CPU up for rescheduling.
#[inline(always)]
pub fn sys_yield() {
    syscall(Sysnum::Yield, [0; 6]);
}

/// Emits one byte on the serial line.
#[inline(always)]
pub fn sys_write_byte(b: u8) {
    syscall(Sysnum::Write, [b as usize, 0, 0, 0, 0, 0]);
}

/// Blocks the calling task for at least `ms` milliseconds.
#[inline(always)]
pub fn sys_sleep(ms: u32) {
    syscall(Sysnum::Sleep, [ms as usize, 0, 0, 0, 0, 0]);
}

/// Tries to take `mutex` for the calling task. `true` on acquisition,
/// `false` on contention; never blocks. See `hl::lock` for the retry
/// idiom.
#[inline(always)]
pub fn sys_try_lock(mutex: &Mutex) -> bool {
    syscall(
        Sysnum::Lock,
        [mutex as *const Mutex as usize, 0, 0, 0, 0, 0],
    ) == 1
}

/// Releases `mutex` if the calling task holds it; a no-op otherwise.
#[inline(always)]
pub fn sys_unlock(mutex: &Mutex) {
    syscall(
        Sysnum::Unlock,
        [mutex as *const Mutex as usize, 0, 0, 0, 0, 0],
    );
}

/// Copies up to `cap` marshalled task snapshots into `scratch`. Returns
/// the number copied; decode them with `hl::with_tasks`.
#[inline(always)]
pub fn sys_get_tasks(
    scratch: &mut [u8],
    cap: usize,
) -> Result<usize, SysError> {
    check_response(syscall(
        Sysnum::GetTasks,
        [scratch.as_mut_ptr() as usize, cap, 0, 0, 0, 0],
    ))
    .map(|n| n as usize)
}

/// Reads a 32-bit word from an arbitrary address. Debug gate; a refusal
/// code is indistinguishable from memory that happens to hold one.
#[inline(always)]
pub fn sys_peek(addr: usize) -> u32 {
    syscall(Sysnum::Peek, [addr, 0, 0, 0, 0, 0]) as u32
}

/// Writes a 32-bit word to an arbitrary address. Debug gate.
#[inline(always)]
pub fn sys_poke(addr: usize, value: u32) {
    syscall(Sysnum::Poke, [addr, value as usize, 0, 0, 0, 0]);
}

/// Prints the kernel's heap map on the serial line.
#[inline(always)]
pub fn sys_heap_info() {
    syscall(Sysnum::HeapInfo, [0; 6]);
}

/// Allocates `size` bytes from the kernel heap. Returns the payload
/// address, or zero when the heap is exhausted.
#[inline(always)]
pub fn sys_malloc(size: usize) -> usize {
    syscall(Sysnum::Malloc, [size, 0, 0, 0, 0, 0])
}

/// Gives an allocation back. Refused (with the heap untouched) unless
/// `addr` is a live payload address.
#[inline(always)]
pub fn sys_free(addr: usize) -> Result<(), SysError> {
    check_response(syscall(Sysnum::Free, [addr, 0, 0, 0, 0, 0]))
        .map(|_| ())
}

/// Runs a heap coalesce pass.
#[inline(always)]
pub fn sys_defrag() {
    syscall(Sysnum::Defrag, [0; 6]);
}

/// Parks a task until `sys_resume`. Parking yourself takes effect
/// immediately.
#[inline(always)]
pub fn sys_suspend(id: u8) -> Result<(), SysError> {
    check_response(syscall(Sysnum::Suspend, [id as usize, 0, 0, 0, 0, 0]))
        .map(|_| ())
}

/// Unparks a suspended task.
#[inline(always)]
pub fn sys_resume(id: u8) -> Result<(), SysError> {
    check_response(syscall(Sysnum::Resume, [id as usize, 0, 0, 0, 0, 0]))
        .map(|_| ())
}

/// Creates an empty file.
#[inline(always)]
pub fn fs_create(name: &str) -> Result<(), SysError> {
    check_response(syscall(
        Sysnum::FsCreate,
        [name.as_ptr() as usize, name.len(), 0, 0, 0, 0],
    ))
    .map(|_| ())
}

/// Replaces a file's contents. Returns the bytes actually stored, which
/// can fall short of `data.len()` if the disk fills.
#[inline(always)]
pub fn fs_write(name: &str, data: &[u8]) -> Result<usize, SysError> {
    check_response(syscall(
        Sysnum::FsWrite,
        [
            name.as_ptr() as usize,
            name.len(),
            data.as_ptr() as usize,
            data.len(),
            0,
            0,
        ],
    ))
    .map(|n| n as usize)
}

/// Reads a file into `buf`. Returns the bytes copied.
#[inline(always)]
pub fn fs_read(name: &str, buf: &mut [u8]) -> Result<usize, SysError> {
    check_response(syscall(
        Sysnum::FsRead,
        [
            name.as_ptr() as usize,
            name.len(),
            buf.as_mut_ptr() as usize,
            buf.len(),
            0,
            0,
        ],
    ))
    .map(|n| n as usize)
}

/// Writes a NUL-terminated directory listing into `buf`.
#[inline(always)]
pub fn fs_list(buf: &mut [u8]) -> Result<(), SysError> {
    check_response(syscall(
        Sysnum::FsList,
        [buf.as_mut_ptr() as usize, buf.len(), 0, 0, 0, 0],
    ))
    .map(|_| ())
}

/// Removes a file.
#[inline(always)]
pub fn fs_delete(name: &str) -> Result<(), SysError> {
    check_response(syscall(
        Sysnum::FsDelete,
        [name.as_ptr() as usize, name.len(), 0, 0, 0, 0],
    ))
    .map(|_| ())
}

/// Re-formats the file system, losing everything in it.
#[inline(always)]
pub fn fs_format() -> Result<(), SysError> {
    check_response(syscall(Sysnum::FsFormat, [0; 6])).map(|_| ())
}
