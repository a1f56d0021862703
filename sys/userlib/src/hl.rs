// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! High-level syscall conveniences.
//!
//! Nothing in here adds capability over the raw `sys_*` calls; it adds the
//! idioms: the try/yield/retry loop that stands in for a blocking mutex,
//! a `fmt::Write` console, and snapshot decoding.

use crate::{
    sys_get_tasks, sys_try_lock, sys_unlock, sys_write_byte, sys_yield,
    Mutex, SysError, TaskSnapshot, SNAPSHOT_SIZE,
};

/// Acquires `mutex`, yielding between attempts. The kernel never blocks a
/// LOCK caller; waiting is cooperative by construction, so a priority peer
/// holding the lock gets CPU time to release it.
pub fn lock(mutex: &Mutex) {
    while !sys_try_lock(mutex) {
        sys_yield();
    }
}

/// Releases `mutex`. A no-op unless the caller holds it.
pub fn unlock(mutex: &Mutex) {
    sys_unlock(mutex);
}

/// Runs `body` with `mutex` held.
pub fn with_lock<R>(mutex: &Mutex, body: impl FnOnce() -> R) -> R {
    lock(mutex);
    let result = body();
    unlock(mutex);
    result
}

/// The serial line as a `fmt::Write` sink, one WRITE call per byte.
/// Interleaving with other tasks' output is the caller's problem; share a
/// `Mutex` if it matters.
pub struct Console;

impl core::fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for b in s.bytes() {
            sys_write_byte(b);
        }
        Ok(())
    }
}

/// Emits a string on the serial line.
pub fn write_str(s: &str) {
    for b in s.bytes() {
        sys_write_byte(b);
    }
}

/// Fetches up to `scratch.len() / SNAPSHOT_SIZE` task snapshots and hands
/// each decoded record to `each`. Returns how many there were.
pub fn with_tasks(
    scratch: &mut [u8],
    mut each: impl FnMut(&TaskSnapshot),
) -> Result<usize, SysError> {
    let cap = scratch.len() / SNAPSHOT_SIZE;
    let n = sys_get_tasks(scratch, cap)?;
    for i in 0..n {
        let (snap, _) = ssmarshal::deserialize::<TaskSnapshot>(
            &scratch[i * SNAPSHOT_SIZE..],
        )
        .map_err(|_| SysError::BadAddress)?;
        each(&snap);
    }
    Ok(n)
}
