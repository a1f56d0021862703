// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/

//! CLINT timer handling.
//!
//! Single-hart only; further harts would have their own mtimecmp at 0x8
//! intervals from hart 0's.
//!
//! RISC-V Privileged Architecture Manual,
//! 3.2.1 Machine Timer Registers (mtime and mtimecmp)

use super::clock_freq_khz;

const CLINT_BASE: usize = 0x0200_0000;
const MTIMECMP: usize = CLINT_BASE + 0x4000;
const MTIME: usize = CLINT_BASE + 0xBFF8;

/// Cycles in one scheduling slice: a millisecond. Short enough that sleep
/// wakeups land well inside their tolerance, long enough not to drown the
/// system in timer traps.
fn slice_cycles() -> u64 {
    u64::from(clock_freq_khz())
}

/// Reads the 64-bit mtime counter on a 32-bit bus. The high half is read
/// on both sides of the low half and the read retried on a carry, so a
/// tick crossing the 32-bit boundary can't tear the value.
pub fn cycles() -> u64 {
    let lo_reg = MTIME as *const u32;
    let hi_reg = (MTIME + 4) as *const u32;
    loop {
        // Safety: fixed CLINT MMIO addresses for this platform.
        let (hi, lo, hi2) = unsafe {
            (
                hi_reg.read_volatile(),
                lo_reg.read_volatile(),
                hi_reg.read_volatile(),
            )
        };
        if hi == hi2 {
            return u64::from(hi) << 32 | u64::from(lo);
        }
    }
}

/// Moves mtimecmp one slice forward. This also clears the pending timer
/// interrupt.
pub fn reset_timer() {
    // Safety: CLINT MMIO; only ever touched with traps disabled, so the
    // non-atomic 64-bit access can't be observed half-done.
    unsafe {
        let mtimecmp = core::ptr::read_volatile(MTIMECMP as *mut u64);
        core::ptr::write_volatile(
            MTIMECMP as *mut u64,
            mtimecmp + slice_cycles(),
        );
    }
}

/// Seeds mtimecmp from the live counter so the first slice starts now.
///
/// # Safety
///
/// Call once during boot, before the timer interrupt is enabled.
pub unsafe fn arm_first_slice() {
    unsafe {
        core::ptr::write_volatile(
            MTIMECMP as *mut u64,
            cycles() + slice_cycles(),
        );
    }
}
