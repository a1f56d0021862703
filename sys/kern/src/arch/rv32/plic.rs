// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! PLIC access for hart 0, machine mode (context 0).

const PLIC_BASE: usize = 0x0c00_0000;
const PRIORITY_BASE: usize = PLIC_BASE;
const ENABLE_BASE: usize = PLIC_BASE + 0x2000;
const THRESHOLD: usize = PLIC_BASE + 0x20_0000;
const CLAIM: usize = PLIC_BASE + 0x20_0004;

/// Opens the gate: threshold 0 lets every nonzero-priority source through.
pub fn init() {
    // Safety: fixed PLIC MMIO addresses for this platform.
    unsafe {
        (THRESHOLD as *mut u32).write_volatile(0);
    }
}

pub fn set_priority(source: u32, level: u32) {
    let reg = (PRIORITY_BASE + 4 * source as usize) as *mut u32;
    // Safety: as for init.
    unsafe {
        reg.write_volatile(level);
    }
}

pub fn enable(source: u32) {
    let reg = (ENABLE_BASE + 4 * (source as usize / 32)) as *mut u32;
    // Safety: as for init; read-modify-write is fine, this runs with traps
    // disabled or during boot.
    unsafe {
        reg.write_volatile(reg.read_volatile() | 1 << (source % 32));
    }
}

/// Asks the controller for the highest-priority pending source. Zero means
/// nothing is pending.
pub fn claim() -> u32 {
    // Safety: as for init.
    unsafe { (CLAIM as *const u32).read_volatile() }
}

/// Retires a claim so the source can fire again.
pub fn complete(source: u32) {
    // Safety: as for init.
    unsafe {
        (CLAIM as *mut u32).write_volatile(source);
    }
}
