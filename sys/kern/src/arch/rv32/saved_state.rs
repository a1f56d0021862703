// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::task::ArchState;
use zerocopy::FromBytes;

/// The register frame the trap vector pushes onto the interrupted task's
/// stack: all 31 integer registers plus the exception pc.
///
/// Three parties observe this layout and it must not change out from under
/// them: the assembly prologue writes the slots by fixed offset, the
/// dispatcher reads and writes them through the accessors below, and the
/// assembly epilogue restores them. 32 words, keeping frames 16-aligned on
/// a 16-aligned stack.
#[repr(C)]
#[derive(Clone, Debug, Default, FromBytes)]
pub struct SavedState {
    // NOTE: the following fields must be kept contiguous!
    ra: u32,
    sp: u32,
    gp: u32,
    tp: u32,
    t0: u32,
    t1: u32,
    t2: u32,
    s0: u32,
    s1: u32,
    a0: u32,
    a1: u32,
    a2: u32,
    a3: u32,
    a4: u32,
    a5: u32,
    a6: u32,
    a7: u32,
    s2: u32,
    s3: u32,
    s4: u32,
    s5: u32,
    s6: u32,
    s7: u32,
    s8: u32,
    s9: u32,
    s10: u32,
    s11: u32,
    t3: u32,
    t4: u32,
    t5: u32,
    t6: u32,
    // Additional save value for the task program counter
    pc: u32,
    // NOTE: the above fields must be kept contiguous!
}

impl SavedState {
    pub fn pc(&self) -> usize {
        self.pc as usize
    }
    pub fn set_pc(&mut self, v: usize) {
        self.pc = v as u32;
    }
    pub fn sp(&self) -> usize {
        self.sp as usize
    }
    pub fn set_sp(&mut self, v: usize) {
        self.sp = v as u32;
    }
    pub fn set_ra(&mut self, v: usize) {
        self.ra = v as u32;
    }
    pub fn set_gp(&mut self, v: usize) {
        self.gp = v as u32;
    }
}

/// Map the frame slots to (architecture-independent) syscall argument and
/// return slots.
impl ArchState for SavedState {
    /// Reads syscall argument register 0.
    fn arg0(&self) -> usize {
        self.a0 as usize
    }
    fn arg1(&self) -> usize {
        self.a1 as usize
    }
    fn arg2(&self) -> usize {
        self.a2 as usize
    }
    fn arg3(&self) -> usize {
        self.a3 as usize
    }
    fn arg4(&self) -> usize {
        self.a4 as usize
    }
    fn arg5(&self) -> usize {
        self.a5 as usize
    }

    fn syscall_descriptor(&self) -> u32 {
        self.a7
    }

    /// Writes the syscall return slot.
    fn ret0(&mut self, x: usize) {
        self.a0 = x as u32;
    }
}
