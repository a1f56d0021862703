// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Stand-in architecture for running kernel logic on the host.
//!
//! Mirrors the riscv32 module's surface: the frame layout is the same 32
//! slots (at host word width), time is a test-settable counter, and the
//! serial line is a string buffer tests can drain. Anything that would
//! actually leave kernel context panics.

use core::ptr::NonNull;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex as HostMutex;

use crate::irq::IrqTable;
use crate::task::{ArchState, Task};
use crate::time::Timestamp;

macro_rules! klog {
    ($s:expr) => { println!($s) };
    ($s:expr, $($tt:tt)*) => { println!($s, $($tt)*) };
}

macro_rules! uassert {
    ($cond:expr) => {
        assert!($cond)
    };
}

/// Saved-register frame, shaped like the riscv32 one but at host word
/// width so forged frames can carry real host addresses in tests.
#[derive(Clone, Debug, Default)]
#[repr(C)]
pub struct SavedState {
    ra: usize,
    sp: usize,
    gp: usize,
    tp: usize,
    t0: usize,
    t1: usize,
    t2: usize,
    s0: usize,
    s1: usize,
    a0: usize,
    a1: usize,
    a2: usize,
    a3: usize,
    a4: usize,
    a5: usize,
    a6: usize,
    a7: usize,
    s2: usize,
    s3: usize,
    s4: usize,
    s5: usize,
    s6: usize,
    s7: usize,
    s8: usize,
    s9: usize,
    s10: usize,
    s11: usize,
    t3: usize,
    t4: usize,
    t5: usize,
    t6: usize,
    pc: usize,
}

impl SavedState {
    pub fn pc(&self) -> usize {
        self.pc
    }
    pub fn set_pc(&mut self, v: usize) {
        self.pc = v;
    }
    pub fn sp(&self) -> usize {
        self.sp
    }
    pub fn set_sp(&mut self, v: usize) {
        self.sp = v;
    }
    pub fn set_ra(&mut self, v: usize) {
        self.ra = v;
    }
    pub fn set_gp(&mut self, v: usize) {
        self.gp = v;
    }

    /// Test hook: stages a syscall the way the real stubs would, number in
    /// `a7` and arguments in `a0..a5`.
    pub fn set_syscall(&mut self, nr: u32, args: [usize; 6]) {
        self.a7 = nr as usize;
        self.a0 = args[0];
        self.a1 = args[1];
        self.a2 = args[2];
        self.a3 = args[3];
        self.a4 = args[4];
        self.a5 = args[5];
    }
}

impl ArchState for SavedState {
    fn arg0(&self) -> usize {
        self.a0
    }
    fn arg1(&self) -> usize {
        self.a1
    }
    fn arg2(&self) -> usize {
        self.a2
    }
    fn arg3(&self) -> usize {
        self.a3
    }
    fn arg4(&self) -> usize {
        self.a4
    }
    fn arg5(&self) -> usize {
        self.a5
    }

    fn syscall_descriptor(&self) -> u32 {
        self.a7 as u32
    }

    fn ret0(&mut self, x: usize) {
        self.a0 = x;
    }
}

static CLOCK_FREQ_KHZ: AtomicU32 = AtomicU32::new(0);

pub fn set_clock_freq(tick_divisor: u32) {
    CLOCK_FREQ_KHZ.store(tick_divisor, Ordering::Relaxed);
}

pub fn clock_freq_khz() -> u32 {
    CLOCK_FREQ_KHZ.load(Ordering::Relaxed)
}

static NOW: AtomicU64 = AtomicU64::new(0);

/// Test hook: sets the value `now` reports.
pub fn set_now(cycles: u64) {
    NOW.store(cycles, Ordering::Relaxed);
}

pub fn now() -> Timestamp {
    Timestamp::from(NOW.load(Ordering::Relaxed))
}

static mut CURRENT_TASK_PTR: Option<NonNull<Task>> = None;
static mut NEXT_TASK_PTR: Option<NonNull<Task>> = None;

/// # Safety
///
/// Caller promises not to read the recorded pointer while still holding
/// access to `task`.
pub unsafe fn set_current_task(task: &mut Task) {
    unsafe {
        *core::ptr::addr_of_mut!(CURRENT_TASK_PTR) =
            Some(NonNull::from(task));
    }
}

/// # Safety
///
/// As for `set_current_task`.
pub unsafe fn set_next_task(task: &mut Task) {
    unsafe {
        *core::ptr::addr_of_mut!(NEXT_TASK_PTR) = Some(NonNull::from(task));
    }
}

pub fn read_gp() -> usize {
    0
}

static SERIAL: HostMutex<String> = HostMutex::new(String::new());

pub fn putc(b: u8) {
    SERIAL.lock().unwrap().push(b as char);
}

pub fn getc() -> Option<u8> {
    None
}

pub fn has_input() -> bool {
    false
}

/// Test hook: drains everything written to the fake serial line.
pub fn take_serial() -> String {
    core::mem::take(&mut *SERIAL.lock().unwrap())
}

/// Serial-backed writer used for kernel diagnostics.
pub struct KlogWriter;

impl core::fmt::Write for KlogWriter {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for b in s.bytes() {
            putc(b);
        }
        Ok(())
    }
}

static ENABLED_SOURCES: AtomicU64 = AtomicU64::new(0);

pub fn enable_external_source(source: u32) {
    ENABLED_SOURCES.fetch_or(1 << source, Ordering::Relaxed);
}

/// Test hook: bitmask of sources switched on at the fake controller.
pub fn external_sources_enabled() -> u64 {
    ENABLED_SOURCES.load(Ordering::Relaxed)
}

pub fn register_platform_handlers(_irq: &mut IrqTable) {}

/// # Safety
///
/// Never returns on real hardware; here it has nowhere to go.
pub unsafe fn start_first_task() -> ! {
    panic!("entering task context on the fake arch");
}

pub fn reset() -> ! {
    panic!("SYSTEM RESET");
}
