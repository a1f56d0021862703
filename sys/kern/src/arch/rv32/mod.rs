// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Architecture support for 32-bit RISC-V, machine mode only.
//!
//! The kernel should support any riscv32imac target shaped like the QEMU
//! 'virt' board: CLINT for the machine timer, PLIC for external
//! interrupts, a 16550 UART for the serial line. (The A extension is
//! load-bearing: the kernel-state guard is an atomic swap.) There is no
//! privilege switch; tasks run in Machine mode alongside the kernel, and
//! isolation is purely by convention.
//!
//! The trap vector in `trap` overrides the riscv-rt default. On the way in
//! it pushes the full register frame onto the interrupted task's stack and
//! publishes the frame address through `CURRENT_TASK_PTR`; on the way out
//! it adopts whatever `NEXT_TASK_PTR` names. Those two statics are the
//! entire assembly-visible surface, beyond the frame layout itself.

use core::arch::asm;
use core::ptr::NonNull;

use crate::irq::IrqTable;
use crate::task::Task;
use crate::time::Timestamp;
use unwrap_lite::UnwrapLite;

#[cfg(feature = "klog-uart")]
macro_rules! klog {
    ($s:expr) => {
        {
            use core::fmt::Write;
            let _ = writeln!($crate::arch::KlogWriter, $s);
        }
    };
    ($s:expr, $($tt:tt)*) => {
        {
            use core::fmt::Write;
            let _ = writeln!($crate::arch::KlogWriter, $s, $($tt)*);
        }
    };
}

#[cfg(not(feature = "klog-uart"))]
macro_rules! klog {
    ($s:expr) => {};
    ($s:expr, $($tt:tt)*) => {};
}

macro_rules! uassert {
    ($cond:expr) => {
        if !$cond {
            panic!("Assertion failed!");
        }
    };
}

mod mtimer;
pub use mtimer::*;

mod plic;

mod saved_state;
pub use saved_state::*;

mod trap;

pub mod uart;
pub use uart::{getc, has_input, putc};

/// Address of the current task's control block, i.e. of its `sp` slot.
/// The trap vector stores the fresh frame pointer through this on entry.
#[no_mangle]
pub static mut CURRENT_TASK_PTR: Option<NonNull<Task>> = None;

/// Control block the trap epilogue will switch to. Equal to
/// `CURRENT_TASK_PTR` unless the dispatcher picked somebody else.
#[no_mangle]
pub static mut NEXT_TASK_PTR: Option<NonNull<Task>> = None;

/// Records the address of `task` as the current user task.
///
/// # Safety
///
/// This records a pointer that aliases `task`. As long as you don't read
/// that pointer while you have access to `task`, and as long as the task
/// being stored actually lives in the static kernel state, you'll be okay.
pub unsafe fn set_current_task(task: &mut Task) {
    unsafe {
        *core::ptr::addr_of_mut!(CURRENT_TASK_PTR) =
            Some(NonNull::from(task));
    }
}

/// Nominates `task` for the trap epilogue to resume.
///
/// # Safety
///
/// As for `set_current_task`.
pub unsafe fn set_next_task(task: &mut Task) {
    unsafe {
        *core::ptr::addr_of_mut!(NEXT_TASK_PTR) = Some(NonNull::from(task));
    }
}

/// Cycles per millisecond of the platform counter. Kept in memory so it
/// can also be read from a debugger.
#[no_mangle]
pub static mut CLOCK_FREQ_KHZ: u32 = 0;

pub fn set_clock_freq(tick_divisor: u32) {
    // Safety: single hart, and written once during boot before the timer
    // is armed.
    unsafe {
        *core::ptr::addr_of_mut!(CLOCK_FREQ_KHZ) = tick_divisor;
    }
}

pub fn clock_freq_khz() -> u32 {
    // Safety: see set_clock_freq.
    unsafe { *core::ptr::addr_of!(CLOCK_FREQ_KHZ) }
}

/// Reads the monotonic counter.
pub fn now() -> Timestamp {
    Timestamp::from(mtimer::cycles())
}

/// The kernel's global-pointer register, inherited by forged task frames.
pub fn read_gp() -> usize {
    let gp;
    unsafe {
        asm!("mv {}, gp", out(reg) gp, options(nomem, nostack));
    }
    gp
}

/// Serial-backed writer used for kernel diagnostics.
pub struct KlogWriter;

impl core::fmt::Write for KlogWriter {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for b in s.bytes() {
            uart::putc(b);
        }
        Ok(())
    }
}

/// Switches an external-interrupt source on at the PLIC, priority 1.
pub fn enable_external_source(source: u32) {
    plic::set_priority(source, 1);
    plic::enable(source);
}

/// Hooks the board's own interrupt consumers into the dispatch table.
/// Currently that is the UART receive path.
pub fn register_platform_handlers(irq: &mut IrqTable) {
    uart::init();
    irq.register(uart::IRQ, &uart::RX_HANDLER).unwrap_lite();
}

const MSTATUS_MPIE: usize = 1 << 7;

/// Arms the timer and interrupt controller, then resumes the task named by
/// `CURRENT_TASK_PTR`/`NEXT_TASK_PTR` through the trap epilogue.
///
/// # Safety
///
/// Both task pointers must name a task with a forged frame. Called once,
/// at the end of `start_kernel`.
pub unsafe fn start_first_task() -> ! {
    unsafe {
        mtimer::arm_first_slice();
        plic::init();

        riscv::register::mie::set_mtimer();
        riscv::register::mie::set_mext();

        // Stay in Machine mode across the mret, and have it re-enable
        // interrupts as it lands in the task.
        riscv::register::mstatus::set_mpp(
            riscv::register::mstatus::MPP::Machine,
        );
        asm!("csrrs zero, mstatus, {}", in(reg) MSTATUS_MPIE);

        asm!("j _resume_task", options(noreturn));
    }
}

/// Platform reset: ask the sifive_test device to reboot the machine. On a
/// board without one (the FPGA target), park the hart for the external
/// watchdog instead.
pub fn reset() -> ! {
    const SIFIVE_TEST: *mut u32 = 0x0010_0000 as *mut u32;
    const REBOOT: u32 = 0x0000_7777;
    unsafe {
        SIFIVE_TEST.write_volatile(REBOOT);
        loop {
            riscv::asm::wfi();
        }
    }
}
