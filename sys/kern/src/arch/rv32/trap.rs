// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The unified trap path: timer interrupts, external interrupts, and
//! environment calls all arrive here.

use riscv::register;
use riscv::register::mcause::{Exception, Interrupt, Trap};

use super::{mtimer, plic, SavedState};
use crate::startup::with_kernel_state;
use crate::syscalls;

// Provide our own trap vector to handle save/restore of the task on entry,
// overriding the symbol riscv-rt installs in mtvec. The save and restore
// orders below must mirror the field order of `SavedState` exactly.
//
// Entry: push the frame onto the interrupted task's stack, record the
// frame address in the current control block (its `sp` lives at offset 0
// by contract), and hand the frame to `trap_handler`. Exit: adopt whatever
// NEXT_TASK_PTR names as current, reload its frame address, and unwind it.
// `_resume_task` is entered directly once at boot to launch the first
// task; NEXT and CURRENT agree at that point, so the copy is harmless.
//
// Traps stay disabled from vector entry until the mret (mstatus.MIE was
// stashed in MPIE by the hardware), which is what makes the handler body a
// critical section.
core::arch::global_asm!(
    "
    .section .trap.rust, \"ax\"
    .global _start_trap
    .align 4
_start_trap:
    addi sp, sp, -32*4
    sw ra,   0*4(sp)
    sw gp,   2*4(sp)
    sw tp,   3*4(sp)
    sw t0,   4*4(sp)
    sw t1,   5*4(sp)
    sw t2,   6*4(sp)
    sw s0,   7*4(sp)
    sw s1,   8*4(sp)
    sw a0,   9*4(sp)
    sw a1,  10*4(sp)
    sw a2,  11*4(sp)
    sw a3,  12*4(sp)
    sw a4,  13*4(sp)
    sw a5,  14*4(sp)
    sw a6,  15*4(sp)
    sw a7,  16*4(sp)
    sw s2,  17*4(sp)
    sw s3,  18*4(sp)
    sw s4,  19*4(sp)
    sw s5,  20*4(sp)
    sw s6,  21*4(sp)
    sw s7,  22*4(sp)
    sw s8,  23*4(sp)
    sw s9,  24*4(sp)
    sw s10, 25*4(sp)
    sw s11, 26*4(sp)
    sw t3,  27*4(sp)
    sw t4,  28*4(sp)
    sw t5,  29*4(sp)
    sw t6,  30*4(sp)

    # The interrupted stack pointer sat exactly one frame above us.
    addi t0, sp, 32*4
    sw t0,   1*4(sp)
    csrr t0, mepc
    sw t0,  31*4(sp)

    # Publish the frame as the current task's resumption token.
    la t1, CURRENT_TASK_PTR
    lw t1, (t1)
    sw sp, (t1)

    mv a0, sp
    jal trap_handler

    # Resume whichever task the dispatcher nominated.
    .global _resume_task
_resume_task:
    la t0, NEXT_TASK_PTR
    lw t0, (t0)
    la t1, CURRENT_TASK_PTR
    sw t0, (t1)
    lw sp, (t0)

    lw t0,  31*4(sp)
    csrw mepc, t0

    lw ra,   0*4(sp)
    lw gp,   2*4(sp)
    lw tp,   3*4(sp)
    lw s0,   7*4(sp)
    lw s1,   8*4(sp)
    lw a0,   9*4(sp)
    lw a1,  10*4(sp)
    lw a2,  11*4(sp)
    lw a3,  12*4(sp)
    lw a4,  13*4(sp)
    lw a5,  14*4(sp)
    lw a6,  15*4(sp)
    lw a7,  16*4(sp)
    lw s2,  17*4(sp)
    lw s3,  18*4(sp)
    lw s4,  19*4(sp)
    lw s5,  20*4(sp)
    lw s6,  21*4(sp)
    lw s7,  22*4(sp)
    lw s8,  23*4(sp)
    lw s9,  24*4(sp)
    lw s10, 25*4(sp)
    lw s11, 26*4(sp)
    lw t3,  27*4(sp)
    lw t4,  28*4(sp)
    lw t5,  29*4(sp)
    lw t6,  30*4(sp)
    lw t2,   6*4(sp)
    lw t1,   5*4(sp)
    lw t0,   4*4(sp)
    addi sp, sp, 32*4
    mret
    "
);

//
// The Rust side of the trap path, entered with a pointer to the frame the
// vector just pushed.
//
#[no_mangle]
extern "C" fn trap_handler(frame: &mut SavedState) {
    let mcause = register::mcause::read();
    match mcause.cause() {
        //
        // The periodic machine timer: re-arm the compare register for the
        // next slice, then let the scheduler reconsider.
        //
        Trap::Interrupt(Interrupt::MachineTimer) => {
            mtimer::reset_timer();
            // Safety: trap context is the serializing agent for kernel
            // state.
            unsafe {
                with_kernel_state(|k| {
                    k.tasks.schedule(super::now());
                });
            }
        }

        //
        // External interrupts: drain the PLIC claim register through the
        // handler table.
        //
        Trap::Interrupt(Interrupt::MachineExternal) => {
            external_interrupts();
        }

        //
        // System calls. Tasks run in Machine mode, so ecall arrives as
        // MachineEnvCall.
        //
        Trap::Exception(Exception::MachineEnvCall) => {
            // Resume past the 4-byte ecall instruction.
            frame.set_pc(frame.pc().wrapping_add(4));
            // Safety: as for the timer arm.
            unsafe {
                with_kernel_state(|k| {
                    let caller = k.tasks.current_index();
                    syscalls::safe_syscall_entry(k, caller);
                });
            }
        }

        //
        // Anything else is a malfunction: an unexpected interrupt line or
        // a synchronous fault in whatever was running. Don't try to limp
        // past it.
        //
        _ => {
            fatal_trap(mcause.bits(), frame.pc());
        }
    }

    // Point the epilogue at the scheduler's selection, which may well be
    // the task that trapped.
    // Safety: sequential accesses from trap context, never concurrent.
    unsafe {
        with_kernel_state(|k| {
            let cur = k.tasks.current_index();
            super::set_next_task(k.tasks.task_mut(cur));
        });
    }
}

fn external_interrupts() {
    loop {
        let source = plic::claim();
        if source == 0 {
            break;
        }
        // Safety: trap context, see trap_handler.
        let handled =
            unsafe { with_kernel_state(|k| k.irq.dispatch(source)) };
        if !handled {
            klog!("irq: source {} has no handler", source);
        }
        plic::complete(source);
    }
}

/// Last words on the serial line, then the platform reset path. The
/// offending task must not run again, and it won't: the whole machine
/// restarts.
fn fatal_trap(cause: usize, pc: usize) -> ! {
    klog!("FATAL trap: mcause={:#010x} mepc={:#010x}", cause, pc);
    super::reset();
}
