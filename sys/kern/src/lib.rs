// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel of a small preemptive RTOS for machine-mode RV32.
//!
//! Everything privileged lives here: the task pool and scheduler, the trap
//! vector and syscall dispatch, the heap allocator, the RAM file system, and
//! the external-interrupt dispatcher. Tasks are plain functions sharing the
//! address space with the kernel; there is no memory protection and no
//! privilege switch, so the only serialization mechanism -- and the only one
//! needed -- is the trap gate itself: traps stay disabled from vector entry
//! to `mret`, making every service a critical section.
//!
//! Code outside the `arch` module is portable; the `arch` module provides a
//! riscv32 implementation for real hardware and a `fake` implementation so
//! the rest of the kernel runs under `cargo test` on the host.

#![cfg_attr(target_os = "none", no_std)]

#[macro_use]
pub mod arch;

pub mod fs;
pub mod heap;
pub mod irq;
pub mod startup;
pub mod syscalls;
pub mod task;
pub mod time;
pub mod umem;
