// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Demo image for the QEMU 'virt' board.
//!
//! Boots the kernel with three tasks: the mandatory idle task and two
//! same-priority printers that take turns on the serial line, sharing it
//! through a task-owned mutex. Run it with
//!
//! ```text
//! qemu-system-riscv32 -M virt -nographic -bios none \
//!     -kernel demo-qemu-virt
//! ```
//!
//! and expect alternating tagged lines every half second.

#![no_std]
#![no_main]

extern crate panic_halt;
extern crate riscv_rt;

use kern::startup::{start_kernel, TaskDesc};
use riscv_rt::entry;
use userlib::hl;

/// CLINT timebase on the stock 'virt' machine is 10 MHz.
const CYCLES_PER_MS: u32 = 10_000;

/// Serializes multi-byte serial output between the printer tasks. The
/// kernel has no opinion about who owns the UART.
static CONSOLE_LOCK: abi::Mutex = abi::Mutex::new();

static BOOT_TASKS: [TaskDesc; 3] = [
    TaskDesc {
        entry: idle_main,
        name: "idle",
        priority: 0,
    },
    TaskDesc {
        entry: ping_main,
        name: "ping",
        priority: 1,
    },
    TaskDesc {
        entry: pong_main,
        name: "pong",
        priority: 1,
    },
];

#[entry]
fn main() -> ! {
    // Safety: the one and only boot path.
    unsafe { start_kernel(CYCLES_PER_MS, &BOOT_TASKS) }
}

/// Parking spot for the CPU; selected only when everything else is
/// blocked or suspended.
unsafe extern "C" fn idle_main() -> ! {
    loop {
        riscv::asm::wfi();
    }
}

unsafe extern "C" fn ping_main() -> ! {
    chatter("ping: A\n")
}

unsafe extern "C" fn pong_main() -> ! {
    chatter("pong: B\n")
}

/// Print a tagged line, sleep half a second, repeat. With both printers
/// in the same priority band the round-robin makes the output alternate.
fn chatter(line: &str) -> ! {
    // Drop a note into the RAM fs on the way up; the loser of the race
    // just sees Exists. This is purely to exercise the file gate end to
    // end.
    if userlib::fs_create("boot-note").is_ok() {
        let _ = userlib::fs_write("boot-note", b"kernel up, tasks talking\n");
    }

    loop {
        hl::with_lock(&CONSOLE_LOCK, || {
            hl::write_str(line);
        });
        userlib::sys_sleep(500);
    }
}
