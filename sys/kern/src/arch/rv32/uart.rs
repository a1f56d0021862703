// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! 16550 UART driver for the 'virt' board serial line.
//!
//! Transmit is polled. Receive is interrupt-fed: the handler registered on
//! the IRQ dispatcher drains the FIFO into a small ring that `getc` and
//! `has_input` consume. Both ends of the ring run in trap context only, so
//! no further locking is needed.

use crate::irq::IrqHandler;

const UART0_BASE: usize = 0x1000_0000;

/// PLIC source id of the UART's input-ready interrupt on 'virt'.
pub const IRQ: u32 = 10;

// 16550 register offsets.
const RBR: usize = 0x00; // receiver buffer (read)
const THR: usize = 0x00; // transmitter holding (write)
const IER: usize = 0x01; // interrupt enable
const FCR: usize = 0x02; // FIFO control
const LSR: usize = 0x05; // line status

bitflags::bitflags! {
    struct Lsr: u8 {
        const DATA_READY = 1 << 0;
        const THR_EMPTY = 1 << 5;
    }
}

fn reg(offset: usize) -> *mut u8 {
    (UART0_BASE + offset) as *mut u8
}

fn lsr() -> Lsr {
    // Safety: fixed UART MMIO address for this platform.
    Lsr::from_bits_truncate(unsafe { reg(LSR).read_volatile() })
}

/// Brings the port up. The firmware already configured 115200 8N1; we only
/// switch the FIFOs and the receive interrupt on.
pub fn init() {
    // Safety: as for lsr.
    unsafe {
        reg(FCR).write_volatile(0x01);
        reg(IER).write_volatile(0x01);
    }
}

/// Emits one byte, spinning while the transmitter is busy.
pub fn putc(b: u8) {
    while !lsr().contains(Lsr::THR_EMPTY) {}
    // Safety: as for lsr.
    unsafe {
        reg(THR).write_volatile(b);
    }
}

const RX_CAPACITY: usize = 64;

/// Receive ring. One writer (the IRQ handler) and one reader (`getc`),
/// both inside the trap critical section.
struct RxQueue {
    buf: [u8; RX_CAPACITY],
    head: usize,
    tail: usize,
}

static mut RX_QUEUE: RxQueue = RxQueue {
    buf: [0; RX_CAPACITY],
    head: 0,
    tail: 0,
};

fn rx_queue() -> *mut RxQueue {
    core::ptr::addr_of_mut!(RX_QUEUE)
}

/// Drains the receive FIFO into the ring. A full ring drops the oldest
/// input rather than wedging the FIFO.
pub struct RxHandler;

impl IrqHandler for RxHandler {
    fn handle(&self) {
        // Safety: trap context; nothing else touches the queue meanwhile.
        unsafe {
            let q = &mut *rx_queue();
            while lsr().contains(Lsr::DATA_READY) {
                let b = reg(RBR).read_volatile();
                let next = (q.head + 1) % RX_CAPACITY;
                if next == q.tail {
                    q.tail = (q.tail + 1) % RX_CAPACITY;
                }
                q.buf[q.head] = b;
                q.head = next;
            }
        }
    }
}

pub static RX_HANDLER: RxHandler = RxHandler;

/// Pops one received byte, if any.
pub fn getc() -> Option<u8> {
    // Safety: trap context only, as for RxHandler.
    unsafe {
        let q = &mut *rx_queue();
        if q.tail == q.head {
            return None;
        }
        let b = q.buf[q.tail];
        q.tail = (q.tail + 1) % RX_CAPACITY;
        Some(b)
    }
}

pub fn has_input() -> bool {
    // Safety: trap context only, as for RxHandler.
    unsafe {
        let q = &*rx_queue();
        q.tail != q.head
    }
}
