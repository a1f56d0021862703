// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel startup and the process-wide kernel state.
//!
//! All shared mutable kernel state -- task pool, heap, file system, IRQ
//! table -- lives in one `Kernel` value owned by this module and reached
//! through [`with_kernel_state`], whose re-entrancy guard documents the
//! rule: only one party, the trap dispatcher, touches it at a time. The
//! two raw task pointers the trap vector consumes are maintained by the
//! arch layer separately, at fixed offsets, because assembly reads them.

use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::arch;
use crate::fs::Fs;
use crate::heap::Heap;
use crate::irq::IrqTable;
use crate::task::TaskTable;
use abi::Priority;
use unwrap_lite::UnwrapLite;

/// Capacity of the static task pool.
pub const NUM_TASKS: usize = 8;

/// Bytes of stack owned by each task control block.
pub const TASK_STACK_SIZE: usize = 1024;

/// Bytes backing the kernel heap, out of which the file-system image is
/// also carved.
pub const KERNEL_HEAP_SIZE: usize = 64 * 1024;

/// One entry of the application's boot task list.
pub struct TaskDesc {
    /// First instruction of the task. Tasks never return.
    pub entry: unsafe extern "C" fn() -> !,
    pub name: &'static str,
    pub priority: u8,
}

/// Everything the kernel mutates after boot.
pub struct Kernel {
    pub tasks: TaskTable,
    pub heap: Heap,
    pub fs: Fs,
    pub irq: IrqTable,
}

#[repr(C, align(8))]
struct HeapRegion([u8; KERNEL_HEAP_SIZE]);

static mut KERNEL_HEAP_SPACE: HeapRegion = HeapRegion([0; KERNEL_HEAP_SIZE]);

static mut KERNEL_STATE: MaybeUninit<Kernel> = MaybeUninit::uninit();

static KERNEL_STATE_IN_USE: AtomicBool = AtomicBool::new(false);

/// Runs `body` with exclusive access to the kernel state.
///
/// # Safety
///
/// `start_kernel` must have initialized the state first. The flag turns
/// accidental re-entry (a handler calling back into the state it is already
/// borrowing) into a panic instead of aliasing.
pub unsafe fn with_kernel_state<R>(body: impl FnOnce(&mut Kernel) -> R) -> R {
    if KERNEL_STATE_IN_USE.swap(true, Ordering::Acquire) {
        panic!();
    }
    // Safety: initialization per this function's contract; exclusivity by
    // the flag we just claimed.
    let state =
        unsafe { &mut *(*core::ptr::addr_of_mut!(KERNEL_STATE)).as_mut_ptr() };
    let result = body(state);
    KERNEL_STATE_IN_USE.store(false, Ordering::Release);
    result
}

/// The main kernel entry point.
///
/// The application calls this from its `main` after whatever board setup it
/// needs, passing the platform's cycles-per-millisecond figure and the list
/// of tasks to populate the pool with. The list must include a priority-0
/// idle task; the scheduler has nowhere to park the CPU without one.
///
/// # Safety
///
/// This can be called exactly once per boot.
pub unsafe fn start_kernel(
    tick_divisor: u32,
    boot_tasks: &[TaskDesc],
) -> ! {
    arch::set_clock_freq(tick_divisor);
    klog!("boot: clock {} cycles/ms", tick_divisor);
    uassert!(boot_tasks.iter().any(|d| d.priority == 0));

    // Safety: single call per boot means nothing else refers to the heap
    // backing yet.
    let mut heap = unsafe {
        let region = core::ptr::addr_of_mut!(KERNEL_HEAP_SPACE.0);
        Heap::new(region as *mut u8, KERNEL_HEAP_SIZE)
    };
    klog!("boot: heap {} bytes free", heap.free_bytes());

    let fs = Fs::mount(&mut heap).unwrap_lite();
    klog!("boot: fs formatted, {} bytes image", crate::fs::IMAGE_SIZE);

    let mut kernel = Kernel {
        tasks: TaskTable::new(),
        heap,
        fs,
        irq: IrqTable::new(),
    };
    for desc in boot_tasks {
        let id = kernel
            .tasks
            .create(desc.entry as usize, desc.name, Priority(desc.priority))
            .unwrap_lite();
        klog!("boot: task {} '{}' prio {}", id.0, desc.name, desc.priority);
    }
    arch::register_platform_handlers(&mut kernel.irq);

    // Safety: single call per boot; no outstanding borrows of the state.
    unsafe {
        (*core::ptr::addr_of_mut!(KERNEL_STATE)).as_mut_ptr().write(kernel);
    }

    // Safety: state initialized on the line above. The task table is now
    // at its permanent address, so frames forged here stay valid.
    unsafe {
        with_kernel_state(|k| {
            k.tasks.initialize_frames();
            let first = k.tasks.schedule(arch::now());
            let task = k.tasks.task_mut(first);
            // Safety: the pointee lives in the static kernel state and is
            // not dereferenced until the trap path runs, when the borrow
            // here is long gone.
            unsafe {
                arch::set_current_task(task);
                arch::set_next_task(task);
            }
        });
    }

    klog!("boot: go");
    // Safety: current/next pointers are armed and the first task's frame
    // is forged.
    unsafe { arch::start_first_task() }
}
