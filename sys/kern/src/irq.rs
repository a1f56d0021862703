// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! External-interrupt dispatch.
//!
//! A dense table maps interrupt-controller source ids to handlers.
//! Registration installs the handler and switches the source on at the
//! controller. The external arm of the trap dispatcher then drains the
//! claim register through [`IrqTable::dispatch`] until no source remains
//! pending.
//!
//! Handlers run in trap context, inside the kernel's critical section: they
//! must be short, must not block, and must not call back into scheduling or
//! allocation.

use abi::SysError;

/// Number of source-id slots. Source 0 is the controller's "no interrupt"
/// code and is never registrable.
pub const NUM_SOURCES: usize = 64;

/// Something that can service one external interrupt source.
pub trait IrqHandler: Sync {
    fn handle(&self);
}

pub struct IrqTable {
    handlers: [Option<&'static dyn IrqHandler>; NUM_SOURCES],
}

impl IrqTable {
    pub const fn new() -> Self {
        IrqTable {
            handlers: [None; NUM_SOURCES],
        }
    }

    /// Installs `handler` for `source` and enables the source at the
    /// external controller with priority 1.
    pub fn register(
        &mut self,
        source: u32,
        handler: &'static dyn IrqHandler,
    ) -> Result<(), SysError> {
        let idx = source as usize;
        if idx == 0 || idx >= NUM_SOURCES {
            return Err(SysError::BadAddress);
        }
        self.handlers[idx] = Some(handler);
        crate::arch::enable_external_source(source);
        Ok(())
    }

    /// Runs the handler for a claimed source. Returns whether one was
    /// installed; the caller must complete the claim either way so the
    /// controller does not wedge.
    pub fn dispatch(&self, source: u32) -> bool {
        match self.handlers.get(source as usize).copied().flatten() {
            Some(handler) => {
                handler.handle();
                true
            }
            None => false,
        }
    }
}
