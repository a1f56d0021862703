// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Implementation of kernel time.
//!
//! Time is kept in raw cycles of the platform's monotonic counter (`mtime`
//! on RISC-V). The platform tells us at boot how many cycles make up one
//! millisecond; nothing in the kernel assumes a particular frequency.

/// In-kernel timestamp representation, in hardware cycles.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[repr(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Computes the absolute point `ms` milliseconds after `self`, given the
    /// platform's cycles-per-millisecond figure.
    pub fn offset_by_ms(self, ms: u32, cycles_per_ms: u32) -> Timestamp {
        Timestamp(self.0 + u64::from(ms) * u64::from(cycles_per_ms))
    }
}

impl From<u64> for Timestamp {
    fn from(v: u64) -> Self {
        Timestamp(v)
    }
}

impl From<Timestamp> for u64 {
    fn from(v: Timestamp) -> Self {
        v.0
    }
}
