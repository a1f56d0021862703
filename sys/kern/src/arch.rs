// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Architecture-specific support.
//!
//! In practice, this works by
//!
//! - Conditionally defining a nested module (below).
//! - `pub use`-ing its contents
//!
//! Thus, all architecture-specific types and functions show up right here
//! in the `arch` module, tailored for the current target. Each support
//! module must define the same set of names.
//!
//! The `fake` module stands in on every non-riscv32 target so the portable
//! kernel logic can run under the host test harness.

cfg_if::cfg_if! {
    if #[cfg(target_arch = "riscv32")] {
        #[macro_use]
        pub mod rv32;
        pub use rv32::*;
    } else {
        #[macro_use]
        pub mod fake;
        pub use fake::*;
    }
}
