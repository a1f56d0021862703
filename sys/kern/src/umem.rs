// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Support for safely interacting with memory a task hands to a syscall.
//!
//! A `USlice` is a base/length pair naming task memory; by itself it confers
//! no access. On this hardware there is no memory protection to consult, so
//! validation is limited to the structural checks (null, alignment, address
//! space wrap); materializing a slice is still `unsafe` because it may alias
//! anything, and is only done inside the trap critical section where the
//! owning task cannot run.

use core::marker::PhantomData;

use abi::SysError;
use zerocopy::FromBytes;

/// A (base, length) pair describing `length` elements of `T` in task memory.
pub struct USlice<T> {
    base_address: usize,
    length: usize,

    _marker: PhantomData<*mut [T]>,
}

impl<T> USlice<T>
where
    T: FromBytes,
{
    /// Builds a `USlice` from raw syscall arguments, refusing slices that
    /// are null, misaligned for `T`, or that would wrap the address space.
    pub fn from_raw(
        base_address: usize,
        length: usize,
    ) -> Result<Self, SysError> {
        if length > 0 {
            if base_address == 0 {
                return Err(SysError::BadAddress);
            }
            if base_address % core::mem::align_of::<T>() != 0 {
                return Err(SysError::BadAddress);
            }
            // Check that the byte span fits below the top of the address
            // space without wrapping.
            let bytes = core::mem::size_of::<T>()
                .checked_mul(length)
                .ok_or(SysError::BadAddress)?;
            base_address
                .checked_add(bytes)
                .ok_or(SysError::BadAddress)?;
        }
        Ok(USlice {
            base_address,
            length,
            _marker: PhantomData,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn base_addr(&self) -> usize {
        self.base_address
    }

    /// Materializes the slice for reading.
    ///
    /// # Safety
    ///
    /// The caller asserts that the memory contains initialized `T`s and that
    /// nothing will mutate it for the returned lifetime -- in practice, that
    /// we are inside the trap critical section and the kernel does not write
    /// through an overlapping view.
    pub unsafe fn assume_readable(&self) -> &[T] {
        if self.length == 0 {
            return &[];
        }
        unsafe {
            core::slice::from_raw_parts(
                self.base_address as *const T,
                self.length,
            )
        }
    }

    /// Materializes the slice for writing.
    ///
    /// # Safety
    ///
    /// Same conditions as `assume_readable`, plus exclusivity: no other view
    /// of this memory may exist for the returned lifetime.
    pub unsafe fn assume_writable(&mut self) -> &mut [T] {
        if self.length == 0 {
            return &mut [];
        }
        unsafe {
            core::slice::from_raw_parts_mut(
                self.base_address as *mut T,
                self.length,
            )
        }
    }
}
