// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A flat, identity-mapped guest memory.

use crate::backend::GuestMemoryRead;
use crate::backend::GuestTrap;
use crate::partition::VpIndex;
use crate::regs::RegisterWidth;
use parking_lot::RwLock;
use sbi_defs::ExceptionCause;
use std::ops::Range;
use thiserror::Error;

/// An error accessing [`FlatGuestMemory`] from the host.
#[derive(Debug, Error)]
pub enum GuestMemoryError {
    /// The access is not entirely inside guest memory.
    #[error("guest range {address:#x}+{len:#x} is outside guest memory")]
    OutOfRange {
        /// The start of the access.
        address: u64,
        /// The length of the access.
        len: usize,
    },
}

/// A contiguous block of guest memory starting at `base`, where guest
/// virtual and physical addresses are the same.
///
/// Every guest access is checked against the block's bounds before any host
/// memory is touched; an access outside them becomes a guest page fault.
#[derive(Debug)]
pub struct FlatGuestMemory {
    base: u64,
    data: RwLock<Vec<u8>>,
}

impl FlatGuestMemory {
    /// Returns a zeroed memory of `len` bytes at guest address `base`.
    pub fn new(base: u64, len: usize) -> Self {
        Self {
            base,
            data: RwLock::new(vec![0; len]),
        }
    }

    /// The guest address of the first byte.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// The size of the memory in bytes.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if the memory has no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn range(&self, data_len: usize, address: u64, len: usize) -> Option<Range<usize>> {
        let offset = usize::try_from(address.checked_sub(self.base)?).ok()?;
        let end = offset.checked_add(len)?;
        (end <= data_len).then_some(offset..end)
    }

    /// Writes `buf` at guest address `address`.
    pub fn write_at(&self, address: u64, buf: &[u8]) -> Result<(), GuestMemoryError> {
        let mut data = self.data.write();
        let range = self
            .range(data.len(), address, buf.len())
            .ok_or(GuestMemoryError::OutOfRange {
                address,
                len: buf.len(),
            })?;
        data[range].copy_from_slice(buf);
        Ok(())
    }

    /// Writes a little-endian machine word of `width` at `address`.
    pub fn write_word(
        &self,
        address: u64,
        value: u64,
        width: RegisterWidth,
    ) -> Result<(), GuestMemoryError> {
        self.write_at(address, &value.to_le_bytes()[..width.word_size()])
    }
}

impl GuestMemoryRead for FlatGuestMemory {
    fn read_word(&self, _vp: VpIndex, gva: u64, width: RegisterWidth) -> Result<u64, GuestTrap> {
        let size = width.word_size();
        if gva % size as u64 != 0 {
            return Err(GuestTrap::new(
                ExceptionCause::LOAD_ADDRESS_MISALIGNED,
                gva,
            ));
        }
        let data = self.data.read();
        let Some(range) = self.range(data.len(), gva, size) else {
            return Err(GuestTrap {
                htval: gva >> 2,
                ..GuestTrap::new(ExceptionCause::LOAD_GUEST_PAGE_FAULT, gva)
            });
        };
        let mut bytes = [0; 8];
        bytes[..size].copy_from_slice(&data[range]);
        Ok(u64::from_le_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write() {
        let memory = FlatGuestMemory::new(0x8000_0000, 0x100);
        assert_eq!(memory.base(), 0x8000_0000);
        assert_eq!(memory.len(), 0x100);
        memory
            .write_word(0x8000_0008, 0x0102_0304_0506_0708, RegisterWidth::Rv64)
            .unwrap();
        let vp = VpIndex::new(0);
        assert_eq!(
            memory.read_word(vp, 0x8000_0008, RegisterWidth::Rv64),
            Ok(0x0102_0304_0506_0708)
        );
        assert_eq!(
            memory.read_word(vp, 0x8000_0008, RegisterWidth::Rv32),
            Ok(0x0506_0708)
        );
        assert_eq!(
            memory.read_word(vp, 0x8000_000c, RegisterWidth::Rv32),
            Ok(0x0102_0304)
        );
    }

    #[test]
    fn faults() {
        let memory = FlatGuestMemory::new(0x1000, 0x10);
        let vp = VpIndex::new(0);

        let trap = memory
            .read_word(vp, 0x1004, RegisterWidth::Rv64)
            .unwrap_err();
        assert_eq!(trap.scause, ExceptionCause::LOAD_ADDRESS_MISALIGNED);
        assert_eq!(trap.stval, 0x1004);

        // Straddles the end.
        let trap = memory
            .read_word(vp, 0x1010, RegisterWidth::Rv64)
            .unwrap_err();
        assert_eq!(trap.scause, ExceptionCause::LOAD_GUEST_PAGE_FAULT);
        assert_eq!(trap.htval, 0x1010 >> 2);

        // Below the base.
        let trap = memory.read_word(vp, 0x800, RegisterWidth::Rv64).unwrap_err();
        assert_eq!(trap.scause, ExceptionCause::LOAD_GUEST_PAGE_FAULT);

        // Wraps the address space.
        let trap = memory
            .read_word(vp, u64::MAX - 7, RegisterWidth::Rv64)
            .unwrap_err();
        assert_eq!(trap.scause, ExceptionCause::LOAD_GUEST_PAGE_FAULT);
    }

    #[test]
    fn host_write_out_of_range() {
        let memory = FlatGuestMemory::new(0x1000, 0x10);
        assert!(matches!(
            memory.write_word(0x100c, 0, RegisterWidth::Rv64),
            Err(GuestMemoryError::OutOfRange {
                address: 0x100c,
                len: 8
            })
        ));
        memory.write_word(0x100c, 0, RegisterWidth::Rv32).unwrap();
    }
}
