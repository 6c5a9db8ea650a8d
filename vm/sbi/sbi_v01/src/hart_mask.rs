// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Resolution of guest-supplied hart masks.

use crate::backend::GuestMemoryRead;
use crate::backend::GuestTrap;
use crate::partition::Partition;
use crate::partition::VpIndex;
use crate::regs::RegisterWidth;
use std::collections::BTreeSet;
use std::fmt::Debug;

/// A set of logical hart indices, one bit per hart.
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct HartMask(u64);

impl HartMask {
    /// Returns a mask with the given bits.
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Returns a mask of harts `0..count`, limited to what fits in one
    /// machine word of `width`.
    pub fn first_n(count: u32, width: RegisterWidth) -> Self {
        let bits = match 1u64.checked_shl(count) {
            Some(bit) => bit - 1,
            None => u64::MAX,
        };
        Self(width.truncate(bits))
    }

    /// The raw bits.
    pub fn bits(&self) -> u64 {
        self.0
    }

    /// Returns true if no harts are in the mask.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// The number of harts in the mask.
    pub fn count(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Returns true if hart `index` is in the mask.
    pub fn contains(&self, index: u32) -> bool {
        1u64.checked_shl(index).is_some_and(|bit| self.0 & bit != 0)
    }

    /// Iterates over the hart indices in ascending order.
    pub fn iter(&self) -> HartMaskIter {
        self.into_iter()
    }
}

impl Debug for HartMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HartMask({:#x})", self.0)
    }
}

impl IntoIterator for HartMask {
    type Item = u32;
    type IntoIter = HartMaskIter;

    fn into_iter(self) -> Self::IntoIter {
        HartMaskIter { mask: self.0 }
    }
}

/// An iterator over the hart indices in a [`HartMask`].
pub struct HartMaskIter {
    mask: u64,
}

impl Iterator for HartMaskIter {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.mask == 0 {
            return None;
        }
        let index = self.mask.trailing_zeros();
        self.mask &= self.mask - 1;
        Some(index)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.mask.count_ones() as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for HartMaskIter {}
impl std::iter::FusedIterator for HartMaskIter {}

/// A set of physical CPU numbers.
///
/// Sized by the number of members rather than the largest CPU number.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PhysicalCpuSet {
    cpus: BTreeSet<u32>,
}

impl PhysicalCpuSet {
    /// Adds `cpu` to the set.
    pub fn insert(&mut self, cpu: u32) {
        self.cpus.insert(cpu);
    }

    /// Returns true if `cpu` is in the set.
    pub fn contains(&self, cpu: u32) -> bool {
        self.cpus.contains(&cpu)
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.cpus.is_empty()
    }

    /// The number of CPUs in the set.
    pub fn count(&self) -> usize {
        self.cpus.len()
    }

    /// Iterates over the CPUs in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.cpus.iter().copied()
    }
}

impl Debug for PhysicalCpuSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<u32> for PhysicalCpuSet {
    fn from_iter<T: IntoIterator<Item = u32>>(iter: T) -> Self {
        let mut set = Self::default();
        for cpu in iter {
            set.insert(cpu);
        }
        set
    }
}

/// Resolves the harts targeted by a legacy call.
///
/// A zero `mask_addr` targets all `online` harts. Otherwise `mask_addr` is a
/// guest virtual address holding one machine word of mask bits, read with
/// the calling processor's privileges. A faulting read is returned as-is so
/// that the caller can abort before touching any target.
pub fn resolve_hart_mask<M: GuestMemoryRead + ?Sized>(
    memory: &M,
    vp: VpIndex,
    mask_addr: u64,
    online: u32,
    width: RegisterWidth,
) -> Result<HartMask, GuestTrap> {
    if mask_addr == 0 {
        return Ok(HartMask::first_n(online, width));
    }
    let bits = memory.read_word(vp, mask_addr, width)?;
    Ok(HartMask::from_bits(width.truncate(bits)))
}

/// Maps the harts in `mask` to the physical CPUs they are currently running
/// on.
///
/// Harts that do not exist or are not scheduled anywhere are skipped. This
/// races with the scheduler; a hart that migrates concurrently may be
/// missed.
pub fn physical_cpus(mask: HartMask, partition: &Partition) -> PhysicalCpuSet {
    mask.iter()
        .filter_map(|index| partition.vp(VpIndex::new(index)))
        .filter_map(|vp| vp.physical_cpu())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::FlatGuestMemory;
    use sbi_defs::ExceptionCause;

    #[test]
    fn iterates_in_ascending_order() {
        let mask = HartMask::from_bits(0x8000_0000_0000_0105);
        assert_eq!(mask.count(), 4);
        assert_eq!(mask.iter().len(), 4);
        assert_eq!(mask.iter().collect::<Vec<_>>(), [0, 2, 8, 63]);
        assert!(mask.contains(8));
        assert!(!mask.contains(1));
        assert!(!mask.contains(64));
        assert!(HartMask::default().is_empty());
    }

    #[test]
    fn first_n() {
        assert_eq!(HartMask::first_n(0, RegisterWidth::Rv64).bits(), 0);
        assert_eq!(HartMask::first_n(4, RegisterWidth::Rv64).bits(), 0xf);
        assert_eq!(HartMask::first_n(64, RegisterWidth::Rv64).bits(), u64::MAX);
        assert_eq!(HartMask::first_n(100, RegisterWidth::Rv64).bits(), u64::MAX);
        assert_eq!(HartMask::first_n(31, RegisterWidth::Rv32).bits(), 0x7fff_ffff);
        assert_eq!(HartMask::first_n(40, RegisterWidth::Rv32).bits(), 0xffff_ffff);
    }

    #[test]
    fn resolve_zero_targets_all_online() {
        let memory = FlatGuestMemory::new(0x1000, 0x1000);
        let mask =
            resolve_hart_mask(&memory, VpIndex::new(0), 0, 3, RegisterWidth::Rv64).unwrap();
        assert_eq!(mask.bits(), 0b111);
    }

    #[test]
    fn resolve_reads_guest_word() {
        let memory = FlatGuestMemory::new(0x1000, 0x1000);
        memory
            .write_word(0x1010, 0xffff_0000_0000_0012, RegisterWidth::Rv64)
            .unwrap();

        let mask =
            resolve_hart_mask(&memory, VpIndex::new(0), 0x1010, 4, RegisterWidth::Rv64).unwrap();
        assert_eq!(mask.bits(), 0xffff_0000_0000_0012);

        // RV32 reads only four bytes.
        let mask =
            resolve_hart_mask(&memory, VpIndex::new(0), 0x1010, 4, RegisterWidth::Rv32).unwrap();
        assert_eq!(mask.bits(), 0x12);
    }

    #[test]
    fn resolve_propagates_fault() {
        let memory = FlatGuestMemory::new(0x1000, 0x1000);
        let trap = resolve_hart_mask(&memory, VpIndex::new(0), 0x8000, 4, RegisterWidth::Rv64)
            .unwrap_err();
        assert_eq!(trap.scause, ExceptionCause::LOAD_GUEST_PAGE_FAULT);
        assert_eq!(trap.stval, 0x8000);
    }

    #[test]
    fn physical_cpus_skips_unscheduled() {
        let partition = Partition::new(4).unwrap();
        partition.vp(VpIndex::new(0)).unwrap().set_physical_cpu(3);
        partition.vp(VpIndex::new(2)).unwrap().set_physical_cpu(130);
        partition.vp(VpIndex::new(3)).unwrap().set_physical_cpu(5);

        // Bit 1 is unscheduled and bit 9 does not exist.
        let cpus = physical_cpus(HartMask::from_bits(0b10_0000_0111), &partition);
        assert_eq!(cpus.iter().collect::<Vec<_>>(), [3, 130]);
        assert_eq!(cpus.count(), 2);
        assert!(cpus.contains(130));
        assert!(!cpus.contains(5));
        assert!(physical_cpus(HartMask::from_bits(0b10), &partition).is_empty());
    }

    #[test]
    fn physical_cpus_with_large_cpu_numbers() {
        let partition = Partition::new(3).unwrap();
        partition.vp(VpIndex::new(0)).unwrap().set_physical_cpu(u32::MAX);
        partition.vp(VpIndex::new(1)).unwrap().set_physical_cpu(1);
        partition.vp(VpIndex::new(2)).unwrap().set_physical_cpu(u32::MAX - 64);

        let cpus = physical_cpus(HartMask::from_bits(0b111), &partition);
        assert_eq!(cpus.count(), 3);
        assert_eq!(
            cpus.iter().collect::<Vec<_>>(),
            [1, u32::MAX - 64, u32::MAX]
        );
        assert!(cpus.contains(u32::MAX));
        assert!(!cpus.contains(0));
    }
}
