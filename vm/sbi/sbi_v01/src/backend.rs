// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Traits for the host services legacy SBI calls are implemented on top of.

use crate::hart_mask::PhysicalCpuSet;
use crate::partition::Partition;
use crate::partition::VpIndex;
use crate::regs::RegisterWidth;
use sbi_defs::ExceptionCause;
use sbi_defs::Interrupt;
use sbi_defs::SbiResult;

/// A trap taken while accessing guest memory on the guest's behalf.
///
/// The trap layer redirects it into the guest's own exception handler.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GuestTrap {
    /// The address of the instruction that caused the trap. Filled in when
    /// the trap is handed back to the trap layer.
    pub sepc: u64,
    /// The exception cause.
    pub scause: ExceptionCause,
    /// The faulting guest virtual address.
    pub stval: u64,
    /// The faulting guest physical address, shifted right by 2, if known.
    pub htval: u64,
    /// The transformed trapping instruction, if known.
    pub htinst: u64,
}

impl GuestTrap {
    /// Returns a trap for `scause` at guest virtual address `stval`.
    pub fn new(scause: ExceptionCause, stval: u64) -> Self {
        Self {
            sepc: 0,
            scause,
            stval,
            htval: 0,
            htinst: 0,
        }
    }
}

/// Reads guest memory with the guest's privileges, capturing faults.
pub trait GuestMemoryRead {
    /// Reads one machine word of `width` at guest virtual address `gva`, as
    /// virtual processor `vp` would see it.
    fn read_word(&self, vp: VpIndex, gva: u64, width: RegisterWidth) -> Result<u64, GuestTrap>;
}

/// Arms a virtual processor's timer.
pub trait VcpuTimer {
    /// Requests a timer interrupt for `vp` when its time counter reaches
    /// `deadline`.
    fn arm(&self, vp: VpIndex, deadline: u64) -> SbiResult<()>;
}

/// Sets and clears hart-local interrupts.
pub trait InterruptControl {
    /// Makes `irq` pending on `vp`.
    fn set_interrupt(&self, vp: VpIndex, irq: Interrupt) -> SbiResult<()>;

    /// Makes `irq` not pending on `vp`. Clearing an interrupt that is not
    /// pending succeeds.
    fn clear_interrupt(&self, vp: VpIndex, irq: Interrupt) -> SbiResult<()>;
}

/// Asks the scheduler to stop running virtual processors.
pub trait ParkVcpus {
    /// Requests that `vp` stop running until it is explicitly resumed.
    fn request_park(&self, vp: VpIndex);

    /// Requests that every processor in `partition` stop running.
    fn broadcast_park_request(&self, partition: &Partition) {
        for vp in partition.vps() {
            self.request_park(vp.index());
        }
    }
}

/// Broadcasts cache and TLB maintenance to physical CPUs.
pub trait RemoteFence {
    /// Synchronizes the instruction cache on `cpus`.
    fn broadcast_icache_sync(&self, cpus: &PhysicalCpuSet) -> SbiResult<()>;

    /// Flushes guest translations for `[addr, addr + size)` on `cpus`.
    fn broadcast_tlb_sync(&self, cpus: &PhysicalCpuSet, addr: u64, size: u64) -> SbiResult<()>;

    /// Flushes guest translations for `[addr, addr + size)` tagged with
    /// `asid` on `cpus`.
    fn broadcast_tlb_sync_asid(
        &self,
        cpus: &PhysicalCpuSet,
        addr: u64,
        size: u64,
        asid: u64,
    ) -> SbiResult<()>;
}

/// Every host service needed by the legacy extension.
pub trait LegacyPlatform:
    GuestMemoryRead + VcpuTimer + InterruptControl + ParkVcpus + RemoteFence
{
}

impl<T> LegacyPlatform for T where
    T: GuestMemoryRead + VcpuTimer + InterruptControl + ParkVcpus + RemoteFence + ?Sized
{
}
