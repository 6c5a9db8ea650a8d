// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-partition virtual processor state touched by SBI calls.
//!
//! Each virtual processor's state is a handful of independent atomic words,
//! so one processor can update another's pending interrupts or power state
//! while the target is running, without a partition-wide lock.

use crate::backend::InterruptControl;
use sbi_defs::Interrupt;
use sbi_defs::SbiError;
use sbi_defs::SbiResult;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use thiserror::Error;

/// The maximum number of virtual processors in a partition.
pub const MAX_VPS: u32 = 1024;

const NOT_SCHEDULED: i64 = -1;

/// The logical index of a virtual processor (its hart ID as the guest sees
/// it).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VpIndex(u32);

impl VpIndex {
    /// Returns a new index.
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    pub const fn index(&self) -> u32 {
        self.0
    }
}

/// The state of one virtual processor.
#[derive(Debug)]
pub struct VcpuState {
    index: VpIndex,
    power_off: AtomicBool,
    irqs_pending: AtomicU64,
    /// Bits of `irqs_pending` changed since the run loop last synced them
    /// into hardware.
    irqs_pending_mask: AtomicU64,
    /// The physical CPU the processor is running on, or `NOT_SCHEDULED`.
    cpu: AtomicI64,
}

impl VcpuState {
    fn new(index: VpIndex) -> Self {
        Self {
            index,
            power_off: AtomicBool::new(false),
            irqs_pending: AtomicU64::new(0),
            irqs_pending_mask: AtomicU64::new(0),
            cpu: AtomicI64::new(NOT_SCHEDULED),
        }
    }

    /// The processor's index.
    pub fn index(&self) -> VpIndex {
        self.index
    }

    /// Returns true if the processor has been powered off.
    pub fn is_powered_off(&self) -> bool {
        self.power_off.load(Ordering::Acquire)
    }

    /// Marks the processor powered off. The flag is published before any
    /// subsequent park request.
    pub fn power_off(&self) {
        self.power_off.store(true, Ordering::Release);
    }

    /// Clears the powered-off flag.
    pub fn resume(&self) {
        self.power_off.store(false, Ordering::Release);
    }

    /// The physical CPU this processor is currently scheduled on.
    pub fn physical_cpu(&self) -> Option<u32> {
        u32::try_from(self.cpu.load(Ordering::Acquire)).ok()
    }

    /// Records that the processor is now running on physical CPU `cpu`.
    pub fn set_physical_cpu(&self, cpu: u32) {
        self.cpu.store(cpu.into(), Ordering::Release);
    }

    /// Records that the processor is no longer running anywhere.
    pub fn clear_physical_cpu(&self) {
        self.cpu.store(NOT_SCHEDULED, Ordering::Release);
    }

    /// The pending interrupt bits.
    pub fn pending_interrupts(&self) -> u64 {
        self.irqs_pending.load(Ordering::Acquire)
    }

    /// Returns true if `irq` is pending.
    pub fn is_interrupt_pending(&self, irq: Interrupt) -> bool {
        irq.mask()
            .is_some_and(|mask| self.pending_interrupts() & mask != 0)
    }

    /// Returns and clears the set of interrupt bits that changed since the
    /// last call.
    pub fn take_pending_changes(&self) -> u64 {
        self.irqs_pending_mask.swap(0, Ordering::AcqRel)
    }

    fn set_pending(&self, mask: u64) {
        self.irqs_pending.fetch_or(mask, Ordering::Release);
        self.irqs_pending_mask.fetch_or(mask, Ordering::Release);
    }

    fn clear_pending(&self, mask: u64) {
        self.irqs_pending.fetch_and(!mask, Ordering::Release);
        self.irqs_pending_mask.fetch_or(mask, Ordering::Release);
    }
}

/// An error creating a [`Partition`].
#[derive(Debug, Error)]
pub enum PartitionError {
    /// No processors were requested.
    #[error("a partition needs at least one virtual processor")]
    NoProcessors,
    /// Too many processors were requested.
    #[error("{count} virtual processors requested, at most {max} are supported")]
    TooManyProcessors {
        /// The requested count.
        count: u32,
        /// The supported maximum.
        max: u32,
    },
}

/// The virtual processors of a partition.
///
/// The set of processors is fixed at construction, so it can be iterated
/// from any processor's thread without a snapshot.
#[derive(Debug)]
pub struct Partition {
    vps: Vec<VcpuState>,
}

impl Partition {
    /// Creates a partition with `vp_count` processors, all online.
    pub fn new(vp_count: u32) -> Result<Self, PartitionError> {
        if vp_count == 0 {
            return Err(PartitionError::NoProcessors);
        }
        if vp_count > MAX_VPS {
            return Err(PartitionError::TooManyProcessors {
                count: vp_count,
                max: MAX_VPS,
            });
        }
        Ok(Self {
            vps: (0..vp_count)
                .map(|index| VcpuState::new(VpIndex::new(index)))
                .collect(),
        })
    }

    /// Looks up a processor by index.
    pub fn vp(&self, index: VpIndex) -> Option<&VcpuState> {
        self.vps.get(index.index() as usize)
    }

    /// Iterates over all processors in index order.
    pub fn vps(&self) -> impl Iterator<Item = &VcpuState> {
        self.vps.iter()
    }

    /// The number of online processors.
    pub fn online_count(&self) -> u32 {
        self.vps.len() as u32
    }
}

/// Returns the pending-word bit for `irq` if the guest may control it.
fn guest_interrupt_mask(irq: Interrupt) -> SbiResult<u64> {
    match irq {
        Interrupt::VS_SOFT | Interrupt::VS_TIMER | Interrupt::VS_EXT => {
            irq.mask().ok_or(SbiError::INVALID_PARAM)
        }
        _ => Err(SbiError::INVALID_PARAM),
    }
}

impl InterruptControl for Partition {
    fn set_interrupt(&self, vp: VpIndex, irq: Interrupt) -> SbiResult<()> {
        let mask = guest_interrupt_mask(irq)?;
        let vp = self.vp(vp).ok_or(SbiError::INVALID_PARAM)?;
        vp.set_pending(mask);
        tracing::trace!(vp = vp.index().index(), ?irq, "set interrupt");
        Ok(())
    }

    fn clear_interrupt(&self, vp: VpIndex, irq: Interrupt) -> SbiResult<()> {
        let mask = guest_interrupt_mask(irq)?;
        let vp = self.vp(vp).ok_or(SbiError::INVALID_PARAM)?;
        vp.clear_pending(mask);
        tracing::trace!(vp = vp.index().index(), ?irq, "clear interrupt");
        Ok(())
    }
}
