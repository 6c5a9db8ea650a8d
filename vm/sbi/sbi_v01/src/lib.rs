// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Legacy RISC-V SBI call handling.
//!
//! This crate implements the host side of the frozen v0.1 Supervisor Binary
//! Interface: console forwarding, timer programming, software interrupts,
//! remote fences and shutdown. Each call arrives as an `ecall` trap from a
//! virtual processor; every argument is guest controlled and is validated
//! before it is used to reach another processor's state.
//!
//! To use it, implement the host service traits ([`GuestMemoryRead`],
//! [`VcpuTimer`], [`InterruptControl`], [`ParkVcpus`] and [`RemoteFence`])
//! and provide register access through [`RiscvRegisterState`]. Then build an
//! [`SbiDispatcher`] and call [`SbiDispatcher::dispatch`] from the trap
//! handler of each virtual processor.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod dispatch;
mod hart_mask;
mod legacy;
mod memory;
mod partition;
mod regs;

pub use self::backend::GuestMemoryRead;
pub use self::backend::GuestTrap;
pub use self::backend::InterruptControl;
pub use self::backend::LegacyPlatform;
pub use self::backend::ParkVcpus;
pub use self::backend::RemoteFence;
pub use self::backend::VcpuTimer;
pub use self::dispatch::EcallExit;
pub use self::dispatch::SbiConfig;
pub use self::dispatch::SbiDispatcher;
pub use self::dispatch::SbiExtension;
pub use self::hart_mask::physical_cpus;
pub use self::hart_mask::resolve_hart_mask;
pub use self::hart_mask::HartMask;
pub use self::hart_mask::HartMaskIter;
pub use self::hart_mask::PhysicalCpuSet;
pub use self::legacy::handle_legacy_call;
pub use self::legacy::CallContext;
pub use self::legacy::CallOutcome;
pub use self::legacy::ExitRequest;
pub use self::memory::FlatGuestMemory;
pub use self::memory::GuestMemoryError;
pub use self::partition::Partition;
pub use self::partition::PartitionError;
pub use self::partition::VcpuState;
pub use self::partition::VpIndex;
pub use self::partition::MAX_VPS;
pub use self::regs::RegisterWidth;
pub use self::regs::RiscvRegisterState;
pub use self::regs::SbiRegisters;
pub use self::regs::EXTENSION_ID_REGISTER;
pub use self::regs::FUNCTION_ID_REGISTER;
