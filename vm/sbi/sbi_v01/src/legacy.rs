// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The legacy (v0.1) SBI extension.
//!
//! This interface is frozen and kept only for older guests.

use crate::backend::GuestTrap;
use crate::backend::LegacyPlatform;
use crate::backend::ParkVcpus;
use crate::hart_mask::physical_cpus;
use crate::hart_mask::resolve_hart_mask;
use crate::hart_mask::HartMask;
use crate::partition::Partition;
use crate::partition::VpIndex;
use crate::regs::RegisterWidth;
use crate::regs::RiscvRegisterState;
use crate::regs::EXTENSION_ID_REGISTER;
use crate::regs::FUNCTION_ID_REGISTER;
use sbi_defs::Interrupt;
use sbi_defs::LegacyCall;
use sbi_defs::SbiError;
use sbi_defs::SbiForward;
use sbi_defs::SbiResult;
use sbi_defs::SystemEvent;
use sbi_defs::SystemEventType;
use sbi_defs::SBI_FORWARD_ARG_COUNT;
use zerocopy::FromZeros;

/// The state an SBI call operates on.
pub struct CallContext<'a, P: ?Sized> {
    /// The calling processor.
    pub vp: VpIndex,
    /// The processors of the calling partition.
    pub partition: &'a Partition,
    /// Host services.
    pub platform: &'a P,
    /// The calling processor's registers.
    pub regs: &'a mut dyn RiscvRegisterState,
    /// The guest's register width.
    pub width: RegisterWidth,
}

impl<P: ?Sized> CallContext<'_, P> {
    /// Reads argument register `a<n>`, truncated to the register width.
    pub fn arg(&mut self, n: u8) -> u64 {
        self.width.truncate(self.regs.a(n))
    }
}

/// A request for the host's outer run loop.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExitRequest {
    /// User space must emulate the call and return its results with
    /// [`SbiDispatcher::complete_forward`](crate::SbiDispatcher::complete_forward).
    Forward(SbiForward),
    /// The guest raised a system event.
    SystemEvent(SystemEvent),
}

/// The result of handling an SBI call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CallOutcome {
    /// The call finished; the status is returned to the guest.
    Complete(SbiResult<()>),
    /// The call must be finished by the outer run loop. Nothing is returned
    /// to the guest yet.
    Exit(ExitRequest),
    /// Reading a guest-supplied pointer faulted. The call had no effect and
    /// the trap must be redirected into the guest.
    Trap(GuestTrap),
}

impl CallOutcome {
    /// Returns true if the call must exit to the outer run loop.
    pub fn must_exit(&self) -> bool {
        matches!(self, CallOutcome::Exit(_))
    }

    /// The call's status, or `None` if the call trapped.
    pub fn status(&self) -> Option<SbiResult<()>> {
        match *self {
            CallOutcome::Complete(result) => Some(result),
            CallOutcome::Exit(_) => Some(Ok(())),
            CallOutcome::Trap(_) => None,
        }
    }
}

/// Handles the legacy call identified by `a7`.
///
/// The identifier comes straight from the guest; anything outside the
/// legacy block fails with `INVALID_PARAM`.
pub fn handle_legacy_call<P: LegacyPlatform + ?Sized>(
    ctx: &mut CallContext<'_, P>,
) -> CallOutcome {
    let call = LegacyCall(ctx.arg(EXTENSION_ID_REGISTER));
    tracing::trace!(?call, vp = ctx.vp.index(), "legacy sbi call");

    match call {
        LegacyCall::CONSOLE_GETCHAR | LegacyCall::CONSOLE_PUTCHAR => {
            // The console lives in user space.
            let forward = forward_request(ctx.regs);
            tracing::debug!(?call, vp = ctx.vp.index(), "forwarding console call");
            CallOutcome::Exit(ExitRequest::Forward(forward))
        }
        LegacyCall::SET_TIMER => {
            let deadline = ctx.width.join(ctx.regs.a(0), ctx.regs.a(1));
            CallOutcome::Complete(ctx.platform.arm(ctx.vp, deadline))
        }
        LegacyCall::CLEAR_IPI => {
            CallOutcome::Complete(ctx.platform.clear_interrupt(ctx.vp, Interrupt::VS_SOFT))
        }
        LegacyCall::SEND_IPI => {
            let mask = match target_harts(ctx) {
                Ok(mask) => mask,
                Err(trap) => return CallOutcome::Trap(trap),
            };
            CallOutcome::Complete(send_ipi(ctx.partition, ctx.platform, mask))
        }
        LegacyCall::REMOTE_FENCE_I
        | LegacyCall::REMOTE_SFENCE_VMA
        | LegacyCall::REMOTE_SFENCE_VMA_ASID => {
            let mask = match target_harts(ctx) {
                Ok(mask) => mask,
                Err(trap) => return CallOutcome::Trap(trap),
            };
            let cpus = physical_cpus(mask, ctx.partition);
            tracing::trace!(?call, ?mask, ?cpus, "remote fence");
            let result = match call {
                LegacyCall::REMOTE_FENCE_I => ctx.platform.broadcast_icache_sync(&cpus),
                LegacyCall::REMOTE_SFENCE_VMA => {
                    let (addr, size) = (ctx.arg(1), ctx.arg(2));
                    ctx.platform.broadcast_tlb_sync(&cpus, addr, size)
                }
                _ => {
                    let (addr, size, asid) = (ctx.arg(1), ctx.arg(2), ctx.arg(3));
                    ctx.platform.broadcast_tlb_sync_asid(&cpus, addr, size, asid)
                }
            };
            CallOutcome::Complete(result)
        }
        LegacyCall::SHUTDOWN => {
            tracing::debug!(vp = ctx.vp.index(), "guest requested shutdown");
            let event = system_shutdown(ctx.partition, ctx.platform, SystemEventType::SHUTDOWN);
            CallOutcome::Exit(ExitRequest::SystemEvent(event))
        }
        _ => CallOutcome::Complete(Err(SbiError::INVALID_PARAM)),
    }
}

/// Resolves the hart mask argument in `a0`.
fn target_harts<P: LegacyPlatform + ?Sized>(
    ctx: &mut CallContext<'_, P>,
) -> Result<HartMask, GuestTrap> {
    let mask_addr = ctx.arg(0);
    resolve_hart_mask(
        ctx.platform,
        ctx.vp,
        mask_addr,
        ctx.partition.online_count(),
        ctx.width,
    )
}

/// Pends a software interrupt on every hart in `mask`.
///
/// Stops at the first failure. Harts already signaled stay signaled.
fn send_ipi<P: LegacyPlatform + ?Sized>(
    partition: &Partition,
    platform: &P,
    mask: HartMask,
) -> SbiResult<()> {
    for index in mask {
        let target = VpIndex::new(index);
        if partition.vp(target).is_none() {
            continue;
        }
        platform.set_interrupt(target, Interrupt::VS_SOFT)?;
    }
    Ok(())
}

/// Powers off every processor in the partition and asks the scheduler to
/// park them all, returning the event to report to the outer run loop.
fn system_shutdown<P: ParkVcpus + ?Sized>(
    partition: &Partition,
    platform: &P,
    event_type: SystemEventType,
) -> SystemEvent {
    for vp in partition.vps() {
        vp.power_off();
    }
    platform.broadcast_park_request(partition);

    let mut event = SystemEvent::new_zeroed();
    event.event_type = event_type;
    event
}

/// Captures the registers of a call that user space must emulate.
fn forward_request(regs: &mut dyn RiscvRegisterState) -> SbiForward {
    let mut args = [0; SBI_FORWARD_ARG_COUNT];
    for (n, arg) in args.iter_mut().enumerate() {
        *arg = regs.a(n as u8);
    }
    SbiForward {
        extension_id: regs.a(EXTENSION_ID_REGISTER),
        function_id: regs.a(FUNCTION_ID_REGISTER),
        args,
        ret: [regs.a(0), regs.a(1)],
    }
}
