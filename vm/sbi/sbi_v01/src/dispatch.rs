// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Extension lookup and ecall completion.

use crate::backend::GuestTrap;
use crate::backend::LegacyPlatform;
use crate::legacy::handle_legacy_call;
use crate::legacy::CallContext;
use crate::legacy::CallOutcome;
use crate::legacy::ExitRequest;
use crate::partition::Partition;
use crate::partition::VpIndex;
use crate::regs::RegisterWidth;
use crate::regs::RiscvRegisterState;
use crate::regs::EXTENSION_ID_REGISTER;
use sbi_defs::status_code;
use sbi_defs::LegacyCall;
use sbi_defs::SbiError;
use sbi_defs::SbiForward;
use sbi_defs::SbiResult;
use std::fmt::Debug;

/// The size of the `ecall` instruction.
const ECALL_LEN: u64 = 4;

/// Configuration for an [`SbiDispatcher`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SbiConfig {
    /// The guest's register width.
    pub register_width: RegisterWidth,
    /// Whether the legacy extension is offered to the guest.
    pub legacy_extension: bool,
}

impl Default for SbiConfig {
    fn default() -> Self {
        Self {
            register_width: RegisterWidth::Rv64,
            legacy_extension: true,
        }
    }
}

/// An SBI extension: the inclusive range of extension IDs it claims and the
/// function that handles them.
pub struct SbiExtension<P: ?Sized> {
    /// The first extension ID.
    pub ext_id_start: u64,
    /// The last extension ID, inclusive.
    pub ext_id_end: u64,
    /// Handles a call to any ID in the range.
    pub handler: fn(&mut CallContext<'_, P>) -> CallOutcome,
}

impl<P: LegacyPlatform + ?Sized> SbiExtension<P> {
    /// The legacy extension.
    pub const LEGACY: Self = Self {
        ext_id_start: LegacyCall::FIRST.0,
        ext_id_end: LegacyCall::LAST.0,
        handler: handle_legacy_call::<P>,
    };
}

impl<P: ?Sized> SbiExtension<P> {
    /// Returns true if this extension handles `ext_id`.
    pub fn claims(&self, ext_id: u64) -> bool {
        (self.ext_id_start..=self.ext_id_end).contains(&ext_id)
    }
}

impl<P: ?Sized> Clone for SbiExtension<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: ?Sized> Copy for SbiExtension<P> {}

impl<P: ?Sized> Debug for SbiExtension<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SbiExtension")
            .field("ext_id_start", &format_args!("{:#x}", self.ext_id_start))
            .field("ext_id_end", &format_args!("{:#x}", self.ext_id_end))
            .finish()
    }
}

/// What the trap layer must do once an `ecall` has been dispatched.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EcallExit {
    /// The result is in the guest's registers and `sepc` has moved past the
    /// `ecall`. Resume the guest.
    Resume,
    /// Exit to the outer run loop. `sepc` still points at the `ecall`.
    Exit(ExitRequest),
    /// Redirect this trap into the guest. `sepc` still points at the
    /// `ecall`.
    RedirectTrap(GuestTrap),
}

/// Routes guest `ecall`s to the extension that claims them.
pub struct SbiDispatcher<P: ?Sized> {
    config: SbiConfig,
    extensions: Vec<SbiExtension<P>>,
}

impl<P: LegacyPlatform + ?Sized> SbiDispatcher<P> {
    /// Returns a dispatcher offering the extensions enabled in `config`.
    pub fn new(config: SbiConfig) -> Self {
        let mut extensions = Vec::new();
        if config.legacy_extension {
            extensions.push(SbiExtension::LEGACY);
        }
        Self { config, extensions }
    }
}

impl<P: ?Sized> SbiDispatcher<P> {
    /// The dispatcher's configuration.
    pub fn config(&self) -> &SbiConfig {
        &self.config
    }

    /// Returns the extension claiming `ext_id`.
    pub fn find_extension(&self, ext_id: u64) -> Option<&SbiExtension<P>> {
        self.extensions.iter().find(|ext| ext.claims(ext_id))
    }

    /// Dispatches the `ecall` that `vp` just trapped on and updates its
    /// registers accordingly.
    ///
    /// An extension ID that no registered extension claims completes with
    /// `NOT_SUPPORTED`. This differs from calling [`handle_legacy_call`]
    /// directly, which rejects IDs outside the legacy block with
    /// `INVALID_PARAM`; through the dispatcher such IDs never reach it.
    pub fn dispatch(
        &self,
        vp: VpIndex,
        partition: &Partition,
        platform: &P,
        regs: &mut dyn RiscvRegisterState,
    ) -> EcallExit {
        let width = self.config.register_width;
        let ext_id = width.truncate(regs.a(EXTENSION_ID_REGISTER));
        let Some(extension) = self.find_extension(ext_id) else {
            tracing::trace!(ext_id, vp = vp.index(), "unsupported sbi extension");
            self.complete(regs, Err(SbiError::NOT_SUPPORTED));
            return EcallExit::Resume;
        };

        let outcome = (extension.handler)(&mut CallContext {
            vp,
            partition,
            platform,
            regs: &mut *regs,
            width,
        });

        match outcome {
            CallOutcome::Complete(result) => {
                self.complete(regs, result);
                EcallExit::Resume
            }
            CallOutcome::Exit(request) => EcallExit::Exit(request),
            CallOutcome::Trap(mut trap) => {
                trap.sepc = regs.sepc();
                EcallExit::RedirectTrap(trap)
            }
        }
    }

    /// Finishes a call that was forwarded to user space, returning `ret` to
    /// the guest and moving past the `ecall`.
    pub fn complete_forward(&self, regs: &mut dyn RiscvRegisterState, forward: &SbiForward) {
        let width = self.config.register_width;
        regs.set_a(0, width.truncate(forward.ret[0]));
        regs.set_a(1, width.truncate(forward.ret[1]));
        self.advance_pc(regs);
    }

    fn complete(&self, regs: &mut dyn RiscvRegisterState, result: SbiResult<()>) {
        let status = status_code(result) as u64;
        regs.set_a(0, self.config.register_width.truncate(status));
        // Legacy calls have no output value.
        regs.set_a(1, 0);
        self.advance_pc(regs);
    }

    fn advance_pc(&self, regs: &mut dyn RiscvRegisterState) {
        let pc = regs.sepc().wrapping_add(ECALL_LEN);
        regs.set_sepc(self.config.register_width.truncate(pc));
    }
}

impl<P: ?Sized> Debug for SbiDispatcher<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SbiDispatcher")
            .field("config", &self.config)
            .field("extensions", &self.extensions)
            .finish()
    }
}
