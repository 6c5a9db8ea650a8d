// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! RISC-V Supervisor Binary Interface definitions for the legacy (v0.1)
//! extension.
//!
//! These are the identifiers, status codes and exit payloads shared between
//! the legacy call dispatcher and the host's outer run loop. The numeric
//! values are part of the guest ABI and must not change.

#![no_std]

use core::fmt::Debug;
use core::num::NonZeroI64;
use static_assertions::const_assert_eq;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// Defines named constants on a transparent integer newtype, with a `Debug`
/// implementation that prints the constant's name when there is one.
macro_rules! open_consts {
    ($ty:ty, $(#[doc = $doc:expr] $ident:ident = $val:literal),* $(,)?) => {
        #[allow(non_upper_case_globals)]
        impl $ty {
            $(
                #[doc = $doc]
                pub const $ident: Self = Self($val);
            )*

            /// Returns the name of the value, if it is a known one.
            pub fn name(&self) -> Option<&'static str> {
                Some(match self.0 {
                    $(
                        $val => stringify!($ident),
                    )*
                    _ => return None,
                })
            }
        }

        impl Debug for $ty {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                match self.name() {
                    Some(name) => f.pad(name),
                    None => Debug::fmt(&self.0, f),
                }
            }
        }
    };
}

/// A legacy SBI call identifier, passed by the guest in `a7`.
///
/// The legacy extension has no separate function ID: each call is its own
/// extension ID, and together they form one contiguous block.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct LegacyCall(pub u64);

open_consts! {
    LegacyCall,
    /// Arm the calling hart's timer.
    SET_TIMER = 0,
    /// Write a character to the debug console.
    CONSOLE_PUTCHAR = 1,
    /// Read a character from the debug console.
    CONSOLE_GETCHAR = 2,
    /// Clear the calling hart's pending software interrupt.
    CLEAR_IPI = 3,
    /// Send a software interrupt to a set of harts.
    SEND_IPI = 4,
    /// Execute `fence.i` on a set of harts.
    REMOTE_FENCE_I = 5,
    /// Execute `sfence.vma` on a set of harts.
    REMOTE_SFENCE_VMA = 6,
    /// Execute `sfence.vma` for one ASID on a set of harts.
    REMOTE_SFENCE_VMA_ASID = 7,
    /// Shut down all harts.
    SHUTDOWN = 8,
}

impl LegacyCall {
    /// The first identifier claimed by the legacy extension.
    pub const FIRST: Self = Self::SET_TIMER;
    /// The last identifier claimed by the legacy extension, inclusive.
    pub const LAST: Self = Self::SHUTDOWN;

    /// Returns true if this identifier falls in the legacy block.
    pub fn is_legacy(&self) -> bool {
        (Self::FIRST..=Self::LAST).contains(self)
    }
}

/// An SBI error code. Success (zero) is not an error and cannot be
/// represented.
//
// DEVNOTE: the doc comments on the constants are also the `Display` strings.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct SbiError(NonZeroI64);

macro_rules! sbi_error {
    ($ty:ty, $(#[doc = $doc:expr] $ident:ident = $val:literal),* $(,)?) => {
        impl $ty {
            $(
                #[doc = $doc]
                pub const $ident: Self = Self(NonZeroI64::new($val).unwrap());
            )*

            fn debug_name(&self) -> Option<&'static str> {
                Some(match self.0.get() {
                    $(
                        $val => stringify!($ident),
                    )*
                    _ => return None,
                })
            }

            fn doc_str(&self) -> Option<&'static str> {
                Some(match self.0.get() {
                    $(
                        $val => $doc.trim_ascii(),
                    )*
                    _ => return None,
                })
            }
        }
    };
}

sbi_error! {
    SbiError,
    /// Failed
    FAILED = -1,
    /// Not supported
    NOT_SUPPORTED = -2,
    /// Invalid parameter
    INVALID_PARAM = -3,
    /// Denied
    DENIED = -4,
    /// Invalid address
    INVALID_ADDRESS = -5,
    /// Already available
    ALREADY_AVAILABLE = -6,
    /// Already started
    ALREADY_STARTED = -7,
    /// Already stopped
    ALREADY_STOPPED = -8,
}

impl SbiError {
    /// Returns the raw error code as the guest sees it in `a0`.
    pub fn code(&self) -> i64 {
        self.0.get()
    }
}

impl From<NonZeroI64> for SbiError {
    fn from(code: NonZeroI64) -> Self {
        Self(code)
    }
}

impl Debug for SbiError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.debug_name() {
            Some(name) => f.pad(name),
            None => Debug::fmt(&self.0.get(), f),
        }
    }
}

impl core::fmt::Display for SbiError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.doc_str() {
            Some(s) => f.write_str(s),
            None => write!(f, "SBI error {}", self.0),
        }
    }
}

impl core::error::Error for SbiError {}

/// Result type for SBI calls.
pub type SbiResult<T> = Result<T, SbiError>;

/// Converts a call result to the status value returned in `a0`.
pub fn status_code(result: SbiResult<()>) -> i64 {
    match result {
        Ok(()) => 0,
        Err(err) => err.code(),
    }
}

/// A hart-local interrupt number, as used in the `hip`/`hvip` CSRs.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Interrupt(pub u32);

open_consts! {
    Interrupt,
    /// Virtual supervisor software interrupt.
    VS_SOFT = 2,
    /// Virtual supervisor timer interrupt.
    VS_TIMER = 6,
    /// Virtual supervisor external interrupt.
    VS_EXT = 10,
}

impl Interrupt {
    /// The number of hart-local interrupt bits.
    pub const LOCAL_MAX: u32 = 64;

    /// Returns the interrupt's bit in a pending word, or `None` if the
    /// interrupt number does not fit in one.
    pub fn mask(&self) -> Option<u64> {
        1u64.checked_shl(self.0)
    }
}

/// A RISC-V synchronous exception cause, as reported in `scause`.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ExceptionCause(pub u64);

open_consts! {
    ExceptionCause,
    /// Load address misaligned.
    LOAD_ADDRESS_MISALIGNED = 4,
    /// Load access fault.
    LOAD_ACCESS_FAULT = 5,
    /// Load guest-page fault.
    LOAD_GUEST_PAGE_FAULT = 21,
}

/// The kind of a [`SystemEvent`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, IntoBytes, Immutable, KnownLayout, FromBytes)]
#[repr(transparent)]
pub struct SystemEventType(pub u32);

open_consts! {
    SystemEventType,
    /// The guest requested power off.
    SHUTDOWN = 1,
    /// The guest requested a reset.
    RESET = 2,
    /// The guest crashed.
    CRASH = 3,
}

/// The number of data words in a [`SystemEvent`].
pub const SYSTEM_EVENT_DATA_LEN: usize = 16;

/// A system event delivered to the host's outer run loop.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct SystemEvent {
    /// The event kind.
    pub event_type: SystemEventType,
    /// The number of valid entries in `data`.
    pub ndata: u32,
    /// Event-specific data.
    pub data: [u64; SYSTEM_EVENT_DATA_LEN],
}

const_assert_eq!(size_of::<SystemEvent>(), 136);

/// The number of argument registers carried by an [`SbiForward`].
pub const SBI_FORWARD_ARG_COUNT: usize = 6;

/// An SBI call forwarded to user space for emulation.
///
/// `ret` is pre-populated with the guest's `a0` and `a1`; user space
/// overwrites it with the values to return to the guest.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct SbiForward {
    /// The extension ID, from `a7`.
    pub extension_id: u64,
    /// The function ID, from `a6`.
    pub function_id: u64,
    /// Arguments `a0` through `a5`.
    pub args: [u64; SBI_FORWARD_ARG_COUNT],
    /// Values to return in `a0` and `a1`.
    pub ret: [u64; 2],
}

const_assert_eq!(size_of::<SbiForward>(), 80);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_range() {
        assert!(LegacyCall::SET_TIMER.is_legacy());
        assert!(LegacyCall::SHUTDOWN.is_legacy());
        assert!(LegacyCall(5).is_legacy());
        assert!(!LegacyCall(9).is_legacy());
        assert!(!LegacyCall(0x10).is_legacy());
        assert!(!LegacyCall(u64::MAX).is_legacy());
    }

    #[test]
    fn error_codes() {
        assert_eq!(SbiError::FAILED.code(), -1);
        assert_eq!(SbiError::INVALID_PARAM.code(), -3);
        assert_eq!(status_code(Ok(())), 0);
        assert_eq!(status_code(Err(SbiError::NOT_SUPPORTED)), -2);
    }

    #[test]
    fn error_formatting() {
        extern crate std;
        use std::format;

        assert_eq!(format!("{:?}", SbiError::DENIED), "DENIED");
        assert_eq!(format!("{}", SbiError::DENIED), "Denied");
        assert_eq!(format!("{}", SbiError::NOT_SUPPORTED), "Not supported");
        assert_eq!(format!("{}", SbiError::ALREADY_STOPPED), "Already stopped");
        let unknown = SbiError::from(NonZeroI64::new(-99).unwrap());
        assert_eq!(format!("{:?}", unknown), "-99");
        assert_eq!(format!("{}", unknown), "SBI error -99");
        assert_eq!(format!("{:?}", LegacyCall::SEND_IPI), "SEND_IPI");
        assert_eq!(format!("{:?}", LegacyCall(42)), "42");
    }

    #[test]
    fn interrupt_mask() {
        assert_eq!(Interrupt::VS_SOFT.mask(), Some(1 << 2));
        assert_eq!(Interrupt(63).mask(), Some(1 << 63));
        assert_eq!(Interrupt(Interrupt::LOCAL_MAX).mask(), None);
    }
}
