// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Guest register access for SBI calls.

/// The register holding the extension ID.
pub const EXTENSION_ID_REGISTER: u8 = 7;
/// The register holding the function ID.
pub const FUNCTION_ID_REGISTER: u8 = 6;

/// Provides access to the RISC-V register state needed to handle SBI calls.
pub trait RiscvRegisterState {
    /// Gets the address of the trapping `ecall` instruction.
    fn sepc(&mut self) -> u64;
    /// Sets the address at which the guest resumes.
    fn set_sepc(&mut self, pc: u64);
    /// Gets argument register `a<n>`, `n <= 7`.
    fn a(&mut self, n: u8) -> u64;
    /// Sets argument register `a<n>`, `n <= 7`.
    fn set_a(&mut self, n: u8, v: u64);
}

impl<T: RiscvRegisterState + ?Sized> RiscvRegisterState for &'_ mut T {
    fn sepc(&mut self) -> u64 {
        (**self).sepc()
    }

    fn set_sepc(&mut self, pc: u64) {
        (**self).set_sepc(pc)
    }

    fn a(&mut self, n: u8) -> u64 {
        (**self).a(n)
    }

    fn set_a(&mut self, n: u8, v: u64) {
        (**self).set_a(n, v)
    }
}

/// A snapshot of the argument registers and `sepc`.
///
/// Useful for trap layers that copy the guest context out before handling
/// the call and back in afterwards.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SbiRegisters {
    /// `a0` through `a7`.
    pub a: [u64; 8],
    /// The guest program counter.
    pub sepc: u64,
}

impl RiscvRegisterState for SbiRegisters {
    fn sepc(&mut self) -> u64 {
        self.sepc
    }

    fn set_sepc(&mut self, pc: u64) {
        self.sepc = pc;
    }

    fn a(&mut self, n: u8) -> u64 {
        self.a[n as usize]
    }

    fn set_a(&mut self, n: u8, v: u64) {
        self.a[n as usize] = v;
    }
}

/// The guest's native register width.
///
/// This selects how 64-bit arguments are passed, how wide a hart mask in
/// guest memory is, and how register values are truncated.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum RegisterWidth {
    /// 32-bit registers. 64-bit values are split across two registers, low
    /// half first.
    Rv32,
    /// 64-bit registers.
    #[default]
    Rv64,
}

impl RegisterWidth {
    /// The register width in bits.
    pub fn bits(self) -> u32 {
        match self {
            RegisterWidth::Rv32 => 32,
            RegisterWidth::Rv64 => 64,
        }
    }

    /// The size of a machine word in bytes.
    pub fn word_size(self) -> usize {
        self.bits() as usize / 8
    }

    /// Truncates `v` to a register's worth of bits.
    pub fn truncate(self, v: u64) -> u64 {
        match self {
            RegisterWidth::Rv32 => v as u32 as u64,
            RegisterWidth::Rv64 => v,
        }
    }

    /// Reassembles a 64-bit value from the registers it was passed in.
    ///
    /// On RV64 the value is entirely in `lo`. On RV32 `lo` carries the low
    /// half and `hi` the high half.
    pub fn join(self, lo: u64, hi: u64) -> u64 {
        match self {
            RegisterWidth::Rv32 => ((hi as u32 as u64) << 32) | lo as u32 as u64,
            RegisterWidth::Rv64 => lo,
        }
    }

    /// Splits a 64-bit value into the `(lo, hi)` registers a guest passes
    /// it in. The inverse of [`Self::join`].
    pub fn split(self, v: u64) -> (u64, u64) {
        match self {
            RegisterWidth::Rv32 => (v as u32 as u64, v >> 32),
            RegisterWidth::Rv64 => (v, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_split_identity() {
        let values = [
            0,
            1,
            0xffff_ffff,
            0x1_0000_0000,
            0x1234_5678_9abc_def0,
            u64::MAX,
        ];
        for width in [RegisterWidth::Rv32, RegisterWidth::Rv64] {
            for &v in &values {
                let (lo, hi) = width.split(v);
                assert_eq!(width.truncate(lo), lo, "{width:?} {v:#x}");
                assert_eq!(width.truncate(hi), hi, "{width:?} {v:#x}");
                assert_eq!(width.join(lo, hi), v, "{width:?} {v:#x}");
            }
        }
    }

    #[test]
    fn rv32_ignores_upper_register_bits() {
        let deadline = RegisterWidth::Rv32.join(0xdead_0000_0000_0002, 0xbeef_0000_0000_0001);
        assert_eq!(deadline, 0x1_0000_0002);
    }

    #[test]
    fn rv64_ignores_high_register() {
        assert_eq!(RegisterWidth::Rv64.join(5, 7), 5);
    }

    #[test]
    fn word_size() {
        assert_eq!(RegisterWidth::Rv32.word_size(), 4);
        assert_eq!(RegisterWidth::Rv64.word_size(), 8);
    }
}
