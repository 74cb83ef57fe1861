//! Pluggable disassembly backends behind one instruction contract.
//!
//! A symbolic-execution engine asks for "the instruction at this program
//! counter" without caring which disassembler answers. Three backends are
//! supported:
//!
//! * `capstone`: the Capstone engine, decoding straight from a byte buffer.
//! * `binja`: an analysis platform's plain textual disassembly.
//! * `binja-il`: the analysis platform's lifted IL, rebased onto runtime
//!   addresses.
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use unidisasm::{disasm::init_disassembler, Architecture};
//!
//! let (arch, mode, _) = Architecture::X86_64.capstone_target().unwrap();
//! let mut disasm = init_disassembler("capstone", arch, mode, None).unwrap();
//!
//! let code = [0x48, 0x89, 0xe5, 0xc3];
//! let insn = disasm.disassemble_instruction(&code, 0x401000).unwrap();
//! assert_eq!(insn.mnemonic().unwrap(), "mov");
//!
//! // Advancing the pc is up to the caller.
//! let next = 0x401000 + insn.size().unwrap();
//! let insn = disasm.disassemble_instruction(&code[3..], next).unwrap();
//! assert_eq!(insn.mnemonic().unwrap(), "ret");
//! ```

pub mod decoder;
pub mod disasm;
pub mod format;
pub mod instruction;
pub mod parser;
pub mod platform;
pub mod trace;

pub use disasm::{init_disassembler, Disassembler, DisassemblerKind};
pub use instruction::{Instruction, Operand};

use std::fmt;

use capstone::{Arch, Endian, Mode};
use clap::ValueEnum;

/// Represents an address in memory
pub type Address = u64;

/// Supported architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
#[non_exhaustive]
pub enum Architecture {
    /// 32-bit x86
    #[value(name = "x86-32")]
    X86_32,
    /// 64-bit x86
    #[value(name = "x86-64")]
    X86_64,
    /// ARM (32-bit)
    #[value(name = "arm")]
    Arm,
    /// ARM Thumb mode
    #[value(name = "thumb")]
    Thumb,
    /// AArch64 (ARM 64-bit)
    #[value(name = "aarch64")]
    AArch64,
    /// MIPS 32-bit
    #[value(name = "mips32")]
    Mips32,
    /// RISC-V 32-bit
    #[value(name = "riscv32")]
    RiscV32,
    /// RISC-V 64-bit
    #[value(name = "riscv64")]
    RiscV64,
    /// PowerPC 32-bit
    #[value(name = "ppc32")]
    Ppc32,
    /// Unknown architecture
    #[value(skip)]
    Unknown,
}

impl Architecture {
    /// Capstone `(Arch, Mode, Endian)` for this architecture, if it has one.
    pub fn capstone_target(&self) -> Option<(Arch, Mode, Endian)> {
        match self {
            Architecture::X86_32  => Some((Arch::X86, Mode::Mode32, Endian::Little)),
            Architecture::X86_64  => Some((Arch::X86, Mode::Mode64, Endian::Little)),
            Architecture::Arm     => Some((Arch::ARM, Mode::Arm, Endian::Little)),
            Architecture::Thumb   => Some((Arch::ARM, Mode::Thumb, Endian::Little)),
            Architecture::AArch64 => Some((Arch::ARM64, Mode::Arm, Endian::Little)),
            Architecture::Mips32  => Some((Arch::MIPS, Mode::Mips32, Endian::Little)),
            Architecture::RiscV32 => Some((Arch::RISCV, Mode::RiscV32, Endian::Little)),
            Architecture::RiscV64 => Some((Arch::RISCV, Mode::RiscV64, Endian::Little)),
            Architecture::Ppc32   => Some((Arch::PPC, Mode::Mode32, Endian::Big)),
            Architecture::Unknown => None,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::X86_32 => write!(f, "x86-32"),
            Architecture::X86_64 => write!(f, "x86-64"),
            Architecture::Arm => write!(f, "ARM"),
            Architecture::Thumb => write!(f, "Thumb"),
            Architecture::AArch64 => write!(f, "AArch64"),
            Architecture::Mips32 => write!(f, "MIPS32"),
            Architecture::RiscV32 => write!(f, "RISC-V 32"),
            Architecture::RiscV64 => write!(f, "RISC-V 64"),
            Architecture::Ppc32 => write!(f, "PowerPC 32"),
            Architecture::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Error type for disassembly operations
#[derive(Debug, thiserror::Error)]
pub enum DisasmError {
    /// The backend or instruction variant has no implementation for this
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// No valid instruction could be produced at `address`
    #[error("Decode failure at 0x{address:x}: {reason}")]
    DecodeFailure { address: Address, reason: String },

    /// The caller broke an accessor precondition
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    /// No function covers the pc, even after re-analysis
    #[error("No function covers 0x{0:x} after re-analysis")]
    FunctionNotFound(Address),

    /// The covering function has no lifted IL at the pc
    #[error("No lifted IL at 0x{0:x}")]
    NoLiftedIl(Address),

    /// A platform backend was requested without a view handle
    #[error("The {0} disassembler needs an analysis view")]
    MissingView(DisassemblerKind),

    /// Capstone rejected its configuration
    #[error("Capstone error: {0}")]
    Engine(#[from] capstone::Error),

    /// Failed to parse binary format
    #[error("Failed to parse binary format: {0}")]
    ParsingError(String),

    /// Malformed analysis export, or JSON output failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to render output
    #[error("Output error: {0}")]
    OutputError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capstone_target_mapping() {
        assert_eq!(
            Architecture::X86_64.capstone_target(),
            Some((Arch::X86, Mode::Mode64, Endian::Little))
        );
        assert_eq!(
            Architecture::Ppc32.capstone_target(),
            Some((Arch::PPC, Mode::Mode32, Endian::Big))
        );
        assert!(Architecture::Unknown.capstone_target().is_none());
    }

    #[test]
    fn test_architecture_cli_names() {
        let arch = Architecture::from_str("x86-64", true).unwrap();
        assert_eq!(arch, Architecture::X86_64);
        assert_eq!(Architecture::from_str("aarch64", true).unwrap(), Architecture::AArch64);
        assert!(Architecture::from_str("unknown", true).is_err());
    }

    #[test]
    fn test_error_messages() {
        let err = DisasmError::DecodeFailure { address: 0x1000, reason: "empty buffer".into() };
        assert_eq!(err.to_string(), "Decode failure at 0x1000: empty buffer");

        let err = DisasmError::MissingView(DisassemblerKind::BinjaIl);
        assert_eq!(err.to_string(), "The binja-il disassembler needs an analysis view");
    }
}
