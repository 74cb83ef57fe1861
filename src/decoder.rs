//! Native disassembly through Capstone.

use std::fmt;

use capstone::{Arch, Capstone, Endian, Mode, Syntax, NO_EXTRA_MODE};

use crate::instruction::{Instruction, NativeInstruction};
use crate::{Address, Architecture, DisasmError};

/// Capstone-backed disassembler: one instruction per call, straight from bytes.
#[derive(Debug)]
pub struct CapstoneDisasm {
    cs: Capstone,
    arch: Arch,
    mode: Mode,
}

impl CapstoneDisasm {
    /// Build a detailed-mode decoder for `arch`/`mode` with Capstone's default endianness.
    pub fn new(arch: Arch, mode: Mode) -> Result<Self, DisasmError> {
        Self::with_endian(arch, mode, None)
    }

    /// Build a detailed-mode decoder with an explicit endianness.
    pub fn with_endian(arch: Arch, mode: Mode, endian: Option<Endian>) -> Result<Self, DisasmError> {
        let mut cs = Capstone::new_raw(arch, mode, NO_EXTRA_MODE, endian)?;
        // Operand lists need detail mode.
        cs.set_detail(true)?;
        if arch == Arch::X86 {
            cs.set_syntax(Syntax::Intel)?;
        }
        Ok(Self { cs, arch, mode })
    }

    /// Create a decoder for a specific architecture
    pub fn for_architecture(arch: Architecture) -> Result<Self, DisasmError> {
        let (cs_arch, mode, endian) = arch.capstone_target().ok_or_else(|| {
            DisasmError::UnsupportedOperation(format!("no Capstone target for {} binaries", arch))
        })?;
        Self::with_endian(cs_arch, mode, Some(endian))
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Decode the first instruction of `code`, placed at `pc`.
    ///
    /// An empty buffer, or one that does not start with a valid encoding, is a
    /// [`DisasmError::DecodeFailure`].
    pub fn disassemble_instruction(&self, code: &[u8], pc: Address) -> Result<Instruction, DisasmError> {
        let insns = self.cs.disasm_count(code, pc, 1).map_err(|e| DisasmError::DecodeFailure {
            address: pc,
            reason: e.to_string(),
        })?;
        let insn = insns.iter().next().ok_or_else(|| DisasmError::DecodeFailure {
            address: pc,
            reason: if code.is_empty() {
                "empty buffer".to_string()
            } else {
                format!("no valid instruction in {} bytes", code.len())
            },
        })?;

        let detail = self.cs.insn_detail(&insn)?;
        let arch_detail = detail.arch_detail();
        let operands = arch_detail.operands();

        let mnemonic = insn.mnemonic().unwrap_or("").to_string();
        let insn_name = self.cs.insn_name(insn.id()).unwrap_or_else(|| mnemonic.clone());

        Ok(Instruction::Native(NativeInstruction {
            address: insn.address(),
            mnemonic,
            op_str: insn.op_str().unwrap_or("").to_string(),
            bytes: insn.bytes().to_vec(),
            operands,
            insn_name,
        }))
    }
}

impl fmt::Display for CapstoneDisasm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CapstoneDisasm::{:?}/{:?}", self.arch, self.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_x86_decode() {
        // mov eax, 1
        let bytes = [0xb8, 0x01, 0x00, 0x00, 0x00];
        let disasm = CapstoneDisasm::new(Arch::X86, Mode::Mode32).unwrap();

        let insn = disasm.disassemble_instruction(&bytes, 0x8048000).unwrap();
        assert_eq!(insn.address().unwrap(), 0x8048000);
        assert_eq!(insn.size().unwrap(), 5);
        assert_eq!(insn.mnemonic().unwrap(), "mov");
        assert_eq!(insn.op_str().unwrap(), "eax, 1");
        assert_eq!(insn.insn_name().unwrap(), "mov");
        assert_eq!(insn.operands().unwrap().len(), 2);
    }

    #[test]
    fn test_only_first_instruction_is_decoded() {
        // push rbp; mov rbp, rsp
        let bytes = [0x55, 0x48, 0x89, 0xe5];
        let disasm = CapstoneDisasm::for_architecture(Architecture::X86_64).unwrap();

        let insn = disasm.disassemble_instruction(&bytes, 0x401000).unwrap();
        assert_eq!(insn.mnemonic().unwrap(), "push");
        assert_eq!(insn.op_str().unwrap(), "rbp");
        assert_eq!(insn.size().unwrap(), 1);

        let insn = disasm.disassemble_instruction(&bytes[1..], 0x401001).unwrap();
        assert_eq!(insn.mnemonic().unwrap(), "mov");
        assert_eq!(insn.op_str().unwrap(), "rbp, rsp");
        assert_eq!(insn.size().unwrap(), 3);
    }

    #[test]
    fn test_empty_buffer_is_decode_failure() {
        let disasm = CapstoneDisasm::for_architecture(Architecture::X86_64).unwrap();
        let err = disasm.disassemble_instruction(&[], 0x1000).unwrap_err();
        assert!(matches!(err, DisasmError::DecodeFailure { address: 0x1000, .. }));
    }

    #[test]
    fn test_truncated_encoding_is_decode_failure() {
        // ARM instructions are four bytes wide.
        let disasm = CapstoneDisasm::for_architecture(Architecture::Arm).unwrap();
        let err = disasm.disassemble_instruction(&[0x00, 0x00], 0x1000).unwrap_err();
        assert!(matches!(err, DisasmError::DecodeFailure { .. }));
    }

    #[test]
    fn test_unknown_architecture() {
        let err = CapstoneDisasm::for_architecture(Architecture::Unknown).unwrap_err();
        assert!(matches!(err, DisasmError::UnsupportedOperation(_)));
    }

    #[test]
    fn test_display() {
        let disasm = CapstoneDisasm::new(Arch::X86, Mode::Mode64).unwrap();
        assert_eq!(disasm.to_string(), "CapstoneDisasm::X86/Mode64");
    }
}
