//! The instruction contract shared by every backend.
//!
//! Each backend produces one [`Instruction`] variant. Accessors a variant
//! cannot answer return [`DisasmError::UnsupportedOperation`] rather than a
//! made-up value.

use std::fmt;
use std::rc::Rc;

use capstone::arch::ArchOperand;

use crate::platform::{AnalysisFunction, AnalysisView, IlOperand, LiftedIl};
use crate::{Address, DisasmError};

/// Prefix carried by every lifted-IL opcode tag.
pub const IL_OPCODE_PREFIX: &str = "LLIL_";

/// Strip [`IL_OPCODE_PREFIX`] from an opcode tag, if present.
pub fn strip_il_prefix(tag: &str) -> &str {
    tag.strip_prefix(IL_OPCODE_PREFIX).unwrap_or(tag)
}

/// One structured operand, in the representation of the backend that produced it.
#[derive(Debug, Clone)]
pub enum Operand {
    /// Capstone architecture-specific operand
    Native(ArchOperand),
    /// Lifted-IL operand
    Il(IlOperand),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Native(op) => write!(f, "{:?}", op),
            Operand::Il(op) => write!(f, "{}", op),
        }
    }
}

/// An instruction decoded by the native engine.
#[derive(Debug, Clone)]
pub struct NativeInstruction {
    pub(crate) address: Address,
    pub(crate) mnemonic: String,
    pub(crate) op_str: String,
    pub(crate) bytes: Vec<u8>,
    pub(crate) operands: Vec<ArchOperand>,
    pub(crate) insn_name: String,
}

impl NativeInstruction {
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    pub fn op_str(&self) -> &str {
        &self.op_str
    }

    /// Encoded length in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Raw encoding of the instruction.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn operands(&self) -> &[ArchOperand] {
        &self.operands
    }

    /// Engine-level instruction name (e.g. `mov`).
    pub fn insn_name(&self) -> &str {
        &self.insn_name
    }
}

/// Text returned by the analysis platform's plain disassembly.
///
/// Only the `operands` slot is usable; everything else is unsupported.
#[derive(Debug, Clone, Default)]
pub struct TextInstruction {
    text: String,
    operands: Vec<Operand>,
}

impl TextInstruction {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), operands: Vec::new() }
    }

    /// The platform's rendering, untouched.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    pub fn set_operands(&mut self, operands: Vec<Operand>) {
        self.operands = operands;
    }
}

/// A lifted-IL instruction, exposed in runtime address space.
///
/// Holds the function it belongs to so `size()` can look at the next IL
/// instruction. Must not outlive a re-analysis of that function.
#[derive(Debug, Clone)]
pub struct IlInstruction {
    view: Rc<dyn AnalysisView>,
    function: Rc<dyn AnalysisFunction>,
    il: LiftedIl,
    entry_point_diff: i64,
}

impl IlInstruction {
    pub(crate) fn new(
        view: Rc<dyn AnalysisView>,
        function: Rc<dyn AnalysisFunction>,
        il: LiftedIl,
        entry_point_diff: i64,
    ) -> Self {
        Self { view, function, il, entry_point_diff }
    }

    /// Runtime address (the platform address shifted back by the adapter's offset).
    pub fn address(&self) -> Address {
        self.il.address.wrapping_add(self.entry_point_diff as u64)
    }

    /// Address as the analysis platform sees it.
    pub fn raw_address(&self) -> Address {
        self.il.address
    }

    pub fn index(&self) -> usize {
        self.il.index
    }

    pub fn mnemonic(&self) -> &str {
        &self.il.operation
    }

    pub fn op_str(&self) -> String {
        self.il
            .operands
            .iter()
            .map(|op| op.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Distance to the next IL instruction of the same function.
    ///
    /// Fails with [`DisasmError::ContractViolation`] on the last IL instruction,
    /// and when the next IL instruction sits at a lower address.
    pub fn size(&self) -> Result<u64, DisasmError> {
        let next_index = self.il.index + 1;
        let next = self.function.il(next_index).ok_or_else(|| {
            DisasmError::ContractViolation(format!(
                "size() on the last IL instruction (index {}) of the function at 0x{:x}",
                self.il.index,
                self.function.start()
            ))
        })?;
        next.address.checked_sub(self.il.address).ok_or_else(|| {
            DisasmError::ContractViolation(format!(
                "next IL instruction (index {}) at 0x{:x} precedes 0x{:x}",
                next_index, next.address, self.il.address
            ))
        })
    }

    pub fn operands(&self) -> &[IlOperand] {
        &self.il.operands
    }

    pub fn insn_name(&self) -> &str {
        &self.il.operation
    }

    /// Opcode tag without the `LLIL_` prefix.
    pub fn name(&self) -> &str {
        strip_il_prefix(&self.il.operation)
    }

    pub fn lifted(&self) -> &LiftedIl {
        &self.il
    }

    pub fn view(&self) -> &Rc<dyn AnalysisView> {
        &self.view
    }
}

/// One instruction, from whichever backend is in use.
#[derive(Debug, Clone)]
pub enum Instruction {
    /// Decoded by the native engine
    Native(NativeInstruction),
    /// Plain platform text
    Text(TextInstruction),
    /// Lifted platform IL
    Il(IlInstruction),
}

fn unsupported<T>(accessor: &str) -> Result<T, DisasmError> {
    Err(DisasmError::UnsupportedOperation(format!(
        "{}() on a plain-text instruction",
        accessor
    )))
}

impl Instruction {
    pub fn address(&self) -> Result<Address, DisasmError> {
        match self {
            Instruction::Native(i) => Ok(i.address()),
            Instruction::Text(_) => unsupported("address"),
            Instruction::Il(i) => Ok(i.address()),
        }
    }

    pub fn mnemonic(&self) -> Result<String, DisasmError> {
        match self {
            Instruction::Native(i) => Ok(i.mnemonic().to_string()),
            Instruction::Text(_) => unsupported("mnemonic"),
            Instruction::Il(i) => Ok(i.mnemonic().to_string()),
        }
    }

    pub fn op_str(&self) -> Result<String, DisasmError> {
        match self {
            Instruction::Native(i) => Ok(i.op_str().to_string()),
            Instruction::Text(_) => unsupported("op_str"),
            Instruction::Il(i) => Ok(i.op_str()),
        }
    }

    pub fn size(&self) -> Result<u64, DisasmError> {
        match self {
            Instruction::Native(i) => Ok(i.size()),
            Instruction::Text(_) => unsupported("size"),
            Instruction::Il(i) => i.size(),
        }
    }

    pub fn operands(&self) -> Result<Vec<Operand>, DisasmError> {
        match self {
            Instruction::Native(i) => Ok(i.operands().iter().cloned().map(Operand::Native).collect()),
            Instruction::Text(i) => Ok(i.operands().to_vec()),
            Instruction::Il(i) => Ok(i.operands().iter().cloned().map(Operand::Il).collect()),
        }
    }

    pub fn insn_name(&self) -> Result<String, DisasmError> {
        match self {
            Instruction::Native(i) => Ok(i.insn_name().to_string()),
            Instruction::Text(_) => unsupported("insn_name"),
            Instruction::Il(i) => Ok(i.insn_name().to_string()),
        }
    }

    pub fn name(&self) -> Result<String, DisasmError> {
        match self {
            Instruction::Native(i) => Ok(i.insn_name().to_string()),
            Instruction::Text(_) => unsupported("name"),
            Instruction::Il(i) => Ok(i.name().to_string()),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Native(i) if i.op_str.is_empty() => write!(f, "{}", i.mnemonic),
            Instruction::Native(i) => write!(f, "{}\t{}", i.mnemonic, i.op_str),
            Instruction::Text(i) => write!(f, "{}", i.text),
            Instruction::Il(i) => write!(f, "{}", i.il),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::export::ExportedView;

    fn native_nop() -> Instruction {
        Instruction::Native(NativeInstruction {
            address: 0x1000,
            mnemonic: "nop".to_string(),
            op_str: String::new(),
            bytes: vec![0x90],
            operands: Vec::new(),
            insn_name: "nop".to_string(),
        })
    }

    #[test]
    fn test_strip_il_prefix() {
        assert_eq!(strip_il_prefix("LLIL_SET_REG"), "SET_REG");
        assert_eq!(strip_il_prefix("SET_REG"), "SET_REG");
        // Only the leading prefix, and only once.
        assert_eq!(strip_il_prefix("LLIL_LLIL_NOP"), "LLIL_NOP");
        assert_eq!(strip_il_prefix("MLIL_CALL"), "MLIL_CALL");
    }

    #[test]
    fn test_native_accessors() {
        let insn = native_nop();
        assert_eq!(insn.address().unwrap(), 0x1000);
        assert_eq!(insn.size().unwrap(), 1);
        assert_eq!(insn.mnemonic().unwrap(), "nop");
        assert_eq!(insn.name().unwrap(), "nop");
        assert!(insn.operands().unwrap().is_empty());
        assert_eq!(insn.to_string(), "nop");
    }

    #[test]
    fn test_text_instruction_is_mostly_unsupported() {
        let mut text = TextInstruction::new("push    rbp");
        text.set_operands(vec![Operand::Il(IlOperand::Register("rbp".into()))]);
        let insn = Instruction::Text(text);

        assert!(matches!(insn.size(), Err(DisasmError::UnsupportedOperation(_))));
        assert!(matches!(insn.insn_name(), Err(DisasmError::UnsupportedOperation(_))));
        assert!(matches!(insn.name(), Err(DisasmError::UnsupportedOperation(_))));
        assert!(matches!(insn.address(), Err(DisasmError::UnsupportedOperation(_))));
        assert_eq!(insn.operands().unwrap().len(), 1);
        assert_eq!(insn.to_string(), "push    rbp");
    }

    #[test]
    fn test_il_accessors() {
        let view: Rc<dyn AnalysisView> = Rc::new(ExportedView::from_json(
            r#"{
                "entry_point": 4096,
                "functions": [{
                    "start": 4096,
                    "discovered": true,
                    "instructions": [
                        {"address": 4096, "operation": "LLIL_PUSH",
                         "operands": [{"kind": "register", "value": "rbp"}]},
                        {"address": 4097, "operation": "LLIL_SET_REG",
                         "operands": [{"kind": "register", "value": "rbp"},
                                      {"kind": "register", "value": "rsp"}]},
                        {"address": 4100, "operation": "LLIL_RET", "operands": []}
                    ]
                }]
            }"#,
        ).unwrap());
        let function = view.function_at(0x1000).unwrap();

        let il = function.il(1).unwrap();
        let insn = IlInstruction::new(view.clone(), function.clone(), il, 0x40_0000);
        assert_eq!(insn.address(), 0x40_1001);
        assert_eq!(insn.raw_address(), 0x1001);
        assert_eq!(insn.size().unwrap(), 3);
        assert_eq!(insn.mnemonic(), "LLIL_SET_REG");
        assert_eq!(insn.insn_name(), "LLIL_SET_REG");
        assert_eq!(insn.name(), "SET_REG");
        assert_eq!(insn.op_str(), "rbp rsp");

        let last = IlInstruction::new(view, function.clone(), function.il(2).unwrap(), 0);
        assert!(matches!(last.size(), Err(DisasmError::ContractViolation(_))));
    }
}
