//! Straight-line instruction trace, driving a disassembler the way an
//! execution engine does: fetch at pc, then step pc by the instruction size.

use crate::instruction::Instruction;
use crate::parser::BinaryImage;
use crate::{Address, Disassembler, DisasmError};

/// One step of a trace, flattened from whatever the backend produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    /// pc the instruction was requested at
    pub pc: Address,
    pub address: Option<Address>,
    pub size: Option<u64>,
    pub mnemonic: Option<String>,
    pub op_str: Option<String>,
    pub name: Option<String>,
    /// Backend rendering of the whole instruction
    pub text: String,
}

impl TraceEntry {
    pub fn from_instruction(pc: Address, insn: &Instruction) -> Self {
        Self {
            pc,
            address: insn.address().ok(),
            size: insn.size().ok(),
            mnemonic: insn.mnemonic().ok(),
            op_str: insn.op_str().ok(),
            name: insn.name().ok(),
            text: insn.to_string(),
        }
    }

    /// Returns true if this instruction is likely a return instruction
    pub fn is_return(&self) -> bool {
        let mnemonic = self.mnemonic.as_deref().unwrap_or("").to_lowercase();
        let name = self.name.as_deref().unwrap_or("").to_lowercase();
        let ops = self.op_str.as_deref().unwrap_or("").trim().to_lowercase();

        matches!(mnemonic.as_str(), "ret" | "retq" | "retn" | "eret" | "mret" | "sret") ||
        name == "ret" ||                            // lifted IL return
        (mnemonic == "bx" && ops == "lr") ||        // ARM return (branch to link register)
        (mnemonic == "jr" && ops.ends_with("ra")) || // MIPS return (jump to return address)
        mnemonic.contains("return")
    }
}

/// Where and how long to trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceOptions {
    pub start: Address,
    /// Maximum number of instructions
    pub limit: usize,
    /// Stop after the first return instruction
    pub stop_at_return: bool,
}

/// Disassemble up to `opts.limit` instructions from `opts.start`.
///
/// `image` supplies the bytes for byte-level backends; platform backends
/// can run without one. Errors from the disassembler end the trace. A
/// zero-sized instruction also ends it, since the pc would never move.
pub fn run(
    disasm: &mut Disassembler,
    image: Option<&BinaryImage>,
    opts: &TraceOptions,
) -> Result<Vec<TraceEntry>, DisasmError> {
    log::debug!(
        "Tracing up to {} instructions from 0x{:x} with {}",
        opts.limit,
        opts.start,
        disasm.kind()
    );

    let mut entries = Vec::with_capacity(opts.limit.min(4096));
    let mut pc = opts.start;

    while entries.len() < opts.limit {
        let code = image.and_then(|img| img.code_at(pc)).unwrap_or(&[]);
        let insn = disasm.disassemble_instruction(code, pc)?;
        let entry = TraceEntry::from_instruction(pc, &insn);
        let is_return = entry.is_return();
        entries.push(entry);

        if entries.len() == opts.limit || (opts.stop_at_return && is_return) {
            break;
        }

        let size = insn.size()?;
        if size == 0 {
            log::warn!("Zero-sized instruction at 0x{:x}, stopping trace", pc);
            break;
        }
        pc = pc.wrapping_add(size);
    }

    log::debug!("Trace complete: {} instructions", entries.len());
    Ok(entries)
}
