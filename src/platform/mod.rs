//! Interface to an external binary-analysis platform.
//!
//! The platform owns the loaded image, its function database and the lifted
//! IL of every function. The `binja` and `binja-il` disassemblers only talk to
//! it through [`AnalysisView`] and [`AnalysisFunction`].

pub mod export;

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::{Address, DisasmError};

/// Handle to a binary loaded in the analysis platform.
///
/// Shared between the disassembler and whoever opened it; methods take `&self`
/// and implementations use interior mutability for analysis updates.
pub trait AnalysisView: fmt::Debug {
    /// Entry point in the platform's address space.
    fn entry_point(&self) -> Address;

    /// Function covering `addr`, if the platform knows one.
    fn function_at(&self, addr: Address) -> Option<Rc<dyn AnalysisFunction>>;

    /// Register a user-defined function starting at `addr`.
    fn create_user_function(&self, addr: Address) -> Result<(), DisasmError>;

    /// Recompute analysis and block until it is done.
    fn update_analysis_and_wait(&self) -> Result<(), DisasmError>;

    /// Textual disassembly of the instruction at `addr`.
    fn disassembly(&self, addr: Address) -> Option<String>;
}

/// A function in the platform's database, with its lifted IL.
pub trait AnalysisFunction: fmt::Debug {
    fn start(&self) -> Address;

    /// First lifted-IL instruction generated for the native instruction at `addr`.
    fn lifted_il_at(&self, addr: Address) -> Option<LiftedIl>;

    /// IL instruction by function-relative index.
    fn il(&self, index: usize) -> Option<LiftedIl>;

    fn il_len(&self) -> usize;
}

/// One lifted-IL instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiftedIl {
    /// Position within the owning function
    #[serde(default)]
    pub index: usize,
    /// Address of the native instruction it was lifted from
    pub address: Address,
    /// Opcode tag, e.g. `LLIL_SET_REG`
    pub operation: String,
    #[serde(default)]
    pub operands: Vec<IlOperand>,
}

impl fmt::Display for LiftedIl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.operation)?;
        for op in &self.operands {
            write!(f, " {}", op)?;
        }
        Ok(())
    }
}

/// Operand of a lifted-IL instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum IlOperand {
    Register(String),
    Flag(String),
    Constant(i64),
    Address(Address),
    /// Nested expression, already rendered by the platform
    Expr(String),
}

impl fmt::Display for IlOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IlOperand::Register(name) | IlOperand::Flag(name) => write!(f, "{}", name),
            IlOperand::Constant(value) if *value < 0 => write!(f, "-0x{:x}", value.unsigned_abs()),
            IlOperand::Constant(value) => write!(f, "0x{:x}", value),
            IlOperand::Address(addr) => write!(f, "0x{:x}", addr),
            IlOperand::Expr(text) => write!(f, "{}", text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operand_rendering() {
        assert_eq!(IlOperand::Register("eax".into()).to_string(), "eax");
        assert_eq!(IlOperand::Constant(16).to_string(), "0x10");
        assert_eq!(IlOperand::Constant(-8).to_string(), "-0x8");
        assert_eq!(IlOperand::Address(0x401000).to_string(), "0x401000");
    }

    #[test]
    fn test_lifted_il_display() {
        let il = LiftedIl {
            index: 0,
            address: 0x1000,
            operation: "LLIL_SET_REG".into(),
            operands: vec![IlOperand::Register("eax".into()), IlOperand::Constant(1)],
        };
        assert_eq!(il.to_string(), "LLIL_SET_REG eax 0x1");
    }

    #[test]
    fn test_operand_json_shape() {
        let op: IlOperand = serde_json::from_str(r#"{"kind": "constant", "value": -4}"#).unwrap();
        assert_eq!(op, IlOperand::Constant(-4));
        let json = serde_json::to_string(&IlOperand::Register("rsp".into())).unwrap();
        assert_eq!(json, r#"{"kind":"register","value":"rsp"}"#);
    }
}
