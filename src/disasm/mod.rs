//! Disassembler selection

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use capstone::{Arch, Mode};
use clap::ValueEnum;

use crate::decoder::CapstoneDisasm;
use crate::instruction::Instruction;
use crate::platform::AnalysisView;
use crate::{Address, Architecture, DisasmError};

pub mod lifted;
pub mod text;

pub use self::lifted::{LiftedIlDisasm, Rebase};
pub use self::text::PlatformTextDisasm;

/// Available disassembler backends.
#[derive(Copy, Clone, ValueEnum, Debug, PartialEq, Eq)]
pub enum DisassemblerKind {
    /// Capstone, decoding from raw bytes
    #[value(name = "capstone")]
    Capstone,
    /// Analysis platform, plain text
    #[value(name = "binja")]
    Binja,
    /// Analysis platform, lifted IL
    #[value(name = "binja-il")]
    BinjaIl,
}

impl DisassemblerKind {
    /// Configuration tag for this backend
    pub fn tag(&self) -> &'static str {
        match self {
            DisassemblerKind::Capstone => "capstone",
            DisassemblerKind::Binja => "binja",
            DisassemblerKind::BinjaIl => "binja-il",
        }
    }

    /// Whether this backend reads from an analysis view instead of bytes
    pub fn needs_view(&self) -> bool {
        !matches!(self, DisassemblerKind::Capstone)
    }
}

impl fmt::Display for DisassemblerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl FromStr for DisassemblerKind {
    type Err = DisasmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "capstone" => Ok(DisassemblerKind::Capstone),
            "binja" => Ok(DisassemblerKind::Binja),
            "binja-il" => Ok(DisassemblerKind::BinjaIl),
            _ => Err(DisasmError::UnsupportedOperation(format!("disassembler `{}` not implemented", s))),
        }
    }
}

/// The disassembler chosen for a session.
#[derive(Debug)]
pub enum Disassembler {
    Capstone(CapstoneDisasm),
    Binja(PlatformTextDisasm),
    BinjaIl(LiftedIlDisasm),
}

impl Disassembler {
    /// Build the backend for `kind`. Platform backends need `view`.
    pub fn new(
        kind: DisassemblerKind,
        arch: Arch,
        mode: Mode,
        view: Option<Rc<dyn AnalysisView>>,
    ) -> Result<Self, DisasmError> {
        Self::build(kind, view, || CapstoneDisasm::new(arch, mode))
    }

    /// Like [`Disassembler::new`], taking Capstone's arch, mode and
    /// endianness from `arch`.
    pub fn for_architecture(
        kind: DisassemblerKind,
        arch: Architecture,
        view: Option<Rc<dyn AnalysisView>>,
    ) -> Result<Self, DisasmError> {
        Self::build(kind, view, || CapstoneDisasm::for_architecture(arch))
    }

    fn build(
        kind: DisassemblerKind,
        view: Option<Rc<dyn AnalysisView>>,
        capstone: impl FnOnce() -> Result<CapstoneDisasm, DisasmError>,
    ) -> Result<Self, DisasmError> {
        match kind {
            DisassemblerKind::Capstone => Ok(Disassembler::Capstone(capstone()?)),
            DisassemblerKind::Binja => {
                let view = view.ok_or(DisasmError::MissingView(kind))?;
                Ok(Disassembler::Binja(PlatformTextDisasm::new(view)))
            }
            DisassemblerKind::BinjaIl => {
                let view = view.ok_or(DisasmError::MissingView(kind))?;
                Ok(Disassembler::BinjaIl(LiftedIlDisasm::new(view)))
            }
        }
    }

    pub fn kind(&self) -> DisassemblerKind {
        match self {
            Disassembler::Capstone(_) => DisassemblerKind::Capstone,
            Disassembler::Binja(_) => DisassemblerKind::Binja,
            Disassembler::BinjaIl(_) => DisassemblerKind::BinjaIl,
        }
    }

    /// Next instruction at `pc`. `code` holds the bytes starting at `pc`;
    /// platform backends ignore it.
    pub fn disassemble_instruction(&mut self, code: &[u8], pc: Address) -> Result<Instruction, DisasmError> {
        match self {
            Disassembler::Capstone(d) => d.disassemble_instruction(code, pc),
            Disassembler::Binja(d) => d.disassemble_instruction(code, pc),
            Disassembler::BinjaIl(d) => d.disassemble_instruction(code, pc),
        }
    }
}

/// Build the disassembler named by `tag` (`capstone`, `binja` or `binja-il`).
///
/// `arch` and `mode` only matter for `capstone`; `view` only for the others.
pub fn init_disassembler(
    tag: &str,
    arch: Arch,
    mode: Mode,
    view: Option<Rc<dyn AnalysisView>>,
) -> Result<Disassembler, DisasmError> {
    let kind = tag.parse::<DisassemblerKind>()?;
    Disassembler::new(kind, arch, mode, view)
}
