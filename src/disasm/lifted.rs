//! Lifted-IL disassembly from the analysis platform.

use std::rc::Rc;

use crate::instruction::{IlInstruction, Instruction};
use crate::platform::{AnalysisFunction, AnalysisView};
use crate::{Address, DisasmError};

/// Offset between runtime addresses and the platform's address space.
///
/// Anchored once, on the first pc ever rebased, assuming that pc is the
/// platform's entry point. It is never revisited: if the first pc is not the
/// entry point, every later address is off by the same amount. Resolving
/// the offset per call through symbol lookup would need the platform to
/// expose symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rebase {
    #[default]
    Unanchored,
    Anchored { diff: i64 },
}

impl Rebase {
    /// Runtime → platform. Anchors on `entry_point` the first time.
    pub fn fix(&mut self, addr: Address, entry_point: Address) -> Address {
        let diff = match *self {
            Rebase::Anchored { diff } => diff,
            Rebase::Unanchored => {
                let diff = addr.wrapping_sub(entry_point) as i64;
                *self = Rebase::Anchored { diff };
                diff
            }
        };
        addr.wrapping_sub(diff as u64)
    }

    /// Platform → runtime.
    pub fn unfix(&self, addr: Address) -> Address {
        addr.wrapping_add(self.diff() as u64)
    }

    /// Current offset; zero until anchored.
    pub fn diff(&self) -> i64 {
        match *self {
            Rebase::Anchored { diff } => diff,
            Rebase::Unanchored => 0,
        }
    }
}

/// Disassembler over the platform's lifted IL.
#[derive(Debug)]
pub struct LiftedIlDisasm {
    view: Rc<dyn AnalysisView>,
    rebase: Rebase,
    current_func: Option<Rc<dyn AnalysisFunction>>,
    current_pc: Option<Address>,
}

impl LiftedIlDisasm {
    pub fn new(view: Rc<dyn AnalysisView>) -> Self {
        Self { view, rebase: Rebase::Unanchored, current_func: None, current_pc: None }
    }

    pub fn rebase(&self) -> Rebase {
        self.rebase
    }

    /// Runtime pc → platform address (anchors the offset on first use).
    pub fn fix_addr(&mut self, addr: Address) -> Address {
        self.rebase.fix(addr, self.view.entry_point())
    }

    pub fn unfix_addr(&self, addr: Address) -> Address {
        self.rebase.unfix(addr)
    }

    /// Function of the last instruction handed out.
    pub fn current_function(&self) -> Option<&Rc<dyn AnalysisFunction>> {
        self.current_func.as_ref()
    }

    /// Platform-space pc of the last instruction handed out.
    pub fn current_pc(&self) -> Option<Address> {
        self.current_pc
    }

    /// Lifted IL at runtime address `pc`. The code buffer is not used.
    ///
    /// If the platform knows no function covering `pc`, one user function is
    /// created there and analysis is rerun once; a second miss is
    /// [`DisasmError::FunctionNotFound`].
    pub fn disassemble_instruction(&mut self, _code: &[u8], pc: Address) -> Result<Instruction, DisasmError> {
        let internal = self.fix_addr(pc);

        let func = match self.view.function_at(internal) {
            Some(func) => func,
            None => {
                log::info!("No function covers 0x{:x}, creating one and reanalyzing", internal);
                self.view.create_user_function(internal)?;
                self.view.update_analysis_and_wait()?;
                self.view.function_at(internal).ok_or(DisasmError::FunctionNotFound(pc))?
            }
        };

        let il = func.lifted_il_at(internal).ok_or(DisasmError::NoLiftedIl(pc))?;
        self.current_func = Some(func.clone());
        self.current_pc = Some(internal);

        log::debug!(
            "0x{:x} (runtime 0x{:x})\t{} {} {:x} {:x}",
            internal,
            pc,
            il,
            il.operation,
            il.index,
            il.address
        );

        Ok(Instruction::Il(IlInstruction::new(self.view.clone(), func, il, self.rebase.diff())))
    }
}
