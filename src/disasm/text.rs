//! Plain textual disassembly from the analysis platform.

use std::rc::Rc;

use crate::instruction::{Instruction, TextInstruction};
use crate::platform::AnalysisView;
use crate::{Address, DisasmError};

/// Disassembler returning the platform's own rendering of each instruction.
///
/// The result only carries text, so callers that need sizes or operands should
/// use [`super::LiftedIlDisasm`] or [`crate::decoder::CapstoneDisasm`] instead.
#[derive(Debug)]
pub struct PlatformTextDisasm {
    view: Rc<dyn AnalysisView>,
}

impl PlatformTextDisasm {
    pub fn new(view: Rc<dyn AnalysisView>) -> Self {
        Self { view }
    }

    /// Text at `pc` as the platform renders it. The code buffer is not used.
    pub fn disassemble_instruction(&self, _code: &[u8], pc: Address) -> Result<Instruction, DisasmError> {
        let text = self.view.disassembly(pc).ok_or_else(|| DisasmError::DecodeFailure {
            address: pc,
            reason: "platform has no disassembly here".to_string(),
        })?;
        Ok(Instruction::Text(TextInstruction::new(text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::export::ExportedView;

    fn view() -> Rc<dyn AnalysisView> {
        Rc::new(
            ExportedView::from_json(
                r#"{"entry_point": 4096,
                    "disassembly": [{"address": 4096, "text": "push    rbp"}]}"#,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_returns_platform_text_untouched() {
        let disasm = PlatformTextDisasm::new(view());
        let insn = disasm.disassemble_instruction(&[0xff, 0xff], 0x1000).unwrap();
        match insn {
            Instruction::Text(text) => assert_eq!(text.text(), "push    rbp"),
            other => panic!("expected text instruction, got {:?}", other),
        }
    }

    #[test]
    fn test_no_text_is_decode_failure() {
        let disasm = PlatformTextDisasm::new(view());
        let err = disasm.disassemble_instruction(&[], 0x1001).unwrap_err();
        assert!(matches!(err, DisasmError::DecodeFailure { address: 0x1001, .. }));
    }
}
