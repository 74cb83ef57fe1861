//! An [`AnalysisView`] replayed from a JSON export of an analysis database.
//!
//! The export lists the entry point, per-address disassembly text, and every
//! function with its lifted IL:
//!
//! ```json
//! {
//!   "entry_point": 4096,
//!   "disassembly": [{"address": 4096, "text": "push    rbp"}],
//!   "functions": [{
//!     "start": 4096,
//!     "discovered": true,
//!     "instructions": [
//!       {"address": 4096, "operation": "LLIL_PUSH",
//!        "operands": [{"kind": "register", "value": "rbp"}]}
//!     ]
//!   }]
//! }
//! ```
//!
//! Functions not marked `discovered` stay hidden until a user function is
//! created at their start and analysis is updated, the same way the live
//! platform only finds them once asked to.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::{AnalysisFunction, AnalysisView, LiftedIl};
use crate::{Address, DisasmError};

#[derive(Debug, Serialize, Deserialize)]
struct ExportFile {
    entry_point: Address,
    #[serde(default)]
    disassembly: Vec<DisassemblyLine>,
    #[serde(default)]
    functions: Vec<FunctionRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DisassemblyLine {
    address: Address,
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionRecord {
    start: Address,
    #[serde(default)]
    discovered: bool,
    #[serde(default)]
    instructions: Vec<LiftedIl>,
}

/// A function loaded from an export.
#[derive(Debug)]
pub struct ExportedFunction {
    start: Address,
    instructions: Vec<LiftedIl>,
}

impl ExportedFunction {
    fn new(start: Address, mut instructions: Vec<LiftedIl>) -> Self {
        for (index, il) in instructions.iter_mut().enumerate() {
            il.index = index;
        }
        Self { start, instructions }
    }

    /// Whether `addr` lies between the function start and its last IL address.
    pub fn covers(&self, addr: Address) -> bool {
        let end = self.instructions.iter().map(|il| il.address).max().unwrap_or(self.start);
        self.start <= addr && addr <= end
    }
}

impl AnalysisFunction for ExportedFunction {
    fn start(&self) -> Address {
        self.start
    }

    fn lifted_il_at(&self, addr: Address) -> Option<LiftedIl> {
        self.instructions.iter().find(|il| il.address == addr).cloned()
    }

    fn il(&self, index: usize) -> Option<LiftedIl> {
        self.instructions.get(index).cloned()
    }

    fn il_len(&self) -> usize {
        self.instructions.len()
    }
}

/// Analysis database replayed from a JSON export.
#[derive(Debug)]
pub struct ExportedView {
    entry_point: Address,
    disassembly: BTreeMap<Address, String>,
    functions: Vec<Rc<ExportedFunction>>,
    discovered: RefCell<BTreeSet<Address>>,
    pending: RefCell<Vec<Address>>,
    analysis_runs: Cell<usize>,
}

impl ExportedView {
    /// Load an export from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DisasmError> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, DisasmError> {
        let export: ExportFile = serde_json::from_reader(reader)?;
        Ok(Self::from_export(export))
    }

    pub fn from_json(json: &str) -> Result<Self, DisasmError> {
        let export: ExportFile = serde_json::from_str(json)?;
        Ok(Self::from_export(export))
    }

    fn from_export(export: ExportFile) -> Self {
        let mut discovered = BTreeSet::new();
        let mut functions = Vec::with_capacity(export.functions.len());
        for record in export.functions {
            if record.discovered {
                discovered.insert(record.start);
            }
            functions.push(Rc::new(ExportedFunction::new(record.start, record.instructions)));
        }

        log::debug!(
            "Loaded analysis export: entry 0x{:x}, {} functions ({} discovered)",
            export.entry_point,
            functions.len(),
            discovered.len()
        );

        Self {
            entry_point: export.entry_point,
            disassembly: export.disassembly.into_iter().map(|l| (l.address, l.text)).collect(),
            functions,
            discovered: RefCell::new(discovered),
            pending: RefCell::new(Vec::new()),
            analysis_runs: Cell::new(0),
        }
    }

    /// Number of completed `update_analysis_and_wait` calls.
    pub fn analysis_runs(&self) -> usize {
        self.analysis_runs.get()
    }

    /// Starts of all functions currently visible.
    pub fn discovered_functions(&self) -> Vec<Address> {
        self.discovered.borrow().iter().copied().collect()
    }
}

impl AnalysisView for ExportedView {
    fn entry_point(&self) -> Address {
        self.entry_point
    }

    fn function_at(&self, addr: Address) -> Option<Rc<dyn AnalysisFunction>> {
        let discovered = self.discovered.borrow();
        self.functions
            .iter()
            .filter(|f| discovered.contains(&f.start) && f.covers(addr))
            // Innermost wins when ranges overlap.
            .max_by_key(|f| f.start)
            .map(|f| f.clone() as Rc<dyn AnalysisFunction>)
    }

    fn create_user_function(&self, addr: Address) -> Result<(), DisasmError> {
        log::debug!("User function requested at 0x{:x}", addr);
        self.pending.borrow_mut().push(addr);
        Ok(())
    }

    fn update_analysis_and_wait(&self) -> Result<(), DisasmError> {
        let pending: Vec<Address> = self.pending.borrow_mut().drain(..).collect();
        let mut discovered = self.discovered.borrow_mut();
        for addr in pending {
            if self.functions.iter().any(|f| f.start == addr) {
                discovered.insert(addr);
            } else {
                log::warn!("Analysis found no function starting at 0x{:x}", addr);
            }
        }
        self.analysis_runs.set(self.analysis_runs.get() + 1);
        Ok(())
    }

    fn disassembly(&self, addr: Address) -> Option<String> {
        self.disassembly.get(&addr).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const EXPORT: &str = r#"{
        "entry_point": 4096,
        "disassembly": [
            {"address": 4096, "text": "push    rbp"},
            {"address": 4097, "text": "mov     rbp, rsp"}
        ],
        "functions": [
            {"start": 4096, "discovered": true, "instructions": [
                {"address": 4096, "operation": "LLIL_PUSH"},
                {"address": 4097, "operation": "LLIL_SET_REG"},
                {"address": 4100, "operation": "LLIL_RET"}
            ]},
            {"start": 8192, "instructions": [
                {"address": 8192, "operation": "LLIL_NOP"},
                {"address": 8193, "operation": "LLIL_RET"}
            ]}
        ]
    }"#;

    #[test]
    fn test_function_lookup_covers_range() {
        let view = ExportedView::from_json(EXPORT).unwrap();
        assert_eq!(view.entry_point(), 0x1000);
        assert_eq!(view.function_at(0x1000).unwrap().start(), 0x1000);
        assert_eq!(view.function_at(0x1002).unwrap().start(), 0x1000);
        assert!(view.function_at(0x1005).is_none());
    }

    #[test]
    fn test_il_indices_are_assigned() {
        let view = ExportedView::from_json(EXPORT).unwrap();
        let func = view.function_at(0x1000).unwrap();
        assert_eq!(func.il_len(), 3);
        assert_eq!(func.il(2).unwrap().index, 2);
        assert_eq!(func.lifted_il_at(0x1001).unwrap().operation, "LLIL_SET_REG");
        assert!(func.lifted_il_at(0x1002).is_none());
    }

    #[test]
    fn test_hidden_function_needs_analysis() {
        let view = ExportedView::from_json(EXPORT).unwrap();
        assert!(view.function_at(0x2000).is_none());

        view.create_user_function(0x2000).unwrap();
        // Nothing changes until analysis runs.
        assert!(view.function_at(0x2000).is_none());

        view.update_analysis_and_wait().unwrap();
        assert_eq!(view.function_at(0x2001).unwrap().start(), 0x2000);
        assert_eq!(view.analysis_runs(), 1);
        assert_eq!(view.discovered_functions(), vec![0x1000, 0x2000]);
    }

    #[test]
    fn test_analysis_at_unknown_start_finds_nothing() {
        let view = ExportedView::from_json(EXPORT).unwrap();
        view.create_user_function(0x3000).unwrap();
        view.update_analysis_and_wait().unwrap();
        assert!(view.function_at(0x3000).is_none());
    }

    #[test]
    fn test_disassembly_text() {
        let view = ExportedView::from_json(EXPORT).unwrap();
        assert_eq!(view.disassembly(0x1001).as_deref(), Some("mov     rbp, rsp"));
        assert!(view.disassembly(0x1002).is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(EXPORT.as_bytes()).unwrap();

        let view = ExportedView::load(file.path()).unwrap();
        assert_eq!(view.entry_point(), 0x1000);
    }

    #[test]
    fn test_malformed_export() {
        let err = ExportedView::from_json(r#"{"functions": []}"#).unwrap_err();
        assert!(matches!(err, DisasmError::Json(_)));
    }
}
