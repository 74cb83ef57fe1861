//! JSON and JSON Lines output formatters

use serde::Serialize;

use super::{EntryRecord, TraceFormatter};
use crate::trace::TraceEntry;
use crate::DisasmError;

/// Serializable trace for JSON output
#[derive(Serialize)]
struct TraceJson {
    count: usize,
    instructions: Vec<EntryRecord>,
}

impl TraceFormatter for super::JsonFormatter {
    fn format(&self, entries: &[TraceEntry]) -> Result<String, DisasmError> {
        let trace = TraceJson {
            count: entries.len(),
            instructions: entries.iter().map(EntryRecord::from).collect(),
        };
        Ok(serde_json::to_string_pretty(&trace)?)
    }
}

impl TraceFormatter for super::JsonLinesFormatter {
    fn format(&self, entries: &[TraceEntry]) -> Result<String, DisasmError> {
        let mut output = String::new();
        for entry in entries {
            output.push_str(&serde_json::to_string(&EntryRecord::from(entry))?);
            output.push('\n');
        }
        Ok(output)
    }
}
