//! CSV output formatter

use super::{EntryRecord, TraceFormatter};
use crate::trace::TraceEntry;
use crate::DisasmError;

fn output_error(e: impl std::fmt::Display) -> DisasmError {
    DisasmError::OutputError(format!("CSV: {}", e))
}

impl TraceFormatter for super::CsvFormatter {
    fn format(&self, entries: &[TraceEntry]) -> Result<String, DisasmError> {
        let mut writer = ::csv::Writer::from_writer(Vec::new());
        for entry in entries {
            writer.serialize(EntryRecord::from(entry)).map_err(output_error)?;
        }
        let bytes = writer.into_inner().map_err(output_error)?;
        String::from_utf8(bytes).map_err(output_error)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::create_test_entries;
    use super::super::CsvFormatter;
    use super::*;

    #[test]
    fn test_csv_formatter() {
        let result = CsvFormatter.format(&create_test_entries()).unwrap();
        let lines: Vec<_> = result.lines().collect();

        assert_eq!(lines[0], "pc,address,size,mnemonic,operands,name,text");
        assert_eq!(lines[1], "0x1000,0x1000,1,push,rbp,push,push rbp");
        assert_eq!(lines[3], "0x1004,,,,,,ret");
    }
}
