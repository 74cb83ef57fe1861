//! Output format module implementation

mod csv;
mod json;

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::Serialize;

use crate::trace::TraceEntry;
use crate::DisasmError;

/// Supported output formats for traces
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output (default)
    Text,
    /// JSON format (one document)
    Json,
    /// JSON Lines format (one JSON object per line)
    #[value(name = "jsonl")]
    JsonLines,
    /// CSV format (comma-separated values)
    Csv,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::JsonLines => write!(f, "jsonl"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "jsonl" | "jsonlines" => Ok(OutputFormat::JsonLines),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl OutputFormat {
    /// Get all available output formats
    pub fn available_formats() -> &'static [Self] {
        &[
            OutputFormat::Text,
            OutputFormat::Json,
            OutputFormat::JsonLines,
            OutputFormat::Csv,
        ]
    }

    /// Get a formatter for this output format
    pub fn get_formatter(&self) -> Box<dyn TraceFormatter> {
        match self {
            OutputFormat::Text => Box::new(TextFormatter),
            OutputFormat::Json => Box::new(JsonFormatter),
            OutputFormat::JsonLines => Box::new(JsonLinesFormatter),
            OutputFormat::Csv => Box::new(CsvFormatter),
        }
    }
}

/// Formatter trait for trace output
pub trait TraceFormatter {
    /// Render a trace
    fn format(&self, entries: &[TraceEntry]) -> Result<String, DisasmError>;
}

/// Format traces in plain text
pub struct TextFormatter;

/// Format traces in JSON
pub struct JsonFormatter;

/// Format traces in JSON Lines
pub struct JsonLinesFormatter;

/// Format traces in CSV
pub struct CsvFormatter;

/// Serializable trace entry, addresses as hex strings
#[derive(Debug, Serialize)]
struct EntryRecord {
    pc: String,
    address: Option<String>,
    size: Option<u64>,
    mnemonic: Option<String>,
    operands: Option<String>,
    name: Option<String>,
    text: String,
}

impl From<&TraceEntry> for EntryRecord {
    fn from(entry: &TraceEntry) -> Self {
        Self {
            pc: format!("0x{:x}", entry.pc),
            address: entry.address.map(|a| format!("0x{:x}", a)),
            size: entry.size,
            mnemonic: entry.mnemonic.clone(),
            operands: entry.op_str.clone(),
            name: entry.name.clone(),
            text: entry.text.clone(),
        }
    }
}

impl TraceFormatter for TextFormatter {
    fn format(&self, entries: &[TraceEntry]) -> Result<String, DisasmError> {
        let mut output = String::new();

        for entry in entries {
            match (&entry.mnemonic, &entry.op_str) {
                (Some(mnemonic), Some(operands)) => {
                    let name = entry.name.as_deref().unwrap_or("");
                    output.push_str(&format!(
                        "0x{:08x}: {:<14} {:<30} ; {}\n",
                        entry.pc, mnemonic, operands, name
                    ));
                }
                // Text-only backends
                _ => output.push_str(&format!("0x{:08x}: {}\n", entry.pc, entry.text)),
            }
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(super) fn create_test_entries() -> Vec<TraceEntry> {
        vec![
            TraceEntry {
                pc: 0x1000,
                address: Some(0x1000),
                size: Some(1),
                mnemonic: Some("push".to_string()),
                op_str: Some("rbp".to_string()),
                name: Some("push".to_string()),
                text: "push rbp".to_string(),
            },
            TraceEntry {
                pc: 0x401001,
                address: Some(0x401001),
                size: Some(3),
                mnemonic: Some("LLIL_SET_REG".to_string()),
                op_str: Some("rbp rsp".to_string()),
                name: Some("SET_REG".to_string()),
                text: "LLIL_SET_REG rbp rsp".to_string(),
            },
            TraceEntry {
                pc: 0x1004,
                address: None,
                size: None,
                mnemonic: None,
                op_str: None,
                name: None,
                text: "ret".to_string(),
            },
        ]
    }

    #[test]
    fn test_text_formatter() {
        let result = TextFormatter.format(&create_test_entries()).unwrap();

        assert!(result.contains("0x00001000: push"));
        assert!(result.contains("; SET_REG"));
        assert!(result.contains("0x00001004: ret\n"));
        assert_eq!(result.lines().count(), 3);
    }

    #[test]
    fn test_format_names() {
        for format in OutputFormat::available_formats() {
            let parsed: OutputFormat = format.to_string().parse().unwrap();
            assert_eq!(parsed, *format);
        }
        assert_eq!("JSONLines".parse::<OutputFormat>().unwrap(), OutputFormat::JsonLines);
        assert!("ngram".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_every_format_renders_empty_trace() {
        for format in OutputFormat::available_formats() {
            assert!(format.get_formatter().format(&[]).is_ok());
        }
    }
}
