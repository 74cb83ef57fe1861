//! Command-line driver: load an image and/or analysis export, pick a
//! disassembler, and trace instructions from a program counter.

use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use clap::Parser;

use unidisasm::format::OutputFormat;
use unidisasm::parser::BinaryImage;
use unidisasm::platform::{export::ExportedView, AnalysisView};
use unidisasm::trace::{self, TraceOptions};
use unidisasm::{Address, Architecture, Disassembler, DisassemblerKind};

#[derive(Parser, Debug)]
#[command(name = "unidisasm", version, about = "Trace instructions through a pluggable disassembler")]
struct Cli {
    /// Binary to read code from (ELF, PE, Mach-O; flat with --raw-base)
    binary: Option<PathBuf>,

    /// Disassembler backend
    #[arg(short, long, value_enum, default_value_t = DisassemblerKind::Capstone)]
    disassembler: DisassemblerKind,

    /// Architecture, when the binary headers do not say
    #[arg(short, long, value_enum)]
    arch: Option<Architecture>,

    /// Analysis export (JSON) for the binja backends
    #[arg(long)]
    view: Option<PathBuf>,

    /// Start address (defaults to the entry point)
    #[arg(long, value_parser = parse_address)]
    pc: Option<Address>,

    /// Treat the binary as flat code mapped at this address
    #[arg(long, value_parser = parse_address)]
    raw_base: Option<Address>,

    /// Maximum number of instructions
    #[arg(short = 'n', long, default_value_t = 32)]
    count: usize,

    /// Stop after the first return instruction
    #[arg(long)]
    stop_at_return: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

fn parse_address(s: &str) -> Result<Address, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => Address::from_str_radix(hex, 16),
        None => s.parse::<Address>(),
    };
    parsed.map_err(|e| format!("invalid address `{}`: {}", s, e))
}

fn load_image(cli: &Cli) -> Result<Option<BinaryImage>> {
    let Some(path) = &cli.binary else {
        return Ok(None);
    };
    let image = match cli.raw_base {
        Some(base) => {
            let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            BinaryImage::raw(data, base, cli.arch.unwrap_or(Architecture::Unknown))
        }
        None => BinaryImage::load(path).with_context(|| format!("loading {}", path.display()))?,
    };
    log::info!(
        "Loaded {} ({}, {} sections)",
        path.display(),
        image.architecture,
        image.sections.len()
    );
    Ok(Some(image))
}

fn main() -> Result<()> {
    let _logger = flexi_logger::Logger::try_with_env_or_str("info")?.start()?;
    let cli = Cli::parse();

    let image = load_image(&cli)?;
    let view: Option<Rc<dyn AnalysisView>> = match &cli.view {
        Some(path) => {
            let view: Rc<dyn AnalysisView> = Rc::new(
                ExportedView::load(path)
                    .with_context(|| format!("loading analysis export {}", path.display()))?,
            );
            Some(view)
        }
        None => None,
    };

    if cli.disassembler == DisassemblerKind::Capstone && image.is_none() {
        bail!("the capstone disassembler needs a binary to read code from");
    }

    let arch = cli
        .arch
        .or_else(|| image.as_ref().map(|img| img.architecture))
        .unwrap_or(Architecture::Unknown);
    let mut disasm = Disassembler::for_architecture(cli.disassembler, arch, view.clone())?;

    let start = cli
        .pc
        .or_else(|| image.as_ref().and_then(|img| img.entry_point))
        .or_else(|| view.as_ref().map(|v| v.entry_point()))
        .context("no start address: pass --pc")?;

    let opts = TraceOptions { start, limit: cli.count, stop_at_return: cli.stop_at_return };
    let entries = trace::run(&mut disasm, image.as_ref(), &opts)?;

    let output = cli.format.get_formatter().format(&entries)?;
    print!("{}", output);
    Ok(())
}
