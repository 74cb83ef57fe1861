//! Goblin-based multi-format image loading.
//!
//! The execution engine needs the bytes that live at a runtime address, so
//! every section keeps both its virtual address and its file offset.

use std::fmt;
use std::fs;
use std::path::Path;

use goblin::mach::{constants::cputype, Mach, MachO};
use goblin::{elf, pe, Object};

use crate::{Address, Architecture, DisasmError};

/// A mapped region of the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Section name
    pub name: String,
    /// Virtual address of the first byte
    pub address: Address,
    /// File offset of the first byte
    pub offset: usize,
    /// Bytes backed by the file
    pub size: usize,
    /// Whether this section contains executable code
    pub executable: bool,
}

impl Section {
    pub fn new(name: impl Into<String>, address: Address, offset: usize, size: usize, executable: bool) -> Self {
        Self { name: name.into(), address, offset, size, executable }
    }

    /// One past the last mapped address; `None` if that overflows the address space.
    pub fn end_address(&self) -> Option<Address> {
        self.address.checked_add(self.size as Address)
    }

    pub fn contains(&self, addr: Address) -> bool {
        let in_tail = match self.end_address() {
            Some(end) => addr < end,
            // Mapped up to the top of the address space.
            None => true,
        };
        self.address <= addr && in_tail
    }
}

/// A loaded binary: raw bytes plus the layout read from its headers.
#[derive(Debug, Clone)]
pub struct BinaryImage {
    data: Vec<u8>,
    /// Detected architecture
    pub architecture: Architecture,
    /// Entry point address, if available
    pub entry_point: Option<Address>,
    /// List of sections found in the binary
    pub sections: Vec<Section>,
}

impl BinaryImage {
    /// Read and parse an ELF, PE or Mach-O file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DisasmError> {
        let data = fs::read(path.as_ref())?;
        GoblinParser::new().parse(data)
    }

    /// Treat `data` as flat code mapped at `base`.
    pub fn raw(data: Vec<u8>, base: Address, architecture: Architecture) -> Self {
        let sections = vec![Section::new("raw", base, 0, data.len(), true)];
        Self { data, architecture, entry_point: Some(base), sections }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Section mapping `addr`, executable ones first.
    pub fn section_containing(&self, addr: Address) -> Option<&Section> {
        self.sections
            .iter()
            .filter(|s| s.contains(addr))
            .max_by_key(|s| s.executable)
    }

    /// File bytes from `pc` to the end of its section.
    pub fn code_at(&self, pc: Address) -> Option<&[u8]> {
        let section = self.section_containing(pc)?;
        let delta = usize::try_from(pc - section.address).ok()?;
        let start = section.offset.checked_add(delta)?;
        // Addresses left up to the top of the address space, counting pc.
        let room = usize::try_from(Address::MAX - pc).map_or(usize::MAX, |r| r.saturating_add(1));
        let end = section
            .offset
            .saturating_add(section.size)
            .min(start.saturating_add(room))
            .min(self.data.len());
        if start >= end {
            return None;
        }
        Some(&self.data[start..end])
    }

    /// Get all executable sections
    pub fn executable_sections(&self) -> Vec<&Section> {
        self.sections.iter().filter(|s| s.executable).collect()
    }
}

/// A parser that handles ELF, PE, and Mach-O via Goblin.
#[derive(Debug, Default)]
pub struct GoblinParser;

impl GoblinParser {
    /// Construct a new GoblinParser.
    pub fn new() -> Self {
        GoblinParser
    }

    /// Parse `data` into an image that owns it.
    pub fn parse(&self, data: Vec<u8>) -> Result<BinaryImage, DisasmError> {
        let (architecture, entry_point, sections) = match Object::parse(&data) {
            Ok(Object::Elf(elf)) => self.parse_elf(&elf),
            Ok(Object::PE(pe)) => self.parse_pe(&pe),
            Ok(Object::Mach(Mach::Binary(macho))) => self.parse_macho(&macho),
            Ok(Object::Mach(Mach::Fat(_))) => {
                return Err(DisasmError::ParsingError("fat Mach-O binaries are not supported".into()))
            }
            Ok(_) => return Err(DisasmError::ParsingError("Unsupported file format".into())),
            Err(e) => return Err(DisasmError::ParsingError(e.to_string())),
        };

        log::debug!(
            "Parsed {} image: entry {:?}, {} sections",
            architecture,
            entry_point,
            sections.len()
        );

        Ok(BinaryImage { data, architecture, entry_point, sections })
    }

    /// Parse an ELF image.
    fn parse_elf(&self, elf: &elf::Elf) -> (Architecture, Option<Address>, Vec<Section>) {
        let arch = match elf.header.e_machine {
            elf::header::EM_386       => Architecture::X86_32,
            elf::header::EM_X86_64    => Architecture::X86_64,
            elf::header::EM_ARM       => Architecture::Arm,
            elf::header::EM_AARCH64   => Architecture::AArch64,
            elf::header::EM_MIPS      => Architecture::Mips32,
            elf::header::EM_PPC       => Architecture::Ppc32,
            elf::header::EM_RISCV     => {
                // Determine RISC-V bitness from ELF class
                match elf.header.e_ident[elf::header::EI_CLASS] {
                    elf::header::ELFCLASS32 => Architecture::RiscV32,
                    elf::header::ELFCLASS64 => Architecture::RiscV64,
                    _ => Architecture::Unknown,
                }
            },
            _                         => Architecture::Unknown,
        };

        let mut sections = Vec::new();
        for sh in &elf.section_headers {
            // .bss and friends have no file bytes
            if sh.sh_type == elf::section_header::SHT_NOBITS || sh.sh_addr == 0 {
                continue;
            }
            let name = elf.shdr_strtab.get_at(sh.sh_name).unwrap_or("");
            sections.push(Section::new(
                name,
                sh.sh_addr,
                sh.sh_offset as usize,
                sh.sh_size as usize,
                sh.is_executable(),
            ));
        }

        // Stripped of section headers: fall back to loadable segments.
        if sections.is_empty() {
            for ph in &elf.program_headers {
                if ph.p_type == elf::program_header::PT_LOAD {
                    sections.push(Section::new(
                        "LOAD",
                        ph.p_vaddr,
                        ph.p_offset as usize,
                        ph.p_filesz as usize,
                        ph.is_executable(),
                    ));
                }
            }
        }

        (arch, Some(elf.entry), sections)
    }

    /// Parse a PE image.
    fn parse_pe(&self, pe: &pe::PE<'_>) -> (Architecture, Option<Address>, Vec<Section>) {
        let arch = match pe.header.coff_header.machine {
            pe::header::COFF_MACHINE_X86    => Architecture::X86_32,
            pe::header::COFF_MACHINE_X86_64 => Architecture::X86_64,
            pe::header::COFF_MACHINE_ARM    => Architecture::Arm,
            pe::header::COFF_MACHINE_ARM64  => Architecture::AArch64,
            _                                => Architecture::Unknown,
        };

        let image_base = pe.image_base as Address;
        let mut sections = Vec::new();
        for sect in &pe.sections {
            let name = sect.name().unwrap_or("").to_string();
            let executable = (sect.characteristics & pe::section_table::IMAGE_SCN_MEM_EXECUTE) != 0;
            sections.push(Section::new(
                name,
                image_base + sect.virtual_address as Address,
                sect.pointer_to_raw_data as usize,
                sect.virtual_size.min(sect.size_of_raw_data) as usize,
                executable,
            ));
        }

        (arch, Some(image_base + pe.entry as Address), sections)
    }

    /// Parse a Mach-O binary, one section per segment.
    fn parse_macho(&self, macho: &MachO) -> (Architecture, Option<Address>, Vec<Section>) {
        let arch = match macho.header.cputype {
            cputype::CPU_TYPE_I386   => Architecture::X86_32,
            cputype::CPU_TYPE_X86_64 => Architecture::X86_64,
            cputype::CPU_TYPE_ARM    => Architecture::Arm,
            cputype::CPU_TYPE_ARM64  => Architecture::AArch64,
            _                        => Architecture::Unknown,
        };

        let mut sections = Vec::new();
        for segment in &macho.segments {
            // VM_PROT_EXECUTE
            let executable = (segment.initprot & 0x4) != 0;
            let name = segment.name().unwrap_or("").to_string();
            sections.push(Section::new(
                name,
                segment.vmaddr,
                segment.fileoff as usize,
                segment.filesize as usize,
                executable,
            ));
        }

        (arch, Some(macho.entry), sections)
    }
}

impl fmt::Display for GoblinParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GoblinParser")
    }
}
