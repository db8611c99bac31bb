#![allow(dead_code)]
/////////////////////////////////////////
use std::path::{Path, PathBuf};
/////////////////////////////////////////
use elf::abi::{
    ELFCLASS64, ELFDATA2LSB, EM_X86_64, ET_REL, EV_CURRENT, SHN_XINDEX, SHT_NOBITS, SHT_NULL,
    SHT_PROGBITS, SHT_STRTAB, SHT_SYMTAB, STB_LOCAL, STT_FUNC,
};
/////////////////////////////////////////

const ELF_HEADER_SIZE: usize = 64;
const SECTION_HEADER_SIZE: usize = 64;
const SYMBOL_SIZE: usize = 24;

struct FixtureSection {
    name: String,
    sh_type: u32,
    data: Vec<u8>,
    /// Only used for SHT_NOBITS sections, which have a size but no data in the file.
    nobits_size: u64,
    link: Option<String>,
    info: u32,
    entsize: u64,
}

/// Writes minimal little-endian ELF relocatable files, enough to exercise the section lookup
/// and symbol table code without a toolchain.
pub struct ElfBuilder {
    class: u8,
    sections: Vec<FixtureSection>,
    extended_numbering: bool,
    /// Replaces sh_link of the null section, which holds the real e_shstrndx when extended.
    first_section_link: Option<u32>,
}

/// A raw symbol table entry, `st_name` is an offset into `.strtab`.
#[derive(Debug, Clone, Copy)]
pub struct RawSymbol {
    pub st_name: u32,
    pub binding: u8,
    pub value: u64,
}

impl ElfBuilder {
    pub fn new() -> Self {
        ElfBuilder {
            class: ELFCLASS64,
            sections: Vec::new(),
            extended_numbering: false,
            first_section_link: None,
        }
    }

    pub fn class(mut self, class: u8) -> Self {
        self.class = class;
        self
    }

    /// Stores the section count and the section name table index in the null section, the way
    /// linkers do for files with 0xff00 or more sections.
    pub fn extended_numbering(mut self) -> Self {
        self.extended_numbering = true;
        self
    }

    pub fn first_section_link(mut self, link: u32) -> Self {
        self.first_section_link = Some(link);
        self
    }

    pub fn section(mut self, name: &str, sh_type: u32, data: &[u8]) -> Self {
        self.sections.push(FixtureSection {
            name: name.to_string(),
            sh_type,
            data: data.to_vec(),
            nobits_size: 0,
            link: None,
            info: 0,
            entsize: 0,
        });
        self
    }

    pub fn nobits_section(mut self, name: &str, size: u64) -> Self {
        self.sections.push(FixtureSection {
            name: name.to_string(),
            sh_type: SHT_NOBITS,
            data: Vec::new(),
            nobits_size: size,
            link: None,
            info: 0,
            entsize: 0,
        });
        self
    }

    /// Adds `__ksymtab_strings` the way the kernel linker script lays it out.
    pub fn ksymtab_strings(self, names: &[&str]) -> Self {
        let mut data = Vec::new();
        for name in names {
            data.extend_from_slice(name.as_bytes());
            data.push(0);
        }
        self.section("__ksymtab_strings", SHT_PROGBITS, &data)
    }

    /// Adds `.symtab` and `.strtab` holding `symbols` as `(name, binding, value)`.
    pub fn symbols(self, symbols: &[(&str, u8, u64)]) -> Self {
        let mut strtab = vec![0u8];
        let mut raw_symbols = Vec::with_capacity(symbols.len());
        for (name, binding, value) in symbols {
            let st_name = if name.is_empty() {
                0
            } else {
                let offset = strtab.len() as u32;
                strtab.extend_from_slice(name.as_bytes());
                strtab.push(0);
                offset
            };
            raw_symbols.push(RawSymbol {
                st_name,
                binding: *binding,
                value: *value,
            });
        }
        self.raw_symbols(&raw_symbols, &strtab)
    }

    pub fn raw_symbols(self, symbols: &[RawSymbol], strtab: &[u8]) -> Self {
        let mut symtab = vec![0u8; SYMBOL_SIZE];
        for symbol in symbols {
            symtab.extend_from_slice(&symbol.st_name.to_le_bytes());
            symtab.push((symbol.binding << 4) | STT_FUNC);
            symtab.push(0);
            symtab.extend_from_slice(&1u16.to_le_bytes());
            symtab.extend_from_slice(&symbol.value.to_le_bytes());
            symtab.extend_from_slice(&0u64.to_le_bytes());
        }
        let first_global = 1 + symbols
            .iter()
            .take_while(|symbol| symbol.binding == STB_LOCAL)
            .count() as u32;
        let mut builder = self.section(".symtab", SHT_SYMTAB, &symtab);
        if let Some(section) = builder.sections.last_mut() {
            section.link = Some(".strtab".to_string());
            section.info = first_global;
            section.entsize = SYMBOL_SIZE as u64;
        }
        builder.section(".strtab", SHT_STRTAB, strtab)
    }

    pub fn build(&self) -> Vec<u8> {
        // Section name string table, appended as the last section.
        let mut shstrtab = vec![0u8];
        let mut name_offsets = Vec::with_capacity(self.sections.len() + 1);
        for name in self
            .sections
            .iter()
            .map(|section| section.name.as_str())
            .chain(std::iter::once(".shstrtab"))
        {
            name_offsets.push(shstrtab.len() as u32);
            shstrtab.extend_from_slice(name.as_bytes());
            shstrtab.push(0);
        }

        let mut file = vec![0u8; ELF_HEADER_SIZE];
        let mut headers = vec![[0u8; SECTION_HEADER_SIZE]];
        let section_index = |name: &str| {
            self.sections
                .iter()
                .position(|section| section.name == name)
                .map_or(0, |index| index as u32 + 1)
        };

        for (index, section) in self.sections.iter().enumerate() {
            align(&mut file, 8);
            let offset = file.len() as u64;
            file.extend_from_slice(&section.data);
            let size = if section.sh_type == SHT_NOBITS {
                section.nobits_size
            } else {
                section.data.len() as u64
            };
            let link = section.link.as_deref().map_or(0, section_index);
            headers.push(section_header(
                name_offsets[index],
                section.sh_type,
                offset,
                size,
                link,
                section.info,
                section.entsize,
            ));
        }

        align(&mut file, 8);
        let shstrtab_offset = file.len() as u64;
        file.extend_from_slice(&shstrtab);
        headers.push(section_header(
            name_offsets[self.sections.len()],
            SHT_STRTAB,
            shstrtab_offset,
            shstrtab.len() as u64,
            0,
            0,
            0,
        ));

        align(&mut file, 8);
        let shoff = file.len() as u64;

        let mut shnum = headers.len() as u16;
        let mut shstrndx = shnum - 1;
        if self.extended_numbering {
            let link = self.first_section_link.unwrap_or(shstrndx as u32);
            headers[0] = section_header(0, SHT_NULL, 0, shnum as u64, link, 0, 0);
            shnum = 0;
            shstrndx = SHN_XINDEX;
        }
        let mut ehdr = Vec::with_capacity(ELF_HEADER_SIZE);
        ehdr.extend_from_slice(&[0x7f, b'E', b'L', b'F', self.class, ELFDATA2LSB, EV_CURRENT]);
        ehdr.resize(16, 0);
        ehdr.extend_from_slice(&ET_REL.to_le_bytes());
        ehdr.extend_from_slice(&EM_X86_64.to_le_bytes());
        ehdr.extend_from_slice(&(EV_CURRENT as u32).to_le_bytes());
        ehdr.extend_from_slice(&0u64.to_le_bytes()); // e_entry
        ehdr.extend_from_slice(&0u64.to_le_bytes()); // e_phoff
        ehdr.extend_from_slice(&shoff.to_le_bytes());
        ehdr.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        ehdr.extend_from_slice(&(ELF_HEADER_SIZE as u16).to_le_bytes());
        ehdr.extend_from_slice(&0u16.to_le_bytes()); // e_phentsize
        ehdr.extend_from_slice(&0u16.to_le_bytes()); // e_phnum
        ehdr.extend_from_slice(&(SECTION_HEADER_SIZE as u16).to_le_bytes());
        ehdr.extend_from_slice(&shnum.to_le_bytes());
        ehdr.extend_from_slice(&shstrndx.to_le_bytes());
        file[..ELF_HEADER_SIZE].copy_from_slice(&ehdr);
        for header in &headers {
            file.extend_from_slice(header);
        }
        file
    }

    pub fn write(&self, name: &str) -> FixtureFile {
        FixtureFile::new(name, &self.build())
    }
}

fn align(file: &mut Vec<u8>, alignment: usize) {
    let padded = file.len().div_ceil(alignment) * alignment;
    file.resize(padded, 0);
}

fn section_header(
    sh_name: u32,
    sh_type: u32,
    sh_offset: u64,
    sh_size: u64,
    sh_link: u32,
    sh_info: u32,
    sh_entsize: u64,
) -> [u8; SECTION_HEADER_SIZE] {
    let mut header = Vec::with_capacity(SECTION_HEADER_SIZE);
    header.extend_from_slice(&sh_name.to_le_bytes());
    header.extend_from_slice(&sh_type.to_le_bytes());
    header.extend_from_slice(&0u64.to_le_bytes()); // sh_flags
    header.extend_from_slice(&0u64.to_le_bytes()); // sh_addr
    header.extend_from_slice(&sh_offset.to_le_bytes());
    header.extend_from_slice(&sh_size.to_le_bytes());
    header.extend_from_slice(&sh_link.to_le_bytes());
    header.extend_from_slice(&sh_info.to_le_bytes());
    header.extend_from_slice(&1u64.to_le_bytes()); // sh_addralign
    header.extend_from_slice(&sh_entsize.to_le_bytes());
    header
        .try_into()
        .expect("Section header must be exactly 64 bytes")
}

/// A file in the temporary directory, removed when dropped.
pub struct FixtureFile {
    path: PathBuf,
}

impl FixtureFile {
    pub fn new(name: &str, content: &[u8]) -> Self {
        let path = std::env::temp_dir().join(format!(
            "libksymtab-{}-{}",
            std::process::id(),
            name
        ));
        std::fs::write(&path, content).expect("Failed to write fixture file");
        FixtureFile { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FixtureFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
