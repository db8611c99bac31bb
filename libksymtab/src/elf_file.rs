use std::ffi::CStr;
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};
/////////////////////////////////////////
use elf::abi::{
    EI_CLASS, EI_DATA, EI_NIDENT, EI_VERSION, ELFCLASS64, ELFDATA2LSB, ELFDATA2MSB, ELFMAG0,
    ELFMAG1, ELFMAG2, ELFMAG3, EV_CURRENT, SHN_XINDEX, SHT_NOBITS,
};
use memmap::{Mmap, MmapOptions};
/////////////////////////////////////////
use crate::error::{KsymtabError, Result};
use crate::symtab::GlobalSymbols;
use crate::{STRTAB, SYMTAB};
/////////////////////////////////////////

const ELF_MAGIC: [u8; 4] = [ELFMAG0, ELFMAG1, ELFMAG2, ELFMAG3];

const HOST_DATA_ENCODING: u8 = if cfg!(target_endian = "little") {
    ELFDATA2LSB
} else {
    ELFDATA2MSB
};

#[allow(non_camel_case_types)]
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Elf64_Ehdr {
    pub e_ident: [u8; 16],
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: u64,
    pub e_phoff: u64,
    pub e_shoff: u64,
    pub e_flags: u32,
    pub e_ehsize: u16,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

/// Section header
#[allow(non_camel_case_types)]
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Elf64_Shdr {
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: u64,
    pub sh_addr: u64,
    pub sh_offset: u64,
    pub sh_size: u64,
    pub sh_link: u32,
    pub sh_info: u32,
    pub sh_addralign: u64,
    pub sh_entsize: u64,
}

/// Symbol table entry
#[allow(non_camel_case_types)]
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Elf64_Sym {
    pub st_name: u32,
    pub st_info: u8,
    pub st_other: u8,
    pub st_shndx: u16,
    pub st_value: u64,
    pub st_size: u64,
}

/// Plain data structures for which every bit pattern is a valid value.
///
/// # Safety
/// Implementors must be `repr(C)` and contain only integers and arrays of integers.
pub(crate) unsafe trait Pod: Copy {}

unsafe impl Pod for Elf64_Ehdr {}
unsafe impl Pod for Elf64_Shdr {}
unsafe impl Pod for Elf64_Sym {}

/// Reads a `T` stored at `offset` in `data`, `None` if it does not fit.
pub(crate) fn read_pod<T: Pod>(data: &[u8], offset: usize) -> Option<T> {
    let end = offset.checked_add(std::mem::size_of::<T>())?;
    let bytes = data.get(offset..end)?;
    // SAFETY: `bytes` covers size_of::<T>() bytes and T is plain data, so an unaligned read is OK.
    Some(unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const T) })
}

/// Raw contents of a named section, borrowed from the [`ElfFile`] it was found in.
#[derive(Debug, Clone, Copy)]
pub struct Section<'a> {
    name: &'a str,
    header: &'a Elf64_Shdr,
    data: &'a [u8],
}

impl<'a> Section<'a> {
    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn header(&self) -> &'a Elf64_Shdr {
        self.header
    }

    /// Never empty.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    fn file_range(&self) -> Range<usize> {
        let start = self.header.sh_offset as usize;
        start..start + self.data.len()
    }
}

/// An open 64-bit ELF file.
///
/// The file is mapped read-only for the lifetime of the handle. Sections returned by
/// [`ElfFile::find_section`] borrow the mapping and therefore cannot outlive the handle.
#[derive(Debug)]
pub struct ElfFile {
    path: PathBuf,
    file_handle: File,
    mmap: Mmap,
    header: Elf64_Ehdr,
    section_headers: Vec<Elf64_Shdr>,
    /// Index of the section name string table.
    shstrndx: usize,
    /// Location of `.strtab` in the mapping, if the file has one.
    strtab: Option<Range<usize>>,
}

impl ElfFile {
    /// Opens and validates `path`.
    ///
    /// Fails with [`KsymtabError::NotElf`] if the file does not carry the ELF magic, which callers
    /// are expected to handle separately from a corrupt ELF file ([`KsymtabError::Format`]).
    pub fn open(path: &Path) -> Result<Self> {
        let io_error = |source: std::io::Error| KsymtabError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file_handle = File::open(path).map_err(io_error)?;
        let file_size = file_handle.metadata().map_err(io_error)?.len();
        // Also keeps us from mapping empty files, which mmap refuses.
        if file_size < EI_NIDENT as u64 {
            return Err(KsymtabError::NotElf);
        }
        // SAFETY: The mapping is read-only. The file must not be truncated while it is mapped,
        // which holds for build artifacts being inspected.
        let mmap = unsafe { MmapOptions::new().map(&file_handle) }.map_err(io_error)?;

        let header = Self::parse_header(&mmap)?;
        let section_headers = Self::parse_section_headers(&mmap, &header)?;
        let shstrndx = Self::section_name_table_index(&header, &section_headers)?;
        let mut elf = Self {
            path: path.to_path_buf(),
            file_handle,
            mmap,
            header,
            section_headers,
            shstrndx,
            strtab: None,
        };
        let strtab = elf.find_section(STRTAB)?.map(|section| section.file_range());
        if strtab.is_none() {
            log::debug!("{} has no {} section", path.display(), STRTAB);
        }
        elf.strtab = strtab;
        Ok(elf)
    }

    /// Releases the mapping and the file descriptor.
    ///
    /// Every [`Section`] obtained from this handle must be gone by now, which the borrow checker
    /// enforces. Dropping the handle has the same effect.
    pub fn close(self) {
        let ElfFile {
            path,
            file_handle,
            mmap,
            ..
        } = self;
        log::trace!("Closing {}", path.display());
        drop(mmap);
        drop(file_handle);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &Elf64_Ehdr {
        &self.header
    }

    /// Number of entries in the section header table, including the null section.
    pub fn section_count(&self) -> usize {
        self.section_headers.len()
    }

    /// Content of `.strtab`, cached when the file was opened.
    pub fn strtab(&self) -> Option<&[u8]> {
        self.strtab.clone().map(|range| &self.mmap[range])
    }

    /// Looks up a section by name.
    ///
    /// A missing section is not an error. A section that was emptied by `eu-strip` (SHT_NOBITS)
    /// is [`KsymtabError::StrippedSection`] since its data only exists in another file, and an
    /// empty section is a [`KsymtabError::Format`] error.
    pub fn find_section(&self, name: &str) -> Result<Option<Section<'_>>> {
        // Section 0 is the reserved null section.
        for section_header in self.section_headers.iter().skip(1) {
            let section_name = self.section_name(section_header.sh_name as usize)?;
            if section_name.to_bytes() != name.as_bytes() {
                continue;
            }
            log::trace!(
                "Found section {} in {} (type: {}, offset: {:#x}, size: {:#x})",
                name,
                self.path.display(),
                section_header.sh_type,
                section_header.sh_offset,
                section_header.sh_size
            );
            return self.section_content(section_name, section_header).map(Some);
        }
        Ok(None)
    }

    /// Named global and weak symbols of `.symtab`.
    pub fn global_symbols(&self) -> Result<GlobalSymbols<'_>> {
        let symtab = self
            .find_section(SYMTAB)?
            .ok_or_else(|| KsymtabError::format(format!("Missing {} section", SYMTAB)))?;
        let strtab = self
            .strtab()
            .ok_or_else(|| KsymtabError::format(format!("Missing {} section", STRTAB)))?;
        GlobalSymbols::new(symtab.data(), strtab)
    }

    fn section_content<'a>(
        &'a self,
        section_name: &'a CStr,
        section_header: &'a Elf64_Shdr,
    ) -> Result<Section<'a>> {
        let name = section_name.to_str().map_err(|err| {
            KsymtabError::format(format!("Invalid section name bytes: {}", err))
        })?;
        if section_header.sh_type == SHT_NOBITS {
            return Err(KsymtabError::StrippedSection {
                section: name.to_string(),
            });
        }
        if section_header.sh_size == 0 {
            return Err(KsymtabError::format(format!("{} section empty!", name)));
        }
        let offset = section_header.sh_offset as usize;
        let size = section_header.sh_size as usize;
        if section_header.sh_offset > usize::MAX as u64
            || section_header.sh_size > usize::MAX as u64
            || offset
                .checked_add(size)
                .map_or(true, |end| end > self.mmap.len())
        {
            return Err(KsymtabError::format(format!(
                "Section '{}' content exceeds file size (offset: {}, size: {})",
                name, section_header.sh_offset, section_header.sh_size
            )));
        }
        Ok(Section {
            name,
            header: section_header,
            data: &self.mmap[offset..offset + size],
        })
    }

    fn section_name(&self, sh_name: usize) -> Result<&CStr> {
        let string_table_section_header = &self.section_headers[self.shstrndx];
        let string_table_offset = string_table_section_header.sh_offset as usize;
        let string_table_size = string_table_section_header.sh_size as usize;
        let table_end = string_table_offset
            .checked_add(string_table_size)
            .ok_or_else(|| KsymtabError::format("Section name string table overflows"))?;
        if table_end > self.mmap.len() {
            return Err(KsymtabError::format(
                "Section name string table exceeds file size",
            ));
        }
        if sh_name >= string_table_size {
            return Err(KsymtabError::format(format!(
                "Section name offset {} out of range (string table size: {})",
                sh_name, string_table_size
            )));
        }
        let table = &self.mmap[string_table_offset..table_end];
        CStr::from_bytes_until_nul(&table[sh_name..])
            .map_err(|_| KsymtabError::format("Section name is not null-terminated"))
    }

    fn parse_header(data: &[u8]) -> Result<Elf64_Ehdr> {
        // Check the magic number to verify that this is an ELF file.
        if data.len() < EI_NIDENT || data[..ELF_MAGIC.len()] != ELF_MAGIC {
            return Err(KsymtabError::NotElf);
        }
        let class = data[EI_CLASS];
        if class != ELFCLASS64 {
            return Err(KsymtabError::UnsupportedClass(class));
        }
        if data[EI_VERSION] != EV_CURRENT {
            return Err(KsymtabError::format(format!(
                "Unsupported ELF version: {}",
                data[EI_VERSION]
            )));
        }
        if data[EI_DATA] != HOST_DATA_ENCODING {
            return Err(KsymtabError::format(format!(
                "Unsupported ELF data encoding: {}",
                data[EI_DATA]
            )));
        }
        read_pod::<Elf64_Ehdr>(data, 0)
            .ok_or_else(|| KsymtabError::format("File is too small to contain an ELF header"))
    }

    fn parse_section_headers(data: &[u8], header: &Elf64_Ehdr) -> Result<Vec<Elf64_Shdr>> {
        const SECTION_HEADER_SIZE: usize = std::mem::size_of::<Elf64_Shdr>();
        if header.e_shoff == 0 {
            return Ok(Vec::new());
        }
        if header.e_shentsize as usize != SECTION_HEADER_SIZE {
            return Err(KsymtabError::format(format!(
                "Unexpected section header entry size: {}",
                header.e_shentsize
            )));
        }
        if header.e_shoff > usize::MAX as u64 {
            return Err(KsymtabError::format(
                "Section headers offset exceeds addressable memory",
            ));
        }
        let section_headers_offset = header.e_shoff as usize;
        let num_of_sections = if header.e_shnum == 0 {
            // The file has 0xff00 or more sections, the actual number of sections is stored
            // in the sh_size field of the first section header.
            let first_section_header: Elf64_Shdr = read_pod(data, section_headers_offset)
                .ok_or_else(|| KsymtabError::format("Section header exceeds file size"))?;
            if first_section_header.sh_size > usize::MAX as u64 {
                return Err(KsymtabError::format(
                    "Section count exceeds addressable memory",
                ));
            }
            first_section_header.sh_size as usize
        } else {
            header.e_shnum as usize
        };

        let section_headers_size = num_of_sections
            .checked_mul(SECTION_HEADER_SIZE)
            .ok_or_else(|| KsymtabError::format("Section headers size overflows"))?;
        if section_headers_offset
            .checked_add(section_headers_size)
            .map_or(true, |end| end > data.len())
        {
            return Err(KsymtabError::format("Section headers exceed file size"));
        }

        (0..num_of_sections)
            .map(|index| {
                read_pod(data, section_headers_offset + index * SECTION_HEADER_SIZE)
                    .ok_or_else(|| KsymtabError::format("Section header exceeds file size"))
            })
            .collect()
    }

    fn section_name_table_index(
        header: &Elf64_Ehdr,
        section_headers: &[Elf64_Shdr],
    ) -> Result<usize> {
        if section_headers.is_empty() {
            return Ok(0);
        }
        let shstrndx = if header.e_shstrndx == SHN_XINDEX {
            // Escape value, the real index lives in sh_link of the first section header.
            section_headers[0].sh_link as usize
        } else {
            header.e_shstrndx as usize
        };
        if shstrndx == 0 || shstrndx >= section_headers.len() {
            return Err(KsymtabError::format(format!(
                "Section name string table index {} out of range",
                shstrndx
            )));
        }
        Ok(shstrndx)
    }
}
