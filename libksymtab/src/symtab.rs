use std::ffi::CStr;
use std::fmt::Display;
use std::slice::ChunksExact;

use crate::elf_file::{Elf64_Sym, read_pod};
use crate::error::{KsymtabError, Result};

const SYMBOL_TABLE_ENTRY_SIZE: usize = std::mem::size_of::<Elf64_Sym>();

/// Bindings that can be exported. Local and processor/OS specific bindings are filtered out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolBinding {
    Global,
    Weak,
}

impl SymbolBinding {
    // Note: #define ELF64_ST_BIND(i)   ((i)>>4)
    fn from_st_info(st_info: u8) -> Option<Self> {
        match st_info >> 4 {
            elf::abi::STB_GLOBAL => Some(SymbolBinding::Global),
            elf::abi::STB_WEAK => Some(SymbolBinding::Weak),
            _ => None,
        }
    }

    /// The raw `STB_*` value.
    pub fn code(self) -> u8 {
        match self {
            SymbolBinding::Global => elf::abi::STB_GLOBAL,
            SymbolBinding::Weak => elf::abi::STB_WEAK,
        }
    }
}

impl Display for SymbolBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SymbolBinding::Global => write!(f, "GLOBAL"),
            SymbolBinding::Weak => write!(f, "WEAK"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalSymbol<'a> {
    pub name: &'a str,
    pub value: u64,
    pub binding: SymbolBinding,
}

/// Iterator over the named global and weak entries of a `.symtab` section.
///
/// Names are resolved through `strtab`, the content of the `.strtab` section. An entry whose
/// name lies outside of `strtab` yields an error instead of reading past the table.
#[derive(Debug, Clone)]
pub struct GlobalSymbols<'a> {
    entries: ChunksExact<'a, u8>,
    strtab: &'a [u8],
}

impl<'a> GlobalSymbols<'a> {
    pub fn new(symtab: &'a [u8], strtab: &'a [u8]) -> Result<Self> {
        if symtab.len() % SYMBOL_TABLE_ENTRY_SIZE != 0 {
            return Err(KsymtabError::format(format!(
                "Symbol table size {} is not a multiple of the entry size {}",
                symtab.len(),
                SYMBOL_TABLE_ENTRY_SIZE
            )));
        }
        let mut entries = symtab.chunks_exact(SYMBOL_TABLE_ENTRY_SIZE);
        // skip first zero record
        entries.next();
        Ok(GlobalSymbols { entries, strtab })
    }

    fn symbol_name(&self, st_name: u32) -> Result<&'a str> {
        let offset = st_name as usize;
        if offset >= self.strtab.len() {
            return Err(KsymtabError::format(format!(
                "Symbol name index out of range: {} (string table size: {})",
                offset,
                self.strtab.len()
            )));
        }
        let name = CStr::from_bytes_until_nul(&self.strtab[offset..]).map_err(|_| {
            KsymtabError::format(format!(
                "Symbol name at string table offset {} is not null-terminated",
                offset
            ))
        })?;
        name.to_str().map_err(|err| {
            KsymtabError::format(format!(
                "Symbol name at string table offset {} is not valid UTF-8: {}",
                offset, err
            ))
        })
    }
}

impl<'a> Iterator for GlobalSymbols<'a> {
    type Item = Result<GlobalSymbol<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        for entry in self.entries.by_ref() {
            let symbol: Elf64_Sym = read_pod(entry, 0)?;
            let Some(binding) = SymbolBinding::from_st_info(symbol.st_info) else {
                continue;
            };
            if symbol.st_name == 0 {
                continue;
            }
            return Some(self.symbol_name(symbol.st_name).map(|name| GlobalSymbol {
                name,
                value: symbol.st_value,
                binding,
            }));
        }
        None
    }
}

/// Calls `handler` for every named global or weak symbol, stopping at the first malformed entry.
pub fn for_each_global_symbol<F>(symtab: &[u8], strtab: &[u8], mut handler: F) -> Result<()>
where
    F: FnMut(&GlobalSymbol),
{
    for symbol in GlobalSymbols::new(symtab, strtab)? {
        handler(&symbol?);
    }
    Ok(())
}
