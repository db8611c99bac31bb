/////////////////////////////////
pub mod elf_file;
pub mod error;
pub mod ksymtab;
pub mod strings;
pub mod symtab;
/////////////////////////////////
use std::path::Path;
/////////////////////////////////

// Export the necessary modules and types as is
pub use elf_file::{ElfFile, Section};
pub use error::{KsymtabError, Result};
pub use ksymtab::{KSYMTAB_SIZE, Ksym, Ksymtab};
pub use strings::{KsymtabStrings, parse_ksymtab_strings};
pub use symtab::{GlobalSymbol, GlobalSymbols, SymbolBinding, for_each_global_symbol};

/// Names of all symbols exported with EXPORT_SYMBOL() and friends.
pub const KSYMTAB_STRINGS: &str = "__ksymtab_strings";
pub const SYMTAB: &str = ".symtab";
pub const STRTAB: &str = ".strtab";

/// Builds the list of exported symbols of a kernel binary, ie. reads the section
/// `__ksymtab_strings`.
///
/// Returns `Ok(None)` if `path` is not an ELF file or does not export anything. The value of
/// every symbol is its index in the export table.
pub fn read_ksymtab(path: &Path) -> Result<Option<Ksymtab>> {
    let Some(elf) = open_elf(path)? else {
        return Ok(None);
    };
    let ksymtab = extract(&elf)?;
    elf.close();
    Ok(ksymtab)
}

/// Same as [`read_ksymtab`], additionally marking every export which is backed by a global or
/// weak `.symtab` entry. Unmarked symbols are listed as exported but not defined globally.
pub fn read_and_confirm_ksymtab(path: &Path) -> Result<Option<Ksymtab>> {
    let Some(elf) = open_elf(path)? else {
        return Ok(None);
    };
    let mut ksymtab = extract(&elf)?;
    if let Some(ksymtab) = ksymtab.as_mut() {
        let confirmed = confirm_exports(&elf, ksymtab)?;
        log::debug!(
            "{}: {} of {} exported symbols confirmed",
            path.display(),
            confirmed,
            ksymtab.len()
        );
    }
    elf.close();
    Ok(ksymtab)
}

/// Marks every symbol of `ksymtab` which has a global or weak `.symtab` entry in `elf`.
/// Returns the number of symbols that were newly marked.
pub fn confirm_exports(elf: &ElfFile, ksymtab: &mut Ksymtab) -> Result<usize> {
    let marked_before = ksymtab.mark_count();
    for symbol in elf.global_symbols()? {
        ksymtab.mark(symbol?.name);
    }
    Ok(ksymtab.mark_count() - marked_before)
}

fn open_elf(path: &Path) -> Result<Option<ElfFile>> {
    match ElfFile::open(path) {
        Ok(elf) => Ok(Some(elf)),
        Err(KsymtabError::NotElf) => {
            log::debug!("{} is not an ELF file, skipping", path.display());
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn extract(elf: &ElfFile) -> Result<Option<Ksymtab>> {
    let Some(section) = elf.find_section(KSYMTAB_STRINGS)? else {
        log::debug!(
            "{} has no {} section",
            elf.path().display(),
            KSYMTAB_STRINGS
        );
        return Ok(None);
    };
    let ksymtab = parse_ksymtab_strings(section.data())?;
    for symbol in elf.global_symbols()? {
        let symbol = symbol?;
        log::debug!(
            "Symbol {}, value {:x}, binding {}",
            symbol.name,
            symbol.value,
            symbol.binding.code()
        );
    }
    Ok(Some(ksymtab))
}
