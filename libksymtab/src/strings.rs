use crate::KSYMTAB_STRINGS;
use crate::error::{KsymtabError, Result};
use crate::ksymtab::{KSYMTAB_SIZE, Ksymtab};

/// Splits the raw content of `__ksymtab_strings` into `(name, index)` pairs.
///
/// The section is a sequence of NUL terminated names. Empty names (the linker pads the section
/// with extra NULs) are skipped and do not consume an index, so the index of a name is its
/// position in the kernel export table rather than its byte offset.
#[derive(Debug, Clone)]
pub struct KsymtabStrings<'a> {
    data: &'a [u8],
    position: usize,
    index: u64,
}

impl<'a> KsymtabStrings<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        // Make sure we have the final '\0'
        if data.last() != Some(&0) {
            return Err(KsymtabError::format(format!(
                "Malformed {} section: missing terminating NUL byte",
                KSYMTAB_STRINGS
            )));
        }
        Ok(KsymtabStrings {
            data,
            position: 0,
            index: 0,
        })
    }
}

impl<'a> Iterator for KsymtabStrings<'a> {
    type Item = Result<(&'a str, u64)>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.position < self.data.len() {
            let start = self.position;
            // There is always a NUL ahead of us, the last byte is one.
            let len = self.data[start..].iter().position(|&byte| byte == 0)?;
            self.position = start + len + 1;
            if len == 0 {
                continue;
            }
            let index = self.index;
            self.index += 1;
            let name = std::str::from_utf8(&self.data[start..start + len]).map_err(|err| {
                KsymtabError::format(format!(
                    "Malformed {} section: name at offset {} is not valid UTF-8: {}",
                    KSYMTAB_STRINGS, start, err
                ))
            });
            return Some(name.map(|name| (name, index)));
        }
        None
    }
}

/// Parses raw content of `__ksymtab_strings` to a [`Ksymtab`].
pub fn parse_ksymtab_strings(data: &[u8]) -> Result<Ksymtab> {
    let mut ksymtab = Ksymtab::with_capacity(KSYMTAB_SIZE);
    for entry in KsymtabStrings::new(data)? {
        let (name, index) = entry?;
        match ksymtab.insert(name, index) {
            Ok(_) => {}
            // Namespace strings of EXPORT_SYMBOL_NS share the section, one copy per export.
            Err(KsymtabError::DuplicateSymbol(name)) => {
                log::debug!(
                    "{} is listed again at index {}, keeping the first one",
                    name,
                    index
                );
            }
            Err(err) => return Err(err),
        }
    }
    log::debug!(
        "Parsed {} symbols out of {} bytes of {}",
        ksymtab.len(),
        data.len(),
        KSYMTAB_STRINGS
    );
    Ok(ksymtab)
}
