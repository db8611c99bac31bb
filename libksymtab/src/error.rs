use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KsymtabError {
    #[error("Failed to open file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input does not start with the ELF magic. Extraction treats this as "no result".
    #[error("Not an ELF file")]
    NotElf,

    #[error("Unsupported elf class: {0}")]
    UnsupportedClass(u8),

    #[error("{0}")]
    Format(String),

    /// The section was turned into SHT_NOBITS by a debuginfo split (eu-strip --reloc-debug-sections).
    #[error(
        "The {section} section has type SHT_NOBITS. Most likely you're running this tool on \
         modules coming from kernel-debuginfo packages. They don't contain the {section} \
         section, you need to use the raw modules before they are stripped"
    )]
    StrippedSection { section: String },

    #[error("Duplicate symbol: {0}")]
    DuplicateSymbol(String),

    #[error("Symbol name is empty")]
    EmptySymbolName,
}

impl KsymtabError {
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }

    /// Fatal errors mean the input was produced by a build the tool cannot work with.
    /// There is no point in continuing with other files.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedClass(_) | Self::Format(_) | Self::StrippedSection { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, KsymtabError>;
