/////////////////////////////////
use clap::Parser;
use std::path::PathBuf;
/////////////////////////////////

/// List the symbols a kernel image or module exports through EXPORT_SYMBOL().
#[derive(Parser, Debug)]
#[command(version)]
pub struct Options {
    /// Kernel images (vmlinux) or modules (*.ko) to read. Files that are not ELF are skipped.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Print every exported symbol as "<index> <name>", ordered by index.
    #[arg(short = 'l', long = "list")]
    pub list: bool,

    /// Check every exported symbol against the global and weak entries of .symtab and report
    /// the ones which are not defined there.
    #[arg(short = 'c', long = "confirm")]
    pub confirm: bool,

    /// Increase the log verbosity. Can be given multiple times.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Options {
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}
