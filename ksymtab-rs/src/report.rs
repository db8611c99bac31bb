use std::io::Write;
use std::path::Path;
/////////////////////////////////////////
use anyhow::{Context, Result};
use colored::Colorize;
/////////////////////////////////////////
use libksymtab::{KSYMTAB_STRINGS, Ksymtab, SYMTAB, read_and_confirm_ksymtab, read_ksymtab};
/////////////////////////////////////////

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    pub list: bool,
    pub confirm: bool,
}

/// Reads the exports of `path` and prints the report for it.
pub fn process_file(path: &Path, options: ReportOptions, out: &mut impl Write) -> Result<()> {
    let ksymtab = if options.confirm {
        read_and_confirm_ksymtab(path)
    } else {
        read_ksymtab(path)
    }
    .with_context(|| format!("Failed to read exported symbols of {}", path.display()))?;

    match ksymtab {
        Some(ksymtab) => write_report(path, &ksymtab, options, out),
        None => {
            // Not a hard error, a directory of modules usually contains other files too
            writeln!(
                out,
                "{}: not an ELF file or no {} section, skipping",
                path.display().to_string().bold(),
                KSYMTAB_STRINGS
            )?;
            Ok(())
        }
    }
}

pub fn write_report(
    path: &Path,
    ksymtab: &Ksymtab,
    options: ReportOptions,
    out: &mut impl Write,
) -> Result<()> {
    writeln!(
        out,
        "{}: {} exported symbols",
        path.display().to_string().bold(),
        ksymtab.len()
    )?;
    if options.list {
        for ksym in ksymtab.sorted_by_value() {
            writeln!(out, "{:>6} {}", ksym.value(), ksym.name())?;
        }
    }
    if options.confirm {
        let unconfirmed_count = ksymtab.len() - ksymtab.mark_count();
        writeln!(
            out,
            "{} confirmed in {}, {} unconfirmed",
            ksymtab.mark_count(),
            SYMTAB,
            if unconfirmed_count == 0 {
                unconfirmed_count.to_string().green()
            } else {
                unconfirmed_count.to_string().yellow()
            }
        )?;
        let mut unconfirmed: Vec<(&str, usize)> = ksymtab.unmarked().collect();
        unconfirmed.sort_by_key(|&(_, index)| index);
        for (name, index) in unconfirmed {
            writeln!(out, "{:>6} {}", index, name.yellow())?;
        }
    }
    Ok(())
}
