///////////////////////////
mod logger;
mod options;
mod report;
///////////////////////////
use clap::Parser;
use colored::Colorize;
///////////////////////////
use libksymtab::KsymtabError;
use options::Options;
use report::ReportOptions;
///////////////////////////

fn main() {
    let options = Options::parse();
    logger::init(options.log_level()).unwrap_or_else(|e| {
        eprintln!("{}", e);
        std::process::exit(1);
    });

    let report_options = ReportOptions {
        list: options.list,
        confirm: options.confirm,
    };
    let mut stdout = std::io::stdout().lock();
    let mut failed = false;
    for path in &options.paths {
        if let Err(err) = report::process_file(path, report_options, &mut stdout) {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            let is_fatal = err
                .downcast_ref::<KsymtabError>()
                .is_some_and(KsymtabError::is_fatal);
            if is_fatal {
                // The build which produced this file is not supported, later files won't be either.
                std::process::exit(1);
            }
            failed = true;
        }
    }
    if failed {
        std::process::exit(1);
    }
}
