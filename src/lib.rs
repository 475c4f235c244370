pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod excel;
pub mod logging;
pub mod metadata;
pub mod models;
pub mod normalizer;
pub mod pdf;
pub mod services;
pub mod types;

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, Level};

use cli::{Cli, Command, LogFormatArg, LogLevelArg};
use commands::{run_extract, run_normalize, run_template, ExtractOutcome};
use config::Settings;
use logging::{init_logging, LogConfig, LogFormat};

/// Command-line entry point.
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(&log_config_from_cli(&cli)) {
        eprintln!("error: failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let outcome = match &cli.command {
        Command::Extract(args) => run_extract(args, Settings::from_env()).map(|outcome| {
            print_extract(&outcome);
            if outcome.summary.result.files_errored > 0 {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }),
        Command::Template { path } => run_template(path).map(|()| {
            println!("Template written to {}", path.display());
            ExitCode::SUCCESS
        }),
        Command::Normalize { names, mapping } => {
            let mapping = mapping.clone().or(Settings::from_env().mapping_file);
            run_normalize(names, mapping.as_deref()).map(|lines| {
                for line in lines {
                    match line.renormalized {
                        Some(again) => println!(
                            "{} -> {}  (not stable: normalizes again to {})",
                            line.input, line.canonical, again
                        ),
                        None => println!("{} -> {}", line.input, line.canonical),
                    }
                }
                ExitCode::SUCCESS
            })
        }
    };

    outcome.unwrap_or_else(|e| {
        error!("{e}");
        eprintln!("error: {e}");
        ExitCode::FAILURE
    })
}

fn print_extract(outcome: &ExtractOutcome) {
    for line in outcome.summary.lines() {
        println!("{line}");
    }
    println!(
        "Database: {} ({} rows)",
        outcome.database.display(),
        outcome.stored_records
    );
    if let Some((json, txt)) = &outcome.school_exports {
        println!("Schools found: {} / {}", json.display(), txt.display());
    }
}

fn log_config_from_cli(cli: &Cli) -> LogConfig {
    let level = match cli.log_level {
        LogLevelArg::Error => Level::ERROR,
        LogLevelArg::Warn => Level::WARN,
        LogLevelArg::Info => Level::INFO,
        LogLevelArg::Debug => Level::DEBUG,
        LogLevelArg::Trace => Level::TRACE,
    };
    let format = match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Compact => LogFormat::Compact,
        LogFormatArg::Json => LogFormat::Json,
    };
    LogConfig::default()
        .with_level(level)
        .with_format(format)
        .with_log_file(cli.log_file.clone())
}
