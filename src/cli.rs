//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "meal-orders",
    version,
    about = "Extract school meal orders from spreadsheets and PDFs into SQLite"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(long = "log-level", value_enum, default_value = "info", global = true)]
    pub log_level: LogLevelArg,

    #[arg(long = "log-format", value_enum, default_value = "pretty", global = true)]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract every order document in a folder into a new database.
    Extract(ExtractArgs),

    /// Write a starter normalization config.
    Template {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },

    /// Print the canonical form of school names.
    Normalize {
        #[arg(value_name = "NAME", required = true)]
        names: Vec<String>,

        #[arg(long, value_name = "FILE")]
        mapping: Option<PathBuf>,
    },
}

#[derive(Parser, Debug)]
pub struct ExtractArgs {
    /// Folder searched recursively for .xlsx, .xls, .ods, .pdf and .txt files.
    #[arg(value_name = "FOLDER")]
    pub folder: PathBuf,

    /// Normalization config with `replacements` and/or `mappings`.
    #[arg(long, value_name = "FILE")]
    pub mapping: Option<PathBuf>,

    /// Directory for the database and exports (default: FOLDER).
    #[arg(long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Also write the list of school spellings found.
    #[arg(long = "export-schools")]
    pub export_schools: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_extract_with_flags() {
        let cli = Cli::try_parse_from([
            "meal-orders",
            "extract",
            "/data/semaine12",
            "--mapping",
            "map.json",
            "--export-schools",
            "--log-format",
            "json",
        ])
        .unwrap();
        let Command::Extract(args) = cli.command else {
            panic!("expected extract");
        };
        assert_eq!(args.folder, PathBuf::from("/data/semaine12"));
        assert_eq!(args.mapping, Some(PathBuf::from("map.json")));
        assert!(args.export_schools);
        assert!(args.output.is_none());
        assert!(matches!(cli.log_format, LogFormatArg::Json));
    }

    #[test]
    fn normalize_requires_a_name() {
        assert!(Cli::try_parse_from(["meal-orders", "normalize"]).is_err());
        let cli =
            Cli::try_parse_from(["meal-orders", "normalize", "Ste Anne", "Jules Ferry"]).unwrap();
        let Command::Normalize { names, mapping } = cli.command else {
            panic!("expected normalize");
        };
        assert_eq!(names.len(), 2);
        assert!(mapping.is_none());
    }
}
