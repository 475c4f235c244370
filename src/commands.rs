use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::cli::ExtractArgs;
use crate::config::{database_file_name, Settings};
use crate::db::{Db, OrderSink};
use crate::error::{AppError, ConfigError};
use crate::models::NormalizationConfig;
use crate::normalizer::NormalizationEngine;
use crate::services::{discover_files, spawn_batch, BatchRunner, BatchSummary, TracingObserver};

/// Result of `extract`.
pub struct ExtractOutcome {
    pub summary: BatchSummary,
    pub database: PathBuf,
    pub stored_records: i64,
    /// (json, txt) when the found-schools export was requested.
    pub school_exports: Option<(PathBuf, PathBuf)>,
}

/// One line of `normalize` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedName {
    pub input: String,
    pub canonical: String,
    /// Set when normalizing the canonical form changes it again.
    pub renormalized: Option<String>,
}

/// Builtin rules, then the operator's config on top when one is given.
pub fn load_engine(mapping: Option<&Path>) -> Result<NormalizationEngine, ConfigError> {
    let mut engine = NormalizationEngine::new();
    if let Some(path) = mapping {
        engine.load_mapping_file(path)?;
        info!(
            file = %path.display(),
            rules = engine.rule_count(),
            mappings = engine.mapping_count(),
            "normalization config loaded"
        );
    }
    Ok(engine)
}

/// Extract every document under `args.folder` into a new timestamped database.
pub fn run_extract(args: &ExtractArgs, settings: Settings) -> Result<ExtractOutcome, AppError> {
    if !args.folder.is_dir() {
        return Err(AppError::MissingInput(args.folder.clone()));
    }
    let settings = settings.with_overrides(args.mapping.clone(), args.output.clone());
    let engine = load_engine(settings.mapping_file.as_deref())?;
    let files = discover_files(&args.folder)?;

    let output_dir = settings.output_dir_for(&args.folder);
    let db = Db::create(output_dir.join(database_file_name(Local::now())))?;
    let database = db.path().to_path_buf();
    info!(
        folder = %args.folder.display(),
        files = files.len(),
        db = %database.display(),
        "starting extraction"
    );

    let handle = spawn_batch(BatchRunner::new(engine), files, db, TracingObserver)
        .map_err(AppError::Worker)?;
    let outcome = handle.join().map_err(|_| AppError::WorkerPanicked)?;
    let result = outcome.result?;
    let stored_records = outcome.sink.count_records()?;
    outcome.sink.close()?;

    let school_exports = if args.export_schools {
        Some(outcome.runner.engine().export_found_schools(&output_dir)?)
    } else {
        None
    };

    Ok(ExtractOutcome {
        summary: outcome.runner.summary(result),
        database,
        stored_records,
        school_exports,
    })
}

pub fn run_template(path: &Path) -> Result<(), AppError> {
    NormalizationConfig::template().write(path)?;
    info!(file = %path.display(), "template written");
    Ok(())
}

pub fn run_normalize(
    names: &[String],
    mapping: Option<&Path>,
) -> Result<Vec<NormalizedName>, AppError> {
    let engine = load_engine(mapping)?;
    let unstable = engine.check_idempotence(names.iter().map(String::as_str));
    Ok(names
        .iter()
        .map(|name| NormalizedName {
            input: name.clone(),
            canonical: engine.canonicalize(name),
            renormalized: unstable
                .iter()
                .find(|v| &v.input == name)
                .map(|v| v.second.clone()),
        })
        .collect())
}
