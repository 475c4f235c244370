mod batch;
mod discovery;

pub use batch::{
    extract_file, spawn_batch, BatchObserver, BatchOutcome, BatchRunner, BatchSummary, CancelFlag,
    NullObserver, ProgressCounter, TracingObserver,
};
pub use discovery::{discover_files, DocumentKind};
