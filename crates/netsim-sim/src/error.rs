//! CLI/runner errors, mapped to process exit codes in `main`.
//!
//! Per the error-handling design, only startup-fatal conditions
//! (unreadable/unparseable trace or lookup table, unknown `--cc`/`--app`
//! name, unloadable policy checkpoint) surface here; everything the
//! simulation core itself detects mid-run is either fed to a congestion
//! controller or halts as a `CoreError`.

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to load trace: {0}")]
    Trace(#[from] netsim_core::trace::TraceError),

    #[error("failed to load lookup table: {0}")]
    LookupTable(#[from] netsim_app::AppError),

    #[error("failed to load policy checkpoint: {0}")]
    Policy(#[from] netsim_core::congestion::PolicyError),

    #[error("unknown congestion control algorithm: {0}")]
    UnknownCc(String),

    #[error("unknown application: {0}")]
    UnknownApp(String),

    #[error("video_streaming requires --lookup-table")]
    MissingLookupTable,

    #[error("simulation core error: {0}")]
    Core(#[from] netsim_core::error::CoreError),

    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to write CSV output: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to serialize manifest: {0}")]
    Json(#[from] serde_json::Error),
}

/// The three exit-code buckets named in the CLI's error handling design.
pub enum ExitBucket {
    Success,
    StartupUnreadable,
    UnknownName,
}

impl RunError {
    pub fn exit_bucket(&self) -> ExitBucket {
        match self {
            RunError::UnknownCc(_) | RunError::UnknownApp(_) => ExitBucket::UnknownName,
            _ => ExitBucket::StartupUnreadable,
        }
    }
}

impl ExitBucket {
    pub fn code(&self) -> i32 {
        match self {
            ExitBucket::Success => 0,
            ExitBucket::StartupUnreadable => 2,
            ExitBucket::UnknownName => 3,
        }
    }
}
