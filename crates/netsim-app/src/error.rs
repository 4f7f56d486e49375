//! Application-layer errors: fatal-at-startup per the error-handling design
//! (missing/unparseable lookup table), surfaced to the CLI as `anyhow`.

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("failed to read lookup table: {0}")]
    LookupIo(#[from] std::io::Error),

    #[error("failed to parse lookup table row: {0}")]
    LookupParse(#[from] csv::Error),

    #[error("lookup table has no rows")]
    EmptyLookupTable,

    #[error("lookup table missing any row for frame_id {0}")]
    NoRowsForFrame(u64),
}

pub type AppResult<T> = Result<T, AppError>;
