use arrow::error::ArrowError;
use datafusion::error::DataFusionError;
use qsse_core::CodecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("invalid script header: {0}")]
    Header(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("script failed: {0}")]
    Sql(#[from] DataFusionError),

    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("script must return exactly one column, got {0}")]
    ColumnCount(usize),

    #[error("{kind} script must return {expected} row(s), got {actual}")]
    RowCount {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("script kind {0} is not evaluated")]
    UnsupportedKind(&'static str),
}

impl ScriptError {
    /// True for faults of the evaluator itself rather than of the script or its input.
    pub fn is_internal(&self) -> bool {
        matches!(self, ScriptError::Arrow(_))
    }
}
