use thiserror::Error;

/// Failures raised by the analysis core.
///
/// `Schema` is structural and aborts the requested computation.
/// `InsufficientData` and `NoData` are scoped to the smallest unit that
/// lacked data and never abort sibling computations. `MalformedValue` is
/// recovered inside the normalizer and only surfaces as a drop count.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("required column {column:?} is missing from the input")]
    Schema { column: String },

    #[error("insufficient data for {scope}: need at least {needed}, found {found}")]
    InsufficientData {
        scope: String,
        needed: usize,
        found: usize,
    },

    #[error("no data for this selection ({selection})")]
    NoData { selection: String },

    #[error("column {column:?} has a malformed value {raw:?}")]
    MalformedValue { column: String, raw: String },
}

impl EngineError {
    pub fn schema(column: impl Into<String>) -> Self {
        EngineError::Schema {
            column: column.into(),
        }
    }

    pub fn insufficient(scope: impl Into<String>, needed: usize, found: usize) -> Self {
        EngineError::InsufficientData {
            scope: scope.into(),
            needed,
            found,
        }
    }

    /// True for errors caused by sparse data rather than a broken input shape.
    pub fn is_data_sparsity(&self) -> bool {
        matches!(
            self,
            EngineError::InsufficientData { .. } | EngineError::NoData { .. }
        )
    }
}
