//! Error taxonomy for a warehouse load.
//!
//! Every variant is fatal: a run either completes or aborts with one of these,
//! naming the stage and the offending value where one exists.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EtlError {
    /// Input missing, unreadable, or not the expected nine-column export
    #[error("source read failed at {location}: {reason}")]
    SourceRead { location: String, reason: String },

    /// A dimension's natural key (or surrogate key) is not unique
    #[error("dimension '{dimension}' integrity violated: duplicate {what} {value}")]
    DimensionIntegrity {
        dimension: &'static str,
        what: &'static str,
        value: String,
    },

    /// A join stage produced more rows than it consumed
    #[error(
        "join on '{dimension}' fanned out {input_rows} rows into {output_rows} (natural key {value} matches several surrogate keys)"
    )]
    JoinCardinality {
        dimension: &'static str,
        value: String,
        input_rows: usize,
        output_rows: usize,
    },

    /// Store unreachable, or it rejected the write
    #[error("persist to {target} failed: {reason}")]
    Persist { target: String, reason: String },
}

impl EtlError {
    pub(crate) fn source_read(location: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceRead {
            location: location.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn persist(target: impl Into<String>, err: impl ToString) -> Self {
        Self::Persist {
            target: target.into(),
            reason: err.to_string(),
        }
    }

    /// Pipeline stage the error belongs to, for the final failure message
    pub fn stage(&self) -> &'static str {
        match self {
            Self::SourceRead { .. } => "source loader",
            Self::DimensionIntegrity { .. } => "dimension builder",
            Self::JoinCardinality { .. } => "key resolver",
            Self::Persist { .. } => "sink",
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
