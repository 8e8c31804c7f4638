use std::path::PathBuf;
use thiserror::Error;

/// Error kinds raised by the TS-estimate pipeline.
#[derive(Debug, Error)]
pub enum TsError {
    #[error("I/O operation failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("failed to parse {what}: {details} (at line ~{line})")]
    Parse {
        what: &'static str,
        line: usize,
        details: String,
    },

    #[error("unknown species: {0}")]
    UnknownSpecies(String),

    #[error("no reference minima found for '{species}' under {dir:?}")]
    MissingReferenceData { species: String, dir: PathBuf },

    #[error("expected file or directory is missing: {0:?}")]
    FileSystem(PathBuf),

    #[error("job template error: {0}")]
    Template(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl TsError {
    pub fn parse(what: &'static str, line: usize, details: impl Into<String>) -> Self {
        Self::Parse {
            what,
            line,
            details: details.into(),
        }
    }

    /// Errors that only invalidate the reaction being processed: unreadable
    /// species and geometry that cannot be placed.
    pub fn is_reaction_local(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::UnknownSpecies(_) | Self::InvalidInput(_))
    }
}

pub type Result<T> = std::result::Result<T, TsError>;
