use std::path::PathBuf;

use delivery_core::CoreError;

/// Errors surfaced on the source sequence alongside successful items.
///
/// Only [`SourceError::Open`] ends the sequence; everything else is
/// reported and ingestion continues with the next line.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Cannot open source {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Read failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("Parse event: {0}")]
    Decode(#[source] CoreError),

    #[error("Mutate event: {0}")]
    Mutate(#[source] CoreError),
}

impl SourceError {
    /// Whether the source is gone for good.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SourceError::Open { .. })
    }
}
