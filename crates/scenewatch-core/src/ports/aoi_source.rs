//! AoiSource port - AOI の読み込み

use async_trait::async_trait;

use crate::domain::{Aoi, AoiError};

#[derive(Debug, thiserror::Error)]
pub enum AoiSourceError {
    #[error("cannot read AOI source {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse AOI source {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid AOI at index {index}: {source}")]
    Invalid {
        index: usize,
        #[source]
        source: AoiError,
    },
}

/// Provides the ordered AOI list at the start of a run.
#[async_trait]
pub trait AoiSource: Send + Sync {
    async fn load(&self) -> Result<Vec<Aoi>, AoiSourceError>;
}
