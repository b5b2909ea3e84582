//! JSON file AOI source (`data/aois.json` by default).

use std::collections::HashSet;
use std::io::ErrorKind as IoErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::domain::{Aoi, AoiError, AoiRecord};
use crate::ports::{AoiSource, AoiSourceError};

/// Reads a JSON array of AOI records. A missing file means "no AOIs yet".
pub struct JsonFileAoiSource {
    path: PathBuf,
}

impl JsonFileAoiSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AoiSource for JsonFileAoiSource {
    async fn load(&self) -> Result<Vec<Aoi>, AoiSourceError> {
        let shown = self.path.display().to_string();
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                tracing::warn!(path = %shown, "AOI file not found, nothing to do");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(AoiSourceError::Io {
                    path: shown,
                    source,
                });
            }
        };
        let records: Vec<AoiRecord> =
            serde_json::from_slice(&raw).map_err(|e| AoiSourceError::Parse {
                path: shown.clone(),
                message: e.to_string(),
            })?;
        let aois = parse_records(records)?;
        tracing::debug!(path = %shown, count = aois.len(), "AOIs loaded");
        Ok(aois)
    }
}

/// Validate records in order, rejecting duplicate ids.
pub fn parse_records(records: Vec<AoiRecord>) -> Result<Vec<Aoi>, AoiSourceError> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            let aoi = Aoi::from_record(record)
                .map_err(|source| AoiSourceError::Invalid { index, source })?;
            if !seen.insert(aoi.id.clone()) {
                return Err(AoiSourceError::Invalid {
                    index,
                    source: AoiError::Duplicate(aoi.id),
                });
            }
            Ok(aoi)
        })
        .collect()
}
