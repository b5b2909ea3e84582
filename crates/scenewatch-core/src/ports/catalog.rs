//! CatalogClient port - リモート catalog の検索

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{CatalogError, Polygon, SceneCandidate};

/// Searches the imagery catalog.
///
/// Implementations return every candidate intersecting `geometry` with an
/// acquisition time in `[start, end]`; filtering and selection are the
/// resolver's job. Failures must keep transport problems
/// (`Transport`, 5xx/429 `Status`, `Malformed`) apart from logical ones.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn search(
        &self,
        geometry: &Polygon,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SceneCandidate>, CatalogError>;
}
