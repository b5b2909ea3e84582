//! InMemoryArtifactStore - テスト・組み込み用の ArtifactStore 実装
//!
//! AOI → `Arc<Artifact>` の map。`put` は Arc の差し替えなので、reader が
//! 見るのは常に古い artifact か新しい artifact のどちらか一方。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{AoiId, Artifact, ArtifactMeta, StoreError};
use crate::ports::ArtifactStore;
use crate::ports::artifact_store::ensure_key;

#[derive(Default)]
pub struct InMemoryArtifactStore {
    artifacts: RwLock<BTreeMap<AoiId, Arc<Artifact>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.artifacts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.artifacts.read().await.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn get(&self, aoi_id: &AoiId) -> Result<Option<Artifact>, StoreError> {
        let artifacts = self.artifacts.read().await;
        Ok(artifacts.get(aoi_id).map(|a| a.as_ref().clone()))
    }

    async fn head(&self, aoi_id: &AoiId) -> Result<Option<ArtifactMeta>, StoreError> {
        let artifacts = self.artifacts.read().await;
        Ok(artifacts.get(aoi_id).map(|a| a.meta.clone()))
    }

    async fn put(&self, aoi_id: &AoiId, artifact: Artifact) -> Result<ArtifactMeta, StoreError> {
        ensure_key(aoi_id, &artifact)?;
        let meta = artifact.meta.clone();
        let previous = self
            .artifacts
            .write()
            .await
            .insert(aoi_id.clone(), Arc::new(artifact));
        if let Some(previous) = previous {
            tracing::debug!(
                aoi_id = %aoi_id,
                superseded = %previous.meta.scene_id,
                scene_id = %meta.scene_id,
                "artifact replaced"
            );
        }
        Ok(meta)
    }

    async fn list(&self) -> Result<Vec<ArtifactMeta>, StoreError> {
        let artifacts = self.artifacts.read().await;
        Ok(artifacts.values().map(|a| a.meta.clone()).collect())
    }
}
