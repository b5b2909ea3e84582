//! ArtifactStore port - 生成物の保存
//!
//! # 設計原則
//! - AOI ごとに最新の 1 件だけを保持（latest wins, 履歴なし）
//! - `put` は atomic replace: reader は書きかけの artifact を見ない
//! - 同じ AOI への書き込みは直列化、異なる AOI は並行可

use async_trait::async_trait;

use crate::domain::{AoiId, Artifact, ArtifactMeta, ResolvedScene, StoreError};

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Latest artifact for `aoi_id`, bytes included.
    async fn get(&self, aoi_id: &AoiId) -> Result<Option<Artifact>, StoreError>;

    /// Metadata of the latest artifact, without reading the image.
    async fn head(&self, aoi_id: &AoiId) -> Result<Option<ArtifactMeta>, StoreError>;

    /// Atomically replace the artifact for `aoi_id`; returns the stored
    /// metadata (with `location` set where the store has one).
    async fn put(&self, aoi_id: &AoiId, artifact: Artifact) -> Result<ArtifactMeta, StoreError>;

    /// Metadata of every stored artifact, ordered by AOI id.
    async fn list(&self) -> Result<Vec<ArtifactMeta>, StoreError>;

    /// True iff the stored artifact was rendered from `scene`.
    async fn is_fresh(&self, aoi_id: &AoiId, scene: &ResolvedScene) -> Result<bool, StoreError> {
        Ok(self
            .head(aoi_id)
            .await?
            .is_some_and(|meta| meta.is_for_scene(scene)))
    }
}

pub(crate) fn ensure_key(aoi_id: &AoiId, artifact: &Artifact) -> Result<(), StoreError> {
    if artifact.aoi_id() != aoi_id {
        return Err(StoreError::KeyMismatch {
            expected: aoi_id.to_string(),
            actual: artifact.aoi_id().to_string(),
        });
    }
    Ok(())
}
