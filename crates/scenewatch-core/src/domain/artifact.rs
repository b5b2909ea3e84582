//! Rendered artifacts.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AoiId, ArtifactId};
use super::scene::{ResolvedScene, SceneId};

/// Everything about an artifact except its bytes.
///
/// This is what the store writes next to the image and what batch outcomes
/// carry, so reports never have to hold image data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub id: ArtifactId,
    pub aoi_id: AoiId,
    pub scene_id: SceneId,
    pub acquired_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_cover: Option<f64>,
    pub recipe: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub generated_at: DateTime<Utc>,

    /// Store-relative location (e.g. `etna/2026-01-20_false_color_{artifact_id}.png`),
    /// filled in by stores that have one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl ArtifactMeta {
    pub fn is_for_scene(&self, scene: &ResolvedScene) -> bool {
        self.scene_id == scene.id
    }
}

/// A rendered image plus its metadata. Never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub meta: ArtifactMeta,
    pub bytes: Bytes,
}

impl Artifact {
    pub fn new(
        id: ArtifactId,
        aoi_id: AoiId,
        scene: &ResolvedScene,
        recipe: impl Into<String>,
        image: RenderedImage,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            meta: ArtifactMeta {
                id,
                aoi_id,
                scene_id: scene.id.clone(),
                acquired_at: scene.acquired_at,
                cloud_cover: scene.cloud_cover,
                recipe: recipe.into(),
                content_type: image.content_type,
                size_bytes: image.bytes.len() as u64,
                generated_at,
                location: None,
            },
            bytes: image.bytes,
        }
    }

    pub fn aoi_id(&self) -> &AoiId {
        &self.meta.aoi_id
    }

    pub fn scene_id(&self) -> &SceneId {
        &self.meta.scene_id
    }
}

/// Raw output of a render call.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedImage {
    pub bytes: Bytes,
    pub content_type: String,
}
