//! RenderClient port - リモート render

use async_trait::async_trait;

use crate::domain::{Polygon, RenderError, RenderRecipe, RenderedImage, ResolvedScene};

/// Renders one scene over an AOI geometry.
///
/// A scene that can never produce an image (no valid pixels, outside
/// coverage) must come back as `RenderError::Unrenderable` so it is not
/// retried.
#[async_trait]
pub trait RenderClient: Send + Sync {
    async fn render(
        &self,
        geometry: &Polygon,
        scene: &ResolvedScene,
        recipe: &RenderRecipe,
    ) -> Result<RenderedImage, RenderError>;
}
