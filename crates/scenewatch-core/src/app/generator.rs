//! CompositeGenerator - resolved scene から artifact を作る
//!
//! 各 attempt は `attempt_timeout` で打ち切られ、timeout は transient 扱い。
//! unrenderable は 1 回で諦める。保存は store の仕事なのでここでは行わない。

use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use crate::domain::{Aoi, Artifact, PipelineError, RenderError, RenderRecipe, ResolvedScene};
use crate::ports::{Clock, IdGenerator, RenderClient};
use crate::retry::RetryPolicy;

pub struct CompositeGenerator {
    render: Arc<dyn RenderClient>,
    retry: RetryPolicy,
    attempt_timeout: Duration,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl CompositeGenerator {
    pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(90);

    pub fn new(
        render: Arc<dyn RenderClient>,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            render,
            retry,
            attempt_timeout: Self::DEFAULT_ATTEMPT_TIMEOUT,
            clock,
            ids,
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    #[instrument(skip_all, fields(aoi_id = %aoi.id, scene_id = %scene.id, recipe = %recipe.name))]
    pub async fn generate(
        &self,
        aoi: &Aoi,
        scene: &ResolvedScene,
        recipe: &RenderRecipe,
    ) -> Result<Artifact, PipelineError> {
        let timeout = self.attempt_timeout;
        let outcome = self
            .retry
            .run(|attempt| async move {
                tracing::debug!(attempt, "requesting render");
                match tokio::time::timeout(timeout, self.render.render(&aoi.polygon, scene, recipe))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(RenderError::Timeout(timeout)),
                }
            })
            .await;

        let image = outcome
            .result
            .map_err(|err| PipelineError::from_render(err, &scene.id, outcome.attempts))?;

        tracing::info!(
            attempts = outcome.attempts,
            size_bytes = image.bytes.len(),
            "render complete"
        );

        Ok(Artifact::new(
            self.ids.generate_artifact_id(),
            aoi.id.clone(),
            scene,
            recipe.name.clone(),
            image,
            self.clock.now(),
        ))
    }
}
