//! BatchOrchestrator - 全 AOI を並行に処理する
//!
//! # フロー（AOI ごと）
//! 1. semaphore の permit を取得（run deadline までに取れなければ DeadlineExceeded）
//! 2. resolve → NoSceneFound ならそこで終了
//! 3. store の scene と同じなら Unchanged（render しない）
//! 4. generate → put → Generated
//!
//! どの AOI のエラーも（panic 含め）`Failed` に変換され、batch は必ず完走します。
//! resolve / generate は deadline で打ち切られますが、開始済みの put は完了させます。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{Instrument, instrument};

use super::generator::CompositeGenerator;
use super::resolver::{Resolution, SceneResolver};
use super::session::TokenManager;
use crate::domain::{
    Aoi, AoiOutcome, AoiResult, BatchReport, BatchSummary, CloudFilter, PipelineError,
    RenderRecipe, TimeWindow,
};
use crate::ports::{ArtifactStore, Clock, IdGenerator};

/// Parameters of one batch run.
#[derive(Debug, Clone)]
pub struct BatchParams {
    pub window: TimeWindow,
    pub cloud: CloudFilter,
    pub recipe: RenderRecipe,
    pub concurrency_limit: usize,

    /// Wall-clock budget for the whole run, measured from its start.
    pub deadline: Option<Duration>,

    /// Budget for a single AOI once it holds a permit.
    pub aoi_timeout: Option<Duration>,
}

impl BatchParams {
    pub fn new(window: TimeWindow) -> Self {
        Self {
            window,
            cloud: CloudFilter::default(),
            recipe: RenderRecipe::default(),
            concurrency_limit: 4,
            deadline: None,
            aoi_timeout: None,
        }
    }
}

#[derive(Clone)]
pub struct BatchOrchestrator {
    pub(crate) resolver: Arc<SceneResolver>,
    pub(crate) generator: Arc<CompositeGenerator>,
    pub(crate) store: Arc<dyn ArtifactStore>,
    pub(crate) session: Option<Arc<TokenManager>>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<dyn IdGenerator>,
}

impl BatchOrchestrator {
    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    pub fn resolver(&self) -> &SceneResolver {
        &self.resolver
    }

    /// Run the pipeline for every AOI.
    ///
    /// Only a failed credential preflight makes this return `Err`; every
    /// AOI-scoped failure ends up in the report.
    #[instrument(skip_all, fields(run_id = tracing::field::Empty, aois = aois.len()))]
    pub async fn run_batch(
        &self,
        aois: &[Aoi],
        params: &BatchParams,
    ) -> Result<BatchReport, PipelineError> {
        let run_id = self.ids.generate_run_id();
        tracing::Span::current().record("run_id", tracing::field::display(&run_id));
        let started_at = self.clock.now();
        let deadline_at = params.deadline.map(|d| Instant::now() + d);

        if let Some(session) = &self.session {
            session.token().await?;
        }

        tracing::info!(
            window_start = %params.window.start,
            window_end = %params.window.end,
            ceiling = ?params.cloud.ceiling,
            concurrency = params.concurrency_limit,
            "batch started"
        );

        let semaphore = Arc::new(Semaphore::new(params.concurrency_limit.max(1)));
        let shared = Arc::new(params.clone());
        let handles: Vec<_> = aois
            .iter()
            .map(|aoi| {
                let this = self.clone();
                let aoi = aoi.clone();
                let params = Arc::clone(&shared);
                let semaphore = Arc::clone(&semaphore);
                let span = tracing::info_span!("aoi", aoi_id = %aoi.id);
                tokio::spawn(
                    this.run_one(aoi, params, semaphore, deadline_at)
                        .instrument(span),
                )
            })
            .collect();

        let mut results = Vec::with_capacity(aois.len());
        for (aoi, handle) in aois.iter().zip(handles) {
            let outcome = match handle.await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(err)) => {
                    tracing::warn!(aoi_id = %aoi.id, kind = ?err.kind(), error = %err, "AOI failed");
                    AoiOutcome::failed(&err)
                }
                Err(join_err) => {
                    tracing::error!(aoi_id = %aoi.id, error = %join_err, "AOI task aborted");
                    AoiOutcome::failed(&PipelineError::Internal(format!(
                        "AOI task aborted: {join_err}"
                    )))
                }
            };
            results.push(AoiResult {
                aoi_id: aoi.id.clone(),
                name: aoi.name.clone(),
                outcome,
            });
        }

        let summary = BatchSummary::from_results(&results);
        tracing::info!(
            total = summary.total,
            generated = summary.generated,
            unchanged = summary.unchanged,
            no_scene_found = summary.no_scene_found,
            failed = summary.failed,
            "batch finished"
        );

        Ok(BatchReport {
            run_id,
            started_at,
            finished_at: self.clock.now(),
            window: params.window,
            cloud: params.cloud,
            summary,
            results,
        })
    }

    async fn run_one(
        self,
        aoi: Aoi,
        params: Arc<BatchParams>,
        semaphore: Arc<Semaphore>,
        deadline_at: Option<Instant>,
    ) -> Result<AoiOutcome, PipelineError> {
        let acquired = match deadline_at {
            Some(at) => tokio::time::timeout_at(at, semaphore.acquire_owned())
                .await
                .map_err(|_| {
                    PipelineError::DeadlineExceeded("not started before the run deadline".to_string())
                })?,
            None => semaphore.acquire_owned().await,
        };
        let _permit = acquired.map_err(|e| PipelineError::Internal(e.to_string()))?;

        self.process_aoi(&aoi, &params, deadline_at).await
    }

    async fn process_aoi(
        &self,
        aoi: &Aoi,
        params: &BatchParams,
        deadline_at: Option<Instant>,
    ) -> Result<AoiOutcome, PipelineError> {
        let cutoff = match (deadline_at, params.aoi_timeout) {
            (Some(at), Some(t)) => Some(at.min(Instant::now() + t)),
            (Some(at), None) => Some(at),
            (None, Some(t)) => Some(Instant::now() + t),
            (None, None) => None,
        };

        let resolution = cut(
            cutoff,
            "scene resolution",
            self.resolver.resolve(aoi, &params.window, &params.cloud),
        )
        .await?;

        let scene = match resolution {
            Resolution::Found(scene) => scene,
            Resolution::NoSceneFound { candidates_seen } => {
                return Ok(AoiOutcome::NoSceneFound { candidates_seen });
            }
        };

        if let Some(existing) = self.store.head(&aoi.id).await?
            && existing.is_for_scene(&scene)
        {
            tracing::info!(aoi_id = %aoi.id, scene_id = %scene.id, "artifact already current");
            return Ok(AoiOutcome::Unchanged { artifact: existing });
        }

        let artifact = cut(
            cutoff,
            "render",
            self.generator.generate(aoi, &scene, &params.recipe),
        )
        .await?;

        let stored = self.store.put(&aoi.id, artifact).await?;
        tracing::info!(aoi_id = %aoi.id, scene_id = %stored.scene_id, "artifact stored");
        Ok(AoiOutcome::Generated { artifact: stored })
    }
}

async fn cut<T>(
    cutoff: Option<Instant>,
    phase: &str,
    fut: impl Future<Output = Result<T, PipelineError>>,
) -> Result<T, PipelineError> {
    match cutoff {
        Some(at) => tokio::time::timeout_at(at, fut).await.map_err(|_| {
            PipelineError::DeadlineExceeded(format!("{phase} cut off at the deadline"))
        })?,
        None => fut.await,
    }
}
