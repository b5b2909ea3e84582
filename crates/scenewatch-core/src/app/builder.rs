//! PipelineBuilder - orchestrator の構築とワイヤリング
//!
//! # Fail-fast 設計
//! - catalog / render / store は必須。欠けていれば build() が BuildError を返す
//! - clock / ids は省略時に SystemClock / ULID を使う
//! - retry policy は build() 時に検証する

use std::sync::Arc;
use std::time::Duration;

use super::generator::CompositeGenerator;
use super::orchestrator::BatchOrchestrator;
use super::resolver::SceneResolver;
use super::session::TokenManager;
use crate::ports::{
    ArtifactStore, CatalogClient, Clock, IdGenerator, RenderClient, SystemClock, UlidGenerator,
};
use crate::retry::RetryPolicy;

/// Builds a [`BatchOrchestrator`] from its ports.
///
/// ```ignore
/// let orchestrator = PipelineBuilder::new()
///     .catalog(catalog)
///     .render(render)
///     .store(store)
///     .session(session)
///     .build()?;
/// ```
pub struct PipelineBuilder {
    catalog: Option<Arc<dyn CatalogClient>>,
    render: Option<Arc<dyn RenderClient>>,
    store: Option<Arc<dyn ArtifactStore>>,
    session: Option<Arc<TokenManager>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    catalog_retry: RetryPolicy,
    render_retry: RetryPolicy,
    render_timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing pipeline components: {0:?}")]
    MissingComponents(Vec<&'static str>),

    #[error("invalid retry policy: {0}")]
    InvalidRetryPolicy(String),
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            catalog: None,
            render: None,
            store: None,
            session: None,
            clock: None,
            ids: None,
            catalog_retry: RetryPolicy::standard(),
            render_retry: RetryPolicy::standard(),
            render_timeout: CompositeGenerator::DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn catalog(mut self, catalog: Arc<dyn CatalogClient>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn render(mut self, render: Arc<dyn RenderClient>) -> Self {
        self.render = Some(render);
        self
    }

    pub fn store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Credential preflight before each batch. Without a session the
    /// orchestrator assumes the clients need no credential.
    pub fn session(mut self, session: Arc<TokenManager>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Same policy for catalog and render calls.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.catalog_retry = policy.clone();
        self.render_retry = policy;
        self
    }

    pub fn catalog_retry(mut self, policy: RetryPolicy) -> Self {
        self.catalog_retry = policy;
        self
    }

    pub fn render_retry(mut self, policy: RetryPolicy) -> Self {
        self.render_retry = policy;
        self
    }

    pub fn render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<BatchOrchestrator, BuildError> {
        let mut missing = Vec::new();
        if self.catalog.is_none() {
            missing.push("catalog");
        }
        if self.render.is_none() {
            missing.push("render");
        }
        if self.store.is_none() {
            missing.push("store");
        }
        let (Some(catalog), Some(render), Some(store)) = (self.catalog, self.render, self.store)
        else {
            return Err(BuildError::MissingComponents(missing));
        };

        for (name, policy) in [("catalog", &self.catalog_retry), ("render", &self.render_retry)] {
            if policy.max_attempts == 0 {
                return Err(BuildError::InvalidRetryPolicy(format!(
                    "{name} retry needs at least one attempt"
                )));
            }
            if !(0.0..=1.0).contains(&policy.jitter) || policy.multiplier < 1.0 {
                return Err(BuildError::InvalidRetryPolicy(format!(
                    "{name} retry: jitter must be in [0, 1] and multiplier >= 1"
                )));
            }
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(SystemClock)));

        let resolver = SceneResolver::new(catalog, self.catalog_retry);
        let generator =
            CompositeGenerator::new(render, self.render_retry, clock.clone(), ids.clone())
                .with_attempt_timeout(self.render_timeout);

        Ok(BatchOrchestrator {
            resolver: Arc::new(resolver),
            generator: Arc::new(generator),
            store,
            session: self.session,
            clock,
            ids,
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
