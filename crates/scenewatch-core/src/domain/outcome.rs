//! Outcome model: per-AOI results and the run-level summary.
//!
//! This module is transport-agnostic. It only defines the "shape" of results
//! so the CLI, a scheduler or a mailer can explain a run afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::artifact::ArtifactMeta;
use super::errors::{ErrorKind, PipelineError};
use super::ids::{AoiId, RunId};
use super::scene::{CloudFilter, TimeWindow};

/// Classification of one AOI's result, serialized as
/// GENERATED / UNCHANGED / NO_SCENE_FOUND / FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Generated,
    Unchanged,
    NoSceneFound,
    Failed,
}

/// What happened to one AOI in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AoiOutcome {
    /// A new artifact was rendered and stored.
    Generated { artifact: ArtifactMeta },

    /// The stored artifact already matches the latest scene.
    Unchanged { artifact: ArtifactMeta },

    /// No candidate survived the window / cloud filter.
    NoSceneFound {
        /// Candidates the catalog returned before filtering.
        candidates_seen: usize,
    },

    Failed { kind: ErrorKind, reason: String },
}

impl AoiOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            AoiOutcome::Generated { .. } => OutcomeKind::Generated,
            AoiOutcome::Unchanged { .. } => OutcomeKind::Unchanged,
            AoiOutcome::NoSceneFound { .. } => OutcomeKind::NoSceneFound,
            AoiOutcome::Failed { .. } => OutcomeKind::Failed,
        }
    }

    pub fn failed(err: &PipelineError) -> Self {
        AoiOutcome::Failed {
            kind: err.kind(),
            reason: err.to_string(),
        }
    }

    pub fn artifact(&self) -> Option<&ArtifactMeta> {
        match self {
            AoiOutcome::Generated { artifact } | AoiOutcome::Unchanged { artifact } => Some(artifact),
            _ => None,
        }
    }
}

/// One AOI's entry in a batch report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AoiResult {
    pub aoi_id: AoiId,
    pub name: String,
    #[serde(flatten)]
    pub outcome: AoiOutcome,
}

/// Counts per outcome kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub generated: usize,
    pub unchanged: usize,
    pub no_scene_found: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a AoiResult>) -> Self {
        let mut summary = Self::default();
        for r in results {
            summary.total += 1;
            match r.outcome.kind() {
                OutcomeKind::Generated => summary.generated += 1,
                OutcomeKind::Unchanged => summary.unchanged += 1,
                OutcomeKind::NoSceneFound => summary.no_scene_found += 1,
                OutcomeKind::Failed => summary.failed += 1,
            }
        }
        summary
    }

    /// AOIs that have an image after this run.
    pub fn with_imagery(&self) -> usize {
        self.generated + self.unchanged
    }
}

/// Complete, self-describing result of one `run_batch` call.
///
/// `results` is keyed by AOI id; its order follows the input AOI list but
/// carries no meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub window: TimeWindow,
    pub cloud: CloudFilter,
    pub summary: BatchSummary,
    pub results: Vec<AoiResult>,
}

impl BatchReport {
    pub fn result_for(&self, aoi_id: &AoiId) -> Option<&AoiResult> {
        self.results.iter().find(|r| &r.aoi_id == aoi_id)
    }
}
