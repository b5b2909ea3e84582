//! SceneResolver - AOI ごとに最新の scene を 1 件選ぶ
//!
//! # 選択ルール
//! 1. window 外の候補を捨てる（catalog の絞り込みを信用しない）
//! 2. cloud filter を適用
//! 3. acquired_at が最大のもの。同時刻なら scene id が辞書順で最小のもの

use std::cmp::Reverse;
use std::sync::Arc;

use tracing::instrument;

use crate::domain::{Aoi, CloudFilter, PipelineError, ResolvedScene, SceneCandidate, TimeWindow};
use crate::ports::CatalogClient;
use crate::retry::RetryPolicy;

/// Result of a successful resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Found(ResolvedScene),

    /// Normal outcome, not an error.
    NoSceneFound { candidates_seen: usize },
}

pub struct SceneResolver {
    catalog: Arc<dyn CatalogClient>,
    retry: RetryPolicy,
}

impl SceneResolver {
    pub fn new(catalog: Arc<dyn CatalogClient>, retry: RetryPolicy) -> Self {
        Self { catalog, retry }
    }

    #[instrument(skip_all, fields(aoi_id = %aoi.id))]
    pub async fn resolve(
        &self,
        aoi: &Aoi,
        window: &TimeWindow,
        cloud: &CloudFilter,
    ) -> Result<Resolution, PipelineError> {
        let outcome = self
            .retry
            .run(|attempt| {
                tracing::debug!(attempt, "searching catalog");
                self.catalog.search(&aoi.polygon, window.start, window.end)
            })
            .await;

        let candidates = outcome
            .result
            .map_err(|err| PipelineError::from_catalog(err, outcome.attempts))?;

        let candidates_seen = candidates.len();
        match select_latest(candidates, window, cloud) {
            Some(scene) => {
                tracing::info!(
                    scene_id = %scene.id,
                    acquired_at = %scene.acquired_at,
                    cloud_cover = ?scene.cloud_cover,
                    "scene resolved"
                );
                Ok(Resolution::Found(scene))
            }
            None => {
                tracing::info!(candidates_seen, "no qualifying scene");
                Ok(Resolution::NoSceneFound { candidates_seen })
            }
        }
    }
}

/// Pure selection over catalog candidates; order of the input does not matter.
pub fn select_latest(
    candidates: Vec<SceneCandidate>,
    window: &TimeWindow,
    cloud: &CloudFilter,
) -> Option<ResolvedScene> {
    candidates
        .into_iter()
        .filter(|c| window.contains(c.acquired_at))
        .filter(|c| cloud.admits(c.cloud_cover))
        .max_by(|a, b| {
            (a.acquired_at, Reverse(&a.id)).cmp(&(b.acquired_at, Reverse(&b.id)))
        })
        .map(ResolvedScene::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CatalogError, ErrorKind, SceneId};
    use crate::testing::{FakeCatalog, aoi, candidate, t0};
    use chrono::Duration;
    use rstest::rstest;

    fn window() -> TimeWindow {
        TimeWindow::lookback(t0(), Duration::days(30))
    }

    fn resolver(catalog: Arc<FakeCatalog>) -> SceneResolver {
        SceneResolver::new(catalog, RetryPolicy::immediate(3))
    }

    #[rstest]
    #[case::newer_first(vec![candidate("new", 1, Some(5.0)), candidate("old", 48, Some(5.0))])]
    #[case::older_first(vec![candidate("old", 48, Some(5.0)), candidate("new", 1, Some(5.0))])]
    fn most_recent_wins_regardless_of_order(#[case] candidates: Vec<SceneCandidate>) {
        let scene = select_latest(candidates, &window(), &CloudFilter::unrestricted()).unwrap();
        assert_eq!(scene.id, SceneId::new("new"));
    }

    #[test]
    fn equal_timestamps_break_ties_on_smallest_id() {
        let candidates = vec![
            candidate("S2B_b", 5, None),
            candidate("S2A_a", 5, None),
            candidate("S2C_c", 5, None),
        ];
        let scene = select_latest(candidates, &window(), &CloudFilter::unrestricted()).unwrap();
        assert_eq!(scene.id, SceneId::new("S2A_a"));
    }

    #[test]
    fn candidates_outside_window_are_dropped() {
        let candidates = vec![
            candidate("future", -2, Some(0.0)),
            candidate("ancient", 24 * 40, Some(0.0)),
        ];
        assert!(select_latest(candidates, &window(), &CloudFilter::unrestricted()).is_none());
    }

    #[rstest]
    #[case::unknown_allowed(true, Some("unknown"))]
    #[case::unknown_rejected(false, Some("clear"))]
    fn unknown_cloud_cover_follows_filter(#[case] allow_unknown: bool, #[case] expected: Option<&str>) {
        let candidates = vec![candidate("unknown", 1, None), candidate("clear", 10, Some(3.0))];
        let cloud = CloudFilter {
            ceiling: Some(30.0),
            allow_unknown,
        };
        let scene = select_latest(candidates, &window(), &cloud);
        assert_eq!(scene.map(|s| s.id), expected.map(SceneId::new));
    }

    #[tokio::test]
    async fn no_candidates_is_not_an_error() {
        let catalog = Arc::new(FakeCatalog::new());
        let a = aoi("a", 0);
        catalog.returns(&a, vec![]);

        let res = resolver(catalog).resolve(&a, &window(), &CloudFilter::unrestricted()).await;

        assert_eq!(res.unwrap(), Resolution::NoSceneFound { candidates_seen: 0 });
    }

    #[tokio::test]
    async fn all_filtered_reports_candidates_seen() {
        let catalog = Arc::new(FakeCatalog::new());
        let a = aoi("a", 0);
        catalog.returns(&a, vec![candidate("cloudy", 1, Some(80.0))]);

        let res = resolver(catalog)
            .resolve(&a, &window(), &CloudFilter::ceiling(30.0))
            .await;

        assert_eq!(res.unwrap(), Resolution::NoSceneFound { candidates_seen: 1 });
    }

    #[tokio::test]
    async fn transient_catalog_failures_are_retried() {
        let catalog = Arc::new(FakeCatalog::new());
        let a = aoi("a", 0);
        catalog
            .fails(&a, CatalogError::Transport("reset".into()))
            .fails(&a, CatalogError::Status { status: 503, body: String::new() })
            .returns(&a, vec![candidate("s1", 1, Some(1.0))]);

        let res = resolver(catalog.clone())
            .resolve(&a, &window(), &CloudFilter::unrestricted())
            .await
            .unwrap();

        assert!(matches!(res, Resolution::Found(s) if s.id == SceneId::new("s1")));
        assert_eq!(catalog.calls_for(&a), 3);
    }

    #[tokio::test]
    async fn logical_rejection_is_not_retried() {
        let catalog = Arc::new(FakeCatalog::new());
        let a = aoi("a", 0);
        catalog.fails(&a, CatalogError::Status { status: 400, body: "bad bbox".into() });

        let err = resolver(catalog.clone())
            .resolve(&a, &window(), &CloudFilter::unrestricted())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Catalog);
        assert_eq!(catalog.calls_for(&a), 1);
    }

    #[tokio::test]
    async fn exhausted_budget_surfaces_catalog_error() {
        let catalog = Arc::new(FakeCatalog::new());
        let a = aoi("a", 0);
        catalog.fails(&a, CatalogError::Transport("down".into()));

        let err = resolver(catalog.clone())
            .resolve(&a, &window(), &CloudFilter::unrestricted())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Catalog { attempts: 3, .. }));
        assert_eq!(catalog.calls_for(&a), 3);
    }

    #[tokio::test]
    async fn persistent_unauthorized_surfaces_auth() {
        let catalog = Arc::new(FakeCatalog::new());
        let a = aoi("a", 0);
        catalog.fails(&a, CatalogError::Unauthorized);

        let err = resolver(catalog)
            .resolve(&a, &window(), &CloudFilter::unrestricted())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Auth);
    }
}
