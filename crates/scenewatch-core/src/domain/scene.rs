//! Scene model: catalog candidates, the search window and the cloud filter.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider-assigned scene identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneId(String);

impl SceneId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One search hit from the catalog. Ephemeral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneCandidate {
    pub id: SceneId,
    pub acquired_at: DateTime<Utc>,

    /// Percentage in `0..=100`, when the provider reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_cover: Option<f64>,
}

impl SceneCandidate {
    pub fn new(id: impl Into<String>, acquired_at: DateTime<Utc>, cloud_cover: Option<f64>) -> Self {
        Self {
            id: SceneId::new(id),
            acquired_at,
            cloud_cover,
        }
    }
}

/// The scene chosen for one AOI in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedScene {
    pub id: SceneId,
    pub acquired_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_cover: Option<f64>,
}

impl From<SceneCandidate> for ResolvedScene {
    fn from(c: SceneCandidate) -> Self {
        Self {
            id: c.id,
            acquired_at: c.acquired_at,
            cloud_cover: c.cloud_cover,
        }
    }
}

/// Closed acquisition-time interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// `now - lookback ..= now`, truncated to whole seconds. A lookback
    /// reaching past the representable range starts at the earliest instant.
    pub fn lookback(now: DateTime<Utc>, lookback: Duration) -> Self {
        let end = DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now);
        Self {
            start: end.checked_sub_signed(lookback).unwrap_or(DateTime::<Utc>::MIN_UTC),
            end,
        }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }
}

/// Cloud-cover admission rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CloudFilter {
    /// Maximum accepted cloud cover in percent; `None` accepts everything.
    pub ceiling: Option<f64>,

    /// Whether a candidate without reported cloud cover passes a ceiling.
    pub allow_unknown: bool,
}

impl CloudFilter {
    pub fn unrestricted() -> Self {
        Self {
            ceiling: None,
            allow_unknown: true,
        }
    }

    pub fn ceiling(max: f64) -> Self {
        Self {
            ceiling: Some(max),
            allow_unknown: true,
        }
    }

    pub fn admits(&self, cloud_cover: Option<f64>) -> bool {
        match (self.ceiling, cloud_cover) {
            (None, _) => true,
            (Some(_), None) => self.allow_unknown,
            (Some(max), Some(cc)) => cc <= max,
        }
    }
}

impl Default for CloudFilter {
    fn default() -> Self {
        Self::unrestricted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    #[case::no_ceiling(CloudFilter::unrestricted(), Some(99.0), true)]
    #[case::under(CloudFilter::ceiling(30.0), Some(10.0), true)]
    #[case::equal(CloudFilter::ceiling(30.0), Some(30.0), true)]
    #[case::over(CloudFilter::ceiling(30.0), Some(50.0), false)]
    #[case::unknown_allowed(CloudFilter::ceiling(30.0), None, true)]
    #[case::unknown_rejected(CloudFilter { ceiling: Some(30.0), allow_unknown: false }, None, false)]
    fn cloud_filter_admission(
        #[case] filter: CloudFilter,
        #[case] cloud_cover: Option<f64>,
        #[case] expected: bool,
    ) {
        assert_eq!(filter.admits(cloud_cover), expected);
    }

    #[test]
    fn lookback_window_is_inclusive_and_truncated() {
        let now = Utc.with_ymd_and_hms(2026, 1, 23, 10, 15, 0).unwrap()
            + Duration::milliseconds(750);
        let w = TimeWindow::lookback(now, Duration::days(2));

        assert_eq!(w.end, Utc.with_ymd_and_hms(2026, 1, 23, 10, 15, 0).unwrap());
        assert_eq!(w.start, Utc.with_ymd_and_hms(2026, 1, 21, 10, 15, 0).unwrap());
        assert!(w.contains(w.start));
        assert!(w.contains(w.end));
        assert!(!w.contains(w.end + Duration::seconds(1)));
    }

    #[test]
    fn oversized_lookback_starts_at_the_earliest_instant() {
        let now = Utc.with_ymd_and_hms(2026, 1, 23, 10, 15, 0).unwrap();
        let w = TimeWindow::lookback(now, Duration::days(i64::from(u32::MAX)));

        assert_eq!(w.start, DateTime::<Utc>::MIN_UTC);
        assert_eq!(w.end, now);
    }
}
