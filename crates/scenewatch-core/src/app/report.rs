//! Plain-text rendering of a [`BatchReport`], suitable for a mail body or a
//! terminal.

use std::fmt::Write;

use crate::domain::{AoiOutcome, BatchReport};

/// Hits sorted by acquisition time (newest first), then AOIs without a
/// scene, then failures with their reasons.
///
/// `image_base` is prefixed to each artifact location when given (an
/// output directory or a public URL).
pub fn render_text(report: &BatchReport, image_base: Option<&str>) -> String {
    let mut out = String::new();
    let days = (report.window.end - report.window.start).num_days();
    let ceiling = match report.cloud.ceiling {
        Some(max) => format!("cloud cover <= {max}%"),
        None => "any cloud cover".to_string(),
    };
    // write! to a String cannot fail
    let _ = writeln!(
        out,
        "Sentinel-2 latest imagery report (last {days} days, {ceiling})"
    );
    let _ = writeln!(out, "Run: {} ({})", report.run_id, report.started_at.to_rfc3339());
    let s = &report.summary;
    let _ = writeln!(
        out,
        "Available imagery: {} of {} (generated {}, unchanged {}, no scene {}, failed {})",
        s.with_imagery(),
        s.total,
        s.generated,
        s.unchanged,
        s.no_scene_found,
        s.failed
    );
    out.push('\n');

    let mut hits: Vec<_> = report
        .results
        .iter()
        .filter_map(|r| r.outcome.artifact().map(|a| (r, a)))
        .collect();
    hits.sort_by(|(_, a), (_, b)| b.acquired_at.cmp(&a.acquired_at));

    if hits.is_empty() {
        out.push_str("No scene was found within the date range.\n\n");
    } else {
        out.push_str("Latest acquisitions:\n");
        for (result, artifact) in hits {
            let _ = writeln!(out, "- {} ({})", result.name, result.aoi_id);
            let _ = writeln!(out, "  acquired: {}", artifact.acquired_at.to_rfc3339());
            match artifact.cloud_cover {
                Some(cc) => {
                    let _ = writeln!(out, "  cloud cover: {cc:.1}%");
                }
                None => out.push_str("  cloud cover: unknown\n"),
            }
            let _ = writeln!(out, "  scene: {}", artifact.scene_id);
            if let Some(location) = &artifact.location {
                let path = match image_base {
                    Some(base) => format!("{}/{}", base.trim_end_matches('/'), location),
                    None => location.clone(),
                };
                let _ = writeln!(out, "  {}: {}", artifact.recipe, path);
            }
            if matches!(result.outcome, AoiOutcome::Unchanged { .. }) {
                out.push_str("  (unchanged since last run)\n");
            }
            out.push('\n');
        }
    }

    let empty: Vec<_> = report
        .results
        .iter()
        .filter_map(|r| match r.outcome {
            AoiOutcome::NoSceneFound { candidates_seen } => Some((r, candidates_seen)),
            _ => None,
        })
        .collect();
    if !empty.is_empty() {
        out.push_str("No qualifying scene:\n");
        for (result, seen) in empty {
            let _ = write!(out, "- {} ({})", result.name, result.aoi_id);
            if seen > 0 {
                let _ = write!(out, ": {seen} candidate(s) filtered out");
            }
            out.push('\n');
        }
        out.push('\n');
    }

    let failures: Vec<_> = report
        .results
        .iter()
        .filter_map(|r| match &r.outcome {
            AoiOutcome::Failed { kind, reason } => Some((r, kind, reason)),
            _ => None,
        })
        .collect();
    if !failures.is_empty() {
        out.push_str("---\nFailures:\n");
        for (result, kind, reason) in failures {
            let _ = writeln!(out, "- {} ({}) | {:?} | {}", result.name, result.aoi_id, kind, reason);
        }
    }

    out
}
