//! Strongly-typed identifiers.
//!
//! # ULID ベースの ID
//! バッチ実行（run）と生成物（artifact）には ULID を使います。
//! - **時刻でソート可能**: 先頭が timestamp なので生成順に並ぶ
//! - **分散生成可能**: 調整なしで生成できる
//!
//! `Id<T>` は Phantom type で、`RunId` と `ArtifactId` を混同できないようにします。
//! AOI の ID は設定ファイル由来の文字列なので `AoiId`（newtype）で表します。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait carrying the display prefix of an id family.
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic ULID-backed identifier.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// マーカー型
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Run {}

impl IdMarker for Run {
    fn prefix() -> &'static str {
        "run-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactMarker {}

impl IdMarker for ArtifactMarker {
    fn prefix() -> &'static str {
        "artifact-"
    }
}

/// Identifier of one batch run.
pub type RunId = Id<Run>;

/// Identifier of one generated artifact.
pub type ArtifactId = Id<ArtifactMarker>;

/// Stable, configuration-assigned AOI identifier.
///
/// Used as the store key and as a path segment by the filesystem store, so
/// it is restricted to `[A-Za-z0-9_.-]` and may not be `.` or `..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AoiId(String);

impl AoiId {
    pub fn parse(raw: impl Into<String>) -> Result<Self, InvalidAoiId> {
        let raw = raw.into();
        let valid_chars = raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if raw.is_empty() || raw == "." || raw == ".." || !valid_chars {
            return Err(InvalidAoiId(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AoiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for AoiId {
    type Error = InvalidAoiId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<AoiId> for String {
    fn from(id: AoiId) -> Self {
        id.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid AOI id {0:?}: expected non-empty [A-Za-z0-9_.-]")]
pub struct InvalidAoiId(pub String);

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn ids_have_distinct_prefixes() {
        let run = RunId::from_ulid(Ulid::new());
        let artifact = ArtifactId::from_ulid(Ulid::new());

        assert!(run.to_string().starts_with("run-"));
        assert!(artifact.to_string().starts_with("artifact-"));
        // let _: RunId = artifact; // <- does not compile
    }

    #[test]
    fn run_id_serializes_as_bare_ulid() {
        let ulid = Ulid::new();
        let run = RunId::from_ulid(ulid);
        let s = serde_json::to_string(&run).unwrap();
        assert_eq!(s, format!("\"{ulid}\""));
        let back: RunId = serde_json::from_str(&s).unwrap();
        assert_eq!(back, run);
    }

    #[rstest]
    #[case::plain("etna")]
    #[case::dashed("piton-de-la-fournaise")]
    #[case::dotted("aoi_01.v2")]
    fn aoi_id_accepts_path_safe_names(#[case] raw: &str) {
        assert_eq!(AoiId::parse(raw).unwrap().as_str(), raw);
    }

    #[rstest]
    #[case::empty("")]
    #[case::parent("..")]
    #[case::slash("a/b")]
    #[case::space("mount etna")]
    fn aoi_id_rejects_unsafe_names(#[case] raw: &str) {
        assert!(AoiId::parse(raw).is_err());
    }

    #[test]
    fn aoi_id_deserialization_validates() {
        let err = serde_json::from_str::<AoiId>("\"../etc\"");
        assert!(err.is_err());
        let ok: AoiId = serde_json::from_str("\"etna\"").unwrap();
        assert_eq!(ok.as_str(), "etna");
    }
}
