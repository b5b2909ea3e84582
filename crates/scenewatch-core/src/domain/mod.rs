//! Domain model (AOIs, scenes, recipes, artifacts, outcomes, errors).
//!
//! Everything here is plain data plus pure rules; nothing performs I/O.

pub mod aoi;
pub mod artifact;
pub mod credential;
pub mod errors;
pub mod ids;
pub mod outcome;
pub mod recipe;
pub mod scene;

pub use aoi::{Aoi, AoiError, AoiRecord, BoundingBox, LinearRing, Polygon};
pub use artifact::{Artifact, ArtifactMeta, RenderedImage};
pub use credential::Credential;
pub use errors::{
    AuthError, CatalogError, ErrorKind, PipelineError, RenderError, StoreError,
    is_transient_status,
};
pub use ids::{AoiId, ArtifactId, RunId};
pub use outcome::{AoiOutcome, AoiResult, BatchReport, BatchSummary, OutcomeKind};
pub use recipe::{ImageFormat, RenderRecipe, Stretch};
pub use scene::{CloudFilter, ResolvedScene, SceneCandidate, SceneId, TimeWindow};
