//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」です。各 trait は外部システム
//! （catalog API, render API, identity provider, storage）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//! 実装は `impls` にあります。

pub mod aoi_source;
pub mod artifact_store;
pub mod catalog;
pub mod clock;
pub mod id_generator;
pub mod render;
pub mod token_source;

pub use self::aoi_source::{AoiSource, AoiSourceError};
pub use self::artifact_store::ArtifactStore;
pub use self::catalog::CatalogClient;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::render::RenderClient;
pub use self::token_source::TokenSource;
