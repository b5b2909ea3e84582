//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **http**: Sentinel Hub の token / catalog / process API クライアント（reqwest）
//! - **FsArtifactStore**: 本番用のファイルシステム store
//! - **InMemoryArtifactStore**: テスト・組み込み用の store
//! - **JsonFileAoiSource**: AOI 定義ファイルの読み込み

pub mod aoi_file;
pub mod fs_store;
pub mod http;
pub mod memory_store;

// 主要な型を再エクスポート
pub use self::aoi_file::JsonFileAoiSource;
pub use self::fs_store::FsArtifactStore;
pub use self::http::{HttpCatalogClient, HttpRenderClient, OAuthTokenSource};
pub use self::memory_store::InMemoryArtifactStore;
