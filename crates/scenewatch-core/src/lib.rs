//! scenewatch-core
//!
//! Latest-scene discovery and composite generation for a fixed set of
//! areas of interest.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（aoi, scene, recipe, artifact, outcome, credential, ids, errors）
//! - **ports**: 抽象化レイヤー（CatalogClient, RenderClient, TokenSource, ArtifactStore, AoiSource, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（session, resolver, generator, orchestrator, builder, report）
//! - **impls**: 実装（HTTP クライアント, ファイル / メモリ store, AOI ファイル）
//! - **retry**: 再利用可能な retry policy
//! - **config**: 設定ファイルと環境変数

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;
