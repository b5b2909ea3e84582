//! App - アプリケーション層
//!
//! ports を組み合わせてパイプラインを実装します。
//!
//! # 主要コンポーネント
//! - **TokenManager**: 共有 credential と single-flight refresh
//! - **SceneResolver**: AOI ごとに最新の scene を選ぶ
//! - **CompositeGenerator**: scene を render して artifact にする
//! - **BatchOrchestrator**: 全 AOI を bounded concurrency で処理
//! - **PipelineBuilder**: orchestrator の構築とワイヤリング
//! - **report**: 実行結果のテキスト整形

pub mod builder;
pub mod generator;
pub mod orchestrator;
pub mod report;
pub mod resolver;
pub mod session;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, PipelineBuilder};
pub use self::generator::CompositeGenerator;
pub use self::orchestrator::{BatchOrchestrator, BatchParams};
pub use self::report::render_text;
pub use self::resolver::{Resolution, SceneResolver};
pub use self::session::TokenManager;
