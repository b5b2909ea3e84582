//! Errors and their classification.
//!
//! 境界ごとにエラー型を分けています。
//! - **AuthError**: token の取得・更新失敗
//! - **CatalogError**: catalog 検索の失敗（transport / 論理エラーを区別）
//! - **RenderError**: render の失敗（再試行可能 / unrenderable を区別）
//! - **StoreError**: artifact 永続化の失敗
//!
//! `PipelineError` は AOI 単位のパイプラインが返すエラーで、`ErrorKind` に分類されて
//! `Failed` outcome に記録されます。

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::scene::SceneId;
use crate::retry::Retryable;

/// Operational classification of a pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Auth,
    Catalog,
    UnrenderableScene,
    RenderTransport,
    Store,
    DeadlineExceeded,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("client credentials are not configured")]
    MissingCredentials,

    #[error("token request failed: {0}")]
    Request(String),

    #[error("token endpoint rejected credentials: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed token response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog transport error: {0}")]
    Transport(String),

    #[error("catalog returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed catalog response: {0}")]
    Malformed(String),

    #[error("catalog rejected bearer token")]
    Unauthorized,

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl Retryable for CatalogError {
    fn is_retryable(&self) -> bool {
        match self {
            CatalogError::Transport(_) | CatalogError::Malformed(_) => true,
            CatalogError::Status { status, .. } => is_transient_status(*status),
            CatalogError::Unauthorized | CatalogError::Auth(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("render timed out after {0:?}")]
    Timeout(Duration),

    #[error("render transport error: {0}")]
    Transport(String),

    #[error("render returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("scene cannot be rendered: {reason}")]
    Unrenderable { status: Option<u16>, reason: String },

    #[error("render service rejected bearer token")]
    Unauthorized,

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl Retryable for RenderError {
    fn is_retryable(&self) -> bool {
        match self {
            RenderError::Timeout(_) | RenderError::Transport(_) => true,
            RenderError::Status { status, .. } => is_transient_status(*status),
            RenderError::Unrenderable { .. } | RenderError::Unauthorized | RenderError::Auth(_) => {
                false
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("artifact store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt artifact metadata for {aoi_id}: {message}")]
    Corrupt { aoi_id: String, message: String },

    #[error("artifact belongs to {actual}, refusing to store it under {expected}")]
    KeyMismatch { expected: String, actual: String },
}

/// 5xx, 408 and 429 are worth another attempt; other statuses are final.
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 429) || (500..=599).contains(&status)
}

/// Failure of one AOI pipeline (or, for `Auth`, of the batch preflight).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("catalog search failed after {attempts} attempt(s): {source}")]
    Catalog {
        attempts: u32,
        #[source]
        source: CatalogError,
    },

    #[error("scene {scene_id} is unrenderable: {reason}")]
    UnrenderableScene { scene_id: SceneId, reason: String },

    #[error("render failed after {attempts} attempt(s): {source}")]
    RenderTransport {
        attempts: u32,
        #[source]
        source: RenderError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Auth(_) => ErrorKind::Auth,
            PipelineError::Catalog { .. } => ErrorKind::Catalog,
            PipelineError::UnrenderableScene { .. } => ErrorKind::UnrenderableScene,
            PipelineError::RenderTransport { .. } => ErrorKind::RenderTransport,
            PipelineError::Store(_) => ErrorKind::Store,
            PipelineError::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            PipelineError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn from_catalog(err: CatalogError, attempts: u32) -> Self {
        match err {
            CatalogError::Auth(auth) => PipelineError::Auth(auth),
            CatalogError::Unauthorized => PipelineError::Auth(AuthError::Rejected {
                status: 401,
                body: "catalog rejected refreshed token".to_string(),
            }),
            source => PipelineError::Catalog { attempts, source },
        }
    }

    pub fn from_render(err: RenderError, scene_id: &SceneId, attempts: u32) -> Self {
        match err {
            RenderError::Auth(auth) => PipelineError::Auth(auth),
            RenderError::Unauthorized => PipelineError::Auth(AuthError::Rejected {
                status: 401,
                body: "render service rejected refreshed token".to_string(),
            }),
            RenderError::Unrenderable { reason, .. } => PipelineError::UnrenderableScene {
                scene_id: scene_id.clone(),
                reason,
            },
            source => PipelineError::RenderTransport { attempts, source },
        }
    }
}
