//! TokenSource port - credential の取得（refresh 1 回分）

use async_trait::async_trait;

use crate::domain::{AuthError, Credential};

/// Performs one credential acquisition against the identity provider.
///
/// Caching and single-flight live in `app::session::TokenManager`; a source
/// is called at most once per refresh.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch(&self) -> Result<Credential, AuthError>;
}
