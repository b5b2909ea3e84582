//! TokenManager - 共有 credential と single-flight refresh
//!
//! # フロー
//! 1. cache が margin 以上有効ならそれを返す
//! 2. そうでなければ refresh。進行中の refresh があればその結果を共有する
//! 3. 失敗した場合は何も cache しない

use std::sync::Arc;

use chrono::Duration;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::Mutex;

use crate::domain::{AuthError, Credential};
use crate::ports::{Clock, TokenSource};

type SharedRefresh = Shared<BoxFuture<'static, Result<Credential, AuthError>>>;

#[derive(Default)]
struct SessionState {
    current: Option<Credential>,
    inflight: Option<(u64, SharedRefresh)>,
    next_flight: u64,
}

/// Owns the process-wide bearer credential.
///
/// Both remote clients hold an `Arc<TokenManager>`; there is no ambient
/// global token cache.
pub struct TokenManager {
    source: Arc<dyn TokenSource>,
    clock: Arc<dyn Clock>,
    margin: Duration,
    state: Mutex<SessionState>,
}

impl TokenManager {
    /// Default safety margin before expiry.
    pub const DEFAULT_MARGIN_SECS: i64 = 60;

    pub fn new(source: Arc<dyn TokenSource>, clock: Arc<dyn Clock>) -> Self {
        Self::with_margin(source, clock, Duration::seconds(Self::DEFAULT_MARGIN_SECS))
    }

    pub fn with_margin(source: Arc<dyn TokenSource>, clock: Arc<dyn Clock>, margin: Duration) -> Self {
        Self {
            source,
            clock,
            margin,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// A credential valid for at least the safety margin.
    pub async fn token(&self) -> Result<Credential, AuthError> {
        let (flight, refresh) = {
            let mut state = self.state.lock().await;
            if let Some(cred) = &state.current
                && cred.is_valid_for(self.clock.now(), self.margin)
            {
                return Ok(cred.clone());
            }

            match &state.inflight {
                Some((flight, refresh)) => (*flight, refresh.clone()),
                None => {
                    let flight = state.next_flight;
                    state.next_flight += 1;
                    let source = Arc::clone(&self.source);
                    let refresh = async move { source.fetch().await }.boxed().shared();
                    state.inflight = Some((flight, refresh.clone()));
                    tracing::debug!(flight, "refreshing credential");
                    (flight, refresh)
                }
            }
        };

        let result = refresh.await;

        let mut state = self.state.lock().await;
        // 最初に戻ってきた waiter だけが結果を反映する
        if matches!(&state.inflight, Some((f, _)) if *f == flight) {
            state.inflight = None;
            match &result {
                Ok(cred) => {
                    tracing::info!(expires_at = %cred.expires_at(), "credential refreshed");
                    state.current = Some(cred.clone());
                }
                Err(err) => tracing::warn!(error = %err, "credential refresh failed"),
            }
        }
        result
    }

    /// Drop the cached credential if it is still `stale` (after a 401).
    pub async fn invalidate(&self, stale: &Credential) {
        let mut state = self.state.lock().await;
        if state.current.as_ref() == Some(stale) {
            tracing::debug!("invalidating rejected credential");
            state.current = None;
        }
    }
}
