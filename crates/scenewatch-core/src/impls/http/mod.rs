//! reqwest-based clients for the Sentinel Hub token, catalog and process APIs.

mod catalog;
mod render;
mod token;

pub use self::catalog::HttpCatalogClient;
pub use self::render::HttpRenderClient;
pub use self::token::OAuthTokenSource;

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};

use crate::app::TokenManager;
use crate::domain::{AuthError, Credential};

/// Error bodies are cut to this many characters before they reach logs or
/// reports.
const MAX_ERROR_BODY: usize = 300;

pub(crate) fn http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(concat!("scenewatch/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
}

pub(crate) fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_ERROR_BODY) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

pub(crate) enum SendError {
    Auth(AuthError),
    Transport(reqwest::Error),

    /// Still 401 after one credential refresh.
    Unauthorized,
}

/// Send a bearer-authenticated request; on 401, invalidate the credential,
/// refresh once and resend.
pub(crate) async fn send_authorized<F>(session: &TokenManager, build: F) -> Result<Response, SendError>
where
    F: Fn(&Credential) -> RequestBuilder,
{
    let credential = session.token().await.map_err(SendError::Auth)?;
    let response = build(&credential)
        .send()
        .await
        .map_err(SendError::Transport)?;
    if response.status() != StatusCode::UNAUTHORIZED {
        return Ok(response);
    }

    tracing::warn!("bearer token rejected, refreshing once");
    session.invalidate(&credential).await;
    let credential = session.token().await.map_err(SendError::Auth)?;
    let response = build(&credential)
        .send()
        .await
        .map_err(SendError::Transport)?;
    if response.status() == StatusCode::UNAUTHORIZED {
        return Err(SendError::Unauthorized);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use chrono::{TimeZone, Utc};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use crate::ports::FixedClock;
    use crate::testing::FakeTokenSource;

    /// One-shot HTTP server answering each connection with the next status.
    /// Returns the base URL and the `Authorization` header of every request.
    async fn scripted_server(statuses: Vec<u16>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        tokio::spawn(async move {
            for status in statuses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut raw = Vec::new();
                let mut buf = [0u8; 1024];
                while !raw.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    raw.extend_from_slice(&buf[..n]);
                }
                let head = String::from_utf8_lossy(&raw).to_string();
                let auth = head
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("authorization")
                            .then(|| value.trim().to_string())
                    })
                    .unwrap_or_default();
                log.lock().unwrap().push(auth);
                let reply = format!(
                    "HTTP/1.1 {status} Scripted\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok"
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
        });
        (url, seen)
    }

    fn session() -> (Arc<FakeTokenSource>, TokenManager) {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 1, 23, 8, 0, 0).unwrap()));
        let source = Arc::new(FakeTokenSource::new(clock.clone(), chrono::Duration::hours(1)));
        let manager = TokenManager::new(source.clone(), clock);
        (source, manager)
    }

    #[tokio::test]
    async fn rejected_token_is_refreshed_once_and_resent() {
        let (url, seen) = scripted_server(vec![401, 200]).await;
        let (source, session) = session();
        let client = http_client(Duration::from_secs(5)).unwrap();

        let response = send_authorized(&session, |cred| {
            client.get(&url).bearer_auth(cred.access_token())
        })
        .await;

        assert!(matches!(&response, Ok(r) if r.status() == StatusCode::OK));
        assert_eq!(source.calls(), 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["Bearer token-1".to_string(), "Bearer token-2".to_string()]
        );
    }

    #[tokio::test]
    async fn second_rejection_is_unauthorized() {
        let (url, seen) = scripted_server(vec![401, 401]).await;
        let (source, session) = session();
        let client = http_client(Duration::from_secs(5)).unwrap();

        let response = send_authorized(&session, |cred| {
            client.get(&url).bearer_auth(cred.access_token())
        })
        .await;

        assert!(matches!(response, Err(SendError::Unauthorized)));
        assert_eq!(source.calls(), 2);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn accepted_token_is_sent_once() {
        let (url, seen) = scripted_server(vec![200]).await;
        let (source, session) = session();
        let client = http_client(Duration::from_secs(5)).unwrap();

        let response = send_authorized(&session, |cred| {
            client.get(&url).bearer_auth(cred.access_token())
        })
        .await;

        assert!(response.is_ok());
        assert_eq!(source.calls(), 1);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(1000);
        let cut = truncate_body(&body);
        assert_eq!(cut.chars().count(), MAX_ERROR_BODY + 1);
        assert!(cut.ends_with('…'));
        assert_eq!(truncate_body("  short \n"), "short");
    }
}
