//! OAuth2 client-credentials grant against the identity provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Client;
use serde::Deserialize;

use super::{http_client, truncate_body};
use crate::domain::{AuthError, Credential};
use crate::ports::{Clock, TokenSource};

const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Lifetimes beyond this are treated as this long; the credential is
/// refreshed at least once a day.
const MAX_EXPIRES_IN_SECS: i64 = 24 * 3600;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

pub struct OAuthTokenSource {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    clock: Arc<dyn Clock>,
}

impl OAuthTokenSource {
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: http_client(timeout)?,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            clock,
        })
    }
}

#[async_trait]
impl TokenSource for OAuthTokenSource {
    async fn fetch(&self) -> Result<Credential, AuthError> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let requested_at = self.clock.now();
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;
        if !status.is_success() {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body: truncate_body(&String::from_utf8_lossy(&body)),
            });
        }
        parse_token_response(&body, requested_at)
    }
}

/// Expiry is measured from when the request was sent, so slow responses
/// err on the early side.
pub(crate) fn parse_token_response(
    body: &[u8],
    requested_at: DateTime<Utc>,
) -> Result<Credential, AuthError> {
    let parsed: TokenResponse =
        serde_json::from_slice(body).map_err(|e| AuthError::Malformed(e.to_string()))?;
    if parsed.access_token.is_empty() {
        return Err(AuthError::Malformed("empty access_token".to_string()));
    }
    let expires_in = parsed.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    if expires_in <= 0 {
        return Err(AuthError::Malformed(format!("expires_in must be positive, got {expires_in}")));
    }
    let expires_at = TimeDelta::try_seconds(expires_in.min(MAX_EXPIRES_IN_SECS))
        .and_then(|lifetime| requested_at.checked_add_signed(lifetime))
        .ok_or_else(|| AuthError::Malformed(format!("expires_in out of range: {expires_in}")))?;
    Ok(Credential::new(parsed.access_token, expires_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 23, 8, 0, 0).unwrap()
    }

    #[test]
    fn expiry_comes_from_expires_in() {
        let cred = parse_token_response(
            br#"{"access_token":"abc","expires_in":600,"token_type":"Bearer"}"#,
            now(),
        )
        .unwrap();
        assert_eq!(cred.access_token(), "abc");
        assert_eq!(cred.expires_at(), now() + chrono::Duration::seconds(600));
    }

    #[test]
    fn missing_expires_in_defaults_to_an_hour() {
        let cred = parse_token_response(br#"{"access_token":"abc"}"#, now()).unwrap();
        assert_eq!(cred.expires_at(), now() + chrono::Duration::hours(1));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            parse_token_response(b"<html>", now()),
            Err(AuthError::Malformed(_))
        ));
        assert!(matches!(
            parse_token_response(br#"{"access_token":""}"#, now()),
            Err(AuthError::Malformed(_))
        ));
    }

    #[test]
    fn oversized_expires_in_is_capped() {
        let cred = parse_token_response(
            br#"{"access_token":"abc","expires_in":9223372036854775807}"#,
            now(),
        )
        .unwrap();
        assert_eq!(cred.expires_at(), now() + chrono::Duration::hours(24));
    }

    #[rstest]
    #[case::zero(br#"{"access_token":"abc","expires_in":0}"#.as_slice())]
    #[case::negative(br#"{"access_token":"abc","expires_in":-30}"#.as_slice())]
    #[case::most_negative(br#"{"access_token":"abc","expires_in":-9223372036854775808}"#.as_slice())]
    #[case::beyond_i64(br#"{"access_token":"abc","expires_in":18446744073709551615}"#.as_slice())]
    fn unusable_expires_in_is_malformed(#[case] body: &[u8]) {
        assert!(matches!(
            parse_token_response(body, now()),
            Err(AuthError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn missing_credentials_fail_without_a_request() {
        let source = OAuthTokenSource::new(
            "http://127.0.0.1:9/token",
            "",
            "",
            Duration::from_secs(1),
            Arc::new(crate::ports::SystemClock),
        )
        .unwrap();
        assert_eq!(source.fetch().await, Err(AuthError::MissingCredentials));
    }
}
