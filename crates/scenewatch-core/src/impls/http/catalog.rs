//! STAC item search against the catalog API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{SendError, http_client, send_authorized, truncate_body};
use crate::app::TokenManager;
use crate::domain::{CatalogError, Polygon, SceneCandidate};
use crate::ports::CatalogClient;

const FIELDS: [&str; 3] = ["id", "properties.datetime", "properties.eo:cloud_cover"];

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    features: Vec<Feature>,
    #[serde(default)]
    context: Option<PageContext>,
}

#[derive(Debug, Deserialize)]
struct PageContext {
    #[serde(default)]
    next: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    id: String,
    #[serde(default)]
    properties: FeatureProperties,
}

#[derive(Debug, Default, Deserialize)]
struct FeatureProperties {
    #[serde(default)]
    datetime: Option<String>,
    #[serde(default, rename = "eo:cloud_cover")]
    cloud_cover: Option<f64>,
}

impl From<SendError> for CatalogError {
    fn from(err: SendError) -> Self {
        match err {
            SendError::Auth(auth) => CatalogError::Auth(auth),
            SendError::Transport(e) => CatalogError::Transport(e.to_string()),
            SendError::Unauthorized => CatalogError::Unauthorized,
        }
    }
}

pub struct HttpCatalogClient {
    http: Client,
    search_url: String,
    collection: String,
    page_limit: u32,
    max_pages: u32,
    session: Arc<TokenManager>,
}

impl HttpCatalogClient {
    pub fn new(
        base_url: &str,
        collection: impl Into<String>,
        page_limit: u32,
        max_pages: u32,
        timeout: Duration,
        session: Arc<TokenManager>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: http_client(timeout)?,
            search_url: format!("{}/api/v1/catalog/1.0.0/search", base_url.trim_end_matches('/')),
            collection: collection.into(),
            page_limit,
            max_pages,
            session,
        })
    }

    async fn fetch_page(&self, body: &Value) -> Result<SearchPage, CatalogError> {
        let response =
            send_authorized(&self.session, |cred| {
                self.http
                    .post(&self.search_url)
                    .header(reqwest::header::AUTHORIZATION, cred.bearer_header())
                    .json(body)
            })
            .await?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CatalogError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(CatalogError::Status {
                status: status.as_u16(),
                body: truncate_body(&String::from_utf8_lossy(&bytes)),
            });
        }
        serde_json::from_slice(&bytes).map_err(|e| CatalogError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn search(
        &self,
        geometry: &Polygon,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SceneCandidate>, CatalogError> {
        let mut candidates = Vec::new();
        let mut next: Option<Value> = None;
        for page_no in 1..=self.max_pages {
            let body = search_body(
                &self.collection,
                geometry,
                start,
                end,
                self.page_limit,
                next.as_ref(),
            );
            let page = self.fetch_page(&body).await?;
            tracing::debug!(page = page_no, features = page.features.len(), "catalog page");
            candidates.extend(to_candidates(page.features)?);

            next = page.context.and_then(|c| c.next).filter(|n| !n.is_null());
            if next.is_none() {
                return Ok(candidates);
            }
        }
        tracing::warn!(max_pages = self.max_pages, "catalog pagination cap reached");
        Ok(candidates)
    }
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn search_body(
    collection: &str,
    geometry: &Polygon,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    limit: u32,
    next: Option<&Value>,
) -> Value {
    let mut body = json!({
        "collections": [collection],
        "bbox": geometry.bbox().to_array(),
        "datetime": format!("{}/{}", rfc3339(start), rfc3339(end)),
        "limit": limit,
        "fields": { "include": FIELDS },
    });
    if let (Some(next), Some(obj)) = (next, body.as_object_mut()) {
        obj.insert("next".to_string(), next.clone());
    }
    body
}

fn to_candidates(features: Vec<Feature>) -> Result<Vec<SceneCandidate>, CatalogError> {
    let mut out = Vec::with_capacity(features.len());
    for feature in features {
        let Some(raw) = feature.properties.datetime else {
            tracing::debug!(scene_id = %feature.id, "feature without datetime skipped");
            continue;
        };
        let acquired_at = DateTime::parse_from_rfc3339(&raw)
            .map_err(|e| CatalogError::Malformed(format!("{}: datetime {raw:?}: {e}", feature.id)))?
            .with_timezone(&Utc);
        out.push(SceneCandidate::new(
            feature.id,
            acquired_at,
            feature.properties.cloud_cover,
        ));
    }
    Ok(out)
}
