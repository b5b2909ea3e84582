//! Process API client: one PNG/JPEG per (AOI polygon, scene, recipe).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::SecondsFormat;
use reqwest::Client;
use serde_json::{Value, json};

use super::{SendError, http_client, send_authorized, truncate_body};
use crate::app::TokenManager;
use crate::domain::{
    Polygon, RenderError, RenderRecipe, RenderedImage, ResolvedScene, is_transient_status,
};
use crate::ports::RenderClient;

const CRS_WGS84: &str = "http://www.opengis.net/def/crs/EPSG/0/4326";

/// Acquisitions are matched within this distance of the scene timestamp.
const TIME_SLACK_HOURS: i64 = 1;

impl From<SendError> for RenderError {
    fn from(err: SendError) -> Self {
        match err {
            SendError::Auth(auth) => RenderError::Auth(auth),
            SendError::Transport(e) => RenderError::Transport(e.to_string()),
            SendError::Unauthorized => RenderError::Unauthorized,
        }
    }
}

pub struct HttpRenderClient {
    http: Client,
    process_url: String,
    collection: String,
    session: Arc<TokenManager>,
}

impl HttpRenderClient {
    pub fn new(
        base_url: &str,
        collection: impl Into<String>,
        timeout: Duration,
        session: Arc<TokenManager>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: http_client(timeout)?,
            process_url: format!("{}/api/v1/process", base_url.trim_end_matches('/')),
            collection: collection.into(),
            session,
        })
    }
}

#[async_trait]
impl RenderClient for HttpRenderClient {
    async fn render(
        &self,
        geometry: &Polygon,
        scene: &ResolvedScene,
        recipe: &RenderRecipe,
    ) -> Result<RenderedImage, RenderError> {
        let body = process_body(&self.collection, geometry, scene, recipe);
        let response = send_authorized(&self.session, |cred| {
            self.http
                .post(&self.process_url)
                .header(reqwest::header::AUTHORIZATION, cred.bearer_header())
                .header(reqwest::header::ACCEPT, recipe.format.mime())
                .json(&body)
        })
        .await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RenderError::Transport(e.to_string()))?;

        classify(status, content_type.as_deref(), bytes, recipe)
    }
}

pub(crate) fn process_body(
    collection: &str,
    geometry: &Polygon,
    scene: &ResolvedScene,
    recipe: &RenderRecipe,
) -> Value {
    let slack = chrono::Duration::hours(TIME_SLACK_HOURS);
    let from = (scene.acquired_at - slack).to_rfc3339_opts(SecondsFormat::Secs, true);
    let to = (scene.acquired_at + slack).to_rfc3339_opts(SecondsFormat::Secs, true);
    json!({
        "input": {
            "bounds": {
                "geometry": geometry.to_geojson(),
                "properties": { "crs": CRS_WGS84 }
            },
            "data": [{
                "type": collection,
                "dataFilter": { "timeRange": { "from": from, "to": to } }
            }]
        },
        "output": {
            "width": recipe.width,
            "height": recipe.height,
            "responses": [{
                "identifier": "default",
                "format": { "type": recipe.format.mime() }
            }]
        },
        "evalscript": recipe.evalscript(),
    })
}

/// Map a process API response onto an image or a classified failure.
pub(crate) fn classify(
    status: u16,
    content_type: Option<&str>,
    bytes: Bytes,
    recipe: &RenderRecipe,
) -> Result<RenderedImage, RenderError> {
    if (200..300).contains(&status) {
        if bytes.is_empty() {
            return Err(RenderError::Unrenderable {
                status: Some(status),
                reason: "empty image body".to_string(),
            });
        }
        let content_type = content_type
            .filter(|ct| ct.starts_with("image/"))
            .unwrap_or(recipe.format.mime())
            .to_string();
        return Ok(RenderedImage {
            bytes,
            content_type,
        });
    }

    let body = truncate_body(&String::from_utf8_lossy(&bytes));
    if is_transient_status(status) || !(400..500).contains(&status) {
        return Err(RenderError::Status { status, body });
    }
    Err(RenderError::Unrenderable {
        status: Some(status),
        reason: if body.is_empty() {
            format!("HTTP {status}")
        } else {
            body
        },
    })
}
