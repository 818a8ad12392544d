//! HTTP surface: the axum router and request handlers.
//!
//! Each request runs the same pipeline, validator → translator → relay, with
//! no state shared between requests beyond the pooled upstream client and the
//! immutable config.

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::range::{parse_range_header, plan, ResponsePlan};
use crate::relay::relay;
use crate::validate::{validate, SourceDescriptor};

#[derive(Clone)]
pub struct AppState {
    pub client: reqwest::Client,
    pub config: ProxyConfig,
}

impl AppState {
    pub fn new(config: ProxyConfig) -> reqwest::Result<Self> {
        let client = config.client()?;
        Ok(AppState { client, config })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/stream", get(stream))
        .route("/download", get(download))
        .route("/api/validate", get(api_validate))
        .route("/api/recent", get(api_recent))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct SourceQuery {
    url: Option<String>,
}

impl SourceQuery {
    fn source(&self) -> Result<SourceDescriptor, ProxyError> {
        SourceDescriptor::parse(self.url.as_deref().unwrap_or_default())
    }
}

async fn index() -> Html<&'static str> {
    Html(include_str!("../static/player.html"))
}

/// `GET /stream?url=<URL>` — relay the remote file, honoring `Range`.
async fn stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SourceQuery>,
) -> Response {
    match stream_inner(&state, &headers, &query).await {
        Ok(response) => response,
        Err(err) => {
            warn!(url = query.url.as_deref().unwrap_or(""), %err, "stream request failed");
            err.into_response()
        }
    }
}

async fn stream_inner(
    state: &AppState,
    headers: &HeaderMap,
    query: &SourceQuery,
) -> Result<Response, ProxyError> {
    let source = query.source()?;
    let caps = validate(&state.client, &state.config, &source).await?;
    let range = parse_range_header(
        headers
            .get(header::RANGE)
            .and_then(|value| value.to_str().ok()),
    );
    let (plan, upstream_range) = plan(&caps, range)?;
    relay(&state.client, &state.config, &source, plan, upstream_range).await
}

/// `GET /download?url=<URL>` — full-body relay with an attachment
/// disposition so the browser saves instead of plays.
async fn download(State(state): State<AppState>, Query(query): Query<SourceQuery>) -> Response {
    match download_inner(&state, &query).await {
        Ok(response) => response,
        Err(err) => {
            warn!(url = query.url.as_deref().unwrap_or(""), %err, "download request failed");
            err.into_response()
        }
    }
}

async fn download_inner(state: &AppState, query: &SourceQuery) -> Result<Response, ProxyError> {
    let source = query.source()?;
    let caps = validate(&state.client, &state.config, &source).await?;
    let plan = ResponsePlan::full(&caps);
    let mut response = relay(&state.client, &state.config, &source, plan, None).await?;
    let disposition = format!("attachment; filename=\"{}\"", source.filename());
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// `GET /api/validate?url=<URL>` — probe the origin and report what it
/// supports, never streaming a body.
async fn api_validate(State(state): State<AppState>, Query(query): Query<SourceQuery>) -> Response {
    let source = match query.source() {
        Ok(source) => source,
        Err(err) => return validate_failure(err),
    };
    match validate(&state.client, &state.config, &source).await {
        Ok(caps) => Json(json!({
            "valid": true,
            "content_type": caps.content_type,
            "content_length": caps
                .content_length
                .map(|length| length.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            "accept_ranges": caps.accept_ranges,
            "supports_range": caps.supports_range,
        }))
        .into_response(),
        Err(err) => validate_failure(err),
    }
}

fn validate_failure(err: ProxyError) -> Response {
    (
        err.status(),
        Json(json!({ "valid": false, "error": err.to_string() })),
    )
        .into_response()
}

/// `GET /api/recent` — history lives in the browser's localStorage; this
/// exists so the player page has a stable endpoint to say so.
async fn api_recent() -> Json<serde_json::Value> {
    Json(json!({ "message": "Recent links are stored in browser localStorage" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_query_requires_url() {
        let query = SourceQuery { url: None };
        assert!(matches!(query.source(), Err(ProxyError::MissingUrl)));
        let query = SourceQuery { url: Some("http://example.com/a.mp4".into()) };
        assert!(query.source().is_ok());
    }

    #[test]
    fn router_builds() {
        let state = AppState::new(ProxyConfig::default()).unwrap();
        let _router = router(state);
    }
}
