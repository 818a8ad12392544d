//! Error taxonomy for the whole request pipeline.
//!
//! Validation errors surface as 4xx with a JSON body, upstream connectivity
//! as 5xx, and range errors as 416 per HTTP semantics. Anything that happens
//! after response headers are committed is logged by the relay instead.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::headers::ContentRange;
use axum_extra::TypedHeader;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("missing url parameter")]
    MissingUrl,

    #[error("invalid URL format")]
    MalformedUrl,

    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("cannot reach video source")]
    UnreachableHost,

    #[error("video source timeout")]
    UpstreamTimeout,

    #[error("file too large: {length} bytes exceeds the {limit} byte limit")]
    ContentTooLarge { length: u64, limit: u64 },

    #[error("video source returned status {0}")]
    BadUpstreamStatus(u16),

    #[error("video source does not support range requests")]
    RangeNotSupported,

    #[error("requested range not satisfiable")]
    RangeNotSatisfiable { total: Option<u64> },

    #[error("multi-range requests are not supported")]
    MultiRangeUnsupported { total: Option<u64> },
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingUrl
            | ProxyError::MalformedUrl
            | ProxyError::UnsupportedScheme(_) => StatusCode::BAD_REQUEST,
            ProxyError::ContentTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::UnreachableHost | ProxyError::BadUpstreamStatus(_) => {
                StatusCode::BAD_GATEWAY
            }
            ProxyError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::RangeNotSupported
            | ProxyError::RangeNotSatisfiable { .. }
            | ProxyError::MultiRangeUnsupported { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProxyError::UpstreamTimeout
        } else {
            ProxyError::UnreachableHost
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match self {
            // 416 carries `Content-Range: bytes */<total>` and an empty body.
            ProxyError::RangeNotSatisfiable { total }
            | ProxyError::MultiRangeUnsupported { total } => match total {
                Some(total) => (
                    StatusCode::RANGE_NOT_SATISFIABLE,
                    TypedHeader(ContentRange::unsatisfied_bytes(total)),
                )
                    .into_response(),
                None => (
                    StatusCode::RANGE_NOT_SATISFIABLE,
                    [(header::CONTENT_RANGE, HeaderValue::from_static("bytes */*"))],
                )
                    .into_response(),
            },
            other => {
                let body = Json(json!({ "error": other.to_string() }));
                (other.status(), body).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ProxyError::MissingUrl.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ProxyError::UnsupportedScheme("ftp".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProxyError::ContentTooLarge { length: 11, limit: 10 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(ProxyError::UnreachableHost.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ProxyError::UpstreamTimeout.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            ProxyError::RangeNotSatisfiable { total: Some(10) }.status(),
            StatusCode::RANGE_NOT_SATISFIABLE
        );
    }

    #[test]
    fn unsatisfiable_response_has_content_range_and_no_body() {
        let response =
            ProxyError::RangeNotSatisfiable { total: Some(1000) }.into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        let value = response.headers().get(header::CONTENT_RANGE).unwrap();
        assert_eq!(value, "bytes */1000");
    }
}
