//! URL validation and the upstream metadata probe.
//!
//! A candidate URL is accepted only if it parses as an absolute http(s) URL
//! with a host. The probe is a single HEAD request (no retries); origins that
//! reject HEAD get one `Range: bytes=0-0` GET instead, whose body is dropped
//! without being read.

use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use crate::config::ProxyConfig;
use crate::error::ProxyError;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A validated stream source. Scheme is guaranteed to be http or https.
#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    url: Url,
}

impl SourceDescriptor {
    pub fn parse(raw: &str) -> Result<Self, ProxyError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ProxyError::MissingUrl);
        }
        let url = Url::parse(raw).map_err(|_| ProxyError::MalformedUrl)?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(ProxyError::UnsupportedScheme(other.to_string())),
        }
        if url.host_str().is_none() {
            return Err(ProxyError::MalformedUrl);
        }
        Ok(SourceDescriptor { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Download filename derived from the last path segment.
    pub fn filename(&self) -> String {
        self.url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| name.contains('.'))
            .map(str::to_string)
            .unwrap_or_else(|| "video.mp4".to_string())
    }
}

/// What the probe learned about the origin. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamCapabilities {
    pub content_length: Option<u64>,
    pub content_type: String,
    /// Raw `Accept-Ranges` value, `"none"` when the header was absent.
    pub accept_ranges: String,
    pub supports_range: bool,
}

impl UpstreamCapabilities {
    /// Build from probe response headers. `observed_partial` is set when the
    /// probe itself got a 206, which proves range support whatever the
    /// origin advertises; in that case the total length comes from the
    /// `Content-Range` suffix rather than the (partial) `Content-Length`.
    fn from_headers(headers: &reqwest::header::HeaderMap, observed_partial: bool) -> Self {
        let accept_ranges = headers
            .get(ACCEPT_RANGES)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("none")
            .to_string();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let content_length = if observed_partial {
            headers
                .get(CONTENT_RANGE)
                .and_then(|value| value.to_str().ok())
                .and_then(content_range_total)
        } else {
            headers
                .get(CONTENT_LENGTH)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok())
        };
        let supports_range = accept_ranges == "bytes" || observed_partial;
        UpstreamCapabilities {
            content_length,
            content_type,
            accept_ranges,
            supports_range,
        }
    }
}

/// Probe the origin for size, content type, and range support.
///
/// One attempt only; the caller decides how to surface failures.
pub async fn validate(
    client: &Client,
    config: &ProxyConfig,
    source: &SourceDescriptor,
) -> Result<UpstreamCapabilities, ProxyError> {
    let head = client.head(source.url().clone()).send().await?;
    let caps = if head.status().is_success() {
        UpstreamCapabilities::from_headers(head.headers(), false)
    } else {
        debug!(
            source = source.as_str(),
            status = %head.status(),
            "HEAD probe rejected, falling back to ranged GET"
        );
        drop(head);
        probe_with_get(client, source).await?
    };
    if let Some(length) = caps.content_length {
        if length > config.max_file_size {
            return Err(ProxyError::ContentTooLarge {
                length,
                limit: config.max_file_size,
            });
        }
    }
    Ok(caps)
}

/// Fallback probe: GET the first byte only and discard the body unread.
async fn probe_with_get(
    client: &Client,
    source: &SourceDescriptor,
) -> Result<UpstreamCapabilities, ProxyError> {
    let response = client
        .get(source.url().clone())
        .header(RANGE, "bytes=0-0")
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ProxyError::BadUpstreamStatus(status.as_u16()));
    }
    let observed_partial = status == StatusCode::PARTIAL_CONTENT;
    Ok(UpstreamCapabilities::from_headers(
        response.headers(),
        observed_partial,
    ))
}

/// Total length from a `Content-Range: bytes a-b/total` value; `None` for
/// `*` or anything malformed.
fn content_range_total(value: &str) -> Option<u64> {
    let (unit, rest) = value.trim().split_once(' ')?;
    if unit != "bytes" {
        return None;
    }
    let (_, total) = rest.split_once('/')?;
    total.parse().ok()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn rejects_non_http_schemes_without_network() {
        assert_matches!(
            SourceDescriptor::parse("ftp://example.com/a.mp4"),
            Err(ProxyError::UnsupportedScheme(scheme)) if scheme == "ftp"
        );
        assert_matches!(
            SourceDescriptor::parse("file:///etc/passwd"),
            Err(ProxyError::UnsupportedScheme(_))
        );
        assert_matches!(
            SourceDescriptor::parse("data:text/plain,hi"),
            Err(ProxyError::UnsupportedScheme(_))
        );
    }

    #[test]
    fn rejects_empty_and_malformed() {
        assert_matches!(SourceDescriptor::parse(""), Err(ProxyError::MissingUrl));
        assert_matches!(SourceDescriptor::parse("   "), Err(ProxyError::MissingUrl));
        assert_matches!(
            SourceDescriptor::parse("not a url"),
            Err(ProxyError::MalformedUrl)
        );
        assert_matches!(
            SourceDescriptor::parse("http://"),
            Err(ProxyError::MalformedUrl)
        );
    }

    #[test]
    fn accepts_http_and_https() {
        let source = SourceDescriptor::parse("https://example.com/v/clip.mp4").unwrap();
        assert_eq!(source.as_str(), "https://example.com/v/clip.mp4");
        assert!(SourceDescriptor::parse("http://example.com/a").is_ok());
    }

    #[test]
    fn filename_from_path() {
        let named = SourceDescriptor::parse("http://example.com/media/movie.mkv").unwrap();
        assert_eq!(named.filename(), "movie.mkv");
        let bare = SourceDescriptor::parse("http://example.com/stream").unwrap();
        assert_eq!(bare.filename(), "video.mp4");
    }

    #[test]
    fn content_range_totals() {
        assert_eq!(content_range_total("bytes 0-0/12345"), Some(12345));
        assert_eq!(content_range_total("bytes 0-0/*"), None);
        assert_eq!(content_range_total("items 0-0/5"), None);
        assert_eq!(content_range_total("garbage"), None);
    }

    #[test]
    fn capabilities_from_plain_headers() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(CONTENT_LENGTH, "1000000".parse().unwrap());
        headers.insert(CONTENT_TYPE, "video/mp4".parse().unwrap());
        headers.insert(ACCEPT_RANGES, "bytes".parse().unwrap());
        let caps = UpstreamCapabilities::from_headers(&headers, false);
        assert_eq!(caps.content_length, Some(1_000_000));
        assert_eq!(caps.content_type, "video/mp4");
        assert!(caps.supports_range);
    }

    #[test]
    fn partial_probe_overrides_missing_accept_ranges() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(CONTENT_LENGTH, "1".parse().unwrap());
        headers.insert(CONTENT_RANGE, "bytes 0-0/777".parse().unwrap());
        let caps = UpstreamCapabilities::from_headers(&headers, true);
        assert_eq!(caps.content_length, Some(777));
        assert_eq!(caps.accept_ranges, "none");
        assert!(caps.supports_range);
    }
}
