//! The chunked relay path.
//!
//! [`relay`] opens the upstream request, reconciles the planned headers with
//! what the origin actually answered, and hands the body to the client as a
//! [`RelayStream`]: a pull-based sequence of chunks, finite and single-pass,
//! capped per chunk and in total. Dropping the stream (client disconnect)
//! releases the upstream connection immediately.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::headers::AcceptRanges;
use axum_extra::TypedHeader;
use bytes::Bytes;
use futures::Stream;
use http_body::{Frame, SizeHint};
use pin_project::{pin_project, pinned_drop};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::range::{RangeSpec, ResponsePlan};
use crate::validate::SourceDescriptor;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Open the upstream request described by `plan` and stream its body back.
///
/// The outbound `Range` header is sent only for a 206 plan. An origin that
/// answers 200 to a ranged request gets degraded to a full-body 200 response;
/// an origin 206 against an unknown length contributes its own
/// `Content-Range`/`Content-Length`. Any other upstream status is a gateway
/// error, surfaced before headers are committed.
pub async fn relay(
    client: &Client,
    config: &ProxyConfig,
    source: &SourceDescriptor,
    mut plan: ResponsePlan,
    upstream_range: Option<RangeSpec>,
) -> Result<Response, ProxyError> {
    let mut request = client.get(source.url().clone());
    if plan.status == StatusCode::PARTIAL_CONTENT {
        if let Some(range) = upstream_range {
            request = request.header(header::RANGE, range.to_header());
        }
    }

    let upstream = request.send().await?;
    let status = upstream.status();
    if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
        return Err(ProxyError::BadUpstreamStatus(status.as_u16()));
    }
    if let Some(length) = upstream.content_length() {
        if length > config.max_file_size {
            return Err(ProxyError::ContentTooLarge {
                length,
                limit: config.max_file_size,
            });
        }
    }

    reconcile(&mut plan, &upstream);
    info!(
        source = source.as_str(),
        status = %plan.status,
        length = ?plan.content_length,
        "relay start"
    );

    let stream = RelayStream::new(
        upstream.bytes_stream(),
        source.as_str().to_string(),
        config.chunk_size,
        config.max_file_size,
        plan.content_length,
    );

    let mut headers = HeaderMap::new();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&plan.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    if let Some(content_range) = &plan.content_range {
        if let Ok(value) = HeaderValue::from_str(content_range) {
            headers.insert(header::CONTENT_RANGE, value);
        }
    }
    if let Some(length) = plan.content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }

    Ok((
        plan.status,
        TypedHeader(AcceptRanges::bytes()),
        headers,
        Body::new(stream),
    )
        .into_response())
}

/// Fold the origin's actual answer into the plan. The origin's status is
/// ground truth for range support, whatever its `Accept-Ranges` said.
fn reconcile(plan: &mut ResponsePlan, upstream: &reqwest::Response) {
    if let Some(content_type) = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    {
        plan.content_type = content_type.to_string();
    }
    if plan.status != StatusCode::PARTIAL_CONTENT {
        return;
    }
    if upstream.status() == StatusCode::OK {
        debug!("origin ignored the range header, serving full body");
        plan.status = StatusCode::OK;
        plan.content_range = None;
        plan.content_length = upstream.content_length();
    } else if plan.content_range.is_none() {
        // 206 against an unknown length: adopt the origin's own framing
        plan.content_range = upstream
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        plan.content_length = upstream.content_length();
    }
}

/// Body stream copying upstream bytes to the client. Implements [`Stream`]
/// and [`http_body::Body`].
///
/// Chunks handed to the client never exceed `chunk_size`; the stream ends
/// cleanly once `limit` total bytes have been forwarded (soft cutoff). Every
/// exit path logs the byte count, including disconnects detected via `Drop`.
#[pin_project(PinnedDrop)]
pub struct RelayStream<S> {
    #[pin]
    upstream: S,
    source: String,
    chunk_size: usize,
    limit: u64,
    transferred: u64,
    /// Leftover from an upstream chunk larger than `chunk_size`.
    pending: Option<Bytes>,
    done: bool,
    declared_length: Option<u64>,
}

impl<S> RelayStream<S> {
    pub fn new(
        upstream: S,
        source: String,
        chunk_size: usize,
        limit: u64,
        declared_length: Option<u64>,
    ) -> Self {
        RelayStream {
            upstream,
            source,
            chunk_size: chunk_size.max(1),
            limit,
            transferred: 0,
            pending: None,
            done: false,
            declared_length,
        }
    }

    /// Total bytes handed to the client so far.
    pub fn transferred(&self) -> u64 {
        self.transferred
    }
}

impl<S, E> Stream for RelayStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<BoxError>,
{
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<io::Result<Bytes>>> {
        let mut this = self.project();

        loop {
            if *this.done {
                return Poll::Ready(None);
            }

            if let Some(mut buffered) = this.pending.take() {
                let budget = this.limit.saturating_sub(*this.transferred);
                if budget == 0 {
                    info!(
                        source = %this.source,
                        bytes = *this.transferred,
                        "size ceiling reached, ending relay early"
                    );
                    *this.done = true;
                    return Poll::Ready(None);
                }
                let take = buffered
                    .len()
                    .min(*this.chunk_size)
                    .min(usize::try_from(budget).unwrap_or(usize::MAX));
                let chunk = buffered.split_to(take);
                if !buffered.is_empty() {
                    *this.pending = Some(buffered);
                }
                *this.transferred += chunk.len() as u64;
                return Poll::Ready(Some(Ok(chunk)));
            }

            if *this.transferred >= *this.limit {
                info!(
                    source = %this.source,
                    bytes = *this.transferred,
                    "size ceiling reached, ending relay early"
                );
                *this.done = true;
                return Poll::Ready(None);
            }

            match this.upstream.as_mut().poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => {
                    *this.done = true;
                    debug!(
                        source = %this.source,
                        bytes = *this.transferred,
                        "relay complete, upstream EOF"
                    );
                    return Poll::Ready(None);
                }
                Poll::Ready(Some(Err(err))) => {
                    *this.done = true;
                    let err = io::Error::new(io::ErrorKind::Other, err);
                    warn!(
                        source = %this.source,
                        bytes = *this.transferred,
                        error = %err,
                        "upstream read failed mid-stream"
                    );
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(Some(Ok(chunk))) => {
                    if !chunk.is_empty() {
                        *this.pending = Some(chunk);
                    }
                }
            }
        }
    }
}

impl<S, E> http_body::Body for RelayStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<BoxError>,
{
    type Data = Bytes;
    type Error = io::Error;

    fn size_hint(&self) -> SizeHint {
        match self.declared_length {
            Some(length) => SizeHint::with_exact(length.min(self.limit)),
            None => SizeHint::default(),
        }
    }

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<io::Result<Frame<Bytes>>>> {
        self.poll_next(cx)
            .map(|item| item.map(|result| result.map(Frame::data)))
    }
}

#[pinned_drop]
impl<S> PinnedDrop for RelayStream<S> {
    fn drop(self: Pin<&mut Self>) {
        // Dropped mid-transfer means the client went away; the upstream
        // response is dropped with us, which releases its connection.
        if !self.done {
            info!(
                source = %self.source,
                bytes = self.transferred,
                "client disconnected before end of stream"
            );
        }
    }
}
