//! Range header translation.
//!
//! Maps an inbound client `Range` header plus the probed upstream
//! capabilities onto a [`ResponsePlan`]: the status code and entity headers
//! the relay emits before the first body byte. Only single byte ranges are
//! handled; multi-range sets are rejected up front rather than answered with
//! multipart bodies, which video players never send.

use axum::http::StatusCode;

use crate::error::ProxyError;
use crate::validate::UpstreamCapabilities;

/// A single client byte range, as written on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `bytes=start-end` or `bytes=start-` (to end of file).
    Bounded { start: u64, end: Option<u64> },
    /// `bytes=-n`: the final `n` bytes. Resolvable only once the total
    /// length is known, otherwise forwarded verbatim to the origin.
    Suffix(u64),
}

impl RangeSpec {
    /// Render as an outbound `Range` header value.
    pub fn to_header(self) -> String {
        match self {
            RangeSpec::Bounded { start, end: Some(end) } => format!("bytes={start}-{end}"),
            RangeSpec::Bounded { start, end: None } => format!("bytes={start}-"),
            RangeSpec::Suffix(n) => format!("bytes=-{n}"),
        }
    }
}

/// Outcome of parsing the client's `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedRange {
    /// No `Range` header on the request.
    Absent,
    /// Header present but not a syntactically valid bytes range. HTTP says
    /// to ignore such a header and serve the full representation.
    Ignored,
    /// More than one range in the set.
    Multi,
    Single(RangeSpec),
}

/// Parse an optional `Range` header value.
///
/// Syntax errors (including `end < start`, which makes the whole header
/// invalid per RFC 9110) collapse to [`ParsedRange::Ignored`]; satisfiability
/// against the actual length is decided later by [`plan`].
pub fn parse_range_header(value: Option<&str>) -> ParsedRange {
    let Some(value) = value else {
        return ParsedRange::Absent;
    };
    let Some(set) = value.trim().strip_prefix("bytes=") else {
        return ParsedRange::Ignored;
    };
    if set.contains(',') {
        return ParsedRange::Multi;
    }
    let Some((first, last)) = set.trim().split_once('-') else {
        return ParsedRange::Ignored;
    };

    if first.is_empty() {
        return match last.parse::<u64>() {
            Ok(n) => ParsedRange::Single(RangeSpec::Suffix(n)),
            Err(_) => ParsedRange::Ignored,
        };
    }

    let Ok(start) = first.parse::<u64>() else {
        return ParsedRange::Ignored;
    };
    if last.is_empty() {
        return ParsedRange::Single(RangeSpec::Bounded { start, end: None });
    }
    match last.parse::<u64>() {
        Ok(end) if end >= start => {
            ParsedRange::Single(RangeSpec::Bounded { start, end: Some(end) })
        }
        _ => ParsedRange::Ignored,
    }
}

/// Headers and status the relay commits to before streaming.
///
/// `content_length` of `None` means the transfer is chunked; `status` is
/// either 200 or 206 here. 416 never reaches the relay, it is raised as
/// [`ProxyError::RangeNotSatisfiable`] and answered bodiless at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePlan {
    pub status: StatusCode,
    pub content_range: Option<String>,
    pub content_length: Option<u64>,
    pub content_type: String,
}

impl ResponsePlan {
    /// Plan for relaying the full body unchanged.
    pub fn full(caps: &UpstreamCapabilities) -> Self {
        ResponsePlan {
            status: StatusCode::OK,
            content_range: None,
            content_length: caps.content_length,
            content_type: caps.content_type.clone(),
        }
    }
}

/// Combine capabilities and the parsed client range into a response plan and
/// the range to request upstream.
///
/// Ranged requests are attempted even when the origin did not advertise
/// `Accept-Ranges: bytes` — some origins honor ranges without saying so, and
/// the relay treats the origin's actual 206/200 answer as ground truth,
/// degrading to a full-body 200 if the range was ignored.
pub fn plan(
    caps: &UpstreamCapabilities,
    range: ParsedRange,
) -> Result<(ResponsePlan, Option<RangeSpec>), ProxyError> {
    match range {
        ParsedRange::Absent | ParsedRange::Ignored => Ok((ResponsePlan::full(caps), None)),
        ParsedRange::Multi => Err(ProxyError::MultiRangeUnsupported {
            total: caps.content_length,
        }),
        ParsedRange::Single(spec) => match caps.content_length {
            Some(total) => {
                let (start, end) = resolve(spec, total).ok_or(
                    ProxyError::RangeNotSatisfiable { total: Some(total) },
                )?;
                let plan = ResponsePlan {
                    status: StatusCode::PARTIAL_CONTENT,
                    content_range: Some(format!("bytes {start}-{end}/{total}")),
                    content_length: Some(end - start + 1),
                    content_type: caps.content_type.clone(),
                };
                Ok((plan, Some(RangeSpec::Bounded { start, end: Some(end) })))
            }
            None => {
                // Length unknown: forward the client's range as written and
                // let the relay adopt the origin's Content-Range if it
                // answers 206.
                let plan = ResponsePlan {
                    status: StatusCode::PARTIAL_CONTENT,
                    content_range: None,
                    content_length: None,
                    content_type: caps.content_type.clone(),
                };
                Ok((plan, Some(spec)))
            }
        },
    }
}

/// Resolve a range against a known total length to inclusive `(start, end)`,
/// clamping `end` to the last byte. `None` means unsatisfiable.
fn resolve(spec: RangeSpec, total: u64) -> Option<(u64, u64)> {
    if total == 0 {
        return None;
    }
    match spec {
        RangeSpec::Bounded { start, end } => {
            if start >= total {
                return None;
            }
            Some((start, end.map_or(total - 1, |end| end.min(total - 1))))
        }
        RangeSpec::Suffix(0) => None,
        RangeSpec::Suffix(n) => Some((total.saturating_sub(n), total - 1)),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn caps(content_length: Option<u64>) -> UpstreamCapabilities {
        UpstreamCapabilities {
            content_length,
            content_type: "video/mp4".to_string(),
            accept_ranges: "bytes".to_string(),
            supports_range: true,
        }
    }

    #[test]
    fn parse_absent_and_garbage() {
        assert_eq!(parse_range_header(None), ParsedRange::Absent);
        assert_eq!(parse_range_header(Some("items=0-10")), ParsedRange::Ignored);
        assert_eq!(parse_range_header(Some("bytes=abc-def")), ParsedRange::Ignored);
        assert_eq!(parse_range_header(Some("bytes=-")), ParsedRange::Ignored);
        // end < start invalidates the whole header
        assert_eq!(parse_range_header(Some("bytes=30-20")), ParsedRange::Ignored);
    }

    #[test]
    fn parse_single_forms() {
        assert_eq!(
            parse_range_header(Some("bytes=0-99")),
            ParsedRange::Single(RangeSpec::Bounded { start: 0, end: Some(99) })
        );
        assert_eq!(
            parse_range_header(Some("bytes=100-")),
            ParsedRange::Single(RangeSpec::Bounded { start: 100, end: None })
        );
        assert_eq!(
            parse_range_header(Some("bytes=-500")),
            ParsedRange::Single(RangeSpec::Suffix(500))
        );
    }

    #[test]
    fn parse_multi() {
        assert_eq!(parse_range_header(Some("bytes=0-10,20-30")), ParsedRange::Multi);
        assert_eq!(parse_range_header(Some("bytes=0-0,-1")), ParsedRange::Multi);
    }

    #[test]
    fn range_spec_round_trips_to_header() {
        assert_eq!(
            RangeSpec::Bounded { start: 5, end: Some(9) }.to_header(),
            "bytes=5-9"
        );
        assert_eq!(RangeSpec::Bounded { start: 5, end: None }.to_header(), "bytes=5-");
        assert_eq!(RangeSpec::Suffix(100).to_header(), "bytes=-100");
    }

    #[test]
    fn plan_without_range_is_full_200() {
        let (plan, upstream) = plan(&caps(Some(1_000_000)), ParsedRange::Absent).unwrap();
        assert_eq!(plan.status, StatusCode::OK);
        assert_eq!(plan.content_length, Some(1_000_000));
        assert_eq!(plan.content_range, None);
        assert_eq!(upstream, None);
    }

    #[test]
    fn plan_full_file_range() {
        let parsed = parse_range_header(Some("bytes=0-999999"));
        let (plan, upstream) = plan(&caps(Some(1_000_000)), parsed).unwrap();
        assert_eq!(plan.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(plan.content_range.as_deref(), Some("bytes 0-999999/1000000"));
        assert_eq!(plan.content_length, Some(1_000_000));
        assert_eq!(
            upstream,
            Some(RangeSpec::Bounded { start: 0, end: Some(999_999) })
        );
    }

    #[test]
    fn plan_clamps_open_and_oversized_ends() {
        let (open, _) = plan(&caps(Some(100)), parse_range_header(Some("bytes=40-"))).unwrap();
        assert_eq!(open.content_range.as_deref(), Some("bytes 40-99/100"));
        assert_eq!(open.content_length, Some(60));

        let (oversized, _) =
            plan(&caps(Some(100)), parse_range_header(Some("bytes=40-5000"))).unwrap();
        assert_eq!(oversized.content_range.as_deref(), Some("bytes 40-99/100"));
    }

    #[test]
    fn plan_resolves_suffix() {
        let (plan, upstream) =
            plan(&caps(Some(1000)), parse_range_header(Some("bytes=-100"))).unwrap();
        assert_eq!(plan.content_range.as_deref(), Some("bytes 900-999/1000"));
        assert_eq!(plan.content_length, Some(100));
        assert_eq!(
            upstream,
            Some(RangeSpec::Bounded { start: 900, end: Some(999) })
        );

        // suffix longer than the file covers the whole file
        let (all, _) = super::plan(&caps(Some(50)), parse_range_header(Some("bytes=-100"))).unwrap();
        assert_eq!(all.content_range.as_deref(), Some("bytes 0-49/50"));
    }

    #[test]
    fn plan_start_beyond_length_is_unsatisfiable() {
        let err = plan(&caps(Some(1000)), parse_range_header(Some("bytes=1000-")))
            .unwrap_err();
        assert_matches!(err, ProxyError::RangeNotSatisfiable { total: Some(1000) });

        let err = plan(&caps(Some(0)), parse_range_header(Some("bytes=0-"))).unwrap_err();
        assert_matches!(err, ProxyError::RangeNotSatisfiable { total: Some(0) });
    }

    #[test]
    fn plan_multi_range_is_rejected() {
        let err = plan(&caps(Some(1000)), parse_range_header(Some("bytes=0-10,20-30")))
            .unwrap_err();
        assert_matches!(err, ProxyError::MultiRangeUnsupported { total: Some(1000) });
    }

    #[test]
    fn plan_unknown_length_forwards_range_verbatim() {
        let parsed = parse_range_header(Some("bytes=100-"));
        let (plan, upstream) = plan(&caps(None), parsed).unwrap();
        assert_eq!(plan.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(plan.content_range, None);
        assert_eq!(plan.content_length, None);
        assert_eq!(upstream, Some(RangeSpec::Bounded { start: 100, end: None }));
    }
}
