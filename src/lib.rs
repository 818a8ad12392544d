//! # range-relay
//!
//! HTTP range-forwarding proxy: lets a browser play a remote video file
//! progressively without the server ever buffering the whole file.
//!
//! Per request the pipeline is validator → translator → relay:
//!
//! * [`validate::validate`] checks the URL (http/https only) and probes the
//!   origin with a HEAD request for size, content type, and range support.
//! * [`range::plan`] maps the client's `Range` header and the probed
//!   capabilities onto a 200/206/416 response plan.
//! * [`relay::relay`] opens the (possibly ranged) upstream request and copies
//!   the body through in bounded-memory chunks, honoring a total-size ceiling
//!   and releasing the upstream connection on every exit path.
//!
//! The proxy is byte-transparent: it never inspects or rewrites media data.

pub mod config;
pub mod error;
pub mod range;
pub mod relay;
pub mod server;
pub mod validate;

pub use config::ProxyConfig;
pub use error::ProxyError;
pub use range::{parse_range_header, plan, ParsedRange, RangeSpec, ResponsePlan};
pub use relay::{relay, RelayStream};
pub use server::{router, AppState};
pub use validate::{validate, SourceDescriptor, UpstreamCapabilities};
