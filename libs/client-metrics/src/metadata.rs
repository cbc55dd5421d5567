//! Decoding of server-supplied timing and location metadata.
//!
//! - `server-timing` response header: `gfet4t7; dur=<millis>`, the cumulative
//!   server processing time so far.
//! - `x-goog-ext-425905942-bin` trailer: a serialized [`ResponseParams`]
//!   carrying the zone and cluster that served the request.
//!
//! Neither value is required. Absent or malformed values decode to `None`.

use once_cell::sync::Lazy;
use prost::Message;
use regex::Regex;
use std::time::Duration;
use tonic::metadata::MetadataMap;
use tracing::debug;

/// Trailer key holding the encoded [`ResponseParams`].
pub const INSTANCE_INFORMATION_KEY: &str = "x-goog-ext-425905942-bin";

/// Header key holding the server processing duration.
pub const SERVER_TIMING_KEY: &str = "server-timing";

static SERVER_TIMING_DURATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"dur=(\d+)(?:\.\d*)?").expect("static regex is valid"));

/// Location of the cluster that served a request.
#[derive(Clone, PartialEq, Message)]
pub struct ResponseParams {
    #[prost(string, optional, tag = "1")]
    pub zone_id: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub cluster_id: Option<String>,
}

/// Decoded zone and cluster. Empty strings are treated as unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterLocation {
    pub zone: Option<String>,
    pub cluster: Option<String>,
}

impl ClusterLocation {
    pub fn is_empty(&self) -> bool {
        self.zone.is_none() && self.cluster.is_none()
    }
}

/// Decodes a raw [`ResponseParams`] payload.
pub fn decode_response_params(bytes: &[u8]) -> Option<ClusterLocation> {
    match ResponseParams::decode(bytes) {
        Ok(params) => {
            let location = ClusterLocation {
                zone: params.zone_id.filter(|z| !z.is_empty()),
                cluster: params.cluster_id.filter(|c| !c.is_empty()),
            };
            (!location.is_empty()).then_some(location)
        }
        Err(err) => {
            debug!(error = %err, "Ignoring malformed response params payload");
            None
        }
    }
}

/// Extracts the cluster location from a trailer map.
pub fn cluster_location(metadata: &MetadataMap) -> Option<ClusterLocation> {
    let value = metadata.get_bin(INSTANCE_INFORMATION_KEY)?;
    match value.to_bytes() {
        Ok(bytes) => decode_response_params(&bytes),
        Err(err) => {
            debug!(error = %err, "Response params trailer is not valid base64");
            None
        }
    }
}

/// Parses the millisecond value out of a `server-timing` header value.
pub fn parse_server_timing(value: &str) -> Option<Duration> {
    let captures = SERVER_TIMING_DURATION.captures(value)?;
    let millis = captures.get(1)?.as_str().parse::<u64>().ok()?;
    Some(Duration::from_millis(millis))
}

/// Extracts the server processing duration from a header map.
pub fn server_timing(metadata: &MetadataMap) -> Option<Duration> {
    let value = metadata.get(SERVER_TIMING_KEY)?.to_str().ok()?;
    parse_server_timing(value)
}
