//! Connection lifecycle notifications.
//!
//! The client and the stream never log on their own: everything goes
//! through an [`IcyObserver`]. [`TracingObserver`] is the default and
//! forwards events to `tracing`; [`SilentObserver`] discards them.

use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use crate::metadata::IcyMetadata;
use crate::station::StationInfo;

/// Receives connection and stream events. All methods default to no-ops.
///
/// Observers are called synchronously on the thread that opens or reads
/// the stream, so implementations must be cheap.
pub trait IcyObserver: Send + Sync {
    /// A connection attempt to `url` is starting
    fn connecting(&self, _url: &Url) {}

    /// The server redirected `from` to `to`
    fn redirected(&self, _from: &Url, _to: &Url, _status: u16) {}

    /// One response header was received
    fn response_header(&self, _name: &str, _value: &str) {}

    /// The stream is ready to be read
    fn connected(&self, _url: &Url, _station: &StationInfo) {}

    /// A new metadata snapshot was decoded
    fn metadata_changed(&self, _metadata: &IcyMetadata) {}

    /// A queued subscriber was too slow and a snapshot was dropped
    fn metadata_dropped(&self, _metadata: &IcyMetadata) {}

    /// The source ended while a metadata payload was incomplete
    fn truncated_block(&self, _held: usize, _expected: usize) {}

    /// The stream is being closed
    fn closing(&self, _station: &StationInfo) {}
}

/// Shared observer handle
pub type SharedObserver = Arc<dyn IcyObserver>;

/// Logs every event through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl IcyObserver for TracingObserver {
    fn connecting(&self, url: &Url) {
        info!(url = %url, "Opening ICY stream");
    }

    fn redirected(&self, from: &Url, to: &Url, status: u16) {
        debug!(from = %from, to = %to, status, "Following redirect");
    }

    fn response_header(&self, name: &str, value: &str) {
        debug!(name, value, "HTTP header");
    }

    fn connected(&self, url: &Url, station: &StationInfo) {
        info!(
            url = %url,
            name = %station.name,
            bitrate = station.bitrate,
            metaint = station.metaint,
            "ICY stream connected"
        );
    }

    fn metadata_changed(&self, metadata: &IcyMetadata) {
        debug!(metadata = %metadata, "Stream metadata changed");
    }

    fn metadata_dropped(&self, metadata: &IcyMetadata) {
        warn!(metadata = %metadata, "Metadata queue full, dropping snapshot");
    }

    fn truncated_block(&self, held: usize, expected: usize) {
        debug!(held, expected, "Stream ended inside a metadata block");
    }

    fn closing(&self, station: &StationInfo) {
        info!(name = %station.name, url = %station.url, "Closing ICY stream");
    }
}

/// Ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl IcyObserver for SilentObserver {}

/// Default observer used by clients and streams
pub fn default_observer() -> SharedObserver {
    Arc::new(TracingObserver)
}
