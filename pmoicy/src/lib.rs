//! ICY (SHOUTcast/Icecast) stream client for PMOMusic
//!
//! Internet radio servers speaking ICY interleave the audio with short
//! metadata announcements (`StreamTitle='Artist - Title';`) every
//! `icy-metaint` bytes. This crate connects to such servers and hands back
//! a plain [`std::io::Read`] over the audio only, while reporting metadata
//! changes through a callback.
//!
//! # Features
//!
//! - **Demuxing**: metadata blocks are stripped in place, whatever the read
//!   sizes, including blocks split across reads
//! - **Change detection**: the callback only fires when the announced
//!   metadata actually changes
//! - **`ICY 200 OK` responses**: handled alongside regular `HTTP/1.x`
//! - **Cancellation**: [`CloseHandle`] aborts a blocked read from another thread
//! - **Observability**: connection events go through an [`IcyObserver`],
//!   logged with `tracing` by default
//! - **Configuration Extension**: timeouts and User-Agent from pmoconfig
//!
//! # Example
//!
//! ```no_run
//! use std::io::Read;
//!
//! fn main() -> pmoicy::Result<()> {
//!     let mut stream = pmoicy::open("http://radio.example.com:8000/live")?;
//!     println!("Listening to {} ({})", stream.name(), stream.genre());
//!
//!     stream.set_metadata_callback(|meta| {
//!         if let Some(title) = meta.stream_title() {
//!             println!("Now playing: {}", title);
//!         }
//!     });
//!
//!     let mut buf = vec![0u8; 16 * 1024];
//!     loop {
//!         let n = stream.read(&mut buf)?;
//!         if n == 0 {
//!             break;
//!         }
//!         // feed &buf[..n] to a decoder
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Without a network
//!
//! [`IcyStream::from_reader`] wraps any reader carrying an ICY body, and
//! [`IcyDemuxer`] exposes the bare state machine for callers that manage
//! their own buffers.

pub mod client;
pub mod demux;
pub mod error;
pub mod http;
pub mod metadata;
pub mod observer;
pub mod station;
pub mod stream;

#[cfg(feature = "pmoconfig")]
pub mod config_ext;

pub use client::{open, ClientBuilder, IcyClient, DEFAULT_USER_AGENT};
pub use demux::{recommended_buffer_len, IcyDemuxer, MAX_METADATA_LEN};
pub use error::{Error, Result};
pub use http::HttpBody;
pub use metadata::IcyMetadata;
pub use observer::{IcyObserver, SharedObserver, SilentObserver, TracingObserver};
pub use station::StationInfo;
pub use stream::{CloseHandle, IcyStream, MetadataCallback};

#[cfg(feature = "pmoconfig")]
pub use config_ext::IcyConfigExt;
