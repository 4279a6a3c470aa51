//! Error types for the ICY client

use std::io;

/// Result type alias for ICY operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when opening or configuring an ICY stream
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Only plain `http` streams are supported
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// Transport-level connection failed (including connect timeout)
    #[error("Cannot connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: io::Error,
    },

    /// IO error on an established connection
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Malformed response head
    #[error("Malformed response: {0}")]
    Http(#[from] httparse::Error),

    /// Response head did not fit in the header buffer
    #[error("Response headers exceed {0} bytes")]
    HeadersTooLarge(usize),

    /// Connection closed before the response head was complete
    #[error("Connection closed before response headers were received")]
    IncompleteResponse,

    /// Server answered with a non-success status
    #[error("Server returned status {code} {reason}")]
    Status { code: u16, reason: String },

    /// Redirect without a usable `Location`
    #[error("Redirect status {0} without Location header")]
    MissingLocation(u16),

    /// Redirect chain too long
    #[error("Too many redirects (limit {0})")]
    TooManyRedirects(usize),

    /// Body framing that the ICY client does not decode
    #[error("Unsupported transfer encoding: {0}")]
    UnsupportedTransferEncoding(String),

    /// Required ICY header absent from the response
    #[error("Missing required header: {0}")]
    MissingHeader(&'static str),

    /// Required ICY header present but not numeric
    #[error("Cannot parse header {name}: {value:?}")]
    InvalidHeader { name: &'static str, value: String },

    /// Metadata interval must be positive
    #[error("Invalid metadata interval: {0}")]
    InvalidMetaint(usize),

    /// Metadata text does not fit in one ICY block
    #[error("Metadata text is {0} bytes, ICY blocks hold at most 4080")]
    MetadataTooLong(usize),

    /// Configuration error (from pmoconfig/anyhow)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),
}
