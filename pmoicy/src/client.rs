//! ICY client
//!
//! Opens ICY streams over plain TCP. The client owns the socket so that a
//! [`CloseHandle`](crate::CloseHandle) can shut it down while another
//! thread is blocked reading.
//!
//! # Example
//!
//! ```no_run
//! use std::io::Read;
//! use std::time::Duration;
//! use pmoicy::IcyClient;
//!
//! fn main() -> pmoicy::Result<()> {
//!     let client = IcyClient::builder()
//!         .connect_timeout(Duration::from_secs(3))
//!         .build();
//!
//!     let mut stream = client.open("http://radio.example.com:8000/live")?;
//!     println!("{} ({} kbit/s)", stream.name(), stream.bitrate());
//!
//!     stream.set_metadata_callback(|meta| {
//!         println!("Now playing: {}", meta.stream_title().unwrap_or("?"));
//!     });
//!
//!     let mut buf = vec![0u8; 16 * 1024];
//!     let n = stream.read(&mut buf)?;
//!     println!("read {} audio bytes", n);
//!     Ok(())
//! }
//! ```

use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::http::{self, HttpBody};
use crate::observer::{default_observer, SharedObserver};
use crate::station::StationInfo;
use crate::stream::{IcyStream, ShutdownHook};

/// Default User-Agent; some servers only send metadata to known players
pub const DEFAULT_USER_AGENT: &str = "iTunes/12.9.2 (Macintosh; OS X 10.14.3) AppleWebKit/606.4.5";

/// Default connect timeout (5 seconds)
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Default redirect limit
pub const DEFAULT_MAX_REDIRECTS: usize = 5;

/// ICY stream client
#[derive(Clone)]
pub struct IcyClient {
    user_agent: String,
    connect_timeout: Duration,
    max_redirects: usize,
    observer: SharedObserver,
}

impl IcyClient {
    /// Create a client with default settings
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a builder for configuring the client
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Create a client configured from pmoconfig
    #[cfg(feature = "pmoconfig")]
    pub fn from_config(config: &pmoconfig::Config) -> Result<Self> {
        use crate::config_ext::IcyConfigExt;

        Ok(Self::builder()
            .user_agent(config.get_icy_user_agent()?)
            .connect_timeout(Duration::from_secs(config.get_icy_connect_timeout_secs()?))
            .max_redirects(config.get_icy_max_redirects()?)
            .build())
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    /// Connect to `url` and return a stream positioned at the first audio byte.
    ///
    /// Redirects are followed. The response must carry `icy-br` and
    /// `icy-metaint`.
    pub fn open(&self, url: &str) -> Result<IcyStream<HttpBody>> {
        let mut url = Url::parse(url)?;
        let mut redirects = 0;

        loop {
            self.observer.connecting(&url);
            let mut socket = self.connect(&url)?;
            http::send_request(&mut socket, &url, &self.user_agent)?;
            let (head, leftover) = http::read_response_head(&mut socket)?;

            for (name, value) in head.header_pairs() {
                self.observer.response_header(name, value);
            }

            if head.is_redirect() {
                let location = head
                    .header("location")
                    .ok_or(Error::MissingLocation(head.code))?;
                let next = url.join(location)?;

                redirects += 1;
                if redirects > self.max_redirects {
                    return Err(Error::TooManyRedirects(self.max_redirects));
                }

                self.observer.redirected(&url, &next, head.code);
                url = next;
                continue;
            }

            if !head.is_success() {
                return Err(Error::Status {
                    code: head.code,
                    reason: head.reason,
                });
            }

            if let Some(encoding) = head.header("transfer-encoding") {
                if !encoding.eq_ignore_ascii_case("identity") {
                    return Err(Error::UnsupportedTransferEncoding(encoding.to_string()));
                }
            }

            let station = StationInfo::from_headers(head.header_pairs())?;
            let shutdown = shutdown_hook(&socket)?;
            self.observer.connected(&url, &station);

            let body = HttpBody::new(leftover, socket);
            return IcyStream::build(body, station, self.observer.clone(), Some(shutdown));
        }
    }

    fn connect(&self, url: &Url) -> Result<TcpStream> {
        let addrs = http::socket_addrs(url)?;

        let mut last_error = None;
        for addr in addrs {
            // no read timeout afterwards: live streams can stall for long
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(socket) => return Ok(socket),
                Err(e) => last_error = Some(e),
            }
        }

        Err(Error::Connect {
            url: url.to_string(),
            source: last_error.unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "no address found")
            }),
        })
    }
}

impl Default for IcyClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IcyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IcyClient")
            .field("user_agent", &self.user_agent)
            .field("connect_timeout", &self.connect_timeout)
            .field("max_redirects", &self.max_redirects)
            .finish()
    }
}

/// Shuts a cloned handle of the socket down, which wakes a blocked reader
fn shutdown_hook(socket: &TcpStream) -> Result<ShutdownHook> {
    let handle = socket.try_clone()?;
    Ok(Box::new(move || match handle.shutdown(Shutdown::Both) {
        // the peer may already be gone
        Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
        other => other,
    }))
}

/// Open `url` with a default client
pub fn open(url: &str) -> Result<IcyStream<HttpBody>> {
    IcyClient::new().open(url)
}

/// Builder for IcyClient
pub struct ClientBuilder {
    user_agent: String,
    connect_timeout: Duration,
    max_redirects: usize,
    observer: SharedObserver,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            observer: default_observer(),
        }
    }
}

impl ClientBuilder {
    /// Set the User-Agent sent with each request
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the timeout for establishing the TCP connection
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set how many redirects are followed before giving up
    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Set the observer handed to the client and its streams
    pub fn observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Build the client
    pub fn build(self) -> IcyClient {
        IcyClient {
            user_agent: self.user_agent,
            // a zero timeout makes connect_timeout fail immediately
            connect_timeout: self.connect_timeout.max(Duration::from_millis(1)),
            max_redirects: self.max_redirects,
            observer: self.observer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let client = IcyClient::new();
        assert_eq!(client.user_agent(), DEFAULT_USER_AGENT);
        assert_eq!(client.connect_timeout(), Duration::from_secs(5));
        assert_eq!(client.max_redirects(), 5);
    }

    #[test]
    fn test_builder_overrides() {
        let client = IcyClient::builder()
            .user_agent("test/1.0")
            .connect_timeout(Duration::ZERO)
            .max_redirects(0)
            .build();
        assert_eq!(client.user_agent(), "test/1.0");
        assert_eq!(client.connect_timeout(), Duration::from_millis(1));
        assert_eq!(client.max_redirects(), 0);
    }

    #[test]
    fn test_rejects_bad_urls() {
        assert!(matches!(open("not a url"), Err(Error::InvalidUrl(_))));
        assert!(matches!(
            open("https://radio.example.com/stream"),
            Err(Error::UnsupportedScheme(_))
        ));
    }
}
