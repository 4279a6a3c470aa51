//! Minimal HTTP/1.0 exchange for ICY servers.
//!
//! ICY servers answer either with a regular `HTTP/1.x` status line or with
//! `ICY 200 OK`, which general-purpose HTTP clients reject. This module
//! writes the request by hand and parses the response head with `httparse`,
//! rewriting a leading `ICY ` into `HTTP/1.0 ` first.

use std::borrow::Cow;
use std::cmp;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};

use httparse::{Response, Status};
use url::Url;

use crate::error::{Error, Result};

/// Upper bound for the response status line plus headers
pub const MAX_HEADER_BYTES: usize = 16 * 1024;

const MAX_HEADERS: usize = 64;
const DEFAULT_HTTP_PORT: u16 = 80;
const ICY_STATUS_PREFIX: &[u8] = b"ICY ";
const HTTP10_STATUS_PREFIX: &[u8] = b"HTTP/1.0 ";

/// Status line and headers of a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResponseHead {
    pub code: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// First header named `name`, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn header_pairs(&self) -> impl Iterator<Item = (&str, &str)> + Clone {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.code, 301 | 302 | 303 | 307 | 308)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

/// Addresses to connect to for `url`. Only `http` is accepted.
///
/// IP literals (including bracketed IPv6 hosts) are used as is, names are
/// resolved.
pub(crate) fn socket_addrs(url: &Url) -> Result<Vec<SocketAddr>> {
    if url.scheme() != "http" {
        return Err(Error::UnsupportedScheme(url.scheme().to_string()));
    }
    if url.host().is_none() {
        return Err(Error::InvalidUrl(url::ParseError::EmptyHost));
    }
    url.socket_addrs(|| Some(DEFAULT_HTTP_PORT))
        .map_err(|source| Error::Connect {
            url: url.to_string(),
            source,
        })
}

/// Request bytes for an ICY stream
pub(crate) fn build_request(url: &Url, user_agent: &str) -> String {
    let mut target = url.path().to_string();
    if target.is_empty() {
        target.push('/');
    }
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }

    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    };

    format!(
        "GET {} HTTP/1.0\r\n\
         Host: {}\r\n\
         Accept: */*\r\n\
         User-Agent: {}\r\n\
         Icy-MetaData: 1\r\n\
         Connection: close\r\n\
         \r\n",
        target, host, user_agent
    )
}

pub(crate) fn send_request<W: Write>(writer: &mut W, url: &Url, user_agent: &str) -> Result<()> {
    writer.write_all(build_request(url, user_agent).as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Read and parse the response head.
///
/// Returns the head and the body bytes that were read along with it.
pub(crate) fn read_response_head<R: Read>(reader: &mut R) -> Result<(ResponseHead, Vec<u8>)> {
    let mut buf = vec![0u8; MAX_HEADER_BYTES];
    let mut filled = 0;

    loop {
        if filled == buf.len() {
            return Err(Error::HeadersTooLarge(MAX_HEADER_BYTES));
        }

        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            return Err(Error::IncompleteResponse);
        }
        filled += n;

        if filled < ICY_STATUS_PREFIX.len() {
            continue;
        }

        if let Some((head, len)) = parse_head(&buf[..filled])? {
            return Ok((head, buf[len..filled].to_vec()));
        }
    }
}

/// `Some((head, head_len))` once the head is complete
fn parse_head(raw: &[u8]) -> Result<Option<(ResponseHead, usize)>> {
    // `ICY 200 OK` is HTTP/1.0 with another name
    let (text, shift) = if raw.starts_with(ICY_STATUS_PREFIX) {
        let mut rewritten = HTTP10_STATUS_PREFIX.to_vec();
        rewritten.extend_from_slice(&raw[ICY_STATUS_PREFIX.len()..]);
        let shift = HTTP10_STATUS_PREFIX.len() - ICY_STATUS_PREFIX.len();
        (Cow::Owned(rewritten), shift)
    } else {
        (Cow::Borrowed(raw), 0)
    };

    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = Response::new(&mut headers);

    match response.parse(&text)? {
        Status::Partial => Ok(None),
        Status::Complete(len) => {
            let head = ResponseHead {
                code: response.code.unwrap_or_default(),
                reason: response.reason.unwrap_or_default().to_string(),
                headers: response
                    .headers
                    .iter()
                    .map(|h| {
                        (
                            h.name.to_string(),
                            String::from_utf8_lossy(h.value).trim().to_string(),
                        )
                    })
                    .collect(),
            };
            Ok(Some((head, len - shift)))
        }
    }
}

/// Response body of an ICY connection.
///
/// Replays the bytes read together with the response head, then reads
/// straight from the socket.
pub struct HttpBody {
    prefix: Vec<u8>,
    position: usize,
    stream: TcpStream,
}

impl HttpBody {
    pub(crate) fn new(prefix: Vec<u8>, stream: TcpStream) -> Self {
        Self {
            prefix,
            position: 0,
            stream,
        }
    }
}

impl Read for HttpBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.position < self.prefix.len() && !buf.is_empty() {
            let to_copy = cmp::min(self.prefix.len() - self.position, buf.len());
            buf[..to_copy].copy_from_slice(&self.prefix[self.position..self.position + to_copy]);
            self.position += to_copy;
            if self.position == self.prefix.len() {
                self.prefix = Vec::new();
                self.position = 0;
            }
            return Ok(to_copy);
        }

        self.stream.read(buf)
    }
}

impl std::fmt::Debug for HttpBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBody")
            .field("buffered", &(self.prefix.len() - self.position))
            .field("peer", &self.stream.peer_addr().ok())
            .finish()
    }
}
