//! Station description taken from the ICY response headers.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const HEADER_NAME: &str = "icy-name";
pub const HEADER_GENRE: &str = "icy-genre";
pub const HEADER_DESCRIPTION: &str = "icy-description";
pub const HEADER_URL: &str = "icy-url";
pub const HEADER_BITRATE: &str = "icy-br";
pub const HEADER_METAINT: &str = "icy-metaint";
pub const HEADER_CONTENT_TYPE: &str = "content-type";

/// Descriptive and numeric fields announced by the server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationInfo {
    /// The name of the server
    pub name: String,
    /// What category the server falls under
    pub genre: String,
    /// The description of the stream
    pub description: String,
    /// Homepage of the server
    pub url: String,
    /// Bitrate in kbit/s
    pub bitrate: u32,
    /// Audio bytes between metadata blocks
    pub metaint: usize,
    /// MIME type of the audio, when announced
    pub content_type: Option<String>,
}

impl StationInfo {
    /// Station with only a metadata interval, for streams built by hand
    pub fn with_metaint(metaint: usize) -> Self {
        Self {
            metaint,
            ..Self::default()
        }
    }

    /// Extract station fields from response headers.
    ///
    /// Header names are matched case-insensitively. `icy-br` and
    /// `icy-metaint` are required; the descriptive headers default to
    /// empty strings.
    pub fn from_headers<'a, I>(headers: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)> + Clone,
    {
        let find = |name: &str| -> Option<String> {
            headers
                .clone()
                .into_iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.trim().to_string())
        };

        let bitrate = parse_bitrate(find(HEADER_BITRATE))?;
        let metaint = parse_metaint(find(HEADER_METAINT))?;

        Ok(Self {
            name: find(HEADER_NAME).unwrap_or_default(),
            genre: find(HEADER_GENRE).unwrap_or_default(),
            description: find(HEADER_DESCRIPTION).unwrap_or_default(),
            url: find(HEADER_URL).unwrap_or_default(),
            bitrate,
            metaint,
            content_type: find(HEADER_CONTENT_TYPE).filter(|ct| !ct.is_empty()),
        })
    }
}

// Some servers repeat the bitrate per channel, e.g. `128,128`.
fn parse_bitrate(value: Option<String>) -> Result<u32> {
    let value = value.ok_or(Error::MissingHeader(HEADER_BITRATE))?;
    let first = value.split(',').next().unwrap_or_default().trim();
    first.parse::<u32>().map_err(|_| Error::InvalidHeader {
        name: HEADER_BITRATE,
        value: value.clone(),
    })
}

fn parse_metaint(value: Option<String>) -> Result<usize> {
    let value = value.ok_or(Error::MissingHeader(HEADER_METAINT))?;
    match value.parse::<usize>() {
        Ok(0) => Err(Error::InvalidMetaint(0)),
        Ok(metaint) => Ok(metaint),
        Err(_) => Err(Error::InvalidHeader {
            name: HEADER_METAINT,
            value,
        }),
    }
}
