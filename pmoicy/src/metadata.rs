//! ICY metadata snapshots.
//!
//! A metadata block carries `key='value';` segments right-padded with NUL
//! bytes, for example `StreamTitle='Artist - Title';StreamUrl='';`.
//! [`IcyMetadata`] is the decoded, immutable form of one block; two
//! snapshots are equal when their decoded fields are equal, whatever the
//! padding of the blocks they came from.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::demux::{MAX_METADATA_LEN, METADATA_LENGTH_UNIT};
use crate::error::{Error, Result};

/// Key holding the "Artist - Title" announcement
pub const STREAM_TITLE: &str = "StreamTitle";

/// Key holding an optional URL (artwork, station page)
pub const STREAM_URL: &str = "StreamUrl";

const TITLE_SEPARATOR: &str = " - ";

/// Decoded content of one ICY metadata block
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IcyMetadata {
    fields: BTreeMap<String, String>,
}

impl IcyMetadata {
    /// Decode a raw metadata payload (without its length byte)
    pub fn parse(raw: &[u8]) -> Self {
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        let text = decode_text(&raw[..end]);
        Self::parse_str(&text)
    }

    /// Decode metadata text such as `StreamTitle='a - b';`
    pub fn parse_str(text: &str) -> Self {
        let mut fields = BTreeMap::new();
        let mut rest = text;

        while !rest.is_empty() {
            let Some(eq) = rest.find('=') else { break };
            let key = rest[..eq].trim().trim_start_matches(';').trim();
            let after = &rest[eq + 1..];

            let (value, next) = match after.strip_prefix('\'') {
                Some(quoted) => match quoted.find("';") {
                    Some(close) => (&quoted[..close], &quoted[close + 2..]),
                    None => {
                        let close = quoted.rfind('\'').unwrap_or(quoted.len());
                        (&quoted[..close], "")
                    }
                },
                // unquoted value, runs to the next separator
                None => match after.find(';') {
                    Some(close) => (&after[..close], &after[close + 1..]),
                    None => (after, ""),
                },
            };

            if !key.is_empty() {
                fields.insert(key.to_string(), value.to_string());
            }
            rest = next;
        }

        Self { fields }
    }

    /// Build a snapshot from key/value pairs
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Snapshot holding only a `StreamTitle`
    pub fn with_title(title: impl Into<String>) -> Self {
        Self::from_pairs([(STREAM_TITLE, title.into())])
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn stream_title(&self) -> Option<&str> {
        self.get(STREAM_TITLE)
    }

    pub fn stream_url(&self) -> Option<&str> {
        self.get(STREAM_URL).filter(|url| !url.is_empty())
    }

    /// Artist part of `StreamTitle`, when it follows the `Artist - Title` convention
    pub fn artist(&self) -> Option<&str> {
        let title = self.stream_title()?;
        title
            .split_once(TITLE_SEPARATOR)
            .map(|(artist, _)| artist.trim())
            .filter(|artist| !artist.is_empty())
    }

    /// Title part of `StreamTitle`, or the whole announcement without a separator
    pub fn title(&self) -> Option<&str> {
        let title = self.stream_title()?;
        let title = match title.split_once(TITLE_SEPARATOR) {
            Some((_, title)) => title,
            None => title,
        };
        Some(title.trim()).filter(|title| !title.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Encode as a complete ICY block: length byte plus NUL-padded payload.
    ///
    /// `StreamTitle` is written first, as players expect, then the other
    /// keys in order.
    pub fn to_block(&self) -> Result<Vec<u8>> {
        let text = self.to_string();
        let length = text.len();
        if length > MAX_METADATA_LEN {
            return Err(Error::MetadataTooLong(length));
        }

        let padded = length.div_ceil(METADATA_LENGTH_UNIT) * METADATA_LENGTH_UNIT;
        let mut block = Vec::with_capacity(1 + padded);
        block.push((padded / METADATA_LENGTH_UNIT) as u8);
        block.extend_from_slice(text.as_bytes());
        block.resize(1 + padded, 0);
        Ok(block)
    }
}

impl fmt::Display for IcyMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(title) = self.stream_title() {
            write!(f, "{}='{}';", STREAM_TITLE, title)?;
        }
        for (key, value) in self.iter().filter(|(key, _)| *key != STREAM_TITLE) {
            write!(f, "{}='{}';", key, value)?;
        }
        Ok(())
    }
}

/// UTF-8 when valid, Latin-1 otherwise (common on SHOUTcast servers)
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}
