//! In-place removal of ICY metadata blocks from an audio byte stream.
//!
//! An ICY body is a repetition of
//! `[metaint bytes of audio][1 length byte][length × 16 bytes of metadata]`.
//! [`IcyDemuxer`] walks caller buffers through that layout and keeps enough
//! state between calls to resume anywhere: in the middle of an audio frame,
//! right before a length byte, or halfway through a metadata payload.
//!
//! The demuxer does no I/O and has no side effects. Complete metadata
//! payloads are handed to a closure; decoding and change detection live in
//! [`crate::stream`].

use crate::error::{Error, Result};

/// Metadata lengths are expressed in units of 16 bytes
pub const METADATA_LENGTH_UNIT: usize = 16;

/// Largest payload a single length byte can announce (255 × 16)
pub const MAX_METADATA_LEN: usize = u8::MAX as usize * METADATA_LENGTH_UNIT;

/// Buffer length that always holds a full audio frame plus a full block.
///
/// Any non-empty buffer makes progress; this size only guarantees that a
/// read never has to carry a metadata payload over to the next call.
pub fn recommended_buffer_len(metaint: usize) -> usize {
    metaint + 1 + MAX_METADATA_LEN
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DemuxState {
    /// `remaining` audio bytes until the next length byte
    Audio { remaining: usize },
    /// Next byte is a block-length byte
    LengthByte,
    /// Collecting an `expected`-byte payload, `held` already buffered
    Metadata { expected: usize },
}

/// Stateful ICY demultiplexer.
///
/// ```
/// use pmoicy::IcyDemuxer;
///
/// let mut demuxer = IcyDemuxer::new(4).unwrap();
/// let mut buf = *b"abcd\x00efgh";
/// let n = demuxer.demux(&mut buf, |_| unreachable!());
/// assert_eq!(&buf[..n], b"abcdefgh");
/// ```
#[derive(Debug, Clone)]
pub struct IcyDemuxer {
    metaint: usize,
    state: DemuxState,
    held: Vec<u8>,
}

impl IcyDemuxer {
    /// Create a demuxer for a stream announcing `icy-metaint: metaint`
    pub fn new(metaint: usize) -> Result<Self> {
        if metaint == 0 {
            return Err(Error::InvalidMetaint(metaint));
        }
        Ok(Self {
            metaint,
            state: DemuxState::Audio { remaining: metaint },
            held: Vec::new(),
        })
    }

    /// Audio bytes between two metadata blocks
    pub fn metaint(&self) -> usize {
        self.metaint
    }

    /// Audio bytes consumed since the last metadata block, in `0..=metaint`
    pub fn position(&self) -> usize {
        match self.state {
            DemuxState::Audio { remaining } => self.metaint - remaining,
            DemuxState::LengthByte | DemuxState::Metadata { .. } => self.metaint,
        }
    }

    /// `(held, expected)` while a metadata payload is incomplete
    pub fn pending_payload(&self) -> Option<(usize, usize)> {
        match self.state {
            DemuxState::Metadata { expected } => Some((self.held.len(), expected)),
            _ => None,
        }
    }

    /// Strip metadata from `buf` in place.
    ///
    /// Returns the number of audio bytes now at the front of `buf`. Every
    /// complete, non-empty metadata payload is passed to `on_block`, in
    /// stream order, before this call returns. Payloads include their null
    /// padding.
    pub fn demux<F>(&mut self, buf: &mut [u8], mut on_block: F) -> usize
    where
        F: FnMut(&[u8]),
    {
        let len = buf.len();

        // Fast path: the whole chunk belongs to the current audio frame.
        if let DemuxState::Audio { remaining } = self.state {
            if len < remaining {
                self.state = DemuxState::Audio {
                    remaining: remaining - len,
                };
                return len;
            }
        }

        let mut read = 0;
        let mut write = 0;

        while read < len {
            match self.state {
                DemuxState::Audio { remaining } => {
                    let take = remaining.min(len - read);
                    if write != read {
                        buf.copy_within(read..read + take, write);
                    }
                    read += take;
                    write += take;
                    self.state = if take == remaining {
                        DemuxState::LengthByte
                    } else {
                        DemuxState::Audio {
                            remaining: remaining - take,
                        }
                    };
                }
                DemuxState::LengthByte => {
                    let expected = buf[read] as usize * METADATA_LENGTH_UNIT;
                    read += 1;
                    self.state = if expected == 0 {
                        DemuxState::Audio {
                            remaining: self.metaint,
                        }
                    } else {
                        self.held.clear();
                        DemuxState::Metadata { expected }
                    };
                }
                DemuxState::Metadata { expected } => {
                    let available = len - read;
                    if self.held.is_empty() && available >= expected {
                        // whole payload in this chunk, decode without copying
                        on_block(&buf[read..read + expected]);
                        read += expected;
                    } else {
                        let take = (expected - self.held.len()).min(available);
                        self.held.extend_from_slice(&buf[read..read + take]);
                        read += take;
                        if self.held.len() < expected {
                            continue;
                        }
                        on_block(&self.held);
                        self.held.clear();
                    }
                    self.state = DemuxState::Audio {
                        remaining: self.metaint,
                    };
                }
            }
        }

        write
    }
}
