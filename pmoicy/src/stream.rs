//! The caller-facing ICY stream.
//!
//! [`IcyStream`] wraps a raw ICY body and implements [`Read`] over its
//! audio only. Metadata blocks are decoded as they go by; each snapshot
//! that differs from the previous one is handed to the metadata callback,
//! synchronously, inside the `read` call that completed the block.
//!
//! # Closing
//!
//! [`IcyStream::close`] releases the source. A read blocked on a silent
//! server can be aborted from another thread through a [`CloseHandle`]:
//!
//! ```no_run
//! # fn main() -> pmoicy::Result<()> {
//! use std::io::Read;
//!
//! let mut stream = pmoicy::open("http://radio.example.com/stream")?;
//! let handle = stream.close_handle();
//! std::thread::spawn(move || {
//!     std::thread::sleep(std::time::Duration::from_secs(30));
//!     let _ = handle.close();
//! });
//!
//! let mut buf = vec![0u8; 16 * 1024];
//! while stream.read(&mut buf)? > 0 {}
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, TrySendError};
use tracing::debug;

use crate::demux::IcyDemuxer;
use crate::error::Result;
use crate::metadata::IcyMetadata;
use crate::observer::{default_observer, IcyObserver, SharedObserver};
use crate::station::StationInfo;

/// Callback invoked with every new metadata snapshot
pub type MetadataCallback = Box<dyn FnMut(&IcyMetadata) + Send>;

/// Hook that tears the underlying connection down
pub(crate) type ShutdownHook = Box<dyn Fn() -> io::Result<()> + Send + Sync>;

/// Closes the source exactly once, whoever asks first.
///
/// The winner of the flag reports the close to the observer.
struct SourceCloser {
    closed: AtomicBool,
    shutdown: Option<ShutdownHook>,
    observer: SharedObserver,
    station: StationInfo,
}

impl SourceCloser {
    fn new(shutdown: Option<ShutdownHook>, observer: SharedObserver, station: StationInfo) -> Self {
        Self {
            closed: AtomicBool::new(false),
            shutdown,
            observer,
            station,
        }
    }

    fn close(&self) -> io::Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.observer.closing(&self.station);
        match &self.shutdown {
            Some(shutdown) => shutdown(),
            None => Ok(()),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Thread-safe handle closing an [`IcyStream`] from elsewhere.
///
/// Closing through the handle unblocks a read in progress on a network
/// stream, which then reports end of stream.
#[derive(Clone)]
pub struct CloseHandle {
    closer: Arc<SourceCloser>,
}

impl CloseHandle {
    /// Close the stream. Only the first close, through any handle or the
    /// stream itself, reaches the source; later calls return `Ok(())`.
    pub fn close(&self) -> io::Result<()> {
        self.closer.close()
    }

    pub fn is_closed(&self) -> bool {
        self.closer.is_closed()
    }
}

impl fmt::Debug for CloseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Last snapshot and change notification
#[derive(Default)]
struct MetadataTracker {
    last: Option<IcyMetadata>,
    callback: Option<MetadataCallback>,
    blocks: u64,
}

impl MetadataTracker {
    fn observe(&mut self, raw: &[u8], observer: &dyn IcyObserver) {
        self.blocks += 1;
        let metadata = IcyMetadata::parse(raw);
        if self.last.as_ref() == Some(&metadata) {
            return;
        }

        observer.metadata_changed(&metadata);
        if let Some(callback) = self.callback.as_mut() {
            callback(&metadata);
        }
        self.last = Some(metadata);
    }
}

/// An open ICY stream yielding audio bytes only
pub struct IcyStream<R> {
    station: StationInfo,
    source: Option<R>,
    demuxer: IcyDemuxer,
    tracker: MetadataTracker,
    closer: Arc<SourceCloser>,
    observer: SharedObserver,
    audio_bytes: u64,
}

impl<R: Read> IcyStream<R> {
    /// Wrap a raw ICY body described by `station`.
    ///
    /// Fails if `station.metaint` is zero.
    pub fn new(source: R, station: StationInfo, observer: SharedObserver) -> Result<Self> {
        Self::build(source, station, observer, None)
    }

    /// Wrap a raw ICY body with a known metadata interval
    pub fn from_reader(source: R, metaint: usize) -> Result<Self> {
        Self::new(source, StationInfo::with_metaint(metaint), default_observer())
    }

    pub(crate) fn build(
        source: R,
        station: StationInfo,
        observer: SharedObserver,
        shutdown: Option<ShutdownHook>,
    ) -> Result<Self> {
        let demuxer = IcyDemuxer::new(station.metaint)?;
        let closer = SourceCloser::new(shutdown, observer.clone(), station.clone());
        Ok(Self {
            station,
            source: Some(source),
            demuxer,
            tracker: MetadataTracker::default(),
            closer: Arc::new(closer),
            observer,
            audio_bytes: 0,
        })
    }
}

impl<R> IcyStream<R> {
    /// Everything the server announced about itself
    pub fn station(&self) -> &StationInfo {
        &self.station
    }

    /// The name of the server
    pub fn name(&self) -> &str {
        &self.station.name
    }

    /// What category the server falls under
    pub fn genre(&self) -> &str {
        &self.station.genre
    }

    /// The description of the stream
    pub fn description(&self) -> &str {
        &self.station.description
    }

    /// Homepage of the server
    pub fn url(&self) -> &str {
        &self.station.url
    }

    /// Bitrate of the server
    pub fn bitrate(&self) -> u32 {
        self.station.bitrate
    }

    /// Amount of audio bytes between metadata blocks
    pub fn metaint(&self) -> usize {
        self.station.metaint
    }

    /// Latest metadata snapshot, `None` until the first announcement
    pub fn metadata(&self) -> Option<&IcyMetadata> {
        self.tracker.last.as_ref()
    }

    /// Audio bytes consumed since the last metadata block
    pub fn position(&self) -> usize {
        self.demuxer.position()
    }

    /// Audio bytes delivered so far
    pub fn audio_bytes(&self) -> u64 {
        self.audio_bytes
    }

    /// Non-empty metadata blocks decoded so far, changed or not
    pub fn metadata_blocks(&self) -> u64 {
        self.tracker.blocks
    }

    /// Run `callback` whenever the metadata changes.
    ///
    /// The callback runs on the reading thread before `read` returns, so a
    /// slow callback delays audio. Use [`subscribe_metadata`] to decouple.
    ///
    /// [`subscribe_metadata`]: IcyStream::subscribe_metadata
    pub fn set_metadata_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&IcyMetadata) + Send + 'static,
    {
        self.tracker.callback = Some(Box::new(callback));
    }

    pub fn clear_metadata_callback(&mut self) {
        self.tracker.callback = None;
    }

    /// Deliver metadata changes through a bounded queue instead of a callback.
    ///
    /// Replaces any callback. The current snapshot, if any, is queued first.
    /// When the consumer falls `capacity` snapshots behind, the oldest queued
    /// snapshot is dropped (and reported to the observer) rather than
    /// stalling audio, so the queue always ends with the current snapshot.
    pub fn subscribe_metadata(&mut self, capacity: usize) -> Receiver<IcyMetadata> {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        if let Some(current) = &self.tracker.last {
            let _ = tx.try_send(current.clone());
        }

        let observer = self.observer.clone();
        let queue = rx.clone();
        self.set_metadata_callback(move |metadata| {
            let mut pending = metadata.clone();
            loop {
                match tx.try_send(pending) {
                    Ok(()) | Err(TrySendError::Disconnected(_)) => break,
                    Err(TrySendError::Full(back)) => {
                        if let Ok(stale) = queue.try_recv() {
                            observer.metadata_dropped(&stale);
                        }
                        pending = back;
                    }
                }
            }
        });
        rx
    }

    /// Handle able to close this stream from another thread
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            closer: self.closer.clone(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closer.is_closed()
    }

    /// Close the stream and release the source.
    ///
    /// Idempotent; the error of the first effective close is returned.
    pub fn close(&mut self) -> io::Result<()> {
        if self.source.is_none() {
            return Ok(());
        }
        let result = self.closer.close();
        self.source = None;
        result
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "ICY stream closed")
}

impl<R: Read> Read for IcyStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if self.closer.is_closed() {
                return Err(closed_error());
            }
            let source = self.source.as_mut().ok_or_else(closed_error)?;

            let n = source.read(buf)?;
            if n == 0 {
                if let Some((held, expected)) = self.demuxer.pending_payload() {
                    self.observer.truncated_block(held, expected);
                }
                return Ok(0);
            }

            let tracker = &mut self.tracker;
            let observer = self.observer.as_ref();
            let audio = self
                .demuxer
                .demux(&mut buf[..n], |raw| tracker.observe(raw, observer));
            self.audio_bytes += audio as u64;

            // Ok(0) would read as end of stream: keep going until audio shows up.
            if audio > 0 {
                return Ok(audio);
            }
        }
    }
}

impl<R> Drop for IcyStream<R> {
    fn drop(&mut self) {
        if self.source.is_some() {
            if let Err(e) = self.closer.close() {
                debug!(error = %e, "Failed to shut ICY source down on drop");
            }
        }
    }
}

impl<R> fmt::Debug for IcyStream<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IcyStream")
            .field("station", &self.station)
            .field("demuxer", &self.demuxer)
            .field("metadata", &self.tracker.last)
            .field("audio_bytes", &self.audio_bytes)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::SilentObserver;
    use std::io::Cursor;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn stream(bytes: Vec<u8>, metaint: usize) -> IcyStream<Cursor<Vec<u8>>> {
        IcyStream::new(
            Cursor::new(bytes),
            StationInfo::with_metaint(metaint),
            Arc::new(SilentObserver),
        )
        .unwrap()
    }

    #[derive(Default)]
    struct Recorder {
        dropped: Mutex<Vec<String>>,
        closing: AtomicUsize,
    }

    impl IcyObserver for Recorder {
        fn metadata_dropped(&self, metadata: &IcyMetadata) {
            self.dropped.lock().unwrap().push(metadata.to_string());
        }

        fn closing(&self, _station: &StationInfo) {
            self.closing.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_empty_buffer_does_not_touch_source() {
        let mut s = stream(b"abc".to_vec(), 10);
        assert_eq!(s.read(&mut []).unwrap(), 0);
        assert_eq!(s.position(), 0);
    }

    #[test]
    fn test_metadata_only_chunk_is_skipped() {
        let mut bytes = b"ab".to_vec();
        bytes.extend(IcyMetadata::with_title("T").to_block().unwrap());
        bytes.extend_from_slice(b"cd");
        let mut s = stream(bytes, 2);

        let mut buf = [0u8; 2];
        assert_eq!(s.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"ab");

        // the next raw reads carry only the block, the stream must not report EOF
        let n = s.read(&mut buf).unwrap();
        assert!(n > 0);
        assert_eq!(buf[0], b'c');
        assert_eq!(s.metadata(), Some(&IcyMetadata::with_title("T")));

        let mut rest = buf[..n].to_vec();
        s.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"cd");
    }

    #[test]
    fn test_close_is_idempotent_and_runs_hook_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let hook: ShutdownHook = Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let mut s = IcyStream::build(
            Cursor::new(vec![0u8; 8]),
            StationInfo::with_metaint(4),
            Arc::new(SilentObserver),
            Some(hook),
        )
        .unwrap();

        let handle = s.close_handle();
        handle.close().unwrap();
        handle.close().unwrap();
        s.close().unwrap();
        s.close().unwrap();
        drop(s);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handle.is_closed());
    }

    #[test]
    fn test_close_error_is_surfaced_once() {
        let hook: ShutdownHook =
            Box::new(|| Err(io::Error::new(io::ErrorKind::Other, "shutdown failed")));
        let mut s = IcyStream::build(
            Cursor::new(Vec::new()),
            StationInfo::with_metaint(4),
            Arc::new(SilentObserver),
            Some(hook),
        )
        .unwrap();

        assert!(s.close().is_err());
        assert!(s.close().is_ok());
    }

    #[test]
    fn test_read_after_close_fails() {
        let mut s = stream(b"abcdef".to_vec(), 100);
        s.close().unwrap();
        let err = s.read(&mut [0u8; 4]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn test_subscribe_replays_current_snapshot() {
        let mut bytes = b"a".to_vec();
        bytes.extend(IcyMetadata::with_title("first").to_block().unwrap());
        bytes.extend_from_slice(b"b");
        let mut s = stream(bytes, 1);

        let mut buf = [0u8; 64];
        s.read(&mut buf).unwrap();
        let rx = s.subscribe_metadata(4);
        assert_eq!(rx.try_recv().unwrap().title(), Some("first"));
    }

    #[test]
    fn test_full_queue_keeps_latest_snapshot() {
        let mut bytes = Vec::new();
        for title in ["one", "two", "three"] {
            bytes.push(b'x');
            bytes.extend(IcyMetadata::with_title(title).to_block().unwrap());
        }
        bytes.push(b'x');

        let recorder = Arc::new(Recorder::default());
        let mut s = IcyStream::new(
            Cursor::new(bytes),
            StationInfo::with_metaint(1),
            recorder.clone(),
        )
        .unwrap();
        let rx = s.subscribe_metadata(1);

        let mut audio = Vec::new();
        s.read_to_end(&mut audio).unwrap();
        assert_eq!(audio, b"xxxx");

        let last = rx.try_recv().unwrap();
        assert_eq!(last.title(), Some("three"));
        assert_eq!(Some(&last), s.metadata());
        assert!(rx.try_recv().is_err());
        assert_eq!(
            *recorder.dropped.lock().unwrap(),
            vec!["StreamTitle='one';".to_string(), "StreamTitle='two';".to_string()]
        );
    }

    #[test]
    fn test_closing_reported_once() {
        let recorder = Arc::new(Recorder::default());
        let mut s = IcyStream::new(
            Cursor::new(vec![0u8; 8]),
            StationInfo::with_metaint(4),
            recorder.clone(),
        )
        .unwrap();

        let handle = s.close_handle();
        handle.close().unwrap();
        assert_eq!(recorder.closing.load(Ordering::SeqCst), 1);

        s.close().unwrap();
        drop(s);
        assert_eq!(recorder.closing.load(Ordering::SeqCst), 1);

        let recorder = Arc::new(Recorder::default());
        let s = IcyStream::new(
            Cursor::new(vec![0u8; 8]),
            StationInfo::with_metaint(4),
            recorder.clone(),
        )
        .unwrap();
        drop(s);
        assert_eq!(recorder.closing.load(Ordering::SeqCst), 1);
    }
}
