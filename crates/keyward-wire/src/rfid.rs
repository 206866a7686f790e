//! RFID reader framing
//!
//! Frame = 4 payload bytes (tag id, big-endian) + 1 checksum byte
//!
//! The reader streams frames with no delimiter, so boundaries are inferred
//! from byte count and checksum alone. Partial and garbled reads are normal
//! reader noise and are discarded without escalation.

use std::collections::VecDeque;
use std::time::Duration;

use keyward_core::{KeywardError, KeywardResult, TagId, Timestamp};

/// Payload size
pub const PAYLOAD_LEN: usize = 4;

/// Payload + checksum
pub const FRAME_LEN: usize = PAYLOAD_LEN + 1;

/// How long a partial frame may wait for the rest of its bytes
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Non-blocking byte stream from the reader
pub trait ByteSource {
    /// Bytes that can be read without waiting
    fn available(&self) -> usize;

    /// Read up to `buf.len()` bytes, returning how many were read
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Discard everything buffered right now. Returns the discarded count.
    fn flush(&mut self) -> usize {
        let mut remaining = self.available();
        let mut scratch = [0u8; 32];
        let mut flushed = 0;
        while remaining > 0 {
            let want = remaining.min(scratch.len());
            let n = self.read(&mut scratch[..want]);
            if n == 0 {
                break;
            }
            flushed += n;
            remaining -= n;
        }
        flushed
    }
}

impl ByteSource for VecDeque<u8> {
    fn available(&self) -> usize {
        self.len()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.len());
        for (slot, byte) in buf.iter_mut().zip(self.drain(..n)) {
            *slot = byte;
        }
        n
    }
}

/// One reader frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TagFrame {
    pub payload: [u8; PAYLOAD_LEN],
    pub checksum: u8,
}

impl TagFrame {
    /// Build a well-formed frame for a tag
    pub fn for_tag(tag: TagId) -> Self {
        let payload = tag.to_be_bytes();
        TagFrame {
            payload,
            checksum: Self::checksum_of(&payload),
        }
    }

    /// XOR of the payload bytes
    #[inline]
    pub fn checksum_of(payload: &[u8; PAYLOAD_LEN]) -> u8 {
        payload.iter().fold(0u8, |acc, b| acc ^ b)
    }

    /// Split raw bytes into payload and checksum without validating
    pub fn from_bytes(buf: &[u8]) -> KeywardResult<Self> {
        if buf.len() != FRAME_LEN {
            return Err(KeywardError::BufferTooShort {
                expected: FRAME_LEN,
                actual: buf.len(),
            });
        }
        let mut payload = [0u8; PAYLOAD_LEN];
        payload.copy_from_slice(&buf[..PAYLOAD_LEN]);
        Ok(TagFrame {
            payload,
            checksum: buf[PAYLOAD_LEN],
        })
    }

    /// Parse and validate raw bytes into a tag id
    pub fn parse(buf: &[u8]) -> KeywardResult<TagId> {
        let frame = Self::from_bytes(buf)?;
        frame.validate()?;
        Ok(frame.tag())
    }

    pub fn validate(&self) -> KeywardResult<()> {
        let expected = Self::checksum_of(&self.payload);
        if expected != self.checksum {
            return Err(KeywardError::FrameChecksum {
                expected,
                actual: self.checksum,
            });
        }
        Ok(())
    }

    /// The payload as a tag id. The checksum never alters it.
    #[inline]
    pub fn tag(&self) -> TagId {
        TagId::from_be_bytes(self.payload)
    }

    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let mut buf = [0u8; FRAME_LEN];
        buf[..PAYLOAD_LEN].copy_from_slice(&self.payload);
        buf[PAYLOAD_LEN] = self.checksum;
        buf
    }
}

/// A validated swipe
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TagRead {
    pub tag: TagId,
    pub at: Timestamp,
}

/// Result of one decode attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// Fewer than a frame's worth of bytes buffered; nothing consumed
    Incomplete,
    /// A partial frame outlived the read timeout and was discarded
    Stale { flushed: usize },
    /// Frame failed validation and was dropped with the residual bytes
    Corrupted { flushed: usize },
    /// Valid frame; residual bytes were flushed
    Tag { read: TagRead, flushed: usize },
}

#[derive(Clone, Debug, Default)]
pub struct DecoderStats {
    pub frames_ok: u64,
    pub frames_corrupted: u64,
    pub partials_expired: u64,
    pub bytes_flushed: u64,
}

/// Frame decoder
///
/// The only state carried between attempts is when the current partial
/// frame was first seen, so a lone noise byte cannot prefix the next swipe.
#[derive(Debug)]
pub struct FrameDecoder {
    read_timeout: Duration,
    partial_since: Option<Timestamp>,
    stats: DecoderStats,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::with_read_timeout(DEFAULT_READ_TIMEOUT)
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_read_timeout(read_timeout: Duration) -> Self {
        FrameDecoder {
            read_timeout,
            partial_since: None,
            stats: DecoderStats::default(),
        }
    }

    /// Attempt to decode one frame from the source
    pub fn poll(&mut self, source: &mut dyn ByteSource, now: Timestamp) -> DecodeOutcome {
        let available = source.available();
        if available == 0 {
            self.partial_since = None;
            return DecodeOutcome::Incomplete;
        }
        if available < FRAME_LEN {
            let since = *self.partial_since.get_or_insert(now);
            if now.since(since) <= self.read_timeout {
                return DecodeOutcome::Incomplete;
            }
            let flushed = self.discard(source);
            self.stats.partials_expired += 1;
            tracing::debug!(flushed, "discarding partial reader frame");
            return DecodeOutcome::Stale { flushed };
        }
        self.partial_since = None;

        let mut buf = [0u8; FRAME_LEN];
        let n = source.read(&mut buf);
        let parsed = TagFrame::parse(&buf[..n]);

        // Stale bytes would shift the next frame's boundary.
        let flushed = source.flush();
        self.stats.bytes_flushed += flushed as u64;

        match parsed {
            Ok(tag) => {
                self.stats.frames_ok += 1;
                tracing::debug!(%tag, flushed, "tag frame decoded");
                DecodeOutcome::Tag {
                    read: TagRead { tag, at: now },
                    flushed,
                }
            }
            Err(e) => {
                self.stats.frames_corrupted += 1;
                tracing::debug!(error = %e, flushed, "discarding corrupted reader frame");
                DecodeOutcome::Corrupted { flushed }
            }
        }
    }

    /// Drop everything buffered and forget any partial frame
    pub fn discard(&mut self, source: &mut dyn ByteSource) -> usize {
        self.partial_since = None;
        let flushed = source.flush();
        self.stats.bytes_flushed += flushed as u64;
        flushed
    }

    pub fn stats(&self) -> &DecoderStats {
        &self.stats
    }
}
