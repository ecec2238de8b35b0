//! Segmented stream framing.
//!
//! A stream is a sequence of segments, each a little-endian `u32` length
//! followed by that many payload bytes, ended by a zero-length segment. A
//! transport can tell whether a buffer holds a whole message with
//! [`check_stream_complete`] without decoding the payload.

use thiserror::Error;

type SegmentSize = u32;

/// Bytes used by a segment length prefix.
pub const SEGMENT_SIZE_BYTES: usize = std::mem::size_of::<SegmentSize>();

/// Largest payload carried by one segment.
pub const SEGMENT_MAX_DATA_SIZE: usize = 256 * 1024;

/// Largest encoded segment including its prefix and a trailing terminator.
pub const SEGMENT_MAX_TOTAL_SIZE: usize = SEGMENT_MAX_DATA_SIZE + 2 * SEGMENT_SIZE_BYTES;

/// Framing violations found while reading or building a stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlkError {
    /// A segment length prefix was cut off.
    #[error("size data missing in stream")]
    SizeMissing,
    /// A segment announced more bytes than the buffer holds.
    #[error("not enough data in stream")]
    NotEnoughData,
    /// Finalize found payload bytes that were never loaded.
    #[error("leftover data in stream")]
    LeftoverData,
    /// A zero-length segment appeared where payload was expected.
    #[error("unexpected empty segment")]
    UnexpectedEnd,
    /// A payload segment appeared where the terminator was expected.
    #[error("expected final segment")]
    ExpectedEnd,
    /// Finalize was called before any payload was saved.
    #[error("stream has no payload")]
    Empty,
    /// The buffer does not hold a complete stream.
    #[error("stream incomplete")]
    Incomplete,
}

/// Completeness of a buffered stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StreamStatus {
    /// More bytes are needed.
    Partial,
    /// Well formed and terminated.
    Complete,
    /// Terminated without any payload segment.
    Invalid,
}

/// Result of [`check_stream_complete`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    /// Completeness.
    pub status: StreamStatus,
    /// Encoded length when complete; otherwise a buffer size that is
    /// guaranteed to make progress.
    pub stream_size: usize,
    /// Payload bytes across the segments seen so far.
    pub encoded_data_size: usize,
}

/// Splits saved bytes into segments and hands each to a sink.
///
/// The sink receives the encoded segment and whether more segments follow.
pub struct Builder<F: FnMut(&[u8], bool)> {
    segment: Vec<u8>,
    pos: usize,
    saved: bool,
    sink: F,
}

impl<F: FnMut(&[u8], bool)> Builder<F> {
    /// Creates a builder writing into `sink`.
    pub fn new(sink: F) -> Self {
        Self {
            segment: vec![0; SEGMENT_MAX_TOTAL_SIZE],
            pos: 0,
            saved: false,
            sink,
        }
    }

    /// Appends `data` to the stream.
    pub fn save(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            self.flush_segment(false);
            let take = data.len().min(SEGMENT_MAX_DATA_SIZE - self.pos);
            let start = SEGMENT_SIZE_BYTES + self.pos;
            self.segment[start..start + take].copy_from_slice(&data[..take]);
            self.pos += take;
            self.saved = true;
            data = &data[take..];
        }
    }

    /// Flushes the last segment followed by the terminator.
    pub fn finalize(mut self) -> Result<(), SlkError> {
        if !self.saved {
            return Err(SlkError::Empty);
        }
        self.flush_segment(true);
        Ok(())
    }

    fn flush_segment(&mut self, last: bool) {
        if !last && self.pos < SEGMENT_MAX_DATA_SIZE {
            return;
        }
        let mut total = SEGMENT_SIZE_BYTES + self.pos;
        self.segment[..SEGMENT_SIZE_BYTES].copy_from_slice(&(self.pos as SegmentSize).to_le_bytes());
        if last {
            self.segment[total..total + SEGMENT_SIZE_BYTES].copy_from_slice(&0u32.to_le_bytes());
            total += SEGMENT_SIZE_BYTES;
        }
        (self.sink)(&self.segment[..total], !last);
        self.pos = 0;
    }
}

/// Reads payload bytes back out of an encoded stream.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    have: usize,
}

impl<'a> Reader<'a> {
    /// Creates a reader over a complete encoded stream.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            have: 0,
        }
    }

    /// Fills `out` with the next payload bytes, crossing segments as needed.
    pub fn load(&mut self, out: &mut [u8]) -> Result<(), SlkError> {
        let mut offset = 0;
        while offset < out.len() {
            self.next_segment(false)?;
            let take = (out.len() - offset).min(self.have);
            out[offset..offset + take].copy_from_slice(&self.data[self.pos..self.pos + take]);
            self.pos += take;
            self.have -= take;
            offset += take;
        }
        Ok(())
    }

    /// Checks that every payload byte was consumed and the terminator follows.
    pub fn finalize(mut self) -> Result<(), SlkError> {
        self.next_segment(true)
    }

    fn next_segment(&mut self, want_final: bool) -> Result<(), SlkError> {
        if self.have != 0 {
            if want_final {
                return Err(SlkError::LeftoverData);
            }
            return Ok(());
        }
        let len = read_size(self.data, self.pos).ok_or(SlkError::SizeMissing)?;
        if want_final && len != 0 {
            return Err(SlkError::ExpectedEnd);
        }
        if !want_final && len == 0 {
            return Err(SlkError::UnexpectedEnd);
        }
        self.pos += SEGMENT_SIZE_BYTES;
        if self.pos + len > self.data.len() {
            return Err(SlkError::NotEnoughData);
        }
        self.have = len;
        Ok(())
    }
}

/// Reports whether `data` starts with a complete stream.
pub fn check_stream_complete(data: &[u8]) -> StreamInfo {
    let mut segments = 0usize;
    let mut data_size = 0usize;
    let mut pos = 0usize;
    loop {
        let Some(len) = read_size(data, pos) else {
            return partial(pos, data_size);
        };
        pos += SEGMENT_SIZE_BYTES;
        if len == 0 {
            break;
        }
        if pos + len > data.len() {
            return partial(pos, data_size);
        }
        pos += len;
        segments += 1;
        data_size += len;
    }
    if segments == 0 {
        return StreamInfo {
            status: StreamStatus::Invalid,
            stream_size: 0,
            encoded_data_size: 0,
        };
    }
    StreamInfo {
        status: StreamStatus::Complete,
        stream_size: pos,
        encoded_data_size: data_size,
    }
}

fn partial(pos: usize, data_size: usize) -> StreamInfo {
    StreamInfo {
        status: StreamStatus::Partial,
        stream_size: pos + SEGMENT_MAX_TOTAL_SIZE,
        encoded_data_size: data_size,
    }
}

fn read_size(data: &[u8], pos: usize) -> Option<usize> {
    let bytes = data.get(pos..pos + SEGMENT_SIZE_BYTES)?;
    let mut raw = [0u8; SEGMENT_SIZE_BYTES];
    raw.copy_from_slice(bytes);
    Some(SegmentSize::from_le_bytes(raw) as usize)
}
