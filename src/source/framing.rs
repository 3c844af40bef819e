//! Carves a raw byte stream into complete JPEG frames by SOI/EOI scanning.
//!
//! This is the pure, allocation-light core of the Frame Source Reader: it
//! owns no I/O, only a growable buffer, so it can be exercised directly by
//! tests with arbitrary chunk splits.

use bytes::{Bytes, BytesMut};
use thiserror::Error;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    #[error("JPEG frame too large: {0} bytes")]
    FrameTooLarge(usize),
}

/// Frames extracted from one `feed()` call, plus any oversize-frame errors
/// encountered along the way (each one counted and dropped, not fatal).
#[derive(Debug, Default)]
pub struct FeedResult {
    pub frames: Vec<Bytes>,
    pub errors: Vec<FramingError>,
}

/// Incremental SOI/EOI frame extractor.
pub struct FrameFramer {
    buf: BytesMut,
    max_frame_size: usize,
}

impl FrameFramer {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_frame_size,
        }
    }

    /// Appends `chunk` and extracts every complete frame now available.
    pub fn feed(&mut self, chunk: &[u8]) -> FeedResult {
        self.buf.extend_from_slice(chunk);
        let mut result = FeedResult::default();

        loop {
            let Some(soi) = find_marker(&self.buf, SOI) else {
                // No SOI in the buffer at all: discard stray bytes, but
                // keep a single trailing 0xFF in case it is the first half
                // of a SOI split across chunk boundaries.
                if self.buf.last() == Some(&0xFF) {
                    let keep = self.buf.len() - 1;
                    let _ = self.buf.split_to(keep);
                } else {
                    self.buf.clear();
                }
                break;
            };

            if soi > 0 {
                let _ = self.buf.split_to(soi);
            }

            match find_marker_from(&self.buf, EOI, 2) {
                Some(eoi) => {
                    let frame_len = eoi + 2;
                    if frame_len > self.max_frame_size {
                        result.errors.push(FramingError::FrameTooLarge(frame_len));
                    } else {
                        result
                            .frames
                            .push(self.buf[..frame_len].to_vec().into());
                    }
                    let _ = self.buf.split_to(frame_len);
                }
                None => {
                    if self.buf.len() > self.max_frame_size {
                        result
                            .errors
                            .push(FramingError::FrameTooLarge(self.buf.len()));
                        self.buf.clear();
                    }
                    break;
                }
            }
        }

        result
    }

    /// Call once the stream has ended. Any unterminated partial frame still
    /// buffered is silently discarded, per the end-of-stream contract.
    pub fn finish(&mut self) {
        self.buf.clear();
    }
}

fn find_marker(haystack: &[u8], marker: [u8; 2]) -> Option<usize> {
    find_marker_from(haystack, marker, 0)
}

fn find_marker_from(haystack: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    if haystack.len() < 2 || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(2)
        .position(|w| w == marker)
        .map(|p| p + from)
}
