//! RTP/JPEG packetization according to RFC 2435
//!
//! This module implements the JPEG payload format for RTP as specified in
//! RFC 2435. It handles fragmentation of JPEG frames into RTP packets with
//! proper headers and timing. Quantization tables are never extracted or
//! re-embedded: the whole JPEG byte sequence is carried as payload and Q is
//! always 128, telling the receiver to use the tables found in-band.

mod jpeg;
mod packet;

pub use jpeg::{JpegHeader, JpegType};
pub use packet::{RtpHeader, RtpPacket};

use bytes::{BufMut, Bytes, BytesMut};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use thiserror::Error;

/// RTP protocol constants
pub const RTP_VERSION: u8 = 2;
pub const RTP_PAYLOAD_TYPE_JPEG: u8 = 26;
pub const RTP_HEADER_SIZE: usize = 12;
pub const JPEG_HEADER_SIZE: usize = 8;
pub const RTP_CLOCK_RATE: u32 = 90000; // Standard 90kHz clock for video
pub const DEFAULT_MTU: usize = 1400;

/// Overhead accounted for below the application payload: IP(20) + UDP(8) +
/// RTP(12) + JPEG header(8).
pub const WIRE_OVERHEAD: usize = 20 + 8 + RTP_HEADER_SIZE + JPEG_HEADER_SIZE;

/// Maximum payload size per RTP packet (MTU minus the full IP/UDP/RTP/JPEG
/// header stack).
pub const MAX_PAYLOAD_SIZE: usize = DEFAULT_MTU - WIRE_OVERHEAD;

/// Minimum pixel dimension accepted by the packetizer (so that `/8` still
/// yields at least one block).
pub const MIN_DIMENSION_PX: u32 = 8;

/// Maximum pixel dimension accepted by the packetizer (so that `/8` fits a
/// single byte: 2040 / 8 = 255).
pub const MAX_DIMENSION_PX: u32 = 2040;

#[derive(Error, Debug)]
pub enum PacketizerError {
    #[error("empty JPEG data")]
    EmptyData,

    #[error("invalid JPEG: missing SOI marker")]
    MissingSoiMarker,

    #[error("invalid JPEG: missing EOI marker")]
    MissingEoiMarker,

    #[error("invalid dimensions: width={0} height={1}, must be in [{MIN_DIMENSION_PX}, {MAX_DIMENSION_PX}]")]
    InvalidDimensions(u32, u32),

    #[error("invalid MTU: {0}, payload budget collapsed to zero")]
    InvalidMtu(usize),
}

/// Statistics for RTP packetizer
#[derive(Debug, Clone, Default)]
pub struct PacketizerStats {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub frames_sent: u64,
    pub current_seq: u32,
    pub current_ts: u32,
}

/// RTP/JPEG packetizer with zero-copy optimization
///
/// Fragments JPEG frames into RTP packets according to RFC 2435. Owns the
/// sequence counter and SSRC for one stream; uses atomics so stats can be
/// read concurrently without locking.
pub struct RtpPacketizer {
    ssrc: u32,
    mtu: usize,
    max_payload_size: usize,

    sequence_number: AtomicU32,

    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
    frames_sent: AtomicU64,
}

impl RtpPacketizer {
    /// Creates a new RTP packetizer.
    ///
    /// * `ssrc` - Synchronization source identifier (unique per stream)
    /// * `mtu` - Maximum transmission unit (default: 1400 if 0 is passed)
    pub fn new(ssrc: u32, mtu: usize) -> Self {
        let mtu = if mtu == 0 { DEFAULT_MTU } else { mtu };
        let max_payload_size = mtu.saturating_sub(WIRE_OVERHEAD);

        Self {
            ssrc,
            mtu,
            max_payload_size,
            sequence_number: AtomicU32::new(0),
            packets_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
        }
    }

    /// Packetizes a complete JPEG frame into one or more RTP packets.
    ///
    /// `jpeg_data` must start with SOI (0xFFD8) and end with EOI (0xFFD9).
    /// `width`/`height` are in pixels (not parsed from the JPEG — reported
    /// by upstream configuration) and are clamped into 8-pixel blocks.
    /// `timestamp` is the 90kHz RTP timestamp shared by every packet of this
    /// frame. Never partially emits: on error, no state is mutated.
    pub fn packetize_jpeg(
        &self,
        jpeg_data: &[u8],
        width: u32,
        height: u32,
        timestamp: u32,
    ) -> Result<Vec<Bytes>, PacketizerError> {
        if jpeg_data.is_empty() {
            return Err(PacketizerError::EmptyData);
        }
        self.validate_jpeg(jpeg_data)?;

        if !(MIN_DIMENSION_PX..=MAX_DIMENSION_PX).contains(&width)
            || !(MIN_DIMENSION_PX..=MAX_DIMENSION_PX).contains(&height)
        {
            return Err(PacketizerError::InvalidDimensions(width, height));
        }

        if self.max_payload_size == 0 {
            return Err(PacketizerError::InvalidMtu(self.mtu));
        }

        let num_packets = (jpeg_data.len() + self.max_payload_size - 1) / self.max_payload_size;
        let mut packets = Vec::with_capacity(num_packets);

        let mut seq_num = self.sequence_number.load(Ordering::Relaxed);
        let mut fragment_offset: u32 = 0;
        let mut offset = 0;

        while offset < jpeg_data.len() {
            let payload_size = (jpeg_data.len() - offset).min(self.max_payload_size);
            let is_last = (offset + payload_size) >= jpeg_data.len();

            let packet = self.build_rtp_packet(
                seq_num,
                timestamp,
                fragment_offset,
                width,
                height,
                is_last,
                &jpeg_data[offset..offset + payload_size],
            );

            packets.push(packet);

            seq_num = seq_num.wrapping_add(1) & 0xFFFF;
            fragment_offset += payload_size as u32;
            offset += payload_size;
        }

        self.sequence_number.store(seq_num, Ordering::Relaxed);
        self.packets_sent
            .fetch_add(packets.len() as u64, Ordering::Relaxed);
        self.bytes_sent
            .fetch_add(jpeg_data.len() as u64, Ordering::Relaxed);
        self.frames_sent.fetch_add(1, Ordering::Relaxed);

        Ok(packets)
    }

    /// Builds a single RTP packet with JPEG header and payload.
    fn build_rtp_packet(
        &self,
        seq_num: u32,
        timestamp: u32,
        fragment_offset: u32,
        width: u32,
        height: u32,
        marker: bool,
        payload: &[u8],
    ) -> Bytes {
        let total_size = RTP_HEADER_SIZE + JPEG_HEADER_SIZE + payload.len();
        let mut buf = BytesMut::with_capacity(total_size);

        // RTP header (12 bytes) - RFC 3550 Section 5.1
        buf.put_u8(RTP_VERSION << 6); // V=2, P=0, X=0, CC=0
        buf.put_u8(if marker {
            0x80 | RTP_PAYLOAD_TYPE_JPEG
        } else {
            RTP_PAYLOAD_TYPE_JPEG
        });
        buf.put_u16(seq_num as u16);
        buf.put_u32(timestamp);
        buf.put_u32(self.ssrc);

        // JPEG header (8 bytes) - RFC 2435 Section 3.1
        buf.put_u8(0); // Type-specific, always 0
        buf.put_u8((fragment_offset >> 16) as u8);
        buf.put_u8((fragment_offset >> 8) as u8);
        buf.put_u8(fragment_offset as u8);
        buf.put_u8(JpegType::Baseline420 as u8);
        buf.put_u8(128); // Q: dynamic quantization tables are in-band
        buf.put_u8(blocks_of(width));
        buf.put_u8(blocks_of(height));

        buf.put_slice(payload);
        buf.freeze()
    }

    fn validate_jpeg(&self, data: &[u8]) -> Result<(), PacketizerError> {
        if data.len() < 4 {
            return Err(PacketizerError::MissingSoiMarker);
        }
        if data[0] != 0xFF || data[1] != 0xD8 {
            return Err(PacketizerError::MissingSoiMarker);
        }
        let len = data.len();
        if data[len - 2] != 0xFF || data[len - 1] != 0xD9 {
            return Err(PacketizerError::MissingEoiMarker);
        }
        Ok(())
    }

    /// Current sequence number (next one to be assigned).
    pub fn sequence_number(&self) -> u32 {
        self.sequence_number.load(Ordering::Relaxed)
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn mtu(&self) -> usize {
        self.mtu
    }

    pub fn get_stats(&self) -> PacketizerStats {
        PacketizerStats {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            current_seq: self.sequence_number.load(Ordering::Relaxed),
            current_ts: 0,
        }
    }
}

/// Clamps a pixel dimension into an 8-pixel block count, per RFC 2435
/// Section 3.1: `max(1, min(255, pixels/8))`.
fn blocks_of(pixels: u32) -> u8 {
    (pixels / 8).clamp(1, 255) as u8
}

/// Generates 90kHz RTP timestamps from a per-frame counter, avoiding the
/// jitter wall-clock delivery would introduce.
#[derive(Clone, Debug)]
pub struct TimestampGenerator {
    base_ts: u32,
    fps: u32,
}

impl TimestampGenerator {
    /// `base_ts` is a random 32-bit seed chosen once per stream start.
    pub fn new(base_ts: u32, fps: u32) -> Self {
        Self { base_ts, fps }
    }

    /// Timestamp for the `frame_index`-th frame delivered since start
    /// (0-based), per `base_ts + frame_index * 90000 / fps`.
    pub fn timestamp_for(&self, frame_index: u64) -> u32 {
        let increment = (RTP_CLOCK_RATE / self.fps) as u64;
        self.base_ts.wrapping_add((frame_index * increment) as u32)
    }
}
