//! RFC 2435 MJPEG-RTP streaming for dual-camera embedded Linux hosts.
//!
//! This library provides:
//! - RFC 2435 compliant MJPEG-RTP packetization
//! - Zero-copy packet construction using `bytes::Bytes`
//! - Lock-free atomics for statistics
//! - An external-process frame source (no in-process JPEG encoding)
//! - Dual-camera management with isolated failure domains
//!
//! # Example
//!
//! ```no_run
//! use mjpeg_rtp_dualcam::rtp::RtpPacketizer;
//!
//! let packetizer = RtpPacketizer::new(0x12345678, 1400);
//! // ... obtain a complete JPEG frame from a Source
//! // let packets = packetizer.packetize_jpeg(&jpeg_data, 1920, 1080, timestamp)?;
//! ```

pub mod config;
pub mod manager;
pub mod rtp;
pub mod sender;
pub mod source;
pub mod stats_reporter;
pub mod streamer;

// Re-exports for convenience
pub use manager::{DualCameraManager, ManagerError};
pub use rtp::{PacketizerStats, RtpPacketizer, TimestampGenerator};
pub use sender::{Sender, SenderError, SenderStats};
pub use source::{Source, SourceConfig, SourceError, SourceStats};
pub use streamer::{Streamer, StreamerConfig, StreamerError, StreamerStats};
