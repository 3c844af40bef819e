//! Per-camera streamer: owns one frame source, one packetizer, one sender,
//! and the forwarding loop tying them together with frame-counted timing.

mod stats;

pub use stats::StreamerStats;

use crate::rtp::{RtpPacketizer, TimestampGenerator};
use crate::sender::{Sender, SenderError};
use crate::source::{Source, SourceConfig, SourceError};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum StreamerError {
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("sender error: {0}")]
    Sender(#[from] SenderError),

    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    #[error("streamer already running")]
    AlreadyRunning,

    #[error("streamer not running")]
    NotRunning,
}

#[derive(Debug, Clone)]
pub struct StreamerConfig {
    pub dest_host: String,
    pub dest_port: u16,
    pub local_port: u16,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub mtu: usize,
    pub ssrc: u32,
    pub dscp: u8,
    pub source: SourceConfig,
}

/// Owns one camera's pipeline: frame source -> packetizer -> UDP sender.
pub struct Streamer {
    config: StreamerConfig,
    packetizer: Arc<RtpPacketizer>,
    source: Option<Source>,
    sender: Option<Arc<Sender>>,
    dest_addr: Option<SocketAddr>,
    is_running: Arc<AtomicBool>,
    cancel: CancellationToken,
    frames_sent: Arc<AtomicU64>,
    send_errors: Arc<AtomicU64>,
}

impl Streamer {
    pub fn new(config: StreamerConfig) -> Self {
        let packetizer = Arc::new(RtpPacketizer::new(config.ssrc, config.mtu));

        Self {
            config,
            packetizer,
            source: None,
            sender: None,
            dest_addr: None,
            is_running: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            frames_sent: Arc::new(AtomicU64::new(0)),
            send_errors: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Spawns the frame source, binds the UDP sender, and starts the
    /// forwarding task. The RTP timestamp base is randomized per RFC 3550's
    /// recommendation that initial timestamps not be predictable.
    pub async fn start(&mut self) -> Result<(), StreamerError> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err(StreamerError::AlreadyRunning);
        }

        info!(
            dest = %format!("{}:{}", self.config.dest_host, self.config.dest_port),
            mtu = %self.config.mtu,
            fps = %self.config.fps,
            resolution = %format!("{}x{}", self.config.width, self.config.height),
            "starting streamer"
        );

        let dest_str = format!("{}:{}", self.config.dest_host, self.config.dest_port);
        let dest_addr: SocketAddr = dest_str
            .parse()
            .map_err(|e| StreamerError::InvalidDestination(format!("{dest_str}: {e}")))?;
        self.dest_addr = Some(dest_addr);

        let sender = Arc::new(Sender::new(self.config.local_port, dest_addr, self.config.dscp).await?);
        self.sender = Some(Arc::clone(&sender));

        let mut source = Source::new(self.config.source.clone())?;
        let frame_rx = source.start().await?;
        self.source = Some(source);

        self.cancel = CancellationToken::new();

        let base_ts: u32 = rand::random();
        let ts_gen = TimestampGenerator::new(base_ts, self.config.fps);

        let task = ForwardTask {
            frame_rx,
            packetizer: Arc::clone(&self.packetizer),
            sender,
            ts_gen,
            width: self.config.width,
            height: self.config.height,
            frames_sent: Arc::clone(&self.frames_sent),
            send_errors: Arc::clone(&self.send_errors),
            is_running: Arc::clone(&self.is_running),
            cancel: self.cancel.clone(),
        };

        tokio::spawn(task.run());
        self.is_running.store(true, Ordering::SeqCst);

        Ok(())
    }

    /// Stops the forwarding task and the frame source. Idempotent.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        self.is_running.store(false, Ordering::SeqCst);

        if let Some(mut source) = self.source.take() {
            source.stop().await;
        }
        self.sender = None;
    }

    pub fn get_stats(&self) -> StreamerStats {
        let packetizer_stats = self.packetizer.get_stats();
        let sender_stats = self
            .sender
            .as_ref()
            .map(|s| s.get_stats())
            .unwrap_or_default();
        let frames_dropped = self
            .source
            .as_ref()
            .map(|s| s.get_stats().frames_dropped)
            .unwrap_or(0);

        StreamerStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped,
            send_errors: self.send_errors.load(Ordering::Relaxed) + sender_stats.send_errors,
            rtp_packets_sent: packetizer_stats.packets_sent,
            bytes_sent: packetizer_stats.bytes_sent,
            current_seq_num: packetizer_stats.current_seq,
            current_timestamp: packetizer_stats.current_ts,
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn get_destination(&self) -> Option<SocketAddr> {
        self.dest_addr
    }
}

impl Drop for Streamer {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.is_running.store(false, Ordering::SeqCst);
    }
}

/// Forwards frames from the source channel to the network: packetize, send,
/// repeat, until the channel closes or cancellation is requested.
struct ForwardTask {
    frame_rx: tokio::sync::mpsc::Receiver<bytes::Bytes>,
    packetizer: Arc<RtpPacketizer>,
    sender: Arc<Sender>,
    ts_gen: TimestampGenerator,
    width: u32,
    height: u32,
    frames_sent: Arc<AtomicU64>,
    send_errors: Arc<AtomicU64>,
    is_running: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl ForwardTask {
    async fn run(mut self) {
        debug!("forwarding task started");
        let mut frame_index = 0u64;

        loop {
            let jpeg_data = tokio::select! {
                _ = self.cancel.cancelled() => break,
                frame = self.frame_rx.recv() => match frame {
                    Some(f) => f,
                    None => break,
                },
            };

            let timestamp = self.ts_gen.timestamp_for(frame_index);
            frame_index += 1;

            let packets = match self
                .packetizer
                .packetize_jpeg(&jpeg_data, self.width, self.height, timestamp)
            {
                Ok(packets) => packets,
                Err(e) => {
                    warn!(error = %e, "failed to packetize frame");
                    self.send_errors.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };

            for packet in &packets {
                if let Err(e) = self.sender.send(packet).await {
                    error!(error = %e, "failed to send RTP packet");
                    self.send_errors.fetch_add(1, Ordering::Relaxed);
                }
            }

            self.frames_sent.fetch_add(1, Ordering::Relaxed);

            if frame_index % 100 == 0 {
                debug!(
                    frames = %self.frames_sent.load(Ordering::Relaxed),
                    packets = %self.packetizer.get_stats().packets_sent,
                    "streaming progress"
                );
            }
        }

        self.is_running.store(false, Ordering::SeqCst);
        debug!("forwarding task stopped");
    }
}
