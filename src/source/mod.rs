//! Frame Source Reader.
//!
//! Spawns an external JPEG-encoder process per camera, reads its stdout,
//! and carves complete frames out of the byte stream for delivery to a
//! streamer over a bounded channel. This replaces in-process capture: the
//! encoder is treated as an opaque collaborator, started and stopped like
//! any other child process.

mod framing;

pub use framing::FramingError;
use framing::FrameFramer;

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

/// Default cap on a single JPEG frame (10 MiB). Frames larger than this
/// are dropped rather than accumulated without bound.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Depth of the bounded frame channel between the reader task and the streamer.
const FRAME_CHANNEL_CAPACITY: usize = 4;

const STDOUT_READ_CHUNK: usize = 64 * 1024;

/// How long to wait after SIGTERM before force-killing the encoder.
const GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("invalid source configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to spawn encoder process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("encoder process exited before producing a frame")]
    EncoderExited,

    #[error("source already running")]
    AlreadyRunning,

    #[error("source not running")]
    NotRunning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub quality: u32,
    pub flip_method: Option<String>,

    /// Executable to spawn as the JPEG encoder. Defaults to `ffmpeg`.
    #[serde(default = "default_encoder_command")]
    pub encoder_command: String,

    /// Full argument list for the encoder. When empty, a sensible
    /// `ffmpeg`-shaped default is synthesized from the fields above.
    #[serde(default)]
    pub encoder_args: Vec<String>,

    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

fn default_encoder_command() -> String {
    "ffmpeg".to_string()
}

fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

impl SourceConfig {
    fn validate(&self) -> Result<(), SourceError> {
        if self.encoder_command.trim().is_empty() {
            return Err(SourceError::InvalidConfig(
                "encoder_command must not be empty".into(),
            ));
        }
        if self.fps == 0 {
            return Err(SourceError::InvalidConfig("fps must be nonzero".into()));
        }
        if self.max_frame_size == 0 {
            return Err(SourceError::InvalidConfig(
                "max_frame_size must be nonzero".into(),
            ));
        }
        Ok(())
    }

    /// Synthesizes a default ffmpeg argument list reading from a V4L2 device
    /// and writing an MJPEG byte stream to stdout.
    fn default_args(&self) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "warning".into(),
            "-f".into(),
            "v4l2".into(),
            "-framerate".into(),
            self.fps.to_string(),
            "-video_size".into(),
            format!("{}x{}", self.width, self.height),
            "-i".into(),
            self.device.clone(),
        ];

        if let Some(filter) = self.flip_filter() {
            args.push("-vf".into());
            args.push(filter);
        }

        args.extend([
            "-f".into(),
            "mjpeg".into(),
            "-q:v".into(),
            quality_to_qscale(self.quality).to_string(),
            "-an".into(),
            "-".into(),
        ]);
        args
    }

    fn flip_filter(&self) -> Option<String> {
        match self.flip_method.as_deref() {
            Some("horizontal") => Some("hflip".to_string()),
            Some("vertical") => Some("vflip".to_string()),
            Some("rotate-180") => Some("hflip,vflip".to_string()),
            _ => None,
        }
    }

    fn args(&self) -> Vec<String> {
        if self.encoder_args.is_empty() {
            self.default_args()
        } else {
            self.encoder_args.clone()
        }
    }
}

/// Maps a 1-100 quality setting onto ffmpeg's inverted 2 (best) - 31 (worst) `-q:v` scale.
fn quality_to_qscale(quality: u32) -> u32 {
    let quality = quality.clamp(1, 100);
    2 + ((100 - quality) * 29) / 99
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub frames_dropped: u64,
    pub frames_oversize: u64,
}

/// Owns the encoder child process and the background task that reads its
/// stdout. Dropping a running `Source` kills the child (`kill_on_drop`).
pub struct Source {
    config: SourceConfig,
    child: Option<Child>,
    is_running: Arc<AtomicBool>,
    frames_captured: Arc<AtomicU64>,
    frames_dropped: Arc<AtomicU64>,
    frames_oversize: Arc<AtomicU64>,
}

impl Source {
    pub fn new(config: SourceConfig) -> Result<Self, SourceError> {
        config.validate()?;
        Ok(Self {
            config,
            child: None,
            is_running: Arc::new(AtomicBool::new(false)),
            frames_captured: Arc::new(AtomicU64::new(0)),
            frames_dropped: Arc::new(AtomicU64::new(0)),
            frames_oversize: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Spawns the encoder and returns the receiving end of the frame channel.
    pub async fn start(&mut self) -> Result<mpsc::Receiver<Bytes>, SourceError> {
        if self.child.is_some() {
            return Err(SourceError::AlreadyRunning);
        }

        let args = self.config.args();
        tracing::debug!(
            encoder = %self.config.encoder_command,
            args = ?args,
            "spawning frame source encoder"
        );

        let mut child = Command::new(&self.config.encoder_command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(SourceError::SpawnFailed)?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);

        self.is_running.store(true, Ordering::SeqCst);

        tokio::spawn(drain_stderr(stderr));
        tokio::spawn(read_frames(
            stdout,
            frame_tx,
            self.config.max_frame_size,
            self.is_running.clone(),
            self.frames_captured.clone(),
            self.frames_dropped.clone(),
            self.frames_oversize.clone(),
        ));

        self.child = Some(child);
        Ok(frame_rx)
    }

    /// Stops the encoder: SIGTERM first (unix), then a bounded wait, then a
    /// forced kill if it hasn't exited. Idempotent.
    pub async fn stop(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);

        let Some(mut child) = self.child.take() else {
            return;
        };

        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                let pid = nix::unistd::Pid::from_raw(pid as i32);
                if let Err(err) = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM) {
                    tracing::warn!(error = %err, "failed to send SIGTERM to encoder");
                }
            }
        }

        match tokio::time::timeout(GRACEFUL_STOP_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(?status, "encoder exited after stop request");
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "error waiting for encoder to exit");
            }
            Err(_) => {
                tracing::warn!("encoder did not exit within timeout, killing");
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn get_stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_oversize: self.frames_oversize.load(Ordering::Relaxed),
        }
    }
}

async fn drain_stderr(stderr: tokio::process::ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::debug!(target: "source::encoder", "{line}"),
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(error = %err, "error reading encoder stderr");
                break;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn read_frames(
    stdout: tokio::process::ChildStdout,
    frame_tx: mpsc::Sender<Bytes>,
    max_frame_size: usize,
    is_running: Arc<AtomicBool>,
    frames_captured: Arc<AtomicU64>,
    frames_dropped: Arc<AtomicU64>,
    frames_oversize: Arc<AtomicU64>,
) {
    let mut reader = stdout;
    let mut framer = FrameFramer::new(max_frame_size);
    let mut chunk = vec![0u8; STDOUT_READ_CHUNK];

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                tracing::warn!(error = %err, "error reading from encoder stdout");
                break;
            }
        };

        let result = framer.feed(&chunk[..n]);

        for err in result.errors {
            frames_oversize.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %err, "dropping oversize frame");
        }

        for frame in result.frames {
            match frame_tx.try_send(frame) {
                Ok(()) => {
                    frames_captured.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    frames_dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    framer.finish();
    is_running.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> SourceConfig {
        SourceConfig {
            device: "/dev/video0".into(),
            width: 640,
            height: 480,
            fps: 30,
            quality: 85,
            flip_method: None,
            encoder_command: "ffmpeg".into(),
            encoder_args: Vec::new(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    #[test]
    fn test_quality_to_qscale_bounds() {
        assert_eq!(quality_to_qscale(100), 2);
        assert_eq!(quality_to_qscale(1), 31);
    }

    #[test]
    fn test_default_args_include_device_and_size() {
        let cfg = base_config();
        let args = cfg.default_args();
        assert!(args.iter().any(|a| a == "/dev/video0"));
        assert!(args.iter().any(|a| a == "640x480"));
    }

    #[test]
    fn test_explicit_encoder_args_bypass_defaults() {
        let mut cfg = base_config();
        cfg.encoder_args = vec!["--custom".into()];
        assert_eq!(cfg.args(), vec!["--custom".to_string()]);
    }

    #[test]
    fn test_flip_filter_mapping() {
        let mut cfg = base_config();
        cfg.flip_method = Some("horizontal".into());
        assert_eq!(cfg.flip_filter(), Some("hflip".to_string()));
        cfg.flip_method = Some("rotate-180".into());
        assert_eq!(cfg.flip_filter(), Some("hflip,vflip".to_string()));
        cfg.flip_method = None;
        assert_eq!(cfg.flip_filter(), None);
    }

    #[test]
    fn test_empty_encoder_command_rejected() {
        let mut cfg = base_config();
        cfg.encoder_command = "  ".into();
        assert!(Source::new(cfg).is_err());
    }

    #[test]
    fn test_zero_fps_rejected() {
        let mut cfg = base_config();
        cfg.fps = 0;
        assert!(Source::new(cfg).is_err());
    }

    #[tokio::test]
    async fn test_start_stop_with_cat_fixture_encoder() {
        // `cat` of a fixture file stands in for a real encoder: it writes
        // bytes to stdout and exits, exercising spawn/read/stop end to end
        // without depending on ffmpeg being installed.
        let mut fixture = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        fixture.write_all(&[0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9]).unwrap();

        let mut cfg = base_config();
        cfg.encoder_command = "cat".into();
        cfg.encoder_args = vec![fixture.path().to_string_lossy().to_string()];

        let mut source = Source::new(cfg).unwrap();
        let mut rx = source.start().await.unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.as_ref(), &[0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9]);

        source.stop().await;
        assert!(!source.is_running());
    }
}
