//! Dual-camera manager: owns two independent camera pipelines and keeps
//! their failure domains isolated from one another.

use crate::config::CameraConfig;
use crate::source::SourceConfig;
use crate::streamer::{Streamer, StreamerConfig, StreamerStats};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("no cameras are enabled in configuration")]
    NoCamerasEnabled,

    #[error("all enabled cameras failed to start")]
    AllFailed,
}

/// Runs up to two named camera streamers side by side. One camera failing
/// to start or failing mid-stream never stops or restarts the other.
pub struct DualCameraManager {
    streamers: HashMap<String, Streamer>,
}

impl DualCameraManager {
    pub fn new() -> Self {
        Self {
            streamers: HashMap::new(),
        }
    }

    /// Builds a `StreamerConfig` for one named camera from its config section
    /// plus the shared MTU/DSCP settings.
    pub fn streamer_config(camera: &CameraConfig, mtu: usize, dscp: u8) -> StreamerConfig {
        StreamerConfig {
            dest_host: camera.dest_host.clone(),
            dest_port: camera.dest_port,
            local_port: camera.local_port,
            width: camera.width,
            height: camera.height,
            fps: camera.fps,
            mtu,
            ssrc: camera.ssrc,
            dscp,
            source: SourceConfig {
                device: camera.device.clone(),
                width: camera.width,
                height: camera.height,
                fps: camera.fps,
                quality: camera.quality,
                flip_method: camera.flip_method.clone(),
                encoder_command: camera.encoder_command.clone(),
                encoder_args: camera.encoder_args.clone(),
                max_frame_size: crate::source::DEFAULT_MAX_FRAME_SIZE,
            },
        }
    }

    /// Starts every `(name, config)` pair given, in order. A camera that
    /// fails to start is logged and skipped; the rest still start. Returns
    /// `AllFailed` only if none of the cameras came up.
    pub async fn start_all(
        &mut self,
        cameras: Vec<(String, StreamerConfig)>,
    ) -> Result<(), ManagerError> {
        if cameras.is_empty() {
            return Err(ManagerError::NoCamerasEnabled);
        }

        let mut started = 0usize;
        for (name, config) in cameras {
            let mut streamer = Streamer::new(config);
            match streamer.start().await {
                Ok(()) => {
                    info!(camera = %name, "camera started");
                    self.streamers.insert(name, streamer);
                    started += 1;
                }
                Err(e) => {
                    error!(camera = %name, error = %e, "camera failed to start");
                }
            }
        }

        if started == 0 {
            return Err(ManagerError::AllFailed);
        }

        Ok(())
    }

    /// Stops every running camera concurrently. Always succeeds: a stuck
    /// camera's stop still lets the others stop on schedule.
    pub async fn stop_all(&mut self) {
        let mut names: Vec<String> = self.streamers.keys().cloned().collect();
        names.sort();

        let handles: Vec<_> = names
            .into_iter()
            .filter_map(|name| self.streamers.remove(&name).map(|s| (name, s)))
            .map(|(name, mut streamer)| {
                tokio::spawn(async move {
                    streamer.stop().await;
                    info!(camera = %name, "camera stopped");
                })
            })
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "camera stop task panicked");
            }
        }
    }

    /// Whether at least one camera is currently running.
    pub fn any_running(&self) -> bool {
        self.streamers.values().any(|s| s.is_running())
    }

    /// Whether every camera that was started has since failed.
    pub fn all_failed(&self) -> bool {
        !self.streamers.is_empty() && self.streamers.values().all(|s| !s.is_running())
    }

    pub fn stats(&self) -> HashMap<String, StreamerStats> {
        self.streamers
            .iter()
            .map(|(name, s)| (name.clone(), s.get_stats()))
            .collect()
    }

    pub fn camera_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.streamers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for DualCameraManager {
    fn default() -> Self {
        Self::new()
    }
}
