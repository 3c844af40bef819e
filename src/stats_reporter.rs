//! Periodic stats logging for all running cameras.

use crate::manager::DualCameraManager;
use crate::streamer::StreamerStats;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Runs until `cancel` fires, logging each camera's throughput once per
/// `interval`. Reads statistics snapshots only; never touches a streamer's
/// running state.
pub async fn run(
    manager: Arc<Mutex<DualCameraManager>>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut previous: HashMap<String, StreamerStats> = HashMap::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let current = manager.lock().await.stats();
        for (name, stats) in &current {
            let prev = previous.get(name).cloned().unwrap_or_default();
            let fps = stats.calculate_fps(&prev, interval.as_secs_f64());
            let kbps = stats.calculate_bitrate_kbps(&prev, interval.as_secs_f64());

            info!(
                camera = %name,
                fps = %format!("{fps:.1}"),
                kbps = %format!("{kbps:.1}"),
                frames_sent = %stats.frames_sent,
                frames_dropped = %stats.frames_dropped,
                send_errors = %stats.send_errors,
                loss_rate = %format!("{:.3}", stats.packet_loss_rate()),
                "stats"
            );
        }
        previous = current;
    }

    info!("stats reporter stopped");
}
