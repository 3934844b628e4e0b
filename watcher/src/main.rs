mod annotate;
mod detect;
mod record;
mod session;
mod source;

use motion_sentry_common::config::Config;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use detect::ChangeDetector;
use record::ClipRecorder;
use session::{ClipFrame, SessionController};
use source::{FrameSource, SourceError};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter(&config.logging.level)),
        )
        .init();

    info!(
        url = config.camera.url,
        mode = config.camera.mode,
        motion_threshold = config.detector.motion_threshold,
        patience_secs = config.session.patience_secs,
        confirmation_frames = config.session.confirmation_frames,
        dir = config.recording.dir,
        "starting motion-sentry"
    );

    // Check ffmpeg availability (recording will fail without it).
    record::encoder::check_ffmpeg_available().await;

    if let Err(e) = std::fs::create_dir_all(&config.recording.dir) {
        error!(dir = config.recording.dir, error = %e, "failed to create recording directory");
        std::process::exit(1);
    }

    let mut detector = ChangeDetector::new(&config.detector);
    let mut controller = SessionController::new(&config.session);
    let mut recorder = ClipRecorder::new(config.recording.clone());

    run_watch_loop(&config, &mut detector, &mut controller, &mut recorder).await;

    // Close any in-progress clip so shutdown never truncates a recording.
    for action in controller.close() {
        recorder.apply(action).await;
    }
    info!("shutdown complete");
}

/// Parse the configured log level, falling back to "info" if the directive is
/// malformed. An empty filter would silence every log line.
fn log_filter(level: &str) -> tracing_subscriber::EnvFilter {
    level
        .parse()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

enum LoopExit {
    Shutdown,
    EndOfStream,
    StreamError,
}

/// Outer loop: connect to the camera and pump frames until shutdown or clean
/// end of stream, reconnecting with exponential backoff on transport errors.
async fn run_watch_loop(
    config: &Config,
    detector: &mut ChangeDetector,
    controller: &mut SessionController,
    recorder: &mut ClipRecorder,
) {
    let mut backoff = Duration::from_secs(2);
    let max_backoff = Duration::from_secs(30);

    loop {
        let mut source = match FrameSource::connect(&config.camera).await {
            Ok(s) => {
                backoff = Duration::from_secs(2);
                s
            }
            Err(e @ SourceError::UnknownMode(_)) => {
                error!(error = %e, "invalid camera configuration");
                return;
            }
            Err(e) => {
                error!(error = %e, "failed to connect to camera, retrying in {:?}", backoff);
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(max_backoff);
                continue;
            }
        };

        match pump_frames(config, &mut source, detector, controller, recorder).await {
            LoopExit::Shutdown => return,
            LoopExit::EndOfStream => {
                info!("camera stream ended");
                return;
            }
            LoopExit::StreamError => {
                // Finish the open clip before the gap in coverage, and drop
                // the stale diff baseline.
                for action in controller.close() {
                    recorder.apply(action).await;
                }
                detector.reset();
                warn!("reconnecting in {:?}", backoff);
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(max_backoff);
            }
        }
    }
}

/// Inner loop: one frame fully processed (detect, annotate, tick, apply)
/// before the next is requested. Frames arrive strictly in order.
async fn pump_frames(
    config: &Config,
    source: &mut FrameSource,
    detector: &mut ChangeDetector,
    controller: &mut SessionController,
    recorder: &mut ClipRecorder,
) -> LoopExit {
    let mut total: u64 = 0;

    loop {
        let next = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                return LoopExit::Shutdown;
            }
            next = source.next_frame() => next,
        };

        match next {
            Ok(Some(mut frame)) => {
                total += 1;
                if total % 100 == 0 {
                    debug!(total, recording = controller.is_recording(), "frames processed");
                }

                let event = detector.detect(&frame);
                if event.detected {
                    debug!(time = frame.local_time(), seq = frame.seq, "movement detected");
                }
                if config.display.annotate {
                    annotate::draw_motion_box(&mut frame, &event);
                }

                let now_ms = frame.captured_at_ms;
                let detected = event.detected;
                let clip = ClipFrame {
                    frame,
                    delta: event.delta,
                    mask: event.mask,
                };
                match controller.tick(now_ms, detected, clip) {
                    Ok(actions) => {
                        for action in actions {
                            recorder.apply(action).await;
                        }
                    }
                    Err(e) => warn!(error = %e, "controller rejected frame"),
                }
            }
            Ok(None) => return LoopExit::EndOfStream,
            Err(SourceError::InvalidFrame(e)) => {
                warn!(error = %e, "skipping unusable frame");
            }
            Err(e) => {
                error!(error = %e, "camera stream error");
                return LoopExit::StreamError;
            }
        }
    }
}
