pub mod encoder;
pub mod naming;

use motion_sentry_common::config::RecordingConfig;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::session::{ClipFrame, RecordingAction};
use encoder::{EncoderError, PixelFormat, VideoEncoder};

struct Streams {
    feed: VideoEncoder,
    delta: Option<VideoEncoder>,
    mask: Option<VideoEncoder>,
}

struct ActiveClip {
    dir: PathBuf,
    started_at_ms: i64,
    /// Spawned lazily on the first append, once frame dimensions are known.
    streams: Option<Streams>,
}

/// Applies the session controller's actions to the filesystem: one clip
/// directory per session, up to three parallel ffmpeg streams per clip.
///
/// Encoder failures abort the current clip with an error log; they never
/// propagate into the frame loop.
pub struct ClipRecorder {
    config: RecordingConfig,
    active: Option<ActiveClip>,
}

impl ClipRecorder {
    pub fn new(config: RecordingConfig) -> Self {
        Self {
            config,
            active: None,
        }
    }

    pub async fn apply(&mut self, action: RecordingAction) {
        match action {
            RecordingAction::NoOp => {}
            RecordingAction::Start { started_at_ms } => self.start(started_at_ms).await,
            RecordingAction::Append(clip) => self.append(&clip).await,
            RecordingAction::Stop => self.finish().await,
        }
    }

    async fn start(&mut self, started_at_ms: i64) {
        if self.active.is_some() {
            warn!("start requested while a clip is already open, finalizing it first");
            self.finish().await;
        }

        let dir = naming::clip_dir(self.config.dir.as_ref(), started_at_ms);
        if let Err(e) = std::fs::create_dir_all(&dir) {
            error!(dir = dir.display().to_string(), error = %e, "failed to create clip directory");
            return;
        }

        info!(dir = dir.display().to_string(), "began recording");
        self.active = Some(ActiveClip {
            dir,
            started_at_ms,
            streams: None,
        });
    }

    async fn append(&mut self, clip: &ClipFrame) {
        if self.active.is_none() {
            warn!(seq = clip.frame.seq, "append without an open clip, dropping frame");
            return;
        }

        let unopened = self
            .active
            .as_ref()
            .filter(|a| a.streams.is_none())
            .map(|a| a.dir.clone());
        if let Some(dir) = unopened {
            match self.spawn_streams(&dir, clip) {
                Ok(streams) => {
                    if let Some(active) = self.active.as_mut() {
                        active.streams = Some(streams);
                    }
                }
                Err(e) => {
                    error!(error = %e, "failed to start clip encoders, aborting clip");
                    self.abort().await;
                    return;
                }
            }
        }

        let Some(streams) = self.active.as_mut().and_then(|a| a.streams.as_mut()) else {
            return;
        };

        let result = async {
            streams.feed.push(clip.frame.image.as_raw()).await?;
            if let Some(delta) = streams.delta.as_mut() {
                delta.push(clip.delta.as_raw()).await?;
            }
            if let Some(mask) = streams.mask.as_mut() {
                mask.push(clip.mask.as_raw()).await?;
            }
            Ok::<(), EncoderError>(())
        }
        .await;

        if let Err(e) = result {
            error!(seq = clip.frame.seq, error = %e, "failed to write frame, aborting clip");
            self.abort().await;
        }
    }

    fn spawn_streams(&self, dir: &std::path::Path, clip: &ClipFrame) -> Result<Streams, EncoderError> {
        let (w, h) = (clip.frame.width(), clip.frame.height());
        let c = &self.config;

        let open = |file: &str, pix_fmt: PixelFormat| {
            VideoEncoder::start(
                &dir.join(file),
                w,
                h,
                c.fps,
                pix_fmt,
                &c.codec,
                c.crf,
                &c.preset,
            )
        };

        let feed = open(naming::FEED_FILE, PixelFormat::Rgb24)?;
        let delta = if c.write_delta {
            Some(open(naming::DELTA_FILE, PixelFormat::Gray)?)
        } else {
            None
        };
        let mask = if c.write_mask {
            Some(open(naming::MASK_FILE, PixelFormat::Gray)?)
        } else {
            None
        };

        Ok(Streams { feed, delta, mask })
    }

    async fn finish(&mut self) {
        let Some(active) = self.active.take() else {
            warn!("stop requested with no open clip");
            return;
        };

        let Some(streams) = active.streams else {
            // Confirmed session whose encoders never spawned (e.g. directory
            // creation raced with deletion). Nothing to finalize.
            warn!(
                dir = active.dir.display().to_string(),
                "clip closed before any frame was written"
            );
            return;
        };

        let frames = streams.feed.frame_count();
        let mut ok = true;
        for enc in [Some(streams.feed), streams.delta, streams.mask]
            .into_iter()
            .flatten()
        {
            if let Err(e) = enc.finish().await {
                error!(error = %e, "clip stream failed to finalize");
                ok = false;
            }
        }

        if ok {
            info!(
                dir = active.dir.display().to_string(),
                frames,
                started_at_ms = active.started_at_ms,
                "finished recording"
            );
        }
    }

    /// Tear down a broken clip: finalize whatever ffmpeg managed to write.
    async fn abort(&mut self) {
        if self.active.is_some() {
            self.finish().await;
        }
    }
}
