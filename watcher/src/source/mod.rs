pub mod mjpeg;

use chrono::Utc;
use motion_sentry_common::config::CameraConfig;
use motion_sentry_common::frame::{FrameError, VideoFrame};
use std::time::Duration;
use tracing::{info, warn};

use mjpeg::MjpegStream;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP connection failed: {0}")]
    Connect(reqwest::Error),
    #[error("HTTP stream error: {0}")]
    Stream(reqwest::Error),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    #[error("unknown camera mode {0:?}, expected \"mjpeg\" or \"polling\"")]
    UnknownMode(String),
    /// The transport delivered bytes that do not form a usable frame. The
    /// caller skips the frame; detector and session state stay untouched.
    #[error(transparent)]
    InvalidFrame(#[from] FrameError),
}

enum SourceKind {
    Mjpeg(MjpegStream),
    Polling {
        client: reqwest::Client,
        url: String,
        ticker: tokio::time::Interval,
    },
}

/// Pull-based frame source. Delivers frames strictly in arrival order from a
/// single loop, stamped with capture time and a monotonically increasing
/// sequence number.
pub struct FrameSource {
    kind: SourceKind,
    seq: u64,
}

impl FrameSource {
    pub async fn connect(config: &CameraConfig) -> Result<Self, SourceError> {
        let kind = match config.mode.as_str() {
            "mjpeg" => {
                let url = format!(
                    "{}?quality={}&fps={}",
                    config.url, config.quality, config.fps
                );
                SourceKind::Mjpeg(MjpegStream::connect(&url).await?)
            }
            "polling" => {
                let url = format!(
                    "{}?quality={}",
                    config.url.replace("/stream", "/frame"),
                    config.quality
                );
                let client = reqwest::Client::builder()
                    .connect_timeout(Duration::from_secs(10))
                    .build()
                    .map_err(SourceError::Connect)?;
                let mut ticker =
                    tokio::time::interval(Duration::from_secs_f64(1.0 / config.fps.max(0.1)));
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                info!(url, fps = config.fps, "polling camera for single frames");
                SourceKind::Polling {
                    client,
                    url,
                    ticker,
                }
            }
            other => return Err(SourceError::UnknownMode(other.to_string())),
        };
        Ok(Self { kind, seq: 0 })
    }

    /// Next frame in arrival order, or None once the stream ends cleanly.
    pub async fn next_frame(&mut self) -> Result<Option<VideoFrame>, SourceError> {
        let jpeg = match &mut self.kind {
            SourceKind::Mjpeg(stream) => stream.next_jpeg().await?,
            SourceKind::Polling {
                client,
                url,
                ticker,
            } => {
                ticker.tick().await;
                let resp = client
                    .get(url.as_str())
                    .send()
                    .await
                    .map_err(SourceError::Stream)?;
                if !resp.status().is_success() {
                    warn!(status = %resp.status(), "non-success response from camera");
                    return Err(SourceError::HttpStatus(resp.status().as_u16()));
                }
                Some(resp.bytes().await.map_err(SourceError::Stream)?.to_vec())
            }
        };

        match jpeg {
            None => Ok(None),
            Some(data) => {
                let seq = self.seq;
                self.seq += 1;
                let now_ms = Utc::now().timestamp_millis();
                let frame = VideoFrame::from_jpeg(&data, now_ms, seq)?;
                Ok(Some(frame))
            }
        }
    }
}
