use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, error, info, warn};

/// Input pixel layout piped to ffmpeg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Gray,
}

impl PixelFormat {
    fn ffmpeg_name(self) -> &'static str {
        match self {
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Gray => "gray",
        }
    }

    fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb24 => 3,
            PixelFormat::Gray => 1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("failed to spawn ffmpeg: {0}")]
    Spawn(String),
    #[error("frame has {got} bytes, encoder expects {expected}")]
    BadFrameSize { got: usize, expected: usize },
    #[error("failed to write frame to ffmpeg stdin: {0}")]
    Write(String),
    #[error("failed to wait for ffmpeg: {0}")]
    Wait(String),
    #[error("ffmpeg exited with non-zero status: {0}")]
    FfmpegFailed(String),
}

/// One ffmpeg subprocess encoding raw frames piped to its stdin into an MP4
/// written directly at the clip path.
pub struct VideoEncoder {
    child: Child,
    stdin: ChildStdin,
    output_path: PathBuf,
    frame_bytes: usize,
    frame_count: u32,
}

impl VideoEncoder {
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        output_path: &Path,
        width: u32,
        height: u32,
        fps: f64,
        pix_fmt: PixelFormat,
        codec: &str,
        crf: u32,
        preset: &str,
    ) -> Result<Self, EncoderError> {
        let vcodec = match codec {
            "h265" => "libx265",
            _ => "libx264",
        };

        let out = output_path
            .to_str()
            .ok_or_else(|| EncoderError::Spawn("non-UTF-8 output path".into()))?;

        let mut cmd = Command::new("ffmpeg");
        cmd.args(encode_args(
            width, height, fps, pix_fmt, vcodec, crf, preset, out,
        ))
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| EncoderError::Spawn(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EncoderError::Spawn("could not get stdin handle".into()))?;

        debug!(
            codec = vcodec,
            crf,
            preset,
            fps,
            width,
            height,
            pix_fmt = pix_fmt.ffmpeg_name(),
            output = out,
            "ffmpeg encoder started"
        );

        Ok(Self {
            child,
            stdin,
            output_path: output_path.to_path_buf(),
            frame_bytes: width as usize * height as usize * pix_fmt.bytes_per_pixel(),
            frame_count: 0,
        })
    }

    /// Write one frame's raw pixel bytes to ffmpeg's stdin pipe.
    pub async fn push(&mut self, raw: &[u8]) -> Result<(), EncoderError> {
        if raw.len() != self.frame_bytes {
            return Err(EncoderError::BadFrameSize {
                got: raw.len(),
                expected: self.frame_bytes,
            });
        }
        self.stdin
            .write_all(raw)
            .await
            .map_err(|e| EncoderError::Write(e.to_string()))?;
        self.frame_count += 1;
        Ok(())
    }

    /// Finalize: close stdin so ffmpeg flushes, wait, report frames written.
    pub async fn finish(self) -> Result<u32, EncoderError> {
        drop(self.stdin);

        let output = self
            .child
            .wait_with_output()
            .await
            .map_err(|e| EncoderError::Wait(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(stderr = %stderr, "ffmpeg exited with error");
            return Err(EncoderError::FfmpegFailed(stderr.into_owned()));
        }

        info!(
            frame_count = self.frame_count,
            output = self.output_path.display().to_string(),
            "clip stream encoded"
        );
        Ok(self.frame_count)
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }
}

/// Build the ffmpeg argument list for one clip stream.
///
/// `-nostats -loglevel error` keeps the stderr pipe quiet during encoding:
/// clips are unbounded, and ffmpeg's periodic progress line would eventually
/// fill the pipe (nobody reads stderr until `finish`), blocking ffmpeg and,
/// through stdin back-pressure, the whole frame loop. Errors still reach
/// stderr for `finish` to report.
#[allow(clippy::too_many_arguments)]
fn encode_args(
    width: u32,
    height: u32,
    fps: f64,
    pix_fmt: PixelFormat,
    vcodec: &str,
    crf: u32,
    preset: &str,
    out: &str,
) -> Vec<String> {
    let size = format!("{width}x{height}");
    let fps_str = fps.to_string();
    let crf_str = crf.to_string();
    [
        "-nostats",
        "-loglevel", "error",
        "-f", "rawvideo",
        "-pix_fmt", pix_fmt.ffmpeg_name(),
        "-s", size.as_str(),
        "-r", fps_str.as_str(),
        "-i", "pipe:0",
        "-c:v", vcodec,
        "-preset", preset,
        "-crf", crf_str.as_str(),
        "-pix_fmt", "yuv420p",
        "-movflags", "+faststart",
        "-y",
        out,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Check whether ffmpeg is available on PATH. Logs a warning if not found.
pub async fn check_ffmpeg_available() {
    match Command::new("ffmpeg").arg("-version").output().await {
        Ok(out) if out.status.success() => {
            debug!("ffmpeg is available");
        }
        Ok(_) => {
            warn!("ffmpeg returned non-zero for -version; encoding may fail");
        }
        Err(e) => {
            warn!(
                error = %e,
                "ffmpeg not found on PATH; clips cannot be recorded. \
                 Install ffmpeg with libx264/libx265 support."
            );
        }
    }
}
