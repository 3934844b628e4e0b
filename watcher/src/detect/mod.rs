pub mod morph;

use image::imageops;
use image::GrayImage;
use motion_sentry_common::config::DetectorConfig;
use motion_sentry_common::frame::VideoFrame;
use tracing::{debug, warn};

/// Per-frame verdict plus the images derived along the way. The delta and
/// mask feed both annotation and the recorded artifact streams.
#[derive(Debug, Clone)]
pub struct MotionEvent {
    pub detected: bool,
    /// Absolute difference against the previous denoised frame.
    pub delta: GrayImage,
    /// Thresholded and dilated delta (0/255).
    pub mask: GrayImage,
}

/// Frame-to-frame change detector.
///
/// Holds one piece of state between calls: the previous frame's denoised
/// grayscale form, replaced unconditionally every call. Diffing against the
/// immediately preceding frame (rather than a background model) means a slow
/// gradual change goes undetected and a scene cut re-triggers briefly.
pub struct ChangeDetector {
    motion_threshold: u8,
    blur_sigma: f32,
    dilation_iterations: u32,
    prev: Option<GrayImage>,
}

impl ChangeDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            motion_threshold: config.motion_threshold,
            blur_sigma: blur_sigma(config.blur_kernel_size),
            dilation_iterations: config.dilation_iterations,
            prev: None,
        }
    }

    /// Decide whether this frame shows motion relative to the previous one.
    pub fn detect(&mut self, frame: &VideoFrame) -> MotionEvent {
        let gray = self.denoise(frame);
        let (w, h) = gray.dimensions();

        let prev = match self.prev.take() {
            Some(p) if p.dimensions() == gray.dimensions() => Some(p),
            Some(p) => {
                // Camera renegotiated its resolution mid-stream; the stored
                // baseline is unusable. Start over from this frame.
                warn!(
                    prev_w = p.width(),
                    prev_h = p.height(),
                    w,
                    h,
                    "frame dimensions changed, resetting motion baseline"
                );
                None
            }
            None => None,
        };

        let event = match prev {
            None => {
                debug!(seq = frame.seq, "no previous frame, reporting no motion");
                MotionEvent {
                    detected: false,
                    delta: GrayImage::new(w, h),
                    mask: GrayImage::new(w, h),
                }
            }
            Some(prev) => {
                let delta = morph::absdiff(&prev, &gray);
                let mask = morph::dilate(
                    &morph::threshold(&delta, self.motion_threshold),
                    self.dilation_iterations,
                );
                let detected = mask.pixels().any(|p| p.0[0] > 0);
                debug!(seq = frame.seq, detected, "frame diffed against previous");
                MotionEvent {
                    detected,
                    delta,
                    mask,
                }
            }
        };

        self.prev = Some(gray);
        event
    }

    /// Drop the stored baseline, e.g. after a stream reconnect. The next
    /// frame is treated as a first frame.
    pub fn reset(&mut self) {
        self.prev = None;
    }

    fn denoise(&self, frame: &VideoFrame) -> GrayImage {
        let gray = imageops::grayscale(&frame.image);
        if self.blur_sigma > 0.0 {
            imageops::blur(&gray, self.blur_sigma)
        } else {
            gray
        }
    }
}

/// Gaussian sigma for an odd kernel size, following the OpenCV convention
/// `sigma = 0.3*((k-1)*0.5 - 1) + 0.8`. Kernel sizes of 0 or 1 disable the
/// blur entirely.
fn blur_sigma(kernel_size: u32) -> f32 {
    if kernel_size <= 1 {
        0.0
    } else {
        0.3 * ((kernel_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn frame(image: RgbImage, ts: i64) -> VideoFrame {
        VideoFrame::new(image, ts, ts as u64).unwrap()
    }

    fn flat_frame(w: u32, h: u32, value: u8, ts: i64) -> VideoFrame {
        frame(RgbImage::from_pixel(w, h, Rgb([value, value, value])), ts)
    }

    fn detector(threshold: u8, kernel: u32, dilations: u32) -> ChangeDetector {
        ChangeDetector::new(&DetectorConfig {
            motion_threshold: threshold,
            blur_kernel_size: kernel,
            dilation_iterations: dilations,
        })
    }

    #[test]
    fn first_frame_is_never_motion() {
        let mut det = detector(8, 21, 3);
        let event = det.detect(&flat_frame(32, 32, 100, 0));
        assert!(!event.detected);
        assert!(event.mask.pixels().all(|p| p.0[0] == 0));
        assert!(event.delta.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn static_scene_stays_quiet() {
        let mut det = detector(8, 21, 3);
        for t in 0..5 {
            let event = det.detect(&flat_frame(32, 32, 100, t));
            assert!(!event.detected, "identical frame {t} flagged as motion");
        }
    }

    #[test]
    fn region_shift_above_threshold_detected() {
        let mut det = detector(8, 21, 3);
        det.detect(&flat_frame(64, 64, 100, 0));

        // Brighten a 24x24 block by 60 — well above the threshold even after
        // the blur softens the block's edges.
        let mut img = RgbImage::from_pixel(64, 64, Rgb([100, 100, 100]));
        for y in 20..44 {
            for x in 20..44 {
                img.put_pixel(x, y, Rgb([160, 160, 160]));
            }
        }
        let event = det.detect(&frame(img, 1));
        assert!(event.detected);
        assert!(morph::bounding_rect(&event.mask).is_some());
    }

    #[test]
    fn shift_below_threshold_ignored() {
        let mut det = detector(8, 0, 3);
        det.detect(&flat_frame(32, 32, 100, 0));
        // Uniform +5 is under the threshold of 8 everywhere.
        let event = det.detect(&flat_frame(32, 32, 105, 1));
        assert!(!event.detected);
    }

    #[test]
    fn previous_frame_is_replaced_each_call() {
        let mut det = detector(8, 0, 0);
        det.detect(&flat_frame(16, 16, 0, 0));
        assert!(det.detect(&flat_frame(16, 16, 200, 1)).detected);
        // Same bright frame again: diff against the *new* previous is zero.
        assert!(!det.detect(&flat_frame(16, 16, 200, 2)).detected);
    }

    #[test]
    fn dimension_change_resets_baseline() {
        let mut det = detector(8, 0, 0);
        det.detect(&flat_frame(32, 32, 0, 0));
        // Completely different content at a new size: treated as first frame.
        let event = det.detect(&flat_frame(16, 16, 255, 1));
        assert!(!event.detected);
        // But the new baseline is in place afterwards.
        assert!(det.detect(&flat_frame(16, 16, 0, 2)).detected);
    }

    #[test]
    fn sigma_for_default_kernel() {
        assert!((blur_sigma(21) - 3.5).abs() < 1e-6);
        assert_eq!(blur_sigma(1), 0.0);
        assert_eq!(blur_sigma(0), 0.0);
    }
}
