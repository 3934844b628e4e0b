use image::Rgb;
use motion_sentry_common::frame::VideoFrame;

use crate::detect::{morph, MotionEvent};

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: u32 = 2;

/// Draw a bounding rectangle around the motion region onto the feed image,
/// before the frame is buffered or recorded. No-op when nothing moved.
pub fn draw_motion_box(frame: &mut VideoFrame, event: &MotionEvent) {
    if !event.detected {
        return;
    }
    let Some((x, y, w, h)) = morph::bounding_rect(&event.mask) else {
        return;
    };

    let img = &mut frame.image;
    let (fw, fh) = img.dimensions();
    let x1 = (x + w).min(fw);
    let y1 = (y + h).min(fh);

    for t in 0..BOX_THICKNESS {
        // Horizontal edges.
        for px in x..x1 {
            if y + t < fh {
                img.put_pixel(px, y + t, BOX_COLOR);
            }
            if y1 > t + 1 {
                img.put_pixel(px, y1 - t - 1, BOX_COLOR);
            }
        }
        // Vertical edges.
        for py in y..y1 {
            if x + t < fw {
                img.put_pixel(x + t, py, BOX_COLOR);
            }
            if x1 > t + 1 {
                img.put_pixel(x1 - t - 1, py, BOX_COLOR);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, RgbImage};

    fn event(mask: GrayImage, detected: bool) -> MotionEvent {
        MotionEvent {
            detected,
            delta: GrayImage::new(mask.width(), mask.height()),
            mask,
        }
    }

    #[test]
    fn no_motion_leaves_frame_untouched() {
        let img = RgbImage::from_pixel(16, 16, Rgb([10, 10, 10]));
        let mut frame = VideoFrame::new(img.clone(), 0, 0).unwrap();
        draw_motion_box(&mut frame, &event(GrayImage::new(16, 16), false));
        assert_eq!(frame.image, img);
    }

    #[test]
    fn box_surrounds_mask_region() {
        let mut frame =
            VideoFrame::new(RgbImage::from_pixel(16, 16, Rgb([10, 10, 10])), 0, 0).unwrap();
        let mut mask = GrayImage::new(16, 16);
        for y in 5..10 {
            for x in 4..12 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        draw_motion_box(&mut frame, &event(mask, true));

        // Corners of the rectangle are painted, the interior is not.
        assert_eq!(*frame.image.get_pixel(4, 5), BOX_COLOR);
        assert_eq!(*frame.image.get_pixel(11, 9), BOX_COLOR);
        assert_eq!(*frame.image.get_pixel(7, 7), Rgb([10, 10, 10]));
    }

    #[test]
    fn mask_touching_frame_edges_does_not_panic() {
        let mut frame =
            VideoFrame::new(RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])), 0, 0).unwrap();
        let mask = GrayImage::from_pixel(8, 8, Luma([255]));
        draw_motion_box(&mut frame, &event(mask, true));
        assert_eq!(*frame.image.get_pixel(0, 0), BOX_COLOR);
        assert_eq!(*frame.image.get_pixel(7, 7), BOX_COLOR);
    }
}
