use image::GrayImage;

/// Per-pixel absolute difference of two equally-sized grayscale images.
pub fn absdiff(a: &GrayImage, b: &GrayImage) -> GrayImage {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    let pixels: Vec<u8> = a
        .as_raw()
        .iter()
        .zip(b.as_raw().iter())
        .map(|(&x, &y)| x.abs_diff(y))
        .collect();
    GrayImage::from_raw(a.width(), a.height(), pixels)
        .unwrap_or_else(|| GrayImage::new(a.width(), a.height()))
}

/// Binarize: pixels with value >= thresh become 255, everything else 0.
pub fn threshold(delta: &GrayImage, thresh: u8) -> GrayImage {
    let pixels: Vec<u8> = delta
        .as_raw()
        .iter()
        .map(|&p| if p >= thresh { 255 } else { 0 })
        .collect();
    GrayImage::from_raw(delta.width(), delta.height(), pixels)
        .unwrap_or_else(|| GrayImage::new(delta.width(), delta.height()))
}

/// Repeated 3x3 max-filter passes. On a binary mask this grows each on-blob
/// by one pixel per pass, merging nearby blobs into contiguous regions.
///
/// No matching erosion pass exists, so an isolated noise spike survives —
/// known limitation inherited from the detection design.
pub fn dilate(mask: &GrayImage, iterations: u32) -> GrayImage {
    let (w, h) = mask.dimensions();
    let mut current = mask.clone();
    for _ in 0..iterations {
        let mut next = GrayImage::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let mut max = 0u8;
                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        let nx = x as i64 + dx;
                        let ny = y as i64 + dy;
                        if nx >= 0 && ny >= 0 && nx < w as i64 && ny < h as i64 {
                            max = max.max(current.get_pixel(nx as u32, ny as u32).0[0]);
                        }
                    }
                }
                next.put_pixel(x, y, image::Luma([max]));
            }
        }
        current = next;
    }
    current
}

/// Tight bounding box `(x, y, w, h)` of all on-pixels, or None if the mask
/// is entirely off.
pub fn bounding_rect(mask: &GrayImage) -> Option<(u32, u32, u32, u32)> {
    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0u32;
    let mut max_y = 0u32;
    let mut any = false;

    for (x, y, p) in mask.enumerate_pixels() {
        if p.0[0] > 0 {
            any = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    if any {
        Some((min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
    } else {
        None
    }
}
