use anyhow::{bail, Result};
use image::{DynamicImage, GrayImage, Luma, RgbaImage};
use tracing::warn;

/// Prepares a captured frame for OCR.
///
/// Grayscale, Otsu binarization with inverted polarity (dark text on a bright
/// background becomes white foreground), then a morphological opening with a
/// `open_kernel`-sized square to drop isolated noise pixels.
///
/// On failure the original frame is returned unmodified.
pub fn preprocess(img: &RgbaImage, open_kernel: u32) -> DynamicImage {
    match try_preprocess(img, open_kernel) {
        Ok(binary) => DynamicImage::ImageLuma8(binary),
        Err(e) => {
            warn!("Preprocessing failed, using original frame: {}", e);
            DynamicImage::ImageRgba8(img.clone())
        }
    }
}

fn try_preprocess(img: &RgbaImage, open_kernel: u32) -> Result<GrayImage> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        bail!("empty frame ({}x{})", width, height);
    }

    let gray = image::imageops::grayscale(img);
    let threshold = otsu_threshold(&gray);
    let binary = threshold_inverted(&gray, threshold);
    Ok(morphological_open(&binary, open_kernel))
}

/// Computes the Otsu threshold of a grayscale image.
///
/// Pixels `<= threshold` form the dark class.
pub fn otsu_threshold(img: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for pixel in img.pixels() {
        histogram[pixel[0] as usize] += 1;
    }

    let total = (img.width() as u64 * img.height() as u64) as f64;
    if total == 0.0 {
        return 0;
    }
    let weighted_sum: f64 = histogram
        .iter()
        .enumerate()
        .map(|(value, &count)| value as f64 * count as f64)
        .sum();

    let mut background_weight = 0.0;
    let mut background_sum = 0.0;
    let mut best_variance = 0.0;
    let mut threshold = 0u8;

    for (value, &count) in histogram.iter().enumerate() {
        background_weight += count as f64;
        if background_weight == 0.0 {
            continue;
        }
        let foreground_weight = total - background_weight;
        if foreground_weight == 0.0 {
            break;
        }

        background_sum += value as f64 * count as f64;
        let background_mean = background_sum / background_weight;
        let foreground_mean = (weighted_sum - background_sum) / foreground_weight;
        let between = background_weight
            * foreground_weight
            * (background_mean - foreground_mean).powi(2);

        if between > best_variance {
            best_variance = between;
            threshold = value as u8;
        }
    }

    threshold
}

/// Pixels brighter than `threshold` become black (background), all others
/// white (text).
pub fn threshold_inverted(img: &GrayImage, threshold: u8) -> GrayImage {
    let (width, height) = img.dimensions();
    let mut output = GrayImage::new(width, height);

    for (x, y, pixel) in img.enumerate_pixels() {
        let value = if pixel[0] > threshold { 0u8 } else { 255u8 };
        output.put_pixel(x, y, Luma([value]));
    }

    output
}

/// Erosion followed by dilation of white foreground with a `kernel`×`kernel`
/// square. Kernels of size 0 or 1 leave the image unchanged.
pub fn morphological_open(img: &GrayImage, kernel: u32) -> GrayImage {
    if kernel <= 1 {
        return img.clone();
    }
    let eroded = apply_kernel(img, kernel, 1, u8::min, u8::MAX);
    apply_kernel(&eroded, kernel, -1, u8::max, u8::MIN)
}

/// Folds every pixel with its kernel neighbourhood. `direction` mirrors the
/// kernel so that dilation undoes erosion on shapes that survived it.
/// Out-of-bounds neighbours are ignored.
fn apply_kernel(
    img: &GrayImage,
    kernel: u32,
    direction: i64,
    fold: fn(u8, u8) -> u8,
    init: u8,
) -> GrayImage {
    let (width, height) = img.dimensions();
    let anchor = (kernel / 2) as i64;
    let span = kernel as i64;
    let mut output = GrayImage::new(width, height);

    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let mut acc = init;
            for dy in -anchor..span - anchor {
                let sy = y + direction * dy;
                if sy < 0 || sy >= height as i64 {
                    continue;
                }
                for dx in -anchor..span - anchor {
                    let sx = x + direction * dx;
                    if sx < 0 || sx >= width as i64 {
                        continue;
                    }
                    acc = fold(acc, img.get_pixel(sx as u32, sy as u32)[0]);
                }
            }
            output.put_pixel(x as u32, y as u32, Luma([acc]));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_otsu_splits_two_levels() {
        let img = GrayImage::from_fn(10, 10, |x, _| if x < 5 { Luma([20]) } else { Luma([200]) });
        let threshold = otsu_threshold(&img);
        assert!(threshold >= 20 && threshold < 200, "threshold {}", threshold);
    }

    #[test]
    fn test_threshold_inverted() {
        let mut img = GrayImage::new(2, 1);
        img.put_pixel(0, 0, Luma([30]));
        img.put_pixel(1, 0, Luma([220]));

        let result = threshold_inverted(&img, 100);

        assert_eq!(result.get_pixel(0, 0)[0], 255, "Dark pixel should become foreground");
        assert_eq!(result.get_pixel(1, 0)[0], 0, "Bright pixel should become background");
    }

    #[test]
    fn test_open_removes_isolated_pixel() {
        let mut img = GrayImage::new(10, 10);
        img.put_pixel(2, 2, Luma([255]));
        for y in 5..8 {
            for x in 5..8 {
                img.put_pixel(x, y, Luma([255]));
            }
        }

        let opened = morphological_open(&img, 2);

        assert_eq!(opened.get_pixel(2, 2)[0], 0, "Isolated pixel should be removed");
        for y in 5..8 {
            for x in 5..8 {
                assert_eq!(opened.get_pixel(x, y)[0], 255, "Block pixel ({}, {}) lost", x, y);
            }
        }
        assert_eq!(opened.get_pixel(8, 8)[0], 0);
    }

    #[test]
    fn test_open_kernel_one_is_identity() {
        let img = GrayImage::from_fn(4, 4, |x, y| Luma([((x + y) % 2 * 255) as u8]));
        assert_eq!(morphological_open(&img, 1), img);
    }

    #[test]
    fn test_preprocess_turns_dark_text_into_foreground() {
        // Bright background with a dark 4x4 "glyph"
        let img = RgbaImage::from_fn(20, 20, |x, y| {
            if (8..12).contains(&x) && (8..12).contains(&y) {
                Rgba([10, 10, 10, 255])
            } else {
                Rgba([240, 240, 240, 255])
            }
        });

        let processed = preprocess(&img, 2).to_luma8();

        assert_eq!(processed.get_pixel(9, 9)[0], 255);
        assert_eq!(processed.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_preprocess_empty_frame_passes_through() {
        let img = RgbaImage::new(0, 0);
        let processed = preprocess(&img, 2);
        assert!(matches!(processed, DynamicImage::ImageRgba8(_)));
    }
}
