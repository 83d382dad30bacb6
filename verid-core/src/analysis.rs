//! Image quality and anti-spoofing primitives.
//!
//! Plain pixel statistics over decoded images: Laplacian-variance sharpness,
//! intensity-stddev contrast, mean-gradient texture complexity, per-channel
//! variance and a bright-pixel reflection ratio. The normalization divisors
//! are empirical calibration constants and deliberately kept in one place.

use image::{DynamicImage, GrayImage};

use crate::error::{Result, VeridError};

/// Sharpness normalization divisor (Laplacian variance scale).
pub const SHARPNESS_NORM: f64 = 1000.0;
/// Contrast normalization divisor (intensity stddev scale).
pub const CONTRAST_NORM: f64 = 100.0;
/// Texture normalization divisor (mean gradient magnitude scale).
pub const TEXTURE_NORM: f64 = 50.0;
/// Color-variance normalization divisor (summed channel stddev scale).
pub const COLOR_NORM: f64 = 150.0;
/// Luma above which a pixel counts as a potential reflection.
pub const BRIGHT_LUMA: u8 = 200;

/// Decode raw bytes into an image, classifying failures as unreadable input.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes)
        .map_err(|e| VeridError::UnreadableImage(format!("failed to decode image: {e}")))
}

/// Sharpness as the variance of a 4-neighbor Laplacian response.
///
/// Higher is sharper; values around 500-1500 are typical for in-focus
/// captures, which is where [`SHARPNESS_NORM`] comes from.
pub fn sharpness(gray: &GrayImage) -> f64 {
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }

    let mut responses = Vec::with_capacity(((w - 2) * (h - 2)) as usize);
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let c = gray.get_pixel(x, y).0[0] as f64;
            let up = gray.get_pixel(x, y - 1).0[0] as f64;
            let down = gray.get_pixel(x, y + 1).0[0] as f64;
            let left = gray.get_pixel(x - 1, y).0[0] as f64;
            let right = gray.get_pixel(x + 1, y).0[0] as f64;
            responses.push(up + down + left + right - 4.0 * c);
        }
    }
    variance(&responses)
}

/// Contrast as the standard deviation of pixel intensities.
pub fn contrast(gray: &GrayImage) -> f64 {
    let values: Vec<f64> = gray.pixels().map(|p| p.0[0] as f64).collect();
    variance(&values).sqrt()
}

/// Texture complexity: mean Sobel gradient magnitude, normalized to [0, 1].
///
/// Printed or replayed faces tend to be flatter than live skin.
pub fn texture_complexity(gray: &GrayImage) -> f64 {
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }

    let px = |x: u32, y: u32| gray.get_pixel(x, y).0[0] as f64;
    let mut total = 0.0;
    let mut count = 0u64;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let gx = px(x + 1, y - 1) + 2.0 * px(x + 1, y) + px(x + 1, y + 1)
                - px(x - 1, y - 1)
                - 2.0 * px(x - 1, y)
                - px(x - 1, y + 1);
            let gy = px(x - 1, y + 1) + 2.0 * px(x, y + 1) + px(x + 1, y + 1)
                - px(x - 1, y - 1)
                - 2.0 * px(x, y - 1)
                - px(x + 1, y - 1);
            total += (gx * gx + gy * gy).sqrt();
            count += 1;
        }
    }
    let mean = if count > 0 { total / count as f64 } else { 0.0 };
    (mean / TEXTURE_NORM).min(1.0)
}

/// Color richness: summed per-channel stddev, normalized to [0, 1].
///
/// Grayscale input gets a neutral 0.5 since channel spread is undefined.
pub fn color_variance(image: &DynamicImage) -> f64 {
    let rgb = match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageLumaA8(_) => return 0.5,
        other => other.to_rgb8(),
    };

    let mut total = 0.0;
    for channel in 0..3 {
        let values: Vec<f64> = rgb.pixels().map(|p| p.0[channel] as f64).collect();
        total += variance(&values).sqrt();
    }
    (total / COLOR_NORM).min(1.0)
}

/// Reflection score: inverted ratio of very bright pixels.
///
/// Screens and glossy prints produce concentrated highlights; a clean live
/// capture scores close to 1.
pub fn reflection_score(gray: &GrayImage) -> f64 {
    let total = gray.pixels().len();
    if total == 0 {
        return 0.0;
    }
    let bright = gray.pixels().filter(|p| p.0[0] > BRIGHT_LUMA).count();
    let ratio = bright as f64 / total as f64;
    1.0 - (ratio * 10.0).min(1.0)
}

/// Blended image quality: sharpness at 0.6, contrast at 0.4.
pub fn quality_score(gray: &GrayImage) -> f64 {
    let sharpness_part = (sharpness(gray) / SHARPNESS_NORM).min(1.0);
    let contrast_part = (contrast(gray) / CONTRAST_NORM).min(1.0);
    sharpness_part * 0.6 + contrast_part * 0.4
}

/// Blended anti-spoofing heuristic: texture 0.4, color 0.3, reflection 0.3.
pub fn anti_spoofing_score(image: &DynamicImage) -> f64 {
    let gray = image.to_luma8();
    let texture = texture_complexity(&gray);
    let color = color_variance(image);
    let reflection = reflection_score(&gray);
    texture * 0.4 + color * 0.3 + reflection * 0.3
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    fn flat_gray(value: u8) -> GrayImage {
        GrayImage::from_pixel(32, 32, Luma([value]))
    }

    fn checkerboard(size: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            if (x + y) % 2 == 0 {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    /// 2-pixel vertical stripes. Period 4, so both Sobel taps see opposite
    /// stripe phases and every interior gradient is maximal.
    fn stripes(size: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, _| {
            if (x / 2) % 2 == 0 {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    #[test]
    fn test_flat_image_has_no_sharpness_or_contrast() {
        let flat = flat_gray(128);
        assert_eq!(sharpness(&flat), 0.0);
        assert_eq!(contrast(&flat), 0.0);
        assert_eq!(texture_complexity(&flat), 0.0);
    }

    #[test]
    fn test_stripes_max_out_every_statistic() {
        let banded = stripes(32);
        assert!(sharpness(&banded) > SHARPNESS_NORM);
        assert!(contrast(&banded) > CONTRAST_NORM);
        assert_eq!(texture_complexity(&banded), 1.0);
    }

    #[test]
    fn test_period_two_checkerboard_is_invisible_to_sobel() {
        // Columns x-1/x+1 and rows y-1/y+1 share parity, so both kernels
        // cancel exactly. Sharp to the Laplacian, flat to Sobel.
        let board = checkerboard(32);
        assert_eq!(texture_complexity(&board), 0.0);
        assert!(sharpness(&board) > SHARPNESS_NORM);
    }

    #[test]
    fn test_reflection_penalizes_bright_images() {
        let dark = flat_gray(50);
        assert_eq!(reflection_score(&dark), 1.0);

        let blown_out = flat_gray(255);
        assert_eq!(reflection_score(&blown_out), 0.0);
    }

    #[test]
    fn test_color_variance_neutral_for_grayscale() {
        let gray = DynamicImage::ImageLuma8(flat_gray(90));
        assert_eq!(color_variance(&gray), 0.5);
    }

    #[test]
    fn test_color_variance_flat_rgb_is_zero() {
        let flat = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([10, 200, 40])));
        assert_eq!(color_variance(&flat), 0.0);
    }

    #[test]
    fn test_quality_score_bounds() {
        let board = stripes(32);
        let q = quality_score(&board);
        assert!((0.0..=1.0).contains(&q));
        assert_eq!(q, 1.0); // both parts saturate

        assert_eq!(quality_score(&flat_gray(0)), 0.0);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_image(&[0x00, 0x01, 0x02]).unwrap_err();
        assert!(matches!(err, VeridError::UnreadableImage(_)));
    }
}
