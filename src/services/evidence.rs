//! Frame to evidence-image preprocessing
//!
//! Produces a binary image where 255 marks pixels noticeably darker than their
//! neighbourhood (edges, shadows, car bodies) and 0 marks background. Parameters
//! are fixed.

use image::{DynamicImage, GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::filter::{gaussian_blur_f32, median_filter};
use imageproc::morphology::dilate;

const BLUR_SIGMA: f32 = 1.0;
/// Gaussian sigma equivalent to a 25x25 weighted neighbourhood
const LOCAL_SIGMA: f32 = 4.1;
/// Offset subtracted from the local mean before comparing
const THRESHOLD_OFFSET: i16 = 16;
/// 5x5 median window
const MEDIAN_RADIUS: u32 = 2;

const ACTIVE: u8 = 255;

/// Inverted adaptive threshold: active where `pixel <= local_mean - offset`
fn adaptive_threshold_inv(image: &GrayImage) -> GrayImage {
    let local_mean = gaussian_blur_f32(image, LOCAL_SIGMA);
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let px = image.get_pixel(x, y)[0] as i16;
        let mean = local_mean.get_pixel(x, y)[0] as i16;
        if px <= mean - THRESHOLD_OFFSET {
            Luma([ACTIVE])
        } else {
            Luma([0])
        }
    })
}

/// Convert a captured frame into the evidence image the classifier counts
pub fn preprocess(frame: &DynamicImage) -> GrayImage {
    let gray = frame.to_luma8();
    let blurred = gaussian_blur_f32(&gray, BLUR_SIGMA);
    let thresholded = adaptive_threshold_inv(&blurred);
    let denoised = median_filter(&thresholded, MEDIAN_RADIUS, MEDIAN_RADIUS);
    dilate(&denoised, Norm::LInf, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn active_count(img: &GrayImage) -> usize {
        img.as_raw().iter().filter(|&&p| p != 0).count()
    }

    #[test]
    fn test_uniform_frame_has_no_evidence() {
        let frame = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, image::Rgb([180, 180, 180])));
        let evidence = preprocess(&frame);
        assert_eq!(evidence.dimensions(), (64, 48));
        assert_eq!(active_count(&evidence), 0);
    }

    #[test]
    fn test_isolated_specks_are_removed() {
        // single dark pixels on a regular grid, like sensor noise or gravel texture
        let frame = RgbImage::from_fn(96, 64, |x, y| {
            if x % 8 == 4 && y % 8 == 4 {
                image::Rgb([20, 20, 20])
            } else {
                image::Rgb([220, 220, 220])
            }
        });
        let evidence = preprocess(&DynamicImage::ImageRgb8(frame));
        assert_eq!(active_count(&evidence), 0);
    }

    #[test]
    fn test_dark_object_produces_evidence_near_it() {
        let frame = RgbImage::from_fn(120, 80, |x, y| {
            if (40..80).contains(&x) && (20..60).contains(&y) {
                image::Rgb([20, 20, 20])
            } else {
                image::Rgb([220, 220, 220])
            }
        });
        let evidence = preprocess(&DynamicImage::ImageRgb8(frame));

        assert!(active_count(&evidence) > 0);
        // far corner stays clean
        for y in 0..10 {
            for x in 0..10 {
                assert_eq!(evidence.get_pixel(x, y)[0], 0);
            }
        }
        // output is binary
        assert!(evidence.as_raw().iter().all(|&p| p == 0 || p == ACTIVE));
    }
}
