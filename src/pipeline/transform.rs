//! Image-transform primitives shared by the skew search and the
//! normalization chain.
//!
//! Both stages must rotate the same way: if the search measured an angle on
//! an image rotated with a white fill and an expanded canvas, the chain has to
//! apply it identically or the measured alignment is lost. Keeping the
//! primitives in one place guarantees that.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Rgba, RgbaImage};
use imageproc::contrast::{threshold, ThresholdType};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};

/// Luminance threshold used for every binarization step.
///
/// Pixels brighter than this become background (255), the rest ink (0).
pub const BINARIZE_THRESHOLD: u8 = 128;

/// Unsharp-mask radius applied after resizing.
pub const SHARPEN_SIGMA: f32 = 1.0;

/// Unsharp-mask difference below which pixels are left untouched.
pub const SHARPEN_THRESHOLD: i32 = 1;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Rotate `img` by `degrees` (clockwise) on a white, expanded canvas.
///
/// The canvas grows to the bounding box of the rotated image so no content is
/// cropped; uncovered corners are filled white rather than black so the
/// rotation never adds dark artefacts that a later threshold would turn into
/// ink.
pub fn rotate_with_fill(img: &DynamicImage, degrees: f32) -> DynamicImage {
    if img.width() == 0 || img.height() == 0 {
        return img.clone();
    }
    if degrees == 0.0 {
        return flatten_onto_white(img);
    }

    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    let theta = degrees.to_radians();
    let (sin, cos) = (theta.sin().abs(), theta.cos().abs());
    let new_w = (w as f32 * cos + h as f32 * sin).ceil().max(w as f32) as u32;
    let new_h = (w as f32 * sin + h as f32 * cos).ceil().max(h as f32) as u32;

    let mut canvas = RgbaImage::from_pixel(new_w, new_h, WHITE);
    let offset_x = i64::from((new_w - w) / 2);
    let offset_y = i64::from((new_h - h) / 2);
    imageops::overlay(&mut canvas, &rgba, offset_x, offset_y);

    let rotated = rotate_about_center(&canvas, theta, Interpolation::Bilinear, WHITE);
    DynamicImage::ImageRgba8(rotated)
}

/// Composite `img` over a white background of the same size.
///
/// Transparent pixels would otherwise read as black in grayscale and be
/// scored as ink. Images without alpha are returned as-is.
pub fn flatten_onto_white(img: &DynamicImage) -> DynamicImage {
    if !img.color().has_alpha() {
        return img.clone();
    }
    let mut canvas = RgbaImage::from_pixel(img.width(), img.height(), WHITE);
    imageops::overlay(&mut canvas, &img.to_rgba8(), 0, 0);
    DynamicImage::ImageRgba8(canvas)
}

/// Shrink `img` to fit inside a `max_edge` square, preserving aspect ratio.
///
/// Never enlarges: an image that already fits is returned unchanged.
pub fn fit_within(img: &DynamicImage, max_edge: u32, filter: FilterType) -> DynamicImage {
    if img.width().max(img.height()) <= max_edge {
        return img.clone();
    }
    img.resize(max_edge, max_edge, filter)
}

/// Single-channel luminance copy of `img`.
pub fn grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Unsharp mask to recover edge contrast lost while resizing.
pub fn sharpen(img: &GrayImage) -> GrayImage {
    imageops::unsharpen(img, SHARPEN_SIGMA, SHARPEN_THRESHOLD)
}

/// Binarize at [`BINARIZE_THRESHOLD`]: ink becomes 0, background 255.
pub fn binarize(img: &GrayImage) -> GrayImage {
    threshold(img, BINARIZE_THRESHOLD, ThresholdType::Binary)
}

/// Row-major one-byte-per-pixel buffer with its dimensions.
pub fn raw_pixels(img: GrayImage) -> (Vec<u8>, u32, u32) {
    let (w, h) = img.dimensions();
    (img.into_raw(), w, h)
}
