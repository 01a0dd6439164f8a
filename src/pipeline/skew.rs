//! Skew angle search: find the rotation that best aligns text lines.
//!
//! ## Algorithm
//!
//! ```text
//! source ─▶ downscale (≤ skew_downscale_px) ─┬─▶ rotate(min)        ─▶ threshold ─▶ score
//!                                            ├─▶ rotate(min+step)   ─▶ threshold ─▶ score
//!                                            ├─▶ …
//!                                            └─▶ rotate(max)        ─▶ threshold ─▶ score
//!                                                                    best score ─▶ angle
//! ```
//!
//! Candidates are evaluated sequentially in ascending order. The running best
//! starts at negative infinity and is only replaced on a strictly greater
//! score, so on exact ties the smallest angle wins. Parallelising this loop
//! would need an order-preserving reduction to keep that rule.
//!
//! The search never fails on a decodable image: unreadable dimensions or an
//! empty image degrade to "no rotation".

use crate::config::{PipelineConfig, MAX_SKEW_CANDIDATES};
use crate::pipeline::score::row_projection_score;
use crate::pipeline::transform::{binarize, fit_within, grayscale, raw_pixels, rotate_with_fill};
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::debug;

/// Tolerance for including the upper bound despite float accumulation.
const ANGLE_EPSILON: f32 = 1e-4;

/// One evaluated rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkewCandidate {
    /// Rotation in degrees.
    pub angle: f32,
    /// Row-projection variance of the rotated, binarized image.
    pub score: f64,
}

/// Result of a skew search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkewEstimate {
    /// Winning angle in degrees (0.0 when nothing could be measured).
    pub angle: f32,
    /// Score of the winning angle.
    pub score: f64,
    /// Every candidate evaluated, in iteration order.
    pub candidates: Vec<SkewCandidate>,
}

impl SkewEstimate {
    /// The "don't rotate" result used when the image cannot be measured.
    pub fn no_rotation() -> Self {
        let candidate = SkewCandidate {
            angle: 0.0,
            score: 0.0,
        };
        Self {
            angle: 0.0,
            score: 0.0,
            candidates: vec![candidate],
        }
    }

    /// Position of the winning candidate in [`candidates`](Self::candidates).
    ///
    /// The first candidate matching the winner, consistent with the
    /// first-wins tie rule.
    pub fn best_index(&self) -> Option<usize> {
        self.candidates
            .iter()
            .position(|c| c.angle == self.angle && c.score == self.score)
    }
}

/// Candidate angles from `min` to `max` inclusive, `step` apart.
///
/// Angles are computed as `min + i * step` rather than by repeated addition,
/// and the upper bound is compared with a small epsilon, so `max` is always
/// included when it lies on the grid. Every angle is clamped into
/// `[min, max]`. A non-positive step yields just `min`. At most
/// [`MAX_SKEW_CANDIDATES`] angles are produced.
pub fn candidate_angles(min: f32, max: f32, step: f32) -> Vec<f32> {
    if !(step > 0.0) || max < min {
        return vec![min];
    }
    let mut angles = Vec::new();
    let mut i: u32 = 0;
    while angles.len() < MAX_SKEW_CANDIDATES {
        let angle = min + i as f32 * step;
        if angle > max + ANGLE_EPSILON {
            break;
        }
        angles.push(angle.clamp(min, max));
        i += 1;
    }
    angles
}

/// The first candidate with the strictly highest score.
pub fn best_candidate<I>(candidates: I) -> Option<SkewCandidate>
where
    I: IntoIterator<Item = SkewCandidate>,
{
    let mut best: Option<SkewCandidate> = None;
    let mut best_score = f64::NEG_INFINITY;
    for candidate in candidates {
        if candidate.score > best_score {
            best_score = candidate.score;
            best = Some(candidate);
        }
    }
    best
}

/// Skew search bound to one configuration.
#[derive(Debug, Clone)]
pub struct SkewSearch {
    min: f32,
    max: f32,
    step: f32,
    downscale_px: u32,
}

impl SkewSearch {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            min: config.skew_min_angle,
            max: config.skew_max_angle,
            step: config.skew_step,
            downscale_px: config.skew_downscale_px,
        }
    }

    /// The angles this search will evaluate, in order.
    pub fn angles(&self) -> Vec<f32> {
        candidate_angles(self.min, self.max, self.step)
    }

    /// Estimate the skew of a decoded image.
    pub fn estimate(&self, img: &DynamicImage) -> SkewEstimate {
        if img.width() == 0 || img.height() == 0 {
            debug!("Image has no dimensions; skipping skew search");
            return SkewEstimate::no_rotation();
        }

        let small = fit_within(img, self.downscale_px, FilterType::Triangle);
        let candidates: Vec<SkewCandidate> = self
            .angles()
            .into_iter()
            .map(|angle| SkewCandidate {
                angle,
                score: score_rotation(&small, angle),
            })
            .collect();

        match best_candidate(candidates.iter().copied()) {
            Some(best) => {
                debug!(
                    angle = best.angle,
                    score = best.score,
                    candidates = candidates.len(),
                    "Skew search finished"
                );
                SkewEstimate {
                    angle: best.angle,
                    score: best.score,
                    candidates,
                }
            }
            // Only reachable if every score is NaN.
            None => SkewEstimate::no_rotation(),
        }
    }

    /// Estimate the skew of encoded image bytes.
    ///
    /// Unreadable dimensions or undecodable pixels degrade to
    /// [`SkewEstimate::no_rotation`]; decoding problems surface later in the
    /// normalization chain, which owns that error.
    pub fn estimate_bytes(&self, bytes: &[u8]) -> SkewEstimate {
        let dims = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .ok()
            .and_then(|r| r.into_dimensions().ok());
        match dims {
            Some((w, h)) if w > 0 && h > 0 => {}
            _ => {
                debug!("Image dimensions unavailable; assuming no skew");
                return SkewEstimate::no_rotation();
            }
        }

        match image::load_from_memory(bytes) {
            Ok(img) => self.estimate(&img),
            Err(e) => {
                debug!("Skew search could not decode image ({e}); assuming no skew");
                SkewEstimate::no_rotation()
            }
        }
    }
}

/// Estimate the skew of encoded bytes with the search described by `config`.
pub fn estimate_skew_bytes(bytes: &[u8], config: &PipelineConfig) -> SkewEstimate {
    SkewSearch::new(config).estimate_bytes(bytes)
}

/// Rotate, binarize and score one candidate.
fn score_rotation(img: &DynamicImage, angle: f32) -> f64 {
    let rotated = rotate_with_fill(img, angle);
    let (pixels, w, h) = raw_pixels(binarize(&grayscale(&rotated)));
    row_projection_score(&pixels, w, h)
}
