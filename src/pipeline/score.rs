//! Row-projection scoring: how "text-like" a binarized image looks.
//!
//! When text lines are horizontal, rows alternate sharply between mostly ink
//! (a line of text) and mostly background (the gap between lines), so the
//! per-row ink counts have a high variance. Skew smears each line across
//! neighbouring rows and flattens that sequence. The skew search therefore
//! picks the rotation with the highest score.

/// Pixel values below this count as ink.
const INK_CEILING: u8 = 128;

/// Variance of the per-row ink counts of a one-byte-per-pixel buffer.
///
/// `pixels` is row-major, `width * height` bytes; binarized buffers hold 0
/// (ink) and 255 (background). An empty image scores `0.0`. A buffer shorter
/// than `width * height` is scored over the complete rows it holds.
pub fn row_projection_score(pixels: &[u8], width: u32, height: u32) -> f64 {
    if width == 0 || height == 0 {
        return 0.0;
    }

    let row_sums: Vec<f64> = pixels
        .chunks_exact(width as usize)
        .take(height as usize)
        .map(|row| row.iter().filter(|&&p| p < INK_CEILING).count() as f64)
        .collect();

    variance(&row_sums)
}

/// Population variance; `0.0` for an empty sequence.
fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    var.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INK: u8 = 0;
    const BG: u8 = 255;

    fn rows(pattern: &[u8], width: usize) -> Vec<u8> {
        pattern
            .iter()
            .flat_map(|&v| std::iter::repeat(v).take(width))
            .collect()
    }

    #[test]
    fn zero_height_scores_zero() {
        assert_eq!(row_projection_score(&[], 10, 0), 0.0);
        assert_eq!(row_projection_score(&[INK; 10], 10, 0), 0.0);
    }

    #[test]
    fn zero_width_scores_zero() {
        assert_eq!(row_projection_score(&[], 0, 5), 0.0);
    }

    #[test]
    fn uniform_image_scores_zero() {
        let blank = vec![BG; 40];
        assert_eq!(row_projection_score(&blank, 8, 5), 0.0);
        let solid = vec![INK; 40];
        assert_eq!(row_projection_score(&solid, 8, 5), 0.0);
    }

    #[test]
    fn alternating_rows_score_exact_variance() {
        // Row sums 4,0,4,0 → mean 2, variance 4.
        let buf = rows(&[INK, BG, INK, BG], 4);
        assert_eq!(row_projection_score(&buf, 4, 4), 4.0);
    }

    #[test]
    fn sharp_lines_beat_smeared_lines() {
        let sharp = rows(&[INK, BG, INK, BG], 4);
        // Same amount of ink, spread evenly over every row.
        let smeared: Vec<u8> = (0..16).map(|i| if i % 2 == 0 { INK } else { BG }).collect();
        assert!(row_projection_score(&sharp, 4, 4) > row_projection_score(&smeared, 4, 4));
    }

    #[test]
    fn scoring_is_deterministic() {
        let buf = rows(&[INK, INK, BG, INK, BG, BG], 7);
        let a = row_projection_score(&buf, 7, 6);
        let b = row_projection_score(&buf, 7, 6);
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn short_buffer_does_not_panic() {
        let buf = rows(&[INK, BG], 4);
        let score = row_projection_score(&buf, 4, 10);
        assert_eq!(score, 4.0);
    }
}
