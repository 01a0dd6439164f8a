//! Configuration for the preprocessing pipeline and the extraction service.
//!
//! Every tunable lives in one immutable [`PipelineConfig`] that is built once
//! at process start and passed explicitly into the skew search, the
//! normalization chain, the job and the extraction service. Tests construct
//! their own values instead of mutating the process environment.
//!
//! Three ways to build one:
//! - [`PipelineConfig::default()`] — zero configuration, sensible defaults
//! - [`PipelineConfig::builder()`] — set only what you care about
//! - [`PipelineConfig::from_env()`] — read the `OCRPREP_*` variables

use crate::error::OcrPrepError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Upper bound on the number of angles one skew search may evaluate.
///
/// Each candidate is a full rotation of the downscaled image.
pub const MAX_SKEW_CANDIDATES: usize = 1000;

/// Environment variable names read by [`PipelineConfig::from_env`].
pub mod env {
    pub const MAX_LONG_EDGE: &str = "OCRPREP_MAX_LONG_EDGE";
    pub const SKEW_MIN_ANGLE: &str = "OCRPREP_SKEW_MIN_ANGLE";
    pub const SKEW_MAX_ANGLE: &str = "OCRPREP_SKEW_MAX_ANGLE";
    pub const SKEW_STEP: &str = "OCRPREP_SKEW_STEP";
    pub const SKEW_DOWNSCALE: &str = "OCRPREP_SKEW_DOWNSCALE";
    pub const RETRY_DELAY_MS: &str = "OCRPREP_RETRY_DELAY_MS";
    pub const JPEG_QUALITY: &str = "OCRPREP_JPEG_QUALITY";
    pub const CONCURRENCY: &str = "OCRPREP_CONCURRENCY";
}

/// Configuration shared by every pipeline stage.
///
/// # Example
/// ```rust
/// use ocrprep::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .max_long_edge(1600)
///     .skew_range(-3.0, 3.0)
///     .skew_step(0.25)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_long_edge, 1600);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Longest edge of the normalized output, in pixels. Default: 2000.
    ///
    /// Images already smaller than this are never enlarged.
    pub max_long_edge: u32,

    /// Lower bound of the skew search range, in degrees. Default: -5.0.
    pub skew_min_angle: f32,

    /// Upper bound of the skew search range, in degrees (inclusive). Default: 5.0.
    pub skew_max_angle: f32,

    /// Step between skew candidates, in degrees. Default: 0.5 (21 candidates).
    pub skew_step: f32,

    /// Longest edge the image is shrunk to before the skew search. Default: 800.
    ///
    /// Each candidate rotates the whole downscaled image, so this bounds the
    /// cost of the search independently of the upload size.
    pub skew_downscale_px: u32,

    /// Wait between the failed original attempt and the fallback attempt,
    /// in milliseconds. Default: 3000.
    ///
    /// Also gives the preprocessing job time to finish writing the
    /// preprocessed variant when the upload was very recent.
    pub retry_delay_ms: u64,

    /// JPEG quality of the normalized output (1–100). Default: 90.
    pub jpeg_quality: u8,

    /// Objects of one notification processed at the same time. Default: 4.
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_long_edge: 2000,
            skew_min_angle: -5.0,
            skew_max_angle: 5.0,
            skew_step: 0.5,
            skew_downscale_px: 800,
            retry_delay_ms: 3000,
            jpeg_quality: 90,
            concurrency: 4,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// The fallback wait as a [`Duration`].
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Read the configuration from `OCRPREP_*` environment variables.
    ///
    /// Unset variables keep their defaults; set but unparseable values are
    /// rejected rather than silently ignored.
    pub fn from_env() -> Result<Self, OcrPrepError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) but with a caller-supplied lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, OcrPrepError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let min = parse_var(&lookup, env::SKEW_MIN_ANGLE, d.skew_min_angle)?;
        let max = parse_var(&lookup, env::SKEW_MAX_ANGLE, d.skew_max_angle)?;

        Self::builder()
            .max_long_edge(parse_var(&lookup, env::MAX_LONG_EDGE, d.max_long_edge)?)
            .skew_range(min, max)
            .skew_step(parse_var(&lookup, env::SKEW_STEP, d.skew_step)?)
            .skew_downscale_px(parse_var(&lookup, env::SKEW_DOWNSCALE, d.skew_downscale_px)?)
            .retry_delay_ms(parse_var(&lookup, env::RETRY_DELAY_MS, d.retry_delay_ms)?)
            .jpeg_quality(parse_var(&lookup, env::JPEG_QUALITY, d.jpeg_quality)?)
            .concurrency(parse_var(&lookup, env::CONCURRENCY, d.concurrency)?)
            .build()
    }
}

fn parse_var<T, F>(lookup: &F, name: &str, default: T) -> Result<T, OcrPrepError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| {
            OcrPrepError::InvalidConfig(format!("{name}={raw:?} is not valid: {e}"))
        }),
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn max_long_edge(mut self, px: u32) -> Self {
        self.config.max_long_edge = px;
        self
    }

    pub fn skew_range(mut self, min: f32, max: f32) -> Self {
        self.config.skew_min_angle = min;
        self.config.skew_max_angle = max;
        self
    }

    pub fn skew_step(mut self, step: f32) -> Self {
        self.config.skew_step = step;
        self
    }

    pub fn skew_downscale_px(mut self, px: u32) -> Self {
        self.config.skew_downscale_px = px;
        self
    }

    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_delay_ms = ms;
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, OcrPrepError> {
        let c = &self.config;
        if !c.skew_step.is_finite() || c.skew_step <= 0.0 {
            return Err(OcrPrepError::InvalidConfig(format!(
                "Skew step must be a positive number of degrees, got {}",
                c.skew_step
            )));
        }
        if !c.skew_min_angle.is_finite()
            || !c.skew_max_angle.is_finite()
            || c.skew_min_angle > c.skew_max_angle
        {
            return Err(OcrPrepError::InvalidConfig(format!(
                "Skew range must satisfy min <= max, got [{}, {}]",
                c.skew_min_angle, c.skew_max_angle
            )));
        }
        let candidates =
            ((f64::from(c.skew_max_angle) - f64::from(c.skew_min_angle)) / f64::from(c.skew_step))
                .floor()
                + 1.0;
        if candidates > MAX_SKEW_CANDIDATES as f64 {
            return Err(OcrPrepError::InvalidConfig(format!(
                "Skew step {} over [{}, {}] yields {} candidates (max {})",
                c.skew_step, c.skew_min_angle, c.skew_max_angle, candidates, MAX_SKEW_CANDIDATES
            )));
        }
        if c.max_long_edge < 16 || c.skew_downscale_px < 16 {
            return Err(OcrPrepError::InvalidConfig(format!(
                "Pixel bounds must be >= 16 (max_long_edge={}, skew_downscale_px={})",
                c.max_long_edge, c.skew_downscale_px
            )));
        }
        if !(1..=100).contains(&c.jpeg_quality) {
            return Err(OcrPrepError::InvalidConfig(format!(
                "JPEG quality must be 1–100, got {}",
                c.jpeg_quality
            )));
        }
        if c.concurrency == 0 {
            return Err(OcrPrepError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
