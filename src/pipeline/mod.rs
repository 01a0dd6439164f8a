//! Image preprocessing stages.
//!
//! Each submodule implements exactly one step so it can be tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! bytes ──▶ encode::decode ──▶ skew ──▶ normalize ──▶ encode::jpeg
//!                               │            │
//!                               └─ score     └─ transform
//! ```
//!
//! 1. [`score`]     — row-projection variance of a binarized buffer
//! 2. [`skew`]      — search the candidate angles for the best score
//! 3. [`transform`] — rotate/resize/grayscale/sharpen/threshold primitives
//!    shared by the search and the chain
//! 4. [`normalize`] — the deterministic normalization chain
//! 5. [`encode`]    — decoding uploads and encoding the JPEG output
//!
//! All stages are CPU-bound and synchronous; the job runs them inside
//! `spawn_blocking`.

pub mod encode;
pub mod normalize;
pub mod score;
pub mod skew;
pub mod transform;

pub use normalize::{normalize, normalize_image, PreprocessingResult};
pub use score::row_projection_score;
pub use skew::{
    best_candidate, candidate_angles, estimate_skew_bytes, SkewCandidate, SkewEstimate, SkewSearch,
};
