//! Vendor preference engine
//!
//! Keeps a four-parameter weight vector (quality, affordability, shipping,
//! reliability) that the operator nudges up or down, and blends it with an
//! externally supplied embedding score to rank vendors.

mod scoring;
mod weights;

pub use scoring::{
    derive_candidates, rank, score, RankedVendor, ScoreBreakdown, VendorCandidate, VendorListing,
    VendorScores,
};
pub use weights::{Direction, FeedbackRecord, Parameter, PreferenceEngine, PreferenceWeights};

/// Default operator preferences
pub const DEFAULT_WEIGHTS: PreferenceWeights =
    PreferenceWeights { quality: 0.30, affordability: 0.35, shipping: 0.15, reliability: 0.20 };

/// Size of a single up/down adjustment
pub const ADJUSTMENT_STEP: f64 = 0.05;

/// Lower bound for any single weight
pub const MIN_WEIGHT: f64 = 0.05;

/// Upper bound for any single weight
pub const MAX_WEIGHT: f64 = 0.60;

/// Share of the final score contributed by the embedding similarity
pub const EMBEDDING_BLEND: f64 = 0.30;

/// Share of the final score contributed by the weighted parameters
pub const PARAMETER_BLEND: f64 = 0.70;

/// Tolerance used when checking the sum-to-one and bound invariants
pub const WEIGHT_TOLERANCE: f64 = 1e-9;
