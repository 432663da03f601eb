//! Blended vendor scoring and ranking

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::weights::{Parameter, PreferenceWeights};
use super::{EMBEDDING_BLEND, PARAMETER_BLEND};

/// Raw 0-100 scores aligned with the weight parameters
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VendorScores {
    pub quality: f64,
    pub affordability: f64,
    pub shipping: f64,
    pub reliability: f64,
}

impl VendorScores {
    pub fn get(&self, parameter: Parameter) -> f64 {
        match parameter {
            Parameter::Quality => self.quality,
            Parameter::Affordability => self.affordability,
            Parameter::Shipping => self.shipping,
            Parameter::Reliability => self.reliability,
        }
    }
}

/// Result of scoring one vendor
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Weighted parameter score in `[0, 1]`
    pub parameter_score: f64,
    /// Embedding similarity as supplied
    pub embedding_score: f64,
    /// `100 × (0.30 × embedding + 0.70 × parameter)`
    pub final_score: f64,
}

/// Score a vendor. Deterministic and total for well-formed inputs.
pub fn score(
    scores: &VendorScores,
    weights: &PreferenceWeights,
    embedding_score: f64,
) -> ScoreBreakdown {
    let parameter_score: f64 = Parameter::ALL
        .iter()
        .map(|parameter| weights.get(*parameter) * (scores.get(*parameter) / 100.0))
        .sum();
    let final_score = 100.0 * (EMBEDDING_BLEND * embedding_score + PARAMETER_BLEND * parameter_score);

    ScoreBreakdown { parameter_score, embedding_score, final_score }
}

/// A vendor ready to be scored
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VendorCandidate {
    pub vendor_id: String,
    pub vendor_name: String,
    pub scores: VendorScores,
    #[serde(default)]
    pub embedding_score: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RankedVendor {
    /// 1-based position
    pub rank: usize,
    pub candidate: VendorCandidate,
    pub breakdown: ScoreBreakdown,
}

/// Rank candidates by final score, highest first.
///
/// Ties are broken by vendor name, then vendor id, so equal scores always
/// produce the same order.
pub fn rank(candidates: &[VendorCandidate], weights: &PreferenceWeights) -> Vec<RankedVendor> {
    let mut scored: Vec<(VendorCandidate, ScoreBreakdown)> = candidates
        .iter()
        .map(|candidate| {
            (candidate.clone(), score(&candidate.scores, weights, candidate.embedding_score))
        })
        .collect();

    scored.sort_by(|(left, left_score), (right, right_score)| {
        right_score
            .final_score
            .total_cmp(&left_score.final_score)
            .then_with(|| left.vendor_name.cmp(&right.vendor_name))
            .then_with(|| left.vendor_id.cmp(&right.vendor_id))
    });

    scored
        .into_iter()
        .enumerate()
        .map(|(index, (candidate, breakdown))| RankedVendor { rank: index + 1, candidate, breakdown })
        .collect()
}

/// Vendor as surfaced by sourcing, before parameter scores exist
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VendorListing {
    pub vendor_id: String,
    pub vendor_name: String,
    pub price_per_unit: f64,
    #[serde(default)]
    pub distance_miles: f64,
    #[serde(default = "neutral_score")]
    pub quality_score: f64,
    #[serde(default = "neutral_score")]
    pub reliability_score: f64,
    #[serde(default)]
    pub embedding_score: f64,
}

fn neutral_score() -> f64 {
    50.0
}

/// Derive parameter scores for a batch of listings.
///
/// Affordability and shipping are relative to the most expensive and the
/// farthest listing in the batch: `100 × (1 − value / max)`.
pub fn derive_candidates(listings: &[VendorListing]) -> Vec<VendorCandidate> {
    let max_price = nonzero_max(listings.iter().map(|listing| listing.price_per_unit));
    let max_distance = nonzero_max(listings.iter().map(|listing| listing.distance_miles));

    listings
        .iter()
        .map(|listing| VendorCandidate {
            vendor_id: listing.vendor_id.clone(),
            vendor_name: listing.vendor_name.clone(),
            scores: VendorScores {
                quality: listing.quality_score.clamp(0.0, 100.0),
                affordability: relative_score(listing.price_per_unit, max_price),
                shipping: relative_score(listing.distance_miles, max_distance),
                reliability: listing.reliability_score.clamp(0.0, 100.0),
            },
            embedding_score: listing.embedding_score.clamp(0.0, 1.0),
        })
        .collect()
}

fn nonzero_max(values: impl Iterator<Item = f64>) -> f64 {
    let max = values.fold(0.0_f64, |acc, value| match value.partial_cmp(&acc) {
        Some(Ordering::Greater) => value,
        _ => acc,
    });
    if max > 0.0 {
        max
    } else {
        1.0
    }
}

fn relative_score(value: f64, max: f64) -> f64 {
    (100.0 * (1.0 - value / max)).clamp(0.0, 100.0)
}
