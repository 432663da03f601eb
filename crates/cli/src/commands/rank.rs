use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use haggl_core::preferences::{derive_candidates, rank, PreferenceWeights, VendorListing};
use serde::Deserialize;
use serde_json::json;

use crate::commands::{CommandResult, EXIT_INVALID_INPUT};

const COMMAND: &str = "rank";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListingFile {
    Bare(Vec<VendorListing>),
    Wrapped { vendors: Vec<VendorListing> },
}

pub fn run(path: &Path, weights: Option<PreferenceWeights>) -> CommandResult {
    let listings = match load_listings(path) {
        Ok(listings) => listings,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "invalid_input",
                format!("{error:#}"),
                EXIT_INVALID_INPUT,
            );
        }
    };

    let weights = weights.unwrap_or_default();
    let ranking = rank(&derive_candidates(&listings), &weights);
    let message = match ranking.first() {
        Some(top) => format!(
            "ranked {} vendors; top pick {} ({:.2})",
            ranking.len(),
            top.candidate.vendor_name,
            top.breakdown.final_score
        ),
        None => "no vendors to rank".to_string(),
    };

    CommandResult::success_with_data(
        COMMAND,
        message,
        Some(json!({ "weights": weights, "ranking": ranking })),
    )
}

fn load_listings(path: &Path) -> Result<Vec<VendorListing>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read vendor file `{}`", path.display()))?;
    let parsed: ListingFile = serde_json::from_str(&raw)
        .with_context(|| format!("`{}` is not a vendor listing", path.display()))?;

    Ok(match parsed {
        ListingFile::Bare(vendors) | ListingFile::Wrapped { vendors } => vendors,
    })
}
