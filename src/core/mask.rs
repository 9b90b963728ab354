//! Land/water classification of aligned land-cover codes

use crate::types::{LandCoverCode, Raster};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// ESA WorldCover class for permanent water bodies
pub const WORLDCOVER_WATER: LandCoverCode = 80;

/// ESA WorldCover classes counted as land (everything but open water)
pub const WORLDCOVER_LAND_CLASSES: [LandCoverCode; 10] = [10, 20, 30, 40, 50, 60, 70, 90, 95, 100];

/// Codes of preprocessed binary tiles
pub const BINARY_WATER: LandCoverCode = 0;
pub const BINARY_LAND: LandCoverCode = 1;
pub const BINARY_NODATA: LandCoverCode = 255;

/// How a land-cover code maps to land
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassificationRule {
    /// Land iff the code is in the set
    LandCodes { codes: BTreeSet<LandCoverCode> },
    /// Land iff the code is neither the water code nor the nodata code
    Binary { water: LandCoverCode, nodata: LandCoverCode },
}

impl ClassificationRule {
    pub fn land_codes(codes: impl IntoIterator<Item = LandCoverCode>) -> Self {
        ClassificationRule::LandCodes { codes: codes.into_iter().collect() }
    }

    /// Raw WorldCover class tiles
    pub fn worldcover_land() -> Self {
        Self::land_codes(WORLDCOVER_LAND_CLASSES)
    }

    /// Preprocessed tiles: 1 land, 0 water, 255 nodata
    pub fn preprocessed() -> Self {
        ClassificationRule::Binary { water: BINARY_WATER, nodata: BINARY_NODATA }
    }

    pub fn is_land(&self, code: LandCoverCode) -> bool {
        match self {
            ClassificationRule::LandCodes { codes } => codes.contains(&code),
            ClassificationRule::Binary { water, nodata } => code != *water && code != *nodata,
        }
    }
}

impl Default for ClassificationRule {
    fn default() -> Self {
        Self::worldcover_land()
    }
}

/// Classify an aligned raster into a land mask (`true` = land).
///
/// Pixels equal to the raster's nodata sentinel are always `false`:
/// unknown cover must never remove valid radar data.
pub fn build_mask(aligned: &Raster<LandCoverCode>, rule: &ClassificationRule) -> Raster<bool> {
    let data = aligned
        .data
        .mapv(|code| !aligned.is_nodata(&code) && rule.is_land(code));

    let land = data.iter().filter(|&&m| m).count();
    log::info!(
        "Land mask built: {} land pixels of {} ({:.1}%)",
        land,
        data.len(),
        100.0 * land as f64 / data.len().max(1) as f64
    );

    Raster {
        data,
        grid: aligned.grid.clone(),
        nodata: None,
    }
}
