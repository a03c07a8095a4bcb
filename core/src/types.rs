//! Shared primitive types used across the entire pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Administrative region (province, division, district...).
pub type RegionId = String;

/// Hazard label as it appears in the hazard-ratio table ("flood", "wind"...).
pub type HazardId = String;

/// Household (or representative category) identifier.
pub type HouseholdId = String;

/// Statistical recurrence interval in years. Always strictly positive.
pub type ReturnPeriod = u32;

/// Floor applied to population weights used as divisors.
pub const WEIGHT_EPSILON: f64 = 1.0e-10;

/// The backbone key every downstream table is aligned on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    pub region: RegionId,
    pub hazard: HazardId,
    pub rp:     ReturnPeriod,
}

impl EventKey {
    pub fn new(region: impl Into<RegionId>, hazard: impl Into<HazardId>, rp: ReturnPeriod) -> Self {
        Self { region: region.into(), hazard: hazard.into(), rp }
    }

    /// The national (hazard, rp) slice this event belongs to.
    pub fn hazard_rp(&self) -> (HazardId, ReturnPeriod) {
        (self.hazard.clone(), self.rp)
    }

    /// Key with the return-period dimension dropped.
    pub fn region_hazard(&self) -> (RegionId, HazardId) {
        (self.region.clone(), self.hazard.clone())
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/rp={}", self.region, self.hazard, self.rp)
    }
}

/// Population weights carried by every household row.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Weights {
    /// Households represented.
    pub hhwgt:    f64,
    /// Individuals represented.
    pub pcwgt:    f64,
    /// Adult equivalents represented.
    pub pcwgt_ae: f64,
}

impl Weights {
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            hhwgt:    self.hhwgt * factor,
            pcwgt:    self.pcwgt * factor,
            pcwgt_ae: self.pcwgt_ae * factor,
        }
    }

    pub fn sum(&self, other: &Self) -> Self {
        Self {
            hhwgt:    self.hhwgt + other.hhwgt,
            pcwgt:    self.pcwgt + other.pcwgt,
            pcwgt_ae: self.pcwgt_ae + other.pcwgt_ae,
        }
    }
}

/// Weighted mean of `values` by `weights`; 0 when the weight total is zero.
pub fn weighted_mean<I>(pairs: I) -> f64
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let (num, den) = pairs
        .into_iter()
        .fold((0.0, 0.0), |(n, d), (value, weight)| (n + value * weight, d + weight));
    if den.abs() < WEIGHT_EPSILON {
        0.0
    } else {
        num / den
    }
}
