//! Affected × helped population partitions.
//!
//! RULE: household weights are never re-weighted by hand.
//! Every split goes through `PopulationSplit::new`, which checks that
//! the two parts add back up to the parent on all three weight columns.
//! A failure here is an internal bug, not bad input.

use crate::{
    error::{ModelError, ModelResult},
    types::Weights,
};
use serde::{Deserialize, Serialize};

const MASS_TOLERANCE: f64 = 1.0e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AffectedStatus {
    #[serde(rename = "a")]
    Affected,
    #[serde(rename = "na")]
    NotAffected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HelpedStatus {
    #[serde(rename = "helped")]
    Helped,
    #[serde(rename = "not_helped")]
    NotHelped,
}

/// A parent weight divided into exactly two tagged parts.
#[derive(Debug, Clone, Copy)]
pub struct PopulationSplit<S: Copy> {
    parts: [(S, Weights); 2],
}

impl<S: Copy> PopulationSplit<S> {
    /// Give `share` of `parent` to `first` and the remainder to `second`.
    /// `share` is clamped into [0, 1] so neither part goes negative.
    pub fn new(
        context: &'static str,
        parent: Weights,
        share: f64,
        first: S,
        second: S,
    ) -> ModelResult<Self> {
        if !share.is_finite() {
            return Err(ModelError::Numeric(format!(
                "{context}: non-finite partition share {share}"
            )));
        }
        let share = share.clamp(0.0, 1.0);
        let split = Self {
            parts: [
                (first, parent.scaled(share)),
                (second, parent.scaled(1.0 - share)),
            ],
        };
        check_mass(context, &parent, split.parts.iter().map(|(_, w)| *w))?;
        Ok(split)
    }

    pub fn parts(&self) -> impl Iterator<Item = (S, Weights)> + '_ {
        self.parts.iter().copied()
    }
}

/// Split by exposure: `fa` of the weight is affected.
pub fn split_affected(parent: Weights, fa: f64) -> ModelResult<PopulationSplit<AffectedStatus>> {
    PopulationSplit::new(
        "affected split",
        parent,
        fa,
        AffectedStatus::Affected,
        AffectedStatus::NotAffected,
    )
}

/// Split an affected/non-affected part by targeting error.
///
/// Affected: `1 - error_excl` are helped (exclusion error leaves the rest out).
/// Not affected: `error_incl` are helped (inclusion error).
pub fn split_helped(
    parent: Weights,
    affected: AffectedStatus,
    error_incl: f64,
    error_excl: f64,
) -> ModelResult<PopulationSplit<HelpedStatus>> {
    let helped_share = match affected {
        AffectedStatus::Affected => 1.0 - error_excl,
        AffectedStatus::NotAffected => error_incl,
    };
    PopulationSplit::new(
        "targeting split",
        parent,
        helped_share,
        HelpedStatus::Helped,
        HelpedStatus::NotHelped,
    )
}

/// Verify that `parts` add back up to `parent` on every weight column.
pub fn check_mass<I>(context: &'static str, parent: &Weights, parts: I) -> ModelResult<()>
where
    I: IntoIterator<Item = Weights>,
{
    let total = parts
        .into_iter()
        .fold(Weights::default(), |acc, w| acc.sum(&w));
    for (expected, actual) in [
        (parent.hhwgt, total.hhwgt),
        (parent.pcwgt, total.pcwgt),
        (parent.pcwgt_ae, total.pcwgt_ae),
    ] {
        if (expected - actual).abs() > MASS_TOLERANCE * (1.0 + expected.abs()) {
            return Err(ModelError::MassConservation { context, expected, actual });
        }
    }
    Ok(())
}
