//! Counterfactual policies applied to the input tables.
//!
//! RULE: exactly one policy per run, applied after the initial fiscal
//!       calibration and before the recalibration that follows it.

use crate::{
    config::Policy,
    store::{HouseholdRecord, MacroRecord},
};

/// What applying a policy cost the public budget.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PolicyOutcome {
    /// Weighted total of any new transfers the policy pays out.
    pub fiscal_cost: f64,
}

const EXPOSURE_FACTOR: f64 = 0.95;
const VULNERABILITY_FACTOR: f64 = 0.7;
const INCOME_FACTOR: f64 = 1.1;
const SOCIAL_TOPUP: f64 = 0.333;
const RECONSTRUCTION_FACTOR: f64 = 0.666667;

pub fn apply_policy(
    policy: Policy,
    macro_rows: &mut [MacroRecord],
    households: &mut [HouseholdRecord],
) -> PolicyOutcome {
    let mut outcome = PolicyOutcome::default();
    match policy {
        Policy::Baseline | Policy::NoSupport => {}
        Policy::ReducePoorExposure => scale_v(households, true, EXPOSURE_FACTOR),
        Policy::ReduceRichExposure => scale_v(households, false, EXPOSURE_FACTOR),
        Policy::ReducePoorVulnerability => scale_v(households, true, VULNERABILITY_FACTOR),
        Policy::ReduceRichVulnerability => scale_v(households, false, VULNERABILITY_FACTOR),
        Policy::PoorIncomeTopUp => {
            for hh in households.iter_mut().filter(|h| h.ispoor) {
                hh.c *= INCOME_FACTOR;
                hh.pcinc *= INCOME_FACTOR;
                hh.pcinc_ae *= INCOME_FACTOR;
                // Transfers are unchanged in level, so their share shrinks.
                hh.social /= INCOME_FACTOR;
            }
        }
        Policy::SocialTransferIncrease => {
            for hh in households.iter_mut().filter(|h| h.ispoor) {
                let topup = SOCIAL_TOPUP * hh.social * hh.c;
                let factor = 1.0 + SOCIAL_TOPUP * hh.social;
                hh.c *= factor;
                hh.pcinc *= factor;
                hh.pcinc_ae *= factor;
                if hh.pcinc > 0.0 {
                    hh.social = (topup + hh.pcsoc) / hh.pcinc;
                }
                outcome.fiscal_cost += topup * hh.pcwgt;
            }
        }
        Policy::FasterReconstruction => {
            for m in macro_rows.iter_mut() {
                m.t_rebuild_k *= RECONSTRUCTION_FACTOR;
            }
        }
        Policy::UniversalEarlyWarning => {
            for hh in households.iter_mut() {
                hh.shew = 1.0;
            }
        }
    }
    log::info!("applied policy {policy:?} (fiscal cost {:.2})", outcome.fiscal_cost);
    outcome
}

fn scale_v(households: &mut [HouseholdRecord], poor: bool, factor: f64) {
    for hh in households.iter_mut().filter(|h| h.ispoor == poor) {
        hh.v *= factor;
    }
}
