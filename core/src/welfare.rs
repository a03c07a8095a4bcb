//! Welfare loss from a consumption shock.
//!
//! Two formulas, selected by configuration:
//!   - legacy: isoelastic utility of permanent NPV consumption, linearized
//!     below the consumption floor `c_5`
//!   - revised: utility lost along an exponential recovery path, summed
//!     over a fixed time grid
//!
//! RULE: `dw` is reported as a positive loss under both formulas, and
//! `marginal_utility` is positive, so `dw / wprime` is a currency amount.
//! RULE: income elasticity of exactly 1 is a hard numeric error.

use crate::{
    config::{MarginalUtilityBaseline, WelfareFormula},
    error::{ModelError, ModelResult},
    store::{HouseholdRecord, MacroRecord},
    table::{EventTable, HouseholdEventRow},
    types::{weighted_mean, RegionId},
};
use std::collections::BTreeMap;

/// Perturbation for the central finite difference of utility.
pub const FINITE_DIFFERENCE_STEP: f64 = 1.0e-4;

/// Smallest share of pre-event consumption left during recovery.
const CONSUMPTION_FLOOR: f64 = 1.0e-6;

// ── Utility ────────────────────────────────────────────────────────

fn check_elasticity(eta: f64) -> ModelResult<()> {
    if (eta - 1.0).abs() < 1.0e-12 {
        return Err(ModelError::Numeric(
            "income elasticity of 1 makes isoelastic utility singular".into(),
        ));
    }
    if !eta.is_finite() {
        return Err(ModelError::Numeric(format!("income elasticity {eta} is not finite")));
    }
    Ok(())
}

/// Isoelastic utility `(c^(1-η) - 1)/(1-η)`.
pub fn welf(c: f64, eta: f64) -> ModelResult<f64> {
    check_elasticity(eta)?;
    Ok((c.powf(1.0 - eta) - 1.0) / (1.0 - eta))
}

/// Isoelastic utility, replaced below `comp` by its tangent at `comp`.
pub fn welf1(c: f64, eta: f64, comp: f64) -> ModelResult<f64> {
    check_elasticity(eta)?;
    if c < comp {
        Ok((comp.powf(1.0 - eta) - 1.0) / (1.0 - eta) + comp.powf(-eta) * (c - comp))
    } else {
        Ok((c.powf(1.0 - eta) - 1.0) / (1.0 - eta))
    }
}

/// Marginal utility at `c` by central difference of `welf`.
pub fn marginal_utility(c: f64, eta: f64) -> ModelResult<f64> {
    let h = FINITE_DIFFERENCE_STEP;
    if c <= h {
        return Err(ModelError::Numeric(format!("marginal utility at non-positive consumption {c}")));
    }
    Ok((welf(c + h, eta)? - welf(c - h, eta)?) / (2.0 * h))
}

// ── Integrator ─────────────────────────────────────────────────────

/// Structural constants of one region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StructuralProfile {
    pub rho: f64,
    pub eta: f64,
    /// Consumption recovery time constant (a third of the rebuild time).
    pub t_reco: f64,
    pub macro_multiplier: f64,
}

impl StructuralProfile {
    pub fn new(rho: f64, eta: f64, t_rebuild_k: f64, macro_multiplier: f64) -> Self {
        Self { rho, eta, t_reco: t_rebuild_k / 3.0, macro_multiplier }
    }
}

/// Consumption of one household and the shock it takes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsumptionShock {
    pub c: f64,
    pub c_5: f64,
    /// NPV consumption loss (legacy formula).
    pub dc_npv: f64,
    /// Instantaneous consumption loss (revised formula).
    pub dc: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct WelfareIntegrator {
    pub formula: WelfareFormula,
    pub steps: usize,
    pub horizon: f64,
}

impl WelfareIntegrator {
    pub fn new(formula: WelfareFormula, steps: usize, horizon: f64) -> Self {
        Self { formula, steps, horizon }
    }

    /// Welfare loss of `shock` for a household with `profile`.
    pub fn dw(&self, shock: &ConsumptionShock, profile: &StructuralProfile) -> ModelResult<f64> {
        let dw = match self.formula {
            WelfareFormula::Legacy => self.legacy(shock, profile)?,
            WelfareFormula::Revised => self.revised(shock, profile)?,
        };
        if !dw.is_finite() {
            return Err(ModelError::Numeric(format!(
                "welfare loss is not finite for c={} dc={} dc_npv={}",
                shock.c, shock.dc, shock.dc_npv
            )));
        }
        Ok(dw)
    }

    fn legacy(&self, shock: &ConsumptionShock, p: &StructuralProfile) -> ModelResult<f64> {
        if p.rho <= 0.0 {
            return Err(ModelError::Numeric(format!("discount rate {} is not positive", p.rho)));
        }
        let c = shock.c / p.rho;
        let comp = shock.c_5 / p.rho;
        Ok(welf1(c, p.eta, comp)? - welf1(c - shock.dc_npv, p.eta, comp)?)
    }

    fn revised(&self, shock: &ConsumptionShock, p: &StructuralProfile) -> ModelResult<f64> {
        check_elasticity(p.eta)?;
        if shock.c <= 0.0 {
            return Err(ModelError::Numeric(format!("consumption {} is not positive", shock.c)));
        }
        if p.t_reco <= 0.0 {
            return Err(ModelError::Numeric(format!("recovery time {} is not positive", p.t_reco)));
        }
        if shock.dc == 0.0 {
            return Ok(0.0);
        }
        let exponent = 1.0 - p.eta;
        let step = self.horizon / (self.steps - 1) as f64;
        let ratio = shock.dc / shock.c;
        let integral: f64 = (0..self.steps)
            .map(|i| {
                let t = i as f64 * step;
                let remaining = (1.0 - ratio * (-t / p.t_reco).exp()).max(CONSUMPTION_FLOOR);
                step * (remaining.powf(exponent) - 1.0) * (-p.rho * t).exp()
            })
            .sum();
        let scale = shock.c.powf(exponent) / exponent;
        Ok(-scale * integral)
    }
}

/// Marginal utility used to express welfare losses in currency.
///
/// Legacy: at regional (local) or national GDP per capita over ρ.
/// Revised: at regional (local) or national mean consumption.
pub fn wprime(
    formula: WelfareFormula,
    baseline: MarginalUtilityBaseline,
    reference: &ReferenceConsumption,
    eta: f64,
    rho: f64,
) -> ModelResult<f64> {
    let c = match (formula, baseline) {
        (WelfareFormula::Legacy, MarginalUtilityBaseline::Local) => reference.gdp_pc_prov / rho,
        (WelfareFormula::Legacy, MarginalUtilityBaseline::National) => reference.gdp_pc_nat / rho,
        (WelfareFormula::Revised, MarginalUtilityBaseline::Local) => reference.mean_c_region,
        (WelfareFormula::Revised, MarginalUtilityBaseline::National) => reference.mean_c_nation,
    };
    marginal_utility(c, eta)
}

/// Consumption levels a region's marginal utility can be evaluated at.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReferenceConsumption {
    pub gdp_pc_prov: f64,
    pub gdp_pc_nat: f64,
    pub mean_c_region: f64,
    pub mean_c_nation: f64,
}

/// Reference consumption of every region, from the household survey.
pub fn reference_consumption(
    macro_rows: &[MacroRecord],
    households: &[HouseholdRecord],
) -> BTreeMap<RegionId, ReferenceConsumption> {
    let mean_c_nation = weighted_mean(households.iter().map(|h| (h.c, h.pcwgt)));
    macro_rows
        .iter()
        .map(|m| {
            let mean_c_region = weighted_mean(
                households
                    .iter()
                    .filter(|h| h.region == m.region)
                    .map(|h| (h.c, h.pcwgt)),
            );
            let reference = ReferenceConsumption {
                gdp_pc_prov: m.gdp_pc_prov,
                gdp_pc_nat: m.gdp_pc_nat,
                mean_c_region,
                mean_c_nation,
            };
            (m.region.clone(), reference)
        })
        .collect()
}

// ── Stage ──────────────────────────────────────────────────────────

/// Fill `dc_npv_post`, `dc_post_pds` and `dw` on every household row.
pub fn apply_welfare(
    table: &mut EventTable,
    integrator: &WelfareIntegrator,
    fee_weight: f64,
) -> ModelResult<()> {
    let macro_index = table.macro_index();
    let EventTable { macro_rows, households } = table;
    for row in households.iter_mut() {
        let m = macro_index
            .get(&row.key())
            .map(|&i| &macro_rows[i])
            .ok_or_else(|| ModelError::EmptyTable("macro_event"))?;
        let profile = StructuralProfile::new(m.rho, m.income_elast, m.t_rebuild_k, m.macro_multiplier);
        settle_support(row, fee_weight);
        row.dw = integrator.dw(&shock_of(row), &profile)?;
    }
    log::info!("welfare computed for {} household rows", households.len());
    Ok(())
}

fn settle_support(row: &mut HouseholdEventRow, fee_weight: f64) {
    row.dc_npv_post = row.dc_npv_pre - row.help_received + fee_weight * row.help_fee;
    row.dc_post_pds = row.dc - row.help_received + fee_weight * row.help_fee;
}

fn shock_of(row: &HouseholdEventRow) -> ConsumptionShock {
    ConsumptionShock { c: row.c, c_5: row.c_5, dc_npv: row.dc_npv_post, dc: row.dc_post_pds }
}
