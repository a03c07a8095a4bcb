//! Capital and consumption losses per household partition.
//!
//! EXECUTION ORDER:
//!   1. Split every household row into affected / not-affected by `fa`
//!   2. Asset loss `dk` (zero for the not-affected part)
//!   3. Event totals `dk_event`, `dk_public_event`
//!   4. Consumption loss `dc` under the configured cost attribution
//!   5. NPV form `dc_npv_pre = dc · macro_multiplier`
//!   6. Shared mode only: the cross-region transfer matrix and its
//!      welfare cost
//!
//! RULE: in shared mode, every region pays for public assets lost in
//! every other region in proportion to its share of national capital.

use crate::{
    config::{CostAttribution, MarginalUtilityBaseline},
    error::{ModelError, ModelResult},
    partition::{split_affected, AffectedStatus},
    store::HouseholdRecord,
    table::{EventTable, HouseholdEventRow},
    types::{HazardId, RegionId, ReturnPeriod, WEIGHT_EPSILON},
    welfare::{wprime, ConsumptionShock, ReferenceConsumption, StructuralProfile, WelfareIntegrator},
};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Cost to `contributor` of public assets lost in `region`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicCostRow {
    /// Region hit by the event.
    pub region: RegionId,
    pub hazard: HazardId,
    pub rp: ReturnPeriod,
    pub contributor: RegionId,
    /// Public assets lost in `region`.
    pub tot_cost: f64,
    /// Part of `tot_cost` paid by `region` itself.
    pub int_cost: f64,
    /// Part of `tot_cost` paid by all other regions.
    pub ext_cost: f64,
    /// Contributor's share of national capital.
    pub frac_k: f64,
    pub transfer_k: f64,
    /// Welfare cost of the transfer to the contributor, in currency.
    pub dw: f64,
}

/// Settings for valuing transfers in shared mode.
pub struct TransferValuation<'a> {
    pub integrator: WelfareIntegrator,
    pub baseline: MarginalUtilityBaseline,
    pub references: &'a BTreeMap<RegionId, ReferenceConsumption>,
    /// Households as surveyed (one row each, original weights).
    pub households: &'a [HouseholdRecord],
}

pub fn compute_capital_loss(
    table: &mut EventTable,
    attribution: CostAttribution,
    valuation: &TransferValuation<'_>,
) -> ModelResult<Vec<PublicCostRow>> {
    split_by_exposure(table)?;
    aggregate_event_losses(table);

    let public_costs = match attribution {
        CostAttribution::PerHousehold => {
            log::info!("public asset losses are borne by each household");
            per_household_dc(table);
            Vec::new()
        }
        CostAttribution::SharedPublicAssets => {
            log::info!("public asset losses are shared nationally");
            shared_dc(table);
            transfer_matrix(table, valuation)?
        }
    };

    let macro_index = table.macro_index();
    for row in table.households.iter_mut() {
        let mm = macro_index
            .get(&row.key())
            .map(|&i| table.macro_rows[i].macro_multiplier)
            .unwrap_or(1.0);
        row.dc_npv_pre = row.dc * mm;
    }
    Ok(public_costs)
}

// ── Steps 1-3 ──────────────────────────────────────────────────────

fn split_by_exposure(table: &mut EventTable) -> ModelResult<()> {
    let macro_index = table.macro_index();
    let mut out = Vec::with_capacity(table.households.len() * 2);
    for row in table.households.drain(..) {
        let pi = macro_index
            .get(&row.key())
            .map(|&i| table.macro_rows[i].pi)
            .unwrap_or(0.0);
        let v_shew = row.v * (1.0 - pi * row.shew);
        for (status, weights) in split_affected(row.weights(), row.fa)?.parts() {
            let mut part = row.clone();
            part.set_weights(weights);
            part.affected = Some(status);
            part.v_shew = v_shew;
            if status == AffectedStatus::Affected {
                part.dk = part.hh_share * part.k * v_shew + part.k * part.public_loss_v;
                part.dk_public = part.k * part.public_loss_v;
            } else {
                part.dk = 0.0;
                part.dk_public = 0.0;
            }
            out.push(part);
        }
    }
    table.households = out;
    Ok(())
}

fn aggregate_event_losses(table: &mut EventTable) {
    let mut totals: BTreeMap<_, (f64, f64)> = BTreeMap::new();
    for row in &table.households {
        let t = totals.entry(row.key()).or_default();
        t.0 += row.dk * row.pcwgt;
        t.1 += row.dk_public * row.pcwgt;
    }
    for m in table.macro_rows.iter_mut() {
        let (dk, dk_public) = totals.get(&m.key()).copied().unwrap_or_default();
        m.dk_event = dk;
        m.dk_public_event = dk_public;
    }
}

// ── Step 4 ─────────────────────────────────────────────────────────

/// Private loss net of tax, plus the household's share of lost transfers.
fn own_dc(row: &HouseholdEventRow, tau_tax: f64, dk_event: f64) -> f64 {
    (1.0 - tau_tax) * row.dk + row.gamma_sp * tau_tax * dk_event
}

fn per_household_dc(table: &mut EventTable) {
    let macro_index = table.macro_index();
    for row in table.households.iter_mut() {
        let Some(&i) = macro_index.get(&row.key()) else { continue };
        let m = &table.macro_rows[i];
        row.dc = own_dc(row, m.tau_tax, m.dk_event);
        row.dc_0 = row.dc;
    }
}

fn shared_dc(table: &mut EventTable) {
    let mut national_k: BTreeMap<(HazardId, ReturnPeriod), f64> = BTreeMap::new();
    for row in &table.households {
        *national_k.entry((row.hazard.clone(), row.rp)).or_default() += row.pcwgt * row.k;
    }
    let macro_index = table.macro_index();
    for row in table.households.iter_mut() {
        let Some(&i) = macro_index.get(&row.key()) else { continue };
        let m = &table.macro_rows[i];
        let tot_k = national_k
            .get(&(row.hazard.clone(), row.rp))
            .copied()
            .unwrap_or(0.0)
            .max(WEIGHT_EPSILON);
        let pc_fee = m.dk_public_event * row.k / tot_k;
        let transfers_lost = row.gamma_sp * m.tau_tax * m.dk_event;
        row.dc = if row.affected == Some(AffectedStatus::Affected) {
            (1.0 - m.tau_tax) * (row.dk - row.dk_public) + transfers_lost + pc_fee
        } else {
            transfers_lost + pc_fee
        };
        row.dc_0 = own_dc(row, m.tau_tax, m.dk_event);
    }
}

// ── Step 6 ─────────────────────────────────────────────────────────

/// A contributor region's precomputed welfare inputs.
struct ContributorProfile<'a> {
    structure: StructuralProfile,
    wprime: f64,
    households: Vec<&'a HouseholdRecord>,
    /// Σ pcwgt·k over the region's households.
    total_k: f64,
}

fn contributor_profiles<'a>(
    table: &EventTable,
    valuation: &TransferValuation<'a>,
) -> ModelResult<BTreeMap<RegionId, ContributorProfile<'a>>> {
    let mut mm_sum: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for m in &table.macro_rows {
        let e = mm_sum.entry(m.region.as_str()).or_default();
        e.0 += m.macro_multiplier;
        e.1 += 1;
    }

    let mut profiles = BTreeMap::new();
    for m in &table.macro_rows {
        if profiles.contains_key(&m.region) {
            continue;
        }
        let (sum, n) = mm_sum.get(m.region.as_str()).copied().unwrap_or((1.0, 1));
        let structure = StructuralProfile::new(m.rho, m.income_elast, m.t_rebuild_k, sum / n as f64);
        let reference = valuation.references.get(&m.region).copied().unwrap_or_default();
        let wprime = wprime(
            valuation.integrator.formula,
            valuation.baseline,
            &reference,
            m.income_elast,
            m.rho,
        )?;
        let households: Vec<&HouseholdRecord> =
            valuation.households.iter().filter(|h| h.region == m.region).collect();
        let total_k = households.iter().map(|h| h.pcwgt * h.k).sum();
        profiles.insert(
            m.region.clone(),
            ContributorProfile { structure, wprime, households, total_k },
        );
    }
    Ok(profiles)
}

/// Welfare cost, in currency, of `contributor` paying `transfer_k`.
fn transfer_welfare(
    transfer_k: f64,
    profile: &ContributorProfile<'_>,
    integrator: &WelfareIntegrator,
) -> ModelResult<f64> {
    if transfer_k == 0.0 || profile.total_k <= 0.0 {
        return Ok(0.0);
    }
    let mut dw = 0.0;
    for hh in &profile.households {
        let dk_pc = transfer_k * hh.k / profile.total_k;
        let shock = ConsumptionShock {
            c: hh.c,
            c_5: hh.c_5,
            dc_npv: profile.structure.macro_multiplier * dk_pc,
            dc: dk_pc,
        };
        dw += hh.pcwgt * integrator.dw(&shock, &profile.structure)?;
    }
    Ok(dw / profile.wprime)
}

fn transfer_matrix(
    table: &EventTable,
    valuation: &TransferValuation<'_>,
) -> ModelResult<Vec<PublicCostRow>> {
    let profiles = contributor_profiles(table, valuation)?;

    // Per (hazard, rp): public loss per region and capital per region.
    let mut slices: BTreeMap<(HazardId, ReturnPeriod), BTreeMap<RegionId, (f64, f64)>> = BTreeMap::new();
    for m in &table.macro_rows {
        slices
            .entry((m.hazard.clone(), m.rp))
            .or_default()
            .entry(m.region.clone())
            .or_default()
            .0 = m.dk_public_event;
    }
    for row in &table.households {
        if let Some(slice) = slices.get_mut(&(row.hazard.clone(), row.rp)) {
            slice.entry(row.region.clone()).or_default().1 += row.pcwgt * row.k;
        }
    }

    let mut out = Vec::new();
    for ((hazard, rp), slice) in &slices {
        let regions: Vec<&RegionId> = slice.keys().collect();
        let n = regions.len();
        let tot_cost = DVector::from_iterator(n, slice.values().map(|(cost, _)| *cost));
        let capital = DVector::from_iterator(n, slice.values().map(|(_, k)| *k));
        let national_k = capital.sum();
        if national_k <= 0.0 {
            return Err(ModelError::Numeric(format!(
                "no capital in the country for {hazard}/rp={rp}"
            )));
        }
        let share = capital / national_k;
        // transfer[(recipient, contributor)]
        let transfer: DMatrix<f64> = &tot_cost * share.transpose();

        for (r, recipient) in regions.iter().enumerate() {
            let int_cost = tot_cost[r] * share[r];
            for (c, contributor) in regions.iter().enumerate() {
                let transfer_k = transfer[(r, c)];
                let dw = match profiles.get(*contributor) {
                    Some(profile) => transfer_welfare(transfer_k, profile, &valuation.integrator)?,
                    None => 0.0,
                };
                out.push(PublicCostRow {
                    region: (*recipient).clone(),
                    hazard: hazard.clone(),
                    rp: *rp,
                    contributor: (*contributor).clone(),
                    tot_cost: tot_cost[r],
                    int_cost,
                    ext_cost: tot_cost[r] - int_cost,
                    frac_k: share[c],
                    transfer_k,
                    dw,
                });
            }
        }
    }
    let distinct: BTreeSet<_> = out.iter().map(|r| r.contributor.as_str()).collect();
    log::info!("public cost matrix: {} rows across {} regions", out.len(), distinct.len());
    Ok(out)
}
