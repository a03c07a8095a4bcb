//! Event results and expected annual risk.
//!
//! RULE: the return-period dimension is only ever dropped through
//! `return_period::expected_value`, so protection is applied in one place.

use crate::{
    config::{MarginalUtilityBaseline, WelfareFormula},
    error::ModelResult,
    return_period::expected_value,
    table::EventTable,
    types::{EventKey, HazardId, RegionId, ReturnPeriod},
    welfare::{wprime, ReferenceConsumption},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Losses of one event, per capita and in total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(non_snake_case)]
pub struct EventResultRow {
    pub region: RegionId,
    pub hazard: HazardId,
    pub rp: ReturnPeriod,
    pub dK: f64,
    pub delta_W: f64,
    pub dKtot: f64,
    pub delta_W_tot: f64,
    pub average_aid_cost_pc: f64,
}

/// Expected annual losses and resilience of one region to one hazard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(non_snake_case)]
pub struct RiskRow {
    pub region: RegionId,
    pub hazard: HazardId,
    pub dK: f64,
    pub dKtot: f64,
    pub delta_W: f64,
    pub delta_W_tot: f64,
    pub average_aid_cost_pc: f64,
    pub pop: f64,
    pub gdp_pc_prov: f64,
    pub wprime: f64,
    /// Welfare loss had every unit of asset loss cost one unit of consumption.
    pub dWref: f64,
    pub dWpc_currency: f64,
    pub dWtot_currency: f64,
    /// Welfare loss as a share of GDP per capita.
    pub risk: f64,
    pub resilience: f64,
    pub risk_to_assets: f64,
}

/// pcwgt-weighted event means and totals.
pub fn event_results(table: &EventTable) -> Vec<EventResultRow> {
    #[derive(Default)]
    struct Sums {
        pop: f64,
        dk: f64,
        dw: f64,
        fee: f64,
    }
    let mut sums: BTreeMap<EventKey, Sums> = BTreeMap::new();
    for row in &table.households {
        let s = sums.entry(row.key()).or_default();
        s.pop += row.pcwgt;
        s.dk += row.dk * row.pcwgt;
        s.dw += row.dw * row.pcwgt;
        s.fee += row.help_fee * row.pcwgt;
    }
    sums.into_iter()
        .map(|(key, s)| {
            let per_capita = |x: f64| if s.pop > 0.0 { x / s.pop } else { 0.0 };
            EventResultRow {
                dK: per_capita(s.dk),
                delta_W: per_capita(s.dw),
                dKtot: s.dk,
                delta_W_tot: s.dw,
                average_aid_cost_pc: per_capita(s.fee),
                region: key.region,
                hazard: key.hazard,
                rp: key.rp,
            }
        })
        .collect()
}

/// Expected annual risk per (region, hazard).
pub fn aggregate_risk(
    table: &EventTable,
    results: &[EventResultRow],
    references: &BTreeMap<RegionId, ReferenceConsumption>,
    formula: WelfareFormula,
    baseline: MarginalUtilityBaseline,
    has_rp_dimension: bool,
) -> ModelResult<Vec<RiskRow>> {
    let mut grouped: BTreeMap<(RegionId, HazardId), Vec<&EventResultRow>> = BTreeMap::new();
    for r in results {
        grouped.entry((r.region.clone(), r.hazard.clone())).or_default().push(r);
    }
    let macro_by_region: BTreeMap<&str, _> =
        table.macro_rows.iter().map(|m| (m.region.as_str(), m)).collect();

    let mut out = Vec::with_capacity(grouped.len());
    for ((region, hazard), rows) in grouped {
        let Some(m) = macro_by_region.get(region.as_str()) else { continue };
        let expect = |get: fn(&EventResultRow) -> f64| {
            let points: Vec<(ReturnPeriod, f64)> = rows.iter().map(|r| (r.rp, get(r))).collect();
            expected_value(&points, m.protection, has_rp_dimension)
        };
        let dk = expect(|r| r.dK);
        let dk_tot = expect(|r| r.dKtot);
        let delta_w = expect(|r| r.delta_W);
        let delta_w_tot = expect(|r| r.delta_W_tot);
        let aid_cost = expect(|r| r.average_aid_cost_pc);

        let reference = references.get(&region).copied().unwrap_or_default();
        let wprime = wprime(formula, baseline, &reference, m.income_elast, m.rho)?;
        let d_w_ref = wprime * dk;
        let dw_pc_currency = delta_w / wprime;
        let risk = if m.gdp_pc_prov > 0.0 { dw_pc_currency / m.gdp_pc_prov } else { 0.0 };
        // No welfare loss means no amplification.
        let resilience = if delta_w > 0.0 { d_w_ref / delta_w } else { 1.0 };

        out.push(RiskRow {
            dK: dk,
            dKtot: dk_tot,
            delta_W: delta_w,
            delta_W_tot: delta_w_tot,
            average_aid_cost_pc: aid_cost,
            pop: m.pop,
            gdp_pc_prov: m.gdp_pc_prov,
            wprime,
            dWref: d_w_ref,
            dWpc_currency: dw_pc_currency,
            dWtot_currency: delta_w_tot / wprime,
            risk,
            resilience,
            risk_to_assets: resilience * risk,
            region,
            hazard,
        });
    }
    log::info!("risk aggregated for {} region/hazard pairs", out.len());
    Ok(out)
}
