//! Quintile and national summaries of a finished run.

use crate::{
    partition::{AffectedStatus, HelpedStatus},
    risk::RiskRow,
    table::EventTable,
    types::{HazardId, RegionId, ReturnPeriod},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// National means of one income quintile in one (hazard, rp).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QuintileRow {
    pub hazard: HazardId,
    pub rp: ReturnPeriod,
    pub quintile: u8,
    pub pcwgt: f64,
    pub k: f64,
    pub dk: f64,
    pub dc_npv_pre: f64,
    pub dw: f64,
    pub help_received: f64,
    pub help_fee: f64,
}

/// pcwgt-weighted quintile means over representative rows: affected and
/// helped, or neither. Quintiles with no weight report zeros.
pub fn quintile_summary(table: &EventTable) -> Vec<QuintileRow> {
    let mut acc: BTreeMap<(HazardId, ReturnPeriod, u8), QuintileRow> = BTreeMap::new();
    let mut slices: BTreeSet<(HazardId, ReturnPeriod)> = BTreeSet::new();
    for row in &table.households {
        slices.insert((row.hazard.clone(), row.rp));
        let representative = matches!(
            (row.affected, row.helped),
            (Some(AffectedStatus::Affected), Some(HelpedStatus::Helped))
                | (Some(AffectedStatus::NotAffected), Some(HelpedStatus::NotHelped))
        );
        if !representative || !(1..=5).contains(&row.quintile) {
            continue;
        }
        let q = acc.entry((row.hazard.clone(), row.rp, row.quintile)).or_default();
        let w = row.pcwgt;
        q.pcwgt += w;
        q.k += row.k * w;
        q.dk += row.dk * w;
        q.dc_npv_pre += row.dc_npv_pre * w;
        q.dw += row.dw * w;
        q.help_received += row.help_received * w;
        q.help_fee += row.help_fee * w;
    }

    let mut out = Vec::new();
    for (hazard, rp) in slices {
        for quintile in 1..=5u8 {
            let mut q = acc.remove(&(hazard.clone(), rp, quintile)).unwrap_or_default();
            if q.pcwgt > 0.0 {
                let w = q.pcwgt;
                for x in [
                    &mut q.k,
                    &mut q.dk,
                    &mut q.dc_npv_pre,
                    &mut q.dw,
                    &mut q.help_received,
                    &mut q.help_fee,
                ] {
                    *x /= w;
                }
            }
            q.hazard = hazard.clone();
            q.rp = rp;
            q.quintile = quintile;
            out.push(q);
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSummary {
    pub region: RegionId,
    /// Expected annual asset losses, % of regional GDP.
    pub r_asset: f64,
    /// Expected annual welfare losses in currency, % of regional GDP.
    pub r_welf: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NationalSummary {
    pub regions: Vec<RegionSummary>,
    pub r_asset: f64,
    pub r_welf: f64,
}

/// Sum risk over hazards per region, then over regions.
pub fn national_summary(risk: &[RiskRow]) -> NationalSummary {
    // region -> (gdp, dKtot, dWtot_currency)
    let mut by_region: BTreeMap<&str, (f64, f64, f64)> = BTreeMap::new();
    for r in risk {
        let e = by_region.entry(r.region.as_str()).or_default();
        e.0 = r.pop * r.gdp_pc_prov;
        e.1 += r.dKtot;
        e.2 += r.dWtot_currency;
    }
    let pct = |x: f64, gdp: f64| if gdp > 0.0 { 100.0 * x / gdp } else { 0.0 };
    let regions = by_region
        .iter()
        .map(|(region, &(gdp, dk, dw))| RegionSummary {
            region: region.to_string(),
            r_asset: pct(dk, gdp),
            r_welf: pct(dw, gdp),
        })
        .collect();
    let (gdp, dk, dw) = by_region
        .values()
        .fold((0.0, 0.0, 0.0), |acc, v| (acc.0 + v.0, acc.1 + v.1, acc.2 + v.2));
    NationalSummary { regions, r_asset: pct(dk, gdp), r_welf: pct(dw, gdp) }
}
