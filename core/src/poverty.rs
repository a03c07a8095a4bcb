//! People pushed into poverty by each event, with and without support.

use crate::{
    return_period::expected_value,
    table::{EventTable, HouseholdEventRow},
    types::{EventKey, HazardId, RegionId, ReturnPeriod, WEIGHT_EPSILON},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counts for one event, or the annual expectation when `rp` is empty.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PovertyRow {
    pub region: RegionId,
    pub hazard: HazardId,
    pub rp: Option<ReturnPeriod>,
    pub pop: f64,
    pub disaster_n_pov: f64,
    pub disaster_pds_n_pov: f64,
    pub disaster_n_pov_pct: f64,
    pub disaster_n_sub: f64,
    pub disaster_pds_n_sub: f64,
}

/// Consumption of a row before and after the event, per adult equivalent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsumptionPath {
    pub c_initial: f64,
    pub pov_line: f64,
    pub c_final: f64,
    pub c_final_pds: f64,
}

impl ConsumptionPath {
    pub fn of(row: &HouseholdEventRow, avg_prod_k: f64, t_rebuild_k: f64) -> Self {
        let c_initial = if row.hhsize_ae > 0.0 { row.c * row.hhsize / row.hhsize_ae } else { 0.0 };
        let pov_line = if row.pcinc_ae > 0.0 { row.pov_line * c_initial / row.pcinc_ae } else { row.pov_line };
        let per_ae = if row.pcwgt_ae > WEIGHT_EPSILON {
            row.pcwgt / row.pcwgt_ae
        } else if row.hhsize_ae > 0.0 {
            row.hhsize / row.hhsize_ae
        } else {
            0.0
        };
        let income_lost = avg_prod_k + if t_rebuild_k > 0.0 { 1.0 / t_rebuild_k } else { 0.0 };
        let delta_c = row.dk * per_ae * income_lost;
        let c_final = c_initial - delta_c;
        Self {
            c_initial,
            pov_line,
            c_final,
            c_final_pds: c_final + row.help_received - row.help_fee,
        }
    }

    fn pushed_below(&self, line: f64, with_support: bool) -> bool {
        let after = if with_support { self.c_final_pds } else { self.c_final };
        self.c_initial > line && after <= line
    }
}

/// Per-event counts followed by the annual expectation for each
/// (region, hazard).
pub fn poverty_impact(
    table: &EventTable,
    subsistence_line: Option<f64>,
    has_rp_dimension: bool,
) -> Vec<PovertyRow> {
    let macro_index = table.macro_index();
    let mut events: BTreeMap<EventKey, PovertyRow> = BTreeMap::new();
    for row in &table.households {
        let key = row.key();
        let Some(&i) = macro_index.get(&key) else { continue };
        let m = &table.macro_rows[i];
        let path = ConsumptionPath::of(row, m.avg_prod_k, m.t_rebuild_k);

        let out = events.entry(key).or_insert_with(|| PovertyRow {
            region: row.region.clone(),
            hazard: row.hazard.clone(),
            rp: Some(row.rp),
            ..Default::default()
        });
        out.pop += row.pcwgt;
        if path.pushed_below(path.pov_line, false) {
            out.disaster_n_pov += row.pcwgt;
        }
        if path.pushed_below(path.pov_line, true) {
            out.disaster_pds_n_pov += row.pcwgt;
        }
        if let Some(line) = subsistence_line {
            if path.pushed_below(line, false) {
                out.disaster_n_sub += row.pcwgt;
            }
            if path.pushed_below(line, true) {
                out.disaster_pds_n_sub += row.pcwgt;
            }
        }
    }

    let mut rows: Vec<PovertyRow> = events
        .into_values()
        .map(|mut r| {
            r.disaster_n_pov_pct = if r.pop > 0.0 { r.disaster_n_pov / r.pop } else { 0.0 };
            r
        })
        .collect();

    let protection: BTreeMap<&str, f64> =
        table.macro_rows.iter().map(|m| (m.region.as_str(), m.protection)).collect();
    let mut grouped: BTreeMap<(RegionId, HazardId), Vec<&PovertyRow>> = BTreeMap::new();
    for r in &rows {
        grouped.entry((r.region.clone(), r.hazard.clone())).or_default().push(r);
    }
    let mut annual = Vec::with_capacity(grouped.len());
    for ((region, hazard), group) in grouped {
        let floor = protection.get(region.as_str()).copied().unwrap_or(0.0);
        let expect = |get: fn(&PovertyRow) -> f64| {
            let points: Vec<(ReturnPeriod, f64)> =
                group.iter().map(|r| (r.rp.unwrap_or_default(), get(r))).collect();
            expected_value(&points, floor, has_rp_dimension)
        };
        annual.push(PovertyRow {
            pop: group.first().map(|r| r.pop).unwrap_or(0.0),
            disaster_n_pov: expect(|r| r.disaster_n_pov),
            disaster_pds_n_pov: expect(|r| r.disaster_pds_n_pov),
            disaster_n_pov_pct: expect(|r| r.disaster_n_pov_pct),
            disaster_n_sub: expect(|r| r.disaster_n_sub),
            disaster_pds_n_sub: expect(|r| r.disaster_pds_n_sub),
            region,
            hazard,
            rp: None,
        });
    }
    rows.extend(annual);
    log::debug!("poverty impact computed for {} rows", rows.len());
    rows
}
