//! Region alignment, fiscal calibration and event-level expansion.
//!
//! EXECUTION ORDER inside this stage:
//!   1. Inner-join regions across the three input tables
//!   2. (policy is applied by the engine between 1 and 3)
//!   3. Fiscal calibration: national tax rate and transfer shares
//!   4. Optional hazard-overlap correction on normalized ratios
//!   5. Broadcast macro + household columns onto every event
//!
//! RULE: a column present both on the household and on its hazard row
//! takes the hazard row's value.

use crate::{
    config::OverlapProfile,
    error::{ModelError, ModelResult},
    event::{PipelineEvent, RunLog},
    store::{HazardRatioRecord, HouseholdRecord, InputTables, MacroRecord},
    table::{EventTable, HouseholdEventRow, MacroEventRow},
    types::{EventKey, HouseholdId, RegionId, ReturnPeriod},
};
use std::collections::{BTreeMap, BTreeSet};

/// Years until 95% of lost capital is rebuilt, as a rate.
const RECOVERY_LOG: f64 = 20.0;

// ── Region alignment ───────────────────────────────────────────────

/// Keep only regions present in all three tables.
/// Dropped regions are logged and recorded, never fatal.
pub fn align_regions(inputs: &mut InputTables, run_log: &mut RunLog) -> ModelResult<Vec<RegionId>> {
    let in_macro: BTreeSet<RegionId> = inputs.macro_rows.iter().map(|r| r.region.clone()).collect();
    let in_households: BTreeSet<RegionId> = inputs.households.iter().map(|r| r.region.clone()).collect();
    let in_hazards: BTreeSet<RegionId> = inputs.hazard_ratios.iter().map(|r| r.region.clone()).collect();

    let common: BTreeSet<RegionId> = in_macro
        .intersection(&in_households)
        .filter(|r| in_hazards.contains(*r))
        .cloned()
        .collect();
    if common.is_empty() {
        return Err(ModelError::EmptyTable("regions"));
    }

    for (table, present) in [
        ("macro", &in_macro),
        ("households", &in_households),
        ("hazard_ratios", &in_hazards),
    ] {
        let dropped: Vec<RegionId> = present.difference(&common).cloned().collect();
        if !dropped.is_empty() {
            log::warn!("dropping regions {dropped:?} from {table}: missing from another table");
            run_log.push(PipelineEvent::RegionsDropped { table: table.into(), regions: dropped });
        }
    }

    inputs.macro_rows.retain(|r| common.contains(&r.region));
    inputs.households.retain(|r| common.contains(&r.region));
    inputs.hazard_ratios.retain(|r| common.contains(&r.region));
    Ok(common.into_iter().collect())
}

// ── Fiscal calibration ─────────────────────────────────────────────

/// Set the national tax rate that finances social transfers and each
/// household's share of the transfer bill. Returns the tax rate.
///
/// With `recompute_consumption`, consumption is rebuilt from capital:
/// `c = avg_prod_k·(1−tau)·k/(1−social)`.
pub fn calibrate_fiscal(
    macro_rows: &mut [MacroRecord],
    households: &mut [HouseholdRecord],
    recompute_consumption: bool,
) -> ModelResult<f64> {
    let transfers: f64 = households.iter().map(|h| h.social * h.c * h.pcwgt).sum();
    let consumption: f64 = households.iter().map(|h| h.c * h.pcwgt).sum();
    if consumption <= 0.0 {
        return Err(ModelError::Numeric("total weighted consumption is not positive".into()));
    }
    let tau_tax = transfers / consumption;

    for hh in households.iter_mut() {
        hh.gamma_sp = if transfers > 0.0 { hh.social * hh.c / transfers } else { 0.0 };
    }
    for m in macro_rows.iter_mut() {
        m.tau_tax = tau_tax;
    }

    if recompute_consumption {
        let prod: BTreeMap<&str, f64> =
            macro_rows.iter().map(|m| (m.region.as_str(), m.avg_prod_k)).collect();
        for hh in households.iter_mut() {
            if hh.social >= 1.0 {
                return Err(ModelError::Numeric(format!(
                    "household {} in {} lives entirely on transfers (social={})",
                    hh.hhid, hh.region, hh.social
                )));
            }
            let avg_prod_k = prod.get(hh.region.as_str()).copied().unwrap_or_default();
            hh.c = avg_prod_k * (1.0 - tau_tax) * hh.k / (1.0 - hh.social);
        }
    }
    log::info!("fiscal calibration: tau_tax = {tau_tax:.4}");
    Ok(tau_tax)
}

// ── Hazard overlap correction ──────────────────────────────────────

/// A named adjustment for hazard layers that double-count exposure.
pub trait HazardOverlapCorrection {
    fn name(&self) -> &str;

    /// Correct `rows` in place; returns how many rows changed.
    fn apply(&self, rows: &mut [HazardRatioRecord]) -> usize;
}

impl HazardOverlapCorrection for OverlapProfile {
    fn name(&self) -> &str {
        &self.name
    }

    /// Within each (region, rp, hhid), remove `share × driver fa` from the
    /// two layers, first layer first. The second layer's share is taken
    /// against the first layer's corrected value.
    fn apply(&self, rows: &mut [HazardRatioRecord]) -> usize {
        type Slot = (RegionId, Option<ReturnPeriod>, Option<HouseholdId>);
        let layer_of = |hazard: &str| -> Option<usize> {
            if hazard == self.driver_hazard {
                Some(0)
            } else if hazard == self.first_hazard {
                Some(1)
            } else if hazard == self.second_hazard {
                Some(2)
            } else {
                None
            }
        };

        // [driver, first, second] fa as read.
        let mut layers: BTreeMap<Slot, [f64; 3]> = BTreeMap::new();
        for row in rows.iter() {
            if let Some(layer) = layer_of(&row.hazard) {
                let slot = (row.region.clone(), row.rp, row.hhid.clone());
                layers.entry(slot).or_insert([0.0; 3])[layer] = row.fa;
            }
        }
        let corrected: BTreeMap<Slot, [f64; 3]> = layers
            .into_iter()
            .filter_map(|(slot, [driver, first, second])| {
                if driver <= 0.0 || first + second <= 0.0 {
                    return None;
                }
                let removed = self.share * driver;
                let first = (first - removed * first / (first + second)).max(0.0);
                let second = if first + second > 0.0 {
                    (second - removed * second / (first + second)).max(0.0)
                } else {
                    second
                };
                Some((slot, [driver, first, second]))
            })
            .collect();

        let mut changed = 0;
        for row in rows.iter_mut() {
            let layer = match layer_of(&row.hazard) {
                Some(layer @ (1 | 2)) => layer,
                _ => continue,
            };
            let slot = (row.region.clone(), row.rp, row.hhid.clone());
            if let Some(fa) = corrected.get(&slot) {
                row.fa = fa[layer];
                changed += 1;
            }
        }
        changed
    }
}

// ── Event expansion ────────────────────────────────────────────────

/// Broadcast households and macro aggregates onto every event.
///
/// Every household of a region gets one row per (hazard, rp) of that
/// region. A household-specific hazard row wins over a region-wide one.
pub fn expand(
    macro_rows: &[MacroRecord],
    households: &[HouseholdRecord],
    ratios: &[HazardRatioRecord],
    run_log: &mut RunLog,
) -> ModelResult<EventTable> {
    let macro_by_region: BTreeMap<&str, &MacroRecord> =
        macro_rows.iter().map(|m| (m.region.as_str(), m)).collect();

    let mut events: BTreeSet<EventKey> = BTreeSet::new();
    let mut specific: BTreeMap<(EventKey, &str), &HazardRatioRecord> = BTreeMap::new();
    let mut regional: BTreeMap<EventKey, &HazardRatioRecord> = BTreeMap::new();
    for row in ratios {
        let rp = row.rp.ok_or_else(|| ModelError::MalformedCurve {
            region: row.region.clone(),
            hazard: row.hazard.clone(),
            detail: "hazard ratios must be normalized before expansion".into(),
        })?;
        let key = EventKey::new(row.region.clone(), row.hazard.clone(), rp);
        events.insert(key.clone());
        match &row.hhid {
            Some(hhid) => {
                specific.insert((key, hhid.as_str()), row);
            }
            None => {
                regional.insert(key, row);
            }
        }
    }

    let mut by_region: BTreeMap<&str, Vec<&HouseholdRecord>> = BTreeMap::new();
    for hh in households {
        by_region.entry(hh.region.as_str()).or_default().push(hh);
    }

    let mut replaced: BTreeSet<&'static str> = BTreeSet::new();
    let mut clamped: BTreeMap<(RegionId, String), usize> = BTreeMap::new();
    let mut table = EventTable::default();

    for key in &events {
        let Some(m) = macro_by_region.get(key.region.as_str()) else {
            continue;
        };
        let members = by_region.get(key.region.as_str()).map(Vec::as_slice).unwrap_or(&[]);
        let mut dy_over_dk_sum = 0.0;

        for hh in members {
            let ratio = specific
                .get(&(key.clone(), hh.hhid.as_str()))
                .or_else(|| regional.get(key))
                .ok_or_else(|| ModelError::MissingHazardRatio {
                    region: key.region.clone(),
                    hazard: key.hazard.clone(),
                    rp: key.rp,
                    hhid: hh.hhid.clone(),
                })?;

            let mut fa = ratio.fa;
            if !(0.0..=1.0).contains(&fa) {
                *clamped.entry(key.region_hazard()).or_default() += 1;
                fa = fa.clamp(0.0, 1.0);
            }
            let mut overlay = |column: &'static str, value: Option<f64>, fallback: f64| match value {
                Some(x) => {
                    replaced.insert(column);
                    x
                }
                None => fallback,
            };
            let v = overlay("v", ratio.v, hh.v);
            let shew = overlay("shew", ratio.shew, hh.shew);
            let hh_share = overlay("hh_share", ratio.hh_share, 1.0);
            let dy_over_dk = ratio.dy_over_dk.unwrap_or(m.avg_prod_k);
            dy_over_dk_sum += dy_over_dk;

            table.households.push(HouseholdEventRow {
                region: key.region.clone(),
                hazard: key.hazard.clone(),
                rp: key.rp,
                hhid: hh.hhid.clone(),
                quintile: hh.quintile,
                ispoor: hh.ispoor,
                hhwgt: hh.hhwgt,
                pcwgt: hh.pcwgt,
                pcwgt_ae: hh.pcwgt_ae,
                hhsize: hh.hhsize,
                hhsize_ae: hh.hhsize_ae,
                k: hh.k,
                c: hh.c,
                c_5: hh.c_5,
                pcinc_ae: hh.pcinc_ae,
                social: hh.social,
                gamma_sp: hh.gamma_sp,
                pov_line: hh.pov_line,
                fa,
                v: v.clamp(0.0, 1.0),
                hh_share,
                shew,
                public_loss_v: ratio.public_loss_v,
                dy_over_dk,
                spp_core: hh.spp_core,
                spp_add: hh.spp_add,
                sp_sps: hh.sp_sps,
                sp_cpp: hh.sp_cpp,
                sp_pbs: hh.sp_pbs,
                n_olds: hh.n_olds,
                ..Default::default()
            });
        }

        let dy_over_dk = if members.is_empty() {
            m.avg_prod_k
        } else {
            dy_over_dk_sum / members.len() as f64
        };
        table.macro_rows.push(MacroEventRow {
            region: key.region.clone(),
            hazard: key.hazard.clone(),
            rp: key.rp,
            pop: m.pop,
            gdp_pc_prov: m.gdp_pc_prov,
            gdp_pc_nat: m.gdp_pc_nat,
            avg_prod_k: m.avg_prod_k,
            t_rebuild_k: m.t_rebuild_k,
            rho: m.rho,
            income_elast: m.income_elast,
            tau_tax: m.tau_tax,
            protection: m.protection,
            pi: m.pi,
            shareable: m.shareable,
            dy_over_dk,
            macro_multiplier: macro_multiplier(dy_over_dk, m.rho, m.t_rebuild_k)?,
            ..Default::default()
        });
    }

    for ((region, hazard), rows) in clamped {
        log::warn!("clamped fa into [0,1] on {rows} rows of {region}/{hazard}");
        run_log.push(PipelineEvent::FaClamped { region, hazard, rows });
    }
    if !replaced.is_empty() {
        let columns: Vec<String> = replaced.into_iter().map(String::from).collect();
        log::info!("hazard ratios replace household columns {columns:?}");
        run_log.push(PipelineEvent::ColumnsReplaced { columns });
    }
    if table.households.is_empty() {
        return Err(ModelError::EmptyTable("households_event"));
    }
    Ok(table)
}

/// NPV factor for a capital loss rebuilt exponentially over `t_rebuild_k` years.
pub fn macro_multiplier(dy_over_dk: f64, rho: f64, t_rebuild_k: f64) -> ModelResult<f64> {
    if t_rebuild_k <= 0.0 || !t_rebuild_k.is_finite() {
        return Err(ModelError::Numeric(format!("reconstruction time {t_rebuild_k} is not positive")));
    }
    let recons_rate = RECOVERY_LOG.ln() / t_rebuild_k;
    Ok((dy_over_dk + recons_rate) / (rho + recons_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratio(hazard: &str, fa: f64) -> HazardRatioRecord {
        HazardRatioRecord {
            region: "viti".into(),
            hazard: hazard.into(),
            rp: Some(10),
            hhid: None,
            fa,
            public_loss_v: 0.0,
            v: None,
            hh_share: None,
            shew: None,
            dy_over_dk: None,
        }
    }

    #[test]
    fn overlap_corrects_second_layer_against_corrected_first() {
        let profile = OverlapProfile::named("fiji_tc_flood").unwrap();
        let mut rows = vec![ratio("TC", 0.5), ratio("flood_fluv_undef", 0.3), ratio("flood_pluv", 0.1)];
        let changed = profile.apply(&mut rows);
        assert_eq!(changed, 2);
        // 0.4 × 0.5 = 0.2 removed. Fluvial: 0.3 − 0.2·0.3/0.4 = 0.15.
        // Pluvial: 0.1 − 0.2·0.1/(0.15 + 0.1) = 0.02.
        assert!((rows[1].fa - 0.15).abs() < 1e-12, "fluvial fa {}", rows[1].fa);
        assert!((rows[2].fa - 0.02).abs() < 1e-12, "pluvial fa {}", rows[2].fa);
        assert_eq!(rows[0].fa, 0.5, "driver hazard is untouched");
    }

    #[test]
    fn overlap_never_goes_negative() {
        let profile = OverlapProfile { share: 5.0, ..OverlapProfile::named("fiji_tc_flood").unwrap() };
        let mut rows = vec![ratio("TC", 0.9), ratio("flood_fluv_undef", 0.1), ratio("flood_pluv", 0.1)];
        profile.apply(&mut rows);
        assert!(rows.iter().all(|r| r.fa >= 0.0));
    }

    #[test]
    fn multiplier_is_one_when_productivity_equals_discount() {
        let mm = macro_multiplier(0.06, 0.06, 3.0).unwrap();
        assert!((mm - 1.0).abs() < 1e-12);
        assert!(macro_multiplier(0.3, 0.06, 0.0).is_err());
    }
}
