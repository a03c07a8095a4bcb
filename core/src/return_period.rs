//! Return-period normalization and event probabilities.
//!
//! RULE: after `normalize`, every hazard curve of a region is defined
//! on the same sorted return-period grid, and that grid contains every
//! protection level of the region. Cross-hazard aggregation relies on it.

use crate::{
    error::{ModelError, ModelResult},
    store::HazardRatioRecord,
    types::{HouseholdId, RegionId, ReturnPeriod},
};
use std::collections::{BTreeMap, BTreeSet};

/// Hazard ratios on a unified return-period grid.
#[derive(Debug, Clone)]
pub struct NormalizedRatios {
    /// Every row has `rp` set.
    pub rows: Vec<HazardRatioRecord>,
    /// False when the input carried no return periods and was broadcast
    /// to the default one.
    pub has_rp_dimension: bool,
}

type CurveKey = (RegionId, String, Option<HouseholdId>);

/// Bring every hazard curve onto its region's shared grid.
///
/// `protection` maps region to the protection return period that must
/// be present on that region's grid.
pub fn normalize(
    rows: &[HazardRatioRecord],
    protection: &BTreeMap<RegionId, f64>,
    default_rp: ReturnPeriod,
) -> ModelResult<NormalizedRatios> {
    let with_rp = rows.iter().filter(|r| r.rp.is_some()).count();
    if with_rp == 0 {
        let rows = rows
            .iter()
            .cloned()
            .map(|mut r| {
                r.rp = Some(default_rp);
                r
            })
            .collect();
        log::info!("hazard ratios carry no return period, broadcast to rp={default_rp}");
        return Ok(NormalizedRatios { rows, has_rp_dimension: false });
    }
    if with_rp != rows.len() {
        let r = rows.iter().find(|r| r.rp.is_none()).map(|r| (r.region.clone(), r.hazard.clone()));
        let (region, hazard) = r.unwrap_or_default();
        return Err(ModelError::MalformedCurve {
            region,
            hazard,
            detail: "some rows have a return period and some do not".into(),
        });
    }

    let mut curves: BTreeMap<CurveKey, BTreeMap<ReturnPeriod, &HazardRatioRecord>> = BTreeMap::new();
    for row in rows {
        let rp = row.rp.unwrap_or(default_rp);
        let key = (row.region.clone(), row.hazard.clone(), row.hhid.clone());
        if rp == 0 || !row.fa.is_finite() || !row.public_loss_v.is_finite() {
            return Err(malformed(&key, format!("rp={rp} fa={} is not usable", row.fa)));
        }
        if curves.entry(key.clone()).or_default().insert(rp, row).is_some() {
            return Err(malformed(&key, format!("return period {rp} appears twice")));
        }
    }

    let grids = region_grids(&curves, protection);
    let mut out = Vec::new();
    for (key, points) in &curves {
        let grid = &grids[&key.0];
        out.extend(resample_curve(key, points, grid)?);
    }
    log::debug!(
        "normalized {} curves onto {} region grids ({} rows)",
        curves.len(),
        grids.len(),
        out.len()
    );
    Ok(NormalizedRatios { rows: out, has_rp_dimension: true })
}

/// Union of every observed return period in a region plus its protection.
fn region_grids(
    curves: &BTreeMap<CurveKey, BTreeMap<ReturnPeriod, &HazardRatioRecord>>,
    protection: &BTreeMap<RegionId, f64>,
) -> BTreeMap<RegionId, Vec<ReturnPeriod>> {
    let mut grids: BTreeMap<RegionId, BTreeSet<ReturnPeriod>> = BTreeMap::new();
    for ((region, _, _), points) in curves {
        grids.entry(region.clone()).or_default().extend(points.keys().copied());
    }
    for (region, grid) in grids.iter_mut() {
        if let Some(&p) = protection.get(region) {
            if p >= 1.0 && p.is_finite() {
                grid.insert(p.round() as ReturnPeriod);
            }
        }
    }
    grids
        .into_iter()
        .map(|(region, set)| (region, set.into_iter().collect()))
        .collect()
}

fn resample_curve(
    key: &CurveKey,
    points: &BTreeMap<ReturnPeriod, &HazardRatioRecord>,
    grid: &[ReturnPeriod],
) -> ModelResult<Vec<HazardRatioRecord>> {
    let rps: Vec<f64> = points.keys().map(|&rp| rp as f64).collect();
    let xs: Vec<f64> = grid.iter().map(|&rp| rp as f64).collect();

    let column = |get: &dyn Fn(&HazardRatioRecord) -> f64| -> Vec<f64> {
        let ys: Vec<f64> = points.values().map(|r| get(r)).collect();
        interpolate_curve(&rps, &ys, &xs)
    };
    let optional = |name: &str, get: &dyn Fn(&HazardRatioRecord) -> Option<f64>| {
        let present = points.values().filter(|r| get(r).is_some()).count();
        if present == 0 {
            Ok(None)
        } else if present == points.len() {
            let ys: Vec<f64> = points.values().map(|r| get(r).unwrap_or_default()).collect();
            Ok(Some(interpolate_curve(&rps, &ys, &xs)))
        } else {
            Err(malformed(key, format!("column {name} is only partly filled")))
        }
    };

    let fa = column(&|r| r.fa);
    let public_loss_v = column(&|r| r.public_loss_v);
    let v = optional("v", &|r| r.v)?;
    let hh_share = optional("hh_share", &|r| r.hh_share)?;
    let shew = optional("shew", &|r| r.shew)?;
    let dy_over_dk = optional("dy_over_dk", &|r| r.dy_over_dk)?;

    if fa.iter().any(|x| !x.is_finite()) {
        return Err(malformed(key, "interpolated fa is not finite".into()));
    }

    Ok(grid
        .iter()
        .enumerate()
        .map(|(i, &rp)| HazardRatioRecord {
            region: key.0.clone(),
            hazard: key.1.clone(),
            rp: Some(rp),
            hhid: key.2.clone(),
            fa: fa[i],
            public_loss_v: public_loss_v[i],
            v: v.as_ref().map(|col| col[i]),
            hh_share: hh_share.as_ref().map(|col| col[i]),
            shew: shew.as_ref().map(|col| col[i]),
            dy_over_dk: dy_over_dk.as_ref().map(|col| col[i]),
        })
        .collect())
}

fn malformed(key: &CurveKey, detail: String) -> ModelError {
    ModelError::MalformedCurve { region: key.0.clone(), hazard: key.1.clone(), detail }
}

/// Resample an observed curve `(rps, values)` onto `grid`.
///
/// The curve is extended linearly to rp = 0 through its two smallest
/// points (a single point gives a flat curve), interpolated linearly in
/// between, held constant past the largest observed rp, and clipped at 0.
/// `rps` must be sorted ascending and non-empty.
pub fn interpolate_curve(rps: &[f64], values: &[f64], grid: &[f64]) -> Vec<f64> {
    let n = rps.len().min(values.len());
    if n == 0 {
        return vec![f64::NAN; grid.len()];
    }
    let at_zero = if n == 1 {
        values[0]
    } else {
        values[0] - rps[0] * (values[1] - values[0]) / (rps[1] - rps[0])
    };
    let mut xs = Vec::with_capacity(n + 1);
    let mut ys = Vec::with_capacity(n + 1);
    xs.push(0.0);
    ys.push(at_zero);
    xs.extend_from_slice(&rps[..n]);
    ys.extend_from_slice(&values[..n]);

    grid.iter()
        .map(|&x| {
            let last = xs.len() - 1;
            let y = if x >= xs[last] {
                ys[last]
            } else {
                let hi = xs.partition_point(|&p| p <= x).clamp(1, last);
                let lo = hi - 1;
                let t = (x - xs[lo]) / (xs[hi] - xs[lo]);
                ys[lo] + t * (ys[hi] - ys[lo])
            };
            y.max(0.0)
        })
        .collect()
}

// ── Probabilities ──────────────────────────────────────────────────

/// Annual probability of the event bracket at each return period.
///
/// `p_i = 1/rp_i - 1/rp_{i+1}` and the last bracket is `1/rp_n`, so the
/// probabilities sum to `1/rp_1`. `rps` must be sorted ascending.
pub fn event_probabilities(rps: &[ReturnPeriod]) -> Vec<f64> {
    rps.iter()
        .enumerate()
        .map(|(i, &rp)| {
            let this = 1.0 / rp as f64;
            match rps.get(i + 1) {
                Some(&next) => this - 1.0 / next as f64,
                None => this,
            }
        })
        .collect()
}

/// Probability-weighted sum of `points` over return periods.
///
/// Brackets below `protection` carry no probability. Without a
/// return-period dimension the single value is passed through unchanged.
pub fn expected_value(points: &[(ReturnPeriod, f64)], protection: f64, has_rp_dimension: bool) -> f64 {
    if !has_rp_dimension {
        return points.first().map(|(_, v)| *v).unwrap_or(0.0);
    }
    let mut sorted = points.to_vec();
    sorted.sort_by_key(|(rp, _)| *rp);
    let rps: Vec<ReturnPeriod> = sorted.iter().map(|(rp, _)| *rp).collect();
    event_probabilities(&rps)
        .into_iter()
        .zip(&sorted)
        .map(|(p, (rp, value))| if (*rp as f64) < protection { 0.0 } else { p * value })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratio(region: &str, hazard: &str, rp: Option<u32>, fa: f64) -> HazardRatioRecord {
        HazardRatioRecord {
            region: region.into(),
            hazard: hazard.into(),
            rp,
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
    fn extrapolates_to_zero_and_clips() {
        // Line through (10, 0.1) and (100, 0.5) hits 0.0556 at rp 0.
        let out = interpolate_curve(&[10.0, 100.0], &[0.1, 0.5], &[1.0, 10.0, 55.0, 100.0, 500.0]);
        let slope = 0.4 / 90.0;
        assert!((out[0] - (0.1 - 9.0 * slope)).abs() < 1e-12);
        assert!((out[1] - 0.1).abs() < 1e-12);
        assert!((out[2] - 0.3).abs() < 1e-12);
        assert_eq!(out[4], 0.5, "beyond the largest rp the curve is held");

        let steep = interpolate_curve(&[10.0, 20.0], &[0.1, 0.5], &[1.0]);
        assert_eq!(steep[0], 0.0, "negative extrapolation is clipped");
    }

    #[test]
    fn single_point_curve_is_flat() {
        let out = interpolate_curve(&[50.0], &[0.3], &[1.0, 50.0, 1000.0]);
        assert!(out.iter().all(|&x| (x - 0.3).abs() < 1e-12));
    }

    #[test]
    fn hazards_in_a_region_share_one_grid() {
        let rows = vec![
            ratio("north", "flood", Some(10), 0.1),
            ratio("north", "flood", Some(100), 0.5),
            ratio("north", "wind", Some(25), 0.2),
        ];
        let protection = BTreeMap::from([("north".to_string(), 5.0)]);
        let out = normalize(&rows, &protection, 1).unwrap();
        let grid_of = |hazard: &str| -> Vec<u32> {
            out.rows.iter().filter(|r| r.hazard == hazard).filter_map(|r| r.rp).collect()
        };
        assert_eq!(grid_of("flood"), vec![5, 10, 25, 100]);
        assert_eq!(grid_of("flood"), grid_of("wind"));
    }

    #[test]
    fn missing_rp_broadcasts_to_default() {
        let rows = vec![ratio("north", "flood", None, 0.2)];
        let out = normalize(&rows, &BTreeMap::new(), 1).unwrap();
        assert!(!out.has_rp_dimension);
        assert_eq!(out.rows[0].rp, Some(1));
        assert_eq!(out.rows[0].fa, 0.2);
    }

    #[test]
    fn duplicated_rp_is_malformed() {
        let rows = vec![ratio("north", "flood", Some(10), 0.1), ratio("north", "flood", Some(10), 0.2)];
        let err = normalize(&rows, &BTreeMap::new(), 1).unwrap_err();
        assert!(matches!(err, ModelError::MalformedCurve { .. }));
    }

    #[test]
    fn probabilities_sum_to_first_frequency() {
        let p = event_probabilities(&[1, 10, 100]);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((p[2] - 0.01).abs() < 1e-12);
    }

    #[test]
    fn protection_zeroes_low_brackets() {
        let points = [(1, 100.0), (10, 100.0), (100, 100.0)];
        let unprotected = expected_value(&points, 0.0, true);
        let protected = expected_value(&points, 10.0, true);
        assert!((unprotected - 100.0).abs() < 1e-9);
        assert!((protected - 10.0).abs() < 1e-9);
    }
}
