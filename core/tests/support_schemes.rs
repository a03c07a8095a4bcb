//! Post-disaster support: allocation, financing and caps.

mod common;

use common::{approx, household, macro_row, ratio, run, two_region_inputs, SHAREABLE};
use resilience_core::{
    config::ScenarioConfig,
    partition::{AffectedStatus, HelpedStatus},
    store::InputTables,
    types::EventKey,
};
use std::collections::BTreeMap;

#[test]
fn uniform_poor_pays_shareable_mean_loss_to_affected_helped() {
    let out = run(ScenarioConfig::default_test(), two_region_inputs());

    // Weighted mean dk of affected quintile-1 households, by hand:
    // north: (300·1000·0.2 + 100·2000·0.4) / 400 = 350
    // south: (200·500·0.5 + 200·1500·0.1) / 400 = 200
    let mean_dk = |region: &str| if region == "north" { 350.0 } else { 200.0 };

    for row in &out.table.households {
        let expected = match (row.affected, row.helped) {
            (Some(AffectedStatus::Affected), Some(HelpedStatus::Helped)) => SHAREABLE * mean_dk(&row.region),
            _ => 0.0,
        };
        assert!(
            (row.help_received - expected).abs() < 1e-6,
            "{} {:?}/{:?} at rp {}: help {} != {expected}",
            row.hhid, row.affected, row.helped, row.rp, row.help_received
        );
    }
}

#[test]
fn tax_financing_balances_every_event() {
    for (targeting, pds) in [("data", "prop"), ("x33", "unif_poor"), ("incl", "unif_poor_only")] {
        let mut config = ScenarioConfig::default_test();
        config.targeting = targeting.into();
        config.pds = pds.into();
        let out = run(config, two_region_inputs());

        let mut flows: BTreeMap<EventKey, (f64, f64)> = BTreeMap::new();
        for row in &out.table.households {
            let f = flows.entry(row.key()).or_default();
            f.0 += row.help_received * row.pcwgt;
            f.1 += row.help_fee * row.pcwgt;
        }
        for (key, (paid, raised)) in flows {
            assert!(
                approx(paid, raised),
                "[{targeting}/{pds}] {key}: disbursed {paid:.6} but raised {raised:.6}"
            );
        }
    }
}

#[test]
fn support_is_capped_at_max_aid() {
    let mut config = ScenarioConfig::default_test();
    config.max_increased_spending = 0.001; // max_aid = 10 per capita
    let out = run(config, two_region_inputs());

    for m in &out.table.macro_rows {
        assert!(approx(m.max_aid, 10.0), "max_aid {} != 10", m.max_aid);
        assert!(m.need <= m.max_aid + 1e-9, "{}: need {} above cap", m.key(), m.need);
    }
    assert!(out.run_log.count("aid_capped") > 0, "Cap should have been hit and logged");
}

#[test]
fn no_support_pays_nothing() {
    let mut config = ScenarioConfig::default_test();
    config.pds = "no".into();
    let out = run(config, two_region_inputs());

    assert!(out.table.households.iter().all(|r| r.help_received == 0.0 && r.help_fee == 0.0));
    assert!(out.support.details.is_empty());
}

#[test]
fn insurance_premium_is_the_expected_payout() {
    let mut config = ScenarioConfig::default_test();
    config.fee = "insurance_premium".into();
    let out = run(config, two_region_inputs());

    // Per-capita help of household n1 at each return period.
    let mut by_rp: BTreeMap<u32, (f64, f64)> = BTreeMap::new();
    for row in out.table.households.iter().filter(|r| r.hhid == "n1") {
        let s = by_rp.entry(row.rp).or_default();
        s.0 += row.help_received * row.pcwgt;
        s.1 += row.pcwgt;
    }
    let per_capita = |rp: u32| by_rp[&rp].0 / by_rp[&rp].1;
    let expected = (1.0 / 10.0 - 1.0 / 100.0) * per_capita(10) + (1.0 / 100.0) * per_capita(100);

    for row in out.table.households.iter().filter(|r| r.hhid == "n1") {
        assert!(approx(row.help_fee, expected), "premium {} != {expected}", row.help_fee);
    }
}

fn benchmark_inputs() -> InputTables {
    let mut enrolled = household("north", "n1", 1000.0, 0.2, 300.0);
    enrolled.sp_pbs = true;
    enrolled.sp_sps = true;
    enrolled.n_olds = 1.0;
    InputTables {
        macro_rows: vec![macro_row("north")],
        households: vec![enrolled, household("north", "n2", 2000.0, 0.4, 100.0)],
        hazard_ratios: vec![
            ratio("north", "wind", Some(5), 0.05),
            ratio("north", "wind", Some(50), 0.2),
            ratio("north", "wind", Some(200), 0.4),
        ],
    }
}

#[test]
fn benchmark_payout_scales_with_national_loss() {
    let mut config = ScenarioConfig::default_test();
    config.pds = "fiji_SPS".into();
    let out = run(config, benchmark_inputs());

    let dk = |rp: u32| {
        out.table.macro_rows.iter().find(|m| m.rp == rp).map(|m| m.dk_event).unwrap()
    };
    let f50 = dk(50) / dk(200);
    assert!(f50 > 0.0 && f50 < 1.0, "benchmark fraction {f50} should be partial");

    for row in out.table.households.iter().filter(|r| r.helped == Some(HelpedStatus::Helped)) {
        let f = match row.rp {
            5 => 0.0, // below the minimum return period
            50 => f50,
            _ => 1.0,
        };
        let expected = if row.hhid == "n1" && row.pcwgt > 0.0 {
            (300.0 + 600.0) * row.hhwgt * f / row.pcwgt
        } else {
            0.0
        };
        assert!(
            approx(row.help_received, expected),
            "{} at rp {}: help {} != {expected}",
            row.hhid, row.rp, row.help_received
        );
    }

    let details: Vec<(u32, f64)> = out.support.details.iter().map(|d| (d.rp, d.f_benchmark)).collect();
    assert_eq!(details.len(), 3);
    assert!(out.support.expenditure.iter().any(|e| e.rp.is_none()), "Annual expenditure row missing");
}

#[test]
fn missing_benchmark_event_is_logged() {
    let mut config = ScenarioConfig::default_test();
    config.pds = "fiji_SPS".into();
    config.benchmark.benchmark_rp = 500;
    let out = run(config, benchmark_inputs());

    assert_eq!(out.run_log.count("benchmark_missing"), 1);
    assert!(out.table.households.iter().all(|r| r.help_received == 0.0));
}
