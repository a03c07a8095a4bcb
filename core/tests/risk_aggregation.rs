//! Expected annual risk: probability weighting, protection and the
//! headline resilience metrics.

mod common;

use common::{approx, ratio, run, two_region_inputs};
use resilience_core::{config::ScenarioConfig, risk::EventResultRow};

fn event<'a>(results: &'a [EventResultRow], region: &str, rp: u32) -> &'a EventResultRow {
    results
        .iter()
        .find(|r| r.region == region && r.rp == rp)
        .expect("event result present")
}

#[test]
fn expected_loss_weights_events_by_bracket_probability() {
    let out = run(ScenarioConfig::default_test(), two_region_inputs());
    for r in &out.risk {
        let dk10 = event(&out.results, &r.region, 10).dK;
        let dk100 = event(&out.results, &r.region, 100).dK;
        let expected = (0.1 - 0.01) * dk10 + 0.01 * dk100;
        assert!(approx(r.dK, expected), "{}: dK {} != {expected}", r.region, r.dK);
    }
}

#[test]
fn single_return_period_aggregation_is_identity() {
    let mut inputs = two_region_inputs();
    inputs.hazard_ratios = vec![ratio("north", "flood", None, 0.3), ratio("south", "flood", None, 0.2)];
    let out = run(ScenarioConfig::default_test(), inputs);

    assert!(!out.has_rp_dimension);
    for r in &out.risk {
        let e = event(&out.results, &r.region, 1);
        assert_eq!(r.dK, e.dK, "{}: dK changed by aggregation", r.region);
        assert_eq!(r.delta_W, e.delta_W, "{}: delta_W changed by aggregation", r.region);
        assert_eq!(r.dKtot, e.dKtot);
    }
}

#[test]
fn protection_removes_frequent_events() {
    let mut inputs = two_region_inputs();
    inputs.macro_rows[0].protection = 50.0;
    let out = run(ScenarioConfig::default_test(), inputs);

    let north_rps: Vec<u32> = out
        .table
        .macro_rows
        .iter()
        .filter(|m| m.region == "north")
        .map(|m| m.rp)
        .collect();
    assert_eq!(north_rps, vec![10, 50, 100], "Protection rp must join the grid");

    let north = out.risk.iter().find(|r| r.region == "north").unwrap();
    let expected = (0.02 - 0.01) * event(&out.results, "north", 50).dK
        + 0.01 * event(&out.results, "north", 100).dK;
    assert!(approx(north.dK, expected), "north dK {} != {expected}", north.dK);

    // The unprotected region keeps its own grid.
    let south_events = out.table.macro_rows.iter().filter(|m| m.region == "south").count();
    assert_eq!(south_events, 2);
}

#[test]
fn resilience_is_reference_over_realized_welfare_loss() {
    let out = run(ScenarioConfig::default_test(), two_region_inputs());
    for r in &out.risk {
        assert!(r.delta_W > 0.0, "{}: expected a welfare loss", r.region);
        assert!(approx(r.dWref, r.wprime * r.dK));
        assert!(approx(r.resilience, r.dWref / r.delta_W));
        assert!(approx(r.risk, r.delta_W / r.wprime / r.gdp_pc_prov));
        assert!(approx(r.risk_to_assets, r.resilience * r.risk));
    }
}

#[test]
fn national_summary_adds_regions() {
    let out = run(ScenarioConfig::default_test(), two_region_inputs());
    let dk: f64 = out.risk.iter().map(|r| r.dKtot).sum();
    let gdp = 2.0 * 1000.0 * 10_000.0;
    assert!(approx(out.summary.r_asset, 100.0 * dk / gdp));
    assert_eq!(out.summary.regions.len(), 2);
}

#[test]
fn quintile_table_covers_every_quintile() {
    let out = run(ScenarioConfig::default_test(), two_region_inputs());
    // One hazard, two return periods, five quintiles.
    assert_eq!(out.quintiles.len(), 10);
    for q in out.quintiles.iter().filter(|q| q.quintile > 1) {
        assert_eq!(q.pcwgt, 0.0, "Only the poorest quintile is surveyed");
    }
}
