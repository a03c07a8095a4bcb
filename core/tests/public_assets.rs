//! Shared public-asset losses: the inter-regional transfer matrix.

mod common;

use common::{approx, run, two_region_inputs};
use resilience_core::{config::ScenarioConfig, engine::ScenarioOutput, partition::AffectedStatus};
use std::collections::BTreeMap;

fn shared_run() -> ScenarioOutput {
    let mut inputs = two_region_inputs();
    for r in inputs.hazard_ratios.iter_mut() {
        r.public_loss_v = 0.05;
    }
    let mut config = ScenarioConfig::default_test();
    config.cost_attribution = "shared_public_assets".into();
    run(config, inputs)
}

#[test]
fn matrix_has_one_row_per_region_pair_and_event() {
    let out = shared_run();
    // (flood, 10) and (flood, 100), each 2 recipients × 2 contributors.
    assert_eq!(out.public_costs.len(), 8);
}

#[test]
fn contributors_pay_the_whole_public_loss() {
    let out = shared_run();
    let mut paid: BTreeMap<(String, u32), (f64, f64)> = BTreeMap::new();
    for row in &out.public_costs {
        let p = paid.entry((row.region.clone(), row.rp)).or_default();
        p.0 += row.transfer_k;
        p.1 = row.tot_cost;
    }
    for ((region, rp), (transfers, tot_cost)) in paid {
        assert!(tot_cost > 0.0, "{region}/rp={rp}: no public loss");
        assert!(
            approx(transfers, tot_cost),
            "{region}/rp={rp}: transfers {transfers} != public loss {tot_cost}"
        );
        let event = out
            .table
            .macro_rows
            .iter()
            .find(|m| m.region == region && m.rp == rp)
            .unwrap();
        assert!(approx(tot_cost, event.dk_public_event));
    }
}

#[test]
fn contributions_follow_capital_shares() {
    let out = shared_run();
    // Capital: north 300·1000 + 100·2000, south 200·500 + 200·1500.
    let share = |region: &str| if region == "north" { 5.0 / 9.0 } else { 4.0 / 9.0 };
    for row in &out.public_costs {
        assert!(approx(row.frac_k, share(&row.contributor)), "frac_k {} for {}", row.frac_k, row.contributor);
        assert!(approx(row.transfer_k, row.tot_cost * share(&row.contributor)));
        assert!(approx(row.int_cost, row.tot_cost * share(&row.region)));
        assert!(approx(row.int_cost + row.ext_cost, row.tot_cost));
        assert!(row.dw > 0.0, "Paying a transfer must cost welfare ({} -> {})", row.contributor, row.region);
    }
}

#[test]
fn unaffected_households_share_the_public_bill() {
    let out = shared_run();
    let unaffected = out
        .table
        .households
        .iter()
        .filter(|r| r.affected == Some(AffectedStatus::NotAffected) && r.pcwgt > 0.0);
    for row in unaffected {
        assert!(row.dc > 0.0, "{} at rp {} pays nothing toward public assets", row.hhid, row.rp);
        assert_eq!(row.dk, 0.0);
    }
}

#[test]
fn per_household_mode_builds_no_matrix() {
    let out = run(ScenarioConfig::default_test(), two_region_inputs());
    assert!(out.public_costs.is_empty());
}
