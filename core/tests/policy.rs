//! Counterfactual policies and option validation.

mod common;

use common::{run, two_region_inputs};
use resilience_core::{
    config::{Policy, ScenarioConfig},
    engine::ScenarioEngine,
    error::ModelError,
    policy::apply_policy,
};

#[test]
fn faster_reconstruction_shortens_rebuild_time() {
    let mut inputs = two_region_inputs();
    for m in inputs.macro_rows.iter_mut() {
        m.t_rebuild_k = 10.0;
    }
    let policy: Policy = "_rec067".parse().unwrap();
    apply_policy(policy, &mut inputs.macro_rows, &mut inputs.households);

    for m in &inputs.macro_rows {
        assert!((m.t_rebuild_k - 6.6667).abs() < 1e-3, "T_rebuild_K = {}", m.t_rebuild_k);
    }
}

#[test]
fn unknown_policy_fails_fast() {
    let mut config = ScenarioConfig::default_test();
    config.policy = "_bogus".into();
    let result = ScenarioEngine::new(config);
    assert!(
        matches!(result, Err(ModelError::UnknownScenario { kind: "policy", .. })),
        "Unknown policy tags must not fall back to baseline"
    );
}

#[test]
fn unknown_support_option_fails_fast() {
    let mut config = ScenarioConfig::default_test();
    config.pds = "everyone_gets_a_pony".into();
    assert!(matches!(ScenarioEngine::new(config), Err(ModelError::UnknownScenario { .. })));
}

#[test]
fn baseline_leaves_inputs_untouched() {
    let mut inputs = two_region_inputs();
    let before = inputs.clone();
    let outcome = apply_policy(Policy::Baseline, &mut inputs.macro_rows, &mut inputs.households);
    assert_eq!(outcome.fiscal_cost, 0.0);
    assert_eq!(inputs.macro_rows, before.macro_rows);
    assert_eq!(inputs.households, before.households);
}

#[test]
fn poor_vulnerability_reduction_spares_the_rich() {
    let mut inputs = two_region_inputs();
    inputs.households[1].ispoor = false;
    let before = inputs.clone();
    apply_policy(Policy::ReducePoorVulnerability, &mut inputs.macro_rows, &mut inputs.households);

    assert!((inputs.households[0].v - 0.7 * before.households[0].v).abs() < 1e-12);
    assert_eq!(inputs.households[1].v, before.households[1].v);
}

#[test]
fn social_transfer_increase_records_its_cost() {
    let mut config = ScenarioConfig::default_test();
    config.policy = "_soc133".into();
    let out = run(config, two_region_inputs());

    assert!(out.policy.fiscal_cost > 0.0, "Transfer top-up should cost something");
    assert_eq!(out.run_log.count("policy_applied"), 1);
}

#[test]
fn faster_reconstruction_lowers_welfare_risk() {
    let mut config = ScenarioConfig::default_test();
    config.pds = "no".into();
    let baseline = run(config.clone(), two_region_inputs());
    config.policy = "_rec067".into();
    let faster = run(config, two_region_inputs());

    assert!(
        faster.summary.r_welf < baseline.summary.r_welf,
        "Faster rebuilding should lower welfare risk: {} vs {}",
        faster.summary.r_welf,
        baseline.summary.r_welf
    );
}

#[test]
fn tax_rate_is_recalibrated_after_the_policy() {
    let mut config = ScenarioConfig::default_test();
    config.pds = "no".into();
    let baseline = run(config.clone(), two_region_inputs());
    config.policy = "_soc133".into();
    let topped_up = run(config, two_region_inputs());

    assert!(
        (topped_up.tau_tax - baseline.tau_tax).abs() > 1e-6,
        "Transfers changed by the policy should move tau_tax: {} vs {}",
        topped_up.tau_tax,
        baseline.tau_tax
    );
    for m in &topped_up.table.macro_rows {
        assert!((m.tau_tax - topped_up.tau_tax).abs() < 1e-12, "{} carries a stale tau_tax", m.region);
    }
}

#[test]
fn poor_income_top_up_keeps_transfer_levels() {
    let mut inputs = two_region_inputs();
    inputs.households[1].ispoor = false;
    let before = inputs.clone();
    apply_policy(Policy::PoorIncomeTopUp, &mut inputs.macro_rows, &mut inputs.households);

    let poor = (&before.households[0], &inputs.households[0]);
    assert!((poor.1.pcinc - 1.1 * poor.0.pcinc).abs() < 1e-9);
    assert!(
        (poor.1.social * poor.1.pcinc - poor.0.social * poor.0.pcinc).abs() < 1e-9,
        "Transfer amount should not change: {} vs {}",
        poor.1.social * poor.1.pcinc,
        poor.0.social * poor.0.pcinc
    );
    assert_eq!(inputs.households[1], before.households[1], "Non-poor households are untouched");
}
