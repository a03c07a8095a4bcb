//! End-to-end runs: input alignment, expansion edge cases and output files.

mod common;

use common::{household, init_logging, macro_row, ratio, run, two_region_inputs};
use resilience_core::{
    config::ScenarioConfig,
    engine::ScenarioEngine,
    error::ModelError,
    event::RunLog,
    store::{InputTables, TableStore},
};

#[test]
fn regions_missing_from_any_table_are_dropped_and_logged() {
    let mut inputs = two_region_inputs();
    inputs.macro_rows.push(macro_row("east"));
    inputs.households.push(household("west", "w1", 800.0, 0.3, 50.0));
    let out = run(ScenarioConfig::default_test(), inputs);

    assert_eq!(out.run_log.dropped_regions(), vec!["east".to_string(), "west".to_string()]);
    assert!(out.table.macro_rows.iter().all(|m| m.region == "north" || m.region == "south"));
}

#[test]
fn household_specific_ratios_override_regional_ones() {
    let mut inputs = two_region_inputs();
    let mut specific = ratio("north", "flood", Some(10), 0.1);
    specific.hhid = Some("n1".into());
    specific.v = Some(0.6);
    let mut specific_100 = ratio("north", "flood", Some(100), 0.5);
    specific_100.hhid = Some("n1".into());
    specific_100.v = Some(0.6);
    inputs.hazard_ratios.extend([specific, specific_100]);

    let out = run(ScenarioConfig::default_test(), inputs);
    for row in out.table.households.iter().filter(|r| r.region == "north") {
        let expected = if row.hhid == "n1" { 0.6 } else { 0.4 };
        assert_eq!(row.v, expected, "{} has v {}", row.hhid, row.v);
    }
    assert_eq!(out.run_log.count("columns_replaced"), 1);
}

#[test]
fn out_of_range_fa_is_clamped_and_logged() {
    let mut inputs = two_region_inputs();
    inputs.hazard_ratios[1].fa = 1.4;
    let out = run(ScenarioConfig::default_test(), inputs);

    assert!(out.table.macro_rows.iter().all(|m| m.fa <= 1.0));
    assert_eq!(out.run_log.count("fa_clamped"), 1);
}

#[test]
fn duplicate_return_period_is_a_malformed_curve() {
    let mut inputs = two_region_inputs();
    inputs.hazard_ratios.push(ratio("north", "flood", Some(10), 0.2));
    let result = ScenarioEngine::new(ScenarioConfig::default_test()).unwrap().run(inputs);
    assert!(matches!(result, Err(ModelError::MalformedCurve { .. })), "got {result:?}");
}

#[test]
fn hazard_overlap_profile_is_applied_when_configured() {
    let mut inputs = InputTables {
        macro_rows: vec![macro_row("viti")],
        households: vec![household("viti", "v1", 1000.0, 0.3, 100.0)],
        hazard_ratios: Vec::new(),
    };
    for (hazard, fa) in [("TC", 0.5), ("flood_fluv_undef", 0.3), ("flood_pluv", 0.1)] {
        inputs.hazard_ratios.push(ratio("viti", hazard, Some(10), fa));
    }

    let mut config = ScenarioConfig::default_test();
    config.overlap_correction = Some("fiji_tc_flood".into());
    let out = run(config, inputs);

    assert_eq!(out.run_log.count("overlap_corrected"), 1);
    let fa = |hazard: &str| out.table.macro_rows.iter().find(|m| m.hazard == hazard).unwrap().fa;
    // 0.4 × 0.5 removed. Fluvial takes 0.3/0.4 of it; pluvial is then
    // weighed against the corrected fluvial share, 0.1/(0.15 + 0.1).
    assert!((fa("flood_fluv_undef") - 0.15).abs() < 1e-9, "fluvial fa {}", fa("flood_fluv_undef"));
    assert!((fa("flood_pluv") - 0.02).abs() < 1e-9, "pluvial fa {}", fa("flood_pluv"));
    assert!((fa("TC") - 0.5).abs() < 1e-9);
}

#[test]
fn poverty_counts_people_pushed_below_the_line() {
    let mut inputs = two_region_inputs();
    // Every household starts above the line and no affected one survives the loss above it.
    for hh in inputs.households.iter_mut() {
        hh.pov_line = hh.c;
    }
    let mut config = ScenarioConfig::default_test();
    config.pds = "no".into();
    let out = run(config, inputs);

    let annual: Vec<_> = out.poverty.iter().filter(|p| p.rp.is_none()).collect();
    assert_eq!(annual.len(), 2, "One annual row per region and hazard");
    for p in out.poverty.iter().filter(|p| p.rp == Some(100)) {
        // Half the population is affected and every affected household falls below.
        assert!(p.disaster_n_pov >= 0.5 * p.pop - 1e-9, "{}: {} of {}", p.region, p.disaster_n_pov, p.pop);
        assert!(p.disaster_n_pov_pct <= 1.0);
    }
}

#[test]
fn outputs_are_written_to_the_store() {
    let dir = std::env::temp_dir().join(format!("resilience-pipeline-{}", std::process::id()));
    let mut config = ScenarioConfig::default_test();
    config.pds = "fiji_SPS".into();
    let out = run(config, two_region_inputs());
    out.write(&TableStore::open(&dir)).expect("write outputs");

    for name in [
        "macro_event.csv",
        "households_event.csv",
        "results.csv",
        "risk.csv",
        "poverty.csv",
        "quintiles.csv",
        "scheme_details.csv",
        "scheme_expenditure.csv",
        "run_log.json",
    ] {
        assert!(dir.join(name).exists(), "{name} was not written");
    }
    let log: RunLog =
        serde_json::from_str(&std::fs::read_to_string(dir.join("run_log.json")).unwrap()).unwrap();
    assert_eq!(log.count("run_started"), 1);
    assert_eq!(log.count("run_completed"), 1);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn inputs_round_trip_through_the_store() {
    let dir = std::env::temp_dir().join(format!("resilience-inputs-{}", std::process::id()));
    let store = TableStore::open(&dir);
    let inputs = two_region_inputs();
    store.write_table("macro.csv", &inputs.macro_rows).unwrap();
    store.write_table("households.csv", &inputs.households).unwrap();
    store.write_table("hazard_ratios.csv", &inputs.hazard_ratios).unwrap();

    let read = store.read_inputs().expect("read inputs");
    assert_eq!(read.macro_rows, inputs.macro_rows);
    assert_eq!(read.households.len(), inputs.households.len());
    assert_eq!(read.hazard_ratios, inputs.hazard_ratios);

    let direct = run(ScenarioConfig::default_test(), inputs);
    let from_disk = run(ScenarioConfig::default_test(), read);
    assert_eq!(direct.summary, from_disk.summary);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn repeated_runs_share_one_test_logger() {
    init_logging();
    init_logging();
    let first = run(ScenarioConfig::default_test(), two_region_inputs());
    let second = run(ScenarioConfig::default_test(), two_region_inputs());
    assert_eq!(first.summary, second.summary, "Logger setup must not disturb the run");
}
