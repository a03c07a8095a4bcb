//! Shared fixtures for the integration tests.
//!
//! Numbers are chosen so every expected value can be worked out by hand.

#![allow(dead_code)]

use resilience_core::{
    config::ScenarioConfig,
    engine::{ScenarioEngine, ScenarioOutput},
    store::{HazardRatioRecord, HouseholdRecord, InputTables, MacroRecord},
};

pub const SHAREABLE: f64 = 0.8;

pub fn macro_row(region: &str) -> MacroRecord {
    MacroRecord {
        region: region.into(),
        pop: 1000.0,
        gdp_pc_prov: 10_000.0,
        gdp_pc_nat: 10_000.0,
        avg_prod_k: 0.3,
        t_rebuild_k: 3.0,
        rho: 0.06,
        income_elast: 1.5,
        tau_tax: 0.0,
        protection: 0.0,
        pi: 0.0,
        shareable: SHAREABLE,
    }
}

/// A poorest-quintile household with consumption a quarter of its capital.
pub fn household(region: &str, hhid: &str, k: f64, v: f64, pcwgt: f64) -> HouseholdRecord {
    HouseholdRecord {
        region: region.into(),
        hhid: hhid.into(),
        k,
        c: 0.25 * k,
        c_5: 0.05 * k,
        pcinc: 0.25 * k,
        pcinc_ae: 0.3 * k,
        pcsoc: 0.0,
        social: 0.1,
        v,
        shew: 0.0,
        ispoor: true,
        quintile: 1,
        hhwgt: pcwgt / 4.0,
        pcwgt,
        pcwgt_ae: pcwgt * 0.8,
        hhsize: 4.0,
        hhsize_ae: 3.2,
        pov_line: 0.2 * k,
        gamma_sp: 0.0,
        spp_core: false,
        spp_add: false,
        sp_sps: false,
        sp_cpp: false,
        sp_pbs: false,
        n_olds: 0.0,
    }
}

pub fn ratio(region: &str, hazard: &str, rp: Option<u32>, fa: f64) -> HazardRatioRecord {
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

/// Two regions, one flood curve at rp 10 (fa 0.1) and rp 100 (fa 0.5),
/// poorest-quintile households only.
pub fn two_region_inputs() -> InputTables {
    let mut hazard_ratios = Vec::new();
    for region in ["north", "south"] {
        hazard_ratios.push(ratio(region, "flood", Some(10), 0.1));
        hazard_ratios.push(ratio(region, "flood", Some(100), 0.5));
    }
    InputTables {
        macro_rows: vec![macro_row("north"), macro_row("south")],
        households: vec![
            household("north", "n1", 1000.0, 0.2, 300.0),
            household("north", "n2", 2000.0, 0.4, 100.0),
            household("south", "s1", 500.0, 0.5, 200.0),
            household("south", "s2", 1500.0, 0.1, 200.0),
        ],
        hazard_ratios,
    }
}

/// Route engine logs through the test harness; safe to call repeatedly.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn run(config: ScenarioConfig, inputs: InputTables) -> ScenarioOutput {
    init_logging();
    ScenarioEngine::new(config)
        .expect("valid config")
        .run(inputs)
        .expect("run succeeds")
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * (1.0 + a.abs().max(b.abs()))
}
