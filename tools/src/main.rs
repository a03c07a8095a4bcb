//! resilience-runner: headless scenario runner.
//!
//! Usage:
//!   resilience-runner --config scenario.json --data-dir ./inputs --out ./outputs
//!   resilience-runner --config scenario.json --pds prop --policy _exp095 --seed 7
//!
//! Each run writes its tables plus a `manifest.json` into `<out>/<run_id>/`.

use anyhow::Result;
use resilience_core::{
    config::ScenarioConfig,
    engine::{ScenarioEngine, ScenarioOutput},
    store::TableStore,
    summary::NationalSummary,
};
use serde::Serialize;
use std::env;
use std::path::Path;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let config_path = string_arg(&args, "--config").unwrap_or("scenario.json");
    let data_dir = string_arg(&args, "--data-dir").unwrap_or("./inputs");
    let out_root = string_arg(&args, "--out").unwrap_or("./outputs");

    let mut config = ScenarioConfig::load(config_path)?;
    if let Some(policy) = string_arg(&args, "--policy") {
        config.policy = policy.to_string();
    }
    if let Some(pds) = string_arg(&args, "--pds") {
        config.pds = pds.to_string();
    }
    config.seed = parse_arg(&args, "--seed", config.seed);

    let run_id = format!(
        "{}{}_{}-{}",
        config.country,
        config.policy,
        config.pds,
        chrono::Utc::now().format("%Y%m%dT%H%M%S")
    );
    let out_dir = Path::new(out_root).join(&run_id);

    println!("resilience-runner");
    println!("  country:   {}", config.country);
    println!("  policy:    {}", if config.policy.is_empty() { "(baseline)" } else { config.policy.as_str() });
    println!("  pds:       {}", config.pds);
    println!("  seed:      {}", config.seed);
    println!("  data_dir:  {data_dir}");
    println!("  out:       {}", out_dir.display());
    let run_uuid = uuid::Uuid::new_v4().to_string();
    println!("  run_uuid:  {run_uuid}");
    println!();

    let inputs = TableStore::open(data_dir).read_inputs()?;
    let engine = ScenarioEngine::new(config)?;
    let output = engine.run(inputs)?;
    let out_store = TableStore::open(&out_dir);
    output.write(&out_store)?;
    let manifest = RunManifest {
        run_id: &run_id,
        run_uuid: &run_uuid,
        inputs: InputsEcho { config_path, data_dir },
        tau_tax: output.tau_tax,
        policy_cost: output.policy.fiscal_cost,
        dropped_regions: output.run_log.dropped_regions(),
        summary: &output.summary,
    };
    out_store.write_text("manifest.json", &serde_json::to_string_pretty(&manifest)?)?;
    log::info!("outputs written to {}", out_store.dir().display());

    print_summary(&output);
    Ok(())
}

/// Identity and headline numbers of one run, written next to the tables.
#[derive(Serialize)]
struct RunManifest<'a> {
    run_id: &'a str,
    run_uuid: &'a str,
    inputs: InputsEcho<'a>,
    tau_tax: f64,
    policy_cost: f64,
    dropped_regions: Vec<String>,
    summary: &'a NationalSummary,
}

#[derive(Serialize)]
struct InputsEcho<'a> {
    config_path: &'a str,
    data_dir: &'a str,
}

fn print_summary(output: &ScenarioOutput) {
    println!("=== RUN SUMMARY ===");
    println!("  events:          {}", output.table.event_count());
    println!("  household rows:  {}", output.table.households.len());
    println!("  tau_tax:         {:.4}", output.tau_tax);
    println!("  policy cost:     {:.2}", output.policy.fiscal_cost);
    let dropped = output.run_log.dropped_regions();
    if !dropped.is_empty() {
        println!("  dropped regions: {}", dropped.join(", "));
    }
    println!();
    println!("  {:<24} {:>10} {:>10}", "region", "R_asset %", "R_welf %");
    for r in &output.summary.regions {
        println!("  {:<24} {:>10.4} {:>10.4}", r.region, r.r_asset, r.r_welf);
    }
    println!("  {:<24} {:>10.4} {:>10.4}", "NATIONAL", output.summary.r_asset, output.summary.r_welf);
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
