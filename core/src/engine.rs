//! The scenario engine: one (country, policy, support option) run.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Region alignment          (inner join of the three inputs)
//!   2. Fiscal calibration        (tax rate, transfer shares, consumption)
//!   3. Policy                    (exactly one counterfactual)
//!   4. Fiscal refresh            (tax rate and shares after the policy)
//!   5. Return-period normalization
//!   6. Hazard-overlap correction (only with a named profile)
//!   7. Event expansion
//!   8. Capital loss              (affected split, dk, dc, transfer matrix)
//!   9. Support                   (helped split, help, fees)
//!  10. Welfare                   (dw per household partition)
//!  11. Event results and expected risk
//!  12. Poverty, quintile and national summaries
//!
//! RULES:
//!   - Every stage reads only what earlier stages produced.
//!   - All randomness flows through the RngBank.
//!   - Every diagnostic is recorded in the RunLog.

use crate::{
    capital_loss::{compute_capital_loss, PublicCostRow, TransferValuation},
    config::{ScenarioConfig, ScenarioOptions},
    error::ModelResult,
    event::{PipelineEvent, RunLog},
    expansion::{align_regions, calibrate_fiscal, expand, HazardOverlapCorrection},
    policy::{apply_policy, PolicyOutcome},
    poverty::{poverty_impact, PovertyRow},
    return_period::normalize,
    risk::{aggregate_risk, event_results, EventResultRow, RiskRow},
    rng::RngBank,
    store::{InputTables, TableStore},
    summary::{national_summary, quintile_summary, NationalSummary, QuintileRow},
    support::{allocate_support, build_scheme, SupportOutput},
    table::EventTable,
    welfare::{apply_welfare, reference_consumption, WelfareIntegrator},
};
use std::collections::BTreeMap;

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct ScenarioOutput {
    pub table: EventTable,
    pub results: Vec<EventResultRow>,
    pub risk: Vec<RiskRow>,
    pub public_costs: Vec<PublicCostRow>,
    pub support: SupportOutput,
    pub poverty: Vec<PovertyRow>,
    pub quintiles: Vec<QuintileRow>,
    pub summary: NationalSummary,
    pub policy: PolicyOutcome,
    pub tau_tax: f64,
    pub has_rp_dimension: bool,
    pub run_log: RunLog,
}

impl ScenarioOutput {
    /// Write every output table and the run log into `store`.
    pub fn write(&self, store: &TableStore) -> ModelResult<()> {
        store.write_table("macro_event.csv", &self.table.macro_rows)?;
        store.write_table("households_event.csv", &self.table.households)?;
        store.write_table("results.csv", &self.results)?;
        store.write_table("risk.csv", &self.risk)?;
        store.write_table("poverty.csv", &self.poverty)?;
        store.write_table("quintiles.csv", &self.quintiles)?;
        if !self.public_costs.is_empty() {
            store.write_table("public_costs.csv", &self.public_costs)?;
        }
        if !self.support.details.is_empty() {
            store.write_table("scheme_details.csv", &self.support.details)?;
            store.write_table("scheme_expenditure.csv", &self.support.expenditure)?;
        }
        store.write_text("run_log.json", &self.run_log.to_json()?)?;
        Ok(())
    }
}

pub struct ScenarioEngine {
    pub config: ScenarioConfig,
    pub options: ScenarioOptions,
    pub rng_bank: RngBank,
    run_log: RunLog,
}

impl ScenarioEngine {
    /// Validate every option string up front.
    pub fn new(config: ScenarioConfig) -> ModelResult<Self> {
        let options = config.options()?;
        let rng_bank = RngBank::new(config.seed);
        Ok(Self { config, options, rng_bank, run_log: RunLog::new() })
    }

    fn stage_done(&mut self, stage: &str, rows: usize) {
        log::debug!("stage {stage} done ({rows} rows)");
        self.run_log.push(PipelineEvent::StageCompleted { stage: stage.into(), rows });
    }

    /// Run the whole pipeline once.
    pub fn run(mut self, mut inputs: InputTables) -> ModelResult<ScenarioOutput> {
        let config = self.config.clone();
        let options = self.options.clone();
        self.run_log.push(PipelineEvent::RunStarted {
            country: config.country.clone(),
            policy: config.policy.clone(),
            pds: config.pds.clone(),
            seed: config.seed,
        });
        log::info!(
            "welfare formula {:?}, marginal utility baseline {:?}",
            options.welfare_formula,
            options.baseline
        );
        self.run_log.push(PipelineEvent::WelfareFormulaSelected {
            formula: config.welfare_formula.clone(),
            baseline: config.marginal_utility_baseline.clone(),
        });

        // 1-4. Inputs, calibration, policy.
        let regions = align_regions(&mut inputs, &mut self.run_log)?;
        self.stage_done("align_regions", regions.len());
        let InputTables { mut macro_rows, mut households, hazard_ratios } = inputs;
        calibrate_fiscal(&mut macro_rows, &mut households, config.recompute_consumption)?;
        let policy = apply_policy(options.policy, &mut macro_rows, &mut households);
        self.run_log.push(PipelineEvent::PolicyApplied {
            policy: config.policy.clone(),
            fiscal_cost: policy.fiscal_cost,
        });
        let tau_tax = calibrate_fiscal(&mut macro_rows, &mut households, false)?;
        self.run_log.push(PipelineEvent::FiscalCalibrated { tau_tax });

        // 5-7. Hazard curves onto events.
        let protection: BTreeMap<_, _> =
            macro_rows.iter().map(|m| (m.region.clone(), m.protection)).collect();
        let mut normalized = normalize(&hazard_ratios, &protection, config.default_rp)?;
        self.stage_done("normalize", normalized.rows.len());
        if let Some(profile) = &options.overlap {
            let rows = profile.apply(&mut normalized.rows);
            log::info!("overlap profile {} corrected {rows} rows", profile.name());
            self.run_log.push(PipelineEvent::OverlapCorrected { profile: profile.name().into(), rows });
        }
        let mut table = expand(&macro_rows, &households, &normalized.rows, &mut self.run_log)?;
        self.stage_done("expand", table.households.len());

        // 8. Capital loss.
        let references = reference_consumption(&macro_rows, &households);
        let valuation = TransferValuation {
            integrator: WelfareIntegrator::new(
                options.welfare_formula,
                config.transfer_integration_steps,
                config.integration_horizon,
            ),
            baseline: options.baseline,
            references: &references,
            households: &households,
        };
        let public_costs = compute_capital_loss(&mut table, options.cost_attribution, &valuation)?;
        self.stage_done("capital_loss", table.households.len());

        // 9. Support.
        if options.scheme.is_country_scheme() {
            log::info!("country scheme {}: targeting forced, financed nationally", config.pds);
        }
        let mut scheme = build_scheme(options.scheme, options.loss_measure, &config, &self.rng_bank);
        let support = allocate_support(
            &mut table,
            scheme.as_mut(),
            options.targeting,
            options.fee,
            config.max_increased_spending,
            normalized.has_rp_dimension,
            &mut self.run_log,
        )?;
        self.stage_done("support", table.households.len());

        // 10. Welfare.
        let integrator = WelfareIntegrator::new(
            options.welfare_formula,
            config.integration_steps,
            config.integration_horizon,
        );
        apply_welfare(&mut table, &integrator, config.fee_weight)?;
        self.stage_done("welfare", table.households.len());

        // 11-12. Aggregation.
        let results = event_results(&table);
        let risk = aggregate_risk(
            &table,
            &results,
            &references,
            options.welfare_formula,
            options.baseline,
            normalized.has_rp_dimension,
        )?;
        let subsistence = config.poverty.as_ref().and_then(|p| p.subsistence_line);
        let poverty = poverty_impact(&table, subsistence, normalized.has_rp_dimension);
        let quintiles = quintile_summary(&table);
        let summary = national_summary(&risk);

        self.run_log.push(PipelineEvent::RunCompleted {
            events: table.event_count(),
            household_rows: table.households.len(),
        });
        log::info!(
            "run complete: {} events, R_asset {:.3}%, R_welf {:.3}%",
            table.event_count(),
            summary.r_asset,
            summary.r_welf
        );

        Ok(ScenarioOutput {
            table,
            results,
            risk,
            public_costs,
            support,
            poverty,
            quintiles,
            summary,
            policy,
            tau_tax,
            has_rp_dimension: normalized.has_rp_dimension,
            run_log: self.run_log,
        })
    }
}
