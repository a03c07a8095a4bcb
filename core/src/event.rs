//! The run log: every diagnostic a stage must surface to the caller.
//!
//! RULE: stages never print. They push a `PipelineEvent` onto the
//! `RunLog` (and mirror it to the `log` facade). The runner persists
//! the log as JSON next to the output tables.

use crate::types::{HazardId, RegionId, ReturnPeriod};
use serde::{Deserialize, Serialize};

/// Every event a run can emit.
/// Variants are only ever appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    // ── Run lifecycle ──────────────────────────────
    RunStarted {
        country: String,
        policy: String,
        pds: String,
        seed: u64,
    },
    RunCompleted {
        events: usize,
        household_rows: usize,
    },

    // ── Input alignment ────────────────────────────
    RegionsDropped {
        table: String,
        regions: Vec<RegionId>,
    },
    ColumnsReplaced {
        columns: Vec<String>,
    },
    FaClamped {
        region: RegionId,
        hazard: HazardId,
        rows: usize,
    },
    OverlapCorrected {
        profile: String,
        rows: usize,
    },

    // ── Scenario ───────────────────────────────────
    PolicyApplied {
        policy: String,
        fiscal_cost: f64,
    },
    FiscalCalibrated {
        tau_tax: f64,
    },
    WelfareFormulaSelected {
        formula: String,
        baseline: String,
    },

    // ── Support ────────────────────────────────────
    AidCapped {
        region: RegionId,
        hazard: HazardId,
        rp: ReturnPeriod,
        need: f64,
        max_aid: f64,
    },
    BenchmarkMissing {
        hazard: HazardId,
        benchmark_rp: ReturnPeriod,
    },

    // ── Stage completion ───────────────────────────
    StageCompleted {
        stage: String,
        rows: usize,
    },
}

impl PipelineEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::RunCompleted { .. } => "run_completed",
            Self::RegionsDropped { .. } => "regions_dropped",
            Self::ColumnsReplaced { .. } => "columns_replaced",
            Self::FaClamped { .. } => "fa_clamped",
            Self::OverlapCorrected { .. } => "overlap_corrected",
            Self::PolicyApplied { .. } => "policy_applied",
            Self::FiscalCalibrated { .. } => "fiscal_calibrated",
            Self::WelfareFormulaSelected { .. } => "welfare_formula_selected",
            Self::AidCapped { .. } => "aid_capped",
            Self::BenchmarkMissing { .. } => "benchmark_missing",
            Self::StageCompleted { .. } => "stage_completed",
        }
    }
}

/// Ordered log of everything a run emitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunLog {
    pub events: Vec<PipelineEvent>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: PipelineEvent) {
        log::debug!("event: {}", event.type_name());
        self.events.push(event);
    }

    pub fn count(&self, type_name: &str) -> usize {
        self.events.iter().filter(|e| e.type_name() == type_name).count()
    }

    /// Every region dropped by the inner join, across all tables.
    pub fn dropped_regions(&self) -> Vec<RegionId> {
        let mut out: Vec<RegionId> = self
            .events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::RegionsDropped { regions, .. } => Some(regions.clone()),
                _ => None,
            })
            .flatten()
            .collect();
        out.sort();
        out.dedup();
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
