//! Post-disaster support: targeting, benefit design and financing.
//!
//! EXECUTION ORDER:
//!   1. Event-level affected share `fa`
//!   2. Targeting errors, then the helped / not-helped split
//!   3. `max_aid` (national cap on per-capita spending)
//!   4. Scheme allocates `help_received`
//!   5. Standard schemes: scale help down to `max_aid` where needed
//!   6. Financing: `help_fee`
//!
//! RULE: each benefit design is one `SupportScheme` implementation.
//! Country schemes are ordinary variants; nothing outside this module
//! branches on which scheme is active.

use crate::{
    config::{
        tier_value, BenchmarkSchemeConfig, FeeOption, LossMeasure, LotterySchemeConfig,
        ScenarioConfig, SchemeKind, Targeting,
    },
    error::ModelResult,
    event::{PipelineEvent, RunLog},
    partition::{split_helped, AffectedStatus, HelpedStatus},
    return_period::expected_value,
    rng::{RngBank, StageRng, StageSlot},
    table::{EventTable, HouseholdEventRow},
    types::{weighted_mean, EventKey, HazardId, HouseholdId, RegionId, ReturnPeriod, WEIGHT_EPSILON},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Affected share used when an event has no population at all.
const EMPTY_EVENT_FA: f64 = 1.0e-8;

// ── Side tables ────────────────────────────────────────────────────

/// Payout schedule of a country scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemeDetailRow {
    pub hazard: HazardId,
    pub rp: ReturnPeriod,
    pub payout: f64,
    pub frac_core: f64,
    pub frac_add: f64,
    pub f_benchmark: f64,
}

/// National spending of a country scheme. `rp` empty: annual expectation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenditureRow {
    pub hazard: HazardId,
    pub rp: Option<ReturnPeriod>,
    pub expenditure: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SupportOutput {
    pub details: Vec<SchemeDetailRow>,
    pub expenditure: Vec<ExpenditureRow>,
}

// ── Schemes ────────────────────────────────────────────────────────

/// A benefit design.
pub trait SupportScheme {
    fn name(&self) -> &'static str;

    /// Fixed (incl, excl) targeting errors, overriding the configured model.
    fn forced_targeting(&self) -> Option<(f64, f64)> {
        None
    }

    /// Whether the scheme is capped at `max_aid` and financed per event.
    /// Country schemes are uncapped and financed per (hazard, rp) nationally.
    fn is_standard(&self) -> bool {
        true
    }

    /// Fill `help_received` on every row. Rows arrive with help zeroed.
    fn allocate(&mut self, table: &mut EventTable, run_log: &mut RunLog) -> ModelResult<()>;

    fn details(&self) -> Vec<SchemeDetailRow> {
        Vec::new()
    }
}

pub struct NoSupport;

impl SupportScheme for NoSupport {
    fn name(&self) -> &'static str {
        "no"
    }

    fn allocate(&mut self, _table: &mut EventTable, _run_log: &mut RunLog) -> ModelResult<()> {
        Ok(())
    }
}

fn loss_of(row: &HouseholdEventRow, measure: LossMeasure) -> f64 {
    match measure {
        LossMeasure::Dk => row.dk,
        LossMeasure::Dc => row.dc,
        LossMeasure::DcNpvPre => row.dc_npv_pre,
    }
}

/// Everyone helped and affected gets the same transfer: a share of the
/// mean loss of affected households in the poorest quintile.
pub struct UniformPoor {
    pub loss_measure: LossMeasure,
    /// Restrict the transfer to the poorest quintile.
    pub poorest_only: bool,
}

impl SupportScheme for UniformPoor {
    fn name(&self) -> &'static str {
        if self.poorest_only { "unif_poor_only" } else { "unif_poor" }
    }

    fn allocate(&mut self, table: &mut EventTable, _run_log: &mut RunLog) -> ModelResult<()> {
        let macro_index = table.macro_index();
        for (key, rows) in table.households_by_event() {
            let shareable = macro_index.get(&key).map(|&i| table.macro_rows[i].shareable).unwrap_or(0.0);
            let mean_loss = weighted_mean(
                rows.iter()
                    .map(|&i| &table.households[i])
                    .filter(|r| r.is_affected() && r.quintile == 1)
                    .map(|r| (loss_of(r, self.loss_measure), r.pcwgt)),
            );
            for &i in &rows {
                let row = &mut table.households[i];
                let eligible = row.is_helped() && row.is_affected() && (!self.poorest_only || row.quintile == 1);
                if eligible {
                    row.help_received = shareable * mean_loss;
                }
            }
        }
        Ok(())
    }
}

/// Helped households get a share of their own loss.
pub struct Proportional {
    pub loss_measure: LossMeasure,
}

impl SupportScheme for Proportional {
    fn name(&self) -> &'static str {
        "prop"
    }

    fn allocate(&mut self, table: &mut EventTable, _run_log: &mut RunLog) -> ModelResult<()> {
        let macro_index = table.macro_index();
        for (key, rows) in table.households_by_event() {
            let shareable = macro_index.get(&key).map(|&i| table.macro_rows[i].shareable).unwrap_or(0.0);
            // Wrongly included households are paid what they would have lost.
            let affected_loss: BTreeMap<HouseholdId, f64> = rows
                .iter()
                .map(|&i| &table.households[i])
                .filter(|r| r.is_affected())
                .map(|r| (r.hhid.clone(), loss_of(r, self.loss_measure)))
                .collect();
            for &i in &rows {
                let row = &mut table.households[i];
                if row.is_helped() {
                    let loss = affected_loss.get(&row.hhid).copied().unwrap_or(0.0);
                    row.help_received = shareable * loss;
                }
            }
        }
        Ok(())
    }
}

/// Social-pension enrollees are paid a multiple of their monthly allowance.
/// Core-tier enrollees are paid from `rp >= 10`; additional-tier enrollees
/// win a lottery whose odds grow with the return period.
pub struct LotteryPayout {
    pub config: LotterySchemeConfig,
    pub rng: StageRng,
    rps: Vec<(HazardId, ReturnPeriod)>,
}

impl LotteryPayout {
    pub fn new(config: LotterySchemeConfig, rng: StageRng) -> Self {
        log::debug!("lottery payout draws from stream {}", rng.name);
        Self { config, rng, rps: Vec::new() }
    }

    fn schedule(&self, rp: ReturnPeriod) -> (f64, f64, f64) {
        let payout = self.config.monthly_allowance * tier_value(&self.config.multiplier, rp, 1.0);
        let frac_core = tier_value(&self.config.core_fraction, rp, 0.0);
        let frac_add = tier_value(&self.config.additional_fraction, rp, 0.0);
        (payout, frac_core, frac_add)
    }
}

impl SupportScheme for LotteryPayout {
    fn name(&self) -> &'static str {
        "lottery_payout"
    }

    fn forced_targeting(&self) -> Option<(f64, f64)> {
        Some((1.0, 0.0))
    }

    fn is_standard(&self) -> bool {
        false
    }

    fn allocate(&mut self, table: &mut EventTable, _run_log: &mut RunLog) -> ModelResult<()> {
        let mut seen = BTreeSet::new();
        for (key, rows) in table.households_by_event() {
            seen.insert((key.hazard.clone(), key.rp));
            let (payout, frac_core, frac_add) = self.schedule(key.rp);

            // One draw per household, in hhid order.
            let mut by_hh: BTreeMap<HouseholdId, Vec<usize>> = BTreeMap::new();
            for &i in &rows {
                by_hh.entry(table.households[i].hhid.clone()).or_default().push(i);
            }
            for (_, parts) in by_hh {
                let draw = self.rng.next_f64();
                for i in parts {
                    let row = &mut table.households[i];
                    let wins = (row.spp_core && draw < frac_core) || (row.spp_add && draw < frac_add);
                    if wins && row.is_helped() && row.hhsize > 0.0 {
                        row.help_received = payout / row.hhsize;
                    }
                }
            }
        }
        self.rps = seen.into_iter().collect();
        Ok(())
    }

    fn details(&self) -> Vec<SchemeDetailRow> {
        self.rps
            .iter()
            .map(|(hazard, rp)| {
                let (payout, frac_core, frac_add) = self.schedule(*rp);
                SchemeDetailRow { hazard: hazard.clone(), rp: *rp, payout, frac_core, frac_add, f_benchmark: 0.0 }
            })
            .collect()
    }
}

/// Cash benefits scaled by how an event's national losses compare with
/// a benchmark event of the same hazard.
pub struct BenchmarkPayout {
    pub config: BenchmarkSchemeConfig,
    fractions: BTreeMap<(HazardId, ReturnPeriod), f64>,
}

impl BenchmarkPayout {
    pub fn new(config: BenchmarkSchemeConfig) -> Self {
        Self { config, fractions: BTreeMap::new() }
    }

    fn benchmark_fractions(&self, table: &EventTable, run_log: &mut RunLog) -> BTreeMap<(HazardId, ReturnPeriod), f64> {
        let mut national: BTreeMap<(HazardId, ReturnPeriod), f64> = BTreeMap::new();
        for m in &table.macro_rows {
            *national.entry((m.hazard.clone(), m.rp)).or_default() += m.dk_event;
        }
        let mut out = BTreeMap::new();
        let mut missing = BTreeSet::new();
        for ((hazard, rp), dk) in &national {
            let reference = national.get(&(hazard.clone(), self.config.benchmark_rp)).copied();
            let f = match reference {
                None => {
                    missing.insert(hazard.clone());
                    0.0
                }
                Some(_) if *rp < self.config.min_rp => 0.0,
                Some(bench) if bench > 0.0 => (dk / bench).clamp(0.0, 1.0),
                Some(_) => 0.0,
            };
            out.insert((hazard.clone(), *rp), f);
        }
        for hazard in missing {
            log::warn!(
                "no rp={} event for {hazard}; benchmark payouts are zero",
                self.config.benchmark_rp
            );
            run_log.push(PipelineEvent::BenchmarkMissing {
                hazard,
                benchmark_rp: self.config.benchmark_rp,
            });
        }
        out
    }
}

impl SupportScheme for BenchmarkPayout {
    fn name(&self) -> &'static str {
        "benchmark_payout"
    }

    fn forced_targeting(&self) -> Option<(f64, f64)> {
        Some((1.0, 0.0))
    }

    fn is_standard(&self) -> bool {
        false
    }

    fn allocate(&mut self, table: &mut EventTable, run_log: &mut RunLog) -> ModelResult<()> {
        self.fractions = self.benchmark_fractions(table, run_log);
        let c = &self.config;
        for row in table.households.iter_mut() {
            let f = self.fractions.get(&(row.hazard.clone(), row.rp)).copied().unwrap_or(0.0);
            if !row.is_helped() || f == 0.0 || row.pcwgt <= WEIGHT_EPSILON {
                continue;
            }
            let mut per_household = 0.0;
            if row.sp_sps {
                per_household += c.old_age_payment * row.n_olds;
            }
            if row.sp_cpp {
                per_household += c.care_payment;
            }
            if row.sp_pbs {
                per_household += c.poverty_benefit;
            }
            row.help_received = per_household * row.hhwgt * f / row.pcwgt;
        }
        Ok(())
    }

    fn details(&self) -> Vec<SchemeDetailRow> {
        self.fractions
            .iter()
            .map(|((hazard, rp), f)| SchemeDetailRow {
                hazard: hazard.clone(),
                rp: *rp,
                payout: 0.0,
                frac_core: 0.0,
                frac_add: 0.0,
                f_benchmark: *f,
            })
            .collect()
    }
}

/// Build the configured benefit design.
pub fn build_scheme(
    kind: SchemeKind,
    loss_measure: LossMeasure,
    config: &ScenarioConfig,
    rng_bank: &RngBank,
) -> Box<dyn SupportScheme> {
    match kind {
        SchemeKind::No => Box::new(NoSupport),
        SchemeKind::UnifPoor => Box::new(UniformPoor { loss_measure, poorest_only: false }),
        SchemeKind::UnifPoorOnly => Box::new(UniformPoor { loss_measure, poorest_only: true }),
        SchemeKind::Prop => Box::new(Proportional { loss_measure }),
        SchemeKind::LotteryPayout => Box::new(LotteryPayout::new(
            config.lottery.clone(),
            rng_bank.for_stage(StageSlot::SupportLottery),
        )),
        SchemeKind::BenchmarkPayout => Box::new(BenchmarkPayout::new(config.benchmark.clone())),
    }
}

// ── Targeting ──────────────────────────────────────────────────────

/// (inclusion, exclusion) error for an event with affected share `fa`,
/// both clamped into [0, 1].
pub fn targeting_errors(targeting: Targeting, fa: f64) -> (f64, f64) {
    let odds = fa / (1.0 - fa).max(WEIGHT_EPSILON);
    let (incl, excl): (f64, f64) = match targeting {
        Targeting::Perfect => (0.0, 0.0),
        Targeting::PropNonpoorLms => (0.0, 1.0 - 25.0 / 80.0),
        Targeting::Data => (0.5 * odds, 0.5),
        Targeting::X33 => (0.33 * odds, 0.33),
        Targeting::Incl => (0.33 * odds, 0.0),
        Targeting::Excl => (0.0, 0.33),
    };
    (incl.clamp(0.0, 1.0), excl.clamp(0.0, 1.0))
}

fn split_by_targeting(
    table: &mut EventTable,
    scheme: &dyn SupportScheme,
    targeting: Targeting,
) -> ModelResult<()> {
    let macro_index = table.macro_index();
    let mut out = Vec::with_capacity(table.households.len() * 2);
    for row in table.households.drain(..) {
        let fa = macro_index.get(&row.key()).map(|&i| table.macro_rows[i].fa).unwrap_or(0.0);
        let (incl, excl) = scheme
            .forced_targeting()
            .unwrap_or_else(|| targeting_errors(targeting, fa));
        let affected = row.affected.unwrap_or(AffectedStatus::NotAffected);
        let split = split_helped(row.weights(), affected, incl, excl)?;
        for (status, weights) in split.parts() {
            let mut part = row.clone();
            part.set_weights(weights);
            part.helped = Some(status);
            part.help_received = 0.0;
            part.help_fee = 0.0;
            out.push(part);
        }
    }
    table.households = out;
    Ok(())
}

// ── Stage ──────────────────────────────────────────────────────────

/// Run targeting, allocation and financing over the event table.
pub fn allocate_support(
    table: &mut EventTable,
    scheme: &mut dyn SupportScheme,
    targeting: Targeting,
    fee: FeeOption,
    max_increased_spending: f64,
    has_rp_dimension: bool,
    run_log: &mut RunLog,
) -> ModelResult<SupportOutput> {
    set_event_fa(table);
    split_by_targeting(table, scheme, targeting)?;
    set_max_aid(table, max_increased_spending);

    scheme.allocate(table, run_log)?;
    set_need(table);
    if scheme.is_standard() {
        cap_aid(table, run_log);
    }

    match fee {
        FeeOption::Tax if scheme.is_standard() => tax_fee_per_event(table),
        FeeOption::Tax => tax_fee_national(table),
        FeeOption::InsurancePremium => insurance_premium(table, has_rp_dimension),
    }
    for row in table.households.iter_mut().filter(|r| r.helped == Some(HelpedStatus::NotHelped)) {
        row.help_received = 0.0;
    }

    let output = if scheme.is_standard() {
        SupportOutput::default()
    } else {
        SupportOutput {
            details: scheme.details(),
            expenditure: expenditure(table, has_rp_dimension),
        }
    };
    log::info!("support scheme {} allocated over {} events", scheme.name(), table.event_count());
    Ok(output)
}

fn set_event_fa(table: &mut EventTable) {
    let mut sums: BTreeMap<EventKey, (f64, f64)> = BTreeMap::new();
    for row in &table.households {
        let s = sums.entry(row.key()).or_default();
        if row.is_affected() {
            s.0 += row.pcwgt;
        }
        s.1 += row.pcwgt;
    }
    for m in table.macro_rows.iter_mut() {
        let (affected, total) = sums.get(&m.key()).copied().unwrap_or_default();
        m.fa = if total > 0.0 { affected / total } else { EMPTY_EVENT_FA };
    }
}

fn set_max_aid(table: &mut EventTable, max_increased_spending: f64) {
    let mut regions: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for m in &table.macro_rows {
        regions.insert(m.region.as_str(), (m.gdp_pc_prov, m.pop));
    }
    let gdp: f64 = regions.values().map(|(g, p)| g * p).sum();
    let pop: f64 = regions.values().map(|(_, p)| p).sum();
    let max_aid = if pop > 0.0 { max_increased_spending * gdp / pop } else { 0.0 };
    for m in table.macro_rows.iter_mut() {
        m.max_aid = max_aid;
    }
}

fn set_need(table: &mut EventTable) {
    let mut sums: BTreeMap<EventKey, (f64, f64)> = BTreeMap::new();
    for row in &table.households {
        let s = sums.entry(row.key()).or_default();
        if row.is_helped() {
            s.0 += row.help_received * row.pcwgt;
        }
        s.1 += row.pcwgt;
    }
    for m in table.macro_rows.iter_mut() {
        let (spent, pop) = sums.get(&m.key()).copied().unwrap_or_default();
        m.need = if pop > 0.0 { spent / pop } else { 0.0 };
    }
}

fn cap_aid(table: &mut EventTable, run_log: &mut RunLog) {
    let mut scale: BTreeMap<EventKey, f64> = BTreeMap::new();
    for m in table.macro_rows.iter_mut() {
        if m.need > m.max_aid && m.need > 0.0 {
            log::warn!(
                "support need {:.2} exceeds max_aid {:.2} in {}; scaling down",
                m.need, m.max_aid, m.key()
            );
            run_log.push(PipelineEvent::AidCapped {
                region: m.region.clone(),
                hazard: m.hazard.clone(),
                rp: m.rp,
                need: m.need,
                max_aid: m.max_aid,
            });
            scale.insert(m.key(), m.max_aid / m.need);
            m.need = m.max_aid;
        }
    }
    if scale.is_empty() {
        return;
    }
    for row in table.households.iter_mut() {
        if let Some(f) = scale.get(&row.key()) {
            row.help_received *= f;
        }
    }
}

// ── Financing ──────────────────────────────────────────────────────

/// Each event's spending is raised from that event's households in
/// proportion to their capital.
fn tax_fee_per_event(table: &mut EventTable) {
    let mut sums: BTreeMap<EventKey, (f64, f64)> = BTreeMap::new();
    for row in &table.households {
        let s = sums.entry(row.key()).or_default();
        if row.is_helped() {
            s.0 += row.help_received * row.pcwgt;
        }
        s.1 += row.k * row.pcwgt;
    }
    for row in table.households.iter_mut() {
        let (spent, capital) = sums.get(&row.key()).copied().unwrap_or_default();
        row.help_fee = if capital > 0.0 { spent * row.k / capital } else { 0.0 };
    }
}

/// Each (hazard, rp)'s national spending is raised from the households
/// of the events in that slice in proportion to their capital.
fn tax_fee_national(table: &mut EventTable) {
    let mut sums: BTreeMap<(HazardId, ReturnPeriod), (f64, f64)> = BTreeMap::new();
    for row in &table.households {
        let s = sums.entry(row.key().hazard_rp()).or_default();
        if row.is_helped() {
            s.0 += row.help_received * row.pcwgt;
        }
        s.1 += row.k * row.pcwgt;
    }
    for row in table.households.iter_mut() {
        let (spent, capital) = sums.get(&row.key().hazard_rp()).copied().unwrap_or_default();
        row.help_fee = if capital > 0.0 { spent * row.k / capital } else { 0.0 };
    }
}

/// Every household pays, at every event, the expected support it
/// receives across return periods (an actuarially fair premium).
fn insurance_premium(table: &mut EventTable, has_rp_dimension: bool) {
    let protection: BTreeMap<&str, f64> =
        table.macro_rows.iter().map(|m| (m.region.as_str(), m.protection)).collect();

    type Policyholder = (RegionId, HazardId, HouseholdId);
    let mut help: BTreeMap<Policyholder, BTreeMap<ReturnPeriod, (f64, f64)>> = BTreeMap::new();
    for row in &table.households {
        let s = help
            .entry((row.region.clone(), row.hazard.clone(), row.hhid.clone()))
            .or_default()
            .entry(row.rp)
            .or_default();
        if row.is_helped() {
            s.0 += row.help_received * row.pcwgt;
        }
        s.1 += row.pcwgt;
    }
    let premiums: BTreeMap<Policyholder, f64> = help
        .into_iter()
        .map(|(holder, by_rp)| {
            let points: Vec<(ReturnPeriod, f64)> = by_rp
                .into_iter()
                .map(|(rp, (paid, pop))| (rp, if pop > 0.0 { paid / pop } else { 0.0 }))
                .collect();
            let floor = protection.get(holder.0.as_str()).copied().unwrap_or(0.0);
            let premium = expected_value(&points, floor, has_rp_dimension);
            (holder, premium)
        })
        .collect();
    for row in table.households.iter_mut() {
        let holder = (row.region.clone(), row.hazard.clone(), row.hhid.clone());
        row.help_fee = premiums.get(&holder).copied().unwrap_or(0.0);
    }
}

fn expenditure(table: &EventTable, has_rp_dimension: bool) -> Vec<ExpenditureRow> {
    let mut by_slice: BTreeMap<HazardId, BTreeMap<ReturnPeriod, f64>> = BTreeMap::new();
    for row in table.households.iter().filter(|r| r.is_helped()) {
        *by_slice.entry(row.hazard.clone()).or_default().entry(row.rp).or_default() +=
            row.help_received * row.pcwgt;
    }
    let mut out = Vec::new();
    for (hazard, by_rp) in by_slice {
        let points: Vec<(ReturnPeriod, f64)> = by_rp.into_iter().collect();
        for &(rp, spent) in &points {
            out.push(ExpenditureRow { hazard: hazard.clone(), rp: Some(rp), expenditure: spent });
        }
        out.push(ExpenditureRow {
            hazard,
            rp: None,
            expenditure: expected_value(&points, 0.0, has_rp_dimension),
        });
    }
    out
}
