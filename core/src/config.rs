//! Scenario configuration.
//!
//! RULE: every option string is parsed exactly once, in `options()`.
//! Nothing downstream compares raw option strings.

use crate::{
    error::{ModelError, ModelResult},
    types::ReturnPeriod,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ── Option enums ───────────────────────────────────────────────────

/// Counterfactual policy applied before the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Baseline,
    /// Poor households' vulnerability × 0.95.
    ReducePoorExposure,
    /// Non-poor households' vulnerability × 0.95.
    ReduceRichExposure,
    /// Poor households' income × 1.1.
    PoorIncomeTopUp,
    /// Poor households' social transfers × 1.333.
    SocialTransferIncrease,
    /// Reconstruction time × 2/3.
    FasterReconstruction,
    /// Universal early-warning access.
    UniversalEarlyWarning,
    /// Poor households' vulnerability × 0.7.
    ReducePoorVulnerability,
    /// Non-poor households' vulnerability × 0.7.
    ReduceRichVulnerability,
    /// Same as baseline; names the no-PDS reference run.
    NoSupport,
}

impl FromStr for Policy {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        Ok(match s {
            "" => Self::Baseline,
            "_exp095" => Self::ReducePoorExposure,
            "_exr095" => Self::ReduceRichExposure,
            "_pcinc_p_110" => Self::PoorIncomeTopUp,
            "_soc133" => Self::SocialTransferIncrease,
            "_rec067" => Self::FasterReconstruction,
            "_ew100" => Self::UniversalEarlyWarning,
            "_vul070" => Self::ReducePoorVulnerability,
            "_vul070r" => Self::ReduceRichVulnerability,
            "_noPT" => Self::NoSupport,
            other => return Err(unknown("policy", other)),
        })
    }
}

/// Targeting-error model for post-disaster support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Targeting {
    Perfect,
    PropNonpoorLms,
    Data,
    X33,
    Incl,
    Excl,
}

impl FromStr for Targeting {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        Ok(match s {
            "perfect" => Self::Perfect,
            "prop_nonpoor_lms" => Self::PropNonpoorLms,
            "data" => Self::Data,
            "x33" => Self::X33,
            "incl" => Self::Incl,
            "excl" => Self::Excl,
            other => return Err(unknown("targeting", other)),
        })
    }
}

/// Benefit design of the support scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeKind {
    No,
    UnifPoor,
    UnifPoorOnly,
    Prop,
    LotteryPayout,
    BenchmarkPayout,
}

impl SchemeKind {
    /// Country schemes have their own eligibility rules and national financing.
    pub fn is_country_scheme(&self) -> bool {
        matches!(self, Self::LotteryPayout | Self::BenchmarkPayout)
    }
}

impl FromStr for SchemeKind {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        Ok(match s {
            "no" => Self::No,
            "unif_poor" => Self::UnifPoor,
            "unif_poor_only" => Self::UnifPoorOnly,
            "prop" => Self::Prop,
            "lottery_payout" | "fiji_SPP" => Self::LotteryPayout,
            "benchmark_payout" | "fiji_SPS" => Self::BenchmarkPayout,
            other => return Err(unknown("pds", other)),
        })
    }
}

/// How support is financed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeOption {
    Tax,
    InsurancePremium,
}

impl FromStr for FeeOption {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        Ok(match s {
            "tax" => Self::Tax,
            "insurance_premium" => Self::InsurancePremium,
            other => return Err(unknown("fee", other)),
        })
    }
}

/// Loss that proportional support compensates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossMeasure {
    Dk,
    Dc,
    DcNpvPre,
}

impl FromStr for LossMeasure {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        Ok(match s {
            "dk" => Self::Dk,
            "dc" => Self::Dc,
            "dc_npv_pre" => Self::DcNpvPre,
            other => return Err(unknown("loss_measure", other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WelfareFormula {
    Legacy,
    Revised,
}

impl FromStr for WelfareFormula {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        Ok(match s {
            "legacy" => Self::Legacy,
            "revised" => Self::Revised,
            other => return Err(unknown("welfare_formula", other)),
        })
    }
}

/// Consumption level at which marginal utility is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginalUtilityBaseline {
    Local,
    National,
}

impl FromStr for MarginalUtilityBaseline {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        Ok(match s {
            "local" => Self::Local,
            "national" => Self::National,
            other => return Err(unknown("marginal_utility_baseline", other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostAttribution {
    PerHousehold,
    SharedPublicAssets,
}

impl FromStr for CostAttribution {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        Ok(match s {
            "per_household" => Self::PerHousehold,
            "shared_public_assets" => Self::SharedPublicAssets,
            other => return Err(unknown("cost_attribution", other)),
        })
    }
}

fn unknown(kind: &'static str, value: &str) -> ModelError {
    ModelError::UnknownScenario { kind, value: value.to_string() }
}

// ── Hazard overlap profiles ────────────────────────────────────────

/// Two flood layers that double-count area already hit by a driver hazard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlapProfile {
    pub name: String,
    pub driver_hazard: String,
    pub first_hazard: String,
    pub second_hazard: String,
    /// Share of the driver's fa removed from the two layers combined.
    pub share: f64,
}

impl OverlapProfile {
    /// Look up a registered profile.
    pub fn named(name: &str) -> ModelResult<Self> {
        match name {
            "fiji_tc_flood" => Ok(Self {
                name: name.to_string(),
                driver_hazard: "TC".into(),
                first_hazard: "flood_fluv_undef".into(),
                second_hazard: "flood_pluv".into(),
                share: 0.4,
            }),
            other => Err(unknown("overlap_correction", other)),
        }
    }
}

// ── Country scheme tables ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpTier {
    pub min_rp: ReturnPeriod,
    pub value:  f64,
}

/// Look up the value of the highest tier whose `min_rp` is <= `rp`.
pub fn tier_value(tiers: &[RpTier], rp: ReturnPeriod, below_all: f64) -> f64 {
    tiers
        .iter()
        .filter(|t| t.min_rp <= rp)
        .max_by_key(|t| t.min_rp)
        .map(|t| t.value)
        .unwrap_or(below_all)
}

/// Lottery-based payout to social-pension enrollees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotterySchemeConfig {
    pub monthly_allowance: f64,
    /// Share of core-tier enrollees paid, by return period.
    pub core_fraction: Vec<RpTier>,
    /// Share of additional-tier enrollees paid, by return period.
    pub additional_fraction: Vec<RpTier>,
    /// Months of allowance paid, by return period.
    pub multiplier: Vec<RpTier>,
}

impl Default for LotterySchemeConfig {
    fn default() -> Self {
        let tier = |min_rp, value| RpTier { min_rp, value };
        Self {
            monthly_allowance: 177.0,
            core_fraction: vec![tier(10, 1.0)],
            additional_fraction: vec![tier(10, 0.5), tier(20, 0.75), tier(40, 1.0)],
            multiplier: vec![tier(1, 1.0), tier(40, 2.0), tier(50, 3.0), tier(100, 4.0)],
        }
    }
}

/// Payout scaled against a benchmark event's national losses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSchemeConfig {
    pub benchmark_rp: ReturnPeriod,
    pub min_rp: ReturnPeriod,
    pub old_age_payment: f64,
    pub care_payment: f64,
    pub poverty_benefit: f64,
}

impl Default for BenchmarkSchemeConfig {
    fn default() -> Self {
        Self {
            benchmark_rp: 200,
            min_rp: 10,
            old_age_payment: 300.0,
            care_payment: 300.0,
            poverty_benefit: 600.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PovertyConfig {
    /// Per-capita consumption below which a person cannot subsist.
    pub subsistence_line: Option<f64>,
}

// ── Scenario config ────────────────────────────────────────────────

fn default_loss_measure() -> String { "dk".into() }
fn default_cost_attribution() -> String { "per_household".into() }
fn default_rp() -> ReturnPeriod { 1 }
fn default_integration_steps() -> usize { 1000 }
fn default_transfer_steps() -> usize { 20 }
fn default_horizon() -> f64 { 10.0 }
fn default_max_spending() -> f64 { 0.05 }
fn default_fee_weight() -> f64 { 1.0 }
fn default_seed() -> u64 { 42 }
fn default_true() -> bool { true }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub country: String,
    #[serde(default)]
    pub policy: String,
    pub targeting: String,
    pub pds: String,
    pub fee: String,
    #[serde(default = "default_loss_measure")]
    pub loss_measure: String,
    pub welfare_formula: String,
    pub marginal_utility_baseline: String,
    #[serde(default = "default_cost_attribution")]
    pub cost_attribution: String,
    #[serde(default = "default_rp")]
    pub default_rp: ReturnPeriod,
    #[serde(default = "default_integration_steps")]
    pub integration_steps: usize,
    #[serde(default = "default_transfer_steps")]
    pub transfer_integration_steps: usize,
    #[serde(default = "default_horizon")]
    pub integration_horizon: f64,
    #[serde(default = "default_max_spending")]
    pub max_increased_spending: f64,
    /// Weight of the fee in post-support consumption loss.
    #[serde(default = "default_fee_weight")]
    pub fee_weight: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub overlap_correction: Option<String>,
    #[serde(default)]
    pub lottery: LotterySchemeConfig,
    #[serde(default)]
    pub benchmark: BenchmarkSchemeConfig,
    #[serde(default)]
    pub poverty: Option<PovertyConfig>,
    #[serde(default = "default_true")]
    pub recompute_consumption: bool,
}

/// The parsed, validated form of every option string in a `ScenarioConfig`.
#[derive(Debug, Clone)]
pub struct ScenarioOptions {
    pub policy: Policy,
    pub targeting: Targeting,
    pub scheme: SchemeKind,
    pub fee: FeeOption,
    pub loss_measure: LossMeasure,
    pub welfare_formula: WelfareFormula,
    pub baseline: MarginalUtilityBaseline,
    pub cost_attribution: CostAttribution,
    pub overlap: Option<OverlapProfile>,
}

impl ScenarioConfig {
    /// Load and validate a scenario file.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: Self = serde_json::from_str(&content)?;
        config.options()?;
        Ok(config)
    }

    pub fn options(&self) -> ModelResult<ScenarioOptions> {
        if self.integration_steps < 2 || self.transfer_integration_steps < 2 {
            return Err(ModelError::Numeric(format!(
                "integration needs at least 2 steps (got {} and {})",
                self.integration_steps, self.transfer_integration_steps
            )));
        }
        if self.default_rp == 0 {
            return Err(ModelError::Numeric("default_rp must be positive".into()));
        }
        Ok(ScenarioOptions {
            policy: self.policy.parse()?,
            targeting: self.targeting.parse()?,
            scheme: self.pds.parse()?,
            fee: self.fee.parse()?,
            loss_measure: self.loss_measure.parse()?,
            welfare_formula: self.welfare_formula.parse()?,
            baseline: self.marginal_utility_baseline.parse()?,
            cost_attribution: self.cost_attribution.parse()?,
            overlap: self
                .overlap_correction
                .as_deref()
                .map(OverlapProfile::named)
                .transpose()?,
        })
    }

    /// Minimal config for tests.
    pub fn default_test() -> Self {
        Self {
            country: "testland".into(),
            policy: String::new(),
            targeting: "perfect".into(),
            pds: "unif_poor".into(),
            fee: "tax".into(),
            loss_measure: default_loss_measure(),
            welfare_formula: "revised".into(),
            marginal_utility_baseline: "local".into(),
            cost_attribution: default_cost_attribution(),
            default_rp: default_rp(),
            integration_steps: default_integration_steps(),
            transfer_integration_steps: default_transfer_steps(),
            integration_horizon: default_horizon(),
            max_increased_spending: default_max_spending(),
            fee_weight: default_fee_weight(),
            seed: default_seed(),
            overlap_correction: None,
            lottery: LotterySchemeConfig::default(),
            benchmark: BenchmarkSchemeConfig::default(),
            poverty: None,
            recompute_consumption: false,
        }
    }
}
