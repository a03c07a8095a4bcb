//! Input records, one struct per CSV file.

use crate::types::{HouseholdId, RegionId, ReturnPeriod, Weights};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};

/// Survey flags arrive as 0/1 or true/false.
fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    let raw = String::deserialize(d)?;
    match raw.trim() {
        "1" | "1.0" | "true" | "True" | "TRUE" => Ok(true),
        "0" | "0.0" | "false" | "False" | "FALSE" | "" => Ok(false),
        other => Err(D::Error::custom(format!("not a flag: '{other}'"))),
    }
}

/// One region's pre-event aggregates (`macro.csv`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroRecord {
    pub region: RegionId,
    pub pop: f64,
    pub gdp_pc_prov: f64,
    pub gdp_pc_nat: f64,
    pub avg_prod_k: f64,
    #[serde(rename = "T_rebuild_K")]
    pub t_rebuild_k: f64,
    pub rho: f64,
    pub income_elast: f64,
    /// Overwritten by fiscal calibration.
    #[serde(default)]
    pub tau_tax: f64,
    /// Return period below which the region suffers no loss.
    #[serde(default)]
    pub protection: f64,
    /// Early-warning effectiveness.
    #[serde(default)]
    pub pi: f64,
    /// Share of the reference loss a uniform transfer replaces.
    #[serde(default)]
    pub shareable: f64,
}

/// One household or representative category (`households.csv`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseholdRecord {
    pub region: RegionId,
    pub hhid: HouseholdId,
    pub k: f64,
    pub c: f64,
    /// Consumption floor used by the legacy utility function.
    #[serde(default)]
    pub c_5: f64,
    pub pcinc: f64,
    pub pcinc_ae: f64,
    #[serde(default)]
    pub pcsoc: f64,
    #[serde(default)]
    pub social: f64,
    pub v: f64,
    #[serde(default)]
    pub shew: f64,
    #[serde(default, deserialize_with = "flag")]
    pub ispoor: bool,
    pub quintile: u8,
    pub hhwgt: f64,
    pub pcwgt: f64,
    pub pcwgt_ae: f64,
    pub hhsize: f64,
    pub hhsize_ae: f64,
    #[serde(default)]
    pub pov_line: f64,
    /// Share of the national social-transfer bill this household receives.
    #[serde(default)]
    pub gamma_sp: f64,

    // ── Country scheme enrollment ──────────────────
    #[serde(rename = "SPP_core", default, deserialize_with = "flag")]
    pub spp_core: bool,
    #[serde(rename = "SPP_add", default, deserialize_with = "flag")]
    pub spp_add: bool,
    #[serde(rename = "SP_SPS", default, deserialize_with = "flag")]
    pub sp_sps: bool,
    #[serde(rename = "SP_CPP", default, deserialize_with = "flag")]
    pub sp_cpp: bool,
    #[serde(rename = "SP_PBS", default, deserialize_with = "flag")]
    pub sp_pbs: bool,
    #[serde(rename = "nOlds", default)]
    pub n_olds: f64,
}

impl HouseholdRecord {
    pub fn weights(&self) -> Weights {
        Weights { hhwgt: self.hhwgt, pcwgt: self.pcwgt, pcwgt_ae: self.pcwgt_ae }
    }
}

/// Exposure of a household (or a whole region) to one hazard event
/// (`hazard_ratios.csv`).
///
/// `rp` absent: the table has no return-period dimension.
/// `hhid` absent: the curve applies to every household in the region.
/// `v`, `hh_share`, `shew` present: they replace the household's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardRatioRecord {
    pub region: RegionId,
    pub hazard: String,
    #[serde(default)]
    pub rp: Option<ReturnPeriod>,
    #[serde(default)]
    pub hhid: Option<HouseholdId>,
    pub fa: f64,
    #[serde(default)]
    pub public_loss_v: f64,
    #[serde(default)]
    pub v: Option<f64>,
    #[serde(default)]
    pub hh_share: Option<f64>,
    #[serde(default)]
    pub shew: Option<f64>,
    #[serde(default)]
    pub dy_over_dk: Option<f64>,
}
