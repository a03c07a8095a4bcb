//! The event-indexed tables every stage reads and extends.
//!
//! Both tables are flat (one CSV row per struct) and aligned on
//! `EventKey`. Household rows additionally carry `hhid` plus the
//! affected/helped tags of their partition.

use crate::{
    partition::{AffectedStatus, HelpedStatus},
    types::{EventKey, HazardId, HouseholdId, RegionId, ReturnPeriod, Weights},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Macro aggregates broadcast onto one event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MacroEventRow {
    pub region: RegionId,
    pub hazard: HazardId,
    pub rp: ReturnPeriod,
    pub pop: f64,
    pub gdp_pc_prov: f64,
    pub gdp_pc_nat: f64,
    pub avg_prod_k: f64,
    #[serde(rename = "T_rebuild_K")]
    pub t_rebuild_k: f64,
    pub rho: f64,
    pub income_elast: f64,
    pub tau_tax: f64,
    pub protection: f64,
    pub pi: f64,
    pub shareable: f64,
    pub dy_over_dk: f64,
    pub macro_multiplier: f64,
    /// Population share of the event that is affected.
    pub fa: f64,
    pub dk_event: f64,
    pub dk_public_event: f64,
    pub max_aid: f64,
    /// Per-capita support the scheme needs in this event.
    pub need: f64,
}

impl MacroEventRow {
    pub fn key(&self) -> EventKey {
        EventKey::new(self.region.clone(), self.hazard.clone(), self.rp)
    }
}

/// One partition of one household in one event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HouseholdEventRow {
    pub region: RegionId,
    pub hazard: HazardId,
    pub rp: ReturnPeriod,
    pub hhid: HouseholdId,
    pub affected: Option<AffectedStatus>,
    pub helped: Option<HelpedStatus>,
    pub quintile: u8,
    pub ispoor: bool,
    pub hhwgt: f64,
    pub pcwgt: f64,
    pub pcwgt_ae: f64,
    pub hhsize: f64,
    pub hhsize_ae: f64,
    pub k: f64,
    pub c: f64,
    pub c_5: f64,
    pub pcinc_ae: f64,
    pub social: f64,
    pub gamma_sp: f64,
    pub pov_line: f64,
    pub fa: f64,
    pub v: f64,
    pub v_shew: f64,
    pub hh_share: f64,
    pub shew: f64,
    pub public_loss_v: f64,
    pub dy_over_dk: f64,
    pub spp_core: bool,
    pub spp_add: bool,
    pub sp_sps: bool,
    pub sp_cpp: bool,
    pub sp_pbs: bool,
    pub n_olds: f64,
    pub dk: f64,
    pub dk_public: f64,
    pub dc: f64,
    /// Consumption loss had public assets not been pooled.
    pub dc_0: f64,
    pub dc_npv_pre: f64,
    pub help_received: f64,
    pub help_fee: f64,
    pub dc_post_pds: f64,
    pub dc_npv_post: f64,
    pub dw: f64,
}

impl HouseholdEventRow {
    pub fn key(&self) -> EventKey {
        EventKey::new(self.region.clone(), self.hazard.clone(), self.rp)
    }

    pub fn weights(&self) -> Weights {
        Weights { hhwgt: self.hhwgt, pcwgt: self.pcwgt, pcwgt_ae: self.pcwgt_ae }
    }

    pub fn set_weights(&mut self, w: Weights) {
        self.hhwgt = w.hhwgt;
        self.pcwgt = w.pcwgt;
        self.pcwgt_ae = w.pcwgt_ae;
    }

    pub fn is_affected(&self) -> bool {
        self.affected == Some(AffectedStatus::Affected)
    }

    pub fn is_helped(&self) -> bool {
        self.helped == Some(HelpedStatus::Helped)
    }
}

/// Both event tables, kept aligned.
#[derive(Debug, Clone, Default)]
pub struct EventTable {
    pub macro_rows: Vec<MacroEventRow>,
    pub households: Vec<HouseholdEventRow>,
}

impl EventTable {
    /// Position of each event's macro row.
    pub fn macro_index(&self) -> BTreeMap<EventKey, usize> {
        self.macro_rows
            .iter()
            .enumerate()
            .map(|(i, m)| (m.key(), i))
            .collect()
    }

    /// Household row positions grouped by event, in event order.
    pub fn households_by_event(&self) -> BTreeMap<EventKey, Vec<usize>> {
        let mut out: BTreeMap<EventKey, Vec<usize>> = BTreeMap::new();
        for (i, row) in self.households.iter().enumerate() {
            out.entry(row.key()).or_default().push(i);
        }
        out
    }

    pub fn event_count(&self) -> usize {
        self.macro_rows.len()
    }
}
