//! Household-level disaster resilience model.
//!
//! A run turns three input tables (regional macro aggregates, surveyed
//! households, hazard ratios) into expected asset and welfare losses,
//! socio-economic resilience, and the cost of post-disaster support.

pub mod capital_loss;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod expansion;
pub mod partition;
pub mod policy;
pub mod poverty;
pub mod return_period;
pub mod risk;
pub mod rng;
pub mod store;
pub mod summary;
pub mod support;
pub mod table;
pub mod types;
pub mod welfare;
