//! Capability extractors: typed facts pulled from a daemon configuration.
//!
//! Extractors are pure. They never fail; configuration fragments they cannot
//! read are skipped and yield an empty or partial fact.

mod ha;
mod loggers;

pub use ha::{extract_ha_peer_fact, ha_peer_fact_from_config, HaPeer, HaPeerFact};
pub use loggers::{extract_log_targets, log_targets_from_config};
