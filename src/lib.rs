//! Device-under-test monitor: one polling worker per device, CLI or SNMP,
//! with end-of-run log analytics.

pub mod analytics;
pub mod cli;
pub mod config;
pub mod devlog;
pub mod orchestrator;
pub mod preflight;
pub mod secret;
pub mod snmp;
pub mod version;
pub mod worker;
