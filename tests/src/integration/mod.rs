//! Cross-subsystem flows.

mod ingestion_flows;
mod runtime_flows;
mod upkeep_flows;
