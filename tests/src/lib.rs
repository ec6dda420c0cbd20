//! # Staking Oracle Test Suite
//!
//! Cross-subsystem flows run against in-process doubles (ledger, contract,
//! checkpoint). Per-crate unit tests live next to the code they test.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Event builders, ledger-backed upkeep contract
//! └── integration/
//!     ├── ingestion_flows.rs   # so-02: merge, restart, lagging crash, degradation
//!     ├── upkeep_flows.rs      # so-02 + so-03: fulfillment routing
//!     └── runtime_flows.rs     # oracle-runtime wiring and supervision
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p so-tests
//! cargo test -p so-tests integration::runtime_flows::
//! ```

#![allow(dead_code)]

pub mod fixtures;
pub mod integration;
