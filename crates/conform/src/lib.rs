//! Alpaca Protocol Conformance Engine
//!
//! This crate checks that a device's Alpaca HTTP API follows the wire
//! protocol:
//! - Synthesises good and deliberately malformed request variants per member
//! - Sends them under run-level cancellation and per-request timeouts
//! - Decodes JSON and ImageBytes response envelopes
//! - Classifies every assertion as OK, INFO, ISSUE or ERROR
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Protocol Runner (ProtocolRunner)            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  run()                                                      │
//! │    ├── PUT Connected=True                                   │
//! │    ├── common plan        (URL structure, interface)        │
//! │    ├── device plan        (plans/<device>.yaml)             │
//! │    ├── cleanup steps      (always)                          │
//! │    └── PUT Connected=False (ignores cancellation)           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  DevicePlan (YAML)                                          │
//! │    ├── get / put          -> variants::family()             │
//! │    ├── call / raw         -> single transaction             │
//! │    ├── wait_while         -> wait::wait_while()             │
//! │    ├── wait_for           -> wait::wait_for()               │
//! │    └── gated { gate }     -> ConformConfig::gate_enabled()  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TransactionExecutor::execute()                             │
//! │    ├── CallContext        (cancel token + timeout)          │
//! │    ├── JSON / ImageBytes envelope decoding                  │
//! │    └── verdict::assess()  -> Ledger -> RunReport            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod plan;
pub mod property;
pub mod report;
pub mod runner;
pub mod variants;
pub mod verdict;
pub mod wait;

pub use config::ConformConfig;
pub use error::{ConformError, ConformResult};
pub use executor::{CallContext, CallOptions, CallReport, Transaction, TransactionExecutor};
pub use ledger::{Ledger, LedgerEntry, StatusSink};
pub use plan::{DevicePlan, PlanSet, PlanStep};
pub use property::{PropertySource, ValueSource};
pub use report::RunReport;
pub use runner::ProtocolRunner;
