//! clustermon-core: cluster behavior monitor for orchestration test runs
//!
//! The monitor watches a cluster while a test suite runs, records what
//! happened as a timeline of intervals and judges that timeline with a set
//! of named checks.
//!
//! # Architecture
//!
//! ```text
//! Watchers → Watch Runtime → Condition Generators → Recorder
//!                 ↓                                     ↓
//!        Online Classifier                  Session finalization
//!                                                       ↓
//!                                        Offline checks → Verdicts
//! ```
//!
//! # Modules
//!
//! - `interval`: conditions, intervals and timeline operations
//! - `locator`: structured resource keys
//! - `resources`: snapshots of the watched API objects
//! - `recorder`: thread-safe timeline and resource store
//! - `conditions`: pod and event detectors
//! - `cluster`: cluster metadata client and snapshot
//! - `pathological`: repeated event classification, backfill and thresholds
//! - `verdict`: named check results
//! - `serialization`: interval files
//! - `watch`: tokio ingestion tasks
//! - `session`: run lifecycle
//! - `config`: Configuration management
//! - `logging`: tracing setup
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod cluster;
pub mod conditions;
pub mod config;
pub mod error;
pub mod interval;
pub mod locator;
pub mod logging;
pub mod pathological;
pub mod recorder;
pub mod resources;
pub mod serialization;
pub mod session;
pub mod verdict;
pub mod watch;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
