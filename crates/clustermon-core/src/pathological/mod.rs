//! Repeated event analysis
//!
//! An event reported many times in a short window usually means something
//! is looping. This module decides which repeats are expected:
//!
//! - [`patterns`]: static allow patterns, labels and count helpers
//! - [`known`]: repeats that are tracked bugs, reported as flakes
//! - [`predicates`]: allowances that depend on the count or on cluster state
//! - [`classifier`]: the per-run evaluator, used online and offline
//! - [`backfill`]: labels occurrences recorded before a repeat crossed the threshold
//! - [`threshold`]: per-pattern flake and fail thresholds

pub mod backfill;
pub mod classifier;
pub mod known;
pub mod patterns;
pub mod predicates;
pub mod threshold;

pub use backfill::mark_missed_pathological;
pub use classifier::{Allowance, CORE_CHECK_NAME, ClassifierConfig, E2E_CHECK_NAME, Placement};
pub use known::{KNOWN_EVENT_PROBLEMS, KnownProblem};
pub use patterns::{KNOWN_LABEL, NEW_LABEL, extract_count, message_hash, strip_counts};
pub use predicates::AllowancePredicate;
pub use threshold::{THRESHOLD_CHECKS, ThresholdCheck, run_threshold_checks};
