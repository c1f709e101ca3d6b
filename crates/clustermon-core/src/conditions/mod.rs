//! Condition generators
//!
//! Stateless functions mapping resource snapshots to [`Condition`]s.
//! Nothing here touches the recorder or the cluster; the watch runtime
//! feeds snapshots in and records what comes out.
//!
//! [`Condition`]: crate::interval::Condition

pub mod event;
pub mod pod;

pub use event::{EventObservation, PATHOLOGICAL_SPAN_SECS, event_for_container, observe_event};
pub use pod::{
    PodDetector, conditions_for_create, conditions_for_delete, conditions_for_update,
    pending_too_long,
};
