//! Monitors (spec §4.D)
//!
//! Both monitors share one contract: take ownership of a freshly created
//! record, run detached until the record reaches a terminal status
//! (`confirmed`, `expired`, `error`), and never propagate a failure back to
//! whoever spawned them (spec §7 "monitors never propagate to the caller").

pub mod bridge;
pub mod direct;
