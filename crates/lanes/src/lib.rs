//! Per-session serial execution lanes.
//!
//! Every session gets at most one lane: a bounded task buffer drained by a
//! single worker, so tasks within a session run FIFO and strictly serially
//! while different sessions execute in parallel. Lanes are created lazily on
//! first enqueue and reaped after sitting idle.

pub mod lane;
pub mod manager;

pub use lane::{Task, TaskFn};
pub use manager::LaneManager;
