// src/core/tasks/mod.rs

//! This module contains all long-running background tasks that support the
//! edge's core functionality: the control-plane heartbeat, the purge worker,
//! and rate-limiter compaction.

pub mod heartbeat;
pub mod limiter_gc;
pub mod purge_worker;
