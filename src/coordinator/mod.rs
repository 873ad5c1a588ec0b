//! Coordinator Module
//!
//! Implements client PUT and GET on top of the ring and the peer links.
//!
//! ## Core Concepts
//! - **Quorum**: a write is reported successful once `R/2 + 1` replicas
//!   acknowledge it. Reads report whether they gathered a quorum of
//!   records but by default return the freshest record they saw.
//! - **Fan-out**: one task per replica target, joined after every branch
//!   succeeded or timed out. Per-replica failures are tallied as data,
//!   never raised as errors.
//! - **Last-writer-wins**: reads resolve divergent replicas by the
//!   largest write timestamp, with the origin node id as a deterministic
//!   tie-breaker.

pub mod service;
pub mod types;

pub use service::Coordinator;
pub use types::{GetReport, PutReport, ReplicaOutcome, ReplicaWrite};
