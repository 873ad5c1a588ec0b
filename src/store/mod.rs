//! Local Store Module
//!
//! The per-node state layer: an in-memory map of key to record.
//!
//! ## Core Concepts
//! - **Record**: a value blob plus write metadata (timestamp, version,
//!   origin node).
//! - **Last-writer-wins**: a write lands only if its timestamp is strictly
//!   greater than the stored one; ties keep the first stored record.
//! - **Per-key linearization**: concurrent writes to the same key are
//!   serialized by the map's shard locks.

pub mod memory;
pub mod types;

pub use memory::LocalStore;
pub use types::{Metadata, PutOutcome, Record};

#[cfg(test)]
mod tests;
