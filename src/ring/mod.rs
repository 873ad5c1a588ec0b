//! Hash Ring Module
//!
//! Consistent-hashing placement for the cluster.
//!
//! ## Core Concepts
//! - **Virtual nodes**: each physical node owns V entries on the ring to
//!   smooth the distribution of keys across nodes.
//! - **Positions**: 32-bit unsigned integers taken from the first four
//!   bytes of a SHA-256 digest; the ring modulus is 2^32.
//! - **Replica sets**: the ordered list of distinct nodes found by walking
//!   the ring clockwise from a key's position.
//! - **Snapshot swaps**: topology changes build a fresh ring state and
//!   swap it atomically, so readers always see a complete view.

pub mod hash_ring;

pub use hash_ring::{ring_position, HashRing};
