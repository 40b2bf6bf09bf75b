//! Cluster View & Partitioning Core
//!
//! A `View` is the complete description of cluster topology: the member node
//! list, the virtual-token ring and, when a replication factor is configured,
//! the shard replica map. This module implements the algorithms that rebuild
//! a view for a new membership:
//!
//! - **`diff`**: added/removed node sets between two memberships.
//! - **`merge`**: merges freshly generated tokens for added nodes into the
//!   existing ring, dropping removed nodes' tokens and producing the per-node
//!   `Change` records that drive data movement. Position collisions are
//!   reported to the caller, which redraws the tokens and retries.
//! - **`shards`**: recomputes the shard-to-replica assignment for a new node
//!   list under a fixed replication factor, keeping as many existing replica
//!   placements as possible.

pub mod diff;
pub mod merge;
pub mod shards;
pub mod types;

#[cfg(test)]
mod tests;
