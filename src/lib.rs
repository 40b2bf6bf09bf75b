//! Sharded Key-Value Store Library
//!
//! This library crate defines the core modules of a horizontally partitioned,
//! replicated in-memory key-value store. A fixed cohort of peer nodes
//! cooperates over HTTP to present a single logical string-to-string map;
//! the binary executable (`main.rs`) wires the modules into a running node.
//!
//! ## Architecture Modules
//!
//! - **`ring`**: Consistent hashing. Maps keys to positions in a fixed hash
//!   space and resolves the owning token on a sorted virtual-token ring.
//! - **`view`**: The partitioning core. Holds the cluster view (membership,
//!   token ring, shard replica map) and implements the diff/merge/recompute
//!   algorithms that drive a view change with minimal key movement.
//! - **`storage`**: The partitioned in-memory store, plus the resharder that
//!   computes where local keys must move after a view change.
//! - **`cluster`**: The distributed protocol layer. Node-wide state, the
//!   view-change coordinator and participant handlers, and the wire DTOs.

pub mod cluster;
pub mod logging;
pub mod ring;
pub mod storage;
pub mod view;
