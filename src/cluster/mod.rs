//! Cluster Protocol Module
//!
//! The distributed layer on top of the partitioning core: node-wide state,
//! the HTTP wire protocol, the view-change coordinator and the participant
//! handlers.
//!
//! ## Roles
//! - **Coordinator**: whichever active node receives a client's view-change
//!   request. It recomputes the view locally, then drives the protocol:
//!   notify every peer, trigger resharding, collect key counts.
//! - **Participant**: every node. Accepts view notifications, applies its
//!   `Change` by replanning local storage, and ingests keys pushed to it.
//! - **Setup coordinator**: the first node of the configured view. Computes
//!   the initial view at process start and hands each peer its slice when it
//!   calls in, becoming active once everyone has joined.

pub mod config;
pub mod coordinator;
pub mod handlers;
pub mod protocol;
pub mod state;
