//! Cluster Wire Protocol
//!
//! Endpoint paths and the JSON payloads exchanged between nodes and with
//! clients. External responses keep their historical field names
//! (`doesExist`, `key-count`), so several structs carry serde renames.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::view::types::{Change, View};

// --- External endpoints ---

/// Client-triggered view change; the receiving node coordinates.
pub const ENDPOINT_VIEW_CHANGE: &str = "/kvs/view-change";
/// Key count of a single node.
pub const ENDPOINT_KEY_COUNT: &str = "/kvs/key-count";
/// Client key operations, `/kvs/keys/{key}`.
pub const ENDPOINT_KEYS: &str = "/kvs/keys";
/// Cluster-wide state dump for troubleshooting.
pub const ENDPOINT_DEBUG: &str = "/kvs/debug";

// --- Internal endpoints ---

/// Setup bootstrap: a starting peer fetches its initial view and change.
pub const ENDPOINT_INT_INIT: &str = "/kvs/int/init";
/// View propagation during a view change.
pub const ENDPOINT_INT_VIEW_CHANGE: &str = "/kvs/int/view-change";
/// Reshard trigger carrying a node's change.
pub const ENDPOINT_INT_RESHARD: &str = "/kvs/int/reshard";
/// Bulk key push produced by a reshard.
pub const ENDPOINT_INT_PUSH: &str = "/kvs/int/push";
/// Direct partition access, `/kvs/int/{shard}/{key}`, skipping the ring lookup.
pub const ENDPOINT_INT_SHARD: &str = "/kvs/int";

// --- External payloads ---

#[derive(Debug, Serialize, Deserialize)]
pub struct ViewChangeRequest {
    /// Comma-separated endpoint list of the desired membership.
    pub view: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ViewChangeResponse {
    pub message: String,
    pub shards: Vec<ShardCount>,
}

/// Per-node key count reported after a view change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardCount {
    pub address: String,
    #[serde(rename = "key-count")]
    pub key_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KeyCountResponse {
    pub message: String,
    #[serde(rename = "key-count")]
    pub key_count: usize,
}

/// Value wrapper used by set requests and internal get responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct KeyValue {
    pub value: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GetKeyResponse {
    #[serde(rename = "doesExist")]
    pub does_exist: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Set when the key's owner is a remote node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SetKeyResponse {
    pub replaced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DeleteKeyResponse {
    #[serde(rename = "doesExist")]
    pub does_exist: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

// --- Internal payloads ---

/// Initial view package for a node entering the cluster, either at setup or
/// when added by a view change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewInit {
    pub view: View,
    pub changes: Change,
    /// Identifier of the view change that produced this package; receivers
    /// apply each id at most once.
    #[serde(rename = "change-id")]
    pub change_id: String,
}

/// Reshard trigger sent to every surviving or removed node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReshardRequest {
    pub change: Change,
    #[serde(rename = "change-id")]
    pub change_id: String,
}

/// Body of a bulk push: partition id to key-value pairs.
pub type PushRequest = HashMap<u64, HashMap<String, String>>;
