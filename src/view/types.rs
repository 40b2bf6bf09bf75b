use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ring::token::{self, Token};

/// Complete description of cluster topology.
///
/// Handlers snapshot the node's current view at entry and never see a torn
/// one; view-change processing swaps in a whole new value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct View {
    /// Endpoints (`host:port`) of the nodes currently in the cluster.
    pub nodes: Vec<String>,
    /// The token ring, strictly increasing by value.
    pub tokens: Vec<Token>,
    /// Shard id to replica endpoints. Populated only when a replication
    /// factor is configured.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub shards: BTreeMap<u64, Vec<String>>,
}

impl View {
    /// Ring lookup for a key. `None` only when the ring is empty.
    pub fn find_token(&self, key: &str) -> Option<&Token> {
        token::find_token(&self.tokens, key)
    }
}

/// What a view change means for a single node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// The node left the view and must shed all of its state.
    #[serde(default)]
    pub removed: bool,
    /// Ring positions whose responsibility changed for this node: positions
    /// it gained, or its own positions whose arc shrank.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<u64>,
}

impl Change {
    pub fn removed() -> Self {
        Change {
            removed: true,
            tokens: Vec::new(),
        }
    }
}
