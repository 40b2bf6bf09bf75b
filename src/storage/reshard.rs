//! Resharder
//!
//! Applies one view-change `Change` to local storage and computes which keys
//! must move where under the new ring. The resulting plan maps target
//! endpoint to partition id to key-value pairs; the caller pushes each outer
//! entry to its target, which bulk-ingests.

use std::collections::HashMap;

use crate::view::types::{Change, View};

use super::memory::PartitionedStore;

/// Keys leaving this node: target endpoint -> partition id -> pairs.
pub type ReshardPlan = HashMap<String, HashMap<u64, HashMap<String, String>>>;

/// Applies `change` to `store` and returns the movement plan.
///
/// Three cases:
/// - The node was removed: every local pair is re-homed by the new ring and
///   all local partitions are dropped.
/// - First join (nothing hosted yet): an empty partition is allocated for
///   every id named by the change; nothing moves.
/// - Existing node: each partition named by the change is rescanned; pairs
///   whose owning token changed are planned out and deleted locally. A pair
///   may re-home to this same node under a different token; it still goes
///   through the plan and returns via the push path.
pub fn plan_reshard(store: &PartitionedStore, change: &Change, view: &View) -> ReshardPlan {
    let mut plan = ReshardPlan::new();

    if change.removed {
        for shard in store.partition_ids() {
            for (key, value) in store.partition_entries(shard) {
                if let Some(token) = view.find_token(&key) {
                    plan.entry(token.endpoint.clone())
                        .or_default()
                        .entry(token.value)
                        .or_default()
                        .insert(key, value);
                }
            }
            store.drop_partition(shard);
        }
        return plan;
    }

    if store.partition_ids().is_empty() {
        for &shard in &change.tokens {
            store.create_partition(shard);
        }
        return plan;
    }

    for &shard in &change.tokens {
        for (key, value) in store.partition_entries(shard) {
            let Some(token) = view.find_token(&key) else {
                continue;
            };
            if token.value != shard {
                plan.entry(token.endpoint.clone())
                    .or_default()
                    .entry(token.value)
                    .or_default()
                    .insert(key.clone(), value);
                let _ = store.delete(shard, &key);
            }
        }
    }

    plan
}
