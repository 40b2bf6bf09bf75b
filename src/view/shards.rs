//! Shard Replica Recomputation
//!
//! Given a new node list and a replication factor `r`, rebuilds the mapping
//! of shard id to replica endpoints while moving as few nodes as possible.
//! Shards compete on how many of their current replicas survive in the new
//! membership: the survivors-rich shards are retained, the tail is
//! dissolved, and every freed or newly joined node is dealt back out until
//! each shard holds exactly `r` replicas.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::ring::hash::MAX_HASH;

/// Seed for newly generated shard ids, fixed so a recompute is reproducible.
const SHARD_ID_SEED: u64 = 1;

/// Result of recomputing the shard replica map for a new membership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardRecompute {
    /// The new shard id to replica endpoints mapping.
    pub shards: BTreeMap<u64, Vec<String>>,
    /// Shard ids created because the shard count grew.
    pub added: Vec<u64>,
    /// Shard ids dissolved because the shard count shrank.
    pub removed: Vec<u64>,
    /// Shard ids whose replica list changed.
    pub modified: Vec<u64>,
}

/// Heap entry: shards retaining more of their replicas sort first, ties are
/// broken by insertion order.
struct ShardItem {
    shard: u64,
    survivors: Vec<String>,
    order: usize,
}

impl PartialEq for ShardItem {
    fn eq(&self, other: &Self) -> bool {
        self.survivors.len() == other.survivors.len() && self.order == other.order
    }
}

impl Eq for ShardItem {}

impl PartialOrd for ShardItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ShardItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.survivors
            .len()
            .cmp(&other.survivors.len())
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// Recomputes the shard replica assignment for `nodes` under replication
/// factor `r`.
///
/// Deterministic for a given input: shards are visited in ascending id
/// order, displaced nodes keep their discovery order, new shard ids come
/// from a fixed-seed generator, and under-replicated shards are refilled in
/// ascending id order.
pub fn recompute_shards(
    current: &BTreeMap<u64, Vec<String>>,
    nodes: &[String],
    r: usize,
) -> ShardRecompute {
    // Tracks which of the new nodes have not yet been claimed by a shard.
    let mut unclaimed: HashMap<&str, bool> =
        nodes.iter().map(|node| (node.as_str(), true)).collect();

    let prev_repl_factor = current.values().next().map(Vec::len).unwrap_or(0);
    let new_num_shards = nodes.len() / r;

    // Each shard keeps up to r surviving replicas; the rest become movable.
    let mut heap = BinaryHeap::with_capacity(current.len());
    let mut movable: Vec<String> = Vec::new();
    for (order, (&shard, replicas)) in current.iter().enumerate() {
        let mut survivors = Vec::new();
        for endpoint in replicas {
            if let Some(flag) = unclaimed.get_mut(endpoint.as_str()) {
                if survivors.len() < r {
                    survivors.push(endpoint.clone());
                } else {
                    movable.push(endpoint.clone());
                }
                *flag = false;
            }
        }
        heap.push(ShardItem {
            shard,
            survivors,
            order,
        });
    }

    // Retain the shards with the most surviving replicas.
    let mut shards = BTreeMap::new();
    let mut modified = Vec::new();
    while shards.len() < new_num_shards {
        let Some(item) = heap.pop() else { break };
        if item.survivors.len() != prev_repl_factor || prev_repl_factor != r {
            modified.push(item.shard);
        }
        shards.insert(item.shard, item.survivors);
    }

    // Grow: draw fresh shard ids until the count matches.
    let mut added = Vec::new();
    let mut rng = StdRng::seed_from_u64(SHARD_ID_SEED);
    while shards.len() < new_num_shards {
        let shard = rng.gen_range(0..MAX_HASH);
        if shards.contains_key(&shard) {
            continue;
        }
        shards.insert(shard, Vec::new());
        added.push(shard);
    }

    // Shrink: shards left on the heap dissolve and free their survivors.
    let mut removed = Vec::new();
    while let Some(item) = heap.pop() {
        removed.push(item.shard);
        modified.push(item.shard);
        movable.extend(item.survivors);
    }

    // Nodes new to the cluster join the movable pool in list order.
    for node in nodes {
        if unclaimed.get(node.as_str()).copied().unwrap_or(false) {
            movable.push(node.clone());
        }
    }

    // Deal the movable pool back out until every shard holds r replicas.
    let mut pool = movable.into_iter();
    'fill: for replicas in shards.values_mut() {
        while replicas.len() < r {
            let Some(node) = pool.next() else { break 'fill };
            replicas.push(node);
        }
    }

    ShardRecompute {
        shards,
        added,
        removed,
        modified,
    }
}
