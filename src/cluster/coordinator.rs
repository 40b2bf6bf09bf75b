//! View-Change Coordination
//!
//! The node that receives a client's view-change request drives the whole
//! protocol: it recomputes its own view first, then notifies every peer,
//! triggers resharding, and gathers key counts for the response. Every
//! fan-out spawns one task per peer and joins on the collected handles; a
//! single failed peer fails the fan-out. Partial application is not rolled
//! back.
//!
//! Cluster birth is a one-shot variant of the same machinery: the first
//! configured node precomputes everyone's initial change and hands each peer
//! its slice when it calls in.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::storage::reshard::{ReshardPlan, plan_reshard};
use crate::view::shards::recompute_shards;
use crate::view::types::{Change, View};

use super::protocol::{
    ENDPOINT_INT_INIT, ENDPOINT_INT_PUSH, ENDPOINT_INT_RESHARD, ENDPOINT_INT_VIEW_CHANGE,
    ENDPOINT_KEY_COUNT, KeyCountResponse, ReshardRequest, ShardCount, ViewInit,
};
use super::state::{ClusterState, SetupState};

/// Timeout for control-plane calls: notifications, reshard triggers, counts.
pub(crate) const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for bulk key pushes.
pub(crate) const PUSH_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs a full view change as coordinator and returns the per-node key-count
/// report for the client response.
///
/// The local view is swapped before any network traffic; a failure in any
/// later step leaves this node on the new view and returns the error.
pub async fn coordinate_view_change(
    state: &Arc<ClusterState>,
    nodes: Vec<String>,
) -> anyhow::Result<Vec<ShardCount>> {
    let _guard = state.view_change_lock.lock().await;

    let old_view = state.view().await;
    let mut new_view = (*old_view).clone();
    let (mut changes, added_nodes) = new_view.change_view(nodes);

    if let Some(r) = state.repl_factor {
        let recompute = recompute_shards(&new_view.shards, &new_view.nodes, r);
        tracing::info!(
            "Shard map recomputed: {} added, {} removed, {} modified",
            recompute.added.len(),
            recompute.removed.len(),
            recompute.modified.len()
        );
        new_view.shards = recompute.shards;
    }

    state.install_view(new_view.clone()).await;
    let change_id = Uuid::new_v4().to_string();

    notify_view_changes(
        state,
        &new_view,
        &added_nodes,
        &old_view.nodes,
        &mut changes,
        &change_id,
    )
    .await?;

    propagate_changes(state, &new_view, changes, &change_id).await?;
    tracing::info!("View updated to {:?}", new_view.nodes);

    collect_key_counts(state, &new_view).await
}

/// Pushes the new view to every peer. Added nodes receive their full
/// `ViewInit` package (and are dropped from `changes`, which they apply on
/// receipt); existing peers receive the bare view.
async fn notify_view_changes(
    state: &Arc<ClusterState>,
    view: &View,
    added_nodes: &HashSet<String>,
    old_nodes: &[String],
    changes: &mut HashMap<String, Change>,
    change_id: &str,
) -> anyhow::Result<()> {
    let accepted: Arc<DashMap<String, ()>> = Arc::new(DashMap::new());
    let mut handles = Vec::new();
    let mut notified = 0usize;

    for node in added_nodes {
        let Some(change) = changes.remove(node) else {
            continue;
        };
        notified += 1;

        let body = ViewInit {
            view: view.clone(),
            changes: change,
            change_id: change_id.to_string(),
        };
        let url = format!("http://{}{}", node, ENDPOINT_INT_VIEW_CHANGE);
        let state = state.clone();
        let node = node.clone();
        let accepted = accepted.clone();
        handles.push(tokio::spawn(async move {
            if post_ok(state.http(), &url, &body, NOTIFY_TIMEOUT).await {
                accepted.insert(node, ());
            }
        }));
    }

    for node in old_nodes {
        if added_nodes.contains(node) || node == &state.my_address {
            continue;
        }
        notified += 1;

        let body = view.clone();
        let url = format!("http://{}{}", node, ENDPOINT_INT_VIEW_CHANGE);
        let state = state.clone();
        let node = node.clone();
        let accepted = accepted.clone();
        handles.push(tokio::spawn(async move {
            if post_ok(state.http(), &url, &body, NOTIFY_TIMEOUT).await {
                accepted.insert(node, ());
            }
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }

    anyhow::ensure!(
        accepted.len() == notified,
        "not all nodes accepted view change"
    );
    Ok(())
}

/// Sends every remaining change to its node, applying our own in place.
async fn propagate_changes(
    state: &Arc<ClusterState>,
    view: &View,
    changes: HashMap<String, Change>,
    change_id: &str,
) -> anyhow::Result<()> {
    let propagated: Arc<DashMap<String, ()>> = Arc::new(DashMap::new());
    let total = changes.len();
    let mut handles = Vec::new();

    for (node, change) in changes {
        let state = state.clone();
        let propagated = propagated.clone();
        let change_id = change_id.to_string();

        if node == state.my_address {
            let view = view.clone();
            handles.push(tokio::spawn(async move {
                match apply_local_change(&state, &change, &change_id, &view).await {
                    Ok(()) => {
                        propagated.insert(node, ());
                    }
                    Err(e) => tracing::error!("Local reshard failed: {}", e),
                }
            }));
        } else {
            let url = format!("http://{}{}", node, ENDPOINT_INT_RESHARD);
            let body = ReshardRequest { change, change_id };
            handles.push(tokio::spawn(async move {
                if post_ok(state.http(), &url, &body, NOTIFY_TIMEOUT).await {
                    propagated.insert(node, ());
                }
            }));
        }
    }

    for handle in handles {
        let _ = handle.await;
    }

    anyhow::ensure!(
        propagated.len() == total,
        "not all nodes propagated changes"
    );
    Ok(())
}

/// Applies a change to local storage and pushes displaced keys onward.
///
/// Each change id is applied at most once; a repeat is a no-op. A node whose
/// change marks it removed deactivates after its keys are pushed out.
pub async fn apply_local_change(
    state: &Arc<ClusterState>,
    change: &Change,
    change_id: &str,
    view: &View,
) -> anyhow::Result<()> {
    if !state.first_application(change_id) {
        tracing::debug!("Change {} already applied, skipping", change_id);
        return Ok(());
    }

    let plan = plan_reshard(&state.store, change, view);
    push_plan(state, plan).await?;

    if change.removed {
        state.set_active(false);
        tracing::info!("Left view");
    }
    Ok(())
}

/// Pushes each plan entry to its target node and waits for all of them.
pub async fn push_plan(state: &Arc<ClusterState>, plan: ReshardPlan) -> anyhow::Result<()> {
    if plan.is_empty() {
        return Ok(());
    }

    let pushed: Arc<DashMap<String, ()>> = Arc::new(DashMap::new());
    let total = plan.len();
    let mut handles = Vec::new();

    for (node, batches) in plan {
        let url = format!("http://{}{}", node, ENDPOINT_INT_PUSH);
        let state = state.clone();
        let pushed = pushed.clone();
        handles.push(tokio::spawn(async move {
            if post_ok(state.http(), &url, &batches, PUSH_TIMEOUT).await {
                pushed.insert(node, ());
            }
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }

    anyhow::ensure!(pushed.len() == total, "not all reshards completed");
    Ok(())
}

/// Queries every node for its post-change key count.
async fn collect_key_counts(
    state: &Arc<ClusterState>,
    view: &View,
) -> anyhow::Result<Vec<ShardCount>> {
    let counts: Arc<DashMap<String, usize>> = Arc::new(DashMap::new());
    let mut handles = Vec::new();

    for node in &view.nodes {
        if node == &state.my_address {
            counts.insert(node.clone(), state.store.key_count());
            continue;
        }

        let url = format!("http://{}{}", node, ENDPOINT_KEY_COUNT);
        let state = state.clone();
        let node = node.clone();
        let counts = counts.clone();
        handles.push(tokio::spawn(async move {
            match get_json::<KeyCountResponse>(state.http(), &url, NOTIFY_TIMEOUT).await {
                Ok(response) => {
                    counts.insert(node, response.key_count);
                }
                Err(e) => tracing::warn!("Key count from {} failed: {}", node, e),
            }
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }

    anyhow::ensure!(
        counts.len() == view.nodes.len(),
        "not all key counts were found"
    );

    let mut report: Vec<ShardCount> = counts
        .iter()
        .map(|entry| ShardCount {
            address: entry.key().clone(),
            key_count: *entry.value(),
        })
        .collect();
    report.sort_by(|a, b| a.address.cmp(&b.address));
    Ok(report)
}

/// Computes the initial view at process start on the first configured node
/// and parks the per-node changes until every peer has called in.
pub async fn coordinate_setup(state: &Arc<ClusterState>, nodes: Vec<String>) -> anyhow::Result<()> {
    let mut view = View::default();
    let (initial_changes, _added) = view.change_view(nodes);

    if let Some(r) = state.repl_factor {
        view.shards = recompute_shards(&BTreeMap::new(), &view.nodes, r).shards;
    }

    state.install_view(view).await;
    *state.setup.lock().await = Some(SetupState {
        change_id: Uuid::new_v4().to_string(),
        initial_changes,
        joined: HashSet::new(),
    });

    // A single-node view has no peers to wait for.
    maybe_finish_setup(state).await
}

/// Records a peer as joined and completes setup once everyone has.
pub async fn node_joined(state: &Arc<ClusterState>, node: String) -> anyhow::Result<()> {
    {
        let mut guard = state.setup.lock().await;
        if let Some(setup) = guard.as_mut() {
            setup.joined.insert(node);
        }
    }
    maybe_finish_setup(state).await
}

async fn maybe_finish_setup(state: &Arc<ClusterState>) -> anyhow::Result<()> {
    let expected = state.view().await.nodes.len();
    let setup = {
        let mut guard = state.setup.lock().await;
        let complete = guard
            .as_ref()
            .is_some_and(|setup| setup.joined.len() + 1 >= expected);
        if complete { guard.take() } else { None }
    };

    let Some(setup) = setup else {
        return Ok(());
    };

    let view = state.view().await;
    if let Some(change) = setup.initial_changes.get(&state.my_address) {
        apply_local_change(state, change, &setup.change_id, &view).await?;
    }
    state.set_active(true);
    tracing::info!("Setup complete");
    Ok(())
}

/// Joins the cluster at process start by fetching our initial view from the
/// setup coordinator, retrying with backoff until it answers.
pub async fn join_view(state: &Arc<ClusterState>, leader: &str) {
    let url = format!(
        "http://{}{}?address={}",
        leader, ENDPOINT_INT_INIT, state.my_address
    );

    let mut delay = Duration::from_millis(500);
    loop {
        match try_join(state, &url).await {
            Ok(()) => {
                tracing::info!("Joined view");
                return;
            }
            Err(e) => tracing::warn!("Unable to join view yet: {}", e),
        }

        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(Duration::from_secs(5));
    }
}

async fn try_join(state: &Arc<ClusterState>, url: &str) -> anyhow::Result<()> {
    let init: ViewInit = get_json(state.http(), url, NOTIFY_TIMEOUT).await?;

    let _guard = state.view_change_lock.lock().await;
    state.install_view(init.view.clone()).await;
    apply_local_change(state, &init.changes, &init.change_id, &init.view).await?;
    state.set_active(true);
    Ok(())
}

/// Posts JSON to a peer; any transport error, timeout or non-2xx status
/// counts as failure.
pub(crate) async fn post_ok<T: Serialize>(
    client: &reqwest::Client,
    url: &str,
    body: &T,
    timeout: Duration,
) -> bool {
    match client.post(url).json(body).timeout(timeout).send().await {
        Ok(response) if response.status().is_success() => true,
        Ok(response) => {
            tracing::warn!("POST {} returned {}", url, response.status());
            false
        }
        Err(e) => {
            tracing::warn!("POST {} failed: {}", url, e);
            false
        }
    }
}

async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> anyhow::Result<T> {
    let response = client.get(url).timeout(timeout).send().await?;
    anyhow::ensure!(
        response.status().is_success(),
        "GET {} returned {}",
        url,
        response.status()
    );
    Ok(response.json().await?)
}
