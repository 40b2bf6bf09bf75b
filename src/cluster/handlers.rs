//! Cluster HTTP Handlers
//!
//! Translates HTTP requests into the node's internal operations. External
//! handlers resolve the owning token for a key and either serve locally or
//! forward to the owner; internal handlers operate on a named partition
//! directly. Every handler first checks the node's `active` flag: an
//! inactive node answers 403 to everything except the bootstrap paths that
//! expect an inactive node.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Extension, Path, Query};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use sysinfo::System;

use crate::ring::token::Token;
use crate::storage::memory::StoreError;
use crate::view::types::View;

use super::coordinator::{self, NOTIFY_TIMEOUT, post_ok};
use super::protocol::*;
use super::state::ClusterState;

/// Timeout for forwarded key operations.
const FORWARD_TIMEOUT: Duration = Duration::from_millis(500);
const FORWARD_ATTEMPTS: usize = 3;

/// Builds the node's full route table.
pub fn router(state: Arc<ClusterState>) -> Router {
    Router::new()
        // External endpoints
        .route(ENDPOINT_VIEW_CHANGE, put(handle_view_change))
        .route(ENDPOINT_KEY_COUNT, get(handle_key_count))
        .route(
            &format!("{}/:key", ENDPOINT_KEYS),
            get(handle_get_key)
                .put(handle_set_key)
                .delete(handle_delete_key),
        )
        .route(ENDPOINT_DEBUG, get(handle_debug).post(handle_debug))
        // Internal endpoints
        .route(ENDPOINT_INT_INIT, get(handle_init))
        .route(ENDPOINT_INT_VIEW_CHANGE, post(handle_int_view_change))
        .route(ENDPOINT_INT_RESHARD, post(handle_int_reshard))
        .route(ENDPOINT_INT_PUSH, post(handle_int_push))
        .route(
            &format!("{}/:shard/:key", ENDPOINT_INT_SHARD),
            get(handle_int_get)
                .put(handle_int_set)
                .delete(handle_int_delete),
        )
        .layer(Extension(state))
}

// ============================================================
// External handlers
// ============================================================

/// `PUT /kvs/view-change` — this node becomes the coordinator.
pub async fn handle_view_change(
    Extension(state): Extension<Arc<ClusterState>>,
    Json(req): Json<ViewChangeRequest>,
) -> Response {
    if !state.is_active() {
        return StatusCode::FORBIDDEN.into_response();
    }

    let nodes = super::config::parse_view(&req.view);
    match coordinator::coordinate_view_change(&state, nodes).await {
        Ok(shards) => (
            StatusCode::OK,
            Json(ViewChangeResponse {
                message: "View change successful".to_string(),
                shards,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("View change failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `GET /kvs/key-count`
pub async fn handle_key_count(Extension(state): Extension<Arc<ClusterState>>) -> Response {
    if !state.is_active() {
        return StatusCode::FORBIDDEN.into_response();
    }

    (
        StatusCode::OK,
        Json(KeyCountResponse {
            message: "Key count retrieved successfully".to_string(),
            key_count: state.store.key_count(),
        }),
    )
        .into_response()
}

/// `GET /kvs/keys/{key}`
pub async fn handle_get_key(
    Extension(state): Extension<Arc<ClusterState>>,
    Path(key): Path<String>,
) -> Response {
    if !state.is_active() {
        return StatusCode::FORBIDDEN.into_response();
    }

    let view = state.view().await;
    let Some(token) = view.find_token(&key) else {
        tracing::error!("GET on an empty ring");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let mut res = GetKeyResponse::default();
    let value = if token.endpoint == state.my_address {
        state.store.get(token.value, &key)
    } else {
        res.address = Some(token.endpoint.clone());
        match execute_get(&state, token, &key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Forwarded GET to {} failed: {}", token.endpoint, e);
                None
            }
        }
    };

    match value {
        Some(value) => {
            res.does_exist = true;
            res.message = "Retrieved successfully".to_string();
            res.value = Some(value);
            (StatusCode::OK, Json(res)).into_response()
        }
        None => {
            res.does_exist = false;
            res.error = Some("Key does not exist".to_string());
            res.message = "Error in GET".to_string();
            (StatusCode::NOT_FOUND, Json(res)).into_response()
        }
    }
}

/// `PUT /kvs/keys/{key}`
pub async fn handle_set_key(
    Extension(state): Extension<Arc<ClusterState>>,
    Path(key): Path<String>,
    Json(body): Json<KeyValue>,
) -> Response {
    if !state.is_active() {
        return StatusCode::FORBIDDEN.into_response();
    }

    let mut res = SetKeyResponse::default();

    let Some(value) = body.value else {
        res.error = Some("Value is missing".to_string());
        res.message = "Error in PUT".to_string();
        return (StatusCode::BAD_REQUEST, Json(res)).into_response();
    };
    if key.len() > 50 {
        res.error = Some("Key is too long".to_string());
        res.message = "Error in PUT".to_string();
        return (StatusCode::BAD_REQUEST, Json(res)).into_response();
    }

    let view = state.view().await;
    let Some(token) = view.find_token(&key) else {
        tracing::error!("PUT on an empty ring");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let result = if token.endpoint == state.my_address {
        state
            .store
            .set(token.value, key, value)
            .map_err(anyhow::Error::from)
    } else {
        res.address = Some(token.endpoint.clone());
        execute_set(&state, token, &key, value).await
    };

    match result {
        Ok(updated) => {
            res.replaced = updated;
            if updated {
                res.message = "Updated successfully".to_string();
                (StatusCode::OK, Json(res)).into_response()
            } else {
                res.message = "Added successfully".to_string();
                (StatusCode::CREATED, Json(res)).into_response()
            }
        }
        Err(e) => {
            tracing::error!("PUT failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `DELETE /kvs/keys/{key}`
pub async fn handle_delete_key(
    Extension(state): Extension<Arc<ClusterState>>,
    Path(key): Path<String>,
) -> Response {
    if !state.is_active() {
        return StatusCode::FORBIDDEN.into_response();
    }

    let view = state.view().await;
    let Some(token) = view.find_token(&key) else {
        tracing::error!("DELETE on an empty ring");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let mut res = DeleteKeyResponse::default();
    let deleted = if token.endpoint == state.my_address {
        state.store.delete(token.value, &key).is_ok()
    } else {
        res.address = Some(token.endpoint.clone());
        execute_delete(&state, token, &key).await.is_ok()
    };

    if deleted {
        res.does_exist = true;
        res.message = "Deleted successfully".to_string();
        (StatusCode::OK, Json(res)).into_response()
    } else {
        res.does_exist = false;
        res.error = Some("Key does not exist".to_string());
        res.message = "Error in DELETE".to_string();
        (StatusCode::NOT_FOUND, Json(res)).into_response()
    }
}

/// `GET|POST /kvs/debug` — logs this node's state; a GET additionally fans
/// the dump out to every peer so one request snapshots the whole cluster.
pub async fn handle_debug(
    Extension(state): Extension<Arc<ClusterState>>,
    method: Method,
) -> Response {
    let view = state.view().await;

    let mut sys = System::new_all();
    sys.refresh_cpu();
    sys.refresh_memory();

    tracing::info!("Address: {} Active: {}", state.my_address, state.is_active());
    tracing::info!("Nodes: {:?}", view.nodes);
    tracing::info!("Ring: {} tokens", view.tokens.len());
    tracing::info!("Partitions hosted: {:?}", state.store.partition_ids());
    tracing::info!("Keys: {}", state.store.key_count());
    tracing::info!(
        "CPU: {:.1}% Mem: {}/{} MB",
        sys.global_cpu_info().cpu_usage(),
        sys.used_memory() / (1024 * 1024),
        sys.total_memory() / (1024 * 1024),
    );

    if method == Method::GET {
        for node in &view.nodes {
            if node == &state.my_address {
                continue;
            }
            let url = format!("http://{}{}", node, ENDPOINT_DEBUG);
            if !post_ok(state.http(), &url, &serde_json::json!({}), NOTIFY_TIMEOUT).await {
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    }

    StatusCode::OK.into_response()
}

// ============================================================
// Internal handlers
// ============================================================

#[derive(Debug, Deserialize)]
struct InitQuery {
    address: String,
}

/// `GET /kvs/int/init` — setup bootstrap, served by the setup coordinator.
pub async fn handle_init(
    Extension(state): Extension<Arc<ClusterState>>,
    Query(query): Query<InitQuery>,
) -> Response {
    if state.is_active() {
        return StatusCode::FORBIDDEN.into_response();
    }

    let view = state.view().await;
    let package = {
        let guard = state.setup.lock().await;
        let Some(setup) = guard.as_ref() else {
            return StatusCode::FORBIDDEN.into_response();
        };
        let Some(change) = setup.initial_changes.get(&query.address) else {
            return StatusCode::FORBIDDEN.into_response();
        };
        ViewInit {
            view: (*view).clone(),
            changes: change.clone(),
            change_id: setup.change_id.clone(),
        }
    };

    let response = (StatusCode::OK, Json(package)).into_response();
    if let Err(e) = coordinator::node_joined(&state, query.address).await {
        tracing::error!("Completing setup failed: {}", e);
    }
    response
}

/// `POST /kvs/int/view-change` — view propagation from a coordinator.
///
/// An active node receives the bare view; a node being added receives its
/// `ViewInit` package, applies its change and becomes active.
pub async fn handle_int_view_change(
    Extension(state): Extension<Arc<ClusterState>>,
    body: Bytes,
) -> Response {
    if state.is_active() {
        match serde_json::from_slice::<View>(&body) {
            Ok(view) => {
                let _guard = state.view_change_lock.lock().await;
                state.install_view(view).await;
                StatusCode::OK.into_response()
            }
            Err(e) => {
                tracing::error!("Bad view payload: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    } else {
        match serde_json::from_slice::<ViewInit>(&body) {
            Ok(init) => {
                let _guard = state.view_change_lock.lock().await;
                state.install_view(init.view.clone()).await;
                match coordinator::apply_local_change(
                    &state,
                    &init.changes,
                    &init.change_id,
                    &init.view,
                )
                .await
                {
                    Ok(()) => {
                        state.set_active(true);
                        tracing::info!("Joined view");
                        StatusCode::OK.into_response()
                    }
                    Err(e) => {
                        tracing::error!("Applying initial change failed: {}", e);
                        StatusCode::INTERNAL_SERVER_ERROR.into_response()
                    }
                }
            }
            Err(e) => {
                tracing::error!("Bad view-init payload: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// `POST /kvs/int/reshard` — applies this node's change and pushes displaced
/// keys to their new homes.
pub async fn handle_int_reshard(
    Extension(state): Extension<Arc<ClusterState>>,
    Json(req): Json<ReshardRequest>,
) -> Response {
    if !state.is_active() {
        return StatusCode::FORBIDDEN.into_response();
    }

    let _guard = state.view_change_lock.lock().await;
    let view = state.view().await;
    match coordinator::apply_local_change(&state, &req.change, &req.change_id, &view).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            tracing::error!("Reshard failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `POST /kvs/int/push` — bulk-ingests keys pushed by a resharding peer.
pub async fn handle_int_push(
    Extension(state): Extension<Arc<ClusterState>>,
    Json(batches): Json<PushRequest>,
) -> Response {
    if !state.is_active() {
        return StatusCode::FORBIDDEN.into_response();
    }

    match state.store.bulk_ingest(batches) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            tracing::error!("Push ingest failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `GET /kvs/int/{shard}/{key}` — direct partition read.
pub async fn handle_int_get(
    Extension(state): Extension<Arc<ClusterState>>,
    Path((shard, key)): Path<(u64, String)>,
) -> Response {
    if !state.is_active() {
        return StatusCode::FORBIDDEN.into_response();
    }

    match state.store.get(shard, &key) {
        Some(value) => (StatusCode::OK, Json(KeyValue { value: Some(value) })).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// `PUT /kvs/int/{shard}/{key}` — direct partition write.
pub async fn handle_int_set(
    Extension(state): Extension<Arc<ClusterState>>,
    Path((shard, key)): Path<(u64, String)>,
    Json(body): Json<KeyValue>,
) -> Response {
    if !state.is_active() {
        return StatusCode::FORBIDDEN.into_response();
    }

    let Some(value) = body.value else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    match state.store.set(shard, key, value) {
        Ok(true) => StatusCode::OK.into_response(),
        Ok(false) => StatusCode::CREATED.into_response(),
        Err(e) => {
            tracing::error!("Internal set failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `DELETE /kvs/int/{shard}/{key}` — direct partition delete.
pub async fn handle_int_delete(
    Extension(state): Extension<Arc<ClusterState>>,
    Path((shard, key)): Path<(u64, String)>,
) -> Response {
    if !state.is_active() {
        return StatusCode::FORBIDDEN.into_response();
    }

    match state.store.delete(shard, &key) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(StoreError::NoSuchKey | StoreError::NoSuchShard(_)) => {
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

// ============================================================
// Forwarded key operations
// ============================================================

fn shard_url(token: &Token, key: &str) -> String {
    format!(
        "http://{}{}/{}/{}",
        token.endpoint, ENDPOINT_INT_SHARD, token.value, key
    )
}

/// Reads a key from its owning node, retrying transient transport failures.
async fn execute_get(
    state: &Arc<ClusterState>,
    token: &Token,
    key: &str,
) -> anyhow::Result<Option<String>> {
    let url = shard_url(token, key);

    let mut delay_ms = 150u64;
    for attempt in 0..FORWARD_ATTEMPTS {
        match state.http().get(&url).timeout(FORWARD_TIMEOUT).send().await {
            Ok(response) => {
                if response.status() == reqwest::StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                anyhow::ensure!(
                    response.status().is_success(),
                    "node returned {}",
                    response.status()
                );
                let body: KeyValue = response.json().await?;
                return Ok(body.value);
            }
            Err(e) => {
                if attempt + 1 == FORWARD_ATTEMPTS {
                    return Err(e.into());
                }
                let jitter = rand::random::<u64>() % 50;
                tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                delay_ms = (delay_ms * 2).min(1200);
            }
        }
    }

    Err(anyhow::anyhow!("retry attempts exhausted"))
}

/// Writes a key on its owning node. Returns whether the key already existed.
async fn execute_set(
    state: &Arc<ClusterState>,
    token: &Token,
    key: &str,
    value: String,
) -> anyhow::Result<bool> {
    let url = shard_url(token, key);
    let body = KeyValue { value: Some(value) };

    let response = state
        .http()
        .put(&url)
        .json(&body)
        .timeout(FORWARD_TIMEOUT)
        .send()
        .await?;

    match response.status() {
        reqwest::StatusCode::OK => Ok(true),
        reqwest::StatusCode::CREATED => Ok(false),
        status => anyhow::bail!("node returned {}", status),
    }
}

/// Deletes a key on its owning node.
async fn execute_delete(
    state: &Arc<ClusterState>,
    token: &Token,
    key: &str,
) -> anyhow::Result<()> {
    let url = shard_url(token, key);

    let response = state
        .http()
        .delete(&url)
        .timeout(FORWARD_TIMEOUT)
        .send()
        .await?;

    anyhow::ensure!(
        response.status() == reqwest::StatusCode::OK,
        "node returned {}",
        response.status()
    );
    Ok(())
}
