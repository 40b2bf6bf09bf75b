use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};

use crate::storage::memory::PartitionedStore;
use crate::view::types::{Change, View};

use super::config::Config;

/// Held only by the setup coordinator between process start and the moment
/// every configured peer has fetched its initial view.
pub struct SetupState {
    /// Identifier shared by every initial-change application.
    pub change_id: String,
    /// The change each configured node must apply when it joins.
    pub initial_changes: HashMap<String, Change>,
    /// Peers that have fetched their package so far.
    pub joined: HashSet<String>,
}

/// Process-wide state of one node.
///
/// The view is replaced wholesale by view-change processing; everything else
/// has a single writer per state transition. Handlers snapshot the view
/// `Arc` at entry and operate on that snapshot.
pub struct ClusterState {
    pub my_address: String,
    pub repl_factor: Option<usize>,
    view: RwLock<Arc<View>>,
    active: AtomicBool,
    pub setup: Mutex<Option<SetupState>>,
    pub store: PartitionedStore,
    /// View-change ids already applied on this node; repeats are ignored.
    applied_changes: DashMap<String, ()>,
    /// Serialises view-change processing end-to-end. Read/write traffic is
    /// not ordered against it.
    pub view_change_lock: Mutex<()>,
    http: reqwest::Client,
}

impl ClusterState {
    pub fn new(config: &Config) -> Self {
        Self {
            my_address: config.address.clone(),
            repl_factor: config.repl_factor,
            view: RwLock::new(Arc::new(View::default())),
            active: AtomicBool::new(false),
            setup: Mutex::new(None),
            store: PartitionedStore::new(),
            applied_changes: DashMap::new(),
            view_change_lock: Mutex::new(()),
            http: reqwest::Client::new(),
        }
    }

    /// Snapshot of the current view.
    pub async fn view(&self) -> Arc<View> {
        self.view.read().await.clone()
    }

    /// Swaps in a new view. Callers hold `view_change_lock` for the duration
    /// of the surrounding view change.
    pub async fn install_view(&self, view: View) {
        *self.view.write().await = Arc::new(view);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    /// Records a view-change id, returning false when it was already applied.
    pub fn first_application(&self, change_id: &str) -> bool {
        if self.applied_changes.contains_key(change_id) {
            return false;
        }
        if self.applied_changes.len() > 10_000 {
            self.applied_changes.clear();
        }
        self.applied_changes.insert(change_id.to_string(), ());
        true
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }
}
