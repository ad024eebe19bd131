//! Session state: pane registry, window map, master-client tracking (§3.3,
//! §7). Grounded on the teacher's `client/registry.rs` `ClientRegistry` —
//! same `HashMap`-backed CRUD shape, generalized from client lookups to the
//! session's pane/window hierarchy plus the single-master invariant that
//! module never needed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::pane::Pane;

pub type PaneId = u64;

/// Published whenever `clipboard-set` (§6.1) lands, for any outer-surface
/// transport that wants to mirror the change to its connected clients.
#[derive(Debug, Clone)]
pub struct ClipboardBroadcast {
    pub kind: char,
    pub data: String,
}

/// An ordered list of pane ids plus an optional layout template id (§2).
#[derive(Debug, Default, Clone)]
pub struct Window {
    pub id: u64,
    pub pane_ids: Vec<PaneId>,
    pub layout_template: Option<String>,
}

/// A session owns every pane exclusively; a client holds only a weak
/// reference (a pane id). Mutation of the registry/window map is serialized
/// by this struct's own lock; panes themselves are locked independently so
/// the PTY multiplexer never has to hold the session lock across a `poll`.
pub struct Session {
    next_pane_id: Mutex<PaneId>,
    next_window_id: Mutex<u64>,
    panes: Mutex<HashMap<PaneId, Arc<Mutex<Pane>>>>,
    windows: Mutex<HashMap<u64, Window>>,
    master_client: Mutex<Option<String>>,
    clipboard_store: Mutex<HashMap<char, String>>,
    clipboard_tx: broadcast::Sender<ClipboardBroadcast>,
}

impl Session {
    pub fn new() -> Self {
        let (clipboard_tx, _rx) = broadcast::channel(16);
        Session {
            next_pane_id: Mutex::new(1),
            next_window_id: Mutex::new(1),
            panes: Mutex::new(HashMap::new()),
            windows: Mutex::new(HashMap::new()),
            master_client: Mutex::new(None),
            clipboard_store: Mutex::new(HashMap::new()),
            clipboard_tx,
        }
    }

    /// §6.1: store a clipboard value set via the IPC admin command and
    /// publish it to every subscriber (e.g. connected WebSocket clients).
    pub fn clipboard_set(&self, kind: char, data: String) {
        self.clipboard_store
            .lock()
            .expect("clipboard lock poisoned")
            .insert(kind, data.clone());
        let _ = self.clipboard_tx.send(ClipboardBroadcast { kind, data });
    }

    pub fn clipboard_get(&self, kind: char) -> Option<String> {
        self.clipboard_store.lock().expect("clipboard lock poisoned").get(&kind).cloned()
    }

    pub fn subscribe_clipboard(&self) -> broadcast::Receiver<ClipboardBroadcast> {
        self.clipboard_tx.subscribe()
    }

    pub fn alloc_pane_id(&self) -> PaneId {
        let mut next = self.next_pane_id.lock().expect("pane id lock poisoned");
        let id = *next;
        *next += 1;
        id
    }

    pub fn alloc_window_id(&self) -> u64 {
        let mut next = self.next_window_id.lock().expect("window id lock poisoned");
        let id = *next;
        *next += 1;
        id
    }

    pub fn insert_pane(&self, pane: Pane) -> PaneId {
        let id = pane.id;
        self.panes
            .lock()
            .expect("panes lock poisoned")
            .insert(id, Arc::new(Mutex::new(pane)));
        id
    }

    /// Removes a pane, dropping the last `Arc` to it (and with it, any
    /// cached delta bytes it held) once in-flight client references are
    /// released.
    pub fn remove_pane(&self, id: PaneId) -> Option<Arc<Mutex<Pane>>> {
        let removed = self.panes.lock().expect("panes lock poisoned").remove(&id);
        let mut windows = self.windows.lock().expect("windows lock poisoned");
        for w in windows.values_mut() {
            w.pane_ids.retain(|&p| p != id);
        }
        removed
    }

    pub fn get_pane(&self, id: PaneId) -> Option<Arc<Mutex<Pane>>> {
        self.panes.lock().expect("panes lock poisoned").get(&id).cloned()
    }

    pub fn pane_ids(&self) -> Vec<PaneId> {
        self.panes.lock().expect("panes lock poisoned").keys().copied().collect()
    }

    pub fn pane_count(&self) -> usize {
        self.panes.lock().expect("panes lock poisoned").len()
    }

    /// Snapshot of `(pane_id, Arc<Mutex<Pane>>)` pairs, fresh each call, for
    /// the multiplexer to poll without holding this lock across a `poll`.
    pub fn pane_snapshot(&self) -> Vec<(PaneId, Arc<Mutex<Pane>>)> {
        self.panes
            .lock()
            .expect("panes lock poisoned")
            .iter()
            .map(|(id, p)| (*id, p.clone()))
            .collect()
    }

    pub fn create_window(&self, layout_template: Option<String>) -> u64 {
        let id = self.alloc_window_id();
        self.windows.lock().expect("windows lock poisoned").insert(
            id,
            Window {
                id,
                pane_ids: Vec::new(),
                layout_template,
            },
        );
        id
    }

    pub fn add_pane_to_window(&self, window_id: u64, pane_id: PaneId) {
        if let Some(w) = self.windows.lock().expect("windows lock poisoned").get_mut(&window_id) {
            w.pane_ids.push(pane_id);
        }
    }

    pub fn window_ids(&self) -> Vec<u64> {
        self.windows.lock().expect("windows lock poisoned").keys().copied().collect()
    }

    pub fn window(&self, id: u64) -> Option<Window> {
        self.windows.lock().expect("windows lock poisoned").get(&id).cloned()
    }

    pub fn window_count(&self) -> usize {
        self.windows.lock().expect("windows lock poisoned").len()
    }

    /// Exactly one client may be master at any time (§3.3). Returns `true`
    /// if the claim succeeded (no current master, or the same client
    /// reclaiming).
    pub fn claim_master(&self, client_id: &str) -> bool {
        let mut master = self.master_client.lock().expect("master lock poisoned");
        match master.as_deref() {
            None => {
                *master = Some(client_id.to_string());
                true
            }
            Some(current) => current == client_id,
        }
    }

    pub fn release_master(&self, client_id: &str) {
        let mut master = self.master_client.lock().expect("master lock poisoned");
        if master.as_deref() == Some(client_id) {
            *master = None;
        }
    }

    pub fn is_master(&self, client_id: &str) -> bool {
        self.master_client.lock().expect("master lock poisoned").as_deref() == Some(client_id)
    }

    pub fn master_client(&self) -> Option<String> {
        self.master_client.lock().expect("master lock poisoned").clone()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pane::PaneOptions;

    fn make_pane(session: &Session) -> PaneId {
        let id = session.alloc_pane_id();
        let pane = Pane::new(PaneOptions {
            id,
            cols: 80,
            rows: 24,
            allow_sync_output: true,
        });
        session.insert_pane(pane)
    }

    #[test]
    fn insert_and_get_pane() {
        let session = Session::new();
        let id = make_pane(&session);
        assert!(session.get_pane(id).is_some());
        assert_eq!(session.pane_count(), 1);
    }

    #[test]
    fn remove_pane_drops_it_from_windows() {
        let session = Session::new();
        let pane_id = make_pane(&session);
        let window_id = session.create_window(None);
        session.add_pane_to_window(window_id, pane_id);
        assert_eq!(session.window(window_id).unwrap().pane_ids, vec![pane_id]);

        session.remove_pane(pane_id);
        assert!(session.get_pane(pane_id).is_none());
        assert!(session.window(window_id).unwrap().pane_ids.is_empty());
    }

    #[test]
    fn only_one_master_at_a_time() {
        let session = Session::new();
        assert!(session.claim_master("alice"));
        assert!(!session.claim_master("bob"));
        assert!(session.claim_master("alice"));
        session.release_master("alice");
        assert!(session.claim_master("bob"));
    }

    #[test]
    fn clipboard_set_is_stored_and_broadcast() {
        let session = Session::new();
        let mut rx = session.subscribe_clipboard();
        session.clipboard_set('c', "world".to_string());
        assert_eq!(session.clipboard_get('c'), Some("world".to_string()));
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.kind, 'c');
        assert_eq!(msg.data, "world");
    }

    #[test]
    fn pane_snapshot_is_independent_of_registry_lock() {
        let session = Session::new();
        make_pane(&session);
        make_pane(&session);
        let snap = session.pane_snapshot();
        assert_eq!(snap.len(), 2);
    }
}
