//! Durable per-node state for resumable syncs
//!
//! All state the sync orchestrator needs between invocations lives here:
//! node configuration, feed health, the error log and the bulk import
//! job with its URL list. Nothing is held in process memory between
//! batches, so a restart loses at most the batch in flight.
//!
//! # Example
//!
//! ```no_run
//! use chiral_hub::storage::checkpoint::{JsonNodeStateStore, NodeStateStore};
//! use std::path::Path;
//!
//! # fn example() -> chiral_hub::Result<()> {
//! let store = JsonNodeStateStore::new(Path::new("./state"))?;
//!
//! if store.try_claim_import("node-1")? {
//!     let state = store.load_or_default("node-1")?;
//!     println!("Claimed import for {}", state.node_id);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::models::NodeState;

const STATE_SUFFIX: &str = ".node.json";

// ============================================================================
// Store Trait
// ============================================================================

/// Persistence of [`NodeState`] records
///
/// `update` is the only read-modify-write primitive and is atomic with
/// respect to other calls on the same store.
pub trait NodeStateStore: Send + Sync {
    /// Load a node's state
    fn load(&self, node_id: &str) -> Result<Option<NodeState>>;

    /// Replace a node's state
    fn save(&self, state: &NodeState) -> Result<()>;

    /// All known nodes
    fn list(&self) -> Result<Vec<NodeState>>;

    /// Remove a node's state; false when absent
    fn delete(&self, node_id: &str) -> Result<bool>;

    /// Apply `f` to a node's state (created empty when absent) and save
    fn update(&self, node_id: &str, f: &mut dyn FnMut(&mut NodeState)) -> Result<NodeState>;

    /// Load a node's state or an empty one
    fn load_or_default(&self, node_id: &str) -> Result<NodeState> {
        Ok(self
            .load(node_id)?
            .unwrap_or_else(|| NodeState::new(node_id)))
    }

    /// Set the import presence flag if it is clear
    ///
    /// Returns whether this caller now owns the node's import.
    fn try_claim_import(&self, node_id: &str) -> Result<bool> {
        let mut claimed = false;
        self.update(node_id, &mut |state: &mut NodeState| {
            if !state.import_in_progress {
                state.import_in_progress = true;
                claimed = true;
            }
        })?;
        Ok(claimed)
    }
}

// ============================================================================
// JSON File Implementation
// ============================================================================

/// One JSON file per node under a state directory
///
/// Writes go to a temp file first and are renamed into place.
pub struct JsonNodeStateStore {
    /// Directory for state files
    state_dir: PathBuf,

    /// Serializes read-modify-write cycles
    lock: Mutex<()>,
}

impl JsonNodeStateStore {
    /// Create a store, creating `state_dir` if needed
    pub fn new(state_dir: &Path) -> Result<Self> {
        fs::create_dir_all(state_dir)?;

        Ok(Self {
            state_dir: state_dir.to_path_buf(),
            lock: Mutex::new(()),
        })
    }

    /// Get state directory
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    fn path_for(&self, node_id: &str) -> PathBuf {
        self.state_dir
            .join(format!("{}{STATE_SUFFIX}", encode_file_stem(node_id)))
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| Error::store("node state lock poisoned"))
    }

    fn read_file(&self, path: &Path) -> Result<Option<NodeState>> {
        if !path.exists() {
            return Ok(None);
        }
        let reader = BufReader::new(File::open(path)?);
        let state = serde_json::from_reader(reader)?;
        Ok(Some(state))
    }

    fn write_file(&self, state: &NodeState) -> Result<()> {
        let filepath = self.path_for(&state.node_id);
        let temp_path = filepath.with_extension("json.tmp");

        let writer = BufWriter::new(File::create(&temp_path)?);
        serde_json::to_writer_pretty(writer, state)?;

        // Atomic rename
        fs::rename(&temp_path, &filepath)?;

        tracing::debug!(node_id = %state.node_id, path = %filepath.display(), "Node state saved");
        Ok(())
    }
}

impl NodeStateStore for JsonNodeStateStore {
    fn load(&self, node_id: &str) -> Result<Option<NodeState>> {
        let _guard = self.guard()?;
        self.read_file(&self.path_for(node_id))
    }

    fn save(&self, state: &NodeState) -> Result<()> {
        let _guard = self.guard()?;
        self.write_file(state)
    }

    fn list(&self) -> Result<Vec<NodeState>> {
        let _guard = self.guard()?;
        let mut states = Vec::new();

        for entry in fs::read_dir(&self.state_dir)? {
            let path = entry?.path();
            let is_state = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(STATE_SUFFIX));
            if !is_state {
                continue;
            }

            match self.read_file(&path) {
                Ok(Some(state)) => states.push(state),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable node state");
                }
            }
        }

        states.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        Ok(states)
    }

    fn delete(&self, node_id: &str) -> Result<bool> {
        let _guard = self.guard()?;
        let path = self.path_for(node_id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        tracing::debug!(node_id = %node_id, "Node state deleted");
        Ok(true)
    }

    fn update(&self, node_id: &str, f: &mut dyn FnMut(&mut NodeState)) -> Result<NodeState> {
        let _guard = self.guard()?;
        let mut state = self
            .read_file(&self.path_for(node_id))?
            .unwrap_or_else(|| NodeState::new(node_id));
        f(&mut state);
        state.node_id = node_id.to_string();
        self.write_file(&state)?;
        Ok(state)
    }
}

/// Encode a node id into a safe file stem
///
/// Alphanumerics, `-` and `_` pass through; everything else becomes `~XX`.
fn encode_file_stem(node_id: &str) -> String {
    let mut out = String::with_capacity(node_id.len());
    for byte in node_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("~{byte:02x}"));
        }
    }
    out
}

// ============================================================================
// Memory Implementation
// ============================================================================

/// In-memory [`NodeStateStore`] for tests and dry runs
#[derive(Default)]
pub struct MemoryNodeStateStore {
    states: Mutex<HashMap<String, NodeState>>,
}

impl MemoryNodeStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn states(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, NodeState>>> {
        self.states
            .lock()
            .map_err(|_| Error::store("node state lock poisoned"))
    }
}

impl NodeStateStore for MemoryNodeStateStore {
    fn load(&self, node_id: &str) -> Result<Option<NodeState>> {
        Ok(self.states()?.get(node_id).cloned())
    }

    fn save(&self, state: &NodeState) -> Result<()> {
        self.states()?
            .insert(state.node_id.clone(), state.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<NodeState>> {
        let mut states: Vec<NodeState> = self.states()?.values().cloned().collect();
        states.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        Ok(states)
    }

    fn delete(&self, node_id: &str) -> Result<bool> {
        Ok(self.states()?.remove(node_id).is_some())
    }

    fn update(&self, node_id: &str, f: &mut dyn FnMut(&mut NodeState)) -> Result<NodeState> {
        let mut states = self.states()?;
        let state = states
            .entry(node_id.to_string())
            .or_insert_with(|| NodeState::new(node_id));
        f(state);
        state.node_id = node_id.to_string();
        Ok(state.clone())
    }
}
