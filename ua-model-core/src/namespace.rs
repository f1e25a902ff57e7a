use crate::builtin::NS0_URI;
use opcua::sync::RwLock;
use tracing::{debug, info};
use ua_model_error::{ModelError, ModelResult};

/// Callback run once when its namespace is cleared.
pub type TeardownHook = Box<dyn FnOnce() + Send + Sync>;

struct NamespaceEntry {
    uri: String,
    teardown: Vec<TeardownHook>,
}

/// Namespace URIs by index, plus the teardown callbacks owned by each
/// namespace. Index 0 is always the OPC UA base namespace.
pub struct NamespaceTable {
    entries: RwLock<Vec<NamespaceEntry>>,
}

impl Default for NamespaceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceTable {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(vec![NamespaceEntry {
                uri: NS0_URI.to_string(),
                teardown: Vec::new(),
            }]),
        }
    }

    /// Register a namespace URI, returning its index. Registering the same URI
    /// twice returns the existing index.
    pub fn register(&self, uri: &str) -> ModelResult<u16> {
        let mut entries = self.entries.write();
        if let Some(index) = entries.iter().position(|e| e.uri == uri) {
            return to_index(index);
        }
        let index = to_index(entries.len())?;
        entries.push(NamespaceEntry {
            uri: uri.to_string(),
            teardown: Vec::new(),
        });
        info!(namespace = index, uri, "Namespace registered");
        Ok(index)
    }

    pub fn index_of(&self, uri: &str) -> Option<u16> {
        self.entries
            .read()
            .iter()
            .position(|e| e.uri == uri)
            .and_then(|i| u16::try_from(i).ok())
    }

    pub fn uri(&self, index: u16) -> Option<String> {
        self.entries
            .read()
            .get(index as usize)
            .map(|e| e.uri.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn indices(&self) -> Vec<u16> {
        (0..self.len()).filter_map(|i| u16::try_from(i).ok()).collect()
    }

    /// Register a callback for when `index` is cleared.
    pub fn on_clear(&self, index: u16, hook: TeardownHook) -> ModelResult<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(index as usize)
            .ok_or_else(|| ModelError::NamespaceNotFound(index.to_string()))?;
        entry.teardown.push(hook);
        Ok(())
    }

    /// Detach the callbacks of `index` so the caller can run them without
    /// holding the table lock.
    pub fn take_teardown_hooks(&self, index: u16) -> Vec<TeardownHook> {
        let mut entries = self.entries.write();
        let hooks = entries
            .get_mut(index as usize)
            .map(|e| std::mem::take(&mut e.teardown))
            .unwrap_or_default();
        debug!(namespace = index, hooks = hooks.len(), "Teardown hooks detached");
        hooks
    }
}

fn to_index(index: usize) -> ModelResult<u16> {
    u16::try_from(index)
        .map_err(|_| ModelError::InvalidStateError("namespace table is full".to_string()))
}
