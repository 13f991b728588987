//! Chat transcript data model.
//!
//! Mirrors the host's per-message JSON: the displayed text (`mes`), optional
//! alternative texts (`swipes`) with the active index (`swipe_id`), the author
//! flag, and one variable store per alternative. Fields the core does not
//! know about are kept in [`ChatMessage::extra`] so a load/save round trip
//! never drops host data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prefix shared by every variable this crate derives from tags.
pub const DERIVED_PREFIX: &str = "vhelas_";

/// Per-alternative key/value state attached to a conversation turn.
pub type VariableStore = Map<String, Value>;

/// One turn in the conversation log.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub is_user: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_date: Option<Value>,
    /// Currently displayed text.
    #[serde(default)]
    pub mes: String,
    /// Alternative candidate texts; one is active at a time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swipes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swipe_id: Option<usize>,
    /// Variable stores, indexed like `swipes` (index 0 when there are none).
    #[serde(default)]
    pub variables: Vec<VariableStore>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    /// A user-authored message with a single empty variable store.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            is_user: true,
            mes: text.into(),
            variables: vec![VariableStore::new()],
            ..Default::default()
        }
    }

    /// An assistant-authored message with a single empty variable store.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            is_user: false,
            mes: text.into(),
            variables: vec![VariableStore::new()],
            ..Default::default()
        }
    }

    /// Replace the alternatives of this message (builder pattern).
    ///
    /// The displayed text follows the active alternative and one empty
    /// variable store is allocated per alternative.
    pub fn with_swipes(mut self, swipes: &[&str], active: usize) -> Self {
        let swipes: Vec<String> = swipes.iter().map(|s| (*s).to_string()).collect();
        if let Some(text) = swipes.get(active) {
            self.mes = text.clone();
        }
        self.variables = vec![VariableStore::new(); swipes.len().max(1)];
        self.swipes = Some(swipes);
        self.swipe_id = Some(active);
        self
    }

    /// Set the display name (builder pattern).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Index of the active alternative. Defaults to 0 when absent.
    pub fn active_index(&self) -> usize {
        self.swipe_id.unwrap_or(0)
    }

    /// Variable store of alternative `index`, if the host allocated one.
    pub fn store(&self, index: usize) -> Option<&VariableStore> {
        self.variables.get(index)
    }

    /// Variable store of the active alternative.
    pub fn active_store(&self) -> Option<&VariableStore> {
        self.store(self.active_index())
    }

    /// Mutable variable store of alternative `index`.
    ///
    /// Pads the store list with empty maps when the host allocated fewer
    /// stores than alternatives.
    pub fn store_mut(&mut self, index: usize) -> &mut VariableStore {
        if self.variables.len() <= index {
            self.variables.resize_with(index + 1, VariableStore::new);
        }
        &mut self.variables[index]
    }
}

/// Remove every derived key from `store`. Returns the number removed.
pub fn clear_derived(store: &mut VariableStore) -> usize {
    let before = store.len();
    store.retain(|key, _| !key.starts_with(DERIVED_PREFIX));
    before - store.len()
}
