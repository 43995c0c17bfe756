//! Event bindings
//!
//! An event binds a node of a board (optionally a frozen version of it) to a
//! trigger. The `config` blob is interpreted by whoever owns `event_type`.

use std::collections::BTreeMap;

use board_engine::{Board, Variable, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A trigger bound to a board node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Empty ids are assigned on upsert
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub board_id: String,
    /// `None` binds the working copy
    #[serde(default)]
    pub board_version: Option<Version>,
    pub node_id: String,
    /// Overrides of board variables, keyed by variable id
    #[serde(default)]
    pub variables: BTreeMap<String, Variable>,
    #[serde(default)]
    pub config: Vec<u8>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub priority: u32,
    pub event_type: String,
    #[serde(default)]
    pub event_version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn new(
        name: impl Into<String>,
        board_id: impl Into<String>,
        node_id: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            name: name.into(),
            description: String::new(),
            board_id: board_id.into(),
            board_version: None,
            node_id: node_id.into(),
            variables: BTreeMap::new(),
            config: Vec::new(),
            active: false,
            priority: 0,
            event_type: event_type.into(),
            event_version: (0, 0, 0),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_board_version(mut self, version: Version) -> Self {
        self.board_version = Some(version);
        self
    }

    pub fn with_override(mut self, variable: Variable) -> Self {
        self.variables.insert(variable.id.clone(), variable);
        self
    }

    pub fn activated(mut self) -> Self {
        self.active = true;
        self
    }

    /// Whether an update to this binding retargets it
    pub(crate) fn retargets(&self, previous: &Event) -> bool {
        self.node_id != previous.node_id
            || self.board_id != previous.board_id
            || self.board_version != previous.board_version
    }

    /// Check the binding against the board it triggers
    pub fn check_against(&self, board: &Board) -> Result<(), String> {
        if !board.nodes.contains_key(&self.node_id) {
            return Err(format!(
                "node '{}' does not exist on board '{}' {:?}",
                self.node_id, board.id, board.version
            ));
        }

        for (id, value) in &self.variables {
            let Some(variable) = board.variables.get(id) else {
                return Err(format!("variable '{}' does not exist on board '{}'", id, board.id));
            };
            if !variable.is_configurable() {
                return Err(format!("variable '{}' is not exposed and editable", variable.name));
            }
            if !variable.same_shape(value) {
                return Err(format!(
                    "override of '{}' does not match its {:?}/{:?} shape",
                    variable.name, variable.data_type, variable.value_type
                ));
            }
        }
        Ok(())
    }
}
