//! Board-scoped variables

use serde::{Deserialize, Serialize};

use crate::types::{ValueType, VariableType};

/// A named typed slot exposed at board scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub data_type: VariableType,
    pub value_type: ValueType,
    #[serde(default)]
    pub default_value: Option<Vec<u8>>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub editable: bool,
    /// Visible to external configuration
    #[serde(default)]
    pub exposed: bool,
    #[serde(default)]
    pub secret: bool,
}

impl Variable {
    pub fn new(id: impl Into<String>, name: impl Into<String>, data_type: VariableType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            data_type,
            value_type: ValueType::Normal,
            default_value: None,
            category: None,
            editable: false,
            exposed: false,
            secret: false,
        }
    }

    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    /// Mark as configurable from outside the board
    pub fn exposed_and_editable(mut self) -> Self {
        self.exposed = true;
        self.editable = true;
        self
    }

    /// Whether an event binding may override this variable
    pub fn is_configurable(&self) -> bool {
        self.exposed && self.editable
    }

    /// Whether `other` has the same shape as this variable
    pub fn same_shape(&self, other: &Variable) -> bool {
        self.data_type == other.data_type && self.value_type == other.value_type
    }
}
