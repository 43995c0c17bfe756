//! Nodes: units of computation placed on a board

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::extensions::Extension;
use crate::pin::{normalize_indices, Pin};
use crate::types::{Coordinates, PinType};

/// Quality metrics reported for a node kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeScores {
    pub privacy: u8,
    pub security: u8,
    pub performance: u8,
    pub governance: u8,
    pub reliability: u8,
    pub cost: u8,
}

/// A unit of computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    /// Node-kind identifier
    pub name: String,
    #[serde(default)]
    pub friendly_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub docs: Option<String>,
    #[serde(default)]
    pub pins: BTreeMap<String, Pin>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub comment: Option<String>,
    /// Marks a graph entry point
    #[serde(default)]
    pub start: bool,
    #[serde(default)]
    pub long_running: bool,
    #[serde(default)]
    pub event_callback: bool,
    /// Last validation or execution error
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub scores: Option<NodeScores>,
    /// Owning layer, `None` for the board root
    #[serde(default)]
    pub layer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<Extension>,
}

impl Node {
    /// Create an empty node of the given kind
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            friendly_name: name.clone(),
            name,
            description: String::new(),
            category: String::new(),
            icon: None,
            docs: None,
            pins: BTreeMap::new(),
            coordinates: None,
            comment: None,
            start: false,
            long_running: false,
            event_callback: false,
            error: None,
            scores: None,
            layer: None,
            extension: None,
        }
    }

    /// Add a pin, appending it to the end of its pin type group when it has no index
    pub fn with_pin(mut self, mut pin: Pin) -> Self {
        if pin.index == 0 {
            pin.index = self.next_index(pin.pin_type);
        }
        self.pins.insert(pin.id.clone(), pin);
        self
    }

    pub fn with_coordinates(mut self, coordinates: Coordinates) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = Some(layer.into());
        self
    }

    pub fn as_start(mut self) -> Self {
        self.start = true;
        self
    }

    /// Index that places a new pin after every existing sibling
    pub fn next_index(&self, pin_type: PinType) -> u16 {
        self.pins
            .values()
            .filter(|p| p.pin_type == pin_type)
            .map(|p| p.index)
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Pins of one type, in index order
    pub fn pins_of(&self, pin_type: PinType) -> Vec<&Pin> {
        let mut pins: Vec<&Pin> = self
            .pins
            .values()
            .filter(|p| p.pin_type == pin_type)
            .collect();
        pins.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.id.cmp(&b.id)));
        pins
    }

    /// Find a pin by its name
    pub fn pin_by_name(&self, name: &str) -> Option<&Pin> {
        self.pins.values().find(|p| p.name == name)
    }

    /// Make pin indices dense, letting `claimant` keep its requested slot
    pub fn normalize_pin_indices(&mut self, claimant: Option<&str>) {
        normalize_indices(&mut self.pins, claimant);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VariableType;

    #[test]
    fn test_with_pin_appends_index() {
        let node = Node::new("n1", "add")
            .with_pin(Pin::input("a", "a", VariableType::Integer))
            .with_pin(Pin::input("b", "b", VariableType::Integer))
            .with_pin(Pin::output("sum", "sum", VariableType::Integer));

        assert_eq!(node.pins["a"].index, 1);
        assert_eq!(node.pins["b"].index, 2);
        assert_eq!(node.pins["sum"].index, 1);

        let inputs: Vec<&str> = node
            .pins_of(PinType::Input)
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(inputs, vec!["a", "b"]);
    }

    #[test]
    fn test_node_json_defaults() {
        let node: Node = serde_json::from_str(r#"{"id":"n1","name":"log"}"#).unwrap();
        assert!(node.pins.is_empty());
        assert!(!node.start);
        assert_eq!(node.layer, None);
    }
}
