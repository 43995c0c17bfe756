//! Pins: typed connection points on nodes and layer boundaries
//!
//! A pin's `connected_to` and `depends_on` sets are owned by the command
//! engine. Nothing outside `connections` mutates them directly, which is what
//! keeps the peer relation symmetric.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::extensions::Extension;
use crate::types::{PinType, ValueType, VariableType};

/// Constraints on the values a pin accepts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PinOptions {
    #[serde(default)]
    pub valid_values: Option<Vec<String>>,
    #[serde(default)]
    pub range: Option<(f64, f64)>,
    #[serde(default)]
    pub step: Option<f64>,
    #[serde(default)]
    pub enforce_schema: Option<bool>,
    #[serde(default)]
    pub enforce_generic_value_type: Option<bool>,
    #[serde(default)]
    pub sensitive: Option<bool>,
}

impl PinOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_valid_values(mut self, values: Vec<String>) -> Self {
        self.valid_values = Some(values);
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range = Some((min, max));
        self
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    pub fn enforce_schema(mut self) -> Self {
        self.enforce_schema = Some(true);
        self
    }

    pub fn enforce_generic_value_type(mut self) -> Self {
        self.enforce_generic_value_type = Some(true);
        self
    }
}

/// A typed connection point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pin {
    /// Unique within the board
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub friendly_name: String,
    #[serde(default)]
    pub description: String,
    pub pin_type: PinType,
    pub data_type: VariableType,
    pub value_type: ValueType,
    /// Structural schema reference for Struct pins
    #[serde(default)]
    pub schema: Option<String>,
    /// 1-based position among siblings of the same pin type
    #[serde(default)]
    pub index: u16,
    /// Peer pin ids
    #[serde(default)]
    pub connected_to: BTreeSet<String>,
    /// Upstream pins that must resolve before this one
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
    /// Raw encoded default, interpreted by the node kind
    #[serde(default)]
    pub default_value: Option<Vec<u8>>,
    #[serde(default)]
    pub options: Option<PinOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<Extension>,
}

impl Pin {
    /// Create an unconnected pin
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        pin_type: PinType,
        data_type: VariableType,
    ) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            friendly_name: name.clone(),
            name,
            description: String::new(),
            pin_type,
            data_type,
            value_type: ValueType::Normal,
            schema: None,
            index: 0,
            connected_to: BTreeSet::new(),
            depends_on: BTreeSet::new(),
            default_value: None,
            options: None,
            extension: None,
        }
    }

    /// Create an input pin
    pub fn input(id: impl Into<String>, name: impl Into<String>, data_type: VariableType) -> Self {
        Self::new(id, name, PinType::Input, data_type)
    }

    /// Create an output pin
    pub fn output(id: impl Into<String>, name: impl Into<String>, data_type: VariableType) -> Self {
        Self::new(id, name, PinType::Output, data_type)
    }

    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn with_index(mut self, index: u16) -> Self {
        self.index = index;
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_options(mut self, options: PinOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_friendly_name(mut self, friendly_name: impl Into<String>) -> Self {
        self.friendly_name = friendly_name.into();
        self
    }

    /// Encode a default value as JSON bytes
    pub fn with_default_value<T: Serialize>(mut self, value: &T) -> Result<Self> {
        self.default_value = Some(serde_json::to_vec(value)?);
        Ok(self)
    }

    /// Whether this pin has any peer
    pub fn is_connected(&self) -> bool {
        !self.connected_to.is_empty()
    }

    fn option(&self, pick: impl Fn(&PinOptions) -> Option<bool>) -> bool {
        self.options.as_ref().and_then(pick).unwrap_or(false)
    }

    /// Drop engine-owned connection state
    pub(crate) fn detached(mut self) -> Self {
        self.connected_to.clear();
        self.depends_on.clear();
        self
    }
}

/// Check whether an output pin may feed an input pin.
///
/// `from_type` and `to_type` are the effective data types, i.e. a Generic pin
/// that already has a concrete peer is passed as that concrete type. Returns
/// the reason on failure.
pub fn check_compatibility(
    from: &Pin,
    from_type: VariableType,
    to: &Pin,
    to_type: VariableType,
) -> std::result::Result<(), String> {
    if from_type == VariableType::Execution || to_type == VariableType::Execution {
        if from_type != to_type {
            return Err("execution pins only connect to execution pins".to_string());
        }
        return Ok(());
    }

    let declared_generic =
        from.data_type == VariableType::Generic || to.data_type == VariableType::Generic;
    if declared_generic {
        let enforce_value_type = from.option(|o| o.enforce_generic_value_type)
            || to.option(|o| o.enforce_generic_value_type);
        if enforce_value_type && from.value_type != to.value_type {
            return Err(format!(
                "value types differ ({:?} vs {:?})",
                from.value_type, to.value_type
            ));
        }
        if from_type == VariableType::Generic || to_type == VariableType::Generic {
            return Ok(());
        }
        if from_type != to_type {
            return Err(format!(
                "generic pin is already narrowed ({:?} vs {:?})",
                from_type, to_type
            ));
        }
        return Ok(());
    }

    if let (Some(a), Some(b)) = (&from.schema, &to.schema) {
        if a != b {
            return Err("schemas differ".to_string());
        }
    }

    let enforce_schema = from.option(|o| o.enforce_schema) || to.option(|o| o.enforce_schema);
    if enforce_schema && (from.schema.is_none() || to.schema.is_none()) {
        return Err("schema is enforced but missing".to_string());
    }

    if from.value_type != to.value_type {
        return Err(format!(
            "value types differ ({:?} vs {:?})",
            from.value_type, to.value_type
        ));
    }

    if from_type != to_type {
        return Err(format!("data types differ ({:?} vs {:?})", from_type, to_type));
    }

    Ok(())
}

/// Renumber pins so each pin type group is dense and 1-based.
///
/// Pins are ordered by their current index. On a tie the `claimant` pin (the
/// one just upserted) wins the slot and its siblings shift down. Remaining
/// ties break by pin id.
pub fn normalize_indices(pins: &mut BTreeMap<String, Pin>, claimant: Option<&str>) {
    for pin_type in [PinType::Input, PinType::Output] {
        let mut group: Vec<(u16, bool, String)> = pins
            .values()
            .filter(|p| p.pin_type == pin_type)
            .map(|p| (p.index, Some(p.id.as_str()) != claimant, p.id.clone()))
            .collect();
        group.sort();

        for (position, (_, _, id)) in group.into_iter().enumerate() {
            if let Some(pin) = pins.get_mut(&id) {
                pin.index = position as u16 + 1;
            }
        }
    }
}

/// Check that every pin type group is numbered 1..=n
pub fn indices_are_dense(pins: &BTreeMap<String, Pin>) -> bool {
    [PinType::Input, PinType::Output].iter().all(|pin_type| {
        let mut indices: Vec<u16> = pins
            .values()
            .filter(|p| p.pin_type == *pin_type)
            .map(|p| p.index)
            .collect();
        indices.sort_unstable();
        indices
            .iter()
            .enumerate()
            .all(|(position, index)| *index == position as u16 + 1)
    })
}
