//! Core value types shared by every board entity
//!
//! These are the small enums and aliases that pins, variables, and boards
//! are built from. Field names serialize in snake_case and enum variants in
//! PascalCase, matching the persisted board format.

use serde::{Deserialize, Serialize};

/// Canvas position (x, y, z)
pub type Coordinates = (f32, f32, f32);

/// Semantic version triple (major, minor, patch)
pub type Version = (u32, u32, u32);

/// Direction of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PinType {
    Input,
    Output,
}

impl PinType {
    pub fn opposite(self) -> Self {
        match self {
            Self::Input => Self::Output,
            Self::Output => Self::Input,
        }
    }
}

/// Data carried by a pin or variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VariableType {
    Boolean,
    Byte,
    Date,
    Execution,
    Float,
    Generic,
    Integer,
    PathBuf,
    String,
    Struct,
}

impl VariableType {
    /// Canvas stroke color used for edges of this type
    pub fn color(&self) -> &'static str {
        match self {
            Self::Boolean => "#e11d48",
            Self::Byte => "#7c3aed",
            Self::Date => "#0891b2",
            Self::Execution => "#94a3b8",
            Self::Float => "#65a30d",
            Self::Generic => "#f8fafc",
            Self::Integer => "#0d9488",
            Self::PathBuf => "#ca8a04",
            Self::String => "#db2777",
            Self::Struct => "#2563eb",
        }
    }
}

/// Container shape of a pin or variable value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Normal,
    Array,
    HashMap,
    HashSet,
}

/// Deployment stage of a board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionStage {
    #[default]
    Dev,
    Int,
    QA,
    PreProd,
    Prod,
}

/// Log verbosity used when a board runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogLevel {
    #[default]
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

/// Which component of a version to increment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionType {
    Major,
    Minor,
    Patch,
}

impl VersionType {
    /// Compute the version that follows `current`
    pub fn bump(self, current: Version) -> Version {
        let (major, minor, patch) = current;
        match self {
            Self::Major => (major + 1, 0, 0),
            Self::Minor => (major, minor + 1, 0),
            Self::Patch => (major, minor, patch + 1),
        }
    }
}
