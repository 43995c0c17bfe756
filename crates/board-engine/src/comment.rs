//! Floating canvas annotations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Coordinates;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommentType {
    Text,
    Image,
    Video,
}

/// A floating annotation on the canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub comment_type: CommentType,
    pub content: String,
    pub coordinates: Coordinates,
    #[serde(default)]
    pub width: Option<f32>,
    #[serde(default)]
    pub height: Option<f32>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Owning layer, `None` for the board root
    #[serde(default)]
    pub layer: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub z_index: Option<i32>,
    #[serde(default)]
    pub is_locked: bool,
}

impl Comment {
    /// Create a text comment at a position
    pub fn text(id: impl Into<String>, content: impl Into<String>, coordinates: Coordinates) -> Self {
        Self {
            id: id.into(),
            comment_type: CommentType::Text,
            content: content.into(),
            coordinates,
            width: None,
            height: None,
            author: None,
            timestamp: None,
            layer: None,
            color: None,
            z_index: None,
            is_locked: false,
        }
    }

    pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = Some(layer.into());
        self
    }

    pub fn with_size(mut self, width: f32, height: f32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }
}
