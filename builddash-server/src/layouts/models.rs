//! Layout documents

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{DashError, Result};

const MAX_NAME_LEN: usize = 255;

/// One widget's position on the dashboard grid.
///
/// Keys beyond `i/x/y/w/h` (`minW`, `static`, ...) are kept as sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub i: String,
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl GridCell {
    pub fn new(i: impl Into<String>, x: i64, y: i64, w: i64, h: i64) -> Self {
        Self {
            i: i.into(),
            x,
            y,
            w,
            h,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout {
    pub id: i64,
    pub name: String,
    pub layout_config: Vec<GridCell>,
    pub widgets_config: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of create and update requests
#[derive(Debug, Clone, Deserialize)]
pub struct LayoutInput {
    pub name: String,
    pub layout_config: Vec<GridCell>,
    #[serde(default)]
    pub widgets_config: Option<JsonValue>,
}

impl LayoutInput {
    pub fn new(name: impl Into<String>, layout_config: Vec<GridCell>) -> Self {
        Self {
            name: name.into(),
            layout_config,
            widgets_config: None,
        }
    }

    pub fn with_widgets(mut self, widgets_config: JsonValue) -> Self {
        self.widgets_config = Some(widgets_config);
        self
    }

    /// Trimmed, non-empty, bounded name.
    pub fn validated_name(&self) -> Result<&str> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(DashError::Validation("layout name cannot be empty".into()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(DashError::Validation(format!(
                "layout name exceeds maximum length of {} characters",
                MAX_NAME_LEN
            )));
        }
        Ok(name)
    }
}
