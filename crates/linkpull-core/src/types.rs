use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::envelope::EnvelopeShape;

/// One item returned by the API. Business fields are opaque to the engine.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Deduplication and cursor key extracted from a record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(value: impl Into<String>) -> Self {
        Identifier(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(v: &str) -> Self {
        Identifier(v.to_string())
    }
}

impl From<String> for Identifier {
    fn from(v: String) -> Self {
        Identifier(v)
    }
}

/// Direction for cursor pagination over a message history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    /// Older items; the cursor advances to the last item of each page.
    #[default]
    Before,
    /// Newer items; the cursor advances to the first item of each page.
    After,
    /// Items on both sides of the cursor. Single page only.
    Around,
}

impl Direction {
    /// The value sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Before => "Before",
            Direction::After => "After",
            Direction::Around => "Around",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "before" => Ok(Direction::Before),
            "after" => Ok(Direction::After),
            "around" => Ok(Direction::Around),
            other => Err(format!(
                "invalid direction '{other}': expected one of Before, After, Around"
            )),
        }
    }
}

/// Where the next page starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CursorPosition {
    Id(Identifier),
    Offset(u64),
    Page(u64),
}

impl CursorPosition {
    /// The query parameter value for this position.
    pub fn to_param(&self) -> String {
        match self {
            CursorPosition::Id(id) => id.to_string(),
            CursorPosition::Offset(n) | CursorPosition::Page(n) => n.to_string(),
        }
    }
}

/// One page request. The paginator rebuilds it for every page with the
/// current cursor substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub resource_id: String,
    pub cursor: Option<String>,
    /// Query parameters sent with every page (paging params included).
    pub extra_params: BTreeMap<String, String>,
    pub page_size: usize,
}

impl FetchRequest {
    pub fn new(resource_id: impl Into<String>, page_size: usize) -> Self {
        Self {
            resource_id: resource_id.into(),
            cursor: None,
            extra_params: BTreeMap::new(),
            page_size,
        }
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.insert(key.into(), value.into());
        self
    }
}

/// Items from one response, plus the envelope they were found in.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub items: Vec<Record>,
    pub shape: EnvelopeShape,
}

impl FetchResult {
    pub fn new(items: Vec<Record>, shape: EnvelopeShape) -> Self {
        Self { items, shape }
    }

    pub fn direct(items: Vec<Record>) -> Self {
        Self::new(items, EnvelopeShape::Direct)
    }
}
