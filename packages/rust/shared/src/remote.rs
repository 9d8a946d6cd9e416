//! Wire types for the remote content API.
//!
//! These mirror the JSON the API returns. Properties are modelled as a closed
//! tagged union ([`PropertyValue`]); property types we do not understand land
//! in [`PropertyValue::Unsupported`] instead of being silently coerced.
//! Blocks stay loosely typed here ([`RawBlock`]) and are decoded by the block
//! processor, so a single malformed block cannot fail a whole page fetch.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// One page of a paginated list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Paginated<T> {
    pub results: Vec<T>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

impl<T> Paginated<T> {
    /// The cursor to request next, or `None` when the listing is exhausted.
    pub fn continuation(&self) -> Option<&str> {
        if self.has_more {
            self.next_cursor.as_deref()
        } else {
            None
        }
    }
}

/// Error body returned by the API alongside a non-2xx status.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

/// A database row ("page") as returned by query and retrieve endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePage {
    pub id: String,
    pub last_edited_time: DateTime<Utc>,
    #[serde(default)]
    pub properties: HashMap<String, PropertyValue>,
}

/// A typed property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyValue {
    Title {
        title: Vec<RichTextSpan>,
    },
    RichText {
        rich_text: Vec<RichTextSpan>,
    },
    Select {
        select: Option<SelectOption>,
    },
    Status {
        status: Option<SelectOption>,
    },
    MultiSelect {
        multi_select: Vec<SelectOption>,
    },
    Date {
        date: Option<DateValue>,
    },
    Checkbox {
        checkbox: bool,
    },
    Files {
        files: Vec<FileObject>,
    },
    Number {
        number: Option<f64>,
    },
    Url {
        url: Option<String>,
    },
    #[serde(other)]
    Unsupported,
}

impl PropertyValue {
    /// The wire name of this property type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Title { .. } => "title",
            Self::RichText { .. } => "rich_text",
            Self::Select { .. } => "select",
            Self::Status { .. } => "status",
            Self::MultiSelect { .. } => "multi_select",
            Self::Date { .. } => "date",
            Self::Checkbox { .. } => "checkbox",
            Self::Files { .. } => "files",
            Self::Number { .. } => "number",
            Self::Url { .. } => "url",
            Self::Unsupported => "unsupported",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Date property payload. `start` is either `YYYY-MM-DD` or an RFC 3339 timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateValue {
    pub start: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

/// File attachment: either hosted by the API (`file`) or an `external` link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileObject {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileUrl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<FileUrl>,
}

impl FileObject {
    pub fn url(&self) -> Option<&str> {
        self.file
            .as_ref()
            .or(self.external.as_ref())
            .map(|f| f.url.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileUrl {
    pub url: String,
}

// ---------------------------------------------------------------------------
// Rich text
// ---------------------------------------------------------------------------

/// A run of text sharing one set of annotations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RichTextSpan {
    #[serde(default)]
    pub plain_text: String,
    #[serde(default)]
    pub annotations: Annotations,
    #[serde(default)]
    pub href: Option<String>,
}

impl RichTextSpan {
    /// Unannotated text span (handy for tests and synthetic content).
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            plain_text: text.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotations {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub strikethrough: bool,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub code: bool,
}

/// Concatenate the plain text of a span list.
pub fn plain_text(spans: &[RichTextSpan]) -> String {
    spans.iter().map(|s| s.plain_text.as_str()).collect()
}

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

/// A content block as delivered by the block-children endpoint.
///
/// The kind-specific payload lives under a key equal to `block_type`
/// (`{"type": "paragraph", "paragraph": {...}}`) and is kept as raw JSON.
/// `children` is filled by the client for blocks whose children matter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBlock {
    pub id: String,
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub has_children: bool,
    #[serde(flatten)]
    pub data: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RawBlock>,
}

impl RawBlock {
    /// Build a block from its type and payload (used by tests and fixtures).
    pub fn new(id: impl Into<String>, block_type: &str, payload: serde_json::Value) -> Self {
        let mut data = HashMap::new();
        data.insert(block_type.to_string(), payload);
        Self {
            id: id.into(),
            block_type: block_type.to_string(),
            has_children: false,
            data,
            children: Vec::new(),
        }
    }

    /// The kind-specific payload, if present.
    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.data.get(&self.block_type)
    }

    /// Whether the client should fetch this block's children.
    pub fn wants_children(&self) -> bool {
        self.has_children
            && matches!(
                self.block_type.as_str(),
                "bulleted_list_item" | "numbered_list_item" | "table"
            )
    }
}
