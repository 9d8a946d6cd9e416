//! Typed content blocks, decoded from the loosely-typed wire form.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use pagesmith_shared::{FileUrl, PagesmithError, RawBlock, Result, RichTextSpan};

use crate::list::ListKind;

/// One decoded block with its (already decoded) children.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockNode {
    pub id: String,
    pub kind: BlockKind,
    pub children: Vec<BlockNode>,
}

/// Every block kind the renderer knows. Anything else is [`BlockKind::Unsupported`].
#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Paragraph {
        text: Vec<RichTextSpan>,
    },
    Heading {
        level: u8,
        text: Vec<RichTextSpan>,
    },
    BulletedListItem {
        text: Vec<RichTextSpan>,
    },
    NumberedListItem {
        text: Vec<RichTextSpan>,
    },
    Code {
        language: String,
        text: Vec<RichTextSpan>,
    },
    Quote {
        text: Vec<RichTextSpan>,
    },
    Callout {
        icon: Option<String>,
        text: Vec<RichTextSpan>,
    },
    Image {
        url: String,
        caption: Vec<RichTextSpan>,
    },
    Equation {
        expression: String,
    },
    Table {
        has_column_header: bool,
        /// Rows of cells; each cell is a rich-text run.
        rows: Vec<Vec<Vec<RichTextSpan>>>,
    },
    Divider,
    Bookmark {
        url: String,
        caption: Vec<RichTextSpan>,
    },
    Embed {
        url: String,
    },
    Unsupported {
        block_type: String,
    },
}

impl BlockKind {
    /// The list this block belongs in, if it is a list item.
    pub fn list_kind(&self) -> Option<ListKind> {
        match self {
            Self::BulletedListItem { .. } => Some(ListKind::Bulleted),
            Self::NumberedListItem { .. } => Some(ListKind::Numbered),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct TextPayload {
    #[serde(default)]
    rich_text: Vec<RichTextSpan>,
}

#[derive(Deserialize)]
struct CodePayload {
    #[serde(default)]
    rich_text: Vec<RichTextSpan>,
    #[serde(default)]
    language: String,
}

#[derive(Deserialize)]
struct CalloutPayload {
    #[serde(default)]
    rich_text: Vec<RichTextSpan>,
    #[serde(default)]
    icon: Option<Icon>,
}

#[derive(Deserialize)]
struct Icon {
    #[serde(default)]
    emoji: Option<String>,
}

#[derive(Deserialize)]
struct MediaPayload {
    #[serde(default)]
    caption: Vec<RichTextSpan>,
    #[serde(default)]
    file: Option<FileUrl>,
    #[serde(default)]
    external: Option<FileUrl>,
}

#[derive(Deserialize)]
struct EquationPayload {
    expression: String,
}

#[derive(Deserialize)]
struct TablePayload {
    #[serde(default)]
    has_column_header: bool,
}

#[derive(Deserialize)]
struct TableRowPayload {
    #[serde(default)]
    cells: Vec<Vec<RichTextSpan>>,
}

#[derive(Deserialize)]
struct LinkPayload {
    url: String,
    #[serde(default)]
    caption: Vec<RichTextSpan>,
}

fn payload<T: DeserializeOwned>(raw: &RawBlock) -> Result<T> {
    let value = raw.payload().ok_or_else(|| {
        PagesmithError::parse(format!(
            "block {} ({}) has no payload",
            raw.id, raw.block_type
        ))
    })?;
    serde_json::from_value(value.clone()).map_err(|e| {
        PagesmithError::parse(format!(
            "block {} ({}) is malformed: {e}",
            raw.id, raw.block_type
        ))
    })
}

fn text(raw: &RawBlock) -> Result<Vec<RichTextSpan>> {
    Ok(payload::<TextPayload>(raw)?.rich_text)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode one block. Unknown kinds decode to [`BlockKind::Unsupported`];
/// a known kind with a malformed payload is an error.
pub fn decode(raw: &RawBlock) -> Result<BlockNode> {
    let kind = match raw.block_type.as_str() {
        "paragraph" => BlockKind::Paragraph { text: text(raw)? },
        "heading_1" => BlockKind::Heading {
            level: 1,
            text: text(raw)?,
        },
        "heading_2" => BlockKind::Heading {
            level: 2,
            text: text(raw)?,
        },
        "heading_3" => BlockKind::Heading {
            level: 3,
            text: text(raw)?,
        },
        "bulleted_list_item" => BlockKind::BulletedListItem { text: text(raw)? },
        "numbered_list_item" => BlockKind::NumberedListItem { text: text(raw)? },
        "code" => {
            let p: CodePayload = payload(raw)?;
            BlockKind::Code {
                language: p.language,
                text: p.rich_text,
            }
        }
        "quote" => BlockKind::Quote { text: text(raw)? },
        "callout" => {
            let p: CalloutPayload = payload(raw)?;
            BlockKind::Callout {
                icon: p.icon.and_then(|i| i.emoji),
                text: p.rich_text,
            }
        }
        "image" => {
            let p: MediaPayload = payload(raw)?;
            let url = p
                .file
                .or(p.external)
                .map(|f| f.url)
                .ok_or_else(|| PagesmithError::parse(format!("image block {} has no url", raw.id)))?;
            BlockKind::Image {
                url,
                caption: p.caption,
            }
        }
        "equation" => {
            let p: EquationPayload = payload(raw)?;
            BlockKind::Equation {
                expression: p.expression,
            }
        }
        "table" => {
            let p: TablePayload = payload(raw)?;
            let rows = raw
                .children
                .iter()
                .filter(|c| c.block_type == "table_row")
                .map(|row| payload::<TableRowPayload>(row).map(|r| r.cells))
                .collect::<Result<Vec<_>>>()?;
            BlockKind::Table {
                has_column_header: p.has_column_header,
                rows,
            }
        }
        "divider" => BlockKind::Divider,
        "bookmark" => {
            let p: LinkPayload = payload(raw)?;
            BlockKind::Bookmark {
                url: p.url,
                caption: p.caption,
            }
        }
        "embed" => {
            let p: LinkPayload = payload(raw)?;
            BlockKind::Embed { url: p.url }
        }
        other => BlockKind::Unsupported {
            block_type: other.to_string(),
        },
    };

    let children = match kind {
        BlockKind::Table { .. } => Vec::new(),
        _ => decode_all(&raw.children),
    };

    Ok(BlockNode {
        id: raw.id.clone(),
        kind,
        children,
    })
}

/// Decode a block list, dropping (and logging) blocks that fail to decode.
pub fn decode_all(raw: &[RawBlock]) -> Vec<BlockNode> {
    raw.iter()
        .filter_map(|block| match decode(block) {
            Ok(node) => Some(node),
            Err(e) => {
                warn!(
                    block_id = %block.id,
                    block_type = %block.block_type,
                    error = %e,
                    "skipping block that failed to decode"
                );
                None
            }
        })
        .collect()
}
