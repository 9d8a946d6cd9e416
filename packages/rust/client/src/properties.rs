//! Typed property extraction from remote pages.
//!
//! Each accessor is a total mapping over [`PropertyValue`]: it either yields
//! the field, reports the property as absent (`None` / default), or returns a
//! [`PropertyError`]. Nothing is coerced silently.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};

use pagesmith_shared::{
    PagesmithError, PostMetadata, PostStatus, PropertyNames, PropertyValue, RemotePage, Result,
    plain_text, slugify,
};

/// Why a property could not be mapped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PropertyError {
    #[error("required property '{0}' is missing or empty")]
    Missing(String),

    #[error("property '{name}' is of type {found}, expected {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("property '{0}' has a type this client does not understand")]
    Unsupported(String),

    #[error("property '{name}' has an invalid value: {reason}")]
    Malformed { name: String, reason: String },
}

impl From<PropertyError> for PagesmithError {
    fn from(e: PropertyError) -> Self {
        PagesmithError::validation(e.to_string())
    }
}

type Props = HashMap<String, PropertyValue>;

fn mismatch(name: &str, expected: &'static str, value: &PropertyValue) -> PropertyError {
    match value {
        PropertyValue::Unsupported => PropertyError::Unsupported(name.to_string()),
        other => PropertyError::TypeMismatch {
            name: name.to_string(),
            expected,
            found: other.type_name(),
        },
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ---------------------------------------------------------------------------
// Accessors
// ---------------------------------------------------------------------------

/// Title or rich-text property as plain text.
pub fn text(props: &Props, name: &str) -> std::result::Result<Option<String>, PropertyError> {
    match props.get(name) {
        None => Ok(None),
        Some(PropertyValue::Title { title }) => Ok(non_empty(plain_text(title))),
        Some(PropertyValue::RichText { rich_text }) => Ok(non_empty(plain_text(rich_text))),
        Some(other) => Err(mismatch(name, "title or rich_text", other)),
    }
}

/// Select or status property as its option name.
pub fn select(props: &Props, name: &str) -> std::result::Result<Option<String>, PropertyError> {
    match props.get(name) {
        None => Ok(None),
        Some(PropertyValue::Select { select }) => Ok(select.as_ref().map(|o| o.name.clone())),
        Some(PropertyValue::Status { status }) => Ok(status.as_ref().map(|o| o.name.clone())),
        Some(other) => Err(mismatch(name, "select", other)),
    }
}

/// Multi-select option names, in remote order.
pub fn multi_select(props: &Props, name: &str) -> std::result::Result<Vec<String>, PropertyError> {
    match props.get(name) {
        None => Ok(Vec::new()),
        Some(PropertyValue::MultiSelect { multi_select }) => {
            Ok(multi_select.iter().map(|o| o.name.clone()).collect())
        }
        Some(other) => Err(mismatch(name, "multi_select", other)),
    }
}

/// Start of a date property.
pub fn date(
    props: &Props,
    name: &str,
) -> std::result::Result<Option<DateTime<Utc>>, PropertyError> {
    match props.get(name) {
        None | Some(PropertyValue::Date { date: None }) => Ok(None),
        Some(PropertyValue::Date { date: Some(value) }) => parse_date(&value.start)
            .map(Some)
            .ok_or_else(|| PropertyError::Malformed {
                name: name.to_string(),
                reason: format!("unrecognized date '{}'", value.start),
            }),
        Some(other) => Err(mismatch(name, "date", other)),
    }
}

pub fn checkbox(props: &Props, name: &str) -> std::result::Result<bool, PropertyError> {
    match props.get(name) {
        None => Ok(false),
        Some(PropertyValue::Checkbox { checkbox }) => Ok(*checkbox),
        Some(other) => Err(mismatch(name, "checkbox", other)),
    }
}

/// URL of the first attached file.
pub fn first_file_url(
    props: &Props,
    name: &str,
) -> std::result::Result<Option<String>, PropertyError> {
    match props.get(name) {
        None => Ok(None),
        Some(PropertyValue::Files { files }) => {
            Ok(files.iter().find_map(|f| f.url()).map(str::to_string))
        }
        Some(other) => Err(mismatch(name, "files", other)),
    }
}

pub fn number(props: &Props, name: &str) -> std::result::Result<Option<f64>, PropertyError> {
    match props.get(name) {
        None => Ok(None),
        Some(PropertyValue::Number { number }) => Ok(*number),
        Some(other) => Err(mismatch(name, "number", other)),
    }
}

/// URL property; a rich-text property holding a URL is accepted too.
pub fn url(props: &Props, name: &str) -> std::result::Result<Option<String>, PropertyError> {
    match props.get(name) {
        None => Ok(None),
        Some(PropertyValue::Url { url }) => Ok(url.clone().and_then(non_empty)),
        Some(PropertyValue::RichText { rich_text }) => Ok(non_empty(plain_text(rich_text))),
        Some(other) => Err(mismatch(name, "url", other)),
    }
}

/// Parse a date property value: `YYYY-MM-DD` (midnight UTC) or RFC 3339.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Map a remote page onto [`PostMetadata`].
///
/// Title and status are required. The slug falls back to the slugified title
/// when the slug property is empty.
pub fn extract_metadata(page: &RemotePage, names: &PropertyNames) -> Result<PostMetadata> {
    let props = &page.properties;

    let title = text(props, &names.title)?
        .ok_or_else(|| PropertyError::Missing(names.title.clone()))?;

    let status_name = select(props, &names.status)?
        .ok_or_else(|| PropertyError::Missing(names.status.clone()))?;
    let status: PostStatus = status_name.parse().map_err(|e: String| {
        PagesmithError::validation(format!("page {}: {e}", page.id))
    })?;

    let slug = match text(props, &names.slug)? {
        Some(explicit) => slugify(&explicit),
        None => slugify(&title),
    };
    if slug.is_empty() {
        return Err(PagesmithError::validation(format!(
            "page {}: cannot derive a slug from title '{title}'",
            page.id
        )));
    }

    Ok(PostMetadata {
        id: page.id.clone(),
        title,
        slug,
        status,
        category: select(props, &names.category)?,
        tags: multi_select(props, &names.tags)?,
        publish_date: date(props, &names.publish_date)?,
        last_edited_time: page.last_edited_time,
        excerpt: text(props, &names.excerpt)?,
        featured: checkbox(props, &names.featured)?,
        cover_image: first_file_url(props, &names.cover)?,
        author: text(props, &names.author)?,
        canonical_url: url(props, &names.canonical_url)?,
        order: number(props, &names.order)?,
    })
}
