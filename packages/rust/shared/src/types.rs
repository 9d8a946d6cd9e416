//! Core domain types: posts, their metadata, and the index documents
//! written to the content store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// PostStatus
// ---------------------------------------------------------------------------

/// Editorial status of a post, as set in the remote source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PostStatus {
    Draft,
    Scheduled,
    Published,
    Archived,
}

impl PostStatus {
    /// The option name used for this status in the remote select property.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Scheduled => "Scheduled",
            Self::Published => "Published",
            Self::Archived => "Archived",
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "scheduled" => Ok(Self::Scheduled),
            "published" => Ok(Self::Published),
            "archived" => Ok(Self::Archived),
            other => Err(format!("unknown post status '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// TocEntry
// ---------------------------------------------------------------------------

/// A heading in a post's table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    /// Heading level (1–3).
    pub level: u8,
    /// Anchor id of the heading element.
    pub id: String,
    /// Heading text.
    pub text: String,
}

// ---------------------------------------------------------------------------
// PostMetadata / Post
// ---------------------------------------------------------------------------

/// Metadata extracted from a remote page's properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMetadata {
    /// Remote page id (immutable identity).
    pub id: String,
    pub title: String,
    pub slug: String,
    pub status: PostStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<DateTime<Utc>>,
    /// Authoritative change marker from the remote source.
    pub last_edited_time: DateTime<Utc>,
    /// Hand-written excerpt, if the author set one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<f64>,
}

/// A fully processed post: the record persisted as `posts/<slug>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub status: PostStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<DateTime<Utc>>,
    pub last_edited_time: DateTime<Utc>,
    pub excerpt: String,
    /// Rendered markup.
    pub content: String,
    /// Minutes, at least 1.
    pub reading_time: u32,
    pub word_count: usize,
    #[serde(default)]
    pub table_of_contents: Vec<TocEntry>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<f64>,
}

impl Post {
    /// Listing view of this post (no body, no TOC).
    pub fn summary(&self) -> PostSummary {
        PostSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            slug: self.slug.clone(),
            status: self.status,
            category: self.category.clone(),
            tags: self.tags.clone(),
            publish_date: self.publish_date,
            last_edited_time: self.last_edited_time,
            excerpt: self.excerpt.clone(),
            reading_time: self.reading_time,
            featured: self.featured,
            cover_image: self.cover_image.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Index documents
// ---------------------------------------------------------------------------

/// A post as it appears in index documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostSummary {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub status: PostStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<DateTime<Utc>>,
    pub last_edited_time: DateTime<Utc>,
    pub excerpt: String,
    pub reading_time: u32,
    #[serde(default)]
    pub featured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
}

/// `posts.json` and `scheduled.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostsIndex {
    pub posts: Vec<PostSummary>,
    pub total: usize,
    pub last_updated: DateTime<Utc>,
}

/// `categories/<slug>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryIndex {
    pub category: String,
    pub slug: String,
    pub posts: Vec<PostSummary>,
    pub total: usize,
    pub last_updated: DateTime<Utc>,
}

/// One tag with the slugs of the posts carrying it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagEntry {
    pub name: String,
    pub slug: String,
    pub count: usize,
    pub posts: Vec<String>,
}

/// `tags.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagsIndex {
    pub tags: Vec<TagEntry>,
    pub last_updated: DateTime<Utc>,
}
