//! Shared types, error model, and configuration for pagesmith.
//!
//! This crate is the foundation depended on by all other pagesmith crates.
//! It provides:
//! - [`PagesmithError`]: the unified error type
//! - Domain types ([`Post`], [`PostMetadata`], [`PostStatus`], index documents)
//! - Remote wire types ([`RemotePage`], [`PropertyValue`], [`RawBlock`])
//! - Configuration ([`AppConfig`], runtime configs, config loading)
//! - [`slugify`]

pub mod config;
pub mod error;
pub mod remote;
pub mod slug;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BuildConfig, BuildSection, ClientConfig, PropertyNames, RateLimitConfig,
    RemoteConfig, RetryConfig, SyncConfig, SyncSection, config_dir, config_file_path,
    init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{ApiErrorKind, PagesmithError, Result};
pub use remote::{
    Annotations, ApiErrorBody, DateValue, FileObject, FileUrl, Paginated, PropertyValue,
    RawBlock, RemotePage, RichTextSpan, SelectOption, plain_text,
};
pub use slug::slugify;
pub use types::{
    CategoryIndex, Post, PostMetadata, PostStatus, PostSummary, PostsIndex, TagEntry, TagsIndex,
    TocEntry,
};
