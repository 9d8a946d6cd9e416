//! File-based content store.
//!
//! Layout under the content root:
//!
//! ```text
//! posts/<slug>.json        full post record
//! posts/<slug>.html        rendered markup
//! posts.json               published index
//! categories/<slug>.json   one index per category
//! tags.json                tag index
//! scheduled.json           scheduled index (only while any exist)
//! ```
//!
//! Post writes are atomic per post: both files are staged under dot-prefixed
//! temp names and renamed into place, so a reader never sees half a record.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use pagesmith_shared::{
    CategoryIndex, PagesmithError, Post, PostsIndex, Result, TagsIndex,
};

const POSTS_DIR: &str = "posts";
const CATEGORIES_DIR: &str = "categories";
const POSTS_INDEX: &str = "posts.json";
const TAGS_INDEX: &str = "tags.json";
const SCHEDULED_INDEX: &str = "scheduled.json";

/// Handle on a content directory.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the store directories if they do not exist.
    pub async fn ensure_layout(&self) -> Result<()> {
        for dir in [self.posts_dir(), self.categories_dir()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| PagesmithError::io(&dir, e))?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Paths
    // -----------------------------------------------------------------------

    pub fn posts_dir(&self) -> PathBuf {
        self.root.join(POSTS_DIR)
    }

    pub fn categories_dir(&self) -> PathBuf {
        self.root.join(CATEGORIES_DIR)
    }

    pub fn post_path(&self, slug: &str) -> PathBuf {
        self.posts_dir().join(format!("{slug}.json"))
    }

    pub fn html_path(&self, slug: &str) -> PathBuf {
        self.posts_dir().join(format!("{slug}.html"))
    }

    pub fn posts_index_path(&self) -> PathBuf {
        self.root.join(POSTS_INDEX)
    }

    pub fn tags_index_path(&self) -> PathBuf {
        self.root.join(TAGS_INDEX)
    }

    pub fn scheduled_index_path(&self) -> PathBuf {
        self.root.join(SCHEDULED_INDEX)
    }

    pub fn category_index_path(&self, slug: &str) -> PathBuf {
        self.categories_dir().join(format!("{slug}.json"))
    }

    // -----------------------------------------------------------------------
    // Posts
    // -----------------------------------------------------------------------

    /// Read one post record. A missing record is `Ok(None)`.
    pub async fn read_post(&self, slug: &str) -> Result<Option<Post>> {
        read_json_opt(&self.post_path(slug)).await
    }

    /// Write a post's record and markup atomically.
    #[instrument(skip_all, fields(slug = %post.slug))]
    pub async fn save_post(&self, post: &Post) -> Result<()> {
        self.ensure_layout().await?;

        let json_path = self.post_path(&post.slug);
        let html_path = self.html_path(&post.slug);
        let json = to_json(post)?;

        let json_tmp = stage(&json_path, json.as_bytes()).await?;
        let html_tmp = match stage(&html_path, post.content.as_bytes()).await {
            Ok(tmp) => tmp,
            Err(e) => {
                let _ = tokio::fs::remove_file(&json_tmp).await;
                return Err(e);
            }
        };

        commit(&html_tmp, &html_path).await?;
        commit(&json_tmp, &json_path).await?;

        debug!(path = %json_path.display(), "post saved");
        Ok(())
    }

    /// Slugs of every stored post record.
    pub async fn list_slugs(&self) -> Result<Vec<String>> {
        let dir = self.posts_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PagesmithError::io(&dir, e)),
        };

        let mut slugs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PagesmithError::io(&dir, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            if let Some(slug) = name.strip_suffix(".json") {
                slugs.push(slug.to_string());
            }
        }

        slugs.sort();
        Ok(slugs)
    }

    /// Every readable post record. Unreadable records are logged and skipped.
    pub async fn load_posts(&self) -> Result<Vec<Post>> {
        let mut posts = Vec::new();
        for slug in self.list_slugs().await? {
            match self.read_post(&slug).await {
                Ok(Some(post)) => posts.push(post),
                Ok(None) => {}
                Err(e) => warn!(%slug, error = %e, "skipping unreadable post record"),
            }
        }
        Ok(posts)
    }

    /// Delete a post's record and markup. Returns whether anything was removed.
    pub async fn delete_post(&self, slug: &str) -> Result<bool> {
        let mut removed = false;
        for path in [self.post_path(slug), self.html_path(slug)] {
            removed |= remove_if_exists(&path).await?;
        }
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Indices
    // -----------------------------------------------------------------------

    pub async fn write_posts_index(&self, index: &PostsIndex) -> Result<()> {
        write_json_atomic(&self.posts_index_path(), index).await
    }

    pub async fn read_posts_index(&self) -> Result<Option<PostsIndex>> {
        read_json_opt(&self.posts_index_path()).await
    }

    pub async fn write_tags_index(&self, index: &TagsIndex) -> Result<()> {
        write_json_atomic(&self.tags_index_path(), index).await
    }

    pub async fn read_tags_index(&self) -> Result<Option<TagsIndex>> {
        read_json_opt(&self.tags_index_path()).await
    }

    pub async fn write_scheduled_index(&self, index: &PostsIndex) -> Result<()> {
        write_json_atomic(&self.scheduled_index_path(), index).await
    }

    pub async fn remove_scheduled_index(&self) -> Result<bool> {
        remove_if_exists(&self.scheduled_index_path()).await
    }

    pub async fn write_category_index(&self, index: &CategoryIndex) -> Result<()> {
        self.ensure_layout().await?;
        write_json_atomic(&self.category_index_path(&index.slug), index).await
    }

    /// Slugs of every stored category index.
    pub async fn category_slugs(&self) -> Result<Vec<String>> {
        let dir = self.categories_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PagesmithError::io(&dir, e)),
        };

        let mut slugs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PagesmithError::io(&dir, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(slug) = name.strip_suffix(".json").filter(|_| !name.starts_with('.')) {
                slugs.push(slug.to_string());
            }
        }

        slugs.sort();
        Ok(slugs)
    }

    pub async fn read_category_index(&self, slug: &str) -> Result<Option<CategoryIndex>> {
        read_json_opt(&self.category_index_path(slug)).await
    }

    /// Delete category indices whose slug is not in `keep`. Returns the removed slugs.
    pub async fn remove_stale_categories(&self, keep: &HashSet<String>) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for slug in self.category_slugs().await? {
            if !keep.contains(&slug) && remove_if_exists(&self.category_index_path(&slug)).await? {
                removed.push(slug);
            }
        }
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

fn to_json<T: Serialize>(data: &T) -> Result<String> {
    serde_json::to_string_pretty(data)
        .map_err(|e| PagesmithError::storage(format!("JSON serialization failed: {e}")))
}

/// Write `bytes` to a dot-prefixed temp file next to `target`.
async fn stage(target: &Path, bytes: &[u8]) -> Result<PathBuf> {
    let dir = target
        .parent()
        .ok_or_else(|| PagesmithError::storage(format!("{} has no parent", target.display())))?;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| PagesmithError::io(dir, e))?;

    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = dir.join(format!(".{name}.{}.tmp", Uuid::now_v7()));

    tokio::fs::write(&temp, bytes)
        .await
        .map_err(|e| PagesmithError::io(&temp, e))?;
    Ok(temp)
}

async fn commit(temp: &Path, target: &Path) -> Result<()> {
    tokio::fs::rename(temp, target)
        .await
        .map_err(|e| PagesmithError::io(target, e))
}

async fn write_json_atomic<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = to_json(data)?;
    let temp = stage(path, json.as_bytes()).await?;
    commit(&temp, path).await
}

async fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PagesmithError::io(path, e)),
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| PagesmithError::parse(format!("{}: {e}", path.display())))
}

async fn remove_if_exists(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(PagesmithError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use pagesmith_shared::{PostStatus, TagEntry};

    use super::*;

    fn post(slug: &str) -> Post {
        Post {
            id: format!("id-{slug}"),
            title: slug.to_uppercase(),
            slug: slug.into(),
            status: PostStatus::Published,
            category: Some("Notes".into()),
            tags: vec!["rust".into()],
            publish_date: Some(Utc::now()),
            last_edited_time: Utc::now(),
            excerpt: "Excerpt.".into(),
            content: format!("<p>{slug}</p>"),
            reading_time: 1,
            word_count: 1,
            table_of_contents: vec![],
            featured: false,
            cover_image: None,
            author: None,
            canonical_url: None,
            order: None,
        }
    }

    #[tokio::test]
    async fn save_and_read_post() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());

        let p = post("hello");
        store.save_post(&p).await.unwrap();

        let read = store.read_post("hello").await.unwrap().expect("stored");
        assert_eq!(read, p);
        let html = std::fs::read_to_string(store.html_path("hello")).unwrap();
        assert_eq!(html, "<p>hello</p>");

        // No temp files left behind.
        let leftovers: Vec<_> = std::fs::read_dir(store.posts_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn missing_post_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        assert!(store.read_post("nope").await.unwrap().is_none());
        assert!(store.list_slugs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        store.save_post(&post("b")).await.unwrap();
        store.save_post(&post("a")).await.unwrap();
        std::fs::write(store.posts_dir().join(".c.json.tmp"), "{}").unwrap();

        assert_eq!(store.list_slugs().await.unwrap(), vec!["a", "b"]);

        assert!(store.delete_post("a").await.unwrap());
        assert!(!store.delete_post("a").await.unwrap());
        assert!(!store.html_path("a").exists());
        assert_eq!(store.list_slugs().await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn load_posts_skips_corrupt_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        store.save_post(&post("good")).await.unwrap();
        std::fs::write(store.post_path("bad"), "{not json").unwrap();

        let posts = store.load_posts().await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].slug, "good");

        assert!(matches!(
            store.read_post("bad").await.unwrap_err(),
            PagesmithError::Parse { .. }
        ));
    }

    #[tokio::test]
    async fn index_files_use_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let now = Utc::now();

        store
            .write_posts_index(&PostsIndex {
                posts: vec![post("x").summary()],
                total: 1,
                last_updated: now,
            })
            .await
            .unwrap();
        store
            .write_tags_index(&TagsIndex {
                tags: vec![TagEntry {
                    name: "rust".into(),
                    slug: "rust".into(),
                    count: 1,
                    posts: vec!["x".into()],
                }],
                last_updated: now,
            })
            .await
            .unwrap();

        let raw = std::fs::read_to_string(store.posts_index_path()).unwrap();
        assert!(raw.contains("\"lastUpdated\""));
        assert!(raw.contains("\"readingTime\""));

        let index = store.read_posts_index().await.unwrap().unwrap();
        assert_eq!(index.total, 1);
        assert_eq!(store.read_tags_index().await.unwrap().unwrap().tags.len(), 1);
    }

    #[tokio::test]
    async fn stale_categories_and_scheduled_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let now = Utc::now();

        for (name, slug) in [("Notes", "notes"), ("Old Stuff", "old-stuff")] {
            store
                .write_category_index(&CategoryIndex {
                    category: name.into(),
                    slug: slug.into(),
                    posts: vec![],
                    total: 0,
                    last_updated: now,
                })
                .await
                .unwrap();
        }
        assert_eq!(store.category_slugs().await.unwrap(), vec!["notes", "old-stuff"]);

        let keep: HashSet<String> = ["notes".to_string()].into_iter().collect();
        let removed = store.remove_stale_categories(&keep).await.unwrap();
        assert_eq!(removed, vec!["old-stuff"]);
        assert!(store.read_category_index("notes").await.unwrap().is_some());

        store
            .write_scheduled_index(&PostsIndex {
                posts: vec![],
                total: 0,
                last_updated: now,
            })
            .await
            .unwrap();
        assert!(store.remove_scheduled_index().await.unwrap());
        assert!(!store.remove_scheduled_index().await.unwrap());
    }
}
