//! Incremental site build on top of the content store and [`BuildCache`].
//!
//! Output plan:
//!
//! | output                              | depends on                |
//! |-------------------------------------|---------------------------|
//! | `posts/<slug>/index.html`           | `posts/<slug>.json`       |
//! | `index.html`, `rss.xml`, `sitemap.xml` | `posts.json`           |
//! | `category/<slug>/index.html`        | `categories/<slug>.json`  |
//! | `tag/<slug>/index.html`             | `tags.json`, `posts.json` |
//! | static assets                       | the source asset          |
//!
//! Templates are not tracked per output: any template change, or `force`,
//! turns the run into a full rebuild.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::try_join_all;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use pagesmith_shared::{
    BuildConfig, CategoryIndex, PagesmithError, Post, PostSummary, PostsIndex, Result, TagEntry,
};
use pagesmith_storage::ContentStore;

use crate::build_cache::{BuildCache, DependencySnapshot};
use crate::progress::ProgressReporter;

// ---------------------------------------------------------------------------
// Renderer seam
// ---------------------------------------------------------------------------

/// Site-wide values passed to every render call.
#[derive(Debug, Clone)]
pub struct SiteContext {
    pub url: String,
    pub title: String,
}

/// Turns content into page markup. Templating lives behind this trait.
pub trait SiteRenderer: Send + Sync {
    fn render_post(&self, post: &Post, site: &SiteContext) -> Result<String>;
    fn render_home(&self, index: &PostsIndex, site: &SiteContext) -> Result<String>;
    fn render_category(&self, category: &CategoryIndex, site: &SiteContext) -> Result<String>;
    fn render_tag(&self, tag: &TagEntry, posts: &[PostSummary], site: &SiteContext)
    -> Result<String>;
    fn render_feed(&self, index: &PostsIndex, site: &SiteContext) -> Result<String>;
    fn render_sitemap(&self, index: &PostsIndex, site: &SiteContext) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    /// Outputs written this run.
    pub rebuilt: Vec<PathBuf>,
    /// Outputs left as they were.
    pub skipped: usize,
    pub assets_copied: usize,
    pub assets_skipped: usize,
    pub full_rebuild: bool,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct IncrementalBuilder<R> {
    config: BuildConfig,
    renderer: R,
    store: ContentStore,
    site: SiteContext,
}

impl<R: SiteRenderer> IncrementalBuilder<R> {
    pub fn new(config: BuildConfig, renderer: R) -> Self {
        Self {
            store: ContentStore::new(&config.content_dir),
            site: SiteContext {
                url: config.site_url.clone(),
                title: config.site_title.clone(),
            },
            config,
            renderer,
        }
    }

    #[instrument(skip_all, fields(output = %self.config.output_dir.display(), force = self.config.force))]
    pub async fn build(&self, progress: &dyn ProgressReporter) -> Result<BuildReport> {
        let start = Instant::now();

        progress.phase("Loading build cache");
        let mut cache = BuildCache::load(&self.config.cache_file).await;

        let templates_changed = self.templates_changed(&mut cache).await;
        let full = self.config.force || templates_changed;
        if full {
            info!(force = self.config.force, templates_changed, "full rebuild");
        }

        let index = self.store.read_posts_index().await?.ok_or_else(|| {
            PagesmithError::validation(format!(
                "no posts index in {}; run `pagesmith sync` first",
                self.store.root().display()
            ))
        })?;

        let mut report = BuildReport {
            full_rebuild: full,
            ..BuildReport::default()
        };

        progress.phase("Rendering posts");
        self.build_posts(&mut cache, full, &index, &mut report, progress)
            .await?;

        progress.phase("Rendering listings");
        self.build_listings(&mut cache, full, &index, &mut report)
            .await?;

        progress.phase("Copying assets");
        let cache = Arc::new(Mutex::new(cache));
        self.copy_assets(cache.clone(), full, &mut report).await?;

        cache.lock().await.save().await?;

        report.elapsed = start.elapsed();
        info!(
            rebuilt = report.rebuilt.len(),
            skipped = report.skipped,
            assets_copied = report.assets_copied,
            assets_skipped = report.assets_skipped,
            full_rebuild = report.full_rebuild,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "build complete"
        );
        progress.done(&format!(
            "{} files written, {} unchanged, {} assets copied",
            report.rebuilt.len(),
            report.skipped,
            report.assets_copied
        ));

        Ok(report)
    }

    /// Check every template against the cache. All of them are hashed so
    /// the cache is current for the next run.
    async fn templates_changed(&self, cache: &mut BuildCache) -> bool {
        let mut changed = false;
        for template in list_files(&self.config.templates_dir) {
            if cache.has_changed(&template).await {
                debug!(template = %template.display(), "template changed");
                changed = true;
            }
        }
        changed
    }

    async fn build_posts(
        &self,
        cache: &mut BuildCache,
        full: bool,
        index: &PostsIndex,
        report: &mut BuildReport,
        progress: &dyn ProgressReporter,
    ) -> Result<()> {
        let total = index.posts.len();

        for (i, summary) in index.posts.iter().enumerate() {
            let output = self
                .config
                .output_dir
                .join("posts")
                .join(&summary.slug)
                .join("index.html");
            let deps = vec![self.store.post_path(&summary.slug)];

            if !full && !cache.should_rebuild_file(&output, &deps).await {
                report.skipped += 1;
                continue;
            }

            let Some(post) = self.store.read_post(&summary.slug).await? else {
                warn!(slug = %summary.slug, "post listed in index but missing from store");
                continue;
            };
            let html = self.renderer.render_post(&post, &self.site)?;
            self.emit(cache, &output, &deps, &html, report).await?;
            progress.item_done(&summary.slug, i + 1, total);
        }

        Ok(())
    }

    async fn build_listings(
        &self,
        cache: &mut BuildCache,
        full: bool,
        index: &PostsIndex,
        report: &mut BuildReport,
    ) -> Result<()> {
        let out = &self.config.output_dir;
        let index_deps = vec![self.store.posts_index_path()];

        let home = out.join("index.html");
        if full || cache.should_rebuild_file(&home, &index_deps).await {
            let html = self.renderer.render_home(index, &self.site)?;
            self.emit(cache, &home, &index_deps, &html, report).await?;
        } else {
            report.skipped += 1;
        }

        let feed = out.join("rss.xml");
        if full || cache.should_rebuild_file(&feed, &index_deps).await {
            let xml = self.renderer.render_feed(index, &self.site)?;
            self.emit(cache, &feed, &index_deps, &xml, report).await?;
        } else {
            report.skipped += 1;
        }

        let sitemap = out.join("sitemap.xml");
        if full || cache.should_rebuild_file(&sitemap, &index_deps).await {
            let xml = self.renderer.render_sitemap(index, &self.site)?;
            self.emit(cache, &sitemap, &index_deps, &xml, report).await?;
        } else {
            report.skipped += 1;
        }

        for slug in self.store.category_slugs().await? {
            let output = out.join("category").join(&slug).join("index.html");
            let deps = vec![self.store.category_index_path(&slug)];
            if !full && !cache.should_rebuild_file(&output, &deps).await {
                report.skipped += 1;
                continue;
            }
            let Some(category) = self.store.read_category_index(&slug).await? else {
                continue;
            };
            let html = self.renderer.render_category(&category, &self.site)?;
            self.emit(cache, &output, &deps, &html, report).await?;
        }

        let tags = self.store.read_tags_index().await?.map(|t| t.tags).unwrap_or_default();
        let tag_deps = vec![self.store.tags_index_path(), self.store.posts_index_path()];
        for tag in &tags {
            let output = out.join("tag").join(&tag.slug).join("index.html");
            if !full && !cache.should_rebuild_file(&output, &tag_deps).await {
                report.skipped += 1;
                continue;
            }
            let posts: Vec<PostSummary> = index
                .posts
                .iter()
                .filter(|p| tag.posts.contains(&p.slug))
                .cloned()
                .collect();
            let html = self.renderer.render_tag(tag, &posts, &self.site)?;
            self.emit(cache, &output, &tag_deps, &html, report).await?;
        }

        Ok(())
    }

    /// Copy static assets concurrently; the cache is shared behind a mutex.
    async fn copy_assets(
        &self,
        cache: Arc<Mutex<BuildCache>>,
        full: bool,
        report: &mut BuildReport,
    ) -> Result<()> {
        let root = &self.config.static_dir;
        let files = list_files(root);
        if files.is_empty() {
            return Ok(());
        }

        let copies = files.into_iter().map(|source| {
            let cache = cache.clone();
            let target = source
                .strip_prefix(root)
                .ok()
                .map(|rel| self.config.output_dir.join(rel));

            async move {
                let Some(target) = target else {
                    return Ok(false);
                };
                let deps = vec![source.clone()];

                let snapshot = DependencySnapshot::capture(&target, &deps).await;
                if !full && !cache.lock().await.should_rebuild(&snapshot) {
                    return Ok(false);
                }

                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| PagesmithError::io(parent, e))?;
                }
                tokio::fs::copy(&source, &target)
                    .await
                    .map_err(|e| PagesmithError::io(&target, e))?;

                let snapshot = DependencySnapshot::capture(&target, &deps).await;
                cache.lock().await.record_generated(&snapshot);
                Ok::<bool, PagesmithError>(true)
            }
        });

        for copied in try_join_all(copies).await? {
            if copied {
                report.assets_copied += 1;
            } else {
                report.assets_skipped += 1;
            }
        }
        Ok(())
    }

    async fn emit(
        &self,
        cache: &mut BuildCache,
        output: &Path,
        deps: &[PathBuf],
        content: &str,
        report: &mut BuildReport,
    ) -> Result<()> {
        write_output(output, content).await?;
        cache.mark_file_generated(output, deps).await;
        report.rebuilt.push(output.to_path_buf());
        Ok(())
    }
}

async fn write_output(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PagesmithError::io(parent, e))?;
    }
    tokio::fs::write(path, content)
        .await
        .map_err(|e| PagesmithError::io(path, e))
}

/// Regular files under `dir`, sorted. A missing directory has no files.
fn list_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        return Vec::new();
    }
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;
    use pagesmith_shared::PostStatus;

    use super::*;
    use crate::indexes;
    use crate::progress::SilentProgress;

    #[derive(Default)]
    struct CountingRenderer {
        posts: AtomicUsize,
        listings: AtomicUsize,
    }

    impl SiteRenderer for CountingRenderer {
        fn render_post(&self, post: &Post, _site: &SiteContext) -> Result<String> {
            self.posts.fetch_add(1, Ordering::SeqCst);
            Ok(format!("<h1>{}</h1>{}", post.title, post.content))
        }
        fn render_home(&self, index: &PostsIndex, site: &SiteContext) -> Result<String> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{}: {} posts", site.title, index.total))
        }
        fn render_category(&self, category: &CategoryIndex, _site: &SiteContext) -> Result<String> {
            Ok(category.category.clone())
        }
        fn render_tag(
            &self,
            tag: &TagEntry,
            posts: &[PostSummary],
            _site: &SiteContext,
        ) -> Result<String> {
            Ok(format!("{} ({})", tag.name, posts.len()))
        }
        fn render_feed(&self, _index: &PostsIndex, _site: &SiteContext) -> Result<String> {
            Ok("<rss/>".into())
        }
        fn render_sitemap(&self, _index: &PostsIndex, _site: &SiteContext) -> Result<String> {
            Ok("<urlset/>".into())
        }
    }

    fn post(slug: &str) -> Post {
        Post {
            id: slug.into(),
            title: slug.to_uppercase(),
            slug: slug.into(),
            status: PostStatus::Published,
            category: Some("Notes".into()),
            tags: vec!["rust".into()],
            publish_date: Some(Utc::now()),
            last_edited_time: Utc::now(),
            excerpt: String::new(),
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

    fn config(root: &Path) -> BuildConfig {
        BuildConfig {
            content_dir: root.join("content"),
            templates_dir: root.join("templates"),
            static_dir: root.join("static"),
            output_dir: root.join("dist"),
            cache_file: root.join(".build-cache.json"),
            site_url: "https://blog.example.com".into(),
            site_title: "Blog".into(),
            force: false,
        }
    }

    async fn seed(root: &Path, posts: &[Post]) {
        let store = ContentStore::new(root.join("content"));
        for p in posts {
            store.save_post(p).await.unwrap();
        }
        indexes::write_indexes(&store, posts, Some(&[]), false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn second_build_skips_everything() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        seed(root, &[post("a"), post("b")]).await;
        std::fs::create_dir_all(root.join("static/css")).unwrap();
        std::fs::write(root.join("static/css/site.css"), "body{}").unwrap();

        let builder = IncrementalBuilder::new(config(root), CountingRenderer::default());
        let first = builder.build(&SilentProgress).await.unwrap();

        // 2 posts + home + rss + sitemap + 1 category + 1 tag
        assert_eq!(first.rebuilt.len(), 7);
        assert_eq!(first.assets_copied, 1);
        assert!(root.join("dist/posts/a/index.html").exists());
        assert!(root.join("dist/css/site.css").exists());
        assert!(root.join(".build-cache.json").exists());

        let second = builder.build(&SilentProgress).await.unwrap();
        assert!(second.rebuilt.is_empty());
        assert_eq!(second.skipped, 7);
        assert_eq!(second.assets_skipped, 1);
        assert!(!second.full_rebuild);
        assert_eq!(builder.renderer.posts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn every_copied_asset_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        seed(root, &[post("a")]).await;
        std::fs::create_dir_all(root.join("static/img")).unwrap();
        for i in 0..20 {
            std::fs::write(root.join(format!("static/img/{i}.txt")), format!("asset {i}")).unwrap();
        }

        let builder = IncrementalBuilder::new(config(root), CountingRenderer::default());
        let first = builder.build(&SilentProgress).await.unwrap();
        assert_eq!(first.assets_copied, 20);

        let cache = BuildCache::load(root.join(".build-cache.json")).await;
        for i in 0..20 {
            let target = root.join(format!("dist/img/{i}.txt"));
            assert!(target.exists());
            assert!(
                cache.generated_files.contains_key(target.to_string_lossy().as_ref()),
                "{} missing from cache",
                target.display()
            );
        }

        let second = builder.build(&SilentProgress).await.unwrap();
        assert_eq!(second.assets_copied, 0);
        assert_eq!(second.assets_skipped, 20);
    }

    #[tokio::test]
    async fn force_rebuilds_everything() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        seed(root, &[post("a")]).await;

        IncrementalBuilder::new(config(root), CountingRenderer::default())
            .build(&SilentProgress)
            .await
            .unwrap();

        let mut cfg = config(root);
        cfg.force = true;
        let report = IncrementalBuilder::new(cfg, CountingRenderer::default())
            .build(&SilentProgress)
            .await
            .unwrap();
        assert!(report.full_rebuild);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.rebuilt.len(), 6);
    }

    #[tokio::test]
    async fn template_change_triggers_full_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        seed(root, &[post("a")]).await;
        std::fs::create_dir_all(root.join("templates")).unwrap();
        std::fs::write(root.join("templates/post.html"), "v1").unwrap();

        let builder = IncrementalBuilder::new(config(root), CountingRenderer::default());
        builder.build(&SilentProgress).await.unwrap();
        assert!(!builder.build(&SilentProgress).await.unwrap().full_rebuild);

        std::fs::write(root.join("templates/post.html"), "version two").unwrap();
        let report = builder.build(&SilentProgress).await.unwrap();
        assert!(report.full_rebuild);
        assert_eq!(report.skipped, 0);
    }

    #[tokio::test]
    async fn missing_index_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let builder = IncrementalBuilder::new(config(dir.path()), CountingRenderer::default());
        let err = builder.build(&SilentProgress).await.unwrap_err();
        assert!(err.to_string().contains("pagesmith sync"));
    }
}
