//! Content sync: remote source → processed posts → content store.
//!
//! Per item: extract metadata, compare edit timestamps, then either reuse the
//! stored copy or fetch blocks, render, and save. Items run in batches of
//! `concurrency`; a failing item is logged and left out of the result set.
//! Indexes are rebuilt from the full result set once every item is done, and
//! stored posts absent from that set are deleted.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use pagesmith_blocks::{BlockProcessor, ProcessedContent};
use pagesmith_client::ContentSource;
use pagesmith_shared::{Post, PostMetadata, PostStatus, PostSummary, RemotePage, Result, SyncConfig};
use pagesmith_storage::ContentStore;

use crate::indexes::{self, summary_from_metadata};
use crate::progress::ProgressReporter;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Counts reported at the end of a sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Posts in the final published set.
    pub total_posts: usize,
    pub published: usize,
    pub scheduled: usize,
    pub drafts: usize,
    /// Posts fetched and re-rendered this run.
    pub updated: usize,
    /// Posts reused unchanged from the store.
    pub skipped: usize,
    /// Posts that failed and were left out.
    pub failed: usize,
    /// Stored posts removed because they are no longer published.
    pub deleted: usize,
    pub elapsed: Duration,
}

enum ItemOutcome {
    Updated(Post),
    Skipped(Post),
}

impl ItemOutcome {
    fn into_post(self) -> Post {
        match self {
            Self::Updated(post) | Self::Skipped(post) => post,
        }
    }
}

// ---------------------------------------------------------------------------
// Change detection
// ---------------------------------------------------------------------------

/// Whether a post must be re-rendered: nothing stored, forced, or the
/// remote edit is strictly newer than the stored one.
pub fn should_update_post(
    existing: Option<&Post>,
    remote_last_edited: DateTime<Utc>,
    force: bool,
) -> bool {
    match existing {
        None => true,
        Some(_) if force => true,
        Some(post) => remote_last_edited > post.last_edited_time,
    }
}

/// Combine metadata with rendered content into the stored record.
pub fn assemble_post(meta: PostMetadata, processed: ProcessedContent) -> Post {
    Post {
        id: meta.id,
        title: meta.title,
        slug: meta.slug,
        status: meta.status,
        category: meta.category,
        tags: meta.tags,
        publish_date: meta.publish_date,
        last_edited_time: meta.last_edited_time,
        excerpt: processed.excerpt,
        content: processed.content,
        reading_time: processed.reading_time,
        word_count: processed.word_count,
        table_of_contents: processed.table_of_contents,
        featured: meta.featured,
        cover_image: meta.cover_image,
        author: meta.author,
        canonical_url: meta.canonical_url,
        order: meta.order,
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct SyncOrchestrator<S> {
    source: S,
    store: ContentStore,
    processor: BlockProcessor,
    config: SyncConfig,
}

impl<S: ContentSource> SyncOrchestrator<S> {
    pub fn new(source: S, config: SyncConfig) -> Self {
        Self {
            store: ContentStore::new(&config.content_dir),
            source,
            processor: BlockProcessor::new(),
            config,
        }
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    /// Full sync of every published post.
    ///
    /// A failed connection test aborts before anything is fetched or written.
    #[instrument(skip_all, fields(force = self.config.force, dry_run = self.config.dry_run))]
    pub async fn sync(&self, progress: &dyn ProgressReporter) -> Result<SyncSummary> {
        let start = Instant::now();

        progress.phase("Testing connection");
        self.source.test_connection().await?;

        progress.phase("Fetching posts");
        let pages = self.source.published_posts().await?;
        let scheduled_pages = self.source.scheduled_posts().await?;
        let drafts = self.source.draft_posts().await?.len();
        info!(
            published = pages.len(),
            scheduled = scheduled_pages.len(),
            drafts,
            "fetched post listings"
        );

        progress.phase("Processing posts");
        let mut summary = SyncSummary {
            drafts,
            ..SyncSummary::default()
        };

        // Slugs are claimed in publish order before anything is written, so a
        // later page with the same slug can never overwrite the first.
        let mut claimed: HashSet<String> = HashSet::new();
        let mut metas: Vec<PostMetadata> = Vec::with_capacity(pages.len());
        for page in &pages {
            match self.source.extract_metadata(page) {
                Ok(meta) if claimed.insert(meta.slug.clone()) => metas.push(meta),
                Ok(meta) => {
                    summary.failed += 1;
                    warn!(slug = %meta.slug, page_id = %page.id, "duplicate slug, keeping the first post");
                    progress.item_failed(&page.id, &format!("duplicate slug '{}'", meta.slug));
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(page_id = %page.id, error = %e, "failed to read post metadata");
                    progress.item_failed(&page.id, &e.to_string());
                }
            }
        }

        let mut posts: Vec<Post> = Vec::with_capacity(metas.len());
        let mut synced: HashSet<String> = HashSet::new();
        let total = metas.len();
        let mut completed = 0;

        for batch in metas.chunks(self.config.concurrency.max(1)) {
            let results = join_all(batch.iter().map(|meta| self.sync_page(meta))).await;

            for (meta, result) in batch.iter().zip(results) {
                completed += 1;
                match result {
                    Ok(outcome) => {
                        match &outcome {
                            ItemOutcome::Updated(_) => summary.updated += 1,
                            ItemOutcome::Skipped(_) => summary.skipped += 1,
                        }
                        let post = outcome.into_post();
                        progress.item_done(&post.slug, completed, total);
                        synced.insert(post.slug.clone());
                        posts.push(post);
                    }
                    Err(e) => {
                        summary.failed += 1;
                        warn!(page_id = %meta.id, slug = %meta.slug, error = %e, "failed to sync post");
                        progress.item_failed(&meta.id, &e.to_string());
                    }
                }
            }
        }

        let scheduled = self.scheduled_summaries(&scheduled_pages);

        progress.phase("Writing indexes");
        indexes::write_indexes(&self.store, &posts, Some(&scheduled), self.config.dry_run)
            .await?;

        progress.phase("Cleaning up");
        summary.deleted = self.cleanup(&synced).await?;

        summary.total_posts = posts.len();
        summary.published = posts.len();
        summary.scheduled = scheduled.len();
        summary.elapsed = start.elapsed();

        info!(
            total_posts = summary.total_posts,
            updated = summary.updated,
            skipped = summary.skipped,
            failed = summary.failed,
            deleted = summary.deleted,
            scheduled = summary.scheduled,
            drafts = summary.drafts,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "sync complete"
        );
        progress.done(&format!(
            "{} posts ({} updated, {} unchanged, {} failed, {} deleted)",
            summary.total_posts, summary.updated, summary.skipped, summary.failed, summary.deleted
        ));

        Ok(summary)
    }

    /// Sync a single post by id, regardless of its edit timestamp, then
    /// rebuild indexes from everything in the store. No cleanup.
    #[instrument(skip_all, fields(page_id = %id, dry_run = self.config.dry_run))]
    pub async fn sync_one(&self, id: &str, progress: &dyn ProgressReporter) -> Result<SyncSummary> {
        let start = Instant::now();

        progress.phase("Testing connection");
        self.source.test_connection().await?;

        progress.phase("Processing post");
        let page = self.source.page(id).await?;
        let meta = self.source.extract_metadata(&page)?;
        let post = self.render(meta).await?;
        progress.item_done(&post.slug, 1, 1);

        progress.phase("Writing indexes");
        let mut published: Vec<Post> = self
            .store
            .load_posts()
            .await?
            .into_iter()
            .filter(|p| p.slug != post.slug && p.status == PostStatus::Published)
            .collect();
        if post.status == PostStatus::Published {
            published.push(post.clone());
        }
        indexes::write_indexes(&self.store, &published, None, self.config.dry_run).await?;

        let summary = SyncSummary {
            total_posts: 1,
            published: usize::from(post.status == PostStatus::Published),
            updated: 1,
            elapsed: start.elapsed(),
            ..SyncSummary::default()
        };
        info!(slug = %post.slug, status = %post.status, "single post synced");
        progress.done(&format!("synced '{}'", post.title));
        Ok(summary)
    }

    async fn sync_page(&self, meta: &PostMetadata) -> Result<ItemOutcome> {
        let existing = match self.store.read_post(&meta.slug).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(slug = %meta.slug, error = %e, "stored copy unreadable, reprocessing");
                None
            }
        };

        if !should_update_post(existing.as_ref(), meta.last_edited_time, self.config.force) {
            if let Some(post) = existing {
                debug!(slug = %post.slug, "unchanged, reusing stored copy");
                return Ok(ItemOutcome::Skipped(post));
            }
        }

        self.render(meta.clone()).await.map(ItemOutcome::Updated)
    }

    /// Fetch blocks, render, and save (unless dry run).
    async fn render(&self, meta: PostMetadata) -> Result<Post> {
        let blocks = self.source.page_blocks(&meta.id).await?;
        let processed = self.processor.process_page(&meta, &blocks);
        let post = assemble_post(meta, processed);

        if self.config.dry_run {
            debug!(slug = %post.slug, "dry run, not saving");
        } else {
            self.store.save_post(&post).await?;
        }
        Ok(post)
    }

    fn scheduled_summaries(&self, pages: &[RemotePage]) -> Vec<PostSummary> {
        pages
            .iter()
            .filter_map(|page| match self.source.extract_metadata(page) {
                Ok(meta) => Some(summary_from_metadata(&meta)),
                Err(e) => {
                    warn!(page_id = %page.id, error = %e, "skipping scheduled post");
                    None
                }
            })
            .collect()
    }

    /// Delete stored posts whose slug is not in `keep`. Returns how many
    /// were (or, in a dry run, would be) deleted.
    async fn cleanup(&self, keep: &HashSet<String>) -> Result<usize> {
        let mut deleted = 0;
        for slug in self.store.list_slugs().await? {
            if keep.contains(&slug) {
                continue;
            }
            if self.config.dry_run {
                info!(%slug, "would delete stale post");
                deleted += 1;
            } else if self.store.delete_post(&slug).await? {
                info!(%slug, "deleted stale post");
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}
