//! Index documents derived from the set of synced posts.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use pagesmith_shared::{
    CategoryIndex, Post, PostMetadata, PostSummary, PostsIndex, Result, TagEntry, TagsIndex,
    slugify,
};
use pagesmith_storage::ContentStore;

/// Newest first; undated posts last.
fn by_date_desc(a: &PostSummary, b: &PostSummary) -> Ordering {
    b.publish_date
        .cmp(&a.publish_date)
        .then_with(|| a.title.cmp(&b.title))
}

/// Listing entry for a post that has metadata only (nothing rendered yet).
pub fn summary_from_metadata(meta: &PostMetadata) -> PostSummary {
    PostSummary {
        id: meta.id.clone(),
        title: meta.title.clone(),
        slug: meta.slug.clone(),
        status: meta.status,
        category: meta.category.clone(),
        tags: meta.tags.clone(),
        publish_date: meta.publish_date,
        last_edited_time: meta.last_edited_time,
        excerpt: meta.excerpt.clone().unwrap_or_default(),
        reading_time: 0,
        featured: meta.featured,
        cover_image: meta.cover_image.clone(),
    }
}

pub fn build_posts_index(posts: &[Post], now: DateTime<Utc>) -> PostsIndex {
    let mut summaries: Vec<PostSummary> = posts.iter().map(Post::summary).collect();
    summaries.sort_by(by_date_desc);
    PostsIndex {
        total: summaries.len(),
        posts: summaries,
        last_updated: now,
    }
}

/// One index per category, keyed by the slugified category name.
pub fn build_category_indexes(posts: &[Post], now: DateTime<Utc>) -> Vec<CategoryIndex> {
    let mut groups: BTreeMap<String, (String, Vec<PostSummary>)> = BTreeMap::new();

    for post in posts {
        let Some(name) = post.category.as_deref() else {
            continue;
        };
        let slug = slugify(name);
        if slug.is_empty() {
            continue;
        }
        groups
            .entry(slug)
            .or_insert_with(|| (name.to_string(), Vec::new()))
            .1
            .push(post.summary());
    }

    groups
        .into_iter()
        .map(|(slug, (category, mut summaries))| {
            summaries.sort_by(by_date_desc);
            CategoryIndex {
                category,
                slug,
                total: summaries.len(),
                posts: summaries,
                last_updated: now,
            }
        })
        .collect()
}

/// Tags by descending frequency, then name.
pub fn build_tags_index(posts: &[Post], now: DateTime<Utc>) -> TagsIndex {
    let mut sorted: Vec<&Post> = posts.iter().collect();
    sorted.sort_by(|a, b| by_date_desc(&a.summary(), &b.summary()));

    let mut by_slug: HashMap<String, TagEntry> = HashMap::new();
    for post in sorted {
        for tag in &post.tags {
            let slug = slugify(tag);
            if slug.is_empty() {
                continue;
            }
            let entry = by_slug.entry(slug.clone()).or_insert_with(|| TagEntry {
                name: tag.clone(),
                slug,
                count: 0,
                posts: Vec::new(),
            });
            if !entry.posts.contains(&post.slug) {
                entry.count += 1;
                entry.posts.push(post.slug.clone());
            }
        }
    }

    let mut tags: Vec<TagEntry> = by_slug.into_values().collect();
    tags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));

    TagsIndex {
        tags,
        last_updated: now,
    }
}

/// Scheduled posts, soonest first.
pub fn build_scheduled_index(scheduled: &[PostSummary], now: DateTime<Utc>) -> PostsIndex {
    let mut posts = scheduled.to_vec();
    posts.sort_by(|a, b| by_date_desc(b, a));
    PostsIndex {
        total: posts.len(),
        posts,
        last_updated: now,
    }
}

/// What [`write_indexes`] produced.
#[derive(Debug, Default, Clone)]
pub struct IndexReport {
    pub posts: usize,
    pub categories: usize,
    pub tags: usize,
    pub scheduled: Option<usize>,
    pub removed_categories: Vec<String>,
}

/// Regenerate every index from `published`.
///
/// `scheduled` of `None` leaves `scheduled.json` as it is; an empty slice
/// removes it. With `dry_run` nothing is written, but the report is the same.
#[instrument(skip_all, fields(published = published.len(), dry_run))]
pub async fn write_indexes(
    store: &ContentStore,
    published: &[Post],
    scheduled: Option<&[PostSummary]>,
    dry_run: bool,
) -> Result<IndexReport> {
    let now = Utc::now();
    let posts_index = build_posts_index(published, now);
    let categories = build_category_indexes(published, now);
    let tags = build_tags_index(published, now);

    let mut report = IndexReport {
        posts: posts_index.total,
        categories: categories.len(),
        tags: tags.tags.len(),
        scheduled: scheduled.map(<[PostSummary]>::len),
        removed_categories: Vec::new(),
    };

    if dry_run {
        debug!("dry run, skipping index writes");
        return Ok(report);
    }

    store.write_posts_index(&posts_index).await?;

    for category in &categories {
        store.write_category_index(category).await?;
    }
    let keep: HashSet<String> = categories.iter().map(|c| c.slug.clone()).collect();
    report.removed_categories = store.remove_stale_categories(&keep).await?;

    store.write_tags_index(&tags).await?;

    match scheduled {
        Some([]) => {
            store.remove_scheduled_index().await?;
        }
        Some(items) => {
            store
                .write_scheduled_index(&build_scheduled_index(items, now))
                .await?;
        }
        None => {}
    }

    info!(
        posts = report.posts,
        categories = report.categories,
        tags = report.tags,
        removed_categories = report.removed_categories.len(),
        "indexes written"
    );
    Ok(report)
}
