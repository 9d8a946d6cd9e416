//! Block tree to HTML processing.
//!
//! [`BlockProcessor::process_page`] turns a page's raw blocks into rendered
//! markup plus derived metadata. Decoding is per block: a block that fails
//! to decode is logged and dropped, the rest of the page still renders.

pub mod block;
pub mod list;
pub mod metrics;
pub mod render;

use tracing::{debug, instrument};

use pagesmith_shared::{PostMetadata, RawBlock, TocEntry};

pub use block::{BlockKind, BlockNode, decode, decode_all};
pub use list::{ListKind, ListState};
pub use metrics::{
    EXCERPT_LENGTH, calculate_reading_time, count_words, extract_toc, generate_excerpt,
    reading_time_for, strip_tags,
};
pub use render::{render_block, render_blocks, render_rich_text};

/// Output of processing one page.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedContent {
    pub content: String,
    pub reading_time: u32,
    pub word_count: usize,
    pub excerpt: String,
    pub table_of_contents: Vec<TocEntry>,
}

/// Converts block trees into markup.
#[derive(Debug, Clone)]
pub struct BlockProcessor {
    excerpt_length: usize,
}

impl Default for BlockProcessor {
    fn default() -> Self {
        Self {
            excerpt_length: EXCERPT_LENGTH,
        }
    }
}

impl BlockProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_excerpt_length(mut self, length: usize) -> Self {
        self.excerpt_length = length;
        self
    }

    /// Render a page and derive its metrics. A hand-written excerpt in the
    /// metadata wins over the generated one.
    #[instrument(skip_all, fields(slug = %meta.slug, blocks = blocks.len()))]
    pub fn process_page(&self, meta: &PostMetadata, blocks: &[RawBlock]) -> ProcessedContent {
        let nodes = decode_all(blocks);
        let content = render_blocks(&nodes);

        let word_count = count_words(&content);
        let excerpt = meta
            .excerpt
            .clone()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| generate_excerpt(&content, self.excerpt_length));
        let table_of_contents = extract_toc(&content);

        debug!(
            decoded = nodes.len(),
            word_count,
            headings = table_of_contents.len(),
            "page processed"
        );

        ProcessedContent {
            reading_time: reading_time_for(word_count),
            word_count,
            excerpt,
            table_of_contents,
            content,
        }
    }
}
