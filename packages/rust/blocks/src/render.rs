//! Block and rich-text rendering to HTML.

use std::collections::HashMap;

use maud::{Markup, html};
use tracing::debug;

use pagesmith_shared::{RichTextSpan, plain_text, slugify};

use crate::block::{BlockKind, BlockNode};
use crate::list::ListState;

/// Render one span: code, bold, italic, strikethrough, underline from the
/// inside out, then the link around everything.
fn render_span(span: &RichTextSpan) -> Markup {
    let mut markup = html! {
        @for (i, line) in span.plain_text.split('\n').enumerate() {
            @if i > 0 { br; }
            (line)
        }
    };
    let a = &span.annotations;

    if a.code {
        markup = html! { code { (markup) } };
    }
    if a.bold {
        markup = html! { strong { (markup) } };
    }
    if a.italic {
        markup = html! { em { (markup) } };
    }
    if a.strikethrough {
        markup = html! { del { (markup) } };
    }
    if a.underline {
        markup = html! { u { (markup) } };
    }
    if let Some(href) = &span.href {
        markup = html! { a href=(href) { (markup) } };
    }

    markup
}

fn rich_text(spans: &[RichTextSpan]) -> Markup {
    html! {
        @for span in spans { (render_span(span)) }
    }
}

pub fn render_rich_text(spans: &[RichTextSpan]) -> String {
    rich_text(spans).into_string()
}

/// Hands out unique heading anchors within one document: a repeated slug
/// gets `-2`, `-3`, ... appended.
#[derive(Debug, Default)]
struct HeadingIds {
    seen: HashMap<String, usize>,
}

impl HeadingIds {
    fn claim(&mut self, text: &str) -> Option<String> {
        let base = slugify(text);
        if base.is_empty() {
            return None;
        }
        let count = self.seen.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            return Some(base);
        }
        let mut n = *count;
        loop {
            let candidate = format!("{base}-{n}");
            if !self.seen.contains_key(&candidate) {
                self.seen.insert(candidate.clone(), 1);
                return Some(candidate);
            }
            n += 1;
        }
    }
}

/// Render a block sequence, grouping list items under shared wrappers.
pub fn render_blocks(nodes: &[BlockNode]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(nodes.len());
    let mut lists = ListState::default();
    let mut ids = HeadingIds::default();

    for node in nodes {
        parts.extend(lists.enter(node.kind.list_kind()).into_iter().map(String::from));

        let html = render_node(node, &mut ids).into_string();
        if !html.is_empty() {
            parts.push(html);
        }
    }
    if let Some(close) = lists.finish() {
        parts.push(close.to_string());
    }

    parts.join("\n")
}

/// Render a single block. List items render as bare `<li>` elements;
/// wrapping is [`render_blocks`]'s job.
pub fn render_block(node: &BlockNode) -> String {
    render_node(node, &mut HeadingIds::default()).into_string()
}

fn render_node(node: &BlockNode, ids: &mut HeadingIds) -> Markup {
    match &node.kind {
        BlockKind::Paragraph { text } => html! {
            @if !text.is_empty() {
                p { (rich_text(text)) }
            }
        },
        BlockKind::Heading { level, text } => {
            let id = ids.claim(&plain_text(text));
            let body = rich_text(text);
            match *level {
                1 => html! { h1 id=[id] { (body) } },
                2 => html! { h2 id=[id] { (body) } },
                _ => html! { h3 id=[id] { (body) } },
            }
        }
        BlockKind::BulletedListItem { text } | BlockKind::NumberedListItem { text } => {
            // Only code children are carried into the item.
            let nested: Vec<Markup> = node
                .children
                .iter()
                .filter(|c| matches!(c.kind, BlockKind::Code { .. }))
                .map(|c| render_node(c, ids))
                .collect();
            html! {
                li {
                    (rich_text(text))
                    @for child in &nested { (child) }
                }
            }
        }
        BlockKind::Code { language, text } => {
            let slug = slugify(language);
            let class = (!slug.is_empty()).then(|| format!("language-{slug}"));
            html! {
                pre { code class=[class] { (plain_text(text)) } }
            }
        }
        BlockKind::Quote { text } => html! {
            blockquote { (rich_text(text)) }
        },
        BlockKind::Callout { icon, text } => html! {
            div.callout {
                @if let Some(icon) = icon {
                    span.callout-icon { (icon) }
                }
                div.callout-content { (rich_text(text)) }
            }
        },
        BlockKind::Image { url, caption } => html! {
            figure {
                img src=(url) alt=(plain_text(caption)) loading="lazy";
                @if !caption.is_empty() {
                    figcaption { (rich_text(caption)) }
                }
            }
        },
        BlockKind::Equation { expression } => html! {
            div.equation { (expression) }
        },
        BlockKind::Table {
            has_column_header,
            rows,
        } => render_table(*has_column_header, rows),
        BlockKind::Divider => html! { hr; },
        BlockKind::Bookmark { url, caption } => html! {
            div.bookmark {
                a href=(url) {
                    @if caption.is_empty() { (url) } @else { (rich_text(caption)) }
                }
            }
        },
        BlockKind::Embed { url } => html! {
            div.embed { iframe src=(url) loading="lazy" {} }
        },
        BlockKind::Unsupported { block_type } => {
            debug!(block_id = %node.id, %block_type, "unsupported block type, rendering nothing");
            html! {}
        }
    }
}

fn render_table(has_column_header: bool, rows: &[Vec<Vec<RichTextSpan>>]) -> Markup {
    let (head, body) = match rows.split_first() {
        Some((first, rest)) if has_column_header => (Some(first), rest),
        _ => (None, rows),
    };

    html! {
        table {
            @if let Some(head) = head {
                thead { tr { @for cell in head { th { (rich_text(cell)) } } } }
            }
            tbody {
                @for row in body {
                    tr { @for cell in row { td { (rich_text(cell)) } } }
                }
            }
        }
    }
}
