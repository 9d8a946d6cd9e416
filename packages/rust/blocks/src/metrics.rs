//! Metrics derived from rendered markup: word count, reading time,
//! excerpt, and table of contents.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use pagesmith_shared::TocEntry;

/// Reading speed used for reading-time estimates.
pub const WORDS_PER_MINUTE: usize = 200;

/// Default excerpt length, in characters.
pub const EXCERPT_LENGTH: usize = 200;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));

/// Markup reduced to its text: tags dropped, common entities decoded,
/// whitespace collapsed.
pub fn strip_tags(html: &str) -> String {
    let text = TAG_RE.replace_all(html, " ");
    let text = text
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn count_words(html: &str) -> usize {
    TAG_RE.replace_all(html, " ").split_whitespace().count()
}

/// Minutes to read `words` words: rounded up, never less than one.
pub fn reading_time_for(words: usize) -> u32 {
    words.div_ceil(WORDS_PER_MINUTE).max(1) as u32
}

pub fn calculate_reading_time(html: &str) -> u32 {
    reading_time_for(count_words(html))
}

/// Plain-text excerpt of at most `limit` characters.
///
/// Text longer than `limit` is cut at the last sentence end if that falls
/// past 70% of the limit; otherwise at the last word boundary, with `...`.
pub fn generate_excerpt(html: &str, limit: usize) -> String {
    let text = strip_tags(html);
    if text.chars().count() <= limit {
        return text;
    }

    let cut: String = text.chars().take(limit).collect();

    if let Some(pos) = cut.rfind(['.', '!', '?']) {
        if cut[..pos].chars().count() > limit * 7 / 10 {
            return cut[..=pos].to_string();
        }
    }

    match cut.rfind(char::is_whitespace) {
        Some(pos) => format!("{}...", cut[..pos].trim_end()),
        None => format!("{cut}..."),
    }
}

/// Headings with an `id`, in document order.
pub fn extract_toc(html: &str) -> Vec<TocEntry> {
    let Ok(selector) = Selector::parse("h1[id], h2[id], h3[id]") else {
        return Vec::new();
    };

    let fragment = Html::parse_fragment(html);
    fragment
        .select(&selector)
        .filter_map(|el| {
            let level = el.value().name().strip_prefix('h')?.parse::<u8>().ok()?;
            let id = el.value().attr("id").filter(|id| !id.is_empty())?.to_string();
            let text = el.text().collect::<String>().trim().to_string();
            Some(TocEntry { level, id, text })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[test]
    fn reading_time_rounds_up_with_floor() {
        assert_eq!(calculate_reading_time(&words(400)), 2);
        assert_eq!(calculate_reading_time(&words(50)), 1);
        assert_eq!(calculate_reading_time(&words(401)), 3);
        assert_eq!(calculate_reading_time(""), 1);
    }

    #[test]
    fn word_count_ignores_tags() {
        let html = "<p>Hello <strong>brave</strong> new</p>\n<ul>\n<li>world</li>\n</ul>";
        assert_eq!(count_words(html), 4);
        assert_eq!(count_words("<p>a</p><p>b</p>"), 2);
    }

    #[test]
    fn short_text_is_returned_whole() {
        assert_eq!(
            generate_excerpt("<p>Short &amp; sweet.</p>", 200),
            "Short & sweet."
        );
    }

    #[test]
    fn excerpt_prefers_late_sentence_boundary() {
        // Sentence ends at char 90 of a 100-char limit.
        let first = format!("{}.", "a".repeat(89));
        let html = format!("<p>{first} {}</p>", "b ".repeat(40));
        let excerpt = generate_excerpt(&html, 100);
        assert_eq!(excerpt, first);
        assert!(!excerpt.ends_with("..."));
    }

    #[test]
    fn excerpt_falls_back_to_word_boundary() {
        // Early sentence end (before 70%), so cut at a word with an ellipsis.
        let html = format!("<p>Hi. {}</p>", "lorem ipsum ".repeat(30));
        let excerpt = generate_excerpt(&html, 50);
        assert!(excerpt.ends_with("..."));
        assert!(excerpt.chars().count() <= 53);
        let body = excerpt.trim_end_matches("...");
        assert!(body.ends_with("lorem") || body.ends_with("ipsum"));
    }

    #[test]
    fn toc_in_document_order() {
        let html = "<h1 id=\"intro\">Intro</h1>\n<p>x</p>\n<h3 id=\"deep\">Deep <em>dive</em></h3>\n<h2 id=\"next\">Next</h2>\n<h2>No id</h2>";
        let toc = extract_toc(html);
        assert_eq!(
            toc,
            vec![
                TocEntry { level: 1, id: "intro".into(), text: "Intro".into() },
                TocEntry { level: 3, id: "deep".into(), text: "Deep dive".into() },
                TocEntry { level: 2, id: "next".into(), text: "Next".into() },
            ]
        );
    }
}
