//! URL slug generation.

use std::sync::LazyLock;

use regex::Regex;

/// Runs of anything that is not an ASCII letter or digit.
static NON_ALNUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("slug regex"));

/// Turn arbitrary text into a lowercase, ASCII, hyphen-separated slug.
///
/// Non-ASCII characters are transliterated first (`Café` → `cafe`), every run
/// of other characters collapses to a single `-`, and leading/trailing hyphens
/// are dropped. The function is idempotent. Text with no usable characters
/// yields an empty string.
pub fn slugify(text: &str) -> String {
    let ascii = unidecode::unidecode(text).to_lowercase();
    NON_ALNUM_RE
        .replace_all(&ascii, "-")
        .trim_matches('-')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_titles() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("  Rust: Traits & Generics!  "), "rust-traits-generics");
        assert_eq!(slugify("snake_case_title"), "snake-case-title");
    }

    #[test]
    fn collapses_repeats() {
        assert_eq!(slugify("a -- b __ c"), "a-b-c");
        assert_eq!(slugify("---leading and trailing---"), "leading-and-trailing");
    }

    #[test]
    fn transliterates_to_ascii() {
        assert_eq!(slugify("Café Crème"), "cafe-creme");
        assert_eq!(slugify("Über Straße"), "uber-strasse");
    }

    #[test]
    fn empty_when_nothing_usable() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("!!! ???"), "");
    }

    #[test]
    fn idempotent() {
        let inputs = [
            "Hello World",
            "Café -- Crème",
            "already-a-slug",
            "MiXeD 123 __ Case",
            "  ",
            "ünïcödé ☃ snowman",
            "trailing-",
        ];
        for input in inputs {
            let once = slugify(input);
            assert_eq!(slugify(&once), once, "not idempotent for {input:?}");
        }
    }
}
