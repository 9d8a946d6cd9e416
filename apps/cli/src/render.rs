//! Page, feed, and sitemap rendering used by `pagesmith build`.
//!
//! Pages come from built-in maud markup unless the templates directory holds
//! an override (`post.html`, `home.html`, `category.html`, `tag.html`), which
//! is filled by `{{key}}` substitution. Feed and sitemap XML go through
//! quick-xml.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

use chrono::SecondsFormat;
use maud::{DOCTYPE, Markup, PreEscaped, html};
use pagesmith_core::{SiteContext, SiteRenderer};
use pagesmith_shared::{
    CategoryIndex, PagesmithError, Post, PostSummary, PostsIndex, Result, TagEntry,
};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use tracing::debug;

const TEMPLATE_NAMES: [&str; 4] = ["post", "home", "category", "tag"];

/// Items in the RSS feed.
const FEED_ITEMS: usize = 20;

pub(crate) struct TemplateRenderer {
    templates: HashMap<&'static str, String>,
}

impl TemplateRenderer {
    /// Load template overrides from `dir`; missing files use built-in markup.
    pub(crate) fn load(dir: &Path) -> Result<Self> {
        let mut templates = HashMap::new();
        for name in TEMPLATE_NAMES {
            let path = dir.join(format!("{name}.html"));
            if path.exists() {
                let body =
                    std::fs::read_to_string(&path).map_err(|e| PagesmithError::io(&path, e))?;
                debug!(template = name, path = %path.display(), "loaded template");
                templates.insert(name, body);
            }
        }
        Ok(Self { templates })
    }

    fn listing(
        &self,
        name: &str,
        heading: &str,
        posts: &[PostSummary],
        site: &SiteContext,
    ) -> Result<String> {
        let items = post_list(posts);

        match self.templates.get(name) {
            Some(template) => fill(
                template,
                &[
                    ("heading", text(heading)),
                    ("posts", items.into_string()),
                    ("site_title", text(&site.title)),
                    ("site_url", text(&site.url)),
                ],
            ),
            None => Ok(page(heading, site, html! {
                h1 { (heading) }
                (items)
            })
            .into_string()),
        }
    }
}

impl SiteRenderer for TemplateRenderer {
    fn render_post(&self, post: &Post, site: &SiteContext) -> Result<String> {
        let date = post
            .publish_date
            .map(|d| d.format("%B %-d, %Y").to_string())
            .unwrap_or_default();

        if let Some(template) = self.templates.get("post") {
            return fill(
                template,
                &[
                    ("title", text(&post.title)),
                    ("slug", text(&post.slug)),
                    ("content", post.content.clone()),
                    ("excerpt", text(&post.excerpt)),
                    ("reading_time", post.reading_time.to_string()),
                    ("date", date),
                    ("category", text(post.category.as_deref().unwrap_or(""))),
                    ("site_title", text(&site.title)),
                    ("site_url", text(&site.url)),
                ],
            );
        }

        Ok(page(&post.title, site, html! {
            article {
                h1 { (post.title) }
                p.meta { (date) " · " (post.reading_time) " min read" }
                (PreEscaped(&post.content))
            }
        })
        .into_string())
    }

    fn render_home(&self, index: &PostsIndex, site: &SiteContext) -> Result<String> {
        self.listing("home", &site.title, &index.posts, site)
    }

    fn render_category(&self, category: &CategoryIndex, site: &SiteContext) -> Result<String> {
        self.listing("category", &category.category, &category.posts, site)
    }

    fn render_tag(
        &self,
        tag: &TagEntry,
        posts: &[PostSummary],
        site: &SiteContext,
    ) -> Result<String> {
        self.listing("tag", &format!("#{}", tag.name), posts, site)
    }

    fn render_feed(&self, index: &PostsIndex, site: &SiteContext) -> Result<String> {
        xml_string(feed_xml(index, site))
    }

    fn render_sitemap(&self, index: &PostsIndex, site: &SiteContext) -> Result<String> {
        xml_string(sitemap_xml(index, site))
    }
}

// ---------------------------------------------------------------------------
// HTML
// ---------------------------------------------------------------------------

fn page(title: &str, site: &SiteContext, body: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (title) " | " (site.title) }
                link rel="alternate" type="application/rss+xml" href="/rss.xml";
            }
            body {
                header.site-header { a href="/" { (site.title) } }
                main { (body) }
            }
        }
    }
}

fn post_list(posts: &[PostSummary]) -> Markup {
    html! {
        ul.posts {
            @for post in posts {
                li {
                    a href={ "/posts/" (post.slug) "/" } { (post.title) }
                    " "
                    time {
                        @if let Some(date) = post.publish_date {
                            (date.format("%Y-%m-%d").to_string())
                        }
                    }
                }
            }
        }
    }
}

/// Escape a value for substitution into a template override.
fn text(value: &str) -> String {
    html! { (value) }.into_string()
}

/// Replace each `{{key}}` with its value. Unknown keys render empty; an
/// unterminated placeholder is an error.
fn fill(template: &str, values: &[(&str, String)]) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            return Err(PagesmithError::Render(format!(
                "unterminated placeholder near `{}`",
                rest[start..].chars().take(20).collect::<String>()
            )));
        };
        let key = after[..end].trim();
        if let Some((_, value)) = values.iter().find(|(k, _)| *k == key) {
            out.push_str(value);
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

// ---------------------------------------------------------------------------
// XML
// ---------------------------------------------------------------------------

type XmlWriter = Writer<Cursor<Vec<u8>>>;

fn xml_string(bytes: quick_xml::Result<Vec<u8>>) -> Result<String> {
    let bytes = bytes.map_err(|e| PagesmithError::Render(format!("xml write failed: {e}")))?;
    String::from_utf8(bytes).map_err(|e| PagesmithError::Render(format!("xml is not utf-8: {e}")))
}

fn post_url(base: &str, slug: &str) -> String {
    format!("{base}/posts/{slug}/")
}

fn feed_xml(index: &PostsIndex, site: &SiteContext) -> quick_xml::Result<Vec<u8>> {
    let base = site.url.trim_end_matches('/');
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    writer.write_event(Event::Start(rss))?;
    writer.write_event(Event::Start(BytesStart::new("channel")))?;

    push_text(&mut writer, "title", &site.title)?;
    push_text(&mut writer, "link", &format!("{base}/"))?;
    push_text(&mut writer, "description", &site.title)?;

    for post in index.posts.iter().take(FEED_ITEMS) {
        let link = post_url(base, &post.slug);
        writer.write_event(Event::Start(BytesStart::new("item")))?;
        push_text(&mut writer, "title", &post.title)?;
        push_text(&mut writer, "link", &link)?;
        push_text(&mut writer, "guid", &link)?;
        push_text(&mut writer, "description", &post.excerpt)?;
        if let Some(date) = post.publish_date {
            push_text(&mut writer, "pubDate", &date.to_rfc2822())?;
        }
        writer.write_event(Event::End(BytesEnd::new("item")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("channel")))?;
    writer.write_event(Event::End(BytesEnd::new("rss")))?;
    Ok(writer.into_inner().into_inner())
}

fn sitemap_xml(index: &PostsIndex, site: &SiteContext) -> quick_xml::Result<Vec<u8>> {
    let base = site.url.trim_end_matches('/');
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    let mut urlset = BytesStart::new("urlset");
    urlset.push_attribute(("xmlns", "http://www.sitemaps.org/schemas/sitemap/0.9"));
    writer.write_event(Event::Start(urlset))?;

    writer.write_event(Event::Start(BytesStart::new("url")))?;
    push_text(&mut writer, "loc", &format!("{base}/"))?;
    writer.write_event(Event::End(BytesEnd::new("url")))?;

    for post in &index.posts {
        writer.write_event(Event::Start(BytesStart::new("url")))?;
        push_text(&mut writer, "loc", &post_url(base, &post.slug))?;
        push_text(
            &mut writer,
            "lastmod",
            &post.last_edited_time.to_rfc3339_opts(SecondsFormat::Secs, true),
        )?;
        writer.write_event(Event::End(BytesEnd::new("url")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("urlset")))?;
    Ok(writer.into_inner().into_inner())
}

fn push_text(writer: &mut XmlWriter, tag: &str, text: &str) -> quick_xml::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pagesmith_shared::PostStatus;

    use super::*;

    fn site() -> SiteContext {
        SiteContext {
            url: "https://blog.example.com/".into(),
            title: "Notes & Things".into(),
        }
    }

    fn summary(slug: &str) -> PostSummary {
        PostSummary {
            id: slug.into(),
            title: format!("Post {slug}"),
            slug: slug.into(),
            status: PostStatus::Published,
            category: None,
            tags: vec![],
            publish_date: Some(Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap()),
            last_edited_time: Utc.with_ymd_and_hms(2024, 3, 6, 8, 0, 0).unwrap(),
            excerpt: "Short <b>intro</b>".into(),
            reading_time: 2,
            featured: false,
            cover_image: None,
        }
    }

    fn post(title: &str, content: &str) -> Post {
        Post {
            id: "1".into(),
            title: title.into(),
            slug: "hello".into(),
            status: PostStatus::Published,
            category: None,
            tags: vec![],
            publish_date: None,
            last_edited_time: Utc::now(),
            excerpt: String::new(),
            content: content.into(),
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

    fn built_in() -> TemplateRenderer {
        TemplateRenderer {
            templates: HashMap::new(),
        }
    }

    #[test]
    fn fill_substitutes_and_drops_unknown_keys() {
        let out = fill("<p>{{ a }}|{{b}}|{{missing}}</p>", &[("a", "1".into()), ("b", "2".into())])
            .unwrap();
        assert_eq!(out, "<p>1|2|</p>");
    }

    #[test]
    fn fill_rejects_unterminated_placeholder() {
        assert!(fill("oops {{title", &[]).is_err());
    }

    #[test]
    fn home_lists_posts_with_escaped_site_title() {
        let index = PostsIndex {
            posts: vec![summary("a"), summary("b")],
            total: 2,
            last_updated: Utc::now(),
        };
        let html = built_in().render_home(&index, &site()).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("Notes &amp; Things"));
        assert!(html.contains(r#"<a href="/posts/a/">Post a</a>"#));
        assert!(html.contains("<time>2024-03-05</time>"));
    }

    #[test]
    fn post_page_keeps_rendered_content_and_escapes_title() {
        let html = built_in()
            .render_post(&post("A < B", "<p>body</p>"), &site())
            .unwrap();
        assert!(html.contains("<h1>A &lt; B</h1>"));
        assert!(html.contains("<p>body</p>"));
    }

    #[test]
    fn feed_and_sitemap_use_absolute_links() {
        let index = PostsIndex {
            posts: vec![summary("a")],
            total: 1,
            last_updated: Utc::now(),
        };
        let feed = built_in().render_feed(&index, &site()).unwrap();
        assert!(feed.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(feed.contains(r#"<rss version="2.0">"#));
        assert!(feed.contains("<title>Notes &amp; Things</title>"));
        assert!(feed.contains("<link>https://blog.example.com/posts/a/</link>"));
        assert!(feed.contains("Short &lt;b&gt;intro&lt;/b&gt;"));
        assert!(feed.contains("<pubDate>Tue, "));

        let sitemap = built_in().render_sitemap(&index, &site()).unwrap();
        assert!(sitemap.contains("<loc>https://blog.example.com/</loc>"));
        assert!(sitemap.contains("<loc>https://blog.example.com/posts/a/</loc>"));
        assert!(sitemap.contains("<lastmod>2024-03-06T08:00:00Z</lastmod>"));
    }

    #[test]
    fn custom_template_overrides_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("post.html"), "<main>{{title}}</main>").unwrap();
        let renderer = TemplateRenderer::load(dir.path()).unwrap();

        let html = renderer.render_post(&post("Tom & Jerry", "<p>x</p>"), &site()).unwrap();
        assert_eq!(html, "<main>Tom &amp; Jerry</main>");
    }
}
