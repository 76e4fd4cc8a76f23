use common::error::AppError;
use dom_smoothie::{Article, Readability};
use scraper::{Html, Selector};
use url::Url;

/// Readable body of a fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContent {
    /// Plain text, trimmed.
    pub text: String,
    /// Cleaned article HTML, used to look for inline images.
    pub html: String,
}

/// Runs readability extraction over `raw_html`.
///
/// `Ok(None)` means the page parsed but yielded no text.
pub fn extract_readable(raw_html: &str, page_url: &str) -> Result<Option<ExtractedContent>, AppError> {
    let mut readability = Readability::new(raw_html, Some(page_url), None)?;
    let article: Article = readability.parse()?;

    let text = article.text_content.trim().to_string();
    if text.is_empty() {
        return Ok(None);
    }

    Ok(Some(ExtractedContent {
        text,
        html: article.content.to_string(),
    }))
}

/// Picks the lead image for an article.
///
/// Priority: `og:image` meta tag, first usable `<img>` of the extracted content, first usable
/// `<img>` of the raw page. Relative sources are resolved against `page_url`; a candidate that
/// does not resolve to an http(s) URL is passed over in favour of the next one.
pub fn find_lead_image(raw_html: &str, extracted_html: Option<&str>, page_url: &str) -> Option<String> {
    let base = Url::parse(page_url).ok();
    let base = base.as_ref();
    let page = Html::parse_document(raw_html);

    open_graph_image(&page, base)
        .or_else(|| {
            extracted_html.and_then(|html| first_content_image(&Html::parse_fragment(html), base))
        })
        .or_else(|| first_content_image(&page, base))
}

fn open_graph_image(document: &Html, base: Option<&Url>) -> Option<String> {
    let selector = Selector::parse(r#"meta[property="og:image"], meta[name="og:image"]"#).ok()?;
    document
        .select(&selector)
        .filter_map(|element| element.value().attr("content"))
        .map(str::trim)
        .filter(|content| !content.is_empty())
        .find_map(|content| resolve_http_url(base, content))
}

fn first_content_image(document: &Html, base: Option<&Url>) -> Option<String> {
    let selector = Selector::parse("img[src]").ok()?;
    document
        .select(&selector)
        .filter_map(|element| element.value().attr("src"))
        .map(str::trim)
        .filter(|src| !src.is_empty() && !is_icon_or_logo(src))
        .find_map(|src| resolve_http_url(base, src))
}

/// Site chrome rather than article imagery, judged by file name.
fn is_icon_or_logo(src: &str) -> bool {
    let path = src.split(['?', '#']).next().unwrap_or(src);
    let file_name = path.rsplit('/').next().unwrap_or(path).to_ascii_lowercase();
    file_name.contains("icon") || file_name.contains("logo")
}

fn resolve_http_url(base: Option<&Url>, candidate: &str) -> Option<String> {
    let resolved = match base {
        Some(base) => base.join(candidate).ok()?,
        None => Url::parse(candidate).ok()?,
    };

    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_URL: &str = "https://news.example.jp/politics/2024/article-1.html";

    #[test]
    fn open_graph_image_wins() {
        let html = r#"<html><head><meta property="og:image" content="https://cdn.example.jp/og.jpg"></head>
            <body><img src="/img/inline.jpg"></body></html>"#;
        assert_eq!(
            find_lead_image(html, Some(r#"<img src="/img/content.jpg">"#), PAGE_URL).as_deref(),
            Some("https://cdn.example.jp/og.jpg")
        );
    }

    #[test]
    fn extracted_content_image_beats_page_image() {
        let html = r#"<html><body><img src="/assets/header.jpg"><p>text</p></body></html>"#;
        let extracted = r#"<div><img src="/assets/site-logo.png"><img src="photos/main.jpg"></div>"#;
        assert_eq!(
            find_lead_image(html, Some(extracted), PAGE_URL).as_deref(),
            Some("https://news.example.jp/politics/2024/photos/main.jpg")
        );
    }

    #[test]
    fn icons_and_logos_are_skipped_in_raw_page() {
        let html = r#"<html><body>
            <img src="/static/favicon-32.png">
            <img src="/static/LOGO.svg?v=2">
            <img src="//img.example.jp/story.webp">
        </body></html>"#;
        assert_eq!(
            find_lead_image(html, None, PAGE_URL).as_deref(),
            Some("https://img.example.jp/story.webp")
        );
    }

    #[test]
    fn no_usable_image() {
        let html = r#"<html><body><img src="/img/share-icon.png"><img src="data:image/png;base64,AAAA"></body></html>"#;
        assert_eq!(find_lead_image(html, None, PAGE_URL), None);
    }

    #[test]
    fn unresolvable_open_graph_image_falls_through() {
        let html = r#"<html><head><meta property="og:image" content="data:image/gif;base64,R0lGOD">
            </head><body><img src="/img/page.jpg"></body></html>"#;
        assert_eq!(
            find_lead_image(html, Some(r#"<img src="/img/content.jpg">"#), PAGE_URL).as_deref(),
            Some("https://news.example.jp/img/content.jpg")
        );

        let malformed = r#"<html><head><meta property="og:image" content="http://[::1">
            </head><body><img src="data:image/png;base64,AAAA"><img src="/img/page.jpg"></body></html>"#;
        assert_eq!(
            find_lead_image(malformed, None, PAGE_URL).as_deref(),
            Some("https://news.example.jp/img/page.jpg")
        );
    }

    #[test]
    fn readability_extracts_article_text() {
        let paragraph = "国会は新しい法案を審議し、与野党の議員が長時間にわたって意見を交わした。".repeat(12);
        let html = format!(
            "<html><head><title>国会審議</title></head><body>\
             <nav><a href=\"/\">Home</a></nav>\
             <article><h1>国会審議</h1><p>{paragraph}</p><p>{paragraph}</p></article>\
             </body></html>"
        );

        let extracted = extract_readable(&html, PAGE_URL)
            .expect("parse")
            .expect("content");
        assert!(extracted.text.contains("国会は新しい法案を審議し"));
        assert!(!extracted.html.is_empty());
    }
}
