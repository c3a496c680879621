//! Page scraping: URL → title + readable text, failing closed.
//!
//! The scrape collaborator never errors out of a session: any failure
//! (network, HTTP status, unextractable content) produces a `PageContext`
//! with `success: false`, and the caller falls back to search grounding.

use crate::config::ScrapeConfig;
use crate::session::PageContext;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{info, warn};

/// Elements whose text is boilerplate, never page content.
const BOILERPLATE_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "aside", "noscript", "svg", "iframe",
];

/// Collaborator seam: fetch a page and produce its context.
#[async_trait]
pub trait PageScraper: Send + Sync {
    /// Fetch and extract `url`. Fails closed: recoverable failures return a
    /// context with `success: false` rather than an error.
    async fn scrape(&self, url: &str) -> PageContext;
}

/// HTTP implementation of [`PageScraper`].
pub struct HttpScraper {
    client: reqwest::Client,
    max_content_chars: usize,
}

impl HttpScraper {
    /// Build a scraper from config.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &ScrapeConfig) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| crate::ChatError::Scrape(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            max_content_chars: config.max_content_chars,
        })
    }

    fn failed(url: &str) -> PageContext {
        PageContext {
            url: url.to_owned(),
            title: String::new(),
            content: String::new(),
            success: false,
        }
    }
}

#[async_trait]
impl PageScraper for HttpScraper {
    async fn scrape(&self, url: &str) -> PageContext {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("page fetch failed for {url}: {e}");
                return Self::failed(url);
            }
        };
        if !response.status().is_success() {
            warn!("page fetch for {url} returned {}", response.status());
            return Self::failed(url);
        }
        let html = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!("page body read failed for {url}: {e}");
                return Self::failed(url);
            }
        };

        match extract_page(&html, url, self.max_content_chars) {
            Some(page) => {
                info!(
                    "scraped {url}: title={:?}, {} chars of content",
                    page.title,
                    page.content.len()
                );
                page
            }
            None => {
                warn!("no extractable content at {url}");
                Self::failed(url)
            }
        }
    }
}

/// Parse HTML into a successful [`PageContext`], or `None` when the document
/// has no readable text.
pub(crate) fn extract_page(html: &str, url: &str, max_chars: usize) -> Option<PageContext> {
    let document = Html::parse_document(html);

    let title = extract_title(&document);
    let text = normalise_whitespace(&extract_main_text(&document));
    if text.is_empty() {
        return None;
    }

    Some(PageContext {
        url: url.to_owned(),
        title,
        content: truncate_chars(&text, max_chars),
        success: true,
    })
}

fn extract_title(document: &Html) -> String {
    let Ok(selector) = Selector::parse("title") else {
        return String::new();
    };
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>())
        .unwrap_or_default()
        .trim()
        .to_owned()
}

/// Text of the main content area: `<article>`, then `<main>`, then
/// `[role="main"]`, then `<body>`, skipping boilerplate subtrees.
fn extract_main_text(document: &Html) -> String {
    let content_selectors = ["article", "main", "[role=\"main\"]", "body"];

    for selector_str in &content_selectors {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        if let Some(element) = document.select(&selector).next() {
            let mut out = String::new();
            collect_text(element, &mut out);
            if !out.trim().is_empty() {
                return out;
            }
        }
    }

    String::new()
}

/// Depth-first text collection that skips boilerplate elements entirely.
fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        } else if let Some(child_el) = ElementRef::wrap(child) {
            let tag = child_el.value().name();
            if BOILERPLATE_TAGS.contains(&tag) {
                continue;
            }
            collect_text(child_el, out);
        }
    }
}

fn normalise_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max_chars` characters on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn extracts_title_and_article_text() {
        let html = r#"
            <html>
              <head><title> Example Domain </title><style>body { color: red }</style></head>
              <body>
                <nav>Home About Contact</nav>
                <article>
                  <h1>Example Domain</h1>
                  <p>This domain is for use in illustrative examples.</p>
                  <script>trackPageView();</script>
                </article>
                <footer>Copyright</footer>
              </body>
            </html>
        "#;
        let page = extract_page(html, "https://example.com", 10_000).unwrap();
        assert!(page.success);
        assert_eq!(page.title, "Example Domain");
        assert!(page.content.contains("illustrative examples"));
        assert!(!page.content.contains("trackPageView"));
        assert!(!page.content.contains("Home About Contact"));
        assert!(!page.content.contains("Copyright"));
    }

    #[test]
    fn falls_back_to_body_when_no_article() {
        let html = "<html><body><p>just a paragraph</p></body></html>";
        let page = extract_page(html, "https://example.com", 10_000).unwrap();
        assert_eq!(page.content, "just a paragraph");
    }

    #[test]
    fn empty_document_yields_none() {
        let html = "<html><body><script>only code</script></body></html>";
        assert!(extract_page(html, "https://example.com", 10_000).is_none());
    }

    #[test]
    fn content_is_capped_at_max_chars() {
        let body: String = "word ".repeat(1000);
        let html = format!("<html><body><p>{body}</p></body></html>");
        let page = extract_page(&html, "https://example.com", 100).unwrap();
        assert_eq!(page.content.chars().count(), 100);
    }

    #[test]
    fn whitespace_is_normalised() {
        let html = "<html><body><p>one\n\n   two\tthree</p></body></html>";
        let page = extract_page(html, "https://example.com", 10_000).unwrap();
        assert_eq!(page.content, "one two three");
    }
}
