use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};

use crate::app::Result;
use crate::domain::Link;
use crate::scanner::{Emitter, Scanner};

static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("anchor selector is valid"));

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^<"' ()\r\n\t]+"#).expect("URL pattern is valid")
});

/// Parses an HTML page and emits one link per unique URL.
///
/// Anchor elements are scanned first (title = trimmed anchor text, falling
/// back to the href). The serialized document is then swept with a URL
/// pattern for anything outside anchors; both passes share one dedup set,
/// scoped to the single scan.
pub struct PageScanner;

#[async_trait]
impl Scanner for PageScanner {
    async fn scan(&self, body: &str, emitter: &mut Emitter) -> Result<()> {
        // The parsed DOM is not Send; collect before the first await.
        let links = extract_links(body);

        for link in links {
            emitter.emit_link(link).await;
        }

        Ok(())
    }
}

fn extract_links(body: &str) -> Vec<Link> {
    let document = Html::parse_document(body);
    let mut found: HashSet<String> = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&ANCHOR_SELECTOR) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if !found.insert(href.to_string()) {
            continue;
        }

        let text = element.text().collect::<String>();
        let title = text.trim();
        let title = if title.is_empty() { href } else { title };
        links.push(Link::new(title, href));
    }

    for found_url in URL_PATTERN.find_iter(&document.html()) {
        let url = found_url.as_str();
        if found.insert(url.to_string()) {
            links.push(Link::new(url, url));
        }
    }

    links
}
