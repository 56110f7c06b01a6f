use async_trait::async_trait;
use chrono::Utc;
use feed_rs::parser;
use html_escape::decode_html_entities;

use crate::app::{FelixError, Result};
use crate::domain::Item;
use crate::scanner::{Emitter, Scanner};

/// Parses a syndication feed (RSS or Atom) and emits one item per entry.
pub struct FeedScanner;

#[async_trait]
impl Scanner for FeedScanner {
    async fn scan(&self, body: &str, emitter: &mut Emitter) -> Result<()> {
        let feed = parser::parse(body.as_bytes())
            .map_err(|e| FelixError::FeedParse(e.to_string()))?;

        for entry in feed.entries {
            let title = entry
                .title
                .map(|t| decode_html_entities(&t.content).to_string())
                .unwrap_or_default();
            let url = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_default();

            // Entries are stamped with the scan time; their own published
            // date may be absent entirely.
            emitter
                .emit_item(Item {
                    title,
                    url,
                    pub_date: Utc::now(),
                })
                .await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    const RSS_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Test Feed</title>
    <description>A test feed</description>
    <item>
      <title>Test Item 1</title>
      <link>https://example.com/item1</link>
      <guid>item-1</guid>
      <pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Test Item 2</title>
      <link>https://example.com/item2</link>
      <guid>item-2</guid>
    </item>
    <item>
      <title>Test Item 3 &amp; More</title>
      <link>https://example.com/item3</link>
      <guid>item-3</guid>
    </item>
  </channel>
</rss>"#;

    async fn scan_items(content: &str) -> Result<Vec<Item>> {
        let (tx, mut rx) = mpsc::channel(10);
        let mut emitter = Emitter::new(Some(tx), None);

        FeedScanner.scan(content, &mut emitter).await?;
        drop(emitter);

        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        Ok(items)
    }

    #[tokio::test]
    async fn test_scan_valid_feed() {
        let items = scan_items(RSS_SAMPLE).await.unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].title, "Test Item 1");
        assert_eq!(items[0].url, "https://example.com/item1");
        assert_eq!(items[2].title, "Test Item 3 & More");
    }

    #[tokio::test]
    async fn test_pub_date_is_scan_time() {
        let before = Utc::now();
        let items = scan_items(RSS_SAMPLE).await.unwrap();

        // The 2024 entry date must not leak into the emitted item.
        assert!(items[0].pub_date >= before);
    }

    #[tokio::test]
    async fn test_scan_invalid_feed_errors() {
        for content in ["", "<html></html>"] {
            assert!(scan_items(content).await.is_err());
        }
    }
}
