use std::collections::VecDeque;

use tokio::sync::mpsc;

use crate::domain::{Item, Link};

/// Sink handed to a [`Scanner`](crate::scanner::Scanner).
///
/// Items and links go out over the pipeline channels and may block until
/// the downstream stage is ready. Follow URLs are queued in-memory for the
/// owning fetcher to consume within the same attempt, in insertion order.
///
/// A fetcher whose scanner never produces one of the record kinds carries
/// no sender for it; emitting that kind discards the record.
pub struct Emitter {
    items: Option<mpsc::Sender<Item>>,
    links: Option<mpsc::Sender<Link>>,
    follows: VecDeque<String>,
}

impl Emitter {
    pub fn new(items: Option<mpsc::Sender<Item>>, links: Option<mpsc::Sender<Link>>) -> Self {
        Self {
            items,
            links,
            follows: VecDeque::new(),
        }
    }

    pub async fn emit_item(&self, item: Item) {
        match &self.items {
            Some(tx) => {
                if tx.send(item).await.is_err() {
                    tracing::debug!("item channel closed, discarding item");
                }
            }
            None => tracing::debug!("no item sink, discarding item"),
        }
    }

    pub async fn emit_link(&self, link: Link) {
        match &self.links {
            Some(tx) => {
                if tx.send(link).await.is_err() {
                    tracing::debug!("link channel closed, discarding link");
                }
            }
            None => tracing::debug!("no link sink, discarding link"),
        }
    }

    pub fn emit_follow(&mut self, follow: impl Into<String>) {
        self.follows.push_back(follow.into());
    }

    pub fn has_follow(&self) -> bool {
        !self.follows.is_empty()
    }

    pub fn next_follow(&mut self) -> Option<String> {
        self.follows.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_item_and_link() {
        let (item_tx, mut item_rx) = mpsc::channel(10);
        let (link_tx, mut link_rx) = mpsc::channel(10);
        let emitter = Emitter::new(Some(item_tx), Some(link_tx));

        emitter.emit_item(Item::new("title", "http://example.com")).await;
        emitter.emit_link(Link::new("title", "http://example.com")).await;

        assert_eq!(item_rx.recv().await.unwrap().title, "title");
        assert_eq!(link_rx.recv().await.unwrap().url, "http://example.com");
    }

    #[tokio::test]
    async fn test_emit_without_sink_discards() {
        let emitter = Emitter::new(None, None);

        emitter.emit_item(Item::new("title", "http://example.com")).await;
        emitter.emit_link(Link::new("title", "http://example.com")).await;
    }

    #[test]
    fn test_follow_queue_is_fifo() {
        let mut emitter = Emitter::new(None, None);
        assert!(!emitter.has_follow());
        assert_eq!(emitter.next_follow(), None);

        emitter.emit_follow("http://example.com");
        emitter.emit_follow("http://example.org");

        assert!(emitter.has_follow());
        assert_eq!(emitter.next_follow().as_deref(), Some("http://example.com"));
        assert_eq!(emitter.next_follow().as_deref(), Some("http://example.org"));
        assert!(!emitter.has_follow());
    }
}
