pub mod item;
pub mod link;

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{Item, Link};

pub use item::ItemTitleFilter;
pub use link::{
    LinkDomainFilter, LinkDuplicatesFilter, LinkFilenameAsTitleFilter,
    LinkUploadedExpandFilenameFilter, LinkUrlRegexFilter,
};

/// Continuation handed to a filter stage.
///
/// A stage passes a record downstream by pushing it; pushing nothing drops
/// the record, pushing several fans it out. Records flow to the next stage
/// in push order.
pub struct Next<T> {
    records: Vec<T>,
}

impl<T> Next<T> {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: T) {
        self.records.push(record);
    }

    pub fn into_records(self) -> Vec<T> {
        self.records
    }
}

impl<T> Default for Next<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A single item filter stage. Stages may keep per-instance state; each
/// chain runs in one task, so no further synchronization is needed.
///
/// The `Display` form feeds the `/filters` diagnostic endpoint.
#[async_trait]
pub trait ItemFilter: Send + fmt::Display {
    async fn filter(&mut self, item: Item, next: &mut Next<Item>);
}

/// A single link filter stage. See [`ItemFilter`].
#[async_trait]
pub trait LinkFilter: Send + fmt::Display {
    async fn filter(&mut self, link: Link, next: &mut Next<Link>);
}

/// Runs one item through every stage in order.
///
/// Stage `i + 1` only sees what stage `i` pushed; an empty intermediate
/// result short-circuits the rest of the chain.
pub async fn run_item_chain(filters: &mut [Box<dyn ItemFilter>], item: Item) -> Vec<Item> {
    let mut current = vec![item];

    for filter in filters.iter_mut() {
        let mut next = Next::new();
        for record in current {
            filter.filter(record, &mut next).await;
        }
        current = next.into_records();
        if current.is_empty() {
            break;
        }
    }

    current
}

/// Runs one link through every stage in order. See [`run_item_chain`].
pub async fn run_link_chain(filters: &mut [Box<dyn LinkFilter>], link: Link) -> Vec<Link> {
    let mut current = vec![link];

    for filter in filters.iter_mut() {
        let mut next = Next::new();
        for record in current {
            filter.filter(record, &mut next).await;
        }
        current = next.into_records();
        if current.is_empty() {
            break;
        }
    }

    current
}

/// Pipeline driver: applies the chain to every item received until the
/// input closes, then closes the output by dropping the sender.
pub async fn filter_items(
    mut input: mpsc::Receiver<Item>,
    output: mpsc::Sender<Item>,
    mut filters: Vec<Box<dyn ItemFilter>>,
) {
    while let Some(item) = input.recv().await {
        for item in run_item_chain(&mut filters, item).await {
            if output.send(item).await.is_err() {
                return;
            }
        }
    }
}

/// Pipeline driver for links. See [`filter_items`].
pub async fn filter_links(
    mut input: mpsc::Receiver<Link>,
    output: mpsc::Sender<Link>,
    mut filters: Vec<Box<dyn LinkFilter>>,
) {
    while let Some(link) = input.recv().await {
        for link in run_link_chain(&mut filters, link).await {
            if output.send(link).await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AppendLetter(char);

    impl fmt::Display for AppendLetter {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "AppendLetter({})", self.0)
        }
    }

    #[async_trait]
    impl ItemFilter for AppendLetter {
        async fn filter(&mut self, mut item: Item, next: &mut Next<Item>) {
            item.title.push(self.0);
            next.push(item);
        }
    }

    struct DropAll;

    impl fmt::Display for DropAll {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "DropAll")
        }
    }

    #[async_trait]
    impl ItemFilter for DropAll {
        async fn filter(&mut self, _item: Item, _next: &mut Next<Item>) {}
    }

    #[tokio::test]
    async fn test_chain_applies_stages_in_order() {
        let mut filters: Vec<Box<dyn ItemFilter>> = vec![
            Box::new(AppendLetter('A')),
            Box::new(AppendLetter('B')),
            Box::new(AppendLetter('C')),
        ];

        let out = run_item_chain(&mut filters, Item::new("", "")).await;

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "ABC");
    }

    #[tokio::test]
    async fn test_empty_chain_passes_everything() {
        let (in_tx, in_rx) = mpsc::channel(10);
        let (out_tx, mut out_rx) = mpsc::channel(10);

        let pipeline = tokio::spawn(filter_items(in_rx, out_tx, Vec::new()));

        let items = vec![Item::new("test", "a"), Item::new("foobar", "b")];
        for item in &items {
            in_tx.send(item.clone()).await.unwrap();
        }
        drop(in_tx);

        let mut got = Vec::new();
        while let Some(item) = out_rx.recv().await {
            got.push(item);
        }
        pipeline.await.unwrap();

        assert_eq!(got, items);
    }

    #[tokio::test]
    async fn test_dropping_stage_short_circuits() {
        let mut filters: Vec<Box<dyn ItemFilter>> =
            vec![Box::new(DropAll), Box::new(AppendLetter('A'))];

        let out = run_item_chain(&mut filters, Item::new("", "")).await;

        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_driver_closes_output_when_input_closes() {
        let (in_tx, in_rx) = mpsc::channel::<Item>(10);
        let (out_tx, mut out_rx) = mpsc::channel(10);

        let pipeline = tokio::spawn(filter_items(in_rx, out_tx, Vec::new()));
        drop(in_tx);

        assert_eq!(out_rx.recv().await, None);
        pipeline.await.unwrap();
    }
}
