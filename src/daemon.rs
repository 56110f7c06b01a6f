use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::app::{FelixError, Result};
use crate::config::{Config, ItemFilterConfig, LinkFilterConfig};
use crate::domain::{Item, Link};
use crate::fetcher::Fetcher;
use crate::filter::{
    self, ItemFilter, ItemTitleFilter, LinkDomainFilter, LinkDuplicatesFilter, LinkFilter,
    LinkFilenameAsTitleFilter, LinkUploadedExpandFilenameFilter, LinkUrlRegexFilter,
};
use crate::scanner::{FeedScanner, PageScanner, Scanner};
use crate::schedule::{AttemptScheduler, Policy};
use crate::server::{self, ServerState};
use crate::source::{HttpSource, Source};
use crate::store::Datastore;

/// Page fetchers give up after this many attempts per URL.
const PAGE_FETCH_MAX_ATTEMPTS: u32 = 7;

/// Wires the whole pipeline together and runs it until the token is
/// cancelled (signal) or the HTTP server fails fatally.
///
/// Data flow: feed fetchers → item filters → page fetchers → link filters
/// → datastore, with the HTTP server reading accepted links back out.
/// Shutdown closes the stages in that same order; each channel closes once
/// the tasks holding its senders have exited.
pub struct Daemon {
    config: Config,
    store: Arc<dyn Datastore>,
    source: Arc<dyn Source>,
}

impl Daemon {
    pub fn new(config: Config, store: Arc<dyn Datastore>) -> Self {
        let source: Arc<dyn Source> = Arc::new(HttpSource::new(&config.user_agent));
        Self {
            config,
            store,
            source,
        }
    }

    #[cfg(test)]
    fn with_source(config: Config, store: Arc<dyn Datastore>, source: Arc<dyn Source>) -> Self {
        Self {
            config,
            store,
            source,
        }
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        for feed in &self.config.feeds {
            if feed.feed_type != "rss" {
                return Err(FelixError::Config(format!(
                    "unsupported feed type: {}",
                    feed.feed_type
                )));
            }
        }

        let item_filters = build_item_filters(&self.config)?;
        let link_filters = build_link_filters(&self.config, self.source.clone())?;
        let filter_descriptions: Vec<String> = item_filters
            .iter()
            .map(|f| f.to_string())
            .chain(link_filters.iter().map(|f| f.to_string()))
            .collect();

        let (new_items_tx, new_items_rx) = mpsc::channel::<Item>(1);
        let (filtered_items_tx, filtered_items_rx) = mpsc::channel::<Item>(1);
        let (new_links_tx, new_links_rx) = mpsc::channel::<Link>(1);
        let (filtered_links_tx, mut filtered_links_rx) = mpsc::channel::<Link>(1);

        // Feed fetchers are the only holders of new_items senders, so the
        // item pipeline's input closes once they have all exited.
        let feed_scanner: Arc<dyn Scanner> = Arc::new(FeedScanner);
        let mut feed_fetchers = JoinSet::new();
        for feed in &self.config.feeds {
            let interval = feed.fetch_interval.unwrap_or(self.config.fetch_interval);
            let scheduler = AttemptScheduler::new(
                self.store.clone(),
                Policy::Periodic {
                    interval: chrono::Duration::from_std(interval)
                        .map_err(|e| FelixError::Config(format!("fetch interval: {e}")))?,
                },
            );
            let fetcher = Fetcher::new(
                &feed.url,
                self.source.clone(),
                feed_scanner.clone(),
                Arc::new(scheduler),
                Some(new_items_tx.clone()),
                Some(new_links_tx.clone()),
            );
            feed_fetchers.spawn(fetcher.run(cancel.clone()));
        }

        let item_pipeline = tokio::spawn(filter::filter_items(
            new_items_rx,
            filtered_items_tx,
            item_filters,
        ));
        let link_pipeline = tokio::spawn(filter::filter_links(
            new_links_rx,
            filtered_links_tx,
            link_filters,
        ));

        let page_driver = tokio::spawn(page_fetcher_driver(
            filtered_items_rx,
            self.store.clone(),
            self.source.clone(),
            new_links_tx.clone(),
            self.config.fetch_interval,
            self.config.cleanup_max_age,
        ));

        drop(new_items_tx);
        drop(new_links_tx);

        let cleanup_task = tokio::spawn(cleanup_loop(
            self.store.clone(),
            self.config.cleanup_interval,
            self.config.cleanup_max_age,
            cancel.clone(),
        ));

        // The server keeps serving while the pipeline drains; it is shut
        // down last. A fatal server error triggers the full shutdown.
        let server_shutdown = CancellationToken::new();
        let server_task = {
            let state = ServerState {
                store: self.store.clone(),
                feed_max_age: self.config.feed_output_max_age,
                filter_descriptions: Arc::new(filter_descriptions),
            };
            let port = self.config.port;
            let shutdown = server_shutdown.clone();
            let cancel_all = cancel.clone();
            tokio::spawn(async move {
                let result = server::serve(port, state, shutdown).await;
                if let Err(err) = &result {
                    error!(err = %err, "feed server failed");
                    cancel_all.cancel();
                }
                result
            })
        };

        // Terminal stage: every accepted link goes to the store. The loop
        // ends once all upstream stages have wound down.
        while let Some(link) = filtered_links_rx.recv().await {
            match self.store.store_link(&link) {
                Ok(true) => debug!(url = %link.url, "link already stored"),
                Ok(false) => info!(url = %link.url, title = %link.title, "stored link"),
                Err(err) => error!(url = %link.url, err = %err, "could not store link"),
            }
        }

        while feed_fetchers.join_next().await.is_some() {}
        let _ = item_pipeline.await;
        let _ = link_pipeline.await;
        let _ = page_driver.await;
        let _ = cleanup_task.await;

        info!("shutting down feed server");
        server_shutdown.cancel();
        match server_task.await {
            Ok(result) => result,
            Err(err) => Err(FelixError::Server(format!("server task panicked: {err}"))),
        }
    }
}

/// Spawns a page fetcher per unseen item and keeps their link output
/// flowing into the link pipeline.
///
/// On startup every stored item still younger than the cleanup age gets
/// its fetcher back, so attempts survive restarts. The driver itself ends
/// when the filtered item stream closes; it then stops its fetchers and
/// waits for them.
async fn page_fetcher_driver(
    mut filtered_items: mpsc::Receiver<Item>,
    store: Arc<dyn Datastore>,
    source: Arc<dyn Source>,
    links: mpsc::Sender<Link>,
    base_interval: Duration,
    startup_max_age: Duration,
) {
    let scanner: Arc<dyn Scanner> = Arc::new(PageScanner);
    let cancel = CancellationToken::new();
    let mut fetchers = JoinSet::new();

    let base = chrono::Duration::from_std(base_interval).unwrap_or(chrono::Duration::MAX);

    let mut spawn_page_fetcher = |url: &str| {
        let scheduler = AttemptScheduler::new(
            store.clone(),
            Policy::Fibonacci {
                base,
                max_attempts: PAGE_FETCH_MAX_ATTEMPTS,
            },
        );
        let fetcher = Fetcher::new(
            url,
            source.clone(),
            scanner.clone(),
            Arc::new(scheduler),
            None,
            Some(links.clone()),
        );
        fetchers.spawn(fetcher.run(cancel.clone()));
    };

    match store.get_items(startup_max_age) {
        Ok(items) => {
            for item in items {
                debug!(url = %item.url, "resuming page fetcher for stored item");
                spawn_page_fetcher(&item.url);
            }
        }
        Err(err) => error!(err = %err, "could not load stored items"),
    }

    while let Some(item) = filtered_items.recv().await {
        match store.store_item(&item) {
            Ok(true) => {
                debug!(url = %item.url, "item already stored");
                continue;
            }
            Ok(false) => info!(url = %item.url, title = %item.title, "stored item"),
            Err(err) => {
                error!(url = %item.url, err = %err, "could not store item");
                continue;
            }
        }
        spawn_page_fetcher(&item.url);
    }

    cancel.cancel();
    while fetchers.join_next().await.is_some() {}
}

/// Deletes expired records on a fixed interval until cancelled.
async fn cleanup_loop(
    store: Arc<dyn Datastore>,
    interval: Duration,
    max_age: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = tokio::time::sleep(interval) => {
                match store.cleanup(max_age) {
                    Ok(()) => debug!("cleanup finished"),
                    Err(err) => error!(err = %err, "cleanup failed"),
                }
            }
            () = cancel.cancelled() => return,
        }
    }
}

fn build_item_filters(config: &Config) -> Result<Vec<Box<dyn ItemFilter>>> {
    config
        .item_filters
        .iter()
        .map(|filter| match filter {
            ItemFilterConfig::Title { titles } => {
                Ok(Box::new(ItemTitleFilter::new(titles)) as Box<dyn ItemFilter>)
            }
        })
        .collect()
}

fn build_link_filters(
    config: &Config,
    source: Arc<dyn Source>,
) -> Result<Vec<Box<dyn LinkFilter>>> {
    config
        .link_filters
        .iter()
        .map(|filter| {
            Ok(match filter {
                LinkFilterConfig::Domain { domains } => {
                    Box::new(LinkDomainFilter::new(domains)) as Box<dyn LinkFilter>
                }
                LinkFilterConfig::Regex { exprs } => Box::new(LinkUrlRegexFilter::new(exprs)?),
                LinkFilterConfig::FilenameAsTitle { trim_ext } => {
                    Box::new(LinkFilenameAsTitleFilter::new(*trim_ext))
                }
                LinkFilterConfig::ExpandUploadedLinks => {
                    Box::new(LinkUploadedExpandFilenameFilter::new(source.clone()))
                }
                LinkFilterConfig::Duplicates { size } => {
                    Box::new(LinkDuplicatesFilter::new(*size))
                }
            })
        })
        .collect()
}
