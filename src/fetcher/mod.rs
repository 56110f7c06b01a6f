use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::domain::{Item, Link};
use crate::scanner::{Emitter, Scanner};
use crate::schedule::Attempter;
use crate::source::Source;

/// Budget for one fetch attempt, shared by all follow URLs of the attempt.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(15);

/// Control loop for a single URL.
///
/// Each iteration asks the scheduler whether and when to run, waits out the
/// computed delay (or exits on shutdown), records the attempt, then fetches
/// and scans the URL plus any follow URLs discovered along the way. All
/// scheduling state lives in the datastore; the fetcher itself is
/// stateless between attempts.
pub struct Fetcher {
    url: String,
    source: Arc<dyn Source>,
    scanner: Arc<dyn Scanner>,
    attempter: Arc<dyn Attempter>,
    items: Option<mpsc::Sender<Item>>,
    links: Option<mpsc::Sender<Link>>,
}

impl Fetcher {
    pub fn new(
        url: impl Into<String>,
        source: Arc<dyn Source>,
        scanner: Arc<dyn Scanner>,
        attempter: Arc<dyn Attempter>,
        items: Option<mpsc::Sender<Item>>,
        links: Option<mpsc::Sender<Link>>,
    ) -> Self {
        Self {
            url: url.into(),
            source,
            scanner,
            attempter,
            items,
            links,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!(url = %self.url, "started fetcher");

        loop {
            let (should_continue, wait) = match self.attempter.next(&self.url) {
                Ok(next) => next,
                Err(err) => {
                    error!(url = %self.url, err = %err, "could not schedule next fetch");
                    return;
                }
            };

            if !should_continue {
                info!(url = %self.url, "will not try to continue, quitting");
                return;
            }

            // Sole normalization point for negative ("overdue") waits.
            let wait = wait.to_std().unwrap_or(Duration::ZERO);
            info!(url = %self.url, wait = ?wait, "waiting until next fetch");

            tokio::select! {
                () = sleep(wait) => {}
                () = cancel.cancelled() => return,
            }

            if let Err(err) = self.attempter.inc(&self.url) {
                error!(url = %self.url, err = %err, "could not record attempt");
                return;
            }

            self.attempt().await;
        }
    }

    /// Runs one attempt: fetch and scan the primary URL and every follow
    /// URL queued during scanning, in FIFO order, under one shared
    /// deadline. Errors skip the current follow and move on.
    async fn attempt(&self) {
        let deadline = Instant::now() + ATTEMPT_TIMEOUT;
        let mut emitter = Emitter::new(self.items.clone(), self.links.clone());
        emitter.emit_follow(&self.url);

        while let Some(follow) = emitter.next_follow() {
            let body = match timeout_at(deadline, self.source.get(&follow)).await {
                Err(_) => {
                    error!(url = %self.url, follow = %follow, "attempt deadline exceeded");
                    continue;
                }
                Ok(Err(err)) if err.is_temporary() => {
                    error!(url = %self.url, follow = %follow, err = %err, "temporary net error");
                    continue;
                }
                Ok(Err(err)) => {
                    error!(url = %self.url, follow = %follow, err = %err, "could not get resource");
                    continue;
                }
                Ok(Ok(body)) => body,
            };

            if let Err(err) = self.scanner.scan(&body, &mut emitter).await {
                error!(url = %self.url, follow = %follow, err = %err, "could not scan content");
            }
        }
    }
}
