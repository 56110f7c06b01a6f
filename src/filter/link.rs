use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::time::timeout;
use tracing::debug;
use url::Url;

use crate::app::Result;
use crate::domain::Link;
use crate::filter::{LinkFilter, Next};
use crate::source::Source;

/// Keeps a link when its hostname equals one of the configured domains
/// (case-insensitive). Unparseable URLs and an empty domain list drop
/// everything.
pub struct LinkDomainFilter {
    domains: Vec<String>,
}

impl LinkDomainFilter {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domains = domains
            .into_iter()
            .map(|d| d.as_ref().trim().to_lowercase())
            .collect();

        Self { domains }
    }
}

#[async_trait]
impl LinkFilter for LinkDomainFilter {
    async fn filter(&mut self, link: Link, next: &mut Next<Link>) {
        let Ok(url) = Url::parse(&link.url) else {
            return;
        };

        let hostname = url.host_str().unwrap_or("").to_lowercase();

        if self.domains.iter().any(|domain| *domain == hostname) {
            next.push(link);
        }
    }
}

impl fmt::Display for LinkDomainFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinkDomainFilter({})", self.domains.join(", "))
    }
}

/// Keeps a link when its trimmed URL matches at least one of the
/// configured expressions. An empty expression list drops everything.
pub struct LinkUrlRegexFilter {
    patterns: Vec<Regex>,
}

impl LinkUrlRegexFilter {
    /// Fails on the first invalid expression.
    pub fn new<I, S>(exprs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = exprs
            .into_iter()
            .map(|expr| Regex::new(expr.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }
}

#[async_trait]
impl LinkFilter for LinkUrlRegexFilter {
    async fn filter(&mut self, link: Link, next: &mut Next<Link>) {
        let url = link.url.trim();

        if self.patterns.iter().any(|pattern| pattern.is_match(url)) {
            next.push(link);
        }
    }
}

impl fmt::Display for LinkUrlRegexFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exprs: Vec<&str> = self.patterns.iter().map(|p| p.as_str()).collect();
        write!(f, "LinkUrlRegexFilter({})", exprs.join(", "))
    }
}

/// Replaces a link's title with the filename component of its URL path,
/// optionally stripping the final dotted extension. Links without a usable
/// filename pass through unchanged; this filter never drops.
pub struct LinkFilenameAsTitleFilter {
    trim_ext: bool,
}

impl LinkFilenameAsTitleFilter {
    pub fn new(trim_ext: bool) -> Self {
        Self { trim_ext }
    }
}

#[async_trait]
impl LinkFilter for LinkFilenameAsTitleFilter {
    async fn filter(&mut self, mut link: Link, next: &mut Next<Link>) {
        let Ok(url) = Url::parse(&link.url) else {
            next.push(link);
            return;
        };

        let path = url.path();
        if path.ends_with('/') {
            next.push(link);
            return;
        }

        let segment = path.rsplit('/').next().unwrap_or("");
        let filename = match urlencoding::decode(segment) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => segment.to_string(),
        };

        if filename.trim().is_empty() {
            next.push(link);
            return;
        }

        link.title = if self.trim_ext {
            match filename.rsplit_once('.') {
                Some((stem, _ext)) => stem.to_string(),
                None => filename,
            }
        } else {
            filename
        };

        next.push(link);
    }
}

impl fmt::Display for LinkFilenameAsTitleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinkFilenameAsTitleFilter(trimExt: {})", self.trim_ext)
    }
}

const EXPAND_HOSTS: [&str; 2] = ["ul.to", "uploaded.net"];

const STATUS_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Expands short-form uploaded.net / ul.to links to their canonical
/// filename form by querying the file's status endpoint.
///
/// Links on other domains pass through untouched. On a matching domain, a
/// failed or unparseable status lookup drops the link: a short-form link
/// without a resolvable filename is useless downstream.
pub struct LinkUploadedExpandFilenameFilter {
    source: Arc<dyn Source>,
}

impl LinkUploadedExpandFilenameFilter {
    pub fn new(source: Arc<dyn Source>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl LinkFilter for LinkUploadedExpandFilenameFilter {
    async fn filter(&mut self, mut link: Link, next: &mut Next<Link>) {
        let Ok(url) = Url::parse(&link.url) else {
            return;
        };

        let host = url.host_str().unwrap_or("").to_lowercase();
        if !EXPAND_HOSTS.contains(&host.as_str()) {
            next.push(link);
            return;
        }

        // Short forms are "/file/{id}" (optionally with a trailing slash)
        // and the ultra short "/{id}". Anything else, including already
        // expanded "/file/{id}/{filename}", passes through.
        let path = url.path().trim_matches('/');
        let segments: Vec<&str> = path.split('/').collect();
        let id = match segments.as_slice() {
            ["file", id] => *id,
            [id] if !id.is_empty() && *id != "file" => *id,
            _ => {
                next.push(link);
                return;
            }
        };

        let status_url = format!("{}://{}/file/{}/status", url.scheme(), host, id);
        let body = match timeout(STATUS_FETCH_TIMEOUT, self.source.get(&status_url)).await {
            Ok(Ok(body)) => body,
            Ok(Err(err)) => {
                debug!(url = %link.url, err = %err, "could not fetch filename, dropping link");
                return;
            }
            Err(_) => {
                debug!(url = %link.url, "filename fetch timed out, dropping link");
                return;
            }
        };

        let filename = body.lines().next().unwrap_or("").trim();
        if filename.is_empty() {
            debug!(url = %link.url, "no filename in status response, dropping link");
            return;
        }

        link.url = format!("{}://{}/file/{}/{}", url.scheme(), host, id, filename);
        next.push(link);
    }
}

impl fmt::Display for LinkUploadedExpandFilenameFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LinkUploadedExpandFilenameFilter({})",
            EXPAND_HOSTS.join(", ")
        )
    }
}

/// Drops links whose URL was already seen within a sliding window of the
/// last `size` unique URLs. The window is per-instance.
pub struct LinkDuplicatesFilter {
    size: usize,
    window: VecDeque<String>,
    seen: HashSet<String>,
}

impl LinkDuplicatesFilter {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            window: VecDeque::with_capacity(size),
            seen: HashSet::with_capacity(size),
        }
    }
}

#[async_trait]
impl LinkFilter for LinkDuplicatesFilter {
    async fn filter(&mut self, link: Link, next: &mut Next<Link>) {
        if self.seen.contains(&link.url) {
            return;
        }

        if self.window.len() >= self.size {
            if let Some(oldest) = self.window.pop_front() {
                self.seen.remove(&oldest);
            }
        }

        self.window.push_back(link.url.clone());
        self.seen.insert(link.url.clone());
        next.push(link);
    }
}

impl fmt::Display for LinkDuplicatesFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinkDuplicatesFilter(size: {})", self.size)
    }
}
