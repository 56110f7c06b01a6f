pub mod emitter;
pub mod feed;
pub mod html;

use async_trait::async_trait;

use crate::app::Result;

pub use emitter::Emitter;
pub use feed::FeedScanner;
pub use html::PageScanner;

/// Scans fetched content and emits items, links or follow URLs.
#[async_trait]
pub trait Scanner: Send + Sync {
    async fn scan(&self, body: &str, emitter: &mut Emitter) -> Result<()>;
}
