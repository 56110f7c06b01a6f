use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::app::{FelixError, Result};
use crate::domain::Link;
use crate::store::Datastore;

/// Shared state of the HTTP surface: the store the feed is rendered from,
/// the age window for served links, and the filter descriptions for the
/// diagnostic endpoint.
#[derive(Clone)]
pub struct ServerState {
    pub store: Arc<dyn Datastore>,
    pub feed_max_age: Duration,
    pub filter_descriptions: Arc<Vec<String>>,
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(feed_handler))
        .route("/filters", get(filters_handler))
        .with_state(state)
}

/// Binds and serves until the token is cancelled. Bind and serve failures
/// are fatal to the process.
pub async fn serve(port: u16, state: ServerState, cancel: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| FelixError::Server(format!("could not bind to port {port}: {e}")))?;

    info!(port, "feed server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| FelixError::Server(format!("server failed: {e}")))
}

/// `GET /` — the recently accepted links as an RSS 2.0 feed.
async fn feed_handler(State(state): State<ServerState>) -> Response {
    let links = match state.store.get_links(state.feed_max_age) {
        Ok(links) => links,
        Err(err) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
        }
    };

    let body = render_feed(&links, Utc::now());

    (
        [(header::CONTENT_TYPE, "application/rss+xml")],
        body,
    )
        .into_response()
}

/// `GET /filters` — the active filters, one per line, for debugging.
async fn filters_handler(State(state): State<ServerState>) -> Response {
    let mut body = state.filter_descriptions.join("\n");
    body.push('\n');

    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}

fn render_feed(links: &[Link], now: DateTime<Utc>) -> String {
    let pub_date = now.to_rfc2822();
    let mut items = String::new();

    for link in links {
        let title = html_escape::encode_text(&link.title);
        let url = html_escape::encode_text(&link.url);
        items.push_str(&format!(
            "\t<item>\n\
             \t\t<title>{title}</title>\n\
             \t\t<guid>{url}</guid>\n\
             \t\t<link>{url}</link>\n\
             \t\t<description>{title}</description>\n\
             \t\t<pubDate>{pub_date}</pubDate>\n\
             \t</item>\n"
        ));
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><rss version=\"2.0\">\n\
         <channel>\n\
         \t<title>felix</title>\n\
         \t<description>felix feed</description>\n\
         \t<link>http://example.com</link>\n\
         \t<pubDate>{pub_date}</pubDate>\n\
         {items}\
         </channel>\n\
         </rss>\n"
    )
}
