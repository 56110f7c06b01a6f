use std::fmt;

use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

/// Failure to retrieve a resource.
///
/// Carries whether the failure was a carrier-level transient condition
/// (timeout, connection failure, retryable status) that may succeed on a
/// later attempt. The fetcher treats temporary and terminal source errors
/// differently, so the distinction must survive the trait boundary.
#[derive(Debug)]
pub struct SourceError {
    message: String,
    temporary: bool,
}

impl SourceError {
    pub fn new(message: impl Into<String>, temporary: bool) -> Self {
        Self {
            message: message.into(),
            temporary,
        }
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SourceError {}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        let temporary = err.is_timeout()
            || err.is_connect()
            || err
                .status()
                .is_some_and(|s| matches!(s.as_u16(), 429 | 502 | 503 | 504 | 508));

        Self::new(format!("could not retrieve resource: {err}"), temporary)
    }
}

/// Retrieves the resource at a URL and returns its content as UTF-8 text.
#[async_trait]
pub trait Source: Send + Sync {
    async fn get(&self, url: &str) -> Result<String, SourceError>;
}

/// HTTP [`Source`] backed by a shared reqwest client.
///
/// The whole body is read into memory before returning, so the connection
/// is released before downstream parsing begins. The body is decoded to
/// UTF-8 from the BOM or the Content-Type charset, defaulting to UTF-8
/// with replacement.
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(user_agent: &str) -> Self {
        let client = Client::builder()
            .gzip(true)
            .user_agent(user_agent)
            .build()
            .expect("Failed to build HTTP client");

        Self { client }
    }
}

#[async_trait]
impl Source for HttpSource {
    async fn get(&self, url: &str) -> Result<String, SourceError> {
        let response = self.client.get(url).send().await?;
        response.error_for_status_ref()?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let bytes = response.bytes().await?;

        Ok(decode_body(&bytes, content_type.as_deref()))
    }
}

fn decode_body(bytes: &[u8], content_type: Option<&str>) -> String {
    let encoding = content_type
        .and_then(charset_from_content_type)
        .unwrap_or(UTF_8);

    // decode() sniffs the BOM first, so a BOM overrides the header label.
    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

fn charset_from_content_type(content_type: &str) -> Option<&'static Encoding> {
    content_type
        .split(';')
        .skip(1)
        .find_map(|param| param.trim().strip_prefix("charset="))
        .map(|label| label.trim_matches('"'))
        .and_then(|label| Encoding::for_label(label.as_bytes()))
}
