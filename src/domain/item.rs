use chrono::{DateTime, Utc};

/// A feed entry that should be scraped for links.
///
/// Items are identified by their URL; the datastore keeps at most one
/// record per URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub title: String,
    pub url: String,
    pub pub_date: DateTime<Utc>,
}

impl Item {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            pub_date: Utc::now(),
        }
    }
}
