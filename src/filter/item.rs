use std::fmt;

use async_trait::async_trait;

use crate::domain::Item;
use crate::filter::{ItemFilter, Next};

/// Keeps an item when its sanitized title contains every word of at least
/// one of the configured titles.
///
/// An empty title list accepts nothing; a single empty title accepts
/// everything.
pub struct ItemTitleFilter {
    titles: Vec<Vec<String>>,
}

impl ItemTitleFilter {
    pub fn new<I, S>(titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let titles = titles
            .into_iter()
            .map(|title| {
                sanitize_title(title.as_ref())
                    .split(' ')
                    .map(String::from)
                    .collect()
            })
            .collect();

        Self { titles }
    }
}

#[async_trait]
impl ItemFilter for ItemTitleFilter {
    async fn filter(&mut self, item: Item, next: &mut Next<Item>) {
        let item_title = sanitize_title(&item.title);

        for words in &self.titles {
            if words.iter().all(|word| item_title.contains(word.as_str())) {
                next.push(item);
                return;
            }
        }
    }
}

impl fmt::Display for ItemTitleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let titles: Vec<String> = self.titles.iter().map(|words| words.join(" ")).collect();
        write!(f, "ItemTitleFilter({})", titles.join(", "))
    }
}

/// Strips all non-alphanumeric characters from a string and converts it to
/// lower case for easier comparison. Runs of stripped characters between
/// alphanumeric runs collapse to a single space.
pub fn sanitize_title(title: &str) -> String {
    let mut sanitized = String::with_capacity(title.len());
    let mut emitted = false;
    let mut skipped = false;

    for c in title.chars() {
        if c.is_alphanumeric() {
            if skipped && emitted {
                sanitized.push(' ');
            }
            sanitized.extend(c.to_lowercase());
            emitted = true;
            skipped = false;
        } else {
            skipped = true;
        }
    }

    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_title() {
        let tests = [
            ("", ""),
            ("   ", ""),
            ("  &  a : ", "a"),
            ("Title", "title"),
            ("another Interesting Title", "another interesting title"),
            ("The   Title (2017)", "the title 2017"),
            ("The TitleRRR", "the titlerrr"),
            ("A Title & With: Special Characters", "a title with special characters"),
            ("@title", "title"),
        ];

        for (input, want) in tests {
            assert_eq!(sanitize_title(input), want, "sanitize_title({input:?})");
        }
    }

    async fn run_filter(mut filter: ItemTitleFilter, input: Vec<Item>) -> Vec<Item> {
        let mut output = Vec::new();
        for item in input {
            let mut next = Next::new();
            filter.filter(item, &mut next).await;
            output.extend(next.into_records());
        }
        output
    }

    fn items(titles: &[&str]) -> Vec<Item> {
        titles.iter().map(|t| Item::new(*t, "")).collect()
    }

    #[tokio::test]
    async fn test_empty_filter_criteria_accepts_nothing() {
        let filter = ItemTitleFilter::new(Vec::<&str>::new());
        let got = run_filter(filter, items(&["a title", "another title"])).await;

        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn test_empty_string_matches_everything() {
        let filter = ItemTitleFilter::new([""]);
        let got = run_filter(filter, items(&["a title", "another title"])).await;

        assert_eq!(got.len(), 2);
    }

    #[tokio::test]
    async fn test_matching_filter() {
        let filter = ItemTitleFilter::new(["title", "another"]);
        let got = run_filter(filter, items(&["a title", "another title"])).await;

        assert_eq!(got.len(), 2);
    }

    #[tokio::test]
    async fn test_special_characters() {
        let filter =
            ItemTitleFilter::new(["A Title & With: Special Characters", "@deutscher titel"]);
        let input = items(&[
            "A.title.with.special.characters",
            "Ein deutscher Titel",
            "Un intitulé",
        ]);

        let got = run_filter(filter, input).await;

        assert_eq!(got.len(), 2);
        assert_eq!(got[0].title, "A.title.with.special.characters");
        assert_eq!(got[1].title, "Ein deutscher Titel");
    }
}
