use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rusqlite_migration::{Migrations, M};

use crate::app::{FelixError, Result};
use crate::domain::{Item, Link};
use crate::store::Datastore;

const SCHEMA: &str = "
CREATE TABLE items (
    url      TEXT PRIMARY KEY,
    title    TEXT NOT NULL,
    pub_date TEXT NOT NULL,
    added    TEXT NOT NULL
);
CREATE TABLE links (
    url   TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    added TEXT NOT NULL
);
CREATE TABLE attempts (
    key   TEXT PRIMARY KEY,
    last  TEXT NOT NULL,
    count INTEGER NOT NULL
);
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(SCHEMA)]);

        let mut conn = self.conn()?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| FelixError::Other(format!("migration failed: {e}")))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| FelixError::Other(format!("datastore lock poisoned: {e}")))
    }

    fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| FelixError::Decode(format!("invalid stored timestamp {s:?}: {e}")))
    }

    fn cutoff(max_age: Duration) -> DateTime<Utc> {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        Utc::now()
            .checked_sub_signed(max_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl Datastore for SqliteStore {
    fn last_attempt(&self, key: &str) -> Result<(Option<DateTime<Utc>>, u32)> {
        let conn = self.conn()?;

        let row = conn
            .query_row(
                "SELECT last, count FROM attempts WHERE key = ?1",
                params![key],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)),
            )
            .optional()?;

        match row {
            None => Ok((None, 0)),
            Some((last, count)) => Ok((Some(Self::parse_datetime(&last)?), count)),
        }
    }

    fn inc_attempt(&self, key: &str) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO attempts (key, last, count) VALUES (?1, ?2, 1)
             ON CONFLICT(key) DO UPDATE SET count = count + 1, last = excluded.last",
            params![key, Utc::now().to_rfc3339()],
        )?;

        Ok(())
    }

    fn store_item(&self, item: &Item) -> Result<bool> {
        let conn = self.conn()?;

        let inserted = conn.execute(
            "INSERT INTO items (url, title, pub_date, added) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(url) DO NOTHING",
            params![
                item.url,
                item.title,
                item.pub_date.to_rfc3339(),
                Utc::now().to_rfc3339()
            ],
        )?;

        Ok(inserted == 0)
    }

    fn store_link(&self, link: &Link) -> Result<bool> {
        let conn = self.conn()?;

        let inserted = conn.execute(
            "INSERT INTO links (url, title, added) VALUES (?1, ?2, ?3)
             ON CONFLICT(url) DO NOTHING",
            params![link.url, link.title, Utc::now().to_rfc3339()],
        )?;

        Ok(inserted == 0)
    }

    fn get_items(&self, max_age: Duration) -> Result<Vec<Item>> {
        let cutoff = Self::cutoff(max_age);
        let conn = self.conn()?;

        let mut stmt = conn.prepare("SELECT url, title, pub_date, added FROM items")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut items = Vec::new();
        for row in rows {
            let (url, title, pub_date, added) = row?;
            if Self::parse_datetime(&added)? > cutoff {
                items.push(Item {
                    title,
                    url,
                    pub_date: Self::parse_datetime(&pub_date)?,
                });
            }
        }

        Ok(items)
    }

    fn get_links(&self, max_age: Duration) -> Result<Vec<Link>> {
        let cutoff = Self::cutoff(max_age);
        let conn = self.conn()?;

        let mut stmt = conn.prepare("SELECT url, title, added FROM links")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut links = Vec::new();
        for row in rows {
            let (url, title, added) = row?;
            if Self::parse_datetime(&added)? > cutoff {
                links.push(Link { title, url });
            }
        }

        Ok(links)
    }

    fn cleanup(&self, max_age: Duration) -> Result<()> {
        let cutoff = Self::cutoff(max_age);
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for (table, key_col, time_col) in [
            ("items", "url", "added"),
            ("links", "url", "added"),
            ("attempts", "key", "last"),
        ] {
            let expired = {
                let mut stmt = tx.prepare(&format!("SELECT {key_col}, {time_col} FROM {table}"))?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;

                let mut expired = Vec::new();
                for row in rows {
                    let (key, stamp) = row?;
                    if Self::parse_datetime(&stamp)? < cutoff {
                        expired.push(key);
                    }
                }
                expired
            };

            for key in expired {
                tx.execute(
                    &format!("DELETE FROM {table} WHERE {key_col} = ?1"),
                    params![key],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hours(h: u64) -> Duration {
        Duration::from_secs(h * 3600)
    }

    #[test]
    fn test_store_item_is_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        let item = Item::new("Item Title 1", "http://example.com");

        assert!(!store.store_item(&item).unwrap());
        assert!(store.store_item(&item).unwrap());

        let items = store.get_items(hours(1)).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Item Title 1");
    }

    #[test]
    fn test_store_link_is_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        let link = Link::new("Link Title 1", "http://example.com");

        assert!(!store.store_link(&link).unwrap());
        assert!(store.store_link(&link).unwrap());

        assert_eq!(store.get_links(hours(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_get_items_honors_max_age() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .store_item(&Item::new("Item Title 1", "http://example.com"))
            .unwrap();

        assert!(store.get_items(Duration::ZERO).unwrap().is_empty());
        assert_eq!(store.get_items(hours(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_get_links_honors_max_age() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .store_link(&Link::new("Link Title 1", "http://example.com"))
            .unwrap();

        assert!(store.get_links(Duration::ZERO).unwrap().is_empty());
        assert_eq!(store.get_links(hours(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_last_attempt_unknown_key() {
        let store = SqliteStore::in_memory().unwrap();

        let (last, count) = store.last_attempt("key").unwrap();
        assert_eq!(last, None);
        assert_eq!(count, 0);

        // The read must not have created a record.
        let rows: i64 = store
            .conn()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM attempts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[test]
    fn test_inc_attempt_counts_up() {
        let store = SqliteStore::in_memory().unwrap();

        for expected in 1..=3u32 {
            store.inc_attempt("key").unwrap();
            let (last, count) = store.last_attempt("key").unwrap();
            assert!(last.is_some());
            assert_eq!(count, expected);
        }

        // Other keys are unaffected.
        let (last, count) = store.last_attempt("key2").unwrap();
        assert_eq!(last, None);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_cleanup_preserves_fresh_records() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .store_item(&Item::new("t", "http://example.com"))
            .unwrap();
        store
            .store_link(&Link::new("t", "http://example.com"))
            .unwrap();
        store.inc_attempt("key").unwrap();

        store.cleanup(hours(10)).unwrap();

        assert_eq!(store.get_items(hours(1)).unwrap().len(), 1);
        assert_eq!(store.get_links(hours(1)).unwrap().len(), 1);
        assert_eq!(store.last_attempt("key").unwrap().1, 1);
    }

    #[test]
    fn test_cleanup_zero_max_age_empties_store() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .store_item(&Item::new("t", "http://example.com"))
            .unwrap();
        store
            .store_link(&Link::new("t", "http://example.com"))
            .unwrap();
        store.inc_attempt("key").unwrap();

        store.cleanup(Duration::ZERO).unwrap();

        assert!(store.get_items(hours(1)).unwrap().is_empty());
        assert!(store.get_links(hours(1)).unwrap().is_empty());
        assert_eq!(store.last_attempt("key").unwrap(), (None, 0));
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("felix.db");

        {
            let store = SqliteStore::new(&path).unwrap();
            store
                .store_link(&Link::new("t", "http://example.com"))
                .unwrap();
        }

        let store = SqliteStore::new(&path).unwrap();
        assert_eq!(store.get_links(hours(1)).unwrap().len(), 1);
    }
}
