//! # felix
//!
//! A feed-watching link harvester. Felix polls a configured set of RSS
//! feeds, follows entries whose titles match the configured patterns,
//! scrapes the linked pages for outbound URLs, filters those against
//! user-declared rules, and re-exports everything it accepted as an RSS
//! feed of its own.
//!
//! ## Architecture
//!
//! ```text
//! feeds → feed Fetchers → item filters → page Fetchers → link filters → store
//!                                                                         ↓
//!                                                                     GET / (RSS)
//! ```
//!
//! - [`fetcher`]: the per-URL control loop (wait, record the attempt,
//!   fetch, scan, follow)
//! - [`schedule`]: durable attempt scheduling with periodic and
//!   fibonacci-backoff policies
//! - [`filter`]: middleware-style filter chains for items and links
//! - [`store`]: SQLite persistence with URL-keyed dedup and age retention
//! - [`server`]: the outbound feed and the `/filters` diagnostic

/// Error types shared across the crate.
pub mod app;

/// YAML configuration: feeds, filters, intervals.
pub mod config;

/// The supervisor: wires fetchers, filters, cleanup and the server
/// together and manages ordered shutdown.
pub mod daemon;

/// Core records flowing through the pipeline.
pub mod domain;

/// Per-URL fetch control loop.
pub mod fetcher;

/// Filter chains and the built-in filter stages.
pub mod filter;

/// Content scanners and the emitter they feed.
pub mod scanner;

/// Attempt scheduling policies over durable per-key state.
pub mod schedule;

/// The HTTP surface: the RSS export and filter diagnostics.
pub mod server;

/// Resource retrieval with UTF-8 normalization.
pub mod source;

/// Datastore contract and the SQLite implementation.
pub mod store;
