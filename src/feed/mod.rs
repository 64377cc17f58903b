//! Feed source collaborator: RSS/Atom fetching and entry extraction.
//!
//! - [`parser`] - Low-level feed parsing using the `feed-rs` crate
//! - [`fetcher`] - Bounded HTTP retrieval (fixed timeout, capped body,
//!   capped entry count) with no retries — a failed source is simply
//!   skipped for this run

mod fetcher;
mod parser;

pub use fetcher::{fetch_entries, FetchError, PER_SOURCE_CAP};
pub use parser::FeedEntry;
