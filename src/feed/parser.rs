use anyhow::Result;
use chrono::{DateTime, Utc};
use feed_rs::parser;

/// One feed entry, reduced to the fields the pipeline cares about.
#[derive(Debug, Clone)]
pub struct FeedEntry {
    /// Entry link, falling back to the guid when the guid is itself a URL.
    /// `None` means no record id can be derived and the entry is skipped.
    pub link: Option<String>,
    pub title: String,
    /// First non-empty of summary, content body, title. May still be empty
    /// when the entry carries no text at all.
    pub content: String,
    pub published: Option<DateTime<Utc>>,
}

/// Parses raw RSS/Atom bytes into entries.
///
/// Untyped semi-structured input: any absent field degrades to a fallback
/// value rather than failing the entry. Only unparseable XML is an error.
pub fn parse_entries(bytes: &[u8]) -> Result<Vec<FeedEntry>> {
    let feed = parser::parse(bytes)?;

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .filter(|href| !href.trim().is_empty())
                // feed-rs synthesizes ids for entries that lack one, so the
                // guid only counts as a link when it is an actual URL
                .or_else(|| {
                    let id = entry.id.trim();
                    if id.starts_with("http://") || id.starts_with("https://") {
                        Some(id.to_string())
                    } else {
                        None
                    }
                });

            let title = entry.title.map(|t| t.content).unwrap_or_default();

            let summary = entry.summary.map(|s| s.content);
            let body = entry.content.and_then(|c| c.body);
            let content = [summary, body, Some(title.clone())]
                .into_iter()
                .flatten()
                .find(|s| !s.trim().is_empty())
                .unwrap_or_default();

            let published = entry.published.or(entry.updated);

            FeedEntry {
                link,
                title,
                content,
                published,
            }
        })
        .collect();

    Ok(entries)
}
