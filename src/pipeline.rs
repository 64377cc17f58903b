//! The ingestion pipeline: one full batch cycle from raw feed entries to
//! the persisted radar document.
//!
//! Strictly sequential: sources one at a time, entries within a source one
//! at a time, each transform awaited before the next. Per-source and
//! per-entry failures are logged and skipped; only store I/O failures
//! escape to the caller.

use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;

use crate::config::Config;
use crate::feed;
use crate::radar::{self, Record, StoreError};
use crate::transform::{TransformInput, Transformer};

/// Counters reported after a run. Logged at info level so unattended runs
/// leave a usable trace of what happened.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub sources_failed: usize,
    pub entries_seen: usize,
    pub duplicates_skipped: usize,
    pub transform_failures: usize,
    pub gate_rejections: usize,
    pub added: usize,
}

pub struct Pipeline<'a> {
    config: &'a Config,
    client: reqwest::Client,
    transformer: Transformer,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config, client: reqwest::Client, transformer: Transformer) -> Self {
        Self {
            config,
            client,
            transformer,
        }
    }

    /// Drives one batch cycle: load, dedupe, fetch, transform, gate, merge,
    /// persist.
    ///
    /// The collection is written exactly once at the end, with a refreshed
    /// `updatedAt` even when nothing was added.
    pub async fn run(&self, radar_path: &Path) -> Result<RunSummary, StoreError> {
        let mut db = radar::load(radar_path, &self.config.title)?;
        let mut seen: HashSet<String> = db.seen_ids();
        let mut added: Vec<Record> = Vec::new();
        let mut summary = RunSummary::default();

        for source in &self.config.sources {
            let entries = match feed::fetch_entries(&self.client, &source.url).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::error!(source = %source.name, error = %e, "Feed fetch failed; skipping source");
                    summary.sources_failed += 1;
                    continue;
                }
            };
            tracing::debug!(source = %source.name, entries = entries.len(), "Fetched feed");

            for entry in entries {
                summary.entries_seen += 1;

                let Some(link) = entry.link.as_deref() else {
                    continue;
                };
                if entry.content.trim().is_empty() {
                    continue;
                }
                let id = radar::safe_id(link);
                if id.is_empty() {
                    continue;
                }
                if seen.contains(&id) {
                    summary.duplicates_skipped += 1;
                    continue;
                }

                let input = TransformInput {
                    title: &entry.title,
                    url: link,
                    content: &entry.content,
                    source_name: &source.name,
                };
                let raw = match self.transformer.transform(&input).await {
                    Ok(raw) => raw,
                    Err(e) => {
                        tracing::error!(
                            source = %source.name,
                            url = %link,
                            error = %e,
                            "Transform failed; skipping entry"
                        );
                        summary.transform_failures += 1;
                        continue;
                    }
                };

                if let Err(reason) = raw.check_quality(self.config.min_confidence) {
                    tracing::debug!(
                        source = %source.name,
                        url = %link,
                        reason = %reason,
                        "Quality gate rejected candidate"
                    );
                    summary.gate_rejections += 1;
                    continue;
                }

                let published = entry.published.unwrap_or_else(Utc::now);
                let record =
                    raw.into_record(id.clone(), &entry.title, link, published, &source.name);
                seen.insert(id);
                added.push(record);
            }
        }

        summary.added = added.len();
        db.absorb(added);
        radar::save(&db, radar_path)?;

        tracing::info!(
            added = summary.added,
            entries_seen = summary.entries_seen,
            duplicates_skipped = summary.duplicates_skipped,
            transform_failures = summary.transform_failures,
            gate_rejections = summary.gate_rejections,
            sources_failed = summary.sources_failed,
            items_total = db.items.len(),
            "Run complete"
        );

        Ok(summary)
    }
}

// ============================================================================
// Tests
// ============================================================================
