use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{error, info, warn};

use crate::db::{Database, UpsertOutcome};
use crate::fetchers::{http_client, Provider, RawPosting, Screener, Screening};
use crate::rules::engine::Rejection;
use crate::rules::loader::FilterSettings;
use crate::rules::Rules;
use crate::sources::Source;

const REPORTED_REJECTIONS: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceStats {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub filtered: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchResults {
    pub total: usize,
    pub added: usize,
    pub updated: usize,
    pub skipped_by_status: usize,
    pub skipped_by_blocklist: usize,
    pub duplicates: usize,
    pub by_provider: BTreeMap<String, usize>,
    pub by_source: BTreeMap<String, SourceStats>,
    pub rejections: Vec<Rejection>,
    pub errors: Vec<String>,
}

/// Fetches every active source, screens the postings and persists the survivors.
pub struct JobFetchService<'a> {
    db: &'a Database,
    rules: &'a Rules,
}

impl<'a> JobFetchService<'a> {
    pub fn new(db: &'a Database, rules: &'a Rules) -> Self {
        Self { db, rules }
    }

    pub fn fetch_all(&self, sources: &[Source]) -> Result<FetchResults> {
        let client = http_client()?;
        self.fetch_all_with(sources, |provider, slug| provider.fetcher().fetch(&client, slug))
    }

    /// `fetch_all` with the network call supplied by the caller.
    pub fn fetch_all_with<F>(&self, sources: &[Source], mut fetch: F) -> Result<FetchResults>
    where
        F: FnMut(Provider, &str) -> Result<Vec<RawPosting>>,
    {
        let mut results = FetchResults::default();
        let active: Vec<&Source> = sources.iter().filter(|s| s.active).collect();
        if active.is_empty() {
            warn!("No active job sources configured");
            return Ok(results);
        }

        let settings = FilterSettings::from_rules(self.rules, self.db.list_blocked_companies()?);
        let mut screener = Screener::new(self.rules, settings);

        for source in active {
            let provider: Provider = match source.provider.parse() {
                Ok(provider) => provider,
                Err(e) => {
                    results.errors.push(format!("{} for {}", e, source.name));
                    continue;
                }
            };

            info!(source = %source.name, %provider, "Fetching jobs");
            let postings = match fetch(provider, &source.slug) {
                Ok(postings) => postings,
                Err(e) => {
                    error!(source = %source.name, %provider, error = %e, "Fetch failed");
                    results
                        .errors
                        .push(format!("Error fetching from {} ({}): {:#}", source.name, provider, e));
                    continue;
                }
            };

            // Rows written before a failed upsert still count.
            let mut stats = SourceStats::default();
            match self.persist(&mut screener, provider, postings, &mut stats) {
                Ok(()) => info!(
                    source = %source.name,
                    added = stats.created,
                    updated = stats.updated,
                    skipped = stats.skipped,
                    duplicates = stats.duplicates,
                    rejected = stats.rejected,
                    "Fetched source"
                ),
                Err(e) => {
                    error!(source = %source.name, %provider, error = %e, added = stats.created, "Persist failed");
                    results
                        .errors
                        .push(format!("Error fetching from {} ({}): {:#}", source.name, provider, e));
                }
            }
            results.record(&source.name, provider, stats);
        }

        info!(
            total = results.total,
            added = results.added,
            rejected = screener.engine().rejection_count(),
            errors = results.errors.len(),
            "Fetch complete"
        );
        results.rejections = screener.engine().recent_rejections(REPORTED_REJECTIONS);
        Ok(results)
    }

    fn persist(
        &self,
        screener: &mut Screener,
        provider: Provider,
        postings: Vec<RawPosting>,
        stats: &mut SourceStats,
    ) -> Result<()> {
        let now = Utc::now();

        for posting in postings {
            let job = match screener.screen(provider, posting) {
                Screening::Keep(job) => job,
                Screening::Rejected(_) => {
                    stats.rejected += 1;
                    continue;
                }
                Screening::Filtered | Screening::ZeroScore | Screening::MissingUrl => {
                    stats.filtered += 1;
                    continue;
                }
            };

            match self.db.upsert_fetched(&job, now)?.1 {
                UpsertOutcome::Created => stats.created += 1,
                UpsertOutcome::Updated => stats.updated += 1,
                UpsertOutcome::Skipped => stats.skipped += 1,
                UpsertOutcome::Duplicate => stats.duplicates += 1,
            }
        }

        Ok(())
    }
}

impl FetchResults {
    fn record(&mut self, source: &str, provider: Provider, stats: SourceStats) {
        self.added += stats.created;
        self.updated += stats.updated;
        self.skipped_by_status += stats.skipped;
        self.skipped_by_blocklist += stats.rejected;
        self.duplicates += stats.duplicates;
        self.total += stats.created + stats.updated;
        *self.by_provider.entry(provider.to_string()).or_default() += stats.created + stats.updated;
        self.by_source.insert(source.to_string(), stats);
    }
}
