pub mod greenhouse;
pub mod lever;
pub mod personio;
pub mod remote_ok;
pub mod remotive;
pub mod smart_recruiters;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use reqwest::blocking::{Client, RequestBuilder};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::error::WizardError;
use crate::models::{NewJob, PostingRef};
use crate::ranker::JobRanker;
use crate::rules::engine::RulesEngine;
use crate::rules::loader::FilterSettings;
use crate::rules::Rules;

pub const USER_AGENT: &str = "JobWizard/1.0";

// --- Providers ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Provider {
    Greenhouse,
    Lever,
    Personio,
    RemoteOk,
    Remotive,
    SmartRecruiters,
}

impl Provider {
    pub const ALL: &'static [Provider] = &[
        Provider::Greenhouse,
        Provider::Lever,
        Provider::Personio,
        Provider::RemoteOk,
        Provider::Remotive,
        Provider::SmartRecruiters,
    ];

    /// The value stored in `job_postings.source`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Greenhouse => "greenhouse",
            Provider::Lever => "lever",
            Provider::Personio => "personio",
            Provider::RemoteOk => "remoteok",
            Provider::Remotive => "remotive",
            Provider::SmartRecruiters => "smartrecruiters",
        }
    }

    pub fn fetcher(&self) -> Box<dyn Fetcher> {
        match self {
            Provider::Greenhouse => Box::new(greenhouse::Greenhouse),
            Provider::Lever => Box::new(lever::Lever),
            Provider::Personio => Box::new(personio::Personio),
            Provider::RemoteOk => Box::new(remote_ok::RemoteOk),
            Provider::Remotive => Box::new(remotive::Remotive),
            Provider::SmartRecruiters => Box::new(smart_recruiters::SmartRecruiters),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = WizardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['_', '-'], "").as_str() {
            "greenhouse" => Ok(Provider::Greenhouse),
            "lever" => Ok(Provider::Lever),
            "personio" => Ok(Provider::Personio),
            "remoteok" => Ok(Provider::RemoteOk),
            "remotive" => Ok(Provider::Remotive),
            "smartrecruiters" => Ok(Provider::SmartRecruiters),
            _ => Err(WizardError::UnknownProvider(s.to_string())),
        }
    }
}

// --- Fetcher trait ---

/// A posting as a provider returned it, normalized but not yet screened.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPosting {
    pub company: String,
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub remote: bool,
    pub posted_at: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub external_id: Option<String>,
    pub metadata: serde_json::Value,
}

pub trait Fetcher {
    fn provider(&self) -> Provider;

    fn endpoint(&self, slug: &str) -> String;

    /// Parses a response body. Kept separate from the request so it can run on fixtures.
    fn parse(&self, body: &str, slug: &str) -> Result<Vec<RawPosting>>;

    fn request(&self, client: &Client, url: &str) -> RequestBuilder {
        client.get(url)
    }

    fn fetch(&self, client: &Client, slug: &str) -> Result<Vec<RawPosting>> {
        let url = self.endpoint(slug);
        debug!(provider = %self.provider(), %url, "Fetching");

        let response = self
            .request(client, &url)
            .send()
            .with_context(|| format!("{} request failed for '{}'", self.provider(), slug))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("{} returned HTTP {} for '{}'", self.provider(), status, slug));
        }

        let body = response
            .text()
            .with_context(|| format!("reading {} response for '{}'", self.provider(), slug))?;
        let postings = self.parse(&body, slug)?;
        debug!(provider = %self.provider(), slug, count = postings.len(), "Parsed postings");
        Ok(postings)
    }
}

pub fn http_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(30))
        .build()
        .context("building HTTP client")
}

// --- Screening ---

#[derive(Debug, Clone, PartialEq)]
pub enum Screening {
    Keep(NewJob),
    Rejected(Vec<String>),
    Filtered,
    ZeroScore,
    MissingUrl,
}

/// Rules engine, then keyword/location filter, then ranker, for one fetch run.
pub struct Screener {
    engine: RulesEngine,
    ranker: JobRanker,
}

impl Screener {
    pub fn new(rules: &Rules, settings: FilterSettings) -> Self {
        Self {
            engine: RulesEngine::new(settings),
            ranker: JobRanker::from_rules(rules),
        }
    }

    pub fn engine(&self) -> &RulesEngine {
        &self.engine
    }

    pub fn screen(&mut self, provider: Provider, raw: RawPosting) -> Screening {
        let posting = PostingRef {
            id: None,
            company: &raw.company,
            title: &raw.title,
            description: &raw.description,
            source: Some(provider.as_str()),
        };
        if let Some(reasons) = self.engine.should_reject(posting) {
            return Screening::Rejected(reasons);
        }

        let location = raw.location.as_deref();
        if !self.ranker.filter().keep(&raw.title, &raw.description, location) {
            return Screening::Filtered;
        }

        let score = self.ranker.score(&raw.title, &raw.description, location);
        if score == 0.0 {
            return Screening::ZeroScore;
        }

        let Some(url) = raw.url.filter(|u| !u.trim().is_empty()) else {
            return Screening::MissingUrl;
        };

        Screening::Keep(NewJob {
            company: raw.company,
            title: raw.title,
            description: raw.description,
            location: raw.location,
            remote: raw.remote,
            posted_at: raw.posted_at,
            url,
            source: Some(provider.as_str().to_string()),
            external_id: raw.external_id,
            metadata: raw.metadata,
            score,
        })
    }
}

// --- Parsing helpers ---

/// Accepts RFC 3339, naive date-times, plain dates and epoch seconds.
pub fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if input.chars().all(|c| c.is_ascii_digit()) {
        return input.parse::<i64>().ok().and_then(|secs| Utc.timestamp_opt(secs, 0).single());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S %z") {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Ids arrive as numbers from some providers and strings from others.
pub(crate) fn id_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use serde_json::json;

    const RULES: &str = r#"
job_filters:
  include_keywords: [ruby, rails]
  exclude_keywords: [php]
scoring:
  boosts: { rails: 3, ruby: 2 }
"#;

    fn screener() -> Screener {
        let rules = Rules::from_yaml_str(RULES).unwrap();
        let settings = FilterSettings::from_rules(&rules, Vec::new());
        Screener::new(&rules, settings)
    }

    fn raw(title: &str, description: &str) -> RawPosting {
        RawPosting {
            company: "Acme".to_string(),
            title: title.to_string(),
            description: description.to_string(),
            location: Some("Remote".to_string()),
            remote: true,
            url: Some("https://example.com/1".to_string()),
            external_id: Some("1".to_string()),
            metadata: json!({}),
            ..Default::default()
        }
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!("remote_ok".parse::<Provider>().unwrap(), Provider::RemoteOk);
        assert_eq!("SmartRecruiters".parse::<Provider>().unwrap(), Provider::SmartRecruiters);
        assert_eq!("smart-recruiters".parse::<Provider>().unwrap(), Provider::SmartRecruiters);
        for provider in Provider::ALL {
            assert_eq!(provider.as_str().parse::<Provider>().unwrap(), *provider);
            assert_eq!(provider.fetcher().provider(), *provider);
        }
        let err = "monster".parse::<Provider>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown provider: monster");
    }

    #[test]
    fn test_screen_keeps_scored_job() {
        let mut screener = screener();
        match screener.screen(Provider::Lever, raw("Rails Engineer", "Ruby and Rails daily")) {
            Screening::Keep(job) => {
                assert_eq!(job.source.as_deref(), Some("lever"));
                assert_eq!(job.score, 3.0 + 2.0 + 3.0);
                assert_eq!(job.url, "https://example.com/1");
            }
            other => panic!("expected keep, got {:?}", other),
        }
    }

    #[test]
    fn test_screen_drop_reasons() {
        let mut screener = screener();

        let rejected = screener.screen(Provider::Lever, raw("Rails Engineer", "Rails, casino platform"));
        assert!(matches!(rejected, Screening::Rejected(ref r) if r.contains(&"Contains blocked content".to_string())));

        let mut restricted = raw("Rails Engineer", "Rails");
        restricted.location = Some("Germany".to_string());
        assert_eq!(screener.screen(Provider::Lever, restricted), Screening::Filtered);

        let mut no_url = raw("Rails Engineer", "Rails");
        no_url.url = None;
        assert_eq!(screener.screen(Provider::Lever, no_url), Screening::MissingUrl);

        assert_eq!(screener.engine().rejection_count(), 1);
    }

    #[test]
    fn test_screen_zero_score() {
        let rules = Rules::from_yaml_str(
            "job_filters: { include_keywords: [ruby] }\nranking: { min_keep_score: 50 }",
        )
        .unwrap();
        let mut screener = Screener::new(&rules, FilterSettings::from_rules(&rules, Vec::new()));
        assert_eq!(
            screener.screen(Provider::Remotive, raw("Ruby Engineer", "Ruby on Rails")),
            Screening::ZeroScore
        );
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let rfc = parse_timestamp("2024-03-05T10:00:00-05:00").unwrap();
        assert_eq!(rfc.to_rfc3339(), "2024-03-05T15:00:00+00:00");
        assert_eq!(parse_timestamp("1709632800").unwrap().year(), 2024);
        assert_eq!(parse_timestamp("2024-03-05").unwrap().day(), 5);
        assert_eq!(parse_timestamp("2024-03-05 10:00:00").unwrap().month(), 3);
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_id_string() {
        assert_eq!(id_string(&json!(42)), Some("42".to_string()));
        assert_eq!(id_string(&json!("abc")), Some("abc".to_string()));
        assert_eq!(id_string(&json!(null)), None);
    }
}
