use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use regex::Regex;
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::LazyLock;

use super::{id_string, non_blank, parse_timestamp, Fetcher, Provider, RawPosting, USER_AGENT};
use crate::html;

static DEV_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)dev|engineer|software|programmer|backend|frontend|fullstack|rails|ruby")
        .expect("valid regex")
});

#[derive(Debug, Deserialize)]
struct Job {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    position: String,
    #[serde(default)]
    company: String,
    description: Option<String>,
    location: Option<String>,
    url: Option<String>,
    #[serde(default)]
    date: Value,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    salary_min: Value,
    #[serde(default)]
    salary_max: Value,
}

pub struct RemoteOk;

impl Fetcher for RemoteOk {
    fn provider(&self) -> Provider {
        Provider::RemoteOk
    }

    fn endpoint(&self, _slug: &str) -> String {
        "https://remoteok.com/api".to_string()
    }

    fn request(&self, client: &Client, url: &str) -> RequestBuilder {
        client.get(url).header(reqwest::header::USER_AGENT, USER_AGENT)
    }

    fn parse(&self, body: &str, _slug: &str) -> Result<Vec<RawPosting>> {
        let entries: Vec<Value> = serde_json::from_str(body).context("parsing RemoteOK feed")?;

        let mut postings = Vec::new();
        for (index, entry) in entries.into_iter().enumerate() {
            if index == 0 && entry.get("legal").is_some() {
                continue;
            }
            let job: Job = serde_json::from_value(entry).context("parsing RemoteOK job")?;
            if !job.tags.iter().any(|tag| DEV_TAG.is_match(tag)) {
                continue;
            }
            postings.push(normalize(job));
        }
        Ok(postings)
    }
}

fn normalize(job: Job) -> RawPosting {
    let id = id_string(&job.id);
    let url = non_blank(job.url.as_deref()).or_else(|| {
        id.as_ref()
            .map(|id| format!("https://remoteok.com/remote-jobs/{}", id))
    });

    RawPosting {
        company: job.company.trim().to_string(),
        title: job.position.trim().to_string(),
        description: html::clean(job.description.as_deref().unwrap_or_default()),
        location: Some(non_blank(job.location.as_deref()).unwrap_or_else(|| "Remote".to_string())),
        remote: true,
        posted_at: posted_at(&job.date),
        url,
        external_id: id.clone(),
        metadata: json!({
            "remoteok_id": id,
            "tags": job.tags,
            "salary_min": job.salary_min,
            "salary_max": job.salary_max,
        }),
    }
}

fn posted_at(date: &Value) -> Option<chrono::DateTime<Utc>> {
    match date {
        Value::Number(n) => n.as_i64().and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        Value::String(s) => parse_timestamp(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"[
      { "legal": "API Terms of Service" },
      {
        "id": "1091",
        "position": "Senior Rails Developer",
        "company": "Remote Co",
        "description": "<p>Rails &amp; Sidekiq</p>",
        "tags": ["ruby", "backend"],
        "date": "2024-03-01T12:00:00+00:00",
        "salary_min": 120000,
        "salary_max": 160000
      },
      {
        "id": 1092,
        "position": "Growth Marketer",
        "company": "Remote Co",
        "tags": ["marketing"]
      },
      {
        "id": 1093,
        "position": "Software Engineer",
        "company": "Other",
        "location": "Europe",
        "tags": ["Software"],
        "date": 1709294400
      }
    ]"#;

    #[test]
    fn test_parse_drops_legal_and_non_dev() {
        let postings = RemoteOk.parse(FEED, "").unwrap();
        assert_eq!(postings.len(), 2);

        let first = &postings[0];
        assert_eq!(first.title, "Senior Rails Developer");
        assert_eq!(first.description, "Rails & Sidekiq");
        assert_eq!(first.location.as_deref(), Some("Remote"));
        assert_eq!(first.url.as_deref(), Some("https://remoteok.com/remote-jobs/1091"));
        assert_eq!(first.metadata["salary_max"], 160000);
        assert!(first.remote);

        let second = &postings[1];
        assert_eq!(second.external_id.as_deref(), Some("1093"));
        assert_eq!(second.location.as_deref(), Some("Europe"));
        assert!(second.posted_at.is_some());
    }

    #[test]
    fn test_empty_feed() {
        assert!(RemoteOk.parse("[]", "").unwrap().is_empty());
        assert!(RemoteOk.parse(r#"[{"legal": "x"}]"#, "").unwrap().is_empty());
    }
}
