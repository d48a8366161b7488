use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{non_blank, Fetcher, Provider, RawPosting};
use crate::html;
use crate::text::titleize;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<Posting>),
    One(Box<Posting>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Posting {
    id: Option<String>,
    #[serde(default)]
    text: String,
    company_name: Option<String>,
    description: Option<String>,
    description_plain: Option<String>,
    additional: Option<String>,
    additional_plain: Option<String>,
    #[serde(default)]
    categories: Categories,
    location: Option<String>,
    hosted_url: Option<String>,
    apply_url: Option<String>,
    created_at: Option<i64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct Categories {
    location: Option<String>,
    team: Option<String>,
    department: Option<String>,
    commitment: Option<String>,
}

pub struct Lever;

impl Fetcher for Lever {
    fn provider(&self) -> Provider {
        Provider::Lever
    }

    fn endpoint(&self, slug: &str) -> String {
        format!("https://api.lever.co/v0/postings/{}?mode=json", slug)
    }

    fn parse(&self, body: &str, slug: &str) -> Result<Vec<RawPosting>> {
        let parsed: OneOrMany = serde_json::from_str(body).context("parsing Lever postings")?;
        let postings = match parsed {
            OneOrMany::Many(postings) => postings,
            OneOrMany::One(posting) => vec![*posting],
        };

        Ok(postings.into_iter().map(|p| normalize(p, slug)).collect())
    }
}

fn normalize(posting: Posting, slug: &str) -> RawPosting {
    let description = [
        posting.description.or(posting.description_plain),
        posting.additional.or(posting.additional_plain),
    ]
    .into_iter()
    .flatten()
    .filter(|part| !part.trim().is_empty())
    .collect::<Vec<_>>()
    .join("\n\n");

    let location = non_blank(posting.categories.location.as_deref())
        .or_else(|| non_blank(posting.location.as_deref()))
        .unwrap_or_else(|| "Not specified".to_string());
    let lowered = location.to_lowercase();
    let remote = lowered.contains("remote") || lowered.contains("anywhere");

    RawPosting {
        company: non_blank(posting.company_name.as_deref()).unwrap_or_else(|| titleize(slug)),
        title: posting.text.trim().to_string(),
        description: html::clean(&description),
        location: Some(location),
        remote,
        posted_at: posting
            .created_at
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        url: non_blank(posting.hosted_url.as_deref()).or_else(|| non_blank(posting.apply_url.as_deref())),
        external_id: posting.id.clone(),
        metadata: json!({
            "lever_id": posting.id,
            "team": posting.categories.team.clone(),
            "categories": posting.categories,
        }),
    }
}
