use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{id_string, non_blank, parse_timestamp, Fetcher, Provider, RawPosting};
use crate::html;

#[derive(Debug, Deserialize)]
struct Listing {
    #[serde(default)]
    jobs: Vec<Job>,
}

#[derive(Debug, Deserialize)]
struct Job {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    title: String,
    #[serde(default)]
    company_name: String,
    description: Option<String>,
    candidate_required_location: Option<String>,
    url: Option<String>,
    publication_date: Option<String>,
    job_type: Option<String>,
    category: Option<String>,
    salary: Option<String>,
}

pub struct Remotive;

impl Fetcher for Remotive {
    fn provider(&self) -> Provider {
        Provider::Remotive
    }

    fn endpoint(&self, _slug: &str) -> String {
        "https://remotive.com/api/remote-jobs?category=software-dev".to_string()
    }

    fn parse(&self, body: &str, _slug: &str) -> Result<Vec<RawPosting>> {
        let listing: Listing = serde_json::from_str(body).context("parsing Remotive listing")?;

        Ok(listing
            .jobs
            .into_iter()
            .map(|job| {
                let id = id_string(&job.id);
                RawPosting {
                    company: job.company_name.trim().to_string(),
                    title: job.title.trim().to_string(),
                    description: html::clean(job.description.as_deref().unwrap_or_default()),
                    location: Some(
                        non_blank(job.candidate_required_location.as_deref())
                            .unwrap_or_else(|| "Worldwide".to_string()),
                    ),
                    remote: true,
                    posted_at: job.publication_date.as_deref().and_then(parse_timestamp),
                    url: non_blank(job.url.as_deref()),
                    external_id: id.clone(),
                    metadata: json!({
                        "remotive_id": id,
                        "job_type": job.job_type,
                        "category": job.category,
                        "salary": job.salary,
                    }),
                }
            })
            .collect())
    }
}
