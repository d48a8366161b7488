use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;

use super::{id_string, non_blank, parse_timestamp, Fetcher, Provider, RawPosting};
use crate::html;
use crate::text::titleize;

#[derive(Debug, Deserialize)]
struct Board {
    #[serde(default)]
    jobs: Vec<Job>,
}

#[derive(Debug, Deserialize)]
struct Job {
    #[serde(default)]
    id: serde_json::Value,
    #[serde(default)]
    title: String,
    company_name: Option<String>,
    content: Option<String>,
    location: Option<Location>,
    absolute_url: Option<String>,
    updated_at: Option<String>,
    #[serde(default)]
    departments: Vec<Department>,
}

#[derive(Debug, Deserialize)]
struct Location {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Department {
    name: Option<String>,
}

pub struct Greenhouse;

impl Fetcher for Greenhouse {
    fn provider(&self) -> Provider {
        Provider::Greenhouse
    }

    fn endpoint(&self, slug: &str) -> String {
        format!("https://boards-api.greenhouse.io/v1/boards/{}/jobs?content=true", slug)
    }

    fn parse(&self, body: &str, slug: &str) -> Result<Vec<RawPosting>> {
        let board: Board = serde_json::from_str(body).context("parsing Greenhouse board")?;

        Ok(board
            .jobs
            .into_iter()
            .map(|job| {
                let location = job.location.and_then(|l| non_blank(l.name.as_deref()));
                let remote = location
                    .as_deref()
                    .is_some_and(|l| l.to_lowercase().contains("remote"));
                let departments: Vec<String> =
                    job.departments.into_iter().filter_map(|d| d.name).collect();

                RawPosting {
                    company: non_blank(job.company_name.as_deref()).unwrap_or_else(|| titleize(slug)),
                    title: job.title.trim().to_string(),
                    description: html::clean(job.content.as_deref().unwrap_or_default()),
                    location,
                    remote,
                    posted_at: job.updated_at.as_deref().and_then(parse_timestamp),
                    url: non_blank(job.absolute_url.as_deref()),
                    external_id: id_string(&job.id),
                    metadata: json!({
                        "greenhouse_id": job.id,
                        "departments": departments,
                    }),
                }
            })
            .collect())
    }
}
