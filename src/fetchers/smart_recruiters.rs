use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{id_string, non_blank, parse_timestamp, Fetcher, Provider, RawPosting};
use crate::html;

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    content: Vec<Job>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    name: String,
    company: Option<Named>,
    #[serde(default)]
    location: Location,
    released_date: Option<String>,
    #[serde(default)]
    job_ad_id: Value,
    department: Option<Department>,
    job_ad: Option<JobAd>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Department {
    label: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Location {
    city: Option<String>,
    region: Option<String>,
    country: Option<String>,
    #[serde(default)]
    remote: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobAd {
    sections: Option<Sections>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Sections {
    job_description: Option<Section>,
}

#[derive(Debug, Deserialize)]
struct Section {
    text: Option<String>,
}

pub struct SmartRecruiters;

impl Fetcher for SmartRecruiters {
    fn provider(&self) -> Provider {
        Provider::SmartRecruiters
    }

    fn endpoint(&self, slug: &str) -> String {
        format!("https://api.smartrecruiters.com/v1/companies/{}/postings?limit=100", slug)
    }

    fn parse(&self, body: &str, slug: &str) -> Result<Vec<RawPosting>> {
        let page: Page = serde_json::from_str(body).context("parsing SmartRecruiters postings")?;
        Ok(page.content.into_iter().map(|job| normalize(job, slug)).collect())
    }
}

fn normalize(job: Job, company_id: &str) -> RawPosting {
    let description = job
        .job_ad
        .and_then(|ad| ad.sections)
        .and_then(|s| s.job_description)
        .and_then(|d| d.text)
        .unwrap_or_default();

    let parts: Vec<String> = [
        job.location.city.as_deref(),
        job.location.region.as_deref(),
        job.location.country.as_deref(),
    ]
    .into_iter()
    .filter_map(non_blank)
    .collect();
    let location = if parts.is_empty() {
        "Not specified".to_string()
    } else {
        parts.join(", ")
    };
    let remote = job.location.remote || location.to_lowercase().contains("remote");

    let id = id_string(&job.id);
    let company = job
        .company
        .and_then(|c| non_blank(c.name.as_deref()))
        .unwrap_or_else(|| company_id.to_string());

    RawPosting {
        company,
        title: job.name.trim().to_string(),
        description: html::clean(&description),
        location: Some(location),
        remote,
        posted_at: job.released_date.as_deref().and_then(parse_timestamp),
        url: id
            .as_ref()
            .map(|id| format!("https://jobs.smartrecruiters.com/{}/{}", company_id, id)),
        external_id: id.clone(),
        metadata: json!({
            "smartrecruiters_id": id,
            "job_ad_id": job.job_ad_id,
            "department": job.department.and_then(|d| d.label),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_postings() {
        let body = r#"{
          "offset": 0,
          "limit": 100,
          "totalFound": 2,
          "content": [
            {
              "id": "744000012345",
              "name": "Ruby Backend Engineer",
              "company": { "identifier": "Bosch", "name": "Bosch Group" },
              "releasedDate": "2024-02-20T08:15:00.000Z",
              "location": { "city": "Stuttgart", "region": "BW", "country": "de", "remote": true },
              "department": { "label": "Software" },
              "jobAdId": "abc-1",
              "jobAd": { "sections": { "jobDescription": { "text": "<p>Rails APIs</p>" } } }
            },
            {
              "id": "744000012346",
              "name": "Accountant",
              "location": {}
            }
          ]
        }"#;
        let postings = SmartRecruiters.parse(body, "Bosch").unwrap();
        assert_eq!(postings.len(), 2);

        let first = &postings[0];
        assert_eq!(first.company, "Bosch Group");
        assert_eq!(first.location.as_deref(), Some("Stuttgart, BW, de"));
        assert!(first.remote);
        assert_eq!(first.description, "Rails APIs");
        assert_eq!(first.url.as_deref(), Some("https://jobs.smartrecruiters.com/Bosch/744000012345"));
        assert_eq!(first.metadata["department"], "Software");

        let second = &postings[1];
        assert_eq!(second.company, "Bosch");
        assert_eq!(second.location.as_deref(), Some("Not specified"));
        assert!(!second.remote);
        assert_eq!(second.description, "");
    }
}
