use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;

use super::{non_blank, parse_timestamp, Fetcher, Provider, RawPosting};
use crate::html;
use crate::text::titleize;

#[derive(Debug, Default, Deserialize)]
struct Feed {
    #[serde(rename = "position", default)]
    positions: Vec<Position>,
}

#[derive(Debug, Default, Deserialize)]
struct Position {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    office: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    department: Option<String>,
    #[serde(rename = "employmentType", default)]
    employment_type: Option<String>,
    #[serde(rename = "createdAt", default)]
    created_at: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "jobDescriptions", default)]
    job_descriptions: Option<JobDescriptions>,
}

#[derive(Debug, Default, Deserialize)]
struct JobDescriptions {
    #[serde(rename = "jobDescription", default)]
    items: Vec<JobDescription>,
}

#[derive(Debug, Default, Deserialize)]
struct JobDescription {
    #[serde(default)]
    value: Option<String>,
}

pub struct Personio;

impl Fetcher for Personio {
    fn provider(&self) -> Provider {
        Provider::Personio
    }

    fn endpoint(&self, slug: &str) -> String {
        format!("https://{}.jobs.personio.de/xml", slug)
    }

    fn parse(&self, body: &str, slug: &str) -> Result<Vec<RawPosting>> {
        let feed: Feed = quick_xml::de::from_str(body).context("parsing Personio XML feed")?;
        Ok(feed.positions.into_iter().map(|p| normalize(p, slug)).collect())
    }
}

fn normalize(position: Position, slug: &str) -> RawPosting {
    let sections: Vec<String> = position
        .job_descriptions
        .map(|d| d.items)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|d| non_blank(d.value.as_deref()))
        .collect();
    let description = if sections.is_empty() {
        position.description.unwrap_or_default()
    } else {
        sections.join("\n\n")
    };

    let location = non_blank(position.office.as_deref()).unwrap_or_else(|| {
        let parts: Vec<String> = [position.city.as_deref(), position.country.as_deref()]
            .into_iter()
            .filter_map(non_blank)
            .collect();
        if parts.is_empty() {
            "Not specified".to_string()
        } else {
            parts.join(", ")
        }
    });

    let id = non_blank(position.id.as_deref());
    let url = non_blank(position.url.as_deref()).or_else(|| {
        id.as_ref()
            .map(|id| format!("https://{}.jobs.personio.de/job/{}", slug, id))
    });

    RawPosting {
        company: non_blank(position.company.as_deref()).unwrap_or_else(|| titleize(slug)),
        title: position.name.unwrap_or_default().trim().to_string(),
        description: html::clean(&description),
        remote: location.to_lowercase().contains("remote"),
        location: Some(location),
        posted_at: position.created_at.as_deref().and_then(parse_timestamp),
        url,
        external_id: id.clone(),
        metadata: json!({
            "personio_id": id,
            "department": position.department,
            "employment_type": position.employment_type,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<workzag-jobs>
  <position>
    <id>1187</id>
    <subcompany>Demodesk GmbH</subcompany>
    <office>Munich (Remote possible)</office>
    <department>Engineering</department>
    <name>Senior Ruby Engineer</name>
    <jobDescriptions>
      <jobDescription>
        <name>Your mission</name>
        <value><![CDATA[<p>Build our <strong>Rails</strong> backend.</p>]]></value>
      </jobDescription>
      <jobDescription>
        <name>Your profile</name>
        <value><![CDATA[<ul><li>Ruby</li><li>PostgreSQL</li></ul>]]></value>
      </jobDescription>
    </jobDescriptions>
    <employmentType>permanent</employmentType>
    <createdAt>2024-02-01T09:30:00+00:00</createdAt>
  </position>
  <position>
    <id>1190</id>
    <company>Other Co</company>
    <name>Sales Lead</name>
    <city>Berlin</city>
    <country>DE</country>
    <description>Sell things</description>
  </position>
</workzag-jobs>"#;

    #[test]
    fn test_parse_feed() {
        let postings = Personio.parse(FEED, "demodesk").unwrap();
        assert_eq!(postings.len(), 2);

        let first = &postings[0];
        assert_eq!(first.company, "Demodesk");
        assert_eq!(first.title, "Senior Ruby Engineer");
        assert_eq!(first.description, "Build our Rails backend.\n\nRuby\nPostgreSQL");
        assert!(first.remote);
        assert_eq!(first.url.as_deref(), Some("https://demodesk.jobs.personio.de/job/1187"));
        assert_eq!(first.metadata["employment_type"], "permanent");
        assert!(first.posted_at.is_some());

        let second = &postings[1];
        assert_eq!(second.company, "Other Co");
        assert_eq!(second.location.as_deref(), Some("Berlin, DE"));
        assert_eq!(second.description, "Sell things");
        assert!(second.posted_at.is_none());
    }

    #[test]
    fn test_empty_feed() {
        let postings = Personio.parse("<workzag-jobs></workzag-jobs>", "x").unwrap();
        assert!(postings.is_empty());
    }
}
