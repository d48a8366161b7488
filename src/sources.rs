use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

use crate::text::titleize;

/// One job board entry from `sources.yml`.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub provider: String,
    pub slug: String,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Deserialize)]
struct SourcesFile {
    #[serde(default)]
    sources: Vec<RawSource>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    provider: String,
    slug: String,
    name: Option<String>,
    active: Option<bool>,
}

pub fn load_sources(path: &Path) -> Result<Vec<Source>> {
    if !path.exists() {
        warn!(path = %path.display(), "sources.yml not found, no sources to fetch");
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    parse_sources(&text).with_context(|| format!("parsing {}", path.display()))
}

pub fn parse_sources(text: &str) -> Result<Vec<Source>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let file: SourcesFile = serde_yaml::from_str(text)?;
    Ok(file
        .sources
        .into_iter()
        .map(|raw| Source {
            name: raw
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| titleize(&raw.slug)),
            active: raw.active.unwrap_or(true),
            provider: raw.provider.trim().to_lowercase(),
            slug: raw.slug,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let sources = parse_sources(
            r#"
sources:
  - provider: greenhouse
    slug: acme-corp
  - provider: Lever
    slug: widgets
    name: Widgets Inc
    active: false
"#,
        )
        .unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].name, "Acme Corp");
        assert!(sources[0].active);
        assert_eq!(sources[1].provider, "lever");
        assert_eq!(sources[1].name, "Widgets Inc");
        assert!(!sources[1].active);
    }

    #[test]
    fn test_load_sources_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.yml");
        assert!(load_sources(&path).unwrap().is_empty());

        std::fs::write(
            &path,
            "sources:\n  - {provider: remotive, slug: all}\n  - {provider: lever, slug: x, active: false}\n",
        )
        .unwrap();
        let sources = load_sources(&path).unwrap();
        assert_eq!(sources.len(), 2);
        let active: Vec<&Source> = sources.iter().filter(|s| s.active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].provider, "remotive");
    }

    #[test]
    fn test_empty_and_malformed() {
        assert!(parse_sources("").unwrap().is_empty());
        assert!(parse_sources("sources:\n  - slug: missing-provider\n").is_err());
    }
}
