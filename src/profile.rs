use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Education {
    pub degree: String,
    pub institution: String,
    #[serde(deserialize_with = "scalar_string")]
    pub year: Option<String>,
    pub honors: Option<String>,
}

/// Contact details and summary from `profile.yml`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Profile {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub linkedin: Option<String>,
    pub summary: String,
    pub education: Vec<Education>,
    pub core_skills: Vec<String>,
}

impl Profile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// email • phone • location • linkedin, skipping blanks.
    pub fn contact_line(&self) -> String {
        [
            Some(self.email.as_str()),
            self.phone.as_deref(),
            self.location.as_deref(),
            self.linkedin.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" • ")
    }
}

/// Years are often written unquoted in YAML.
fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_yaml::Value::String(s)) => Some(s),
        Some(serde_yaml::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_profile() {
        let profile = Profile::from_yaml_str(
            r#"
name: Ada Lovelace
email: ada@example.com
location: London
summary: Backend engineer.
education:
  - degree: BSc Mathematics
    institution: University of London
    year: 1835
core_skills: [Ruby, PostgreSQL]
"#,
        )
        .unwrap();
        assert_eq!(profile.name, "Ada Lovelace");
        assert_eq!(profile.education[0].year.as_deref(), Some("1835"));
        assert_eq!(profile.core_skills.len(), 2);
        assert_eq!(profile.contact_line(), "ada@example.com • London");
    }

    #[test]
    fn test_empty_profile() {
        let profile = Profile::from_yaml_str("").unwrap();
        assert!(profile.name.is_empty());
        assert_eq!(profile.contact_line(), "");
    }
}
