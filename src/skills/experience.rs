use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::Path;
use tracing::warn;

const SKILL_ALIASES: &[(&str, &str)] = &[
    ("rails", "Ruby on Rails"),
    ("rspec", "RSpec"),
    ("jest", "Jest"),
    ("aws", "AWS"),
    ("gcp", "GCP"),
    ("k8s", "Kubernetes"),
    ("postgres", "PostgreSQL"),
    ("postgresql", "PostgreSQL"),
    ("mysql", "MySQL"),
    ("redis", "Redis"),
    ("js", "JavaScript"),
    ("javascript", "JavaScript"),
    ("ts", "TypeScript"),
    ("typescript", "TypeScript"),
    ("html", "HTML/CSS"),
    ("css", "HTML/CSS"),
    ("html/css", "HTML/CSS"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillLevel {
    Expert,
    Intermediate,
    Basic,
}

impl SkillLevel {
    /// Maps the level words used across experience.yml formats. Unknown words
    /// count as intermediate.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "expert" | "proficient" | "advanced" => SkillLevel::Expert,
            "basic" | "familiar" | "beginner" => SkillLevel::Basic,
            _ => SkillLevel::Intermediate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Skill {
    pub name: String,
    pub level: SkillLevel,
    pub context: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Position {
    pub company: String,
    pub title: String,
    pub dates: String,
    pub description: Option<String>,
    pub achievements: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Project {
    pub name: String,
    pub description: Option<String>,
    pub technologies: Vec<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SkillsByLevel {
    pub expert: Vec<Skill>,
    pub intermediate: Vec<Skill>,
    pub basic: Vec<Skill>,
}

/// The user's declared experience, normalized across the supported skill formats:
/// a list of `{name, level, context}` maps, a flat list of names, or a tiered
/// `proficient / working_knowledge / familiar` map.
#[derive(Debug, Clone, Default)]
pub struct Experience {
    pub skills: Vec<Skill>,
    pub positions: Vec<Position>,
    pub projects: Vec<Project>,
    pub not_claimed_skills: Vec<String>,
}

impl Experience {
    /// A missing file yields empty experience.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "Experience file not found");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let root: Value = serde_yaml::from_str(text)?;
        if root.is_null() {
            return Ok(Self::default());
        }
        if !root.is_mapping() {
            return Err(anyhow!("experience YAML must be a mapping"));
        }

        let skills = match root.get("skills") {
            Some(Value::Sequence(items)) => items.iter().filter_map(skill_from_entry).collect(),
            Some(Value::Mapping(_)) => tiered_skills(&root["skills"]),
            _ => Vec::new(),
        };

        Ok(Self {
            skills,
            positions: typed_list(&root, "positions")?,
            projects: typed_list(&root, "projects")?,
            not_claimed_skills: typed_list(&root, "not_claimed_skills")?,
        })
    }

    /// Lowercased names of every declared skill.
    pub fn all_skill_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.skills.iter().map(|s| s.name.to_lowercase()).collect();
        names.sort();
        names.dedup();
        names
    }

    fn find(&self, name: &str) -> Option<&Skill> {
        self.skills.iter().find(|s| s.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn has_skill(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn skills_by_level(&self) -> SkillsByLevel {
        let pick = |level: SkillLevel| -> Vec<Skill> {
            self.skills.iter().filter(|s| s.level == level).cloned().collect()
        };
        SkillsByLevel {
            expert: pick(SkillLevel::Expert),
            intermediate: pick(SkillLevel::Intermediate),
            basic: pick(SkillLevel::Basic),
        }
    }

    /// Canonical name for a known alias ("rails" → "Ruby on Rails"), otherwise the trimmed input.
    pub fn normalize_skill_name(name: &str) -> String {
        let trimmed = name.trim();
        let lower = trimmed.to_lowercase();
        SKILL_ALIASES
            .iter()
            .find(|(alias, _)| *alias == lower)
            .map(|(_, canonical)| canonical.to_string())
            .unwrap_or_else(|| trimmed.to_string())
    }

    pub fn has_skill_with_alias(&self, name: &str) -> bool {
        self.has_skill(name) || self.has_skill(&Self::normalize_skill_name(name))
    }

    /// True when the skill is listed as exposure-only.
    pub fn is_not_claimed(&self, name: &str) -> bool {
        let normalized = Self::normalize_skill_name(name).to_lowercase();
        if normalized.is_empty() {
            return false;
        }
        self.not_claimed_skills
            .iter()
            .any(|nc| nc.to_lowercase().contains(&normalized))
    }
}

fn skill_from_entry(entry: &Value) -> Option<Skill> {
    match entry {
        Value::Mapping(_) => {
            let name = scalar_text(entry.get("name")?)?;
            let level = entry
                .get("level")
                .and_then(scalar_text)
                .map(|l| SkillLevel::from_label(&l))
                .unwrap_or(SkillLevel::Intermediate);
            let context = entry.get("context").and_then(scalar_text);
            Some(Skill { name, level, context })
        }
        other => scalar_text(other).map(|name| Skill {
            name,
            level: SkillLevel::Intermediate,
            context: None,
        }),
    }
}

fn tiered_skills(tiers: &Value) -> Vec<Skill> {
    [
        ("proficient", SkillLevel::Expert),
        ("working_knowledge", SkillLevel::Intermediate),
        ("familiar", SkillLevel::Basic),
    ]
    .iter()
    .flat_map(|(key, level)| {
        tiers
            .get(*key)
            .and_then(Value::as_sequence)
            .into_iter()
            .flatten()
            .filter_map(scalar_text)
            .map(move |name| Skill { name, level: *level, context: None })
    })
    .collect()
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    let text = text.trim().to_string();
    if text.is_empty() { None } else { Some(text) }
}

fn typed_list<T: serde::de::DeserializeOwned>(root: &Value, key: &str) -> Result<Vec<T>> {
    match root.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_yaml::from_value(value.clone())
            .with_context(|| format!("invalid '{}' section", key)),
    }
}
