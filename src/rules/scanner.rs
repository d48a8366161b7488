use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::warn;

use super::{Rules, ScanRule};
use crate::skills::experience::Experience;

const TECH_PATTERNS: &[&str] = &[
    r"\b(Ruby|Python|JavaScript|TypeScript|Java|Go|Rust|PHP|C\+\+|C#|Swift|Kotlin|Elixir|Zig)\b",
    r"\b(Rails|Django|React|Vue|Angular|Node\.js|Express|Flask|Laravel|Spring|Phoenix)\b",
    r"\b(PostgreSQL|MySQL|MongoDB|Redis|Elasticsearch|DynamoDB|SQLite)\b",
    r"\b(AWS|Azure|GCP|Docker|Kubernetes|Terraform|Jenkins|CircleCI|GitHub Actions)\b",
    r"\b(Git|Webpack|Babel|Jest|RSpec|Sidekiq|GraphQL|REST|Kafka|RabbitMQ)\b",
];

static TECH: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    TECH_PATTERNS
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .expect("valid tech pattern")
        })
        .collect()
});

const EXPOSURE_MESSAGE: &str = "Skill mentioned but marked as exposure-only (not core competency)";
const EXPOSURE_ACTION: &str = "mention_as_exposure";
const UNVERIFIED_MESSAGE: &str = "Skill not in verified experience";
const UNVERIFIED_ACTION: &str = "mark_as_not_claimed";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flag {
    pub rule: String,
    pub message: Option<String>,
    pub note: Option<String>,
    pub severity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillFlag {
    pub skill: String,
    pub message: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Categorized findings for a job description. Stored as an application's flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanResult {
    pub warnings: Vec<Flag>,
    pub blocking: Vec<Flag>,
    pub info: Vec<Flag>,
    pub unverified_skills: Vec<SkillFlag>,
    pub not_claimed_skills: Vec<SkillFlag>,
}

impl ScanResult {
    pub fn has_blocking(&self) -> bool {
        !self.blocking.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty() && self.blocking.is_empty()
    }

    /// Records skills an AI writer reported as unverified, skipping ones already flagged.
    pub fn merge_writer_skills(&mut self, skills: &[String]) {
        for skill in skills {
            let known = self
                .unverified_skills
                .iter()
                .any(|f| f.skill.eq_ignore_ascii_case(skill));
            if !known {
                self.unverified_skills.push(SkillFlag {
                    skill: skill.clone(),
                    message: UNVERIFIED_MESSAGE.to_string(),
                    action: UNVERIFIED_ACTION.to_string(),
                    source: Some("ai_writer".to_string()),
                });
            }
        }
    }
}

pub struct RulesScanner<'a> {
    rules: &'a Rules,
    experience: &'a Experience,
}

impl<'a> RulesScanner<'a> {
    pub fn new(rules: &'a Rules, experience: &'a Experience) -> Self {
        Self { rules, experience }
    }

    pub fn scan(&self, job_description: &str) -> ScanResult {
        if job_description.trim().is_empty() {
            return ScanResult::default();
        }

        let mut result = ScanResult {
            warnings: scan_category(job_description, &self.rules.warnings),
            blocking: scan_category(job_description, &self.rules.blocking),
            info: scan_category(job_description, &self.rules.info),
            ..Default::default()
        };

        if self.rules.skill_verification.flag_unverified {
            self.categorize_skills(job_description, &mut result);
        }

        result
    }

    fn categorize_skills(&self, text: &str, result: &mut ScanResult) {
        let verification = &self.rules.skill_verification;
        for skill in extract_tech_terms(text) {
            let normalized = Experience::normalize_skill_name(&skill);
            if self.experience.has_skill(&normalized) || self.experience.has_skill_with_alias(&skill) {
                continue;
            }
            if self.experience.is_not_claimed(&skill) {
                result.not_claimed_skills.push(SkillFlag {
                    skill,
                    message: EXPOSURE_MESSAGE.to_string(),
                    action: EXPOSURE_ACTION.to_string(),
                    source: None,
                });
            } else {
                result.unverified_skills.push(SkillFlag {
                    skill,
                    message: verification
                        .message
                        .clone()
                        .unwrap_or_else(|| UNVERIFIED_MESSAGE.to_string()),
                    action: verification
                        .action
                        .clone()
                        .unwrap_or_else(|| UNVERIFIED_ACTION.to_string()),
                    source: None,
                });
            }
        }
    }
}

/// Tech terms as written in the text, deduplicated case-insensitively.
pub fn extract_tech_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for pattern in TECH.iter() {
        for m in pattern.find_iter(text) {
            let term = m.as_str().trim();
            if !terms.iter().any(|t| t.eq_ignore_ascii_case(term)) {
                terms.push(term.to_string());
            }
        }
    }
    terms
}

fn scan_category(text: &str, rules: &BTreeMap<String, ScanRule>) -> Vec<Flag> {
    rules
        .iter()
        .filter(|(name, rule)| matches_any_pattern(name, rule, text))
        .map(|(name, rule)| Flag {
            rule: name.clone(),
            message: rule.message.clone(),
            note: rule.note.clone(),
            severity: rule.severity.clone(),
        })
        .collect()
}

fn matches_any_pattern(name: &str, rule: &ScanRule, text: &str) -> bool {
    rule.all_patterns().any(|pattern| {
        match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(re) => re.is_match(text),
            Err(e) => {
                warn!(rule = name, pattern, error = %e, "Skipping invalid scan pattern");
                false
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &str = r#"
warnings:
  on_call:
    pattern: "on[- ]call"
    message: Rotating on-call
    severity: medium
  broken:
    pattern: "(unclosed"
blocking:
  relocation:
    patterns: ["must relocate", "relocation required"]
    message: Requires relocation
info:
  equity:
    pattern: "equity|stock options"
    note: Ask about vesting
skill_verification:
  flag_unverified: true
  message: Not in experience.yml
"#;

    fn experience() -> Experience {
        Experience::from_yaml_str(
            "skills: [Ruby on Rails, PostgreSQL, JavaScript]\nnot_claimed_skills: [Kafka]\n",
        )
        .unwrap()
    }

    #[test]
    fn test_scan_categories() {
        let rules = Rules::from_yaml_str(RULES).unwrap();
        let exp = experience();
        let scanner = RulesScanner::new(&rules, &exp);

        let result = scanner.scan("Join our ON-CALL rotation. Relocation required. Generous equity.");
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].rule, "on_call");
        assert_eq!(result.warnings[0].severity.as_deref(), Some("medium"));
        assert_eq!(result.blocking[0].message.as_deref(), Some("Requires relocation"));
        assert_eq!(result.info[0].note.as_deref(), Some("Ask about vesting"));
        assert!(result.has_blocking());
        assert!(!result.is_clean());
        assert!(scanner.scan("you must relocate").has_blocking());
        assert!(scanner.scan("A calm job").is_clean());
    }

    #[test]
    fn test_skill_categorization() {
        let rules = Rules::from_yaml_str(RULES).unwrap();
        let exp = experience();
        let scanner = RulesScanner::new(&rules, &exp);

        let result = scanner.scan("Rails, postgresql, Kafka, GraphQL and graphql again, JS tooling");
        let unverified: Vec<&str> = result.unverified_skills.iter().map(|f| f.skill.as_str()).collect();
        assert_eq!(unverified, vec!["GraphQL"]);
        assert_eq!(result.unverified_skills[0].message, "Not in experience.yml");
        assert_eq!(result.unverified_skills[0].action, UNVERIFIED_ACTION);

        assert_eq!(result.not_claimed_skills.len(), 1);
        assert_eq!(result.not_claimed_skills[0].skill, "Kafka");
        assert_eq!(result.not_claimed_skills[0].action, EXPOSURE_ACTION);
    }

    #[test]
    fn test_skills_not_flagged_when_disabled() {
        let rules = Rules::from_yaml_str("skill_verification: { flag_unverified: false }").unwrap();
        let exp = experience();
        let result = RulesScanner::new(&rules, &exp).scan("GraphQL and Kafka");
        assert!(result.unverified_skills.is_empty());
        assert!(result.not_claimed_skills.is_empty());
    }

    #[test]
    fn test_blank_description_is_empty() {
        let rules = Rules::from_yaml_str(RULES).unwrap();
        let exp = experience();
        assert_eq!(RulesScanner::new(&rules, &exp).scan("   "), ScanResult::default());
    }

    #[test]
    fn test_merge_writer_skills() {
        let mut result = ScanResult::default();
        result.merge_writer_skills(&["Kafka".to_string(), "kafka".to_string()]);
        assert_eq!(result.unverified_skills.len(), 1);
        assert_eq!(result.unverified_skills[0].source.as_deref(), Some("ai_writer"));

        let json = serde_json::to_value(&result).unwrap();
        let back: ScanResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }
}
