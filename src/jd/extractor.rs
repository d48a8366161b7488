use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use super::{common_tech, AiContext};
use crate::skills::experience::Experience;

const USAGE_FEATURE: &str = "skills_extract";
const MAX_TOKENS: u32 = 1000;
const HEURISTIC_CONFIDENCE: f64 = 0.8;

const SYSTEM_PROMPT: &str = r#"You are a skill extractor. Analyze the job description and extract ONLY skills and technologies explicitly mentioned.

CRITICAL RULES:
- Extract ONLY skills explicitly stated in the text
- Do NOT infer or invent skills
- Return JSON ONLY in this exact format:

{
  "skills": [
    {
      "name": "skill name",
      "normalized": "normalized name",
      "evidence": ["quotes", "from", "text"],
      "confidence": 0.95
    }
  ]
}"#;

/// What to do with a skill: keep it, or ask the user before claiming it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillAction {
    Keep,
    Prompt,
}

impl fmt::Display for SkillAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            SkillAction::Keep => "keep",
            SkillAction::Prompt => "prompt",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedSkill {
    pub name: String,
    pub normalized: String,
    pub evidence: Vec<String>,
    pub confidence: f64,
    pub in_profile: bool,
    pub action: SkillAction,
}

#[derive(Debug, Deserialize)]
struct ExtractReply {
    #[serde(default)]
    skills: Vec<ReplySkill>,
}

#[derive(Debug, Deserialize)]
struct ReplySkill {
    name: String,
    #[serde(default)]
    normalized: Option<String>,
    #[serde(default)]
    evidence: Vec<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Lists the skills a job description asks for, marked against the experience file.
pub struct SkillExtractor<'a> {
    experience: &'a Experience,
    ai: Option<AiContext<'a>>,
}

impl<'a> SkillExtractor<'a> {
    pub fn new(experience: &'a Experience, ai: Option<AiContext<'a>>) -> Self {
        Self { experience, ai }
    }

    pub fn extract(&self, text: &str, job_posting_id: Option<i64>) -> Vec<ExtractedSkill> {
        let Some(ai) = self.ai else {
            return self.heuristic(text);
        };

        match self.ai_extract(&ai, text, job_posting_id) {
            Ok(skills) => {
                info!(job_posting_id, count = skills.len(), "Extracted skills with AI");
                skills
            }
            Err(e) => {
                warn!(job_posting_id, error = %e, "AI skill extraction failed, using heuristics");
                self.heuristic(text)
            }
        }
    }

    fn ai_extract(&self, ai: &AiContext<'_>, text: &str, job_posting_id: Option<i64>) -> Result<Vec<ExtractedSkill>> {
        let body = ai.complete_json(USAGE_FEATURE, SYSTEM_PROMPT, text, MAX_TOKENS, job_posting_id)?;
        let reply: ExtractReply = serde_json::from_str(&body).context("Failed to parse skills JSON reply")?;

        Ok(reply
            .skills
            .into_iter()
            .filter(|s| !s.name.trim().is_empty())
            .map(|s| {
                let normalized = s
                    .normalized
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| s.name.clone());
                self.enrich(s.name.trim().to_string(), &normalized, s.evidence, s.confidence.unwrap_or(HEURISTIC_CONFIDENCE))
            })
            .collect())
    }

    fn heuristic(&self, text: &str) -> Vec<ExtractedSkill> {
        common_tech(text)
            .into_iter()
            .map(|tech| self.enrich(tech.to_string(), tech, vec![tech.to_string()], HEURISTIC_CONFIDENCE))
            .collect()
    }

    fn enrich(&self, name: String, normalized: &str, evidence: Vec<String>, confidence: f64) -> ExtractedSkill {
        let normalized = normalized.trim().to_lowercase();
        let in_profile = self.experience.has_skill_with_alias(&normalized);
        ExtractedSkill {
            name,
            normalized,
            evidence,
            confidence: confidence.clamp(0.0, 1.0),
            in_profile,
            action: if in_profile { SkillAction::Keep } else { SkillAction::Prompt },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::jd::testing::FixedReply;
    use chrono::{Duration, Utc};

    fn experience() -> Experience {
        Experience::from_yaml_str("skills:\n  - name: Ruby on Rails\n    level: expert\n  - name: PostgreSQL\n").unwrap()
    }

    #[test]
    fn test_heuristic_marks_profile_skills() {
        let exp = experience();
        let skills = SkillExtractor::new(&exp, None).extract("Rails, PostgreSQL and Docker on AWS", None);

        let names: Vec<&str> = skills.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["rails", "postgresql", "docker", "aws"]);

        assert!(skills[0].in_profile);
        assert_eq!(skills[0].action, SkillAction::Keep);
        assert!(skills[1].in_profile);
        assert_eq!(skills[2].action, SkillAction::Prompt);
        assert_eq!(skills[3].evidence, vec!["aws"]);
        assert!(skills.iter().all(|s| s.confidence == 0.8));
    }

    #[test]
    fn test_ai_extract_enriches_reply() {
        let exp = experience();
        let db = Database::open_in_memory().unwrap();
        let provider = FixedReply(Some(
            r#"{"skills": [
                {"name": "Rails", "normalized": "Ruby on Rails", "evidence": ["5+ years of Rails"], "confidence": 0.95},
                {"name": "Kafka", "evidence": ["event streaming with Kafka"], "confidence": 1.7},
                {"name": "  "}
            ]}"#,
        ));
        let skills = SkillExtractor::new(&exp, Some(AiContext::new(&provider, &db))).extract("JD text", Some(11));

        assert_eq!(skills.len(), 2);
        assert_eq!(skills[0].normalized, "ruby on rails");
        assert!(skills[0].in_profile);
        assert_eq!(skills[0].evidence, vec!["5+ years of Rails"]);
        assert_eq!(skills[1].normalized, "kafka");
        assert_eq!(skills[1].action, SkillAction::Prompt);
        assert_eq!(skills[1].confidence, 1.0);

        let usage = db.ai_usage_since(Utc::now() - Duration::hours(1)).unwrap();
        assert_eq!(usage[0].feature, "skills_extract");
        assert_eq!(usage[0].meta["job_posting_id"], 11);
    }

    #[test]
    fn test_ai_failure_falls_back() {
        let exp = experience();
        let db = Database::open_in_memory().unwrap();
        let provider = FixedReply(Some("{\"skills\": \"lots\"}"));
        let skills = SkillExtractor::new(&exp, Some(AiContext::new(&provider, &db))).extract("Redis and Rails", None);
        let names: Vec<&str> = skills.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["rails", "redis"]);
    }
}
