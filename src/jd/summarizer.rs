use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use tracing::{info, warn};

use super::{common_tech, AiContext};
use crate::jd_parser;

const USAGE_FEATURE: &str = "jd_summary";
const MAX_TOKENS: u32 = 500;
const MAX_RESPONSIBILITIES: usize = 5;
const FALLBACK_RESPONSIBILITIES: &[&str] = &["Collaborate with team", "Build features"];

const SYSTEM_PROMPT: &str = r#"You are a job description analyzer. Extract key information from the job description below.

CRITICAL RULES:
- Use ONLY information explicitly stated in the job description
- Do NOT invent or infer details not present
- Return JSON ONLY in this exact format:

{
  "role": "Job title/role",
  "seniority": "junior|mid|senior|staff|principal",
  "team": "Team or department name (if mentioned)",
  "stack": ["list", "of", "technologies"],
  "responsibilities": ["bulleted", "key responsibilities"],
  "notes": ["any", "notable", "details"]
}"#;

static ROLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:Senior|Staff|Principal|Lead|Junior)?\s*[A-Z][a-z]+(?:\s+[A-Z][a-z]+)*\s+(?:Engineer|Developer|Architect)")
        .expect("valid regex")
});
static SENIOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)senior|sr\.|sr ").expect("valid regex"));
static JUNIOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)junior|jr\.|jr ").expect("valid regex"));
static STAFF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)staff|principal|lead").expect("valid regex"));
static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*[-•*][ \t]*([^\n]{10,100})").expect("valid regex"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Seniority {
    Junior,
    #[default]
    Mid,
    Senior,
    Staff,
    Principal,
}

impl Seniority {
    /// Unknown labels read as mid.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "junior" => Seniority::Junior,
            "senior" => Seniority::Senior,
            "staff" => Seniority::Staff,
            "principal" => Seniority::Principal,
            _ => Seniority::Mid,
        }
    }
}

impl fmt::Display for Seniority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Seniority::Junior => "junior",
            Seniority::Mid => "mid",
            Seniority::Senior => "senior",
            Seniority::Staff => "staff",
            Seniority::Principal => "principal",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JdSummary {
    pub role: String,
    pub seniority: Seniority,
    pub team: Option<String>,
    pub stack: Vec<String>,
    pub responsibilities: Vec<String>,
    pub notes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SummaryReply {
    role: String,
    #[serde(default)]
    seniority: String,
    #[serde(default)]
    team: Option<String>,
    #[serde(default)]
    stack: Vec<String>,
    #[serde(default)]
    responsibilities: Vec<String>,
    #[serde(default)]
    notes: Vec<String>,
}

/// Condenses a job description into role, seniority, stack and duties.
pub struct Summarizer<'a> {
    ai: Option<AiContext<'a>>,
}

impl<'a> Summarizer<'a> {
    pub fn new(ai: Option<AiContext<'a>>) -> Self {
        Self { ai }
    }

    /// Never fails: a failed or unparsable AI reply falls back to the heuristics.
    pub fn summarize(&self, text: &str, job_posting_id: Option<i64>) -> JdSummary {
        let Some(ai) = self.ai else {
            return heuristic_summary(text);
        };

        match ai_summary(&ai, text, job_posting_id) {
            Ok(summary) => {
                info!(job_posting_id, model = ai.provider.model_name(), "Summarized job description");
                summary
            }
            Err(e) => {
                warn!(job_posting_id, error = %e, "AI summarization failed, using heuristics");
                heuristic_summary(text)
            }
        }
    }
}

fn ai_summary(ai: &AiContext<'_>, text: &str, job_posting_id: Option<i64>) -> Result<JdSummary> {
    let body = ai.complete_json(USAGE_FEATURE, SYSTEM_PROMPT, text, MAX_TOKENS, job_posting_id)?;
    let reply: SummaryReply = serde_json::from_str(&body).context("Failed to parse summary JSON reply")?;

    Ok(JdSummary {
        role: reply.role.trim().to_string(),
        seniority: Seniority::from_label(&reply.seniority),
        team: reply.team.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
        stack: reply.stack,
        responsibilities: reply.responsibilities,
        notes: reply.notes,
    })
}

pub fn heuristic_summary(text: &str) -> JdSummary {
    JdSummary {
        role: role(text),
        seniority: seniority(text),
        team: None,
        stack: common_tech(text).into_iter().map(String::from).collect(),
        responsibilities: responsibilities(text),
        notes: Vec::new(),
    }
}

fn role(text: &str) -> String {
    ROLE.find(text)
        .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
        .or_else(|| jd_parser::role(text))
        .unwrap_or_else(|| "Developer".to_string())
}

fn seniority(text: &str) -> Seniority {
    if SENIOR.is_match(text) {
        Seniority::Senior
    } else if JUNIOR.is_match(text) {
        Seniority::Junior
    } else if STAFF.is_match(text) {
        Seniority::Staff
    } else {
        Seniority::Mid
    }
}

fn responsibilities(text: &str) -> Vec<String> {
    let bullets: Vec<String> = BULLET
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .take(MAX_RESPONSIBILITIES)
        .collect();

    if bullets.is_empty() {
        FALLBACK_RESPONSIBILITIES.iter().map(|r| r.to_string()).collect()
    } else {
        bullets
    }
}
