use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, Utc};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! status_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(anyhow!(
                        "Invalid {} '{}'. Expected one of: {}",
                        stringify!($name),
                        other,
                        [$($text),+].join(", ")
                    )),
                }
            }
        }
    };
}

status_enum!(JobStatus {
    Suggested => "suggested",
    Applied => "applied",
    Ignored => "ignored",
    Exported => "exported",
});

status_enum!(ApplicationStatus {
    Draft => "draft",
    Generated => "generated",
    Error => "error",
});

status_enum!(ManualStatus {
    Submitted => "submitted",
    UnderReview => "under_review",
    Rejected => "rejected",
    Accepted => "accepted",
    Offer => "offer",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: i64,
    pub company: String,
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub remote: bool,
    pub posted_at: Option<DateTime<Utc>>,
    pub url: String,
    pub source: Option<String>,
    pub external_id: Option<String>,
    pub metadata: serde_json::Value,
    pub score: f64,
    pub status: JobStatus,
    pub applied_at: Option<DateTime<Utc>>,
    pub exported_at: Option<DateTime<Utc>>,
    pub ignored_at: Option<DateTime<Utc>>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobPosting {
    pub fn generated_today(&self) -> bool {
        self.exported_at
            .map(|at| at.with_timezone(&Local).date_naive() == Local::now().date_naive())
            .unwrap_or(false)
    }
}

/// Attributes for a job about to be persisted, from a fetcher or manual entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewJob {
    pub company: String,
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub remote: bool,
    pub posted_at: Option<DateTime<Utc>>,
    pub url: String,
    pub source: Option<String>,
    pub external_id: Option<String>,
    pub metadata: serde_json::Value,
    pub score: f64,
}

/// What the rules engine needs to know about a posting.
#[derive(Debug, Clone, Copy)]
pub struct PostingRef<'a> {
    pub id: Option<i64>,
    pub company: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub source: Option<&'a str>,
}

impl<'a> From<&'a JobPosting> for PostingRef<'a> {
    fn from(job: &'a JobPosting) -> Self {
        Self {
            id: Some(job.id),
            company: &job.company,
            title: &job.title,
            description: &job.description,
            source: job.source.as_deref(),
        }
    }
}

impl<'a> From<&'a NewJob> for PostingRef<'a> {
    fn from(job: &'a NewJob) -> Self {
        Self {
            id: None,
            company: &job.company,
            title: &job.title,
            description: &job.description,
            source: job.source.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub job_posting_id: Option<i64>,
    pub company: String,
    pub role: String,
    pub job_description: String,
    pub flags: serde_json::Value,
    pub output_path: Option<String>,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn pdfs_ready(&self) -> bool {
        self.status == ApplicationStatus::Generated && self.output_path.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSkillAssessment {
    pub id: i64,
    pub job_posting_id: i64,
    pub skill_name: String,
    pub have: bool,
    pub proficiency: Option<u8>,
}

impl JobSkillAssessment {
    pub fn normalize_name(name: &str) -> String {
        name.trim().to_lowercase()
    }

    /// Proficiency is required (1..=5) when the skill is claimed and must be
    /// absent when it is not.
    pub fn validate(skill_name: &str, have: bool, proficiency: Option<u8>) -> Vec<String> {
        let mut errors = Vec::new();
        if skill_name.trim().is_empty() {
            errors.push("Skill name can't be blank".to_string());
        }
        match (have, proficiency) {
            (true, None) => errors.push("Proficiency can't be blank when skill is claimed".to_string()),
            (true, Some(p)) if !(1..=5).contains(&p) => {
                errors.push(format!("Proficiency must be between 1 and 5 (got {})", p))
            }
            (false, Some(_)) => {
                errors.push("Proficiency must be blank when skill is not claimed".to_string())
            }
            _ => {}
        }
        errors
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedCompany {
    pub id: i64,
    pub name: String,
    pub pattern: bool,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl BlockedCompany {
    pub fn matches(&self, company: &str) -> bool {
        if self.pattern {
            match RegexBuilder::new(&self.name).case_insensitive(true).build() {
                Ok(re) => re.is_match(company),
                Err(_) => company.to_lowercase().contains(&self.name.to_lowercase()),
            }
        } else {
            company.trim().eq_ignore_ascii_case(self.name.trim())
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualApplication {
    pub id: i64,
    pub company: String,
    pub position: String,
    pub applied_at: DateTime<Utc>,
    pub status: ManualStatus,
    pub notes: Option<String>,
    pub job_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiUsage {
    pub id: i64,
    pub model: String,
    pub feature: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub cached_input_tokens: i64,
    pub cost_cents: i64,
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AiUsage {
    pub fn total_tokens(&self) -> i64 {
        self.prompt_tokens + self.completion_tokens + self.cached_input_tokens
    }

    pub fn cost_dollars(&self) -> f64 {
        self.cost_cents as f64 / 100.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewApplication {
    pub job_posting_id: Option<i64>,
    pub company: String,
    pub role: String,
    pub job_description: String,
    pub flags: serde_json::Value,
}

impl NewApplication {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for (field, value) in [
            ("Company", &self.company),
            ("Role", &self.role),
            ("Job description", &self.job_description),
        ] {
            if value.trim().is_empty() {
                errors.push(format!("{} can't be blank", field));
            }
        }
        errors
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewAiUsage {
    pub model: String,
    pub feature: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub cached_input_tokens: i64,
    pub cost_cents: i64,
    pub meta: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocked(name: &str, pattern: bool) -> BlockedCompany {
        BlockedCompany {
            id: 1,
            name: name.to_string(),
            pattern,
            reason: "test".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_round_trip_and_errors() {
        assert_eq!("applied".parse::<JobStatus>().unwrap(), JobStatus::Applied);
        assert_eq!("Under_Review".parse::<ManualStatus>().unwrap(), ManualStatus::UnderReview);
        assert_eq!(ApplicationStatus::Generated.to_string(), "generated");
        let err = "archived".parse::<JobStatus>().unwrap_err().to_string();
        assert!(err.contains("suggested, applied, ignored, exported"));
    }

    #[test]
    fn test_assessment_validation() {
        assert!(JobSkillAssessment::validate("ruby", true, Some(4)).is_empty());
        assert!(JobSkillAssessment::validate("ruby", false, None).is_empty());

        let errors = JobSkillAssessment::validate("ruby", false, Some(3));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("must be blank"));

        assert_eq!(JobSkillAssessment::validate("ruby", true, None).len(), 1);
        assert_eq!(JobSkillAssessment::validate("ruby", true, Some(6)).len(), 1);
        assert_eq!(JobSkillAssessment::validate(" ", true, Some(0)).len(), 2);
        assert_eq!(JobSkillAssessment::normalize_name("  Ruby On Rails "), "ruby on rails");
    }

    #[test]
    fn test_blocked_company_matches() {
        let exact = blocked("Acme Corp", false);
        assert!(exact.matches("acme corp"));
        assert!(!exact.matches("Acme Corporation"));

        let pattern = blocked("^crypto", true);
        assert!(pattern.matches("CryptoCasino Ltd"));
        assert!(!pattern.matches("Big Crypto"));

        let broken = blocked("bad[", true);
        assert!(broken.matches("Very Bad[ Co"));
    }

    #[test]
    fn test_ai_usage_totals() {
        let usage = AiUsage {
            id: 1,
            model: "gpt-4o-mini".to_string(),
            feature: "cover_letter".to_string(),
            prompt_tokens: 1000,
            completion_tokens: 200,
            cached_input_tokens: 50,
            cost_cents: 125,
            meta: serde_json::json!({}),
            created_at: Utc::now(),
        };
        assert_eq!(usage.total_tokens(), 1250);
        assert!((usage.cost_dollars() - 1.25).abs() < f64::EPSILON);
    }
}
