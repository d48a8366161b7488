use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::info;

use super::loader::FilterSettings;
use crate::models::PostingRef;
use crate::text::compile_rule_pattern;

const MAX_LOGGED_REJECTIONS: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub job_id: Option<i64>,
    pub company: String,
    pub title: String,
    pub reasons: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Ingestion-time checks: company blocklist, content, clearance, keywords.
pub struct RulesEngine {
    settings: FilterSettings,
    rejections: VecDeque<Rejection>,
}

impl RulesEngine {
    pub fn new(settings: FilterSettings) -> Self {
        Self { settings, rejections: VecDeque::new() }
    }

    /// Returns every reason the posting fails, or `None` when it passes.
    /// Rejections are logged and kept in a bounded in-memory log.
    pub fn should_reject(&mut self, posting: PostingRef<'_>) -> Option<Vec<String>> {
        let reasons = self.rejection_reasons(&posting);
        if reasons.is_empty() {
            return None;
        }

        info!(
            company = posting.company,
            title = posting.title,
            reasons = %reasons.join("; "),
            "Rejected job posting"
        );

        if self.rejections.len() == MAX_LOGGED_REJECTIONS {
            self.rejections.pop_front();
        }
        self.rejections.push_back(Rejection {
            job_id: posting.id,
            company: posting.company.to_string(),
            title: posting.title.to_string(),
            reasons: reasons.clone(),
            timestamp: Utc::now(),
        });

        Some(reasons)
    }

    /// The newest `limit` rejections, most recent first.
    pub fn recent_rejections(&self, limit: usize) -> Vec<Rejection> {
        self.rejections.iter().rev().take(limit).cloned().collect()
    }

    pub fn rejection_count(&self) -> usize {
        self.rejections.len()
    }

    fn rejection_reasons(&self, posting: &PostingRef<'_>) -> Vec<String> {
        let mut reasons = Vec::new();
        let content = format!("{} {}", posting.title, posting.description).to_lowercase();

        if self.company_blocked(posting.company) {
            reasons.push(format!("Company '{}' is blocked", posting.company));
        }

        if contains_any(&content, &self.settings.content_blocklist) {
            reasons.push("Contains blocked content".to_string());
        }

        if self.requires_clearance(&content) {
            reasons.push("Requires security clearance".to_string());
        }

        let manual = posting
            .source
            .map(|s| s.trim().is_empty() || s.eq_ignore_ascii_case("manual"))
            .unwrap_or(true);
        if !manual
            && !self.settings.required_keywords.is_empty()
            && !contains_any(&content, &self.settings.required_keywords)
        {
            reasons.push("Missing required keywords (Ruby/Rails)".to_string());
        }

        if contains_any(&content, &self.settings.excluded_keywords) {
            reasons.push("Contains excluded keywords".to_string());
        }

        reasons
    }

    fn company_blocked(&self, company: &str) -> bool {
        let company = company.trim();
        if company.is_empty() {
            return false;
        }

        let yaml_hit = self.settings.company_blocklist.iter().any(|entry| {
            if is_regex_entry(entry) {
                match compile_rule_pattern(entry) {
                    Some(re) => re.is_match(company),
                    None => company
                        .to_lowercase()
                        .contains(entry.trim().to_lowercase().as_str()),
                }
            } else {
                company.eq_ignore_ascii_case(entry.trim())
            }
        });

        yaml_hit || self.settings.blocked_companies.iter().any(|b| b.matches(company))
    }

    fn requires_clearance(&self, content: &str) -> bool {
        if !self.settings.require_no_security_clearance {
            return false;
        }
        if !contains_any(content, &self.settings.excluded_phrases) {
            return false;
        }
        !(self.settings.allow_background_checks
            && contains_any(content, &self.settings.allowed_phrases))
    }
}

fn is_regex_entry(entry: &str) -> bool {
    let entry = entry.trim();
    entry.len() > 1 && entry.starts_with('/') && entry[1..].contains('/')
}

fn contains_any(content: &str, needles: &[String]) -> bool {
    needles
        .iter()
        .map(|n| n.trim().to_lowercase())
        .any(|n| !n.is_empty() && content.contains(&n))
}
