use anyhow::Result;
use chrono::{Local, NaiveDate};
use regex::Regex;
use std::sync::LazyLock;

use super::{CoverLetter, CoverLetterRequest, Writer};

static ADDRESSED_TEAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)hiring manager|hiring team|recruiter").expect("valid regex"));

const SENIORITY_WORDS: &[&str] = &["senior", "lead", "staff", "principal"];

/// Fills a fixed letter from the profile and experience. Never calls out.
pub struct TemplatesWriter;

impl Writer for TemplatesWriter {
    fn name(&self) -> &str {
        "templates"
    }

    fn cover_letter(&self, request: &CoverLetterRequest<'_>) -> Result<CoverLetter> {
        Ok(CoverLetter {
            text: compose(request, Local::now().date_naive()),
            ..Default::default()
        })
    }
}

pub fn compose(request: &CoverLetterRequest<'_>, date: NaiveDate) -> String {
    let letter = Letter { request };
    let mut parts = vec![
        date.format("%B %d, %Y").to_string(),
        format!("Dear {},", letter.addressee()),
        letter.opening(),
        letter.core(),
    ];
    if let Some(bullets) = letter.bullets() {
        parts.push(bullets);
    }
    parts.push(letter.closing());
    parts.join("\n\n")
}

struct Letter<'r, 'a> {
    request: &'r CoverLetterRequest<'a>,
}

impl Letter<'_, '_> {
    fn addressee(&self) -> String {
        if ADDRESSED_TEAM.is_match(self.request.jd_text) {
            format!("{} Hiring Team", self.request.company)
        } else {
            "Hiring Manager".to_string()
        }
    }

    fn opening(&self) -> String {
        format!(
            "I am writing to express my strong interest in the {} position at {}. \
             With my background in {} and experience building {}, \
             I am excited about the opportunity to contribute to your team.",
            self.request.role,
            self.request.company,
            self.primary_skills(),
            self.experience_summary()
        )
    }

    fn core(&self) -> String {
        match self.achievements().first() {
            Some(first) => format!(
                "In my most recent role at {}, I {}. This experience aligns well with {}'s needs for {}.",
                self.recent_company(),
                lower_first(first.trim_end_matches('.')),
                self.request.company,
                self.role_keywords()
            ),
            None => format!(
                "My experience with {} makes me well-suited for this role, \
                 particularly in areas requiring {}.",
                self.primary_skills(),
                self.role_keywords()
            ),
        }
    }

    fn bullets(&self) -> Option<String> {
        let achievements = self.achievements();
        if achievements.len() < 2 {
            return None;
        }
        Some(
            achievements[1..]
                .iter()
                .map(|a| format!("• {}", a))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }

    fn closing(&self) -> String {
        format!(
            "I am excited about the opportunity to bring my {} expertise to {} \
             and would welcome the chance to discuss how my background aligns with your team's goals. \
             Thank you for considering my application.\n\nBest regards,\n{}",
            self.primary_skills(),
            self.request.company,
            self.request.profile.name.trim()
        )
    }

    fn primary_skills(&self) -> String {
        let expert = self.request.experience.skills_by_level().expert;
        if expert.is_empty() {
            return "full-stack development".to_string();
        }
        expert.iter().take(3).map(|s| s.name.as_str()).collect::<Vec<_>>().join(", ")
    }

    fn experience_summary(&self) -> String {
        self.request
            .experience
            .positions
            .first()
            .and_then(|p| p.description.as_deref())
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_lowercase)
            .unwrap_or_else(|| "scalable applications".to_string())
    }

    fn recent_company(&self) -> &str {
        self.request
            .experience
            .positions
            .first()
            .map(|p| p.company.trim())
            .filter(|c| !c.is_empty())
            .unwrap_or("my previous company")
    }

    /// Up to two achievements from the most recent position; with an
    /// allow-list, only those naming an allowed skill.
    fn achievements(&self) -> Vec<&str> {
        let Some(position) = self.request.experience.positions.first() else {
            return Vec::new();
        };
        position
            .achievements
            .iter()
            .map(String::as_str)
            .filter(|a| match self.request.allowed_skills {
                Some(allowed) if !allowed.is_empty() => {
                    let lower = a.to_lowercase();
                    allowed.iter().any(|skill| lower.contains(&skill.to_lowercase()))
                }
                _ => true,
            })
            .take(2)
            .collect()
    }

    fn role_keywords(&self) -> String {
        let words: Vec<String> = self
            .request
            .role
            .to_lowercase()
            .split_whitespace()
            .filter(|w| !SENIORITY_WORDS.contains(w))
            .map(str::to_string)
            .collect();
        if words.is_empty() {
            "technical expertise".to_string()
        } else {
            words.join(" and ")
        }
    }
}

fn lower_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
