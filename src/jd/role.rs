use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use super::common_tech;
use crate::html;
use crate::skills::detector::{SkillAnalysis, SkillDetector};
use crate::skills::experience::Experience;
use crate::text::titleize;

const MAX_SUMMARY_BULLETS: usize = 5;

static BULLET_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[-•*]\s+").expect("valid regex"));
static DUTY_WORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"responsibilit|\bwill\b|\bmust\b|\bshould\b").expect("valid regex"));
static ACTION_VERB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(build|develop|create|design|implement|maintain|collaborate)").expect("valid regex")
});
static MUST_HAVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)must have|required|experience with").expect("valid regex"));

/// What to highlight, keyed by the words that call for it.
const HIGHLIGHTS: &[(&[&str], &str)] = &[
    (&["rails", "ruby"], "Rails/Ruby experience"),
    (&["react", "javascript"], "Frontend/React skills"),
    (&["api", "backend"], "API/Backend experience"),
];

/// JD skills split three ways. Not-applicable skills are the ones the
/// experience lists as exposure only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SkillCategories {
    pub verified: Vec<String>,
    pub unverified: Vec<String>,
    pub not_applicable: Vec<String>,
}

/// Reads a job description against the user's experience.
pub struct RoleAnalyzer<'a> {
    description: &'a str,
}

impl<'a> RoleAnalyzer<'a> {
    pub fn new(description: &'a str) -> Self {
        Self { description }
    }

    /// Three to five bullets: leading duties, then must-have skills.
    pub fn role_summary(&self) -> Vec<String> {
        let mut bullets: Vec<String> = Vec::new();
        let duties = self.responsibilities();
        let skills = self.must_have_skills();
        for bullet in duties.into_iter().take(3).chain(skills.into_iter().take(2)) {
            if !bullets.contains(&bullet) {
                bullets.push(bullet);
            }
        }
        bullets.truncate(MAX_SUMMARY_BULLETS);
        bullets
    }

    pub fn highlight_suggestions(&self) -> Vec<&'static str> {
        let text = self.description.to_lowercase();
        HIGHLIGHTS
            .iter()
            .filter(|(words, _)| words.iter().any(|w| text.contains(w)))
            .map(|(_, suggestion)| *suggestion)
            .collect()
    }

    pub fn skill_categories(&self, experience: &Experience) -> SkillCategories {
        let SkillAnalysis { verified, unverified } = SkillDetector::new(experience).analyze(self.description);
        let (not_applicable, unverified): (Vec<String>, Vec<String>) =
            unverified.into_iter().partition(|s| experience.is_not_claimed(s));
        SkillCategories { verified, unverified, not_applicable }
    }

    fn responsibilities(&self) -> Vec<String> {
        // "Responsibilities:" and similar headings are not duties themselves
        let lines: Vec<&str> = self
            .description
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.ends_with(':'))
            .collect();

        let mut bullets: Vec<String> = lines
            .iter()
            .filter(|l| BULLET_LINE.is_match(l) || DUTY_WORDS.is_match(&l.to_lowercase()))
            .map(|l| sanitize_line(l))
            .collect();

        if bullets.is_empty() {
            bullets = lines
                .iter()
                .filter(|l| ACTION_VERB.is_match(l))
                .map(|l| sanitize_line(l))
                .collect();
        }

        bullets.retain(|b| !b.is_empty());
        bullets.truncate(MAX_SUMMARY_BULLETS);
        bullets
    }

    fn must_have_skills(&self) -> Vec<String> {
        if !MUST_HAVE.is_match(self.description) {
            return Vec::new();
        }
        common_tech(self.description).into_iter().map(titleize).collect()
    }
}

fn sanitize_line(line: &str) -> String {
    let text = html::clean(line);
    BULLET_LINE.replace(text.trim(), "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const JD: &str = "Rails Engineer at Globex\n\
        Responsibilities:\n\
        - Design <b>billing</b> APIs&nbsp;in Rails\n\
        - Keep our Postgres fleet healthy\n\
        - Pair with the product team\n\
        - Review code daily\n\n\
        Must have: Ruby, Rails and PostgreSQL experience.";

    #[test]
    fn test_role_summary_mixes_duties_and_must_haves() {
        let summary = RoleAnalyzer::new(JD).role_summary();
        assert_eq!(
            summary,
            vec![
                "Design billing APIs in Rails",
                "Keep our Postgres fleet healthy",
                "Pair with the product team",
                "Ruby",
                "Rails"
            ]
        );
    }

    #[test]
    fn test_role_summary_falls_back_to_action_verbs() {
        let jd = "About Globex\nBuild internal tooling for support\nWe like coffee\nMaintain the deploy pipeline";
        let summary = RoleAnalyzer::new(jd).role_summary();
        assert_eq!(summary, vec!["Build internal tooling for support", "Maintain the deploy pipeline"]);
        assert!(RoleAnalyzer::new("").role_summary().is_empty());
    }

    #[test]
    fn test_highlight_suggestions() {
        assert_eq!(
            RoleAnalyzer::new(JD).highlight_suggestions(),
            vec!["Rails/Ruby experience", "API/Backend experience"]
        );
        assert_eq!(
            RoleAnalyzer::new("React and JavaScript frontend").highlight_suggestions(),
            vec!["Frontend/React skills"]
        );
        assert!(RoleAnalyzer::new("Gardening").highlight_suggestions().is_empty());
    }

    #[test]
    fn test_skill_categories() {
        let experience = Experience::from_yaml_str(
            "skills:\n  - name: Ruby on Rails\n    level: expert\nnot_claimed_skills: [Kubernetes]\n",
        )
        .unwrap();
        let categories = RoleAnalyzer::new("Rails, Docker and Kubernetes").skill_categories(&experience);
        assert_eq!(categories.verified, vec!["Ruby On Rails"]);
        assert_eq!(categories.unverified, vec!["Docker"]);
        assert_eq!(categories.not_applicable, vec!["Kubernetes"]);
    }
}
