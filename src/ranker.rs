use regex::Regex;

use crate::filter::JobFilter;
use crate::rules::Rules;
use crate::text::{keyword_regex, normalize_text};

#[derive(Debug, Clone)]
struct WeightedTerm {
    pattern: Regex,
    weight: f64,
}

/// Weighted keyword scoring on top of `JobFilter`.
#[derive(Debug, Clone)]
pub struct JobRanker {
    filter: JobFilter,
    boosts: Vec<WeightedTerm>,
    penalties: Vec<WeightedTerm>,
    neutral: Vec<WeightedTerm>,
    min_keep_score: f64,
}

impl JobRanker {
    pub fn from_rules(rules: &Rules) -> Self {
        Self {
            filter: JobFilter::from_rules(rules),
            boosts: weighted_terms(&rules.scoring.boosts),
            penalties: weighted_terms(&rules.scoring.penalties),
            neutral: weighted_terms(&rules.scoring.neutral_or_low),
            min_keep_score: rules.min_keep_score(),
        }
    }

    pub fn filter(&self) -> &JobFilter {
        &self.filter
    }

    /// Zero when the filter rejects the job or the sum falls below the minimum.
    pub fn score(&self, title: &str, description: &str, location: Option<&str>) -> f64 {
        if !self.filter.keep(title, description, location) {
            return 0.0;
        }

        let text = normalize_text(&format!("{} {}", title, description));
        let sum = |terms: &[WeightedTerm], signed: fn(f64) -> f64| -> f64 {
            terms
                .iter()
                .map(|t| t.pattern.find_iter(&text).count() as f64 * signed(t.weight))
                .sum()
        };

        let score = sum(&self.boosts, |w| w) + sum(&self.neutral, |w| w)
            - sum(&self.penalties, f64::abs);

        if score < self.min_keep_score {
            0.0
        } else {
            score
        }
    }
}

fn weighted_terms<'a>(weights: impl IntoIterator<Item = (&'a String, &'a f64)>) -> Vec<WeightedTerm> {
    weights
        .into_iter()
        .filter_map(|(keyword, weight)| {
            keyword_regex(keyword).map(|pattern| WeightedTerm { pattern, weight: *weight })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &str = r#"
job_filters:
  include_keywords: [ruby, rails, react, javascript]
  exclude_keywords: [php]
scoring:
  boosts: { rails: 3, rspec: 2, sidekiq: 2, ruby: 2 }
  neutral_or_low: { react: 0.5, javascript: 0.5 }
  penalties: { wordpress: -4, jquery: 1 }
ranking:
  min_keep_score: 1
"#;

    fn ranker() -> JobRanker {
        JobRanker::from_rules(&Rules::from_yaml_str(RULES).unwrap())
    }

    #[test]
    fn test_rails_job_outranks_react_job() {
        let ranker = ranker();
        let rails = ranker.score("Ruby on Rails Engineer", "Rails RSpec Sidekiq", None);
        let react = ranker.score("React Developer", "React JavaScript", None);
        assert!(rails > react, "rails={} react={}", rails, react);
        assert_eq!(rails, 2.0 + 3.0 * 2.0 + 2.0 + 2.0);
        assert_eq!(react, 1.5);
    }

    #[test]
    fn test_penalties_subtract_absolute_weight() {
        let ranker = ranker();
        let score = ranker.score("Rails Engineer", "Rails and WordPress and jQuery", None);
        assert_eq!(score, 6.0 - 4.0 - 1.0);
    }

    #[test]
    fn test_below_minimum_is_zero() {
        let ranker = ranker();
        assert_eq!(ranker.score("JavaScript Engineer", "WordPress", None), 0.0);
        assert_eq!(ranker.score("React Developer", "", None), 0.0);
    }

    #[test]
    fn test_filtered_job_scores_zero() {
        let ranker = ranker();
        assert_eq!(ranker.score("Rails Engineer", "PHP too", None), 0.0);
        assert_eq!(ranker.score("Rails Engineer", "Rails", Some("France")), 0.0);
        assert_eq!(ranker.score("Tax Analyst", "Tax", None), 0.0);
    }

    #[test]
    fn test_default_min_keep_score() {
        let rules = Rules::from_yaml_str(
            "job_filters: { include_keywords: [go] }\nscoring: { boosts: { go: 0.5 } }",
        )
        .unwrap();
        let ranker = JobRanker::from_rules(&rules);
        assert_eq!(ranker.score("Go Developer", "", None), 0.0);
        assert_eq!(ranker.score("Go Developer", "go go", None), 1.5);
    }
}
