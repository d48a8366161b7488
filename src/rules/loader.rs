
use super::Rules;
use crate::models::BlockedCompany;
use crate::text::merge_unique;

const DEFAULT_CONTENT_BLOCKLIST: &[&str] = &[
    "nsfw",
    "adult",
    "entertainment",
    "porn",
    "gambling",
    "casino",
    "sportsbook",
    "crypto casino",
];
const DEFAULT_ALLOWED_PHRASES: &[&str] = &["background check", "background screening"];
const DEFAULT_EXCLUDED_PHRASES: &[&str] = &[
    "active security clearance",
    "secret clearance",
    "ts/sci",
    "dod clearance",
];
const DEFAULT_REQUIRED_KEYWORDS: &[&str] = &["ruby", "rails"];
const DEFAULT_EXCLUDED_KEYWORDS: &[&str] = &["php", "dotnet", ".net", "golang", "cobol"];

/// The `filters` section of `rules.yml` merged with built-in defaults and the
/// database blocklist.
#[derive(Debug, Clone)]
pub struct FilterSettings {
    pub company_blocklist: Vec<String>,
    pub blocked_companies: Vec<BlockedCompany>,
    pub content_blocklist: Vec<String>,
    pub require_no_security_clearance: bool,
    pub allow_background_checks: bool,
    pub allowed_phrases: Vec<String>,
    pub excluded_phrases: Vec<String>,
    pub required_keywords: Vec<String>,
    pub excluded_keywords: Vec<String>,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self::from_rules(&Rules::default(), Vec::new())
    }
}

impl FilterSettings {
    pub fn from_rules(rules: &Rules, blocked_companies: Vec<BlockedCompany>) -> Self {
        let filters = &rules.filters;
        let list = |yaml: &Option<Vec<String>>, defaults: &[&str]| {
            merge_unique(yaml.as_deref().unwrap_or_default(), defaults)
        };

        Self {
            company_blocklist: list(&filters.company_blocklist, &[]),
            blocked_companies,
            content_blocklist: list(&filters.content_blocklist, DEFAULT_CONTENT_BLOCKLIST),
            require_no_security_clearance: filters.require_no_security_clearance.unwrap_or(true),
            allow_background_checks: filters.allow_background_checks.unwrap_or(true),
            allowed_phrases: list(&filters.allowed_phrases, DEFAULT_ALLOWED_PHRASES),
            excluded_phrases: list(&filters.excluded_phrases, DEFAULT_EXCLUDED_PHRASES),
            required_keywords: list(&filters.required_keywords, DEFAULT_REQUIRED_KEYWORDS),
            excluded_keywords: list(&filters.excluded_keywords, DEFAULT_EXCLUDED_KEYWORDS),
        }
    }

    /// Company names from both the YAML list and the database.
    pub fn blocked_company_names(&self) -> Vec<String> {
        let db_names: Vec<&str> = self.blocked_companies.iter().map(|b| b.name.as_str()).collect();
        merge_unique(&self.company_blocklist, &db_names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_defaults_without_yaml() {
        let settings = FilterSettings::default();
        assert!(settings.company_blocklist.is_empty());
        assert!(settings.content_blocklist.contains(&"crypto casino".to_string()));
        assert!(settings.require_no_security_clearance);
        assert!(settings.allow_background_checks);
        assert_eq!(settings.required_keywords, vec!["ruby", "rails"]);
        assert_eq!(settings.excluded_keywords.len(), 5);
    }

    #[test]
    fn test_yaml_values_merge_with_defaults() {
        let rules = Rules::from_yaml_str(
            r#"
filters:
  company_blocklist: ["Evil Corp", "  ", "/^bet/i"]
  excluded_keywords: [perl, php]
  require_no_security_clearance: false
  allow_background_checks: ~
"#,
        )
        .unwrap();
        let settings = FilterSettings::from_rules(&rules, Vec::new());

        assert_eq!(settings.company_blocklist, vec!["Evil Corp", "/^bet/i"]);
        assert_eq!(settings.excluded_keywords, vec!["perl", "php", "dotnet", ".net", "golang", "cobol"]);
        assert!(!settings.require_no_security_clearance);
        assert!(settings.allow_background_checks);
    }

    #[test]
    fn test_blocked_company_names_include_database_rows() {
        let rules = Rules::from_yaml_str("filters: { company_blocklist: [Initech] }").unwrap();
        let db_row = BlockedCompany {
            id: 1,
            name: "Globex".to_string(),
            pattern: false,
            reason: "ghosted".to_string(),
            created_at: Utc::now(),
        };
        let settings = FilterSettings::from_rules(&rules, vec![db_row]);
        assert_eq!(settings.blocked_company_names(), vec!["Initech", "Globex"]);
    }
}
