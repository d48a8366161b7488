use regex::Regex;
use std::sync::LazyLock;

use crate::rules::Rules;
use crate::text::{keyword_regex, normalize_text};

static US_LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(usa|us|united states|america)\b").expect("valid regex"));

static FLEXIBLE_LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(remote|anywhere|worldwide|global|flexible|world wide)\b").expect("valid regex")
});

static COUNTRY_QUALIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(country|countries)\b").expect("valid regex"));

const NON_US_COUNTRIES: &[&str] = &[
    "afghanistan", "albania", "algeria", "argentina", "australia", "austria", "bangladesh",
    "belgium", "brazil", "bulgaria", "cambodia", "canada", "chile", "china", "colombia",
    "croatia", "cuba", "denmark", "egypt", "estonia", "finland", "france", "germany", "ghana",
    "greece", "hungary", "iceland", "india", "indonesia", "iran", "iraq", "ireland", "israel",
    "italy", "japan", "jordan", "kenya", "korea", "kuwait", "latvia", "lebanon", "lithuania",
    "luxembourg", "malaysia", "mexico", "morocco", "myanmar", "netherlands", "new zealand",
    "nigeria", "norway", "pakistan", "philippines", "poland", "portugal", "qatar", "romania",
    "russia", "saudi arabia", "singapore", "slovakia", "south africa", "spain", "sri lanka",
    "sweden", "switzerland", "taiwan", "thailand", "turkey", "ukraine", "united kingdom", "uk",
    "venezuela", "vietnam", "yemen", "zimbabwe",
];

/// Keep/drop decision for a job from keyword lists and its location.
#[derive(Debug, Clone)]
pub struct JobFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    require_include_match: bool,
}

impl JobFilter {
    pub fn new(include: &[String], exclude: &[String], require_include_match: bool) -> Self {
        Self {
            include: include.iter().filter_map(|k| keyword_regex(k)).collect(),
            exclude: exclude.iter().filter_map(|k| keyword_regex(k)).collect(),
            require_include_match,
        }
    }

    pub fn from_rules(rules: &Rules) -> Self {
        Self::new(
            &rules.job_filters.include_keywords,
            &rules.job_filters.exclude_keywords,
            rules.require_include_match(),
        )
    }

    pub fn keep(&self, title: &str, description: &str, location: Option<&str>) -> bool {
        let location = location.unwrap_or_default();
        if location_restricted(location) {
            return false;
        }

        let text = normalize_text(&format!("{} {} {}", title, description, location));

        if self.exclude.iter().any(|re| re.is_match(&text)) {
            return false;
        }

        if self.require_include_match && !self.include.iter().any(|re| re.is_match(&text)) {
            return false;
        }

        true
    }
}

/// True when the location names a non-US country without a remote qualifier.
pub fn location_restricted(location: &str) -> bool {
    let loc = normalize_text(location);
    if loc.is_empty() || US_LOCATION.is_match(&loc) {
        return false;
    }
    if FLEXIBLE_LOCATION.is_match(&loc) && !COUNTRY_QUALIFIER.is_match(&loc) {
        return false;
    }

    NON_US_COUNTRIES.iter().any(|country| loc == *country)
}
