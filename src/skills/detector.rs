use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use super::experience::Experience;

const CATEGORY_PATTERNS: &[&str] = &[
    // languages
    r"\b(ruby|python|javascript|typescript|java|go|rust|php|c\+\+|c#|swift|kotlin|elixir|zig|scala|clojure|haskell|erlang)\b",
    // frameworks
    r"\b(ruby on rails|rails|react|vue|angular|node\.js|express|django|flask|laravel|spring|phoenix|ember|svelte|next\.js|nuxt\.js)\b",
    // databases
    r"\b(postgresql|postgres|mysql|mongodb|mongo|redis|elasticsearch|sqlite|oracle|sql server|cassandra|dynamodb|neo4j)\b",
    // cloud and devops
    r"\b(aws|azure|gcp|google cloud|docker|kubernetes|k8s|terraform|ansible|jenkins|circleci|github actions|gitlab ci|heroku|vercel|netlify)\b",
    // frontend
    r"\b(html|css|sass|scss|less|webpack|vite|babel|eslint|prettier|tailwind|bootstrap|material-ui|styled-components)\b",
    // backend
    r"\b(api|rest|graphql|grpc|microservices|serverless|lambda|nginx|apache|puma|unicorn|passenger)\b",
    // testing
    r"\b(rspec|jest|cypress|selenium|capybara|minitest|testunit|mocha|chai|jasmine|karma|vitest)\b",
    // tools
    r"\b(git|github|gitlab|bitbucket|jira|confluence|slack|discord|figma|sketch|photoshop|illustrator)\b",
    // methodologies
    r"\b(agile|scrum|kanban|tdd|bdd|ci/cd|devops|monolith|mvp|lean)\b",
    // data
    r"\b(sql|nosql|etl|data pipeline|machine learning|ai|artificial intelligence|tensorflow|pytorch|pandas|numpy)\b",
    // security
    r"\b(oauth|jwt|ssl|tls|encryption|authentication|authorization|security|penetration testing|vulnerability)\b",
    // mobile
    r"\b(ios|android|react native|flutter|objective-c|xamarin|cordova|phonegap)\b",
    // operating systems and shells
    r"\b(linux|ubuntu|centos|debian|macos|windows|bash|shell|zsh|vim|emacs|vscode|intellij|eclipse)\b",
];

const DETECTOR_ALIASES: &[(&str, &str)] = &[
    ("js", "javascript"),
    ("ts", "typescript"),
    ("py", "python"),
    ("rb", "ruby"),
    ("rails", "ruby on rails"),
    ("postgres", "postgresql"),
    ("mongo", "mongodb"),
    ("k8s", "kubernetes"),
    ("gcp", "google cloud platform"),
    ("aws", "amazon web services"),
    ("azure", "microsoft azure"),
];

static CATEGORIES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    CATEGORY_PATTERNS
        .iter()
        .map(|p| Regex::new(p).expect("valid skill pattern"))
        .collect()
});

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SkillAnalysis {
    pub verified: Vec<String>,
    pub unverified: Vec<String>,
}

impl SkillAnalysis {
    /// Share of detected skills the user can back up, as a 0..=100 percentage.
    pub fn alignment(&self) -> u32 {
        let total = self.verified.len() + self.unverified.len();
        if total == 0 {
            return 0;
        }
        ((self.verified.len() as f64 / total as f64) * 100.0).round() as u32
    }
}

/// A skill term found in a job description, before and after alias normalization.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DetectedSkill {
    pub raw: String,
    pub name: String,
}

pub struct SkillDetector<'a> {
    experience: &'a Experience,
}

impl<'a> SkillDetector<'a> {
    pub fn new(experience: &'a Experience) -> Self {
        Self { experience }
    }

    pub fn detect(job_description: &str) -> Vec<DetectedSkill> {
        let text = job_description.to_lowercase();
        let mut seen = BTreeSet::new();
        let mut detected = Vec::new();
        for pattern in CATEGORIES.iter() {
            for m in pattern.find_iter(&text) {
                let raw = m.as_str().trim().to_string();
                let name = display_name(&raw);
                if seen.insert(name.clone()) {
                    detected.push(DetectedSkill { raw, name });
                }
            }
        }
        detected
    }

    /// Splits detected skills by whether the experience backs them, directly
    /// or through an alias.
    pub fn analyze(&self, job_description: &str) -> SkillAnalysis {
        let mut verified = BTreeSet::new();
        let mut unverified = BTreeSet::new();

        for skill in Self::detect(job_description) {
            if self.experience.has_skill_with_alias(&skill.raw)
                || self.experience.has_skill_with_alias(&skill.name)
            {
                verified.insert(skill.name);
            } else {
                unverified.insert(skill.name);
            }
        }

        SkillAnalysis {
            verified: verified.into_iter().collect(),
            unverified: unverified.into_iter().collect(),
        }
    }
}

/// Every lowercase term the detector maps onto `name`: the canonical form plus
/// its aliases, so "Amazon Web Services" also yields "aws".
pub fn spellings(name: &str) -> Vec<String> {
    let canonical = name.trim().to_lowercase();
    if canonical.is_empty() {
        return Vec::new();
    }
    let mut terms = vec![canonical.clone()];
    terms.extend(
        DETECTOR_ALIASES
            .iter()
            .filter(|(_, full)| *full == canonical)
            .map(|(alias, _)| alias.to_string()),
    );
    terms
}

fn display_name(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    let canonical = DETECTOR_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lower)
        .map(|(_, full)| full.to_string())
        .unwrap_or(lower);
    canonical
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn experience() -> Experience {
        Experience::from_yaml_str(
            "skills:\n  - name: Ruby on Rails\n    level: expert\n  - name: PostgreSQL\n  - name: AWS\n  - name: RSpec\n",
        )
        .unwrap()
    }

    #[test]
    fn test_detect_normalizes_aliases() {
        let detected = SkillDetector::detect("We use Rails, Postgres, K8s and node.js on AWS.");
        let names: Vec<&str> = detected.iter().map(|d| d.name.as_str()).collect();
        assert!(names.contains(&"Ruby On Rails"));
        assert!(names.contains(&"Postgresql"));
        assert!(names.contains(&"Kubernetes"));
        assert!(names.contains(&"Node.js"));
        assert!(names.contains(&"Amazon Web Services"));
    }

    #[test]
    fn test_analyze_splits_verified_and_unverified() {
        let exp = experience();
        let detector = SkillDetector::new(&exp);
        let analysis = detector.analyze(
            "Senior engineer: Ruby on Rails, RSpec, PostgreSQL, AWS, Kafka-free, GraphQL and Docker.",
        );
        assert_eq!(
            analysis.verified,
            vec!["Amazon Web Services", "Postgresql", "Rspec", "Ruby On Rails"]
        );
        assert_eq!(analysis.unverified, vec!["Docker", "Graphql", "Ruby"]);
        assert_eq!(analysis.alignment(), 57);
    }

    #[test]
    fn test_analyze_is_unique_and_sorted() {
        let exp = experience();
        let analysis = SkillDetector::new(&exp).analyze("docker docker Docker terraform");
        assert_eq!(analysis.unverified, vec!["Docker", "Terraform"]);
        assert!(analysis.verified.is_empty());
    }

    #[test]
    fn test_spellings_include_aliases() {
        assert_eq!(spellings("Amazon Web Services"), vec!["amazon web services", "aws"]);
        assert_eq!(spellings("Kubernetes"), vec!["kubernetes", "k8s"]);
        assert_eq!(spellings("Ruby On Rails"), vec!["ruby on rails", "rails"]);
        assert_eq!(spellings("Docker"), vec!["docker"]);
        assert!(spellings(" ").is_empty());
    }

    #[test]
    fn test_empty_description() {
        let exp = experience();
        let analysis = SkillDetector::new(&exp).analyze("");
        assert_eq!(analysis, SkillAnalysis::default());
        assert_eq!(analysis.alignment(), 0);
    }
}
