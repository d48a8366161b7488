use regex::Regex;
use std::sync::LazyLock;

use crate::text::capitalize;

static COMPANY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?im)^[ \t]*(?:company|organization|employer)[ \t]*[:\-][ \t]*([A-Za-z0-9][A-Za-z0-9 &.,'-]*?)[ \t]*(?:$|\s(?:is|has|based)\b)",
        r"(?m)(?i:\babout)[ \t]+(?:(?i:us)[:\s]+)?([A-Z][A-Za-z0-9 &.,'-]*?)[ \t]*(?:$|\s(?:is|has|we|our)\b)",
        r"(?i)@([a-z0-9-]+)\.",
        r"\A\s*([A-Z][A-Za-z0-9 &.,'-]{2,40})[ \t]*(?:\r?\n|\z)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static ROLE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?im)^[ \t]*(?:job title|position|role|title)[ \t]*[:\-][ \t]*([A-Za-z0-9 ,/.-]+?)[ \t]*(?:$|\sat\s)",
        r"(?im)^[ \t]*([A-Za-z ]{0,60}?\b(?:Engineer|Developer|Manager|Designer|Analyst|Lead|Director|Architect|Specialist|Coordinator)\b[A-Za-z ]{0,40}?)[ \t]*(?:$|\sat\s)",
        r"(?i)(?:hiring|looking for|seeking)(?:\s+an?)?\s+([A-Z][A-Za-z ]+?(?:Engineer|Developer|Manager|Designer|Analyst|Lead|Director|Architect))",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static CORPORATE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[\s,]+(?:inc|llc|ltd|corporation|corp|limited|company|co)\.?$").expect("valid regex")
});
static TRAILING_AT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\s+at\s+.+$").expect("valid regex"));

/// Headings that follow "About" but name a section rather than the employer.
const SECTION_HEADINGS: &[&str] = &["the role", "the team", "the job", "the position", "you", "this role", "the opportunity"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedJd {
    pub company: Option<String>,
    pub role: Option<String>,
}

pub fn parse(text: &str) -> ParsedJd {
    ParsedJd {
        company: company(text),
        role: role(text),
    }
}

/// Best guess at the employer's name, trimmed of corporate suffixes.
pub fn company(text: &str) -> Option<String> {
    for (index, pattern) in COMPANY_PATTERNS.iter().enumerate() {
        let Some(caps) = pattern.captures(text) else { continue };
        let raw = caps[1].trim();
        if SECTION_HEADINGS.contains(&raw.to_lowercase().as_str()) {
            continue;
        }

        let name = CORPORATE_SUFFIX.replace(raw, "").trim().to_string();
        // email domains come back lowercased
        let name = if index == 2 { capitalize(&name) } else { name };
        let len = name.chars().count();
        if (3..50).contains(&len) {
            return Some(name);
        }
    }
    None
}

pub fn role(text: &str) -> Option<String> {
    for pattern in ROLE_PATTERNS.iter() {
        let Some(caps) = pattern.captures(text) else { continue };
        let name = TRAILING_AT.replace(caps[1].trim(), "").trim().to_string();
        let len = name.chars().count();
        if (4..100).contains(&len) {
            return Some(name);
        }
    }
    None
}
