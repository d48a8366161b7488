pub mod ai;
pub mod templates;

use anyhow::Result;
use std::env;
use tracing::{info, warn};

use crate::profile::Profile;
use crate::skills::detector::{spellings, SkillDetector};
use crate::skills::experience::Experience;
use crate::text::{keyword_regex, normalize_text, term_regex};

use self::ai::{create_provider_with_model, AIProvider, AiWriter, ProviderKind};
use self::templates::TemplatesWriter;

/// Everything a writer may draw on for a cover letter.
#[derive(Debug, Clone, Copy)]
pub struct CoverLetterRequest<'a> {
    pub company: &'a str,
    pub role: &'a str,
    pub jd_text: &'a str,
    pub profile: &'a Profile,
    pub experience: &'a Experience,
    pub allowed_skills: Option<&'a [String]>,
}

/// Token counts reported by a model provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Usage {
    pub model: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub cached_input_tokens: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoverLetter {
    pub text: String,
    pub unverified_skills: Vec<String>,
    pub usage: Option<Usage>,
}

pub trait Writer {
    fn name(&self) -> &str;
    fn cover_letter(&self, request: &CoverLetterRequest<'_>) -> Result<CoverLetter>;

    /// AI output is checked against the experience before use.
    fn uses_ai(&self) -> bool {
        false
    }
}

/// The provider named by `AI_WRITER`, if it is known and its API key is set.
fn configured_kind(choice: Option<&str>) -> Option<ProviderKind> {
    let kind = match choice {
        None | Some("templates") | Some("template") => return None,
        Some("openai") => ProviderKind::OpenAI,
        Some("anthropic") | Some("claude") => ProviderKind::Anthropic,
        Some(other) => {
            warn!(writer = other, "Unknown AI_WRITER, AI disabled");
            return None;
        }
    };

    if env::var(kind.api_key_var()).map(|k| k.trim().is_empty()).unwrap_or(true) {
        warn!(writer = %kind, key = kind.api_key_var(), "API key not set, AI disabled");
        return None;
    }
    Some(kind)
}

/// Picks the writer named by `AI_WRITER`, falling back to templates when the
/// choice is unknown or its API key is missing.
pub fn writer_for(choice: Option<&str>) -> Box<dyn Writer> {
    let Some(kind) = configured_kind(choice) else {
        return Box::new(TemplatesWriter);
    };

    match AiWriter::from_env(kind) {
        Ok(writer) => {
            info!(writer = %kind, model = writer.model(), "Using AI writer");
            Box::new(writer)
        }
        Err(e) => {
            warn!(writer = %kind, error = %e, "AI writer unavailable, using templates");
            Box::new(TemplatesWriter)
        }
    }
}

/// Bare chat provider for the `AI_WRITER` choice, with `model_var` overriding
/// the provider's default model when set.
pub fn provider_for(choice: Option<&str>, model_var: &str) -> Option<Box<dyn AIProvider>> {
    let kind = configured_kind(choice)?;
    let model = env::var(model_var).ok().filter(|m| !m.trim().is_empty());
    match create_provider_with_model(kind, model) {
        Ok(provider) => Some(provider),
        Err(e) => {
            warn!(provider = %kind, error = %e, "AI provider unavailable");
            None
        }
    }
}

/// Runs `writer`, replacing AI prose with the template letter when the call
/// fails or the prose names a skill the experience does not back.
pub fn write_cover_letter(writer: &dyn Writer, request: &CoverLetterRequest<'_>) -> Result<CoverLetter> {
    if !writer.uses_ai() {
        return writer.cover_letter(request);
    }

    let letter = match writer.cover_letter(request) {
        Ok(letter) => letter,
        Err(e) => {
            warn!(writer = writer.name(), error = %e, "AI cover letter failed, using templates");
            return TemplatesWriter.cover_letter(request);
        }
    };

    let violations = truth_violations(&letter.text, request);
    if violations.is_empty() {
        return Ok(letter);
    }

    warn!(
        writer = writer.name(),
        skills = %violations.join(", "),
        "AI cover letter mentions unverified skills, using templates"
    );
    let mut fallback = TemplatesWriter.cover_letter(request)?;
    fallback.unverified_skills = letter.unverified_skills;
    fallback.usage = letter.usage;
    Ok(fallback)
}

/// Unverified JD skills that `text` mentions anyway, under their canonical name
/// or any alias. Explicitly allowed skills don't count.
pub fn truth_violations(text: &str, request: &CoverLetterRequest<'_>) -> Vec<String> {
    let analysis = SkillDetector::new(request.experience).analyze(request.jd_text);

    // "ruby on rails" is verified even when bare "ruby" is not
    let mut mentions = Mentions::new(text);
    for verified in &analysis.verified {
        for term in spellings(verified) {
            mentions.strip(&term);
        }
    }

    analysis
        .unverified
        .into_iter()
        .filter(|skill| !is_allowed(skill, request.allowed_skills))
        .filter(|skill| spellings(skill).iter().any(|term| mentions.contains(term)))
        .collect()
}

/// The letter text in two forms: normalized for plain words, and lowercased
/// for terms whose symbols normalization would erase ("c++", "node.js").
struct Mentions {
    normalized: String,
    raw: String,
}

impl Mentions {
    fn new(text: &str) -> Self {
        Self { normalized: normalize_text(text), raw: text.to_lowercase() }
    }

    fn strip(&mut self, term: &str) {
        if let Some(re) = keyword_regex(term) {
            self.normalized = re.replace_all(&self.normalized, " ").into_owned();
        }
        if let Some(re) = term_regex(term) {
            self.raw = re.replace_all(&self.raw, " ").into_owned();
        }
    }

    fn contains(&self, term: &str) -> bool {
        if normalize_text(term) == term {
            keyword_regex(term).is_some_and(|re| re.is_match(&self.normalized))
        } else {
            term_regex(term).is_some_and(|re| re.is_match(&self.raw))
        }
    }
}

/// Case-insensitive containment in either direction, so "Rails" allows "Ruby on Rails".
pub fn is_allowed(skill: &str, allowed: Option<&[String]>) -> bool {
    let Some(allowed) = allowed else { return false };
    let skill = skill.to_lowercase();
    allowed.iter().any(|a| {
        let a = a.trim().to_lowercase();
        !a.is_empty() && (a.contains(&skill) || skill.contains(&a))
    })
}
