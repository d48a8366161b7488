pub mod extractor;
pub mod role;
pub mod summarizer;

use anyhow::Result;
use serde_json::json;

use crate::ai_cost::Recorder;
use crate::db::Database;
use crate::text::{keyword_regex, normalize_text};
use crate::writers::ai::{unfence, AIProvider};

/// Technologies the heuristic paths look for when no model is available.
pub const COMMON_TECH: &[&str] = &[
    "ruby", "rails", "javascript", "react", "python", "java", "sql", "postgresql", "mysql", "redis", "docker",
    "kubernetes", "aws", "azure", "git", "github",
];

/// Entries of [`COMMON_TECH`] named in `text`, as whole words, in list order.
pub fn common_tech(text: &str) -> Vec<&'static str> {
    let haystack = normalize_text(text);
    COMMON_TECH
        .iter()
        .copied()
        .filter(|tech| keyword_regex(tech).is_some_and(|re| re.is_match(&haystack)))
        .collect()
}

/// A chat model plus the database its token usage is recorded in.
#[derive(Clone, Copy)]
pub struct AiContext<'a> {
    pub provider: &'a dyn AIProvider,
    pub db: &'a Database,
}

impl<'a> AiContext<'a> {
    pub fn new(provider: &'a dyn AIProvider, db: &'a Database) -> Self {
        Self { provider, db }
    }

    /// Sends one prompt and records its usage under `feature`, even when the
    /// reply later turns out to be unusable. Returns the unfenced reply body.
    pub fn complete_json(
        &self,
        feature: &str,
        system: &str,
        user: &str,
        max_tokens: u32,
        job_posting_id: Option<i64>,
    ) -> Result<String> {
        let completion = self.provider.complete(system, user, max_tokens)?;
        Recorder::new(self.db).log(feature, &completion.usage, json!({ "job_posting_id": job_posting_id }));
        Ok(unfence(&completion.text).to_string())
    }
}
