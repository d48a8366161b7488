use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::time::Duration;

use super::{CoverLetter, CoverLetterRequest, Usage, Writer};
use crate::error::WizardError;
use crate::skills::experience::SkillLevel;

const MAX_TOKENS: u32 = 1200;
const TEMPERATURE: f32 = 0.7;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-20241022";

// --- Provider trait ---

/// A reply plus whatever token accounting the provider sent back.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
}

pub trait AIProvider {
    fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<Completion>;
    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAI,
    Anthropic,
}

impl ProviderKind {
    pub fn api_key_var(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    fn model_var(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "OPENAI_MODEL",
            ProviderKind::Anthropic => "ANTHROPIC_MODEL",
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => DEFAULT_OPENAI_MODEL,
            ProviderKind::Anthropic => DEFAULT_ANTHROPIC_MODEL,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Anthropic => "anthropic",
        })
    }
}

pub fn create_provider(kind: ProviderKind) -> Result<Box<dyn AIProvider>> {
    create_provider_with_model(kind, None)
}

/// Like [`create_provider`], but `model` wins over the provider's model variable.
pub fn create_provider_with_model(kind: ProviderKind, model: Option<String>) -> Result<Box<dyn AIProvider>> {
    let model = model
        .or_else(|| env::var(kind.model_var()).ok())
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| kind.default_model().to_string());

    match kind {
        ProviderKind::OpenAI => Ok(Box::new(OpenAIProvider::new(model)?)),
        ProviderKind::Anthropic => Ok(Box::new(AnthropicProvider::new(model)?)),
    }
}

fn api_client() -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")
}

// --- Anthropic provider ---

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: i64,
    #[serde(default)]
    output_tokens: i64,
    #[serde(default)]
    cache_read_input_tokens: i64,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Debug)]
pub struct AnthropicProvider {
    api_key: String,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl AnthropicProvider {
    pub fn new(model_id: String) -> Result<Self> {
        let api_key = env::var("ANTHROPIC_API_KEY")
            .context("ANTHROPIC_API_KEY environment variable not set. Set it with: export ANTHROPIC_API_KEY=your-key-here")?;
        Ok(Self { api_key, model_id, client: api_client()? })
    }
}

impl AIProvider for AnthropicProvider {
    fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<Completion> {
        let request = AnthropicRequest {
            model: self.model_id.clone(),
            max_tokens,
            temperature: TEMPERATURE,
            system: format!("{}\nRespond with the JSON object only.", system),
            messages: vec![Message {
                role: "user".to_string(),
                content: user.to_string(),
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .context("Failed to send request to Anthropic API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(anyhow!(
                "Anthropic API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let api_response: AnthropicResponse = response
            .json()
            .context("Failed to parse Anthropic API response")?;

        let text = api_response
            .content
            .first()
            .map(|block| block.text.clone())
            .ok_or_else(|| anyhow!("No content in Anthropic API response"))?;

        Ok(Completion {
            text,
            usage: Usage {
                model: self.model_id.clone(),
                prompt_tokens: api_response.usage.input_tokens,
                completion_tokens: api_response.usage.output_tokens,
                cached_input_tokens: api_response.usage.cache_read_input_tokens,
            },
        })
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- OpenAI provider ---

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Default, Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: i64,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAIUsage {
    #[serde(default)]
    prompt_tokens: i64,
    #[serde(default)]
    completion_tokens: i64,
    #[serde(default)]
    prompt_tokens_details: PromptTokensDetails,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: OpenAIUsage,
}

#[derive(Debug)]
pub struct OpenAIProvider {
    api_key: String,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl OpenAIProvider {
    pub fn new(model_id: String) -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY environment variable not set. Set it with: export OPENAI_API_KEY=your-key-here")?;
        Ok(Self { api_key, model_id, client: api_client()? })
    }
}

impl AIProvider for OpenAIProvider {
    fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<Completion> {
        let request = OpenAIRequest {
            model: self.model_id.clone(),
            max_tokens,
            temperature: TEMPERATURE,
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            response_format: ResponseFormat { kind: "json_object" },
        };

        let response = self
            .client
            .post(OPENAI_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .context("Failed to send request to OpenAI API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(anyhow!(
                "OpenAI API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let api_response: OpenAIResponse = response
            .json()
            .context("Failed to parse OpenAI API response")?;

        let text = api_response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| anyhow!("No content in OpenAI API response"))?;

        let usage = &api_response.usage;
        Ok(Completion {
            text,
            usage: Usage {
                model: self.model_id.clone(),
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                cached_input_tokens: usage.prompt_tokens_details.cached_tokens,
            },
        })
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- Cover letter writer ---

const SYSTEM_PROMPT: &str = "You are a professional résumé and cover letter writer. Your task is to create a cover letter.

CRITICAL RULES (NON-NEGOTIABLE):
1. TRUTH-ONLY: You MUST ONLY use facts explicitly stated in the provided PROFILE and EXPERIENCE sections.
2. NO INVENTION: NEVER invent skills, projects, tools, or achievements not present in the data.
3. UNVERIFIED SKILLS: If the Job Description mentions skills/tools NOT in EXPERIENCE, add them to the \"unverified_skills\" array but DO NOT include them in the generated text.
4. SPECIFIC > GENERIC: Use concrete examples and quantifiable achievements when the data supports it.
5. HUMAN TONE: Write in a warm, professional, concise voice. Avoid buzzwords and clichés.
6. JSON ONLY: Return ONLY valid JSON matching the schema below.

SCHEMA:
{
  \"cover_letter\": \"<string: 3-4 paragraphs of plain text>\",
  \"unverified_skills\": [\"<skills mentioned in the JD but not in EXPERIENCE>\"]
}

COVER LETTER STRUCTURE:
- Opening: express genuine interest, mention 1-2 relevant skills from EXPERIENCE
- Body: highlight 2-3 specific achievements from EXPERIENCE that align with the role
- Closing: brief, warm statement of interest";

#[derive(Debug, Deserialize)]
struct WriterReply {
    cover_letter: String,
    #[serde(default)]
    unverified_skills: Vec<String>,
}

/// Cover letters from a chat model, constrained to the user's own facts.
pub struct AiWriter {
    provider: Box<dyn AIProvider>,
    kind_name: String,
}

impl AiWriter {
    pub fn from_env(kind: ProviderKind) -> Result<Self> {
        Ok(Self::new(create_provider(kind)?, kind.to_string()))
    }

    pub fn new(provider: Box<dyn AIProvider>, kind_name: String) -> Self {
        Self { provider, kind_name }
    }

    pub fn model(&self) -> &str {
        self.provider.model_name()
    }
}

impl Writer for AiWriter {
    fn name(&self) -> &str {
        &self.kind_name
    }

    fn cover_letter(&self, request: &CoverLetterRequest<'_>) -> Result<CoverLetter> {
        let completion = self
            .provider
            .complete(SYSTEM_PROMPT, &user_prompt(request), MAX_TOKENS)?;
        let reply = parse_reply(&completion.text)?;

        Ok(CoverLetter {
            text: reply.cover_letter,
            unverified_skills: reply.unverified_skills,
            usage: Some(completion.usage),
        })
    }

    fn uses_ai(&self) -> bool {
        true
    }
}

/// The JSON body of a model reply. Models sometimes fence it despite being told not to.
pub fn unfence(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim()
}

fn parse_reply(raw: &str) -> Result<WriterReply> {
    let reply: WriterReply = serde_json::from_str(unfence(raw)).context("Failed to parse writer JSON reply")?;
    if reply.cover_letter.trim().is_empty() {
        return Err(WizardError::Generation("writer reply has an empty cover_letter".to_string()).into());
    }
    Ok(reply)
}

fn user_prompt(request: &CoverLetterRequest<'_>) -> String {
    let profile = request.profile;
    let experience = request.experience;

    let mut facts = String::new();
    for skill in &experience.skills {
        let level = match skill.level {
            SkillLevel::Expert => "expert",
            SkillLevel::Intermediate => "intermediate",
            SkillLevel::Basic => "basic",
        };
        facts.push_str(&format!("- {} ({})", skill.name, level));
        if let Some(context) = &skill.context {
            facts.push_str(&format!(": {}", context));
        }
        facts.push('\n');
    }
    for position in &experience.positions {
        facts.push_str(&format!("\n{} at {} ({})\n", position.title, position.company, position.dates));
        if let Some(description) = &position.description {
            facts.push_str(&format!("  {}\n", description));
        }
        for achievement in &position.achievements {
            facts.push_str(&format!("  * {}\n", achievement));
        }
    }

    let mut prompt = format!(
        "Create a cover letter for the following position.\n\n\
         COMPANY: {}\nROLE: {}\n\n\
         JOB DESCRIPTION:\n{}\n\n\
         PROFILE (verified facts only):\nName: {}\nContact: {}\nSummary: {}\n\n\
         EXPERIENCE (verified facts only):\n{}\n",
        request.company,
        request.role,
        request.jd_text.trim(),
        profile.name,
        profile.contact_line(),
        profile.summary.trim(),
        facts.trim_end()
    );

    if let Some(allowed) = request.allowed_skills.filter(|a| !a.is_empty()) {
        prompt.push_str(&format!(
            "\nThe candidate has confirmed these additional skills: {}\n",
            allowed.join(", ")
        ));
    }

    prompt.push_str(
        "\nRemember: Use ONLY facts from PROFILE and EXPERIENCE. \
         Any skills in the JD not in EXPERIENCE go to the unverified_skills array.",
    );
    prompt
}
