use anyhow::Result;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::env;
use tracing::{debug, error};

use crate::db::Database;
use crate::models::{AiUsage, NewAiUsage};
use crate::writers::Usage;

const RECENT_ROWS: usize = 10;

/// USD per 1M tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prices {
    pub input: f64,
    pub cached_input: f64,
    pub output: f64,
}

const PRICE_TABLE: &[(&str, Prices)] = &[
    ("gpt-4o-mini", Prices { input: 0.15, cached_input: 0.075, output: 0.60 }),
    ("gpt-4", Prices { input: 30.0, cached_input: 15.0, output: 60.0 }),
    ("gpt-4-turbo", Prices { input: 10.0, cached_input: 5.0, output: 30.0 }),
    ("gpt-3.5-turbo", Prices { input: 0.50, cached_input: 0.25, output: 1.50 }),
    ("claude-3-5-haiku", Prices { input: 0.80, cached_input: 0.08, output: 4.0 }),
    ("claude-3-5-sonnet", Prices { input: 3.0, cached_input: 0.30, output: 15.0 }),
    ("claude-3-haiku", Prices { input: 0.25, cached_input: 0.03, output: 1.25 }),
    ("claude-3-opus", Prices { input: 15.0, cached_input: 1.50, output: 75.0 }),
];

/// Exact table entry, then the longest entry the model name starts with
/// (dated Claude ids), then the `OPENAI_PRICE_*_PER_M` env rates.
pub fn prices_for(model: &str) -> Prices {
    let model = model.trim();
    if let Some((_, prices)) = PRICE_TABLE.iter().find(|(name, _)| *name == model) {
        return *prices;
    }
    if let Some((_, prices)) = PRICE_TABLE
        .iter()
        .filter(|(name, _)| model.starts_with(name) && name.starts_with("claude"))
        .max_by_key(|(name, _)| name.len())
    {
        return *prices;
    }

    Prices {
        input: env_rate("OPENAI_PRICE_INPUT_PER_M", 0.15),
        cached_input: env_rate("OPENAI_PRICE_CACHED_INPUT_PER_M", 0.075),
        output: env_rate("OPENAI_PRICE_OUTPUT_PER_M", 0.60),
    }
}

fn env_rate(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Cost in whole cents, rounded half away from zero.
pub fn estimate_cents(model: &str, prompt_tokens: i64, completion_tokens: i64, cached_input_tokens: i64) -> i64 {
    let prices = prices_for(model);
    let per_million = |tokens: i64, rate: f64| tokens as f64 / 1_000_000.0 * rate;

    let usd = per_million(prompt_tokens, prices.input)
        + per_million(cached_input_tokens, prices.cached_input)
        + per_million(completion_tokens, prices.output);
    (usd * 100.0).round() as i64
}

/// Persists usage rows. Failures are logged, never returned, so a bookkeeping
/// problem can't fail a generation.
pub struct Recorder<'a> {
    db: &'a Database,
}

impl<'a> Recorder<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn log(&self, feature: &str, usage: &Usage, meta: Value) -> Option<i64> {
        let mut meta = match meta {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        if usage.prompt_tokens == 0 && usage.completion_tokens == 0 {
            meta.insert("missing_usage".to_string(), json!(true));
        }

        let row = NewAiUsage {
            model: usage.model.clone(),
            feature: feature.to_string(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            cached_input_tokens: usage.cached_input_tokens,
            cost_cents: estimate_cents(
                &usage.model,
                usage.prompt_tokens,
                usage.completion_tokens,
                usage.cached_input_tokens,
            ),
            meta: Value::Object(meta),
        };

        match self.db.insert_ai_usage(&row, Utc::now()) {
            Ok(id) => {
                debug!(model = %row.model, feature, cost_cents = row.cost_cents, "Recorded AI usage");
                Some(id)
            }
            Err(e) => {
                error!(model = %row.model, feature, error = %e, "Failed to record AI usage");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub total_cents: i64,
    pub total_dollars: f64,
    pub by_feature: BTreeMap<String, i64>,
    pub count: usize,
    pub recent: Vec<AiUsage>,
}

impl Stats {
    pub fn month_to_date(db: &Database) -> Result<Self> {
        Self::since(db, start_of_month(Utc::now()))
    }

    pub fn since(db: &Database, since: DateTime<Utc>) -> Result<Self> {
        let usages = db.ai_usage_since(since)?;

        let total_cents: i64 = usages.iter().map(|u| u.cost_cents).sum();
        let mut by_feature = BTreeMap::new();
        for usage in &usages {
            *by_feature.entry(usage.feature.clone()).or_insert(0) += usage.cost_cents;
        }

        Ok(Self {
            total_cents,
            total_dollars: total_cents as f64 / 100.0,
            by_feature,
            count: usages.len(),
            recent: usages.into_iter().take(RECENT_ROWS).collect(),
        })
    }
}

fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}
