use anyhow::Result;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::db::Database;
use crate::error::WizardError;
use crate::resume::generator::{ApplicationGenerator, GeneratedDocuments};

/// Fixed number of attempts with a fixed pause between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.retry_attempts, config.retry_backoff)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Runs `op` until it succeeds, the attempts run out, or it fails in a way
    /// another attempt can't fix (bad config, bad paths, missing records).
    pub fn run<T, F>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.attempts || !retryable(&e) => return Err(e),
                Err(e) => {
                    warn!(
                        task = label,
                        attempt,
                        max_attempts = self.attempts,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    thread::sleep(self.backoff);
                    attempt += 1;
                }
            }
        }
    }
}

fn retryable(error: &anyhow::Error) -> bool {
    !matches!(
        error.downcast_ref::<WizardError>(),
        Some(
            WizardError::ConfigValidation(_)
                | WizardError::InvalidPath(_)
                | WizardError::NotFound { .. }
                | WizardError::Validation(_)
        )
    )
}

/// Generates documents for a stored application, re-reading it before every attempt.
pub fn generate_with_retry(
    db: &Database,
    generator: &ApplicationGenerator<'_>,
    policy: RetryPolicy,
    application_id: i64,
    allowed_skills: Option<&[String]>,
) -> Result<GeneratedDocuments> {
    policy.run("generate_documents", |attempt| {
        let application = db.require_application(application_id)?;
        info!(application_id, attempt, max_attempts = policy.attempts(), "Generating documents");
        generator.generate(&application, allowed_skills)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::Cell;

    fn quick(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(0))
    }

    #[test]
    fn test_succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let result = quick(3).run("flaky", |attempt| {
            calls.set(calls.get() + 1);
            if attempt < 3 { Err(anyhow!("timeout")) } else { Ok(attempt) }
        });
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<()> = quick(2).run("down", |_| {
            calls.set(calls.get() + 1);
            Err(anyhow!("HTTP 503"))
        });
        assert!(result.unwrap_err().to_string().contains("503"));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_config_errors_are_not_retried() {
        let calls = Cell::new(0);
        let result: Result<()> = quick(5).run("invalid", |_| {
            calls.set(calls.get() + 1);
            Err(WizardError::ConfigValidation("profile.yml: Missing required field 'name'".into()).into())
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts(), 3);
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts(), 1);
    }
}
