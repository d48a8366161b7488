use thiserror::Error;

/// Failures callers need to tell apart. Everything else travels as `anyhow::Error`.
#[derive(Error, Debug)]
pub enum WizardError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{kind} #{id} not found")]
    NotFound { kind: &'static str, id: i64 },

    #[error("Invalid path component: {0}")]
    InvalidPath(String),

    #[error("Configuration validation failed:\n{0}")]
    ConfigValidation(String),

    #[error("Document generation failed: {0}")]
    Generation(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}
