use anyhow::{Context, Result};
use chrono::{Local, Utc};
use serde_json::json;
use std::path::PathBuf;
use tracing::{error, info};

use super::builder::ResumeBuilder;
use super::output::OutputManager;
use crate::ai_cost::Recorder;
use crate::config::AppConfig;
use crate::db::Database;
use crate::error::WizardError;
use crate::models::{Application, ApplicationStatus};
use crate::profile::Profile;
use crate::rules::scanner::ScanResult;
use crate::skills::experience::Experience;
use crate::validator::YamlValidator;
use crate::writers::Writer;

const USAGE_FEATURE: &str = "cover_letter";

#[derive(Debug, Clone)]
pub struct GeneratedDocuments {
    pub output_path: PathBuf,
    pub resume_path: PathBuf,
    pub cover_letter_path: PathBuf,
    pub unverified_skills: Vec<String>,
}

/// Turns a stored application into a resume and cover letter on disk.
pub struct ApplicationGenerator<'a> {
    db: &'a Database,
    config: &'a AppConfig,
    writer: &'a dyn Writer,
}

impl<'a> ApplicationGenerator<'a> {
    pub fn new(db: &'a Database, config: &'a AppConfig, writer: &'a dyn Writer) -> Self {
        Self { db, config, writer }
    }

    /// On failure the application is left in the `error` state.
    pub fn generate(
        &self,
        application: &Application,
        allowed_skills: Option<&[String]>,
    ) -> Result<GeneratedDocuments> {
        match self.run(application, allowed_skills) {
            Ok(documents) => {
                info!(
                    application_id = application.id,
                    path = %documents.output_path.display(),
                    "Generated documents"
                );
                Ok(documents)
            }
            Err(e) => {
                error!(application_id = application.id, error = %e, "Document generation failed");
                if let Err(status_err) =
                    self.db
                        .update_application_status(application.id, ApplicationStatus::Error, None, Utc::now())
                {
                    error!(application_id = application.id, error = %status_err, "Failed to mark application as errored");
                }
                Err(e)
            }
        }
    }

    fn run(&self, application: &Application, allowed_skills: Option<&[String]>) -> Result<GeneratedDocuments> {
        self.validate()?;

        let profile = Profile::load(&self.config.profile_path())?;
        let experience = Experience::load(&self.config.experience_path())?;

        let builder = ResumeBuilder::new(&application.job_description, &profile, &experience)
            .allowed_skills(allowed_skills)
            .target(&application.company, &application.role);
        let resume = builder.build_resume();
        let (cover_letter, letter) = builder.build_cover_letter(self.writer)?;

        let output = OutputManager::new(
            &self.config.output_root,
            &application.company,
            &application.role,
            Local::now(),
            self.config.path_style,
        )?;
        output.ensure_directories()?;
        let resume_path = output.write_resume(&resume.to_markdown())?;
        let cover_letter_path = output.write_cover_letter(&cover_letter.to_markdown())?;
        if !output.documents_exist() {
            return Err(WizardError::Generation(format!(
                "documents missing from {} after writing",
                output.display_path()
            ))
            .into());
        }
        output.update_latest_symlink()?;

        if let Some(usage) = &letter.usage {
            Recorder::new(self.db).log(
                USAGE_FEATURE,
                usage,
                json!({ "application_id": application.id, "writer": self.writer.name() }),
            );
        }

        let now = Utc::now();
        if !letter.unverified_skills.is_empty() {
            let mut flags: ScanResult = serde_json::from_value(application.flags.clone()).unwrap_or_default();
            flags.merge_writer_skills(&letter.unverified_skills);
            let flags = serde_json::to_value(&flags).context("serializing application flags")?;
            self.db.update_application_flags(application.id, &flags, now)?;
        }

        let display_path = output.display_path();
        self.db.update_application_status(
            application.id,
            ApplicationStatus::Generated,
            Some(&display_path),
            now,
        )?;

        Ok(GeneratedDocuments {
            output_path: output.output_path().to_path_buf(),
            resume_path,
            cover_letter_path,
            unverified_skills: letter.unverified_skills,
        })
    }

    fn validate(&self) -> Result<(), WizardError> {
        let mut validator = YamlValidator::new(&self.config.config_dir);
        validator.validate_profile();
        validator.validate_experience();
        if validator.errors().is_empty() {
            Ok(())
        } else {
            Err(WizardError::ConfigValidation(validator.errors().join("\n")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewApplication;
    use crate::resume::output::PathStyle;
    use crate::writers::templates::TemplatesWriter;
    use crate::writers::{CoverLetter, CoverLetterRequest, Usage};
    use std::fs;
    use std::time::Duration;

    struct FakeAi;

    impl Writer for FakeAi {
        fn name(&self) -> &str {
            "fake"
        }

        fn cover_letter(&self, _request: &CoverLetterRequest<'_>) -> Result<CoverLetter> {
            Ok(CoverLetter {
                text: "Dear team,\n\nI build Rails apps.".to_string(),
                unverified_skills: vec!["Kafka".to_string()],
                usage: Some(Usage {
                    model: "gpt-4o-mini".to_string(),
                    prompt_tokens: 1000,
                    completion_tokens: 200,
                    cached_input_tokens: 0,
                }),
            })
        }

        fn uses_ai(&self) -> bool {
            true
        }
    }

    fn config(dir: &std::path::Path) -> AppConfig {
        AppConfig {
            config_dir: dir.join("config"),
            db_path: dir.join("jobwizard.db"),
            output_root: dir.join("out"),
            path_style: PathStyle::Simple,
            ai_writer: None,
            ai_enhancers: false,
            proficiency_threshold: 3,
            retry_attempts: 3,
            retry_backoff: Duration::from_secs(0),
        }
    }

    fn write_config(config: &AppConfig, profile: &str) {
        fs::create_dir_all(&config.config_dir).unwrap();
        fs::write(config.profile_path(), profile).unwrap();
        fs::write(
            config.experience_path(),
            "skills:\n  - name: Ruby on Rails\n    level: expert\npositions:\n  - company: Acme\n    title: Engineer\n    dates: 2020 - Present\n    achievements: [Shipped billing]\n",
        )
        .unwrap();
    }

    fn application(db: &Database) -> Application {
        let id = db
            .create_application(
                &NewApplication {
                    job_posting_id: None,
                    company: "Globex".to_string(),
                    role: "Rails Engineer".to_string(),
                    job_description: "Rails and Kafka".to_string(),
                    flags: json!({}),
                },
                Utc::now(),
            )
            .unwrap();
        db.require_application(id).unwrap()
    }

    #[test]
    fn test_generate_writes_documents_and_marks_generated() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        write_config(&config, "name: Jane Doe\nemail: jane@example.com\nsummary: Rails engineer\n");
        let db = Database::open_in_memory().unwrap();
        let app = application(&db);

        let docs = ApplicationGenerator::new(&db, &config, &FakeAi).generate(&app, None).unwrap();

        assert!(fs::read_to_string(&docs.resume_path).unwrap().starts_with("# Jane Doe"));
        assert!(fs::read_to_string(&docs.cover_letter_path).unwrap().contains("I build Rails apps."));
        assert!(docs.output_path.ends_with(format!("Globex - Rails Engineer - {}", Local::now().format("%Y-%m-%d"))));

        let stored = db.require_application(app.id).unwrap();
        assert_eq!(stored.status, ApplicationStatus::Generated);
        assert!(stored.pdfs_ready());
        assert_eq!(stored.flags["unverified_skills"][0]["skill"], "Kafka");
        assert_eq!(stored.flags["unverified_skills"][0]["source"], "ai_writer");

        let usage = db.ai_usage_since(Utc::now() - chrono::Duration::hours(1)).unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].feature, "cover_letter");
        assert_eq!(usage[0].meta["application_id"], app.id);
    }

    #[test]
    fn test_invalid_profile_marks_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        write_config(&config, "name: Jane Doe\nemail: not-an-email\n");
        let db = Database::open_in_memory().unwrap();
        let app = application(&db);

        let err = ApplicationGenerator::new(&db, &config, &TemplatesWriter)
            .generate(&app, None)
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Missing required field 'summary'"));
        assert!(message.contains("Invalid email format"));

        assert_eq!(db.require_application(app.id).unwrap().status, ApplicationStatus::Error);
        assert!(!config.output_root.exists());
    }
}
