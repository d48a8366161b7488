use anyhow::{anyhow, Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::resume::output::PathStyle;

pub const DEFAULT_PROFICIENCY_THRESHOLD: u8 = 3;

/// Runtime settings, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub config_dir: PathBuf,
    pub db_path: PathBuf,
    pub output_root: PathBuf,
    pub path_style: PathStyle,
    pub ai_writer: Option<String>,
    /// `ENABLE_AI_ENHANCERS=true` lets JD summaries and skill extraction call the AI provider.
    pub ai_enhancers: bool,
    pub proficiency_threshold: u8,
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let project_dirs = directories::ProjectDirs::from("", "", "jobwizard");

        let config_dir = match env::var("JOB_WIZARD_CONFIG_DIR") {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => project_dirs
                .as_ref()
                .map(|d| d.config_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from("config")),
        };

        let db_path = match env::var("JOB_WIZARD_DB") {
            Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => project_dirs
                .as_ref()
                .map(|d| d.data_dir().join("jobwizard.db"))
                .unwrap_or_else(|| PathBuf::from("jobwizard.db")),
        };

        let output_root = match env::var("JOB_WIZARD_OUTPUT_ROOT") {
            Ok(root) if !root.trim().is_empty() => expand_home(&root),
            _ => default_output_root(),
        };

        let path_style = match env::var("JOB_WIZARD_PATH_STYLE") {
            Ok(style) => style.parse()?,
            Err(_) => PathStyle::Simple,
        };

        let ai_writer = env::var("AI_WRITER")
            .ok()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty());

        let ai_enhancers = env::var("ENABLE_AI_ENHANCERS")
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            config_dir,
            db_path,
            output_root,
            path_style,
            ai_writer,
            ai_enhancers,
            proficiency_threshold: proficiency_threshold(),
            retry_attempts: parse_env("JOB_WIZARD_RETRY_ATTEMPTS", 3)?,
            retry_backoff: Duration::from_secs(parse_env("JOB_WIZARD_RETRY_BACKOFF_SECS", 5)?),
        })
    }

    pub fn rules_path(&self) -> PathBuf {
        self.config_dir.join("rules.yml")
    }

    pub fn sources_path(&self) -> PathBuf {
        self.config_dir.join("sources.yml")
    }

    pub fn profile_path(&self) -> PathBuf {
        self.config_dir.join("profile.yml")
    }

    pub fn experience_path(&self) -> PathBuf {
        self.config_dir.join("experience.yml")
    }

    /// Writes commented starter files for any config file that doesn't exist yet.
    /// Returns the paths that were created.
    pub fn write_starter_files(&self) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.config_dir)
            .with_context(|| format!("creating {}", self.config_dir.display()))?;

        let mut created = Vec::new();
        for (path, content) in [
            (self.rules_path(), STARTER_RULES),
            (self.sources_path(), STARTER_SOURCES),
            (self.profile_path(), STARTER_PROFILE),
            (self.experience_path(), STARTER_EXPERIENCE),
        ] {
            if path.exists() {
                continue;
            }
            fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;
            created.push(path);
        }
        Ok(created)
    }
}

const STARTER_RULES: &str = "\
job_filters:
  include_keywords: [ruby, rails]
  exclude_keywords: [php, wordpress]
  require_include_match: true

scoring:
  boosts: { rails: 3, ruby: 2, rspec: 1, sidekiq: 1, remote: 1 }
  penalties: { php: 3, onsite: 2 }

ranking:
  min_keep_score: 1

filters:
  company_blocklist: []
  require_no_security_clearance: true

skill_verification:
  flag_unverified: true
";

const STARTER_SOURCES: &str = "\
# provider: greenhouse | lever | personio | remoteok | remotive | smartrecruiters
sources:
  - provider: remotive
    slug: software-dev
    name: Remotive
    active: true
";

const STARTER_PROFILE: &str = "\
name: Your Name
email: you@example.com
phone: 555-0100
location: Remote
linkedin: linkedin.com/in/you
summary: >
  One paragraph about what you build and how.
education: []
";

const STARTER_EXPERIENCE: &str = "\
skills:
  - name: Ruby on Rails
    level: expert
    context: Years of production work
positions:
  - company: Current Employer
    title: Software Engineer
    dates: 2020 - Present
    achievements:
      - Something measurable you shipped
projects: []
not_claimed_skills: []
";

/// `JW_PROF_THRESHOLD`, falling back to 3 when unset or unparsable.
pub fn proficiency_threshold() -> u8 {
    env::var("JW_PROF_THRESHOLD")
        .ok()
        .and_then(|v| v.trim().parse::<u8>().ok())
        .unwrap_or(DEFAULT_PROFICIENCY_THRESHOLD)
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("{} must be a number, got '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}

fn default_output_root() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| {
            dirs.document_dir()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| dirs.home_dir().join("Documents"))
        })
        .unwrap_or_else(|| PathBuf::from("Documents"))
        .join("JobWizard")
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(dirs) = directories::UserDirs::new() {
            return dirs.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proficiency_threshold_from_env() {
        let original = env::var("JW_PROF_THRESHOLD").ok();

        unsafe { env::set_var("JW_PROF_THRESHOLD", "4"); }
        assert_eq!(proficiency_threshold(), 4);

        unsafe { env::set_var("JW_PROF_THRESHOLD", "lots"); }
        assert_eq!(proficiency_threshold(), DEFAULT_PROFICIENCY_THRESHOLD);

        unsafe { env::remove_var("JW_PROF_THRESHOLD"); }
        assert_eq!(proficiency_threshold(), DEFAULT_PROFICIENCY_THRESHOLD);

        if let Some(val) = original {
            unsafe { env::set_var("JW_PROF_THRESHOLD", val); }
        }
    }

    fn sample_config() -> AppConfig {
        AppConfig {
            config_dir: PathBuf::from("/tmp/jw"),
            db_path: PathBuf::from("/tmp/jw/jobwizard.db"),
            output_root: PathBuf::from("/tmp/out"),
            path_style: PathStyle::Simple,
            ai_writer: None,
            ai_enhancers: false,
            proficiency_threshold: 3,
            retry_attempts: 3,
            retry_backoff: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_config_paths_follow_config_dir() {
        let config = sample_config();
        assert_eq!(config.rules_path(), PathBuf::from("/tmp/jw/rules.yml"));
        assert_eq!(config.sources_path(), PathBuf::from("/tmp/jw/sources.yml"));
        assert_eq!(config.experience_path(), PathBuf::from("/tmp/jw/experience.yml"));
    }

    #[test]
    fn test_write_starter_files_keeps_existing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = sample_config();
        config.config_dir = dir.path().join("config");
        fs::create_dir_all(&config.config_dir).unwrap();
        fs::write(config.profile_path(), "name: Kept\n").unwrap();

        let created = config.write_starter_files().unwrap();
        assert_eq!(created.len(), 3);
        assert_eq!(fs::read_to_string(config.profile_path()).unwrap(), "name: Kept\n");

        let rules = crate::rules::Rules::from_yaml_str(&fs::read_to_string(config.rules_path()).unwrap()).unwrap();
        assert_eq!(rules.job_filters.include_keywords, vec!["ruby", "rails"]);
        let sources = crate::sources::load_sources(&config.sources_path()).unwrap();
        assert_eq!(sources.len(), 1);
        let experience = crate::skills::experience::Experience::load(&config.experience_path()).unwrap();
        assert_eq!(experience.positions.len(), 1);

        assert!(config.write_starter_files().unwrap().is_empty());
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        if directories::UserDirs::new().is_some() {
            assert!(!expand_home("~/Docs").to_string_lossy().starts_with('~'));
        }
    }
}
