use regex::Regex;
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::error::WizardError;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"));

/// Structural checks for the user's YAML files. Errors are collected, not short-circuited.
pub struct YamlValidator {
    config_dir: PathBuf,
    errors: Vec<String>,
}

impl YamlValidator {
    pub fn new(config_dir: &Path) -> Self {
        Self {
            config_dir: config_dir.to_path_buf(),
            errors: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn validate_all(&mut self) -> Result<(), WizardError> {
        self.errors.clear();
        self.validate_profile();
        self.validate_experience();
        self.validate_rules();

        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(WizardError::ConfigValidation(self.errors.join("\n")))
        }
    }

    pub fn validate_profile(&mut self) {
        let Some(root) = self.load("profile.yml") else { return };

        for field in ["name", "email", "summary"] {
            if blank(root.get(field)) {
                self.errors.push(format!("profile.yml: Missing required field '{}'", field));
            }
        }

        if let Some(email) = root.get("email").and_then(Value::as_str) {
            if !email.trim().is_empty() && !EMAIL.is_match(email.trim()) {
                self.errors.push(format!("profile.yml: Invalid email format '{}'", email));
            }
        }
    }

    pub fn validate_experience(&mut self) {
        let Some(root) = self.load("experience.yml") else { return };

        for field in ["skills", "positions"] {
            if root.get(field).is_none() {
                self.errors.push(format!("experience.yml: Missing required field '{}'", field));
            }
        }

        match root.get("skills") {
            None => {}
            Some(Value::Sequence(items)) => {
                for (index, item) in items.iter().enumerate() {
                    match item {
                        Value::String(_) => {}
                        Value::Mapping(_) if !blank(item.get("name")) => {}
                        Value::Mapping(_) => self.errors.push(format!(
                            "experience.yml: Skill at index {} missing 'name'",
                            index
                        )),
                        _ => self.errors.push(format!(
                            "experience.yml: Invalid skill format at index {}",
                            index
                        )),
                    }
                }
            }
            Some(Value::Mapping(tiers)) => {
                for (tier, skills) in tiers {
                    if !skills.is_sequence() {
                        let tier = tier.as_str().unwrap_or("?");
                        self.errors.push(format!(
                            "experience.yml: Skills under '{}' must be an array",
                            tier
                        ));
                    }
                }
            }
            Some(_) => self
                .errors
                .push("experience.yml: Skills must be an array or hash".to_string()),
        }
    }

    pub fn validate_rules(&mut self) {
        let Some(root) = self.load("rules.yml") else { return };
        if !root.is_mapping() {
            self.errors.push("rules.yml: Must be a valid YAML hash".to_string());
        }
    }

    /// Parses a config file, recording an error and returning None when it can't.
    fn load(&mut self, name: &str) -> Option<Value> {
        let path = self.config_dir.join(name);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(_) => {
                self.errors.push(format!("{}: File not found: {}", name, path.display()));
                return None;
            }
        };
        match serde_yaml::from_str::<Value>(&text) {
            Ok(Value::Mapping(map)) => Some(Value::Mapping(map)),
            Ok(other) if name == "rules.yml" => Some(other),
            Ok(_) => {
                self.errors.push(format!("{}: Must be a valid YAML hash", name));
                None
            }
            Err(e) => {
                self.errors.push(format!("{}: Invalid YAML syntax: {}", name, e));
                None
            }
        }
    }
}

fn blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(profile: &str, experience: &str, rules: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("profile.yml"), profile).unwrap();
        fs::write(dir.path().join("experience.yml"), experience).unwrap();
        fs::write(dir.path().join("rules.yml"), rules).unwrap();
        dir
    }

    #[test]
    fn test_valid_config_passes() {
        let dir = write_config(
            "name: Ada\nemail: ada@example.com\nsummary: Engineer\n",
            "skills: [Ruby, {name: Rails}]\npositions: []\n",
            "job_filters: {}\n",
        );
        let mut validator = YamlValidator::new(dir.path());
        assert!(validator.validate_all().is_ok());
        assert!(validator.errors().is_empty());
    }

    #[test]
    fn test_collects_every_error() {
        let dir = write_config(
            "name: Ada\nemail: not-an-email\n",
            "skills:\n  - level: expert\n  - 42\n",
            "- just\n- a list\n",
        );
        let mut validator = YamlValidator::new(dir.path());
        let err = validator.validate_all().unwrap_err().to_string();

        let errors = validator.errors();
        assert!(errors.contains(&"profile.yml: Missing required field 'summary'".to_string()));
        assert!(errors.contains(&"profile.yml: Invalid email format 'not-an-email'".to_string()));
        assert!(errors.contains(&"experience.yml: Missing required field 'positions'".to_string()));
        assert!(errors.contains(&"experience.yml: Skill at index 0 missing 'name'".to_string()));
        assert!(errors.contains(&"experience.yml: Invalid skill format at index 1".to_string()));
        assert!(errors.contains(&"rules.yml: Must be a valid YAML hash".to_string()));
        assert!(err.contains("profile.yml: Missing required field 'summary'"));
    }

    #[test]
    fn test_tiered_skills_must_be_lists() {
        let dir = write_config(
            "name: Ada\nemail: ada@example.com\nsummary: x\n",
            "skills:\n  proficient: [Ruby]\n  familiar: Elixir\npositions: []\n",
            "{}\n",
        );
        let mut validator = YamlValidator::new(dir.path());
        assert!(validator.validate_all().is_err());
        assert_eq!(
            validator.errors(),
            ["experience.yml: Skills under 'familiar' must be an array"]
        );
    }

    #[test]
    fn test_scalar_skills_rejected() {
        let dir = write_config(
            "name: Ada\nemail: ada@example.com\nsummary: x\n",
            "skills: Ruby\npositions: []\n",
            "{}\n",
        );
        let mut validator = YamlValidator::new(dir.path());
        assert!(validator.validate_all().is_err());
        assert_eq!(validator.errors(), ["experience.yml: Skills must be an array or hash"]);
    }

    #[test]
    fn test_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut validator = YamlValidator::new(dir.path());
        assert!(validator.validate_all().is_err());
        assert_eq!(validator.errors().len(), 3);
        assert!(validator.errors()[0].starts_with("profile.yml: File not found:"));
    }
}
