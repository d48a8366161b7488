use anyhow::{anyhow, Context, Result};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

const KEPT_BACKUPS: usize = 5;

/// Edits the exclude-keyword list in `rules.yml`, backing the file up first.
pub struct SafeRulesWriter {
    path: PathBuf,
}

impl SafeRulesWriter {
    pub fn new(path: &Path) -> Self {
        Self { path: path.to_path_buf() }
    }

    /// Returns false when the keyword was already present.
    pub fn add_exclude_keyword(&self, keyword: &str) -> Result<bool> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(anyhow!("Keyword can't be blank"));
        }

        let mut root = self.load()?;
        let keywords = exclude_keywords_mut(&mut root)?;
        let exists = keywords
            .iter()
            .any(|k| k.as_str().is_some_and(|k| k.eq_ignore_ascii_case(keyword)));
        if exists {
            return Ok(false);
        }
        keywords.push(Value::String(keyword.to_string()));
        self.write(&root)?;
        info!(keyword, path = %self.path.display(), "Added exclude keyword");
        Ok(true)
    }

    /// Returns false when the keyword was not present.
    pub fn remove_exclude_keyword(&self, keyword: &str) -> Result<bool> {
        let keyword = keyword.trim();
        let mut root = self.load()?;
        let keywords = exclude_keywords_mut(&mut root)?;
        let before = keywords.len();
        keywords.retain(|k| !k.as_str().is_some_and(|k| k.eq_ignore_ascii_case(keyword)));
        if keywords.len() == before {
            return Ok(false);
        }
        self.write(&root)?;
        info!(keyword, path = %self.path.display(), "Removed exclude keyword");
        Ok(true)
    }

    pub fn backups(&self) -> Result<Vec<PathBuf>> {
        let Some(dir) = self.path.parent() else {
            return Ok(Vec::new());
        };
        let prefix = format!("{}.backup.", file_name(&self.path));
        let mut backups: Vec<PathBuf> = fs::read_dir(if dir.as_os_str().is_empty() { Path::new(".") } else { dir })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| file_name(p).starts_with(&prefix))
            .collect();
        backups.sort();
        Ok(backups)
    }

    fn load(&self) -> Result<Value> {
        if !self.path.exists() {
            return Ok(Value::Mapping(Mapping::new()));
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        let value: Value = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        match value {
            Value::Null => Ok(Value::Mapping(Mapping::new())),
            Value::Mapping(_) => Ok(value),
            _ => Err(anyhow!("{} must be a YAML mapping", self.path.display())),
        }
    }

    fn write(&self, root: &Value) -> Result<()> {
        let backup = self.backup()?;
        let result = self.write_atomically(root);

        if let Err(e) = &result {
            error!(path = %self.path.display(), error = %e, "Failed to write rules, restoring backup");
            if let Some(backup) = &backup {
                fs::copy(backup, &self.path)
                    .with_context(|| format!("restoring {}", backup.display()))?;
            }
            return result;
        }

        self.prune_backups()?;
        Ok(())
    }

    fn backup(&self) -> Result<Option<PathBuf>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let backup = PathBuf::from(format!(
            "{}.backup.{}",
            self.path.display(),
            chrono::Utc::now().timestamp()
        ));
        fs::copy(&self.path, &backup)
            .with_context(|| format!("backing up rules to {}", backup.display()))?;
        Ok(Some(backup))
    }

    fn write_atomically(&self, root: &Value) -> Result<()> {
        let yaml = serde_yaml::to_string(root).context("serializing rules")?;
        let tmp = PathBuf::from(format!("{}.tmp", self.path.display()));
        fs::write(&tmp, yaml).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path).with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }

    fn prune_backups(&self) -> Result<()> {
        let backups = self.backups()?;
        if backups.len() > KEPT_BACKUPS {
            for old in &backups[..backups.len() - KEPT_BACKUPS] {
                fs::remove_file(old).with_context(|| format!("removing {}", old.display()))?;
            }
        }
        Ok(())
    }
}

/// The exclude list of whichever job filter section is in effect, created if missing.
fn exclude_keywords_mut(root: &mut Value) -> Result<&mut Vec<Value>> {
    let map = root
        .as_mapping_mut()
        .ok_or_else(|| anyhow!("rules must be a YAML mapping"))?;

    let has = |map: &Mapping, key: &str| map.get(key).is_some_and(|v| !v.is_null());
    let key = if has(map, "job_filters") || !has(map, "job_filters_ruby") {
        "job_filters"
    } else {
        "job_filters_ruby"
    };

    let section = map
        .entry(Value::String(key.to_string()))
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    if section.is_null() {
        *section = Value::Mapping(Mapping::new());
    }
    let section = section
        .as_mapping_mut()
        .ok_or_else(|| anyhow!("'{}' must be a mapping", key))?;

    let list = section
        .entry(Value::String("exclude_keywords".to_string()))
        .or_insert_with(|| Value::Sequence(Vec::new()));
    if list.is_null() {
        *list = Value::Sequence(Vec::new());
    }
    list.as_sequence_mut()
        .ok_or_else(|| anyhow!("'{}.exclude_keywords' must be a list", key))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Rules;

    #[test]
    fn test_add_and_remove_keyword() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yml");
        fs::write(&path, "job_filters:\n  include_keywords: [ruby]\n  exclude_keywords: [php]\n").unwrap();
        let writer = SafeRulesWriter::new(&path);

        assert!(writer.add_exclude_keyword("Golang").unwrap());
        assert!(!writer.add_exclude_keyword("golang").unwrap());
        let rules = Rules::load(&path);
        assert_eq!(rules.job_filters.exclude_keywords, vec!["php", "Golang"]);
        assert_eq!(rules.job_filters.include_keywords, vec!["ruby"]);

        assert!(writer.remove_exclude_keyword("PHP").unwrap());
        assert!(!writer.remove_exclude_keyword("cobol").unwrap());
        let rules = Rules::load(&path);
        assert_eq!(rules.job_filters.exclude_keywords, vec!["Golang"]);

        assert!(writer.add_exclude_keyword("  ").is_err());
    }

    #[test]
    fn test_writes_to_ruby_section_when_only_that_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yml");
        fs::write(&path, "job_filters_ruby:\n  exclude_keywords: [php]\n").unwrap();

        SafeRulesWriter::new(&path).add_exclude_keyword("cobol").unwrap();
        let rules = Rules::load(&path);
        assert_eq!(rules.job_filters.exclude_keywords, vec!["php", "cobol"]);
    }

    #[test]
    fn test_creates_section_in_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yml");
        let writer = SafeRulesWriter::new(&path);

        writer.add_exclude_keyword("php").unwrap();
        assert_eq!(Rules::load(&path).job_filters.exclude_keywords, vec!["php"]);
        assert!(writer.backups().unwrap().is_empty());
    }

    #[test]
    fn test_backups_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yml");
        fs::write(&path, "job_filters: {}\n").unwrap();
        for ts in 1000..1008 {
            fs::write(dir.path().join(format!("rules.yml.backup.{}", ts)), "old").unwrap();
        }

        let writer = SafeRulesWriter::new(&path);
        writer.add_exclude_keyword("php").unwrap();

        let backups = writer.backups().unwrap();
        assert_eq!(backups.len(), KEPT_BACKUPS);
        assert!(!dir.path().join("rules.yml.backup.1000").exists());
    }

    #[test]
    fn test_rejects_non_mapping_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yml");
        fs::write(&path, "- a\n- b\n").unwrap();
        assert!(SafeRulesWriter::new(&path).add_exclude_keyword("php").is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "- a\n- b\n");
    }
}
