use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use regex::Regex;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::debug;

use crate::error::WizardError;

const RESUME_FILE: &str = "resume.md";
const COVER_LETTER_FILE: &str = "cover_letter.md";
const LATEST_LINK: &str = "Latest";
const MAX_SLUG_LEN: usize = 100;

static SLUG_DISALLOWED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("valid regex"));
static SLUG_SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s-]+").expect("valid regex"));

/// Directory layout for generated documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathStyle {
    /// `<root>/<Company> - <Role> - <date>`
    #[default]
    Simple,
    /// `<root>/Applications/<CompanySlug>/<RoleSlug>/<date>`
    Nested,
}

impl fmt::Display for PathStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PathStyle::Simple => "simple",
            PathStyle::Nested => "nested",
        })
    }
}

impl FromStr for PathStyle {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "simple" => Ok(PathStyle::Simple),
            "nested" => Ok(PathStyle::Nested),
            other => Err(anyhow!("Invalid path style '{}'. Expected one of: simple, nested", other)),
        }
    }
}

/// Owns the output folder of one application: its documents and the `Latest` link.
#[derive(Debug, Clone)]
pub struct OutputManager {
    root: PathBuf,
    output_path: PathBuf,
}

impl OutputManager {
    pub fn new(
        root: &Path,
        company: &str,
        role: &str,
        timestamp: DateTime<Local>,
        style: PathStyle,
    ) -> Result<Self, WizardError> {
        let company_slug = slugify(company)?;
        let role_slug = slugify(role)?;
        let date = timestamp.format("%Y-%m-%d").to_string();

        let output_path = match style {
            PathStyle::Simple => root.join(format!("{} - {} - {}", company.trim(), role.trim(), date)),
            PathStyle::Nested => root
                .join("Applications")
                .join(company_slug)
                .join(role_slug)
                .join(date),
        };

        Ok(Self {
            root: root.to_path_buf(),
            output_path,
        })
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn resume_path(&self) -> PathBuf {
        self.output_path.join(RESUME_FILE)
    }

    pub fn cover_letter_path(&self) -> PathBuf {
        self.output_path.join(COVER_LETTER_FILE)
    }

    pub fn latest_path(&self) -> PathBuf {
        self.root.join(LATEST_LINK)
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.output_path)
            .with_context(|| format!("creating {}", self.output_path.display()))
    }

    pub fn write_resume(&self, content: &str) -> Result<PathBuf> {
        self.write_file(RESUME_FILE, content)
    }

    pub fn write_cover_letter(&self, content: &str) -> Result<PathBuf> {
        self.write_file(COVER_LETTER_FILE, content)
    }

    /// Points `<root>/Latest` at this output folder, swapping the link in with a rename.
    pub fn update_latest_symlink(&self) -> Result<()> {
        let latest = self.latest_path();
        let staging = self.root.join(format!(".{}.{}", LATEST_LINK, std::process::id()));
        let _ = fs::remove_file(&staging);

        link_dir(&self.output_path, &staging)
            .with_context(|| format!("linking {}", staging.display()))?;

        if let Ok(meta) = fs::symlink_metadata(&latest) {
            if !meta.file_type().is_symlink() {
                let _ = fs::remove_file(&staging);
                return Err(anyhow!("{} exists and is not a link", latest.display()));
            }
        }

        fs::rename(&staging, &latest).with_context(|| format!("replacing {}", latest.display()))?;
        debug!(target = %self.output_path.display(), "Updated Latest link");
        Ok(())
    }

    pub fn documents_exist(&self) -> bool {
        self.resume_path().is_file() && self.cover_letter_path().is_file()
    }

    pub fn display_path(&self) -> String {
        self.output_path.display().to_string()
    }

    fn write_file(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.output_path.join(name);
        fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }
}

/// "Acme Corp & Co." becomes "AcmeCorpCo". Path separators and `..` are refused outright.
pub fn slugify(text: &str) -> Result<String, WizardError> {
    if text.contains("..") || text.contains('/') || text.contains('\\') {
        return Err(WizardError::InvalidPath(text.to_string()));
    }
    let cleaned = SLUG_DISALLOWED.replace_all(text, "");
    let joined = SLUG_SEPARATORS.replace_all(cleaned.trim(), "");
    Ok(joined.chars().take(MAX_SLUG_LEN).collect())
}

#[cfg(unix)]
fn link_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn link_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stamp() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap()
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Acme Corp & Co.").unwrap(), "AcmeCorpCo");
        assert_eq!(slugify("Senior Engineer (Remote)").unwrap(), "SeniorEngineerRemote");
        assert_eq!(slugify("Full-Stack  Dev").unwrap(), "FullStackDev");
        assert_eq!(slugify(&"x".repeat(150)).unwrap().len(), MAX_SLUG_LEN);
    }

    #[test]
    fn test_rejects_path_traversal() {
        for bad in ["../etc", "a/b", "a\\b", "..", "Acme..Corp"] {
            let err = OutputManager::new(Path::new("/tmp"), bad, "Engineer", stamp(), PathStyle::Simple)
                .unwrap_err();
            assert!(matches!(err, WizardError::InvalidPath(_)), "{}", bad);
        }
        assert!(OutputManager::new(Path::new("/tmp"), "Acme", "../../root", stamp(), PathStyle::Nested).is_err());
    }

    #[test]
    fn test_path_styles() {
        let root = Path::new("/out");
        let simple = OutputManager::new(root, "Acme Corp", "Senior Engineer", stamp(), PathStyle::Simple).unwrap();
        assert_eq!(simple.output_path(), Path::new("/out/Acme Corp - Senior Engineer - 2025-01-15"));

        let nested = OutputManager::new(root, "Acme Corp", "Senior Engineer", stamp(), PathStyle::Nested).unwrap();
        assert_eq!(
            nested.output_path(),
            Path::new("/out/Applications/AcmeCorp/SeniorEngineer/2025-01-15")
        );
    }

    #[test]
    fn test_path_style_from_str() {
        assert_eq!("Nested".parse::<PathStyle>().unwrap(), PathStyle::Nested);
        assert_eq!("simple".parse::<PathStyle>().unwrap(), PathStyle::Simple);
        assert!("flat".parse::<PathStyle>().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_write_documents_and_latest_link() {
        let dir = tempfile::tempdir().unwrap();
        let first = OutputManager::new(dir.path(), "Acme", "Engineer", stamp(), PathStyle::Nested).unwrap();
        first.ensure_directories().unwrap();
        assert!(!first.documents_exist());

        first.write_resume("# Resume\n").unwrap();
        first.write_cover_letter("Dear team\n").unwrap();
        assert!(first.documents_exist());
        first.update_latest_symlink().unwrap();
        assert_eq!(fs::read_link(first.latest_path()).unwrap(), first.output_path());

        let second = OutputManager::new(dir.path(), "Globex", "Developer", stamp(), PathStyle::Simple).unwrap();
        second.ensure_directories().unwrap();
        second.update_latest_symlink().unwrap();
        assert_eq!(fs::read_link(second.latest_path()).unwrap(), second.output_path());
        assert_eq!(
            fs::read_to_string(first.resume_path()).unwrap(),
            "# Resume\n"
        );
    }
}
