use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::WizardError;
use crate::models::{
    AiUsage, Application, ApplicationStatus, BlockedCompany, JobPosting, JobSkillAssessment,
    JobStatus, ManualApplication, ManualStatus, NewAiUsage, NewApplication, NewJob,
};

/// A job seen again within this window is reported as a duplicate.
const DUPLICATE_WINDOW_MINUTES: i64 = 60;

const JOB_COLUMNS: &str = "id, company, title, description, location, remote, posted_at, url, source,
     external_id, metadata, score, status, applied_at, exported_at, ignored_at, last_seen_at,
     created_at, updated_at";

const APPLICATION_COLUMNS: &str = "id, job_posting_id, company, role, job_description, flags,
     output_path, status, created_at, updated_at";

const MANUAL_COLUMNS: &str =
    "id, company, position, applied_at, status, notes, job_url, created_at, updated_at";

const USAGE_COLUMNS: &str = "id, model, feature, prompt_tokens, completion_tokens,
     cached_input_tokens, cost_cents, meta, created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    /// The job was already applied to, ignored or exported.
    Skipped,
    Duplicate,
}

/// Filters for `Database::list_jobs`. Unset fields don't constrain the query.
#[derive(Debug, Clone, Default)]
pub struct JobQuery {
    pub status: Option<JobStatus>,
    pub search: Option<String>,
    pub company: Option<String>,
    pub remote: Option<bool>,
    pub min_score: Option<f64>,
    pub posted_within_days: Option<i64>,
    pub limit: Option<usize>,
}

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        Ok(Self { conn, path: path.to_path_buf() })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn, path: PathBuf::from(":memory:") };
        db.init()?;
        Ok(db)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS job_postings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                location TEXT,
                remote INTEGER NOT NULL DEFAULT 0,
                posted_at TEXT,
                url TEXT NOT NULL UNIQUE,
                source TEXT,
                external_id TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                score REAL NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'suggested'
                    CHECK (status IN ('suggested', 'applied', 'ignored', 'exported')),
                applied_at TEXT,
                exported_at TEXT,
                ignored_at TEXT,
                last_seen_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_source_external
                ON job_postings(source, external_id) WHERE external_id IS NOT NULL;
            CREATE INDEX IF NOT EXISTS idx_jobs_status ON job_postings(status);
            CREATE INDEX IF NOT EXISTS idx_jobs_score ON job_postings(score);

            CREATE TABLE IF NOT EXISTS applications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_posting_id INTEGER REFERENCES job_postings(id) ON DELETE SET NULL,
                company TEXT NOT NULL,
                role TEXT NOT NULL,
                job_description TEXT NOT NULL,
                flags TEXT NOT NULL DEFAULT '{}',
                output_path TEXT,
                status TEXT NOT NULL DEFAULT 'draft'
                    CHECK (status IN ('draft', 'generated', 'error')),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_applications_job ON applications(job_posting_id);

            CREATE TABLE IF NOT EXISTS job_skill_assessments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_posting_id INTEGER NOT NULL REFERENCES job_postings(id) ON DELETE CASCADE,
                skill_name TEXT NOT NULL,
                have INTEGER NOT NULL,
                proficiency INTEGER CHECK (proficiency IS NULL OR proficiency BETWEEN 1 AND 5),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (job_posting_id, skill_name),
                CHECK ((have = 1 AND proficiency IS NOT NULL) OR (have = 0 AND proficiency IS NULL))
            );

            CREATE TABLE IF NOT EXISTS blocked_companies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                pattern INTEGER NOT NULL DEFAULT 0,
                reason TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS manual_applications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company TEXT NOT NULL,
                position TEXT NOT NULL,
                applied_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'submitted'
                    CHECK (status IN ('submitted', 'under_review', 'rejected', 'accepted', 'offer')),
                notes TEXT,
                job_url TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ai_usages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                model TEXT NOT NULL,
                feature TEXT NOT NULL,
                prompt_tokens INTEGER NOT NULL DEFAULT 0 CHECK (prompt_tokens >= 0),
                completion_tokens INTEGER NOT NULL DEFAULT 0 CHECK (completion_tokens >= 0),
                cached_input_tokens INTEGER NOT NULL DEFAULT 0 CHECK (cached_input_tokens >= 0),
                cost_cents INTEGER NOT NULL DEFAULT 0 CHECK (cost_cents >= 0),
                meta TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_ai_usages_created ON ai_usages(created_at);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='job_postings'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!("Database not initialized. Run 'jobwizard init' first."));
        }
        Ok(())
    }

    // --- Job posting operations ---

    pub fn insert_job(&self, job: &NewJob, now: DateTime<Utc>) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO job_postings (company, title, description, location, remote, posted_at,
                     url, source, external_id, metadata, score, status, last_seen_at,
                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 'suggested', ?12, ?12, ?12)",
                params![
                    job.company,
                    job.title,
                    job.description,
                    job.location,
                    job.remote,
                    job.posted_at,
                    job.url,
                    job.source,
                    job.external_id,
                    metadata_or_empty(&job.metadata),
                    job.score,
                    now,
                ],
            )
            .with_context(|| format!("Failed to insert job '{}' ({})", job.title, job.url))?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_job(&self, id: i64) -> Result<Option<JobPosting>> {
        let sql = format!("SELECT {} FROM job_postings WHERE id = ?1", JOB_COLUMNS);
        self.conn
            .query_row(&sql, [id], Self::row_to_job)
            .optional()
            .context("Failed to load job")
    }

    pub fn require_job(&self, id: i64) -> Result<JobPosting> {
        self.get_job(id)?
            .ok_or_else(|| WizardError::NotFound { kind: "Job", id }.into())
    }

    pub fn find_job_by_external_id(&self, source: &str, external_id: &str) -> Result<Option<JobPosting>> {
        let sql = format!(
            "SELECT {} FROM job_postings WHERE source = ?1 AND external_id = ?2",
            JOB_COLUMNS
        );
        self.conn
            .query_row(&sql, params![source, external_id], Self::row_to_job)
            .optional()
            .context("Failed to look up job by external id")
    }

    pub fn find_job_by_url(&self, url: &str) -> Result<Option<JobPosting>> {
        let sql = format!("SELECT {} FROM job_postings WHERE url = ?1", JOB_COLUMNS);
        self.conn
            .query_row(&sql, [url], Self::row_to_job)
            .optional()
            .context("Failed to look up job by url")
    }

    /// Persists a fetched job, matching an existing row by (source, external_id)
    /// and then by url.
    pub fn upsert_fetched(&self, job: &NewJob, now: DateTime<Utc>) -> Result<(i64, UpsertOutcome)> {
        let mut existing = match (&job.source, &job.external_id) {
            (Some(source), Some(external_id)) => self.find_job_by_external_id(source, external_id)?,
            _ => None,
        };
        if existing.is_none() {
            existing = self.find_job_by_url(&job.url)?;
        }

        let Some(existing) = existing else {
            let id = self.insert_job(job, now)?;
            return Ok((id, UpsertOutcome::Created));
        };

        if existing.status != JobStatus::Suggested {
            self.conn.execute(
                "UPDATE job_postings
                 SET last_seen_at = ?1, posted_at = COALESCE(?2, posted_at), metadata = ?3, updated_at = ?1
                 WHERE id = ?4",
                params![now, job.posted_at, metadata_or_empty(&job.metadata), existing.id],
            )?;
            return Ok((existing.id, UpsertOutcome::Skipped));
        }

        let recently_seen = existing
            .last_seen_at
            .map(|seen| now - seen < Duration::minutes(DUPLICATE_WINDOW_MINUTES))
            .unwrap_or(false);
        if recently_seen {
            self.conn.execute(
                "UPDATE job_postings SET last_seen_at = ?1 WHERE id = ?2",
                params![now, existing.id],
            )?;
            return Ok((existing.id, UpsertOutcome::Duplicate));
        }

        self.conn
            .execute(
                "UPDATE job_postings
                 SET company = ?1, title = ?2, description = ?3, location = ?4, remote = ?5,
                     posted_at = ?6, url = ?7, source = ?8, external_id = ?9, metadata = ?10,
                     score = ?11, last_seen_at = ?12, updated_at = ?12
                 WHERE id = ?13",
                params![
                    job.company,
                    job.title,
                    job.description,
                    job.location,
                    job.remote,
                    job.posted_at,
                    job.url,
                    job.source,
                    job.external_id,
                    metadata_or_empty(&job.metadata),
                    job.score,
                    now,
                    existing.id,
                ],
            )
            .with_context(|| format!("Failed to update job #{}", existing.id))?;
        Ok((existing.id, UpsertOutcome::Updated))
    }

    pub fn list_jobs(&self, query: &JobQuery) -> Result<Vec<JobPosting>> {
        let mut sql = format!("SELECT {} FROM job_postings WHERE 1=1", JOB_COLUMNS);
        let mut values: Vec<Value> = vec![];

        if let Some(status) = query.status {
            values.push(Value::Text(status.as_str().to_string()));
            sql.push_str(&format!(" AND status = ?{}", values.len()));
        }

        if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
            values.push(Value::Text(format!("%{}%", search.trim().to_lowercase())));
            let n = values.len();
            sql.push_str(&format!(
                " AND (LOWER(title) LIKE ?{n} OR LOWER(company) LIKE ?{n} OR LOWER(description) LIKE ?{n})"
            ));
        }

        if let Some(company) = query.company.as_deref().filter(|s| !s.trim().is_empty()) {
            values.push(Value::Text(format!("%{}%", company.trim().to_lowercase())));
            sql.push_str(&format!(" AND LOWER(company) LIKE ?{}", values.len()));
        }

        if let Some(remote) = query.remote {
            values.push(Value::Integer(remote as i64));
            sql.push_str(&format!(" AND remote = ?{}", values.len()));
        }

        if let Some(min_score) = query.min_score {
            values.push(Value::Real(min_score));
            sql.push_str(&format!(" AND score >= ?{}", values.len()));
        }

        if let Some(days) = query.posted_within_days {
            let since = Utc::now() - Duration::days(days);
            values.push(Value::Text(sql_timestamp(since)));
            sql.push_str(&format!(
                " AND COALESCE(posted_at, created_at) >= ?{}",
                values.len()
            ));
        }

        sql.push_str(" ORDER BY score DESC, posted_at DESC, id DESC");

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), Self::row_to_job)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list jobs")
    }

    /// Moves a job to `status` and stamps the matching timestamp column.
    pub fn set_job_status(&self, id: i64, status: JobStatus, now: DateTime<Utc>) -> Result<()> {
        let stamp = match status {
            JobStatus::Applied => Some("applied_at"),
            JobStatus::Ignored => Some("ignored_at"),
            JobStatus::Exported => Some("exported_at"),
            JobStatus::Suggested => None,
        };
        let sql = match stamp {
            Some(column) => format!(
                "UPDATE job_postings SET status = ?1, {column} = ?2, updated_at = ?2 WHERE id = ?3"
            ),
            None => "UPDATE job_postings SET status = ?1, updated_at = ?2 WHERE id = ?3".to_string(),
        };
        let changed = self.conn.execute(&sql, params![status.as_str(), now, id])?;
        if changed == 0 {
            return Err(WizardError::NotFound { kind: "Job", id }.into());
        }
        Ok(())
    }

    pub fn update_job_score(&self, id: i64, score: f64, now: DateTime<Utc>) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE job_postings SET score = ?1, updated_at = ?2 WHERE id = ?3",
            params![score, now, id],
        )?;
        if changed == 0 {
            return Err(WizardError::NotFound { kind: "Job", id }.into());
        }
        Ok(())
    }

    pub fn job_status_counts(&self) -> Result<Vec<(JobStatus, i64)>> {
        let mut counts = Vec::new();
        for status in JobStatus::ALL {
            let count: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM job_postings WHERE status = ?1",
                [status.as_str()],
                |row| row.get(0),
            )?;
            counts.push((*status, count));
        }
        Ok(counts)
    }

    pub fn count_jobs(&self) -> Result<i64> {
        Ok(self.conn.query_row("SELECT COUNT(*) FROM job_postings", [], |row| row.get(0))?)
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<JobPosting> {
        Ok(JobPosting {
            id: row.get(0)?,
            company: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            location: row.get(4)?,
            remote: row.get(5)?,
            posted_at: row.get(6)?,
            url: row.get(7)?,
            source: row.get(8)?,
            external_id: row.get(9)?,
            metadata: row.get(10)?,
            score: row.get(11)?,
            status: parse_column(row, 12)?,
            applied_at: row.get(13)?,
            exported_at: row.get(14)?,
            ignored_at: row.get(15)?,
            last_seen_at: row.get(16)?,
            created_at: row.get(17)?,
            updated_at: row.get(18)?,
        })
    }

    // --- Skill assessment operations ---

    /// Creates or updates the assessment for (job, skill).
    pub fn save_assessment(
        &self,
        job_posting_id: i64,
        skill_name: &str,
        have: bool,
        proficiency: Option<u8>,
        now: DateTime<Utc>,
    ) -> Result<JobSkillAssessment> {
        let errors = JobSkillAssessment::validate(skill_name, have, proficiency);
        if !errors.is_empty() {
            return Err(WizardError::Validation(errors.join(", ")).into());
        }
        self.require_job(job_posting_id)?;

        let skill_name = JobSkillAssessment::normalize_name(skill_name);
        self.conn.execute(
            "INSERT INTO job_skill_assessments
                 (job_posting_id, skill_name, have, proficiency, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT (job_posting_id, skill_name)
             DO UPDATE SET have = excluded.have, proficiency = excluded.proficiency,
                           updated_at = excluded.updated_at",
            params![job_posting_id, skill_name, have, proficiency, now],
        )?;

        self.conn
            .query_row(
                "SELECT id, job_posting_id, skill_name, have, proficiency
                 FROM job_skill_assessments WHERE job_posting_id = ?1 AND skill_name = ?2",
                params![job_posting_id, skill_name],
                Self::row_to_assessment,
            )
            .context("Failed to reload skill assessment")
    }

    pub fn list_assessments(&self, job_posting_id: i64) -> Result<Vec<JobSkillAssessment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, job_posting_id, skill_name, have, proficiency
             FROM job_skill_assessments WHERE job_posting_id = ?1 ORDER BY skill_name",
        )?;
        let rows = stmt.query_map([job_posting_id], Self::row_to_assessment)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list skill assessments")
    }

    pub fn delete_assessment(&self, job_posting_id: i64, skill_name: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "DELETE FROM job_skill_assessments WHERE job_posting_id = ?1 AND skill_name = ?2",
            params![job_posting_id, JobSkillAssessment::normalize_name(skill_name)],
        )?;
        Ok(changed > 0)
    }

    fn row_to_assessment(row: &rusqlite::Row) -> rusqlite::Result<JobSkillAssessment> {
        Ok(JobSkillAssessment {
            id: row.get(0)?,
            job_posting_id: row.get(1)?,
            skill_name: row.get(2)?,
            have: row.get(3)?,
            proficiency: row.get(4)?,
        })
    }

    // --- Blocked company operations ---

    pub fn add_blocked_company(
        &self,
        name: &str,
        pattern: bool,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let mut errors = Vec::new();
        if name.trim().is_empty() {
            errors.push("Name can't be blank");
        }
        if reason.trim().is_empty() {
            errors.push("Reason can't be blank");
        }
        if !errors.is_empty() {
            return Err(WizardError::Validation(errors.join(", ")).into());
        }
        self.conn.execute(
            "INSERT INTO blocked_companies (name, pattern, reason, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![name.trim(), pattern, reason.trim(), now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_blocked_companies(&self) -> Result<Vec<BlockedCompany>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, pattern, reason, created_at FROM blocked_companies ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(BlockedCompany {
                id: row.get(0)?,
                name: row.get(1)?,
                pattern: row.get(2)?,
                reason: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list blocked companies")
    }

    pub fn remove_blocked_company(&self, id: i64) -> Result<bool> {
        let changed = self.conn.execute("DELETE FROM blocked_companies WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }

    // --- Application operations ---

    pub fn create_application(&self, app: &NewApplication, now: DateTime<Utc>) -> Result<i64> {
        let errors = app.validate();
        if !errors.is_empty() {
            return Err(WizardError::Validation(errors.join(", ")).into());
        }
        self.conn.execute(
            "INSERT INTO applications (job_posting_id, company, role, job_description, flags,
                 status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'draft', ?6, ?6)",
            params![
                app.job_posting_id,
                app.company.trim(),
                app.role.trim(),
                app.job_description,
                metadata_or_empty(&app.flags),
                now,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_application(&self, id: i64) -> Result<Option<Application>> {
        let sql = format!("SELECT {} FROM applications WHERE id = ?1", APPLICATION_COLUMNS);
        self.conn
            .query_row(&sql, [id], Self::row_to_application)
            .optional()
            .context("Failed to load application")
    }

    pub fn require_application(&self, id: i64) -> Result<Application> {
        self.get_application(id)?
            .ok_or_else(|| WizardError::NotFound { kind: "Application", id }.into())
    }

    pub fn latest_application_for_job(&self, job_posting_id: i64) -> Result<Option<Application>> {
        let sql = format!(
            "SELECT {} FROM applications WHERE job_posting_id = ?1 ORDER BY created_at DESC, id DESC LIMIT 1",
            APPLICATION_COLUMNS
        );
        self.conn
            .query_row(&sql, [job_posting_id], Self::row_to_application)
            .optional()
            .context("Failed to load latest application")
    }

    pub fn list_applications(
        &self,
        search: Option<&str>,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<Application>> {
        let mut sql = format!("SELECT {} FROM applications WHERE 1=1", APPLICATION_COLUMNS);
        let mut values: Vec<Value> = vec![];

        if let Some(q) = search.filter(|q| !q.trim().is_empty()) {
            values.push(Value::Text(format!("%{}%", q.trim().to_lowercase())));
            let n = values.len();
            sql.push_str(&format!(" AND (LOWER(company) LIKE ?{n} OR LOWER(role) LIKE ?{n})"));
        }

        if let Some(status) = status {
            values.push(Value::Text(status.as_str().to_string()));
            sql.push_str(&format!(" AND status = ?{}", values.len()));
        }

        sql.push_str(" ORDER BY created_at DESC, id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), Self::row_to_application)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list applications")
    }

    pub fn update_application_status(
        &self,
        id: i64,
        status: ApplicationStatus,
        output_path: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE applications SET status = ?1, output_path = COALESCE(?2, output_path), updated_at = ?3
             WHERE id = ?4",
            params![status.as_str(), output_path, now, id],
        )?;
        if changed == 0 {
            return Err(WizardError::NotFound { kind: "Application", id }.into());
        }
        Ok(())
    }

    pub fn update_application_flags(&self, id: i64, flags: &serde_json::Value, now: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "UPDATE applications SET flags = ?1, updated_at = ?2 WHERE id = ?3",
            params![flags, now, id],
        )?;
        Ok(())
    }

    fn row_to_application(row: &rusqlite::Row) -> rusqlite::Result<Application> {
        Ok(Application {
            id: row.get(0)?,
            job_posting_id: row.get(1)?,
            company: row.get(2)?,
            role: row.get(3)?,
            job_description: row.get(4)?,
            flags: row.get(5)?,
            output_path: row.get(6)?,
            status: parse_column(row, 7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    // --- Manual application operations ---

    pub fn add_manual_application(
        &self,
        company: &str,
        position: &str,
        applied_at: DateTime<Utc>,
        notes: Option<&str>,
        job_url: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let mut errors = Vec::new();
        if company.trim().is_empty() {
            errors.push("Company can't be blank");
        }
        if position.trim().is_empty() {
            errors.push("Position can't be blank");
        }
        if !errors.is_empty() {
            return Err(WizardError::Validation(errors.join(", ")).into());
        }
        self.conn.execute(
            "INSERT INTO manual_applications (company, position, applied_at, status, notes, job_url,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, 'submitted', ?4, ?5, ?6, ?6)",
            params![company.trim(), position.trim(), applied_at, notes, job_url, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_manual_applications(&self, status: Option<ManualStatus>) -> Result<Vec<ManualApplication>> {
        let mut sql = format!("SELECT {} FROM manual_applications", MANUAL_COLUMNS);
        let mut values: Vec<Value> = vec![];
        if let Some(status) = status {
            values.push(Value::Text(status.as_str().to_string()));
            sql.push_str(" WHERE status = ?1");
        }
        sql.push_str(" ORDER BY applied_at DESC, id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), |row| {
            Ok(ManualApplication {
                id: row.get(0)?,
                company: row.get(1)?,
                position: row.get(2)?,
                applied_at: row.get(3)?,
                status: parse_column(row, 4)?,
                notes: row.get(5)?,
                job_url: row.get(6)?,
                created_at: row.get(7)?,
                updated_at: row.get(8)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list manual applications")
    }

    pub fn update_manual_application(
        &self,
        id: i64,
        status: Option<ManualStatus>,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE manual_applications
             SET status = COALESCE(?1, status), notes = COALESCE(?2, notes), updated_at = ?3
             WHERE id = ?4",
            params![status.map(|s| s.as_str()), notes, now, id],
        )?;
        if changed == 0 {
            return Err(WizardError::NotFound { kind: "Manual application", id }.into());
        }
        Ok(())
    }

    pub fn delete_manual_application(&self, id: i64) -> Result<bool> {
        let changed = self.conn.execute("DELETE FROM manual_applications WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }

    // --- AI usage operations ---

    pub fn insert_ai_usage(&self, usage: &NewAiUsage, now: DateTime<Utc>) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO ai_usages (model, feature, prompt_tokens, completion_tokens,
                 cached_input_tokens, cost_cents, meta, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                usage.model,
                usage.feature,
                usage.prompt_tokens,
                usage.completion_tokens,
                usage.cached_input_tokens,
                usage.cost_cents,
                metadata_or_empty(&usage.meta),
                now,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Usage rows created at or after `since`, newest first.
    pub fn ai_usage_since(&self, since: DateTime<Utc>) -> Result<Vec<AiUsage>> {
        let sql = format!(
            "SELECT {} FROM ai_usages WHERE created_at >= ?1 ORDER BY created_at DESC, id DESC",
            USAGE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([since], |row| {
            Ok(AiUsage {
                id: row.get(0)?,
                model: row.get(1)?,
                feature: row.get(2)?,
                prompt_tokens: row.get(3)?,
                completion_tokens: row.get(4)?,
                cached_input_tokens: row.get(5)?,
                cost_cents: row.get(6)?,
                meta: row.get(7)?,
                created_at: row.get(8)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to load AI usage")
    }
}

/// Matches the text rusqlite writes for `DateTime<Utc>`, so string comparison orders correctly.
fn sql_timestamp(at: DateTime<Utc>) -> String {
    at.format("%F %T%.f%:z").to_string()
}

fn metadata_or_empty(value: &serde_json::Value) -> serde_json::Value {
    if value.is_null() {
        serde_json::json!({})
    } else {
        value.clone()
    }
}

fn parse_column<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = anyhow::Error>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: anyhow::Error| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::<dyn std::error::Error + Send + Sync>::from(e.to_string()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job(url: &str, external_id: Option<&str>) -> NewJob {
        NewJob {
            company: "Acme".to_string(),
            title: "Ruby on Rails Engineer".to_string(),
            description: "Rails RSpec Sidekiq".to_string(),
            location: Some("Remote".to_string()),
            remote: true,
            posted_at: None,
            url: url.to_string(),
            source: Some("greenhouse".to_string()),
            external_id: external_id.map(str::to_string),
            metadata: serde_json::json!({"greenhouse_id": 1}),
            score: 5.0,
        }
    }

    #[test]
    fn test_init_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        db.ensure_initialized().unwrap();
        assert_eq!(db.count_jobs().unwrap(), 0);
    }

    #[test]
    fn test_uninitialized_database_is_reported() {
        let conn = Connection::open_in_memory().unwrap();
        let db = Database { conn, path: PathBuf::from(":memory:") };
        let err = db.ensure_initialized().unwrap_err().to_string();
        assert!(err.contains("jobwizard init"));
    }

    #[test]
    fn test_refetch_updates_last_seen_without_duplicate_row() {
        let db = Database::open_in_memory().unwrap();
        let first_seen = Utc::now() - Duration::hours(3);
        let job = new_job("https://boards.example.com/1", Some("1"));

        let (id, outcome) = db.upsert_fetched(&job, first_seen).unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);

        let later = Utc::now();
        let mut refreshed = job.clone();
        refreshed.score = 9.0;
        let (same_id, outcome) = db.upsert_fetched(&refreshed, later).unwrap();
        assert_eq!(same_id, id);
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(db.count_jobs().unwrap(), 1);

        let stored = db.get_job(id).unwrap().unwrap();
        assert_eq!(stored.last_seen_at.unwrap().timestamp(), later.timestamp());
        assert_eq!(stored.score, 9.0);
    }

    #[test]
    fn test_refetch_within_window_is_duplicate() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let job = new_job("https://boards.example.com/2", Some("2"));

        db.upsert_fetched(&job, now - Duration::minutes(10)).unwrap();
        let (id, outcome) = db.upsert_fetched(&job, now).unwrap();
        assert_eq!(outcome, UpsertOutcome::Duplicate);
        assert_eq!(db.count_jobs().unwrap(), 1);
        let stored = db.get_job(id).unwrap().unwrap();
        assert_eq!(stored.last_seen_at.unwrap().timestamp(), now.timestamp());
    }

    #[test]
    fn test_refetch_keeps_applied_status() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let job = new_job("https://boards.example.com/3", Some("3"));

        let (id, _) = db.upsert_fetched(&job, now - Duration::days(1)).unwrap();
        db.set_job_status(id, JobStatus::Applied, now - Duration::hours(5)).unwrap();

        let mut changed = job.clone();
        changed.title = "Renamed".to_string();
        let (_, outcome) = db.upsert_fetched(&changed, now).unwrap();
        assert_eq!(outcome, UpsertOutcome::Skipped);

        let stored = db.get_job(id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Applied);
        assert_eq!(stored.title, "Ruby on Rails Engineer");
        assert!(stored.applied_at.is_some());
    }

    #[test]
    fn test_upsert_falls_back_to_url() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let (id, _) = db
            .upsert_fetched(&new_job("https://boards.example.com/4", None), now - Duration::days(1))
            .unwrap();
        let (same_id, outcome) = db
            .upsert_fetched(&new_job("https://boards.example.com/4", None), now)
            .unwrap();
        assert_eq!(id, same_id);
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(db.count_jobs().unwrap(), 1);
    }

    #[test]
    fn test_duplicate_url_insert_fails() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.insert_job(&new_job("https://boards.example.com/5", None), now).unwrap();
        assert!(db.insert_job(&new_job("https://boards.example.com/5", None), now).is_err());
    }

    #[test]
    fn test_list_jobs_filters() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let mut low = new_job("https://boards.example.com/low", Some("low"));
        low.score = 1.0;
        low.remote = false;
        let mut high = new_job("https://boards.example.com/high", Some("high"));
        high.score = 8.0;
        high.company = "Globex".to_string();
        db.insert_job(&low, now).unwrap();
        let high_id = db.insert_job(&high, now).unwrap();

        let all = db.list_jobs(&JobQuery::default()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, high_id);

        let remote = db.list_jobs(&JobQuery { remote: Some(true), ..Default::default() }).unwrap();
        assert_eq!(remote.len(), 1);

        let by_company = db
            .list_jobs(&JobQuery { company: Some("glob".to_string()), ..Default::default() })
            .unwrap();
        assert_eq!(by_company.len(), 1);

        let min_score = db.list_jobs(&JobQuery { min_score: Some(5.0), ..Default::default() }).unwrap();
        assert_eq!(min_score.len(), 1);

        let search = db
            .list_jobs(&JobQuery { search: Some("sidekiq".to_string()), ..Default::default() })
            .unwrap();
        assert_eq!(search.len(), 2);

        db.set_job_status(high_id, JobStatus::Ignored, now).unwrap();
        let suggested = db
            .list_jobs(&JobQuery { status: Some(JobStatus::Suggested), ..Default::default() })
            .unwrap();
        assert_eq!(suggested.len(), 1);
    }

    #[test]
    fn test_status_transitions_stamp_timestamps() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let id = db.insert_job(&new_job("https://boards.example.com/6", None), now).unwrap();

        db.set_job_status(id, JobStatus::Exported, now).unwrap();
        let job = db.get_job(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Exported);
        assert!(job.exported_at.is_some());
        assert!(job.generated_today());

        assert!(db.set_job_status(999, JobStatus::Applied, now).is_err());
    }

    #[test]
    fn test_update_job_score() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let id = db.insert_job(&new_job("https://boards.example.com/60", None), now).unwrap();

        db.update_job_score(id, 12.5, now).unwrap();
        assert_eq!(db.require_job(id).unwrap().score, 12.5);
        assert!(db.update_job_score(999, 1.0, now).is_err());
    }

    #[test]
    fn test_assessment_rejects_proficiency_without_skill() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let job_id = db.insert_job(&new_job("https://boards.example.com/7", None), now).unwrap();

        let err = db.save_assessment(job_id, "Kafka", false, Some(3), now).unwrap_err();
        assert!(err.to_string().contains("must be blank"));

        let err = db.save_assessment(job_id, "Kafka", true, None, now).unwrap_err();
        assert!(err.to_string().contains("can't be blank"));
        assert!(db.list_assessments(job_id).unwrap().is_empty());
    }

    #[test]
    fn test_assessment_is_unique_per_job_and_skill() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let job_id = db.insert_job(&new_job("https://boards.example.com/8", None), now).unwrap();

        db.save_assessment(job_id, " Kafka ", true, Some(2), now).unwrap();
        let updated = db.save_assessment(job_id, "kafka", true, Some(4), now).unwrap();
        assert_eq!(updated.skill_name, "kafka");
        assert_eq!(updated.proficiency, Some(4));

        let saved = db.list_assessments(job_id).unwrap();
        assert_eq!(saved.len(), 1);

        db.save_assessment(job_id, "kafka", false, None, now).unwrap();
        let saved = db.list_assessments(job_id).unwrap();
        assert!(!saved[0].have);
        assert_eq!(saved[0].proficiency, None);

        assert!(db.delete_assessment(job_id, "KAFKA").unwrap());
        assert!(db.save_assessment(999, "kafka", true, Some(3), now).is_err());
    }

    #[test]
    fn test_blocked_companies() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        assert!(db.add_blocked_company("", false, "spam", now).is_err());
        assert!(db.add_blocked_company("Acme", false, " ", now).is_err());

        let id = db.add_blocked_company("Acme", false, "spam", now).unwrap();
        db.add_blocked_company("^Crypto", true, "gambling", now).unwrap();
        let blocked = db.list_blocked_companies().unwrap();
        assert_eq!(blocked.len(), 2);
        assert!(blocked.iter().any(|b| b.matches("cryptoland")));

        assert!(db.remove_blocked_company(id).unwrap());
        assert!(!db.remove_blocked_company(id).unwrap());
    }

    #[test]
    fn test_application_lifecycle() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let job_id = db.insert_job(&new_job("https://boards.example.com/9", None), now).unwrap();

        let invalid = NewApplication { company: " ".to_string(), ..Default::default() };
        let err = db.create_application(&invalid, now).unwrap_err().to_string();
        assert!(err.contains("Company can't be blank"));
        assert!(err.contains("Role can't be blank"));

        let app = NewApplication {
            job_posting_id: Some(job_id),
            company: "Acme".to_string(),
            role: "Rails Engineer".to_string(),
            job_description: "Rails".to_string(),
            flags: serde_json::json!({"warnings": []}),
        };
        let app_id = db.create_application(&app, now).unwrap();
        let stored = db.require_application(app_id).unwrap();
        assert_eq!(stored.status, ApplicationStatus::Draft);
        assert!(!stored.pdfs_ready());

        db.update_application_status(app_id, ApplicationStatus::Generated, Some("/tmp/out"), now)
            .unwrap();
        let stored = db.latest_application_for_job(job_id).unwrap().unwrap();
        assert!(stored.pdfs_ready());

        db.update_application_status(app_id, ApplicationStatus::Error, None, now).unwrap();
        let stored = db.require_application(app_id).unwrap();
        assert_eq!(stored.output_path.as_deref(), Some("/tmp/out"));

        let found = db.list_applications(Some("acme"), Some(ApplicationStatus::Error)).unwrap();
        assert_eq!(found.len(), 1);
        assert!(db.list_applications(None, Some(ApplicationStatus::Draft)).unwrap().is_empty());
    }

    #[test]
    fn test_manual_applications() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        assert!(db.add_manual_application("", "Dev", now, None, None, now).is_err());

        let id = db
            .add_manual_application("Acme", "Rails Dev", now, Some("referral"), None, now)
            .unwrap();
        db.update_manual_application(id, Some(ManualStatus::Offer), None, now).unwrap();

        let offers = db.list_manual_applications(Some(ManualStatus::Offer)).unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].notes.as_deref(), Some("referral"));

        assert!(db.delete_manual_application(id).unwrap());
        assert!(db.update_manual_application(id, None, None, now).is_err());
    }

    #[test]
    fn test_ai_usage_rows() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let usage = NewAiUsage {
            model: "gpt-4o-mini".to_string(),
            feature: "cover_letter".to_string(),
            prompt_tokens: 100,
            completion_tokens: 50,
            cached_input_tokens: 0,
            cost_cents: 1,
            meta: serde_json::Value::Null,
        };
        db.insert_ai_usage(&usage, now - Duration::days(40)).unwrap();
        db.insert_ai_usage(&usage, now).unwrap();

        let recent = db.ai_usage_since(now - Duration::days(1)).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].meta, serde_json::json!({}));

        let negative = NewAiUsage { prompt_tokens: -1, ..usage };
        assert!(db.insert_ai_usage(&negative, now).is_err());
    }
}
