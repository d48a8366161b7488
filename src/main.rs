mod ai_cost;
mod config;
mod db;
mod error;
mod fetch_service;
mod fetchers;
mod filter;
mod html;
mod jd;
mod jd_parser;
mod jobs;
mod models;
mod profile;
mod ranker;
mod resume;
mod rules;
mod skills;
mod sources;
mod text;
mod validator;
mod writers;

use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use std::io::{self, Read};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ai_cost::Stats;
use config::AppConfig;
use db::{Database, JobQuery};
use fetch_service::JobFetchService;
use jd::extractor::{ExtractedSkill, SkillExtractor};
use jd::role::{RoleAnalyzer, SkillCategories};
use jd::summarizer::{JdSummary, Summarizer};
use jd::AiContext;
use jobs::RetryPolicy;
use models::{
    Application, ApplicationStatus, JobPosting, JobStatus, ManualStatus, NewApplication, NewJob, PostingRef,
};
use profile::Profile;
use ranker::JobRanker;
use resume::builder::ResumeBuilder;
use resume::generator::{ApplicationGenerator, GeneratedDocuments};
use rules::engine::RulesEngine;
use rules::loader::FilterSettings;
use rules::scanner::{RulesScanner, ScanResult};
use rules::writer::SafeRulesWriter;
use rules::Rules;
use skills::detector::SkillDetector;
use skills::effective::EffectiveSkills;
use skills::experience::Experience;
use text::truncate;
use validator::YamlValidator;

#[derive(Parser)]
#[command(name = "jobwizard")]
#[command(about = "Job application assistant - fetch, filter, and apply with tailored documents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database and write starter config files
    Init {
        /// Only create the database, leave the config dir alone
        #[arg(long)]
        db_only: bool,
    },

    /// Overview of jobs, applications and AI spend
    Dashboard,

    /// Fetch jobs from every active source in sources.yml
    Fetch {
        /// Print the full results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-score jobs against the current rules
    Score {
        /// Rescore every job, not just suggested ones
        #[arg(long)]
        all: bool,
    },

    /// Scan a job description for rule flags and skill coverage
    Scan {
        #[command(flatten)]
        input: JdInput,
    },

    /// Preview what an application would look like, without saving anything
    Prepare {
        #[command(flatten)]
        input: JdInput,

        /// Company name (parsed from the description when omitted)
        #[arg(short, long)]
        company: Option<String>,

        /// Role title (parsed from the description when omitted)
        #[arg(short, long)]
        role: Option<String>,
    },

    /// Create an application from a job description and generate its documents
    Apply {
        #[command(flatten)]
        input: JdInput,

        /// Company name (parsed from the description when omitted)
        #[arg(short, long)]
        company: Option<String>,

        /// Role title (parsed from the description when omitted)
        #[arg(short, long)]
        role: Option<String>,

        /// Comma-separated skills the documents may mention
        #[arg(short, long)]
        skills: Option<String>,

        /// Generate even when blocking flags were found
        #[arg(long)]
        force: bool,
    },

    /// Manage job postings
    Jobs {
        #[command(subcommand)]
        command: JobCommands,
    },

    /// Manage generated applications
    Applications {
        #[command(subcommand)]
        command: ApplicationCommands,
    },

    /// Per-job skill assessments
    Skills {
        #[command(subcommand)]
        command: SkillCommands,
    },

    /// Manage blocked companies
    Blocklist {
        #[command(subcommand)]
        command: BlocklistCommands,
    },

    /// Inspect and edit job filters in rules.yml
    Filters {
        #[command(subcommand)]
        command: FilterCommands,
    },

    /// Inspect and validate config files
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },

    /// Track applications submitted outside jobwizard
    Manual {
        #[command(subcommand)]
        command: ManualCommands,
    },

    /// Show AI spend for the current month
    AiUsage {
        /// Print the stats as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Where to read a job description from. Falls back to stdin.
#[derive(clap::Args)]
struct JdInput {
    /// File containing the job description
    #[arg(short, long, conflicts_with = "text")]
    file: Option<PathBuf>,

    /// Job description text
    #[arg(short, long)]
    text: Option<String>,
}

#[derive(Subcommand)]
enum JobCommands {
    /// List jobs, best scores first
    List {
        /// Filter by status (suggested, applied, ignored, exported)
        #[arg(short, long)]
        status: Option<String>,

        /// Search title, company and description
        #[arg(short = 'q', long)]
        search: Option<String>,

        /// Filter by company
        #[arg(short, long)]
        company: Option<String>,

        /// Only remote jobs
        #[arg(long)]
        remote: bool,

        /// Minimum score
        #[arg(long)]
        min_score: Option<f64>,

        /// Only jobs posted in the last N days
        #[arg(short, long)]
        days: Option<i64>,

        /// Maximum number of jobs to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Show job details
    Show {
        /// Job ID
        id: i64,
    },

    /// Add a job posting by hand
    Add {
        #[arg(short, long)]
        company: String,

        #[arg(long)]
        title: String,

        #[arg(short, long)]
        url: Option<String>,

        #[arg(short, long)]
        location: Option<String>,

        #[arg(long)]
        remote: bool,

        #[command(flatten)]
        input: JdInput,

        /// Add even when the rules reject it
        #[arg(long)]
        force: bool,
    },

    /// Mark a job as applied
    Applied { id: i64 },

    /// Hide a job from suggestions
    Ignore { id: i64 },

    /// Mark a job as exported
    Exported { id: i64 },

    /// Generate a tailored resume and cover letter for a job
    Tailor {
        /// Job ID
        id: i64,

        /// Generate again even if documents were already generated today
        #[arg(long)]
        force: bool,
    },

    /// Summarize a job description (AI when ENABLE_AI_ENHANCERS=true)
    Summarize {
        /// Job ID
        id: i64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Extract the skills a job asks for and check them against your experience
    Skills {
        /// Job ID
        id: i64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ApplicationCommands {
    /// List applications
    List {
        /// Search company and role
        #[arg(short = 'q', long)]
        search: Option<String>,

        /// Filter by status (draft, generated, error)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show application details and flags
    Show {
        /// Application ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum SkillCommands {
    /// Record whether you have a skill a job asks for
    Assess {
        /// Job ID
        job_id: i64,

        /// Skill name
        skill: String,

        /// Proficiency from 1 to 5
        #[arg(short, long, conflicts_with = "missing")]
        proficiency: Option<u8>,

        /// You don't have this skill
        #[arg(long)]
        missing: bool,
    },

    /// Remove an assessment
    Clear {
        /// Job ID
        job_id: i64,

        /// Skill name
        skill: String,
    },

    /// Show a job's detected skills and your assessments
    List {
        /// Job ID
        job_id: i64,
    },

    /// Show the skills documents for this job may mention
    Effective {
        /// Job ID
        job_id: i64,
    },
}

#[derive(Subcommand)]
enum BlocklistCommands {
    /// List blocked companies
    List,

    /// Block a company
    Add {
        /// Company name, or a regex with --pattern
        name: String,

        /// Why the company is blocked
        #[arg(short, long)]
        reason: String,

        /// Treat the name as a case-insensitive regex
        #[arg(long)]
        pattern: bool,
    },

    /// Unblock a company
    Remove {
        /// Blocklist entry ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum FilterCommands {
    /// Show include/exclude keywords and blocklists
    Show,

    /// Add an exclude keyword to rules.yml
    ExcludeAdd { keyword: String },

    /// Remove an exclude keyword from rules.yml
    ExcludeRemove { keyword: String },
}

#[derive(Subcommand)]
enum RulesCommands {
    /// Show the loaded rules
    Show,

    /// Validate profile.yml, experience.yml and rules.yml
    Check,
}

#[derive(Subcommand)]
enum ManualCommands {
    /// Record an application
    Add {
        #[arg(short, long)]
        company: String,

        #[arg(short, long)]
        position: String,

        /// Date applied (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        applied_on: Option<String>,

        #[arg(short, long)]
        notes: Option<String>,

        #[arg(short, long)]
        url: Option<String>,
    },

    /// List recorded applications
    List {
        /// Filter by status (submitted, under_review, rejected, accepted, offer)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Update status or notes
    Update {
        id: i64,

        #[arg(short, long)]
        status: Option<String>,

        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Delete a recorded application
    Remove { id: i64 },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env("JOB_WIZARD_LOG"))
        .unwrap_or_else(|_| EnvFilter::new("jobwizard=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn read_jd(input: &JdInput) -> Result<String> {
    let text = match (&input.file, &input.text) {
        (Some(path), _) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, Some(text)) => text.clone(),
        (None, None) => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).context("Failed to read stdin")?;
            buf
        }
    };
    if text.trim().is_empty() {
        return Err(anyhow!("Job description is empty"));
    }
    Ok(text)
}

fn parse_skill_list(raw: Option<&str>) -> Option<Vec<String>> {
    let skills: Vec<String> = raw?
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if skills.is_empty() { None } else { Some(skills) }
}

fn parse_status<T>(raw: Option<&str>) -> Result<Option<T>>
where
    T: std::str::FromStr<Err = anyhow::Error>,
{
    raw.map(str::parse).transpose()
}

fn print_jobs(jobs: &[JobPosting]) {
    println!("{:<6} {:<10} {:>6} {:<32} {:<20} {:<14}", "ID", "STATUS", "SCORE", "TITLE", "COMPANY", "SOURCE");
    println!("{}", "-".repeat(92));
    for job in jobs {
        println!(
            "{:<6} {:<10} {:>6.1} {:<32} {:<20} {:<14}",
            job.id,
            job.status,
            job.score,
            truncate(&job.title, 30),
            truncate(&job.company, 18),
            truncate(job.source.as_deref().unwrap_or("-"), 12)
        );
    }
}

fn print_applications(apps: &[Application]) {
    println!("{:<6} {:<10} {:<24} {:<30} {:<12}", "ID", "STATUS", "COMPANY", "ROLE", "CREATED");
    println!("{}", "-".repeat(86));
    for app in apps {
        println!(
            "{:<6} {:<10} {:<24} {:<30} {:<12}",
            app.id,
            app.status,
            truncate(&app.company, 22),
            truncate(&app.role, 28),
            app.created_at.with_timezone(&Local).format("%Y-%m-%d").to_string()
        );
    }
}

fn print_scan(scan: &ScanResult) {
    if scan.is_clean() {
        println!("No rule flags.");
        return;
    }
    for (label, flags) in [("BLOCKING", &scan.blocking), ("WARNING", &scan.warnings), ("INFO", &scan.info)] {
        for flag in flags {
            let detail = flag.message.as_deref().or(flag.note.as_deref()).unwrap_or("");
            println!("  [{}] {}: {}", label, flag.rule, detail);
        }
    }
    if !scan.unverified_skills.is_empty() {
        let names: Vec<&str> = scan.unverified_skills.iter().map(|s| s.skill.as_str()).collect();
        println!("  Unverified skills: {}", names.join(", "));
    }
    if !scan.not_claimed_skills.is_empty() {
        let names: Vec<&str> = scan.not_claimed_skills.iter().map(|s| s.skill.as_str()).collect();
        println!("  Not claimed: {}", names.join(", "));
    }
}

fn print_skill_analysis(jd: &str, experience: &Experience) {
    let analysis = SkillDetector::new(experience).analyze(jd);
    println!("Skill alignment: {}%", analysis.alignment());
    if !analysis.verified.is_empty() {
        println!("  Verified: {}", analysis.verified.join(", "));
    }
    if !analysis.unverified.is_empty() {
        println!("  Unverified: {}", analysis.unverified.join(", "));
    }
}

/// The AI provider for JD summaries and skill extraction, when enabled and configured.
fn enhancer_provider(config: &AppConfig, model_var: &str) -> Option<Box<dyn writers::ai::AIProvider>> {
    if !config.ai_enhancers {
        return None;
    }
    writers::provider_for(config.ai_writer.as_deref(), model_var)
}

fn print_summary(job: &JobPosting, summary: &JdSummary) {
    println!("Job #{}: {} at {}", job.id, job.title, job.company);
    println!("Role: {}", summary.role);
    println!("Seniority: {}", summary.seniority);
    if let Some(team) = &summary.team {
        println!("Team: {}", team);
    }
    if !summary.stack.is_empty() {
        println!("Stack: {}", summary.stack.join(", "));
    }
    println!("\nResponsibilities:");
    for item in &summary.responsibilities {
        println!("  - {}", item);
    }
    if !summary.notes.is_empty() {
        println!("\nNotes:");
        for note in &summary.notes {
            println!("  - {}", note);
        }
    }
}

fn print_extracted_skills(job: &JobPosting, skills: &[ExtractedSkill], categories: &SkillCategories) {
    println!("Job #{}: {} at {}", job.id, job.title, job.company);
    if skills.is_empty() {
        println!("No skills found.");
    } else {
        println!("\n{:<24} {:>10} {:<10} {:<8}", "Skill", "Confidence", "In profile", "Action");
        println!("{}", "-".repeat(55));
        for skill in skills {
            println!(
                "{:<24} {:>10.2} {:<10} {:<8}",
                truncate(&skill.name, 24),
                skill.confidence,
                if skill.in_profile { "yes" } else { "no" },
                skill.action
            );
        }
    }

    if !categories.verified.is_empty() {
        println!("\nVerified: {}", categories.verified.join(", "));
    }
    if !categories.unverified.is_empty() {
        println!("Unverified: {}", categories.unverified.join(", "));
    }
    if !categories.not_applicable.is_empty() {
        println!("Exposure only: {}", categories.not_applicable.join(", "));
    }
}

fn print_generated(app_id: i64, docs: &GeneratedDocuments) {
    println!("Generated documents for application #{}", app_id);
    println!("  Folder: {}", docs.output_path.display());
    println!("  Resume: {}", docs.resume_path.display());
    println!("  Cover letter: {}", docs.cover_letter_path.display());
    if !docs.unverified_skills.is_empty() {
        println!("  Writer flagged unverified skills: {}", docs.unverified_skills.join(", "));
    }
}

fn scan_flags(rules: &Rules, experience: &Experience, jd: &str) -> Result<(ScanResult, serde_json::Value)> {
    let scan = RulesScanner::new(rules, experience).scan(jd);
    let flags = serde_json::to_value(&scan).context("Failed to serialize scan flags")?;
    Ok((scan, flags))
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let db = Database::open(&config.db_path)?;

    match cli.command {
        Commands::Init { db_only } => {
            db.init()?;
            println!("Database initialized at {}", db.path().display());
            if !db_only {
                let created = config.write_starter_files()?;
                for path in &created {
                    println!("Wrote {}", path.display());
                }
                println!("Config directory: {}", config.config_dir.display());
            }
        }

        Commands::Dashboard => {
            db.ensure_initialized()?;
            println!("Jobs");
            for (status, count) in db.job_status_counts()? {
                println!("  {:<10} {:>5}", status, count);
            }
            println!("  {:<10} {:>5}", "total", db.count_jobs()?);

            let top = db.list_jobs(&JobQuery {
                status: Some(JobStatus::Suggested),
                limit: Some(5),
                ..Default::default()
            })?;
            if !top.is_empty() {
                println!("\nTop suggestions");
                print_jobs(&top);
            }

            let apps = db.list_applications(None, None)?;
            if !apps.is_empty() {
                println!("\nRecent applications");
                print_applications(&apps[..apps.len().min(5)]);
            }

            let manual = db.list_manual_applications(None)?;
            println!("\nManual applications: {}", manual.len());

            let stats = Stats::month_to_date(&db)?;
            println!("AI spend this month: ${:.2} ({} calls)", stats.total_dollars, stats.count);
        }

        Commands::Fetch { json } => {
            db.ensure_initialized()?;
            let rules = Rules::load(&config.rules_path());
            let sources = sources::load_sources(&config.sources_path())?;
            let results = JobFetchService::new(&db, &rules).fetch_all(&sources)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
                return Ok(());
            }

            println!(
                "Fetched {} postings: {} added, {} updated, {} duplicates, {} skipped by status, {} skipped by blocklist",
                results.total,
                results.added,
                results.updated,
                results.duplicates,
                results.skipped_by_status,
                results.skipped_by_blocklist
            );
            if !results.by_source.is_empty() {
                println!("\n{:<24} {:>8} {:>8} {:>8} {:>8} {:>9}", "SOURCE", "CREATED", "UPDATED", "DUPES", "REJECTED", "FILTERED");
                println!("{}", "-".repeat(70));
                for (name, stats) in &results.by_source {
                    println!(
                        "{:<24} {:>8} {:>8} {:>8} {:>8} {:>9}",
                        truncate(name, 22),
                        stats.created,
                        stats.updated,
                        stats.duplicates,
                        stats.rejected,
                        stats.filtered
                    );
                }
            }
            if !results.rejections.is_empty() {
                println!("\nRecent rejections:");
                for rejection in &results.rejections {
                    println!(
                        "  {} - {}: {}",
                        truncate(&rejection.company, 24),
                        truncate(&rejection.title, 36),
                        rejection.reasons.join("; ")
                    );
                }
            }
            if !results.errors.is_empty() {
                println!("\nErrors:");
                for error in &results.errors {
                    println!("  {}", error);
                }
            }
        }

        Commands::Score { all } => {
            db.ensure_initialized()?;
            let rules = Rules::load(&config.rules_path());
            let ranker = JobRanker::from_rules(&rules);
            let jobs = db.list_jobs(&JobQuery {
                status: if all { None } else { Some(JobStatus::Suggested) },
                ..Default::default()
            })?;

            let now = Utc::now();
            let mut changed = 0;
            for job in &jobs {
                let score = ranker.score(&job.title, &job.description, job.location.as_deref());
                if (score - job.score).abs() > f64::EPSILON {
                    db.update_job_score(job.id, score, now)?;
                    changed += 1;
                }
            }
            println!("Rescored {} jobs ({} changed).", jobs.len(), changed);
        }

        Commands::Scan { input } => {
            let jd = read_jd(&input)?;
            let rules = Rules::load(&config.rules_path());
            let experience = Experience::load(&config.experience_path())?;
            print_scan(&RulesScanner::new(&rules, &experience).scan(&jd));
            print_skill_analysis(&jd, &experience);
        }

        Commands::Prepare { input, company, role } => {
            let jd = read_jd(&input)?;
            let parsed = jd_parser::parse(&jd);
            let rules = Rules::load(&config.rules_path());
            let experience = Experience::load(&config.experience_path())?;

            let company = company.or(parsed.company);
            let role = role.or(parsed.role);
            println!("Company: {}", company.as_deref().unwrap_or("(not detected)"));
            println!("Role: {}", role.as_deref().unwrap_or("(not detected)"));
            println!();
            print_scan(&RulesScanner::new(&rules, &experience).scan(&jd));
            print_skill_analysis(&jd, &experience);
            println!("\nNothing saved. Run 'jobwizard apply' to generate documents.");
        }

        Commands::Apply { input, company, role, skills, force } => {
            db.ensure_initialized()?;
            let jd = read_jd(&input)?;
            let parsed = jd_parser::parse(&jd);
            let rules = Rules::load(&config.rules_path());
            let experience = Experience::load(&config.experience_path())?;

            let (scan, flags) = scan_flags(&rules, &experience, &jd)?;
            if scan.has_blocking() && !force {
                print_scan(&scan);
                println!("Blocking flags found. Re-run with --force to generate anyway.");
                return Ok(());
            }

            let app_id = db.create_application(
                &NewApplication {
                    job_posting_id: None,
                    company: company.or(parsed.company).unwrap_or_else(|| "Unknown Company".to_string()),
                    role: role.or(parsed.role).unwrap_or_else(|| "Position".to_string()),
                    job_description: jd,
                    flags,
                },
                Utc::now(),
            )?;
            println!("Created application #{}", app_id);

            let allowed = parse_skill_list(skills.as_deref());
            let writer = writers::writer_for(config.ai_writer.as_deref());
            let generator = ApplicationGenerator::new(&db, &config, writer.as_ref());
            let application = db.require_application(app_id)?;
            let docs = generator.generate(&application, allowed.as_deref())?;
            print_generated(app_id, &docs);
        }

        Commands::Jobs { command } => {
            db.ensure_initialized()?;
            match command {
                JobCommands::List { status, search, company, remote, min_score, days, limit } => {
                    let jobs = db.list_jobs(&JobQuery {
                        status: parse_status(status.as_deref())?,
                        search,
                        company,
                        remote: remote.then_some(true),
                        min_score,
                        posted_within_days: days,
                        limit: Some(limit),
                    })?;
                    if jobs.is_empty() {
                        println!("No jobs found.");
                    } else {
                        print_jobs(&jobs);
                    }
                }

                JobCommands::Show { id } => match db.get_job(id)? {
                    Some(job) => {
                        println!("Job #{}", job.id);
                        println!("Title: {}", job.title);
                        println!("Company: {}", job.company);
                        println!("Status: {}", job.status);
                        println!("Score: {:.1}", job.score);
                        if let Some(location) = &job.location {
                            println!("Location: {}{}", location, if job.remote { " (remote)" } else { "" });
                        } else if job.remote {
                            println!("Location: remote");
                        }
                        if !job.url.is_empty() {
                            println!("URL: {}", job.url);
                        }
                        if let Some(source) = &job.source {
                            println!("Source: {}", source);
                        }
                        if let Some(posted) = job.posted_at {
                            println!("Posted: {}", posted.with_timezone(&Local).format("%Y-%m-%d"));
                        }
                        if let Some(app) = db.latest_application_for_job(job.id)? {
                            println!("Latest application: #{} ({})", app.id, app.status);
                        }
                        let assessments = db.list_assessments(job.id)?;
                        if !assessments.is_empty() {
                            println!("Skill assessments: {}", assessments.len());
                        }

                        let analyzer = RoleAnalyzer::new(&job.description);
                        let summary = analyzer.role_summary();
                        if !summary.is_empty() {
                            println!("\n--- Role Summary ---");
                            for bullet in &summary {
                                println!("  - {}", bullet);
                            }
                        }
                        let highlights = analyzer.highlight_suggestions();
                        if !highlights.is_empty() {
                            println!("Highlight: {}", highlights.join(", "));
                        }
                        println!("\n--- Description ---\n{}", job.description);
                    }
                    None => {
                        println!("Job #{} not found.", id);
                    }
                },

                JobCommands::Add { company, title, url, location, remote, input, force } => {
                    let description = read_jd(&input)?;
                    let rules = Rules::load(&config.rules_path());
                    let mut job = NewJob {
                        company,
                        title,
                        description,
                        location,
                        remote,
                        url: url.unwrap_or_default(),
                        source: Some("manual".to_string()),
                        ..Default::default()
                    };

                    let settings = FilterSettings::from_rules(&rules, db.list_blocked_companies()?);
                    let mut engine = RulesEngine::new(settings);
                    if let Some(reasons) = engine.should_reject(PostingRef::from(&job)) {
                        if !force {
                            println!("Rejected by rules:");
                            for reason in &reasons {
                                println!("  - {}", reason);
                            }
                            println!("Re-run with --force to add it anyway.");
                            return Ok(());
                        }
                    }

                    job.score = JobRanker::from_rules(&rules).score(&job.title, &job.description, job.location.as_deref());
                    let id = db.insert_job(&job, Utc::now())?;
                    println!("Added job #{} (score {:.1})", id, job.score);
                }

                JobCommands::Applied { id } => {
                    db.set_job_status(id, JobStatus::Applied, Utc::now())?;
                    println!("Marked job #{} as applied.", id);
                }

                JobCommands::Ignore { id } => {
                    db.set_job_status(id, JobStatus::Ignored, Utc::now())?;
                    println!("Ignored job #{}.", id);
                }

                JobCommands::Exported { id } => {
                    db.set_job_status(id, JobStatus::Exported, Utc::now())?;
                    println!("Marked job #{} as exported.", id);
                }

                JobCommands::Tailor { id, force } => {
                    let job = db.require_job(id)?;
                    if job.generated_today() && !force {
                        println!("Documents for job #{} were already generated today. Use --force to regenerate.", id);
                        return Ok(());
                    }

                    let rules = Rules::load(&config.rules_path());
                    let experience = Experience::load(&config.experience_path())?;
                    let (_, flags) = scan_flags(&rules, &experience, &job.description)?;
                    let app_id = db.create_application(
                        &NewApplication {
                            job_posting_id: Some(job.id),
                            company: job.company.clone(),
                            role: job.title.clone(),
                            job_description: job.description.clone(),
                            flags,
                        },
                        Utc::now(),
                    )?;

                    let assessments = db.list_assessments(job.id)?;
                    let allowed = if assessments.is_empty() {
                        None
                    } else {
                        Some(EffectiveSkills::new(&experience, &assessments, config.proficiency_threshold).effective_skills())
                    };

                    let writer = writers::writer_for(config.ai_writer.as_deref());
                    let generator = ApplicationGenerator::new(&db, &config, writer.as_ref());
                    let docs = jobs::generate_with_retry(
                        &db,
                        &generator,
                        RetryPolicy::from_config(&config),
                        app_id,
                        allowed.as_deref(),
                    )?;
                    db.set_job_status(job.id, JobStatus::Exported, Utc::now())?;
                    print_generated(app_id, &docs);
                }

                JobCommands::Summarize { id, json } => {
                    let job = db.require_job(id)?;
                    let provider = enhancer_provider(&config, "AI_SUMMARY_MODEL");
                    let summarizer = Summarizer::new(provider.as_deref().map(|p| AiContext::new(p, &db)));
                    let summary = summarizer.summarize(&job.description, Some(job.id));
                    if json {
                        println!("{}", serde_json::to_string_pretty(&summary)?);
                    } else {
                        print_summary(&job, &summary);
                    }
                }

                JobCommands::Skills { id, json } => {
                    let job = db.require_job(id)?;
                    let experience = Experience::load(&config.experience_path())?;
                    let provider = enhancer_provider(&config, "AI_SKILLS_MODEL");
                    let extractor =
                        SkillExtractor::new(&experience, provider.as_deref().map(|p| AiContext::new(p, &db)));
                    let skills = extractor.extract(&job.description, Some(job.id));
                    let categories = RoleAnalyzer::new(&job.description).skill_categories(&experience);
                    if json {
                        let report = serde_json::json!({ "skills": skills, "categories": categories });
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    } else {
                        print_extracted_skills(&job, &skills, &categories);
                    }
                }
            }
        }

        Commands::Applications { command } => {
            db.ensure_initialized()?;
            match command {
                ApplicationCommands::List { search, status } => {
                    let status: Option<ApplicationStatus> = parse_status(status.as_deref())?;
                    let apps = db.list_applications(search.as_deref(), status)?;
                    if apps.is_empty() {
                        println!("No applications found.");
                    } else {
                        print_applications(&apps);
                    }
                }

                ApplicationCommands::Show { id } => match db.get_application(id)? {
                    Some(app) => {
                        println!("Application #{}", app.id);
                        println!("Company: {}", app.company);
                        println!("Role: {}", app.role);
                        println!("Status: {}", app.status);
                        if let Some(job_id) = app.job_posting_id {
                            println!("Job: #{}", job_id);
                        }
                        if let Some(path) = &app.output_path {
                            println!("Output: {}", path);
                        }
                        println!("Documents ready: {}", if app.pdfs_ready() { "yes" } else { "no" });

                        let scan: ScanResult = serde_json::from_value(app.flags.clone()).unwrap_or_default();
                        println!("\nFlags:");
                        print_scan(&scan);

                        let experience = Experience::load(&config.experience_path());
                        let profile = Profile::load(&config.profile_path());
                        if let (Ok(profile), Ok(experience)) = (profile, experience) {
                            let builder = ResumeBuilder::new(&app.job_description, &profile, &experience);
                            if !builder.not_claimed_skills().is_empty() {
                                println!("\nMentioned in the job but not in your experience:");
                                println!("  {}", builder.not_claimed_skills().join(", "));
                            }
                        }
                    }
                    None => {
                        println!("Application #{} not found.", id);
                    }
                },
            }
        }

        Commands::Skills { command } => {
            db.ensure_initialized()?;
            match command {
                SkillCommands::Assess { job_id, skill, proficiency, missing } => {
                    let assessment = db.save_assessment(job_id, &skill, !missing, proficiency, Utc::now())?;
                    match assessment.proficiency {
                        Some(p) => println!("Job #{}: have '{}' at {}/5.", job_id, assessment.skill_name, p),
                        None => println!("Job #{}: don't have '{}'.", job_id, assessment.skill_name),
                    }
                }

                SkillCommands::Clear { job_id, skill } => {
                    if db.delete_assessment(job_id, &skill)? {
                        println!("Removed assessment of '{}' for job #{}.", skill, job_id);
                    } else {
                        println!("No assessment of '{}' for job #{}.", skill, job_id);
                    }
                }

                SkillCommands::List { job_id } => {
                    let job = db.require_job(job_id)?;
                    let experience = Experience::load(&config.experience_path())?;
                    println!("Job #{}: {} at {}", job.id, job.title, job.company);
                    print_skill_analysis(&job.description, &experience);

                    let assessments = db.list_assessments(job_id)?;
                    if assessments.is_empty() {
                        println!("\nNo assessments yet.");
                    } else {
                        println!("\n{:<30} {:<6} {:>11}", "SKILL", "HAVE", "PROFICIENCY");
                        println!("{}", "-".repeat(49));
                        for a in assessments {
                            println!(
                                "{:<30} {:<6} {:>11}",
                                truncate(&a.skill_name, 28),
                                if a.have { "yes" } else { "no" },
                                a.proficiency.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string())
                            );
                        }
                    }
                }

                SkillCommands::Effective { job_id } => {
                    db.require_job(job_id)?;
                    let experience = Experience::load(&config.experience_path())?;
                    let assessments = db.list_assessments(job_id)?;
                    let effective = EffectiveSkills::new(&experience, &assessments, config.proficiency_threshold);
                    let summary = effective.skill_summary();
                    println!(
                        "{} verified, {} added by assessment (threshold {}), {} excluded, {} effective",
                        summary.verified_count,
                        summary.included_count,
                        config.proficiency_threshold,
                        summary.excluded_count,
                        summary.total_effective
                    );
                    for skill in effective.effective_skills() {
                        println!("  {}", skill);
                    }
                }
            }
        }

        Commands::Blocklist { command } => {
            db.ensure_initialized()?;
            match command {
                BlocklistCommands::List => {
                    let blocked = db.list_blocked_companies()?;
                    if blocked.is_empty() {
                        println!("No blocked companies.");
                    } else {
                        println!("{:<6} {:<30} {:<8} {:<40}", "ID", "NAME", "PATTERN", "REASON");
                        println!("{}", "-".repeat(86));
                        for company in blocked {
                            println!(
                                "{:<6} {:<30} {:<8} {:<40}",
                                company.id,
                                truncate(&company.name, 28),
                                if company.pattern { "yes" } else { "no" },
                                truncate(&company.reason, 38)
                            );
                        }
                    }
                }

                BlocklistCommands::Add { name, reason, pattern } => {
                    let id = db.add_blocked_company(&name, pattern, &reason, Utc::now())?;
                    println!("Blocked '{}' (#{}).", name, id);
                }

                BlocklistCommands::Remove { id } => {
                    if db.remove_blocked_company(id)? {
                        println!("Removed blocklist entry #{}.", id);
                    } else {
                        println!("Blocklist entry #{} not found.", id);
                    }
                }
            }
        }

        Commands::Filters { command } => {
            let path = config.rules_path();
            match command {
                FilterCommands::Show => {
                    let rules = Rules::load(&path);
                    println!("Rules file: {}", path.display());
                    println!("Include: {}", rules.job_filters.include_keywords.join(", "));
                    println!("Exclude: {}", rules.job_filters.exclude_keywords.join(", "));
                    println!("Require include match: {}", rules.require_include_match());

                    db.ensure_initialized()?;
                    let settings = FilterSettings::from_rules(&rules, db.list_blocked_companies()?);
                    let blocked = settings.blocked_company_names();
                    if !blocked.is_empty() {
                        println!("Blocked companies: {}", blocked.join(", "));
                    }
                    if settings.require_no_security_clearance {
                        println!("Rejecting postings that require a security clearance.");
                    }
                    let backups = SafeRulesWriter::new(&path).backups()?;
                    if !backups.is_empty() {
                        println!("Backups: {}", backups.len());
                    }
                }

                FilterCommands::ExcludeAdd { keyword } => {
                    let mut rules = Rules::load(&path);
                    if SafeRulesWriter::new(&path).add_exclude_keyword(&keyword)? {
                        rules.reload();
                        println!("Added exclude keyword '{}'.", keyword.trim());
                        println!("Exclude: {}", rules.job_filters.exclude_keywords.join(", "));
                    } else {
                        println!("'{}' is already excluded.", keyword.trim());
                    }
                }

                FilterCommands::ExcludeRemove { keyword } => {
                    let mut rules = Rules::load(&path);
                    if SafeRulesWriter::new(&path).remove_exclude_keyword(&keyword)? {
                        rules.reload();
                        println!("Removed exclude keyword '{}'.", keyword.trim());
                        println!("Exclude: {}", rules.job_filters.exclude_keywords.join(", "));
                    } else {
                        println!("'{}' is not an exclude keyword.", keyword.trim());
                    }
                }
            }
        }

        Commands::Rules { command } => match command {
            RulesCommands::Show => {
                let rules = Rules::load(&config.rules_path());
                println!("Rules file: {}", config.rules_path().display());
                println!("Minimum keep score: {}", rules.min_keep_score());
                if !rules.scoring.boosts.is_empty() {
                    println!("\nBoosts:");
                    for (keyword, weight) in &rules.scoring.boosts {
                        println!("  {:<24} +{}", keyword, weight);
                    }
                }
                if !rules.scoring.penalties.is_empty() {
                    println!("\nPenalties:");
                    for (keyword, weight) in &rules.scoring.penalties {
                        println!("  {:<24} -{}", keyword, weight);
                    }
                }
                for (label, section) in [("Blocking", &rules.blocking), ("Warnings", &rules.warnings), ("Info", &rules.info)] {
                    if !section.is_empty() {
                        let names: Vec<&str> = section.keys().map(String::as_str).collect();
                        println!("\n{} rules: {}", label, names.join(", "));
                    }
                }
            }

            RulesCommands::Check => {
                YamlValidator::new(&config.config_dir).validate_all()?;
                println!("All config files in {} are valid.", config.config_dir.display());
            }
        },

        Commands::Manual { command } => {
            db.ensure_initialized()?;
            match command {
                ManualCommands::Add { company, position, applied_on, notes, url } => {
                    let applied_at = match applied_on {
                        Some(date) => NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                            .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", date))?
                            .and_time(NaiveTime::MIN)
                            .and_utc(),
                        None => Utc::now(),
                    };
                    let id = db.add_manual_application(
                        &company,
                        &position,
                        applied_at,
                        notes.as_deref(),
                        url.as_deref(),
                        Utc::now(),
                    )?;
                    println!("Recorded manual application #{}", id);
                }

                ManualCommands::List { status } => {
                    let status: Option<ManualStatus> = parse_status(status.as_deref())?;
                    let apps = db.list_manual_applications(status)?;
                    if apps.is_empty() {
                        println!("No manual applications found.");
                    } else {
                        println!("{:<6} {:<13} {:<24} {:<28} {:<12}", "ID", "STATUS", "COMPANY", "POSITION", "APPLIED");
                        println!("{}", "-".repeat(85));
                        for app in apps {
                            println!(
                                "{:<6} {:<13} {:<24} {:<28} {:<12}",
                                app.id,
                                app.status,
                                truncate(&app.company, 22),
                                truncate(&app.position, 26),
                                app.applied_at.with_timezone(&Local).format("%Y-%m-%d").to_string()
                            );
                        }
                    }
                }

                ManualCommands::Update { id, status, notes } => {
                    let status: Option<ManualStatus> = parse_status(status.as_deref())?;
                    db.update_manual_application(id, status, notes.as_deref(), Utc::now())?;
                    println!("Updated manual application #{}", id);
                }

                ManualCommands::Remove { id } => {
                    if db.delete_manual_application(id)? {
                        println!("Removed manual application #{}", id);
                    } else {
                        println!("Manual application #{} not found.", id);
                    }
                }
            }
        }

        Commands::AiUsage { json } => {
            db.ensure_initialized()?;
            let stats = Stats::month_to_date(&db)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
                return Ok(());
            }

            println!("AI spend this month: ${:.2} across {} calls", stats.total_dollars, stats.count);
            for (feature, cents) in &stats.by_feature {
                println!("  {:<20} ${:.2}", feature, *cents as f64 / 100.0);
            }
            if !stats.recent.is_empty() {
                println!("\n{:<17} {:<28} {:<14} {:>8} {:>8}", "WHEN", "MODEL", "FEATURE", "TOKENS", "COST");
                println!("{}", "-".repeat(79));
                for usage in &stats.recent {
                    println!(
                        "{:<17} {:<28} {:<14} {:>8} {:>8}",
                        usage.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
                        truncate(&usage.model, 26),
                        truncate(&usage.feature, 12),
                        usage.total_tokens(),
                        format!("${:.2}", usage.cost_dollars())
                    );
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skill_list() {
        assert_eq!(
            parse_skill_list(Some("Rails, PostgreSQL ,, Kafka")),
            Some(vec!["Rails".to_string(), "PostgreSQL".to_string(), "Kafka".to_string()])
        );
        assert_eq!(parse_skill_list(Some(" , ")), None);
        assert_eq!(parse_skill_list(None), None);
    }

    #[test]
    fn test_parse_status() {
        let status: Option<JobStatus> = parse_status(Some("applied")).unwrap();
        assert_eq!(status, Some(JobStatus::Applied));
        let none: Option<ManualStatus> = parse_status(None).unwrap();
        assert!(none.is_none());
        assert!(parse_status::<ApplicationStatus>(Some("shipped")).is_err());
    }

    #[test]
    fn test_read_jd_from_text_and_file() {
        let input = JdInput { file: None, text: Some("Rails engineer".to_string()) };
        assert_eq!(read_jd(&input).unwrap(), "Rails engineer");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jd.txt");
        std::fs::write(&path, "From a file").unwrap();
        let input = JdInput { file: Some(path), text: None };
        assert_eq!(read_jd(&input).unwrap(), "From a file");

        let blank = JdInput { file: None, text: Some("   ".to_string()) };
        assert!(read_jd(&blank).is_err());
    }

    #[test]
    fn test_cli_parses_nested_commands() {
        let cli = Cli::try_parse_from(["jobwizard", "jobs", "tailor", "42", "--force"]).unwrap();
        assert!(matches!(cli.command, Commands::Jobs { command: JobCommands::Tailor { id: 42, force: true } }));

        let cli = Cli::try_parse_from(["jobwizard", "jobs", "summarize", "5", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::Jobs { command: JobCommands::Summarize { id: 5, json: true } }));

        let cli = Cli::try_parse_from(["jobwizard", "jobs", "skills", "5"]).unwrap();
        assert!(matches!(cli.command, Commands::Jobs { command: JobCommands::Skills { id: 5, json: false } }));

        let cli = Cli::try_parse_from(["jobwizard", "skills", "assess", "7", "Kafka", "--missing"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Skills { command: SkillCommands::Assess { job_id: 7, missing: true, proficiency: None, .. } }
        ));

        assert!(Cli::try_parse_from(["jobwizard", "skills", "assess", "7", "Go", "--missing", "-p", "3"]).is_err());
    }
}
