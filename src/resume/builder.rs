use anyhow::Result;

use super::document::{Block, Document};
use crate::jd_parser;
use crate::profile::Profile;
use crate::rules::scanner::extract_tech_terms;
use crate::skills::experience::{Experience, Skill, SkillLevel, SkillsByLevel};
use crate::writers::{self, CoverLetter, CoverLetterRequest, Writer};

const FALLBACK_COMPANY: &str = "the company";
const FALLBACK_ROLE: &str = "this position";
const EXPERT_PHRASES: usize = 5;
const MAX_CONTEXT_LEN: usize = 120;

/// Assembles the resume and cover letter for one job description.
pub struct ResumeBuilder<'a> {
    job_description: &'a str,
    profile: &'a Profile,
    experience: &'a Experience,
    allowed_skills: Option<&'a [String]>,
    company: String,
    role: String,
    claimed_skills: Vec<String>,
    not_claimed_skills: Vec<String>,
}

impl<'a> ResumeBuilder<'a> {
    pub fn new(job_description: &'a str, profile: &'a Profile, experience: &'a Experience) -> Self {
        let parsed = jd_parser::parse(job_description);
        let (claimed_skills, not_claimed_skills) = split_skills(job_description, experience);

        Self {
            job_description,
            profile,
            experience,
            allowed_skills: None,
            company: parsed.company.unwrap_or_else(|| FALLBACK_COMPANY.to_string()),
            role: parsed.role.unwrap_or_else(|| FALLBACK_ROLE.to_string()),
            claimed_skills,
            not_claimed_skills,
        }
    }

    /// Limits the skills section to these names. An empty list means no limit.
    pub fn allowed_skills(mut self, skills: Option<&'a [String]>) -> Self {
        self.allowed_skills = skills.filter(|s| !s.is_empty());
        self
    }

    /// Overrides the company and role guessed from the job description.
    pub fn target(mut self, company: &str, role: &str) -> Self {
        if !company.trim().is_empty() {
            self.company = company.trim().to_string();
        }
        if !role.trim().is_empty() {
            self.role = role.trim().to_string();
        }
        self
    }

    pub fn company(&self) -> &str {
        &self.company
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    /// Tech terms from the job description that the experience backs.
    pub fn claimed_skills(&self) -> &[String] {
        &self.claimed_skills
    }

    pub fn not_claimed_skills(&self) -> &[String] {
        &self.not_claimed_skills
    }

    pub fn build_resume(&self) -> Document {
        let mut doc = Document::new();
        doc.push(Block::Title(self.profile.name.trim().to_string()));
        let contact = self.profile.contact_line();
        if !contact.is_empty() {
            doc.push(Block::Contact(contact));
        }

        doc.push(Block::Heading("PROFESSIONAL SUMMARY".into()));
        doc.push(Block::Paragraph(self.profile.summary.trim().to_string()));

        self.add_skills(&mut doc);
        self.add_experience(&mut doc);
        self.add_projects(&mut doc);
        self.add_education(&mut doc);
        doc
    }

    pub fn build_cover_letter(&self, writer: &dyn Writer) -> Result<(Document, CoverLetter)> {
        let request = CoverLetterRequest {
            company: &self.company,
            role: &self.role,
            jd_text: self.job_description,
            profile: self.profile,
            experience: self.experience,
            allowed_skills: self.allowed_skills,
        };
        let letter = writers::write_cover_letter(writer, &request)?;
        Ok((letter_document(&letter.text), letter))
    }

    fn add_skills(&self, doc: &mut Document) {
        let levels = self.filtered_skills();
        if levels.expert.is_empty() && levels.intermediate.is_empty() && levels.basic.is_empty() {
            return;
        }
        doc.push(Block::Heading("TECHNICAL SKILLS".into()));

        if !levels.expert.is_empty() {
            let phrases: Vec<String> = levels.expert.iter().take(EXPERT_PHRASES).map(skill_phrase).collect();
            doc.push(Block::Paragraph(phrases.join("; ")));
        }
        if !levels.intermediate.is_empty() {
            doc.push(Block::Paragraph(format!("Working proficiency: {}", names(&levels.intermediate))));
        }
        if !levels.basic.is_empty() {
            doc.push(Block::Paragraph(format!("Also familiar with: {}", names(&levels.basic))));
        }
    }

    fn filtered_skills(&self) -> SkillsByLevel {
        let mut levels = self.experience.skills_by_level();
        if let Some(allowed) = self.allowed_skills {
            let keep = |skill: &Skill| writers::is_allowed(&skill.name, Some(allowed));
            levels.expert.retain(keep);
            levels.intermediate.retain(keep);
            levels.basic.retain(keep);
        }
        levels
    }

    fn add_experience(&self, doc: &mut Document) {
        if self.experience.positions.is_empty() {
            return;
        }
        doc.push(Block::Heading("PROFESSIONAL EXPERIENCE".into()));
        for position in &self.experience.positions {
            doc.push(Block::Subheading(position.company.clone()));
            doc.push(Block::Detail(format!("{} | {}", position.title, position.dates)));
            for achievement in &position.achievements {
                doc.push(Block::Bullet(achievement.clone()));
            }
        }
    }

    fn add_projects(&self, doc: &mut Document) {
        if self.experience.projects.is_empty() {
            return;
        }
        doc.push(Block::Heading("PROJECTS".into()));
        for project in &self.experience.projects {
            doc.push(Block::Subheading(project.name.clone()));
            if !project.technologies.is_empty() {
                doc.push(Block::Detail(project.technologies.join(", ")));
            }
            if let Some(description) = project.description.as_deref().filter(|d| !d.trim().is_empty()) {
                doc.push(Block::Paragraph(description.trim().to_string()));
            }
            if let Some(url) = project.url.as_deref().filter(|u| !u.trim().is_empty()) {
                doc.push(Block::Paragraph(url.trim().to_string()));
            }
        }
    }

    fn add_education(&self, doc: &mut Document) {
        if self.profile.education.is_empty() {
            return;
        }
        doc.push(Block::Heading("EDUCATION".into()));
        for edu in &self.profile.education {
            doc.push(Block::Subheading(edu.degree.clone()));
            let detail = match edu.year.as_deref().filter(|y| !y.trim().is_empty()) {
                Some(year) => format!("{} | {}", edu.institution, year),
                None => edu.institution.clone(),
            };
            doc.push(Block::Detail(detail));
            if let Some(honors) = edu.honors.as_deref().filter(|h| !h.trim().is_empty()) {
                doc.push(Block::Paragraph(honors.trim().to_string()));
            }
        }
    }
}

fn split_skills(job_description: &str, experience: &Experience) -> (Vec<String>, Vec<String>) {
    extract_tech_terms(job_description).into_iter().partition(|term| {
        experience.has_skill(&Experience::normalize_skill_name(term)) || experience.has_skill_with_alias(term)
    })
}

fn skill_phrase(skill: &Skill) -> String {
    let base = match skill.level {
        SkillLevel::Expert => format!("Deep experience with {}", skill.name),
        SkillLevel::Intermediate => format!("Working proficiency with {}", skill.name),
        SkillLevel::Basic => format!("Familiar with {}", skill.name),
    };
    match skill.context.as_deref().map(str::trim) {
        Some(context) if !context.is_empty() && context.chars().count() < MAX_CONTEXT_LEN => {
            format!("{} ({})", base, context)
        }
        _ => base,
    }
}

fn names(skills: &[Skill]) -> String {
    skills.iter().map(|s| s.name.as_str()).collect::<Vec<_>>().join(", ")
}

/// Blank-line separated paragraphs; lines starting with a bullet marker become bullets.
fn letter_document(text: &str) -> Document {
    let mut doc = Document::new();
    for chunk in text.split("\n\n").map(str::trim).filter(|c| !c.is_empty()) {
        let mut prose: Vec<&str> = Vec::new();
        for line in chunk.lines().map(str::trim) {
            match line.strip_prefix("• ").or_else(|| line.strip_prefix("- ")) {
                Some(item) => {
                    if !prose.is_empty() {
                        doc.push(Block::Paragraph(prose.join("\n")));
                        prose.clear();
                    }
                    doc.push(Block::Bullet(item.to_string()));
                }
                None => prose.push(line),
            }
        }
        if !prose.is_empty() {
            doc.push(Block::Paragraph(prose.join("\n")));
        }
    }
    doc
}
