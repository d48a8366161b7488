use serde::Serialize;
use std::collections::BTreeSet;

use super::experience::Experience;
use crate::models::JobSkillAssessment;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkillSummary {
    pub verified_count: usize,
    pub included_count: usize,
    pub excluded_count: usize,
    pub total_effective: usize,
}

/// Verified experience skills adjusted by one job's self-assessments.
pub struct EffectiveSkills<'a> {
    experience: &'a Experience,
    assessments: &'a [JobSkillAssessment],
    threshold: u8,
}

impl<'a> EffectiveSkills<'a> {
    pub fn new(experience: &'a Experience, assessments: &'a [JobSkillAssessment], threshold: u8) -> Self {
        Self { experience, assessments, threshold }
    }

    fn included(&self) -> impl Iterator<Item = &JobSkillAssessment> {
        self.assessments
            .iter()
            .filter(|a| a.have && a.proficiency.is_some_and(|p| p >= self.threshold))
    }

    fn excluded(&self) -> impl Iterator<Item = &JobSkillAssessment> {
        self.assessments.iter().filter(|a| !a.have)
    }

    /// Sorted, lowercased skill names usable for this job.
    pub fn effective_skills(&self) -> Vec<String> {
        let mut effective: BTreeSet<String> = self.experience.all_skill_names().into_iter().collect();
        for assessment in self.included() {
            effective.insert(JobSkillAssessment::normalize_name(&assessment.skill_name));
        }
        for assessment in self.excluded() {
            effective.remove(&JobSkillAssessment::normalize_name(&assessment.skill_name));
        }
        effective.into_iter().collect()
    }

    pub fn skill_summary(&self) -> SkillSummary {
        SkillSummary {
            verified_count: self.experience.all_skill_names().len(),
            included_count: self.included().count(),
            excluded_count: self.excluded().count(),
            total_effective: self.effective_skills().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assessment(skill: &str, have: bool, proficiency: Option<u8>) -> JobSkillAssessment {
        JobSkillAssessment {
            id: 0,
            job_posting_id: 1,
            skill_name: skill.to_string(),
            have,
            proficiency,
        }
    }

    #[test]
    fn test_effective_skills_apply_threshold_and_exclusions() {
        let exp = Experience::from_yaml_str("skills: [Ruby, PostgreSQL, Redis]").unwrap();
        let assessments = vec![
            assessment("kafka", true, Some(4)),
            assessment("graphql", true, Some(2)),
            assessment("redis", false, None),
        ];
        let service = EffectiveSkills::new(&exp, &assessments, 3);

        assert_eq!(service.effective_skills(), vec!["kafka", "postgresql", "ruby"]);
        assert_eq!(
            service.skill_summary(),
            SkillSummary { verified_count: 3, included_count: 1, excluded_count: 1, total_effective: 3 }
        );
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let exp = Experience::default();
        let assessments = vec![assessment("graphql", true, Some(2))];
        assert_eq!(EffectiveSkills::new(&exp, &assessments, 2).effective_skills(), vec!["graphql"]);
        assert!(EffectiveSkills::new(&exp, &assessments, 3).effective_skills().is_empty());
    }
}
