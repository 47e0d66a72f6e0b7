pub mod evaluate;
pub mod index;
pub mod ledger;
pub mod model;
pub mod placement;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use evaluate::{Breakdown, EvalContext, Evaluation, Evaluator};
pub use index::CatalogIndex;
pub use ledger::{ConflictEntry, GlobalAllocationLedger, ResourceRef};
pub use model::Chromosome;
pub use types::{
    Catalog, Division, DivisionId, EngineConfig, Gene, PartitionId, Room, SlotId, SolveParams,
    SolveStatus, Subject, SubjectId, SubjectKind, Teacher, TeacherId, TimeSlot,
};

/// The scheduling unit optimized independently: typically one division, or a
/// whole year when the caller groups divisions.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartitionScope {
    pub id: PartitionId,
    pub divisions: Vec<DivisionId>,
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("partition {partition} has no {what}")]
    Insufficient {
        partition: PartitionId,
        what: &'static str,
    },
    #[error("invalid catalog: {0}")]
    Msg(String),
}

/// Rejects inputs no search could recover from: empty resource pools are
/// fatal for the partition, structural inconsistencies are collected and
/// reported together.
pub fn validate(
    scope: &PartitionScope,
    catalog: &Catalog,
    config: &EngineConfig,
) -> Result<(), ValidationError> {
    let index = CatalogIndex::new(catalog, config);
    let subjects = index.subjects_in(&scope.divisions);

    if subjects.is_empty() {
        return Err(ValidationError::Insufficient {
            partition: scope.id.clone(),
            what: "subjects",
        });
    }
    if index.teachable_slots().is_empty() {
        return Err(ValidationError::Insufficient {
            partition: scope.id.clone(),
            what: "non-recess timeslots",
        });
    }
    if catalog.rooms.is_empty() {
        return Err(ValidationError::Insufficient {
            partition: scope.id.clone(),
            what: "rooms",
        });
    }
    let years: HashSet<u8> = subjects.iter().map(|s| s.year).collect();
    for year in &years {
        if index.teacher_pool(*year).is_empty() {
            return Err(ValidationError::Insufficient {
                partition: scope.id.clone(),
                what: "teachers",
            });
        }
    }

    let mut errors: Vec<String> = Vec::new();

    fn chk_unique<'a>(
        name: &str,
        ids: impl Iterator<Item = &'a str>,
        errors: &mut Vec<String>,
    ) {
        let mut seen = HashSet::new();
        for id in ids {
            if !seen.insert(id) {
                errors.push(format!("duplicate {name} id: {id}"));
            }
        }
    }
    chk_unique(
        "teacher",
        catalog.teachers.iter().map(|x| x.id.0.as_str()),
        &mut errors,
    );
    chk_unique(
        "subject",
        catalog.subjects.iter().map(|x| x.id.0.as_str()),
        &mut errors,
    );
    chk_unique(
        "room",
        catalog.rooms.iter().map(|x| x.id.0.as_str()),
        &mut errors,
    );
    chk_unique(
        "timeslot",
        catalog.timeslots.iter().map(|x| x.id.0.as_str()),
        &mut errors,
    );
    chk_unique(
        "division",
        catalog.divisions.iter().map(|x| x.id.0.as_str()),
        &mut errors,
    );

    for slot in &catalog.timeslots {
        if slot.start_min >= slot.end_min {
            errors.push(format!("timeslot {} has non-positive duration", slot.id));
        }
    }

    for teacher in &catalog.teachers {
        if teacher.min_sessions_per_week > teacher.max_sessions_per_week {
            errors.push(format!(
                "teacher {} has min_sessions_per_week above max",
                teacher.id
            ));
        }
    }

    for subject in &subjects {
        let Some(division) = index.division(&subject.division) else {
            errors.push(format!(
                "subject {} references missing division {}",
                subject.id, subject.division
            ));
            continue;
        };
        if let Some(batch) = subject.batch {
            let count = config.batch_count_for(division);
            if batch.0 >= count {
                errors.push(format!(
                    "subject {} targets batch {} but division {} has {} batches",
                    subject.id, batch, division.id, count
                ));
            }
        }
        if subject.sessions_per_week == 0 {
            errors.push(format!("subject {} has sessions_per_week=0", subject.id));
        }
        if let Some(block) = subject.kind.block_len() {
            if subject.sessions_per_week != block {
                errors.push(format!(
                    "subject {} is a {:?} and must have {} sessions, not {}",
                    subject.id, subject.kind, block, subject.sessions_per_week
                ));
            }
        }
        if placement::eligible_rooms(&index, subject).is_empty() {
            errors.push(format!(
                "subject {} is unschedulable: no suitable room in the year pool",
                subject.id
            ));
        }
    }

    if config.project_half_days_per_year > 0 || config.remedial_lectures_per_year > 0 {
        for year in &years {
            let projects = subjects
                .iter()
                .filter(|s| s.year == *year && matches!(s.kind, SubjectKind::Project))
                .count() as u32;
            if config.project_half_days_per_year > 0 && projects > config.project_half_days_per_year
            {
                errors.push(format!(
                    "year {year} declares {projects} project subjects, quota is {}",
                    config.project_half_days_per_year
                ));
            }
            let remedials = subjects
                .iter()
                .filter(|s| s.year == *year && matches!(s.kind, SubjectKind::Remedial))
                .count() as u32;
            if config.remedial_lectures_per_year > 0
                && remedials > config.remedial_lectures_per_year
            {
                errors.push(format!(
                    "year {year} declares {remedials} remedial subjects, quota is {}",
                    config.remedial_lectures_per_year
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::Msg(errors.join("; ")))
    }
}

pub struct SolveRequest<'a> {
    pub scope: &'a PartitionScope,
    pub catalog: &'a Catalog,
    pub config: &'a EngineConfig,
    pub ledger: &'a GlobalAllocationLedger,
    pub params: &'a SolveParams,
    pub warm_start: Option<Chromosome>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OptimizeReport {
    pub chromosome: Chromosome,
    pub fitness: i64,
    pub breakdown: Breakdown,
    pub status: SolveStatus,
    pub generations: u32,
    pub stats: serde_json::Value,
}

pub trait Solver: Send + Sync {
    fn solve(&self, req: &SolveRequest<'_>) -> anyhow::Result<OptimizeReport>;
}
