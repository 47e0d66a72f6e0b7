use std::collections::{HashMap, HashSet};

use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;
use types::{
    BatchId, DivisionId, Gene, Room, RoomId, SlotId, Subject, SubjectKind, Teacher, TeacherId,
    TimePreference, TimeSlot,
};

use crate::index::CatalogIndex;
use crate::model::Chromosome;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlacementError {
    #[error("no eligible teacher for subject {subject}")]
    NoTeacher { subject: types::SubjectId },
    #[error("no eligible room for subject {subject}")]
    NoRoom { subject: types::SubjectId },
    #[error("no free slot for subject {subject} within the attempt bound")]
    NoSlot { subject: types::SubjectId },
}

/// Batch scopes overlap when either covers the whole division or both name
/// the same batch.
pub fn scopes_overlap(a: Option<BatchId>, b: Option<BatchId>) -> bool {
    match (a, b) {
        (None, _) | (_, None) => true,
        (Some(x), Some(y)) => x == y,
    }
}

/// In-flight resource bookkeeping for constructive placement, the mirror of
/// what the evaluator later penalizes.
#[derive(Clone, Debug, Default)]
pub struct Occupancy {
    teacher: HashSet<(TeacherId, SlotId)>,
    room: HashSet<(RoomId, SlotId)>,
    batch: HashMap<(DivisionId, SlotId), Vec<Option<BatchId>>>,
}

impl Occupancy {
    pub fn from_genes(index: &CatalogIndex<'_>, genes: &[Gene]) -> Self {
        let mut occ = Self::default();
        for gene in genes {
            occ.occupy(index, gene);
        }
        occ
    }

    pub fn is_free(&self, index: &CatalogIndex<'_>, gene: &Gene) -> bool {
        if let Some(teacher) = &gene.teacher {
            if self
                .teacher
                .contains(&(teacher.clone(), gene.slot.clone()))
            {
                return false;
            }
        }
        if self.room.contains(&(gene.room.clone(), gene.slot.clone())) {
            return false;
        }
        if let Some(subject) = index.subject(&gene.subject) {
            if let Some(scopes) = self
                .batch
                .get(&(subject.division.clone(), gene.slot.clone()))
            {
                if scopes.iter().any(|s| scopes_overlap(*s, gene.batch)) {
                    return false;
                }
            }
        }
        true
    }

    pub fn occupy(&mut self, index: &CatalogIndex<'_>, gene: &Gene) {
        if let Some(teacher) = &gene.teacher {
            self.teacher.insert((teacher.clone(), gene.slot.clone()));
        }
        self.room.insert((gene.room.clone(), gene.slot.clone()));
        if let Some(subject) = index.subject(&gene.subject) {
            self.batch
                .entry((subject.division.clone(), gene.slot.clone()))
                .or_default()
                .push(gene.batch);
        }
    }

    /// `is_free` then `occupy` in one step.
    pub fn place(&mut self, index: &CatalogIndex<'_>, gene: &Gene) -> bool {
        if !self.is_free(index, gene) {
            return false;
        }
        self.occupy(index, gene);
        true
    }
}

/// Teachers from the year pool, best combined proficiency first.
pub fn ranked_teachers<'a>(index: &CatalogIndex<'a>, subject: &Subject) -> Vec<&'a Teacher> {
    let mut pool = index.teacher_pool(subject.year);
    pool.sort_by(|a, b| {
        let pa = a.proficiency_for(&subject.id).unwrap_or(0.0);
        let pb = b.proficiency_for(&subject.id).unwrap_or(0.0);
        pb.partial_cmp(&pa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    pool
}

/// Top-3 proficiency bias mixed with uniform randomness so the population
/// keeps diversity.
pub fn pick_teacher<'a, R: Rng>(
    index: &CatalogIndex<'a>,
    subject: &Subject,
    rng: &mut R,
) -> Option<&'a Teacher> {
    let ranked = ranked_teachers(index, subject);
    if ranked.is_empty() {
        return None;
    }
    if rng.gen_bool(0.7) {
        let top = ranked.len().min(3);
        ranked[..top].choose(rng).copied()
    } else {
        ranked.choose(rng).copied()
    }
}

/// Lecture vs lab pool for the subject's year, narrowed by equipment needs.
pub fn eligible_rooms<'a>(index: &CatalogIndex<'a>, subject: &Subject) -> Vec<&'a Room> {
    index
        .room_pool(subject.year, subject.kind)
        .into_iter()
        .filter(|room| subject.needs.iter().all(|need| room.equip.contains(need)))
        .collect()
}

/// Non-recess slots matching the teacher's declared daypart preference.
/// Project genes carry no teacher, so `None` means the whole teachable set.
pub fn eligible_slots<'a>(
    index: &CatalogIndex<'a>,
    preference: Option<TimePreference>,
) -> Vec<&'a TimeSlot> {
    let slots = index.teachable_slots();
    match preference {
        Some(TimePreference::Morning) => slots
            .into_iter()
            .filter(|s| index.is_morning(s))
            .collect(),
        Some(TimePreference::Afternoon) => slots
            .into_iter()
            .filter(|s| !index.is_morning(s))
            .collect(),
        Some(TimePreference::Flexible) | None => slots,
    }
}

pub fn eligible_blocks<'a>(
    index: &CatalogIndex<'a>,
    len: usize,
    preference: Option<TimePreference>,
) -> Vec<Vec<&'a TimeSlot>> {
    let blocks = index.contiguous_blocks(len);
    match preference {
        Some(TimePreference::Morning) => blocks
            .into_iter()
            .filter(|b| b.iter().all(|s| index.is_morning(s)))
            .collect(),
        Some(TimePreference::Afternoon) => blocks
            .into_iter()
            .filter(|b| b.iter().all(|s| !index.is_morning(s)))
            .collect(),
        Some(TimePreference::Flexible) | None => blocks,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MoveKind {
    Teacher,
    Room,
    Slot,
}

/// A structural mutation that was applied to a chromosome; tabu search keys
/// its recency list on this.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Move {
    pub gene: usize,
    pub kind: MoveKind,
}

/// Mutates one gene (or, for slot moves on block subjects, the subject's
/// whole block) through the same legality filters as initialization.
/// Falls back to an unconstrained draw when the filtered pool is empty; the
/// evaluator surfaces whatever that breaks.
pub fn apply_random_move<R: Rng>(
    chromosome: &mut Chromosome,
    index: &CatalogIndex<'_>,
    rng: &mut R,
) -> Option<Move> {
    if chromosome.is_empty() {
        return None;
    }
    let i = rng.gen_range(0..chromosome.len());
    let gene = chromosome.genes()[i].clone();
    let subject = index.subject(&gene.subject)?;

    let kind = match subject.kind {
        // a project gene never receives a teacher
        SubjectKind::Project => {
            if rng.gen_bool(0.5) {
                MoveKind::Room
            } else {
                MoveKind::Slot
            }
        }
        _ => match rng.gen_range(0..3) {
            0 => MoveKind::Teacher,
            1 => MoveKind::Room,
            _ => MoveKind::Slot,
        },
    };

    match kind {
        MoveKind::Teacher => {
            let picked = pick_teacher(index, subject, rng)?;
            chromosome.set_teacher(i, Some(picked.id.clone()));
        }
        MoveKind::Room => {
            let rooms = eligible_rooms(index, subject);
            let room = match rooms.choose(rng) {
                Some(room) => (*room).id.clone(),
                None => index.catalog.rooms.choose(rng)?.id.clone(),
            };
            chromosome.set_room(i, room);
        }
        MoveKind::Slot => {
            let preference = teacher_preference(index, &gene);
            match subject.kind.block_len() {
                Some(len) => move_block(chromosome, index, subject, len as usize, preference, rng),
                None => {
                    let slots = eligible_slots(index, preference);
                    let slot = match slots.choose(rng) {
                        Some(slot) => slot.id.clone(),
                        None => index.catalog.timeslots.choose(rng)?.id.clone(),
                    };
                    chromosome.set_slot(i, slot);
                }
            }
        }
    }
    Some(Move { gene: i, kind })
}

fn teacher_preference(index: &CatalogIndex<'_>, gene: &Gene) -> Option<TimePreference> {
    gene.teacher
        .as_ref()
        .and_then(|id| index.teacher(id))
        .map(|t| t.preference)
}

/// Re-slots every gene of a block subject onto a fresh contiguous run,
/// keeping lab pairs and project half-days intact.
fn move_block<R: Rng>(
    chromosome: &mut Chromosome,
    index: &CatalogIndex<'_>,
    subject: &Subject,
    len: usize,
    preference: Option<TimePreference>,
    rng: &mut R,
) {
    let blocks = eligible_blocks(index, len, preference);
    let blocks = if blocks.is_empty() {
        eligible_blocks(index, len, None)
    } else {
        blocks
    };
    let Some(block) = blocks.choose(rng) else {
        return;
    };
    let members: Vec<usize> = chromosome
        .genes()
        .iter()
        .enumerate()
        .filter(|(_, g)| g.subject == subject.id)
        .map(|(j, _)| j)
        .collect();
    for (j, slot) in members.into_iter().zip(block.iter()) {
        chromosome.set_slot(j, slot.id.clone());
    }
}
