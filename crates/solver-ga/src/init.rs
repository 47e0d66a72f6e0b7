use rand::seq::SliceRandom;
use rand::Rng;
use tracing::warn;
use types::{Gene, SolveParams, Subject, TeacherId};

use timetable_core::placement::{
    eligible_blocks, eligible_rooms, eligible_slots, pick_teacher, Occupancy, PlacementError,
};
use timetable_core::{CatalogIndex, Chromosome, PartitionScope};

/// Constructs one chromosome for the partition: a proficiency-biased teacher,
/// a pool-partitioned room, and legality-filtered slots per subject session.
/// Subjects with the fewest legal placements are placed first.
pub fn construct_chromosome<R: Rng>(
    scope: &PartitionScope,
    index: &CatalogIndex<'_>,
    params: &SolveParams,
    rng: &mut R,
) -> Chromosome {
    let mut subjects = index.subjects_in(&scope.divisions);
    subjects.sort_by_key(|s| legal_placements(index, s));

    let mut occ = Occupancy::default();
    let mut genes: Vec<Gene> = Vec::new();

    for subject in subjects {
        let teacher = if subject.kind.is_teacherless() {
            None
        } else {
            pick_teacher(index, subject, rng).map(|t| t.id.clone())
        };

        match subject.kind.block_len() {
            Some(len) => {
                match place_block(subject, &teacher, len as usize, index, params, &mut occ, rng) {
                    Ok(block) => genes.extend(block),
                    Err(err) => {
                        warn!(subject = %subject.id, %err, "falling back to random block placement");
                        genes.extend(random_block_fallback(
                            subject,
                            &teacher,
                            len as usize,
                            index,
                            &mut occ,
                            rng,
                        ));
                    }
                }
            }
            None => {
                for _ in 0..subject.sessions_per_week {
                    match place_session(subject, &teacher, index, params, &mut occ, rng) {
                        Ok(gene) => genes.push(gene),
                        Err(err) => {
                            warn!(subject = %subject.id, %err, "falling back to random placement");
                            genes.push(random_session_fallback(
                                subject, &teacher, index, &mut occ, rng,
                            ));
                        }
                    }
                }
            }
        }
    }

    Chromosome::new(scope.id.clone(), genes)
}

fn legal_placements(index: &CatalogIndex<'_>, subject: &Subject) -> usize {
    let rooms = eligible_rooms(index, subject).len().max(1);
    match subject.kind.block_len() {
        Some(len) => eligible_blocks(index, len as usize, None).len() * rooms,
        None => eligible_slots(index, None).len() * rooms,
    }
}

/// One lecture/remedial session through the legality filters, bounded
/// attempts, conflict-free against the in-flight occupancy.
fn place_session<R: Rng>(
    subject: &Subject,
    teacher: &Option<TeacherId>,
    index: &CatalogIndex<'_>,
    params: &SolveParams,
    occ: &mut Occupancy,
    rng: &mut R,
) -> Result<Gene, PlacementError> {
    let rooms = eligible_rooms(index, subject);
    if rooms.is_empty() {
        return Err(PlacementError::NoRoom {
            subject: subject.id.clone(),
        });
    }
    let preference = preference_of(index, teacher);
    let slots = eligible_slots(index, preference);
    if slots.is_empty() {
        return Err(PlacementError::NoSlot {
            subject: subject.id.clone(),
        });
    }

    for _ in 0..params.max_placement_attempts {
        let room = rooms.choose(rng).expect("non-empty");
        let slot = slots.choose(rng).expect("non-empty");
        let gene = Gene {
            subject: subject.id.clone(),
            teacher: teacher.clone(),
            room: room.id.clone(),
            slot: slot.id.clone(),
            batch: subject.batch,
        };
        if occ.place(index, &gene) {
            return Ok(gene);
        }
    }
    Err(PlacementError::NoSlot {
        subject: subject.id.clone(),
    })
}

/// A lab pair or project half-day: every slot of a contiguous run must be
/// free at once, in one room.
fn place_block<R: Rng>(
    subject: &Subject,
    teacher: &Option<TeacherId>,
    len: usize,
    index: &CatalogIndex<'_>,
    params: &SolveParams,
    occ: &mut Occupancy,
    rng: &mut R,
) -> Result<Vec<Gene>, PlacementError> {
    let rooms = eligible_rooms(index, subject);
    if rooms.is_empty() {
        return Err(PlacementError::NoRoom {
            subject: subject.id.clone(),
        });
    }
    let preference = preference_of(index, teacher);
    let mut blocks = eligible_blocks(index, len, preference);
    if blocks.is_empty() {
        blocks = eligible_blocks(index, len, None);
    }
    if blocks.is_empty() {
        return Err(PlacementError::NoSlot {
            subject: subject.id.clone(),
        });
    }

    for _ in 0..params.max_placement_attempts {
        let room = rooms.choose(rng).expect("non-empty");
        let block = blocks.choose(rng).expect("non-empty");
        let genes: Vec<Gene> = block
            .iter()
            .map(|slot| Gene {
                subject: subject.id.clone(),
                teacher: teacher.clone(),
                room: room.id.clone(),
                slot: slot.id.clone(),
                batch: subject.batch,
            })
            .collect();
        if genes.iter().all(|g| occ.is_free(index, g)) {
            for gene in &genes {
                occ.occupy(index, gene);
            }
            return Ok(genes);
        }
    }
    Err(PlacementError::NoSlot {
        subject: subject.id.clone(),
    })
}

/// Unconstrained draw once the attempt bound is spent; whatever this breaks
/// shows up as fitness violations for the evolutionary loop to repair.
fn random_session_fallback<R: Rng>(
    subject: &Subject,
    teacher: &Option<TeacherId>,
    index: &CatalogIndex<'_>,
    occ: &mut Occupancy,
    rng: &mut R,
) -> Gene {
    let room = index
        .catalog
        .rooms
        .choose(rng)
        .expect("validated catalog has rooms");
    let slot = index
        .catalog
        .timeslots
        .choose(rng)
        .expect("validated catalog has timeslots");
    let gene = Gene {
        subject: subject.id.clone(),
        teacher: teacher.clone(),
        room: room.id.clone(),
        slot: slot.id.clone(),
        batch: subject.batch,
    };
    occ.occupy(index, &gene);
    gene
}

fn random_block_fallback<R: Rng>(
    subject: &Subject,
    teacher: &Option<TeacherId>,
    len: usize,
    index: &CatalogIndex<'_>,
    occ: &mut Occupancy,
    rng: &mut R,
) -> Vec<Gene> {
    (0..len)
        .map(|_| random_session_fallback(subject, teacher, index, occ, rng))
        .collect()
}

fn preference_of(
    index: &CatalogIndex<'_>,
    teacher: &Option<TeacherId>,
) -> Option<types::TimePreference> {
    teacher
        .as_ref()
        .and_then(|id| index.teacher(id))
        .map(|t| t.preference)
}
