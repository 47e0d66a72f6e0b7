use rand::Rng;
use serde::{Deserialize, Serialize};
use types::{BatchId, Gene, PartitionId, RoomId, SlotId, SubjectId, TeacherId};

use crate::evaluate::{EvalContext, Evaluation, Evaluator};

/// A full candidate schedule for one partition.
///
/// The evaluation is memoized: any structural mutation clears it, so a stale
/// score can never leak through `evaluate`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Chromosome {
    pub partition: PartitionId,
    genes: Vec<Gene>,
    #[serde(skip)]
    cached: Option<Evaluation>,
}

impl Chromosome {
    pub fn new(partition: PartitionId, genes: Vec<Gene>) -> Self {
        Self {
            partition,
            genes,
            cached: None,
        }
    }

    pub fn genes(&self) -> &[Gene] {
        &self.genes
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    pub fn cached(&self) -> Option<&Evaluation> {
        self.cached.as_ref()
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    /// Memoized fitness; computed at most once between mutations.
    pub fn evaluate(&mut self, evaluator: &Evaluator, ctx: &EvalContext<'_>) -> Evaluation {
        if self.cached.is_none() {
            self.cached = Some(evaluator.evaluate(&self.genes, ctx));
        }
        self.cached.clone().expect("just populated")
    }

    pub fn fitness(&mut self, evaluator: &Evaluator, ctx: &EvalContext<'_>) -> i64 {
        self.evaluate(evaluator, ctx).score
    }

    pub fn set_teacher(&mut self, i: usize, teacher: Option<TeacherId>) {
        self.genes[i].teacher = teacher;
        self.cached = None;
    }

    pub fn set_room(&mut self, i: usize, room: RoomId) {
        self.genes[i].room = room;
        self.cached = None;
    }

    pub fn set_slot(&mut self, i: usize, slot: SlotId) {
        self.genes[i].slot = slot;
        self.cached = None;
    }

    pub fn set_batch(&mut self, i: usize, batch: Option<BatchId>) {
        self.genes[i].batch = batch;
        self.cached = None;
    }

    pub fn replace_gene(&mut self, i: usize, gene: Gene) {
        self.genes[i] = gene;
        self.cached = None;
    }

    /// Single cut over the gene sequence; tails are swapped.
    pub fn single_point_crossover<R: Rng>(&self, other: &Self, rng: &mut R) -> (Self, Self) {
        let min_len = self.genes.len().min(other.genes.len());
        if min_len < 2 {
            return (self.clone_fresh(), other.clone_fresh());
        }
        let cut = rng.gen_range(1..min_len);
        let mut a = self.genes[..cut].to_vec();
        a.extend_from_slice(&other.genes[cut..]);
        let mut b = other.genes[..cut].to_vec();
        b.extend_from_slice(&self.genes[cut..]);
        (
            Self::new(self.partition.clone(), a),
            Self::new(other.partition.clone(), b),
        )
    }

    /// Per subject, one child inherits the whole gene block from one parent
    /// and the other child from the other parent. Keeps lab pairs and project
    /// half-day blocks intact across recombination.
    pub fn subject_grouped_crossover<R: Rng>(&self, other: &Self, rng: &mut R) -> (Self, Self) {
        let mut subjects: Vec<&SubjectId> = Vec::new();
        for gene in self.genes.iter().chain(other.genes.iter()) {
            if !subjects.contains(&&gene.subject) {
                subjects.push(&gene.subject);
            }
        }

        let mut a = Vec::with_capacity(self.genes.len());
        let mut b = Vec::with_capacity(other.genes.len());
        for subject in subjects {
            let from_self: Vec<Gene> = self
                .genes
                .iter()
                .filter(|g| &g.subject == subject)
                .cloned()
                .collect();
            let from_other: Vec<Gene> = other
                .genes
                .iter()
                .filter(|g| &g.subject == subject)
                .cloned()
                .collect();
            if rng.gen_bool(0.5) {
                a.extend(from_self);
                b.extend(from_other);
            } else {
                a.extend(from_other);
                b.extend(from_self);
            }
        }
        (
            Self::new(self.partition.clone(), a),
            Self::new(other.partition.clone(), b),
        )
    }

    fn clone_fresh(&self) -> Self {
        Self::new(self.partition.clone(), self.genes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::CatalogIndex;
    use crate::ledger::GlobalAllocationLedger;
    use crate::PartitionScope;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashMap;
    use types::{
        Catalog, DayOfWeek, Division, DivisionId, EngineConfig, Room, Subject, SubjectKind,
        Teacher, TimePreference, TimeSlot,
    };

    fn catalog() -> Catalog {
        Catalog {
            teachers: vec![Teacher {
                id: TeacherId("t1".into()),
                max_sessions_per_week: 20,
                min_sessions_per_week: 2,
                preference: TimePreference::Flexible,
                proficiency: HashMap::new(),
            }],
            subjects: vec![
                Subject {
                    id: SubjectId("s1".into()),
                    division: DivisionId("d1".into()),
                    year: 1,
                    kind: SubjectKind::Lecture,
                    sessions_per_week: 2,
                    needs: vec![],
                    batch: None,
                },
                Subject {
                    id: SubjectId("s2".into()),
                    division: DivisionId("d1".into()),
                    year: 1,
                    kind: SubjectKind::Lecture,
                    sessions_per_week: 2,
                    needs: vec![],
                    batch: None,
                },
            ],
            rooms: vec![Room {
                id: RoomId("r1".into()),
                capacity: 60,
                equip: vec![],
                is_lab: false,
            }],
            timeslots: (0..6)
                .map(|i| TimeSlot {
                    id: SlotId(format!("mon.{i}")),
                    day: DayOfWeek::Mon,
                    index: i,
                    start_min: 9 * 60 + (i as u16) * 60,
                    end_min: 10 * 60 + (i as u16) * 60,
                    is_recess: false,
                })
                .collect(),
            divisions: vec![Division {
                id: DivisionId("d1".into()),
                year: 1,
                batch_count: 3,
            }],
        }
    }

    fn gene(subject: &str, slot: &str) -> Gene {
        Gene {
            subject: SubjectId(subject.into()),
            teacher: Some(TeacherId("t1".into())),
            room: RoomId("r1".into()),
            slot: SlotId(slot.into()),
            batch: None,
        }
    }

    fn chromosome(slots: &[(&str, &str)]) -> Chromosome {
        Chromosome::new(
            PartitionId("p1".into()),
            slots.iter().map(|(s, t)| gene(s, t)).collect(),
        )
    }

    #[test]
    fn fitness_is_cached_until_mutation() {
        let cat = catalog();
        let cfg = EngineConfig::default();
        let idx = CatalogIndex::new(&cat, &cfg);
        let ledger = GlobalAllocationLedger::new();
        let scope = PartitionScope {
            id: PartitionId("p1".into()),
            divisions: vec![DivisionId("d1".into())],
        };
        let ctx = crate::evaluate::EvalContext::new(&idx, &ledger, &scope);
        let evaluator = Evaluator::from_config(&cfg);

        let mut ch = chromosome(&[("s1", "mon.0"), ("s1", "mon.1"), ("s2", "mon.2"), ("s2", "mon.3")]);
        assert!(ch.cached().is_none());
        let first = ch.evaluate(&evaluator, &ctx);
        assert!(ch.cached().is_some());
        let second = ch.evaluate(&evaluator, &ctx);
        assert_eq!(first, second);

        ch.set_slot(0, SlotId("mon.4".into()));
        assert!(ch.cached().is_none(), "mutation must invalidate the cache");
    }

    #[test]
    fn every_mutator_invalidates() {
        let mut ch = chromosome(&[("s1", "mon.0")]);
        let cat = catalog();
        let cfg = EngineConfig::default();
        let idx = CatalogIndex::new(&cat, &cfg);
        let ledger = GlobalAllocationLedger::new();
        let scope = PartitionScope {
            id: PartitionId("p1".into()),
            divisions: vec![DivisionId("d1".into())],
        };
        let ctx = crate::evaluate::EvalContext::new(&idx, &ledger, &scope);
        let evaluator = Evaluator::from_config(&cfg);

        ch.evaluate(&evaluator, &ctx);
        ch.set_teacher(0, None);
        assert!(ch.cached().is_none());

        ch.evaluate(&evaluator, &ctx);
        ch.set_room(0, RoomId("r1".into()));
        assert!(ch.cached().is_none());

        ch.evaluate(&evaluator, &ctx);
        ch.set_batch(0, Some(BatchId(1)));
        assert!(ch.cached().is_none());

        ch.evaluate(&evaluator, &ctx);
        ch.replace_gene(0, gene("s1", "mon.5"));
        assert!(ch.cached().is_none());
    }

    #[test]
    fn subject_grouped_crossover_keeps_blocks_whole() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let p1 = chromosome(&[("s1", "mon.0"), ("s1", "mon.1"), ("s2", "mon.2"), ("s2", "mon.3")]);
        let p2 = chromosome(&[("s1", "mon.4"), ("s1", "mon.5"), ("s2", "mon.0"), ("s2", "mon.1")]);

        let (a, b) = p1.subject_grouped_crossover(&p2, &mut rng);
        for child in [&a, &b] {
            for subject in ["s1", "s2"] {
                let slots: Vec<&str> = child
                    .genes()
                    .iter()
                    .filter(|g| g.subject.0 == subject)
                    .map(|g| g.slot.0.as_str())
                    .collect();
                // each subject's pair comes wholesale from one parent
                let from_p1: Vec<&str> = p1
                    .genes()
                    .iter()
                    .filter(|g| g.subject.0 == subject)
                    .map(|g| g.slot.0.as_str())
                    .collect();
                let from_p2: Vec<&str> = p2
                    .genes()
                    .iter()
                    .filter(|g| g.subject.0 == subject)
                    .map(|g| g.slot.0.as_str())
                    .collect();
                assert!(slots == from_p1 || slots == from_p2);
            }
        }
        assert!(a.cached().is_none());
        assert!(b.cached().is_none());
    }

    #[test]
    fn single_point_preserves_total_gene_count() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let p1 = chromosome(&[("s1", "mon.0"), ("s1", "mon.1"), ("s2", "mon.2"), ("s2", "mon.3")]);
        let p2 = chromosome(&[("s1", "mon.4"), ("s1", "mon.5"), ("s2", "mon.0"), ("s2", "mon.1")]);
        let (a, b) = p1.single_point_crossover(&p2, &mut rng);
        assert_eq!(a.len() + b.len(), p1.len() + p2.len());
    }

    proptest! {
        /// Re-evaluating without mutation always returns the identical
        /// score and breakdown, whatever the gene layout.
        #[test]
        fn reevaluation_round_trip(seed in 0u64..500) {
            let cat = catalog();
            let cfg = EngineConfig::default();
            let idx = CatalogIndex::new(&cat, &cfg);
            let ledger = GlobalAllocationLedger::new();
            let scope = PartitionScope {
                id: PartitionId("p1".into()),
                divisions: vec![DivisionId("d1".into())],
            };
            let ctx = crate::evaluate::EvalContext::new(&idx, &ledger, &scope);
            let evaluator = Evaluator::from_config(&cfg);

            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let genes: Vec<Gene> = (0..6)
                .map(|_| {
                    let s = if rng.gen_bool(0.5) { "s1" } else { "s2" };
                    let slot = format!("mon.{}", rng.gen_range(0..6));
                    gene(s, &slot)
                })
                .collect();
            let mut ch = Chromosome::new(PartitionId("p1".into()), genes);
            let first = ch.evaluate(&evaluator, &ctx);
            let again = ch.evaluate(&evaluator, &ctx);
            prop_assert_eq!(&first, &again);

            // a fresh identical chromosome agrees too
            let mut copy = Chromosome::new(PartitionId("p1".into()), ch.genes().to_vec());
            let third = copy.evaluate(&evaluator, &ctx);
            prop_assert_eq!(&first, &third);
        }
    }
}
