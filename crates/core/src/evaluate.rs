use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use types::{
    BatchId, EngineConfig, FeatureFlags, Gene, Subject, SubjectKind, TimeSlot, WeightTable,
};

use crate::index::CatalogIndex;
use crate::ledger::GlobalAllocationLedger;
use crate::placement::scopes_overlap;
use crate::PartitionScope;

/// Weighted penalty points per violation category. Values are already
/// multiplied by their configured weight; `score()` folds them into the
/// non-positive fitness scalar.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Breakdown {
    pub teacher_conflicts: i64,
    pub room_conflicts: i64,
    pub student_conflicts: i64,
    pub cross_partition: i64,
    pub recess_violations: i64,
    pub session_count: i64,
    pub lab_continuity: i64,
    pub project_block: i64,
    pub proficiency: i64,
    pub proficiency_bonus: i64,
    pub preference_violations: i64,
    pub workload_imbalance: i64,
    pub daypart_imbalance: i64,
    pub schedule_gaps: i64,
}

impl Breakdown {
    pub fn total_penalty(&self) -> i64 {
        self.teacher_conflicts
            + self.room_conflicts
            + self.student_conflicts
            + self.cross_partition
            + self.recess_violations
            + self.session_count
            + self.lab_continuity
            + self.project_block
            + self.proficiency
            + self.preference_violations
            + self.workload_imbalance
            + self.daypart_imbalance
            + self.schedule_gaps
    }

    /// Fitness is never positive: the bonus can cancel penalties but cannot
    /// lift a flawed chromosome above a clean one.
    pub fn score(&self) -> i64 {
        -(self.total_penalty() - self.proficiency_bonus).max(0)
    }

    pub fn as_map(&self) -> BTreeMap<&'static str, i64> {
        BTreeMap::from([
            ("teacher_conflicts", self.teacher_conflicts),
            ("room_conflicts", self.room_conflicts),
            ("student_conflicts", self.student_conflicts),
            ("cross_partition", self.cross_partition),
            ("recess_violations", self.recess_violations),
            ("session_count", self.session_count),
            ("lab_continuity", self.lab_continuity),
            ("project_block", self.project_block),
            ("proficiency", self.proficiency),
            ("proficiency_bonus", self.proficiency_bonus),
            ("preference_violations", self.preference_violations),
            ("workload_imbalance", self.workload_imbalance),
            ("daypart_imbalance", self.daypart_imbalance),
            ("schedule_gaps", self.schedule_gaps),
        ])
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Evaluation {
    pub score: i64,
    pub breakdown: Breakdown,
}

/// Everything a fitness computation may look at: the catalog index, the
/// cross-partition ledger snapshot, and the partition under optimization.
pub struct EvalContext<'a> {
    pub index: &'a CatalogIndex<'a>,
    pub ledger: &'a GlobalAllocationLedger,
    pub scope: &'a PartitionScope,
    subjects: Vec<&'a Subject>,
}

impl<'a> EvalContext<'a> {
    pub fn new(
        index: &'a CatalogIndex<'a>,
        ledger: &'a GlobalAllocationLedger,
        scope: &'a PartitionScope,
    ) -> Self {
        let subjects = index.subjects_in(&scope.divisions);
        Self {
            index,
            ledger,
            scope,
            subjects,
        }
    }

    pub fn subjects(&self) -> &[&'a Subject] {
        &self.subjects
    }
}

/// The single parameterized evaluator: one weight table, one flag set,
/// every variant of the scoring expressed as configuration.
#[derive(Clone, Debug)]
pub struct Evaluator {
    weights: WeightTable,
    features: FeatureFlags,
}

struct Resolved<'a> {
    gene: &'a Gene,
    subject: &'a Subject,
    slot: &'a TimeSlot,
}

impl Evaluator {
    pub fn new(weights: WeightTable, features: FeatureFlags) -> Self {
        Self { weights, features }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.weights.clone(), config.features)
    }

    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    pub fn evaluate(&self, genes: &[Gene], ctx: &EvalContext<'_>) -> Evaluation {
        let idx = ctx.index;
        let w = &self.weights;
        let mut b = Breakdown::default();

        let resolved: Vec<Resolved<'_>> = genes
            .iter()
            .filter_map(|gene| {
                let subject = idx.subject(&gene.subject)?;
                let slot = idx.slot(&gene.slot)?;
                Some(Resolved {
                    gene,
                    subject,
                    slot,
                })
            })
            .collect();

        b.teacher_conflicts = self.teacher_conflicts(&resolved) * w.teacher_conflict;
        b.room_conflicts = self.room_conflicts(&resolved) * w.room_conflict;
        b.student_conflicts = self.batch_conflicts(&resolved) * w.batch_conflict;
        if self.features.cross_partition {
            b.cross_partition = self.cross_partition_conflicts(&resolved, ctx) * w.cross_partition;
        }
        b.recess_violations =
            resolved.iter().filter(|r| idx.is_recess(r.slot)).count() as i64 * w.recess;
        b.session_count = self.session_count_deviation(&resolved, ctx);
        b.lab_continuity = self.lab_continuity(&resolved, ctx) * w.lab_continuity;
        b.project_block = self.project_block(&resolved, ctx) * w.project_block;
        let (shortfall, bonus_hits) = self.proficiency_terms(&resolved, ctx);
        b.proficiency = (shortfall * w.proficiency_shortfall as f64).round() as i64;
        b.proficiency_bonus = bonus_hits * w.proficiency_bonus;
        b.preference_violations = self.preference_mismatches(&resolved, ctx) * w.preference;
        if self.features.workload_balance {
            b.workload_imbalance = self.workload_imbalance(&resolved);
        }
        if self.features.daypart_balance {
            b.daypart_imbalance = self.daypart_imbalance(&resolved, ctx);
        }
        if self.features.gap_penalty {
            b.schedule_gaps = self.schedule_gaps(&resolved, ctx) * w.gap;
        }

        Evaluation {
            score: b.score(),
            breakdown: b,
        }
    }

    fn teacher_conflicts(&self, resolved: &[Resolved<'_>]) -> i64 {
        let mut use_count: HashMap<(&str, &str), i64> = HashMap::new();
        for r in resolved {
            if let Some(teacher) = &r.gene.teacher {
                *use_count
                    .entry((teacher.0.as_str(), r.gene.slot.0.as_str()))
                    .or_insert(0) += 1;
            }
        }
        use_count.values().map(|n| (n - 1).max(0)).sum()
    }

    fn room_conflicts(&self, resolved: &[Resolved<'_>]) -> i64 {
        let mut use_count: HashMap<(&str, &str), i64> = HashMap::new();
        for r in resolved {
            *use_count
                .entry((r.gene.room.0.as_str(), r.gene.slot.0.as_str()))
                .or_insert(0) += 1;
        }
        use_count.values().map(|n| (n - 1).max(0)).sum()
    }

    /// Two genes clash for students when they share the division and slot and
    /// their batch scopes overlap (`None` = the whole division attends).
    fn batch_conflicts(&self, resolved: &[Resolved<'_>]) -> i64 {
        let mut by_div_slot: HashMap<(&str, &str), Vec<Option<BatchId>>> = HashMap::new();
        for r in resolved {
            by_div_slot
                .entry((r.subject.division.0.as_str(), r.gene.slot.0.as_str()))
                .or_default()
                .push(r.gene.batch);
        }
        let mut clashes = 0i64;
        for scopes in by_div_slot.values() {
            for i in 0..scopes.len() {
                for j in (i + 1)..scopes.len() {
                    if scopes_overlap(scopes[i], scopes[j]) {
                        clashes += 1;
                    }
                }
            }
        }
        clashes
    }

    fn cross_partition_conflicts(&self, resolved: &[Resolved<'_>], ctx: &EvalContext<'_>) -> i64 {
        let own = &ctx.scope.id;
        let mut hits = 0i64;
        for r in resolved {
            if let Some(teacher) = &r.gene.teacher {
                if ctx
                    .ledger
                    .teacher_busy_elsewhere(teacher, &r.gene.slot, own)
                {
                    hits += 1;
                }
            }
            if ctx.ledger.room_busy_elsewhere(&r.gene.room, &r.gene.slot, own) {
                hits += 1;
            }
        }
        hits
    }

    fn session_count_deviation(&self, resolved: &[Resolved<'_>], ctx: &EvalContext<'_>) -> i64 {
        let w = &self.weights;
        let mut scheduled: HashMap<&str, i64> = HashMap::new();
        for r in resolved {
            *scheduled.entry(r.gene.subject.0.as_str()).or_insert(0) += 1;
        }
        let mut total = 0i64;
        for subject in ctx.subjects() {
            let have = scheduled
                .get(subject.id.0.as_str())
                .copied()
                .unwrap_or(0);
            let need = subject.sessions_per_week as i64;
            if have < need {
                total += (need - have) * w.session_deficit;
            } else if have > need {
                total += (have - need) * w.session_surplus;
            }
        }
        total
    }

    /// Units of departure from the ideal one contiguous 2-slot block.
    fn lab_continuity(&self, resolved: &[Resolved<'_>], ctx: &EvalContext<'_>) -> i64 {
        let mut units = 0i64;
        for subject in ctx.subjects() {
            if !matches!(subject.kind, SubjectKind::Lab) {
                continue;
            }
            let slots = subject_slots(resolved, subject);
            let n = slots.len() as i64;
            units += (n - 2).abs();
            if slots.len() == 2 && !is_contiguous_run(ctx.index, &slots) {
                units += 1;
            }
        }
        units
    }

    /// Project work: exactly four contiguous slots and no teacher bound to
    /// any of its genes.
    fn project_block(&self, resolved: &[Resolved<'_>], ctx: &EvalContext<'_>) -> i64 {
        let mut units = 0i64;
        for subject in ctx.subjects() {
            if !matches!(subject.kind, SubjectKind::Project) {
                continue;
            }
            let slots = subject_slots(resolved, subject);
            let n = slots.len() as i64;
            units += (n - 4).abs();
            if slots.len() == 4 && !is_contiguous_run(ctx.index, &slots) {
                units += 1;
            }
            units += resolved
                .iter()
                .filter(|r| r.subject.id == subject.id && r.gene.teacher.is_some())
                .count() as i64;
        }
        units
    }

    fn proficiency_terms(&self, resolved: &[Resolved<'_>], ctx: &EvalContext<'_>) -> (f64, i64) {
        let w = &self.weights;
        let mut shortfall = 0.0f64;
        let mut bonus_hits = 0i64;
        for r in resolved {
            if matches!(r.subject.kind, SubjectKind::Project) {
                continue;
            }
            let Some(teacher_id) = &r.gene.teacher else {
                continue;
            };
            let Some(teacher) = ctx.index.teacher(teacher_id) else {
                continue;
            };
            let score = teacher.proficiency_for(&r.subject.id).unwrap_or(0.0);
            if score < w.proficiency_floor {
                shortfall += w.proficiency_floor - score;
            } else if score >= w.proficiency_ceiling {
                bonus_hits += 1;
            }
        }
        (shortfall, bonus_hits)
    }

    fn preference_mismatches(&self, resolved: &[Resolved<'_>], ctx: &EvalContext<'_>) -> i64 {
        use types::TimePreference::*;
        let mut hits = 0i64;
        for r in resolved {
            let Some(teacher_id) = &r.gene.teacher else {
                continue;
            };
            let Some(teacher) = ctx.index.teacher(teacher_id) else {
                continue;
            };
            let morning = ctx.index.is_morning(r.slot);
            match teacher.preference {
                Morning if !morning => hits += 1,
                Afternoon if morning => hits += 1,
                _ => {}
            }
        }
        hits
    }

    fn workload_imbalance(&self, resolved: &[Resolved<'_>]) -> i64 {
        let w = &self.weights;
        let mut loads: HashMap<&str, i64> = HashMap::new();
        for r in resolved {
            if let Some(teacher) = &r.gene.teacher {
                *loads.entry(teacher.0.as_str()).or_insert(0) += 1;
            }
        }
        if loads.is_empty() {
            return 0;
        }
        let mean = loads.values().sum::<i64>() as f64 / loads.len() as f64;
        let tolerance = w.workload_tolerance as f64;
        let mut excess = 0.0f64;
        for load in loads.values() {
            let dev = (*load as f64 - mean).abs();
            if dev > tolerance {
                excess += dev - tolerance;
            }
        }
        (excess * w.workload as f64).round() as i64
    }

    fn daypart_imbalance(&self, resolved: &[Resolved<'_>], ctx: &EvalContext<'_>) -> i64 {
        let w = &self.weights;
        if resolved.is_empty() {
            return 0;
        }
        let morning = resolved
            .iter()
            .filter(|r| ctx.index.is_morning(r.slot))
            .count() as f64;
        let share_pp = morning * 100.0 / resolved.len() as f64;
        let dev = (share_pp - 50.0).abs();
        let band = w.daypart_band_pp as f64;
        if dev > band {
            ((dev - band) * w.daypart as f64).round() as i64
        } else {
            0
        }
    }

    /// Idle slots strictly between the first and last session of a working
    /// day, counted per teacher and per batch. Positions are ranks within the
    /// day's teachable slots, so the recess break itself is never a gap.
    fn schedule_gaps(&self, resolved: &[Resolved<'_>], ctx: &EvalContext<'_>) -> i64 {
        let mut rank: HashMap<(types::DayOfWeek, u32), u32> = HashMap::new();
        let mut day_counters: HashMap<types::DayOfWeek, u32> = HashMap::new();
        for slot in ctx.index.teachable_slots() {
            let next = day_counters.entry(slot.day).or_insert(0);
            rank.insert((slot.day, slot.index), *next);
            *next += 1;
        }
        let rank_of = |slot: &TimeSlot| rank.get(&(slot.day, slot.index)).copied();

        let mut teacher_days: HashMap<(&str, types::DayOfWeek), Vec<u32>> = HashMap::new();
        let mut batch_days: HashSet<(&str, u8, types::DayOfWeek, u32)> = HashSet::new();

        for r in resolved {
            let Some(pos) = rank_of(r.slot) else {
                // recess placements are penalized elsewhere
                continue;
            };
            if let Some(teacher) = &r.gene.teacher {
                teacher_days
                    .entry((teacher.0.as_str(), r.slot.day))
                    .or_default()
                    .push(pos);
            }
            let division = r.subject.division.0.as_str();
            let batch_count = ctx
                .index
                .division(&r.subject.division)
                .map(|d| ctx.index.config.batch_count_for(d))
                .unwrap_or(types::DEFAULT_BATCH_COUNT);
            match r.gene.batch {
                Some(batch) => {
                    batch_days.insert((division, batch.0, r.slot.day, pos));
                }
                None => {
                    for batch in 0..batch_count {
                        batch_days.insert((division, batch, r.slot.day, pos));
                    }
                }
            }
        }

        let mut gaps = 0i64;
        for indices in teacher_days.values() {
            gaps += day_gaps(indices);
        }
        let mut per_batch: HashMap<(&str, u8, types::DayOfWeek), Vec<u32>> = HashMap::new();
        for (division, batch, day, index) in batch_days {
            per_batch.entry((division, batch, day)).or_default().push(index);
        }
        for indices in per_batch.values() {
            gaps += day_gaps(indices);
        }
        gaps
    }
}

fn day_gaps(indices: &[u32]) -> i64 {
    let Some(min) = indices.iter().min() else {
        return 0;
    };
    let max = indices.iter().max().unwrap();
    let distinct: HashSet<u32> = indices.iter().copied().collect();
    (*max as i64 - *min as i64 + 1) - distinct.len() as i64
}

fn subject_slots<'a>(resolved: &[Resolved<'a>], subject: &Subject) -> Vec<&'a TimeSlot> {
    let mut slots: Vec<&TimeSlot> = resolved
        .iter()
        .filter(|r| r.subject.id == subject.id)
        .map(|r| r.slot)
        .collect();
    slots.sort_by_key(|s| (s.day, s.index));
    slots
}

fn is_contiguous_run(index: &CatalogIndex<'_>, slots: &[&TimeSlot]) -> bool {
    slots
        .windows(2)
        .all(|pair| index.contiguous(pair[0], pair[1]))
}
