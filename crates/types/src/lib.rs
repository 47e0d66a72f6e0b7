use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}
id_newtype!(TeacherId);
id_newtype!(SubjectId);
id_newtype!(RoomId);
id_newtype!(SlotId);
id_newtype!(DivisionId);
id_newtype!(PartitionId);

/// Batch ordinal within a division (0-based).
#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash, PartialOrd, Ord, Default,
)]
#[serde(transparent)]
pub struct BatchId(pub u8);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Equip {
    Projector,
    Whiteboard,
    ComputerLab,
    ElectronicsBench,
    ChemistryBench,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    #[default]
    Lecture,
    Lab,
    Project,
    Remedial,
}

impl SubjectKind {
    /// Length of the contiguous block this kind must occupy, if any.
    pub fn block_len(&self) -> Option<u32> {
        match self {
            SubjectKind::Lab => Some(2),
            SubjectKind::Project => Some(4),
            SubjectKind::Lecture | SubjectKind::Remedial => None,
        }
    }

    pub fn is_teacherless(&self) -> bool {
        matches!(self, SubjectKind::Project)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub struct TimeSlot {
    pub id: SlotId,
    pub day: DayOfWeek,
    /// Slot ordinal within the day; contiguity means same day, adjacent index.
    pub index: u32,
    pub start_min: u16,
    pub end_min: u16,
    #[serde(default)]
    pub is_recess: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimePreference {
    Morning,
    Afternoon,
    #[default]
    Flexible,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct Proficiency {
    pub knowledge: f64,
    pub willingness: f64,
}

impl Proficiency {
    /// Combined suitability score on the same 0..10 scale as the inputs.
    pub fn combined(&self) -> f64 {
        0.6 * self.knowledge + 0.4 * self.willingness
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Teacher {
    pub id: TeacherId,
    pub max_sessions_per_week: u32,
    pub min_sessions_per_week: u32,
    #[serde(default)]
    pub preference: TimePreference,
    #[serde(default)]
    pub proficiency: HashMap<SubjectId, Proficiency>,
}

impl Teacher {
    pub fn proficiency_for(&self, subject: &SubjectId) -> Option<f64> {
        self.proficiency.get(subject).map(|p| p.combined())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub division: DivisionId,
    pub year: u8,
    #[serde(default)]
    pub kind: SubjectKind,
    pub sessions_per_week: u32,
    #[serde(default)]
    pub needs: Vec<Equip>,
    /// `None` = the whole division attends; `Some` = a single batch section.
    #[serde(default)]
    pub batch: Option<BatchId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub capacity: u32,
    #[serde(default)]
    pub equip: Vec<Equip>,
    #[serde(default)]
    pub is_lab: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Division {
    pub id: DivisionId,
    pub year: u8,
    pub batch_count: u8,
}

pub const DEFAULT_BATCH_COUNT: u8 = 3;

/// Immutable snapshot of the institution's resources, read-only during a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Catalog {
    pub teachers: Vec<Teacher>,
    pub subjects: Vec<Subject>,
    pub rooms: Vec<Room>,
    pub timeslots: Vec<TimeSlot>,
    pub divisions: Vec<Division>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecessWindow {
    pub start_min: u16,
    pub end_min: u16,
}

impl Default for RecessWindow {
    fn default() -> Self {
        Self {
            start_min: 12 * 60,
            end_min: 13 * 60,
        }
    }
}

impl RecessWindow {
    pub fn covers(&self, slot: &TimeSlot) -> bool {
        slot.start_min < self.end_min && slot.end_min > self.start_min
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct RoomPool {
    #[serde(default)]
    pub lecture_rooms: Vec<RoomId>,
    #[serde(default)]
    pub labs: Vec<RoomId>,
}

/// Per-category penalty weights and their thresholds.
///
/// Defaults preserve the ordering hard conflicts > recess/cross-partition >
/// structural blocks > session counts > fit > fairness. Exact magnitudes are
/// tunable; the ordering is the contract.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WeightTable {
    pub teacher_conflict: i64,
    pub room_conflict: i64,
    pub batch_conflict: i64,
    pub cross_partition: i64,
    pub recess: i64,
    pub session_deficit: i64,
    pub session_surplus: i64,
    pub lab_continuity: i64,
    pub project_block: i64,
    /// Per point of combined proficiency below `proficiency_floor`.
    pub proficiency_shortfall: i64,
    /// Credited per gene whose teacher scores at/above `proficiency_ceiling`.
    pub proficiency_bonus: i64,
    pub proficiency_floor: f64,
    pub proficiency_ceiling: f64,
    pub preference: i64,
    /// Per session beyond `workload_tolerance` from the mean load.
    pub workload: i64,
    pub workload_tolerance: u32,
    /// Per percentage point of morning share outside 50% ± `daypart_band_pp`.
    pub daypart: i64,
    pub daypart_band_pp: u32,
    pub gap: i64,
}

impl Default for WeightTable {
    fn default() -> Self {
        Self {
            teacher_conflict: 95,
            room_conflict: 85,
            batch_conflict: 90,
            cross_partition: 35,
            recess: 150,
            session_deficit: 40,
            session_surplus: 15,
            lab_continuity: 60,
            project_block: 70,
            proficiency_shortfall: 8,
            proficiency_bonus: 2,
            proficiency_floor: 6.0,
            proficiency_ceiling: 8.0,
            preference: 25,
            workload: 10,
            workload_tolerance: 3,
            daypart: 3,
            daypart_band_pp: 20,
            gap: 2,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureFlags {
    pub workload_balance: bool,
    pub daypart_balance: bool,
    pub cross_partition: bool,
    pub gap_penalty: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            workload_balance: true,
            daypart_balance: true,
            cross_partition: true,
            gap_penalty: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub recess_window: RecessWindow,
    /// Empty map means every teacher is eligible for every year.
    #[serde(default)]
    pub teacher_pool_per_year: HashMap<u8, Vec<TeacherId>>,
    /// Empty map means pools are derived from `Room::is_lab` over the catalog.
    #[serde(default)]
    pub room_pool_per_year: HashMap<u8, RoomPool>,
    #[serde(default)]
    pub division_batch_counts: HashMap<DivisionId, u8>,
    #[serde(default)]
    pub project_half_days_per_year: u32,
    #[serde(default)]
    pub remedial_lectures_per_year: u32,
    #[serde(default)]
    pub weights: WeightTable,
    #[serde(default)]
    pub features: FeatureFlags,
}

impl EngineConfig {
    pub fn batch_count_for(&self, division: &Division) -> u8 {
        self.division_batch_counts
            .get(&division.id)
            .copied()
            .unwrap_or(division.batch_count)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SolveParams {
    pub population_size: usize,
    pub max_generations: u32,
    pub mutation_rate: f64,
    pub tournament_size: usize,
    pub elite_count: usize,
    /// Best fitness at or above this value terminates the search early.
    pub acceptance_threshold: i64,
    /// Bounded placement attempts before the random fallback kicks in.
    pub max_placement_attempts: u32,
    pub seed: u64,
    #[serde(default)]
    pub time_limit_ms: Option<u64>,
}

impl Default for SolveParams {
    fn default() -> Self {
        Self {
            population_size: 60,
            max_generations: 150,
            mutation_rate: 0.2,
            tournament_size: 3,
            elite_count: 4,
            acceptance_threshold: -10,
            max_placement_attempts: 40,
            seed: 0,
            time_limit_ms: None,
        }
    }
}

impl SolveParams {
    pub fn validate(&self) -> Result<(), String> {
        if self.population_size < 2 {
            return Err("population_size must be at least 2".into());
        }
        if self.max_generations == 0 {
            return Err("max_generations must be at least 1".into());
        }
        if self.elite_count >= self.population_size {
            return Err("elite_count must leave room for offspring".into());
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err("mutation_rate must be within 0..=1".into());
        }
        if self.tournament_size == 0 {
            return Err("tournament_size must be at least 1".into());
        }
        Ok(())
    }
}

/// How a search ended; callers weigh the result differently in each case.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    Converged,
    BudgetExhausted,
}

/// One atomic session assignment.
///
/// `teacher` is `None` exactly for project-work genes: independent study
/// consumes no staff resource.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Gene {
    pub subject: SubjectId,
    pub teacher: Option<TeacherId>,
    pub room: RoomId,
    pub slot: SlotId,
    pub batch: Option<BatchId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_preserve_severity_ordering() {
        let w = WeightTable::default();
        assert!(w.recess > w.teacher_conflict);
        assert!(w.teacher_conflict > w.batch_conflict || w.teacher_conflict == w.batch_conflict);
        assert!(w.batch_conflict > w.cross_partition);
        assert!(w.room_conflict > w.project_block);
        assert!(w.project_block > w.session_deficit);
        assert!(w.session_deficit > w.session_surplus);
        assert!(w.lab_continuity > w.preference);
        assert!(w.preference > w.daypart);
        assert!(w.daypart >= w.gap);
    }

    #[test]
    fn recess_window_covers_overlapping_slot() {
        let w = RecessWindow::default();
        let slot = TimeSlot {
            id: SlotId("mon.4".into()),
            day: DayOfWeek::Mon,
            index: 4,
            start_min: 12 * 60 + 30,
            end_min: 13 * 60 + 30,
            is_recess: false,
        };
        assert!(w.covers(&slot));
        let morning = TimeSlot {
            id: SlotId("mon.0".into()),
            day: DayOfWeek::Mon,
            index: 0,
            start_min: 9 * 60,
            end_min: 10 * 60,
            is_recess: false,
        };
        assert!(!w.covers(&morning));
    }

    #[test]
    fn combined_proficiency_weights_knowledge_higher() {
        let p = Proficiency {
            knowledge: 10.0,
            willingness: 0.0,
        };
        assert!((p.combined() - 6.0).abs() < 1e-9);
        let q = Proficiency {
            knowledge: 0.0,
            willingness: 10.0,
        };
        assert!((q.combined() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn solve_params_validation() {
        assert!(SolveParams::default().validate().is_ok());
        let mut p = SolveParams::default();
        p.population_size = 1;
        assert!(p.validate().is_err());
        let mut p = SolveParams::default();
        p.elite_count = p.population_size;
        assert!(p.validate().is_err());
        let mut p = SolveParams::default();
        p.mutation_rate = 1.5;
        assert!(p.validate().is_err());
    }

    #[test]
    fn config_round_trips_through_json() {
        let mut config = EngineConfig::default();
        config
            .teacher_pool_per_year
            .insert(1, vec![TeacherId("t1".into())]);
        config
            .division_batch_counts
            .insert(DivisionId("d1".into()), 4);

        let text = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.weights, config.weights);
        assert_eq!(back.teacher_pool_per_year, config.teacher_pool_per_year);
        assert_eq!(back.division_batch_counts, config.division_batch_counts);
    }

    #[test]
    fn project_gene_serializes_with_null_teacher() {
        let gene = Gene {
            subject: SubjectId("proj".into()),
            teacher: None,
            room: RoomId("r1".into()),
            slot: SlotId("mon.0".into()),
            batch: None,
        };
        let value = serde_json::to_value(&gene).unwrap();
        assert!(value["teacher"].is_null());
    }

    #[test]
    fn subject_kind_blocks() {
        assert_eq!(SubjectKind::Lab.block_len(), Some(2));
        assert_eq!(SubjectKind::Project.block_len(), Some(4));
        assert_eq!(SubjectKind::Lecture.block_len(), None);
        assert!(SubjectKind::Project.is_teacherless());
        assert!(!SubjectKind::Lab.is_teacherless());
    }
}
