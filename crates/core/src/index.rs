use std::collections::HashMap;

use types::{
    Catalog, Division, DivisionId, EngineConfig, Room, RoomId, SlotId, Subject, SubjectId,
    SubjectKind, Teacher, TeacherId, TimeSlot,
};

/// Lookup tables over an immutable catalog snapshot, built once per solve.
pub struct CatalogIndex<'a> {
    pub catalog: &'a Catalog,
    pub config: &'a EngineConfig,
    slots: Vec<&'a TimeSlot>,
    slot_by_id: HashMap<&'a str, &'a TimeSlot>,
    teacher_by_id: HashMap<&'a str, &'a Teacher>,
    subject_by_id: HashMap<&'a str, &'a Subject>,
    room_by_id: HashMap<&'a str, &'a Room>,
    division_by_id: HashMap<&'a str, &'a Division>,
}

impl<'a> CatalogIndex<'a> {
    pub fn new(catalog: &'a Catalog, config: &'a EngineConfig) -> Self {
        let mut slots: Vec<&TimeSlot> = catalog.timeslots.iter().collect();
        slots.sort_by_key(|s| (s.day, s.index));

        let slot_by_id = catalog
            .timeslots
            .iter()
            .map(|s| (s.id.0.as_str(), s))
            .collect();
        let teacher_by_id = catalog
            .teachers
            .iter()
            .map(|t| (t.id.0.as_str(), t))
            .collect();
        let subject_by_id = catalog
            .subjects
            .iter()
            .map(|s| (s.id.0.as_str(), s))
            .collect();
        let room_by_id = catalog.rooms.iter().map(|r| (r.id.0.as_str(), r)).collect();
        let division_by_id = catalog
            .divisions
            .iter()
            .map(|d| (d.id.0.as_str(), d))
            .collect();

        Self {
            catalog,
            config,
            slots,
            slot_by_id,
            teacher_by_id,
            subject_by_id,
            room_by_id,
            division_by_id,
        }
    }

    pub fn slot(&self, id: &SlotId) -> Option<&'a TimeSlot> {
        self.slot_by_id.get(id.0.as_str()).copied()
    }

    pub fn teacher(&self, id: &TeacherId) -> Option<&'a Teacher> {
        self.teacher_by_id.get(id.0.as_str()).copied()
    }

    pub fn subject(&self, id: &SubjectId) -> Option<&'a Subject> {
        self.subject_by_id.get(id.0.as_str()).copied()
    }

    pub fn room(&self, id: &RoomId) -> Option<&'a Room> {
        self.room_by_id.get(id.0.as_str()).copied()
    }

    pub fn division(&self, id: &DivisionId) -> Option<&'a Division> {
        self.division_by_id.get(id.0.as_str()).copied()
    }

    /// All timeslots sorted by (day, index).
    pub fn slots(&self) -> &[&'a TimeSlot] {
        &self.slots
    }

    pub fn is_recess(&self, slot: &TimeSlot) -> bool {
        slot.is_recess || self.config.recess_window.covers(slot)
    }

    /// Morning means the slot starts before the institutional midday break.
    pub fn is_morning(&self, slot: &TimeSlot) -> bool {
        slot.start_min < self.config.recess_window.start_min
    }

    pub fn contiguous(&self, a: &TimeSlot, b: &TimeSlot) -> bool {
        a.day == b.day && b.index == a.index + 1
    }

    /// Non-recess slots, the pool every placement draws from.
    pub fn teachable_slots(&self) -> Vec<&'a TimeSlot> {
        self.slots
            .iter()
            .copied()
            .filter(|s| !self.is_recess(s))
            .collect()
    }

    /// Contiguous non-recess runs of exactly `len` slots within one day.
    pub fn contiguous_blocks(&self, len: usize) -> Vec<Vec<&'a TimeSlot>> {
        let usable = self.teachable_slots();
        let mut blocks = Vec::new();
        if len == 0 || usable.len() < len {
            return blocks;
        }
        for window in usable.windows(len) {
            let ok = window
                .windows(2)
                .all(|pair| self.contiguous(pair[0], pair[1]));
            if ok {
                blocks.push(window.to_vec());
            }
        }
        blocks
    }

    /// Teachers eligible for a year. An absent or empty pool entry means the
    /// whole staff is eligible.
    pub fn teacher_pool(&self, year: u8) -> Vec<&'a Teacher> {
        match self.config.teacher_pool_per_year.get(&year) {
            Some(ids) if !ids.is_empty() => ids
                .iter()
                .filter_map(|id| self.teacher(id))
                .collect(),
            _ => self.catalog.teachers.iter().collect(),
        }
    }

    pub fn room_pool(&self, year: u8, kind: SubjectKind) -> Vec<&'a Room> {
        let wants_lab = matches!(kind, SubjectKind::Lab);
        match self.config.room_pool_per_year.get(&year) {
            Some(pool) => {
                let ids = if wants_lab {
                    &pool.labs
                } else {
                    &pool.lecture_rooms
                };
                if ids.is_empty() {
                    self.rooms_by_flag(wants_lab)
                } else {
                    ids.iter().filter_map(|id| self.room(id)).collect()
                }
            }
            None => self.rooms_by_flag(wants_lab),
        }
    }

    fn rooms_by_flag(&self, wants_lab: bool) -> Vec<&'a Room> {
        self.catalog
            .rooms
            .iter()
            .filter(|r| r.is_lab == wants_lab)
            .collect()
    }

    pub fn subjects_in(&self, divisions: &[DivisionId]) -> Vec<&'a Subject> {
        self.catalog
            .subjects
            .iter()
            .filter(|s| divisions.contains(&s.division))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{DayOfWeek, RecessWindow, SlotId};

    fn slot(day: DayOfWeek, index: u32, start: u16) -> TimeSlot {
        TimeSlot {
            id: SlotId(format!("{:?}.{}", day, index).to_lowercase()),
            day,
            index,
            start_min: start,
            end_min: start + 60,
            is_recess: false,
        }
    }

    fn catalog() -> Catalog {
        Catalog {
            teachers: vec![],
            subjects: vec![],
            rooms: vec![],
            timeslots: vec![
                slot(DayOfWeek::Mon, 0, 9 * 60),
                slot(DayOfWeek::Mon, 1, 10 * 60),
                slot(DayOfWeek::Mon, 2, 11 * 60),
                // recess occupies ordinal 3, so the afternoon resumes at 4
                slot(DayOfWeek::Mon, 4, 13 * 60),
                slot(DayOfWeek::Tue, 0, 9 * 60),
                slot(DayOfWeek::Tue, 1, 10 * 60),
            ],
            divisions: vec![],
        }
    }

    #[test]
    fn blocks_never_span_days() {
        let cat = catalog();
        let cfg = EngineConfig::default();
        let idx = CatalogIndex::new(&cat, &cfg);

        let pairs = idx.contiguous_blocks(2);
        for b in &pairs {
            assert_eq!(b[0].day, b[1].day);
            assert_eq!(b[1].index, b[0].index + 1);
        }
        // mon 0-1, mon 1-2, tue 0-1; mon 2→4 has an index hole at recess
        assert_eq!(pairs.len(), 3);
    }

    #[test]
    fn recess_window_slot_excluded_from_teachable() {
        let mut cat = catalog();
        cat.timeslots.push(TimeSlot {
            id: SlotId("mon.break".into()),
            day: DayOfWeek::Mon,
            index: 10,
            start_min: 12 * 60,
            end_min: 13 * 60,
            is_recess: false,
        });
        let cfg = EngineConfig {
            recess_window: RecessWindow {
                start_min: 12 * 60,
                end_min: 13 * 60,
            },
            ..Default::default()
        };
        let idx = CatalogIndex::new(&cat, &cfg);
        assert!(idx
            .teachable_slots()
            .iter()
            .all(|s| s.id.0 != "mon.break"));
    }

    #[test]
    fn morning_split_follows_recess_start() {
        let cat = catalog();
        let cfg = EngineConfig::default();
        let idx = CatalogIndex::new(&cat, &cfg);
        let morning = idx.slot(&SlotId("mon.0".into())).unwrap();
        let afternoon = idx.slot(&SlotId("mon.4".into())).unwrap();
        assert!(idx.is_morning(morning));
        assert!(!idx.is_morning(afternoon));
    }
}
