use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;
use types::{Gene, PartitionId, RoomId, SlotId, TeacherId};

/// Cross-partition record of committed teacher/room allocations.
///
/// Created once per multi-partition run, grows monotonically as partitions
/// commit their winners, never shrinks mid-run. Always passed explicitly;
/// the runner wraps it in a lock, the evaluator only ever reads a snapshot.
#[derive(Clone, Debug, Default)]
pub struct GlobalAllocationLedger {
    teacher_slots: HashMap<(TeacherId, SlotId), Vec<PartitionId>>,
    room_slots: HashMap<(RoomId, SlotId), Vec<PartitionId>>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceRef {
    Teacher { id: TeacherId },
    Room { id: RoomId },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConflictEntry {
    pub resource: ResourceRef,
    pub slot: SlotId,
    pub partitions: Vec<PartitionId>,
}

impl GlobalAllocationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one partition's winning genes. Existing entries are never
    /// displaced; a clash shows up in `conflicts_report`, not here.
    pub fn commit(&mut self, partition: &PartitionId, genes: &[Gene]) {
        for gene in genes {
            if let Some(teacher) = &gene.teacher {
                self.teacher_slots
                    .entry((teacher.clone(), gene.slot.clone()))
                    .or_default()
                    .push(partition.clone());
            }
            self.room_slots
                .entry((gene.room.clone(), gene.slot.clone()))
                .or_default()
                .push(partition.clone());
        }
        info!(%partition, genes = genes.len(), "committed partition to ledger");
    }

    pub fn teacher_busy_elsewhere(
        &self,
        teacher: &TeacherId,
        slot: &SlotId,
        own: &PartitionId,
    ) -> bool {
        self.teacher_slots
            .get(&(teacher.clone(), slot.clone()))
            .map(|tags| tags.iter().any(|p| p != own))
            .unwrap_or(false)
    }

    pub fn room_busy_elsewhere(&self, room: &RoomId, slot: &SlotId, own: &PartitionId) -> bool {
        self.room_slots
            .get(&(room.clone(), slot.clone()))
            .map(|tags| tags.iter().any(|p| p != own))
            .unwrap_or(false)
    }

    pub fn committed_partitions(&self) -> Vec<PartitionId> {
        let mut out: Vec<PartitionId> = self
            .teacher_slots
            .values()
            .chain(self.room_slots.values())
            .flatten()
            .cloned()
            .collect();
        out.sort();
        out.dedup();
        out
    }

    pub fn is_empty(&self) -> bool {
        self.teacher_slots.is_empty() && self.room_slots.is_empty()
    }

    /// Every (resource, slot) key claimed more than once, with the claimants.
    /// Duplicate tags from a single partition are reported too: a winner that
    /// double-books internally is still a conflict the caller must see.
    pub fn conflicts_report(&self) -> Vec<ConflictEntry> {
        let mut out = Vec::new();
        for ((teacher, slot), tags) in &self.teacher_slots {
            if tags.len() > 1 {
                out.push(ConflictEntry {
                    resource: ResourceRef::Teacher {
                        id: teacher.clone(),
                    },
                    slot: slot.clone(),
                    partitions: sorted(tags),
                });
            }
        }
        for ((room, slot), tags) in &self.room_slots {
            if tags.len() > 1 {
                out.push(ConflictEntry {
                    resource: ResourceRef::Room { id: room.clone() },
                    slot: slot.clone(),
                    partitions: sorted(tags),
                });
            }
        }
        out.sort_by(|a, b| {
            let ka = match &a.resource {
                ResourceRef::Teacher { id } => (0, id.0.clone()),
                ResourceRef::Room { id } => (1, id.0.clone()),
            };
            let kb = match &b.resource {
                ResourceRef::Teacher { id } => (0, id.0.clone()),
                ResourceRef::Room { id } => (1, id.0.clone()),
            };
            ka.cmp(&kb).then_with(|| a.slot.cmp(&b.slot))
        });
        out
    }
}

fn sorted(tags: &[PartitionId]) -> Vec<PartitionId> {
    let mut v = tags.to_vec();
    v.sort();
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{BatchId, SubjectId};

    fn gene(subject: &str, teacher: Option<&str>, room: &str, slot: &str) -> Gene {
        Gene {
            subject: SubjectId(subject.into()),
            teacher: teacher.map(|t| TeacherId(t.into())),
            room: RoomId(room.into()),
            slot: SlotId(slot.into()),
            batch: Some(BatchId(0)),
        }
    }

    #[test]
    fn disjoint_commits_report_no_conflicts() {
        let mut ledger = GlobalAllocationLedger::new();
        ledger.commit(
            &PartitionId("div-a".into()),
            &[gene("s1", Some("t1"), "r1", "mon.0")],
        );
        ledger.commit(
            &PartitionId("div-b".into()),
            &[gene("s2", Some("t1"), "r1", "mon.1")],
        );
        assert!(ledger.conflicts_report().is_empty());
    }

    #[test]
    fn overlapping_teacher_commit_is_reported() {
        let mut ledger = GlobalAllocationLedger::new();
        let a = PartitionId("div-a".into());
        let b = PartitionId("div-b".into());
        ledger.commit(&a, &[gene("s1", Some("t1"), "r1", "mon.0")]);
        ledger.commit(&b, &[gene("s2", Some("t1"), "r2", "mon.0")]);

        let report = ledger.conflicts_report();
        assert_eq!(report.len(), 1);
        assert_eq!(
            report[0].resource,
            ResourceRef::Teacher {
                id: TeacherId("t1".into())
            }
        );
        assert_eq!(report[0].partitions, vec![a.clone(), b.clone()]);
    }

    #[test]
    fn busy_elsewhere_ignores_own_partition() {
        let mut ledger = GlobalAllocationLedger::new();
        let a = PartitionId("div-a".into());
        let b = PartitionId("div-b".into());
        ledger.commit(&a, &[gene("s1", Some("t1"), "r1", "mon.0")]);

        let t1 = TeacherId("t1".into());
        let slot = SlotId("mon.0".into());
        assert!(!ledger.teacher_busy_elsewhere(&t1, &slot, &a));
        assert!(ledger.teacher_busy_elsewhere(&t1, &slot, &b));
        assert!(ledger.room_busy_elsewhere(&RoomId("r1".into()), &slot, &b));
    }

    #[test]
    fn project_genes_reserve_only_the_room() {
        let mut ledger = GlobalAllocationLedger::new();
        let a = PartitionId("div-a".into());
        ledger.commit(&a, &[gene("proj", None, "r1", "mon.0")]);
        assert!(ledger.teacher_slots.is_empty());
        assert!(!ledger.room_slots.is_empty());
    }
}
