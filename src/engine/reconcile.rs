//! Pure reconciliation planning. Nothing here touches the store; the
//! functions compute the minimal set of patches and the engine applies them.

use serde_json::{Value, json};

use crate::model::{DocId, Farm, Room, Worker};

/// Replacement occupant list and count for one drifted room.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomPatch {
    pub room_id: DocId,
    pub occupants: Vec<DocId>,
    pub occupant_count: u32,
}

impl RoomPatch {
    pub fn to_value(&self) -> Value {
        json!({ "occupants": self.occupants, "occupant_count": self.occupant_count })
    }
}

/// Recomputed aggregate caches for one farm.
#[derive(Debug, Clone, PartialEq)]
pub struct FarmPatch {
    pub farm_id: DocId,
    pub total_workers: u32,
    pub total_rooms: u32,
}

impl FarmPatch {
    pub fn to_value(&self) -> Value {
        json!({ "total_workers": self.total_workers, "total_rooms": self.total_rooms })
    }
}

/// For every room, keep only occupants that reference an active worker of
/// matching gender, preserving list order. A patch is emitted when the
/// filtered list differs from the stored one, or when the stored counter
/// disagrees with the list length. Idempotent: planning right after
/// applying the patches yields nothing.
///
/// Removal-only on purpose: a worker whose `room` field points here but who
/// is missing from the list is not added back — that write belongs to the
/// mutation path.
pub fn plan_room_repairs(workers: &[Worker], rooms: &[Room]) -> Vec<RoomPatch> {
    rooms
        .iter()
        .filter_map(|room| {
            let valid: Vec<DocId> = room
                .occupants
                .iter()
                .filter(|occupant| {
                    workers.iter().any(|w| {
                        w.id == **occupant && w.is_active() && room.gender.admits(w.gender)
                    })
                })
                .cloned()
                .collect();
            let drifted = valid.len() != room.occupants.len()
                || room.occupant_count as usize != valid.len();
            drifted.then(|| RoomPatch {
                room_id: room.id.clone(),
                occupant_count: valid.len() as u32,
                occupants: valid,
            })
        })
        .collect()
}

/// Workers with a set exit date still marked active. Each returned id gets
/// a `status = inactive` patch.
pub fn plan_status_fixes(workers: &[Worker]) -> Vec<DocId> {
    workers
        .iter()
        .filter(|w| w.has_exit() && w.is_active())
        .map(|w| w.id.clone())
        .collect()
}

/// Farms whose cached totals no longer match the actual active-worker and
/// room counts.
pub fn plan_farm_repairs(workers: &[Worker], rooms: &[Room], farms: &[Farm]) -> Vec<FarmPatch> {
    farms
        .iter()
        .filter_map(|farm| {
            let active = workers
                .iter()
                .filter(|w| w.farm_id == farm.id && w.is_active())
                .count() as u32;
            let room_count = rooms.iter().filter(|r| r.farm_id == farm.id).count() as u32;
            (farm.total_workers != active || farm.total_rooms != room_count).then(|| FarmPatch {
                farm_id: farm.id.clone(),
                total_workers: active,
                total_rooms: room_count,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Gender, GenderRestriction, WorkerStatus, new_doc_id};

    fn worker(id: &str, gender: Gender, status: WorkerStatus) -> Worker {
        Worker {
            id: id.into(),
            name: format!("worker {id}"),
            cin: format!("CIN{id}"),
            phone: String::new(),
            gender,
            age: 25,
            year_of_birth: None,
            farm_id: "farm-1".into(),
            room: "101".into(),
            sector: String::new(),
            entry_date: "2024-01-01".into(),
            exit_date: None,
            exit_reason: None,
            status,
        }
    }

    fn room(occupants: &[&str], count: u32) -> Room {
        Room {
            id: new_doc_id(),
            number: "101".into(),
            farm_id: "farm-1".into(),
            gender: GenderRestriction::MaleOnly,
            capacity: 4,
            occupant_count: count,
            occupants: occupants.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn farm(total_workers: u32, total_rooms: u32) -> Farm {
        Farm {
            id: "farm-1".into(),
            name: "Ferme Nord".into(),
            total_workers,
            total_rooms,
            admins: vec![],
        }
    }

    #[test]
    fn clean_room_is_untouched() {
        let workers = vec![worker("a", Gender::Male, WorkerStatus::Active)];
        let rooms = vec![room(&["a"], 1)];
        assert!(plan_room_repairs(&workers, &rooms).is_empty());
    }

    #[test]
    fn inactive_occupant_is_dropped() {
        let workers = vec![
            worker("a", Gender::Male, WorkerStatus::Active),
            worker("b", Gender::Male, WorkerStatus::Inactive),
        ];
        let rooms = vec![room(&["a", "b"], 2)];
        let patches = plan_room_repairs(&workers, &rooms);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].occupants, vec!["a".to_string()]);
        assert_eq!(patches[0].occupant_count, 1);
    }

    #[test]
    fn gender_mismatched_occupant_is_dropped() {
        let workers = vec![worker("f", Gender::Female, WorkerStatus::Active)];
        let rooms = vec![room(&["f"], 1)]; // male-only room
        let patches = plan_room_repairs(&workers, &rooms);
        assert_eq!(patches[0].occupants, Vec::<DocId>::new());
        assert_eq!(patches[0].occupant_count, 0);
    }

    #[test]
    fn unknown_id_is_dropped() {
        // Legacy rows holding a CIN instead of an id resolve to no worker
        let workers = vec![worker("a", Gender::Male, WorkerStatus::Active)];
        let rooms = vec![room(&["a", "CINxyz"], 2)];
        let patches = plan_room_repairs(&workers, &rooms);
        assert_eq!(patches[0].occupants, vec!["a".to_string()]);
    }

    #[test]
    fn count_only_drift_is_patched() {
        let workers = vec![worker("a", Gender::Male, WorkerStatus::Active)];
        let rooms = vec![room(&["a"], 3)]; // list fine, counter stale
        let patches = plan_room_repairs(&workers, &rooms);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].occupants, vec!["a".to_string()]);
        assert_eq!(patches[0].occupant_count, 1);
    }

    #[test]
    fn order_is_preserved() {
        let workers = vec![
            worker("a", Gender::Male, WorkerStatus::Active),
            worker("b", Gender::Male, WorkerStatus::Inactive),
            worker("c", Gender::Male, WorkerStatus::Active),
        ];
        let rooms = vec![room(&["c", "b", "a"], 3)];
        let patches = plan_room_repairs(&workers, &rooms);
        assert_eq!(patches[0].occupants, vec!["c".to_string(), "a".to_string()]);
    }

    #[test]
    fn planning_is_idempotent() {
        let workers = vec![
            worker("a", Gender::Male, WorkerStatus::Active),
            worker("b", Gender::Male, WorkerStatus::Inactive),
        ];
        let mut rooms = vec![room(&["a", "b"], 2)];

        let patches = plan_room_repairs(&workers, &rooms);
        assert_eq!(patches.len(), 1);
        rooms[0].occupants = patches[0].occupants.clone();
        rooms[0].occupant_count = patches[0].occupant_count;

        assert!(plan_room_repairs(&workers, &rooms).is_empty());
    }

    #[test]
    fn status_fixes_target_exited_actives_only() {
        let mut exited_active = worker("a", Gender::Male, WorkerStatus::Active);
        exited_active.exit_date = Some("2024-01-10".into());
        let mut exited_inactive = worker("b", Gender::Male, WorkerStatus::Inactive);
        exited_inactive.exit_date = Some("2024-01-10".into());
        let mut empty_exit = worker("c", Gender::Male, WorkerStatus::Active);
        empty_exit.exit_date = Some(String::new());

        let fixes = plan_status_fixes(&[exited_active, exited_inactive, empty_exit]);
        assert_eq!(fixes, vec!["a".to_string()]);
    }

    #[test]
    fn farm_totals_recomputed_when_stale() {
        let workers = vec![
            worker("a", Gender::Male, WorkerStatus::Active),
            worker("b", Gender::Male, WorkerStatus::Inactive),
        ];
        let rooms = vec![room(&["a"], 1)];
        let farms = vec![farm(5, 0)]; // both totals stale

        let patches = plan_farm_repairs(&workers, &rooms, &farms);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].total_workers, 1);
        assert_eq!(patches[0].total_rooms, 1);

        let farms = vec![farm(1, 1)];
        assert!(plan_farm_repairs(&workers, &rooms, &farms).is_empty());
    }
}
