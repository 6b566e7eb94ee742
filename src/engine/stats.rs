//! Dashboard aggregates and availability queries, computed from a fresh
//! snapshot rather than the denormalized farm caches.

use crate::model::{DashboardStats, Gender, Room, Worker};

use super::{Engine, EngineError};

/// Averages ignore inactive workers and round to whole years.
fn average_age(workers: &[&Worker], gender: Gender) -> u32 {
    let ages: Vec<u32> = workers
        .iter()
        .filter(|w| w.gender == gender)
        .map(|w| w.age)
        .collect();
    if ages.is_empty() {
        return 0;
    }
    let sum: u64 = ages.iter().map(|a| u64::from(*a)).sum();
    (sum as f64 / ages.len() as f64).round() as u32
}

pub(super) fn compute_stats(workers: &[Worker], rooms: &[Room]) -> DashboardStats {
    let active: Vec<&Worker> = workers.iter().filter(|w| w.is_active()).collect();
    DashboardStats {
        total_workers: workers.len() as u32,
        active_workers: active.len() as u32,
        male_workers: active.iter().filter(|w| w.gender == Gender::Male).count() as u32,
        female_workers: active.iter().filter(|w| w.gender == Gender::Female).count() as u32,
        total_rooms: rooms.len() as u32,
        occupied_rooms: rooms.iter().filter(|r| r.occupant_count > 0).count() as u32,
        free_places: rooms.iter().map(Room::free_places).sum(),
        average_age_men: average_age(&active, Gender::Male),
        average_age_women: average_age(&active, Gender::Female),
    }
}

/// Room numbers are strings but sort numerically on the dashboard;
/// non-numeric numbers sort last, in input order.
fn number_key(room: &Room) -> u32 {
    room.number.parse().unwrap_or(u32::MAX)
}

impl Engine {
    /// Site-wide or per-farm dashboard figures.
    pub async fn dashboard_stats(&self, farm_id: Option<&str>) -> Result<DashboardStats, EngineError> {
        let mut snap = self.load().await?;
        if let Some(farm_id) = farm_id {
            snap.workers.retain(|w| w.farm_id == farm_id);
            snap.rooms.retain(|r| r.farm_id == farm_id);
        }
        Ok(compute_stats(&snap.workers, &snap.rooms))
    }

    /// Rooms of one farm that admit `gender` and still have free places,
    /// sorted by room number.
    pub async fn available_rooms(
        &self,
        farm_id: &str,
        gender: Gender,
    ) -> Result<Vec<Room>, EngineError> {
        let snap = self.load().await?;
        let mut rooms: Vec<Room> = snap
            .rooms
            .into_iter()
            .filter(|r| r.farm_id == farm_id && r.gender.admits(gender) && !r.is_full())
            .collect();
        rooms.sort_by_key(number_key);
        Ok(rooms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GenderRestriction, WorkerStatus, new_doc_id};

    fn worker(gender: Gender, status: WorkerStatus, age: u32) -> Worker {
        Worker {
            id: new_doc_id(),
            name: "Ahmed Alami".into(),
            cin: "AA123456".into(),
            phone: String::new(),
            gender,
            age,
            year_of_birth: None,
            farm_id: "farm-1".into(),
            room: String::new(),
            sector: String::new(),
            entry_date: "2024-01-01".into(),
            exit_date: None,
            exit_reason: None,
            status,
        }
    }

    fn room(number: &str, capacity: u32, count: u32) -> Room {
        Room {
            id: new_doc_id(),
            number: number.into(),
            farm_id: "farm-1".into(),
            gender: GenderRestriction::MaleOnly,
            capacity,
            occupant_count: count,
            occupants: vec![],
        }
    }

    #[test]
    fn stats_count_active_only_by_gender() {
        let workers = vec![
            worker(Gender::Male, WorkerStatus::Active, 30),
            worker(Gender::Male, WorkerStatus::Inactive, 50),
            worker(Gender::Female, WorkerStatus::Active, 24),
        ];
        let rooms = vec![room("101", 4, 2), room("102", 4, 0)];

        let stats = compute_stats(&workers, &rooms);
        assert_eq!(stats.total_workers, 3);
        assert_eq!(stats.active_workers, 2);
        assert_eq!(stats.male_workers, 1);
        assert_eq!(stats.female_workers, 1);
        assert_eq!(stats.occupied_rooms, 1);
        assert_eq!(stats.free_places, 6);
        // inactive 50-year-old excluded from the male average
        assert_eq!(stats.average_age_men, 30);
        assert_eq!(stats.average_age_women, 24);
    }

    #[test]
    fn averages_round_and_tolerate_empty_groups() {
        let workers = vec![
            worker(Gender::Male, WorkerStatus::Active, 30),
            worker(Gender::Male, WorkerStatus::Active, 25),
        ];
        let stats = compute_stats(&workers, &[]);
        assert_eq!(stats.average_age_men, 28); // 27.5 rounds up
        assert_eq!(stats.average_age_women, 0);
    }

    #[test]
    fn over_capacity_room_contributes_no_free_places() {
        let rooms = vec![room("101", 2, 3)];
        let stats = compute_stats(&[], &rooms);
        assert_eq!(stats.free_places, 0);
    }

    #[test]
    fn room_numbers_sort_numerically() {
        let mut rooms = vec![room("12", 4, 0), room("2", 4, 0), room("annexe", 4, 0)];
        rooms.sort_by_key(number_key);
        let numbers: Vec<&str> = rooms.iter().map(|r| r.number.as_str()).collect();
        assert_eq!(numbers, vec!["2", "12", "annexe"]);
    }
}
