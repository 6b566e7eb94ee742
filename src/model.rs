use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Opaque document identifier. New documents get ULID strings; anything a
/// hosted store hands back (including legacy ids) is accepted as-is.
pub type DocId = String;

pub fn new_doc_id() -> DocId {
    Ulid::new().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gender::Male => write!(f, "male"),
            Gender::Female => write!(f, "female"),
        }
    }
}

/// Room gender restriction. Distinct from [`Gender`] on purpose: a room is
/// not "male", it is "male-only".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenderRestriction {
    #[serde(rename = "male-only")]
    MaleOnly,
    #[serde(rename = "female-only")]
    FemaleOnly,
}

impl GenderRestriction {
    pub fn admits(&self, gender: Gender) -> bool {
        matches!(
            (self, gender),
            (GenderRestriction::MaleOnly, Gender::Male)
                | (GenderRestriction::FemaleOnly, Gender::Female)
        )
    }
}

impl std::fmt::Display for GenderRestriction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenderRestriction::MaleOnly => write!(f, "male-only"),
            GenderRestriction::FemaleOnly => write!(f, "female-only"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Active,
    Inactive,
}

/// A tracked worker ("ouvrier"). `room` holds a room number within the
/// worker's farm, empty string meaning unassigned — the inverse side of the
/// relation lives in [`Room::occupants`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: DocId,
    pub name: String,
    /// National-id string (CIN). Historical room rows sometimes stored this
    /// instead of the document id.
    pub cin: String,
    #[serde(default)]
    pub phone: String,
    pub gender: Gender,
    pub age: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_of_birth: Option<i32>,
    pub farm_id: DocId,
    #[serde(default)]
    pub room: String,
    #[serde(default)]
    pub sector: String,
    /// `YYYY-MM-DD`.
    pub entry_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_reason: Option<String>,
    pub status: WorkerStatus,
}

impl Worker {
    pub fn is_active(&self) -> bool {
        self.status == WorkerStatus::Active
    }

    /// An exit date is "set" only when non-empty — legacy documents carry
    /// empty strings where today we would omit the field.
    pub fn has_exit(&self) -> bool {
        self.exit_date.as_deref().is_some_and(|d| !d.is_empty())
    }

    /// Active and assigned to a room — the only state that counts toward
    /// room occupancy.
    pub fn is_housed(&self) -> bool {
        self.is_active() && !self.room.is_empty()
    }

    /// Restore the document invariants before any write: age follows the
    /// year of birth when known, and a set exit date forces inactive.
    pub fn normalize(&mut self) {
        if let Some(year) = self.year_of_birth {
            self.age = age_from_year(year);
        }
        if self.has_exit() {
            self.status = WorkerStatus::Inactive;
        }
    }
}

pub fn age_from_year(year_of_birth: i32) -> u32 {
    (Utc::now().year() - year_of_birth).max(0) as u32
}

pub fn valid_date(s: &str) -> bool {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

/// A gender-restricted housing unit ("chambre") belonging to one farm.
/// `occupant_count` is redundant with `occupants.len()` by design; the
/// reconciler repairs them when they drift apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: DocId,
    pub number: String,
    pub farm_id: DocId,
    pub gender: GenderRestriction,
    pub capacity: u32,
    #[serde(default)]
    pub occupant_count: u32,
    #[serde(default)]
    pub occupants: Vec<DocId>,
}

impl Room {
    /// Whether this worker may be assigned here: same farm, matching gender.
    /// Capacity is deliberately not part of the check.
    pub fn accepts(&self, worker: &Worker) -> bool {
        self.farm_id == worker.farm_id && self.gender.admits(worker.gender)
    }

    /// Advisory only — over-capacity assignment is permitted to proceed.
    pub fn is_full(&self) -> bool {
        self.occupant_count >= self.capacity
    }

    pub fn free_places(&self) -> u32 {
        self.capacity.saturating_sub(self.occupant_count)
    }
}

/// Top-level site ("ferme") owning rooms and workers. The totals are
/// denormalized caches, periodically recomputed rather than maintained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Farm {
    pub id: DocId,
    pub name: String,
    #[serde(default)]
    pub total_workers: u32,
    #[serde(default)]
    pub total_rooms: u32,
    #[serde(default)]
    pub admins: Vec<DocId>,
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_workers: u32,
    pub active_workers: u32,
    pub male_workers: u32,
    pub female_workers: u32,
    pub total_rooms: u32,
    pub occupied_rooms: u32,
    pub free_places: u32,
    pub average_age_men: u32,
    pub average_age_women: u32,
}
