mod error;
mod mutations;
mod reconcile;
mod stats;

pub use error::EngineError;
pub use mutations::{BulkReport, MutationOutcome};
pub use reconcile::{
    FarmPatch, RoomPatch, plan_farm_repairs, plan_room_repairs, plan_status_fixes,
};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{info, warn};

use crate::model::{Farm, Room, Worker, WorkerStatus};
use crate::observability::{
    BATCH_WRITES, FARMS_PATCHED_TOTAL, ROOMS_PATCHED_TOTAL, STATUS_FIXES_TOTAL,
    SWEEPS_SKIPPED_TOTAL, SWEEPS_TOTAL,
};
use crate::store::{DocumentStore, FARMS, ROOMS, WORKERS, WriteOp};

/// The loaded view of all three collections — what the orchestrator and the
/// repair sweep see. Reloaded from the store at the start of each operation;
/// never mutated in place.
pub struct Snapshot {
    pub workers: Vec<Worker>,
    pub rooms: Vec<Room>,
    pub farms: Vec<Farm>,
}

impl Snapshot {
    pub fn find_worker(&self, id: &str) -> Option<&Worker> {
        self.workers.iter().find(|w| w.id == id)
    }

    /// Rooms are addressed by (farm, number) — the number is only unique
    /// within one farm.
    pub fn find_room(&self, farm_id: &str, number: &str) -> Option<&Room> {
        self.rooms
            .iter()
            .find(|r| r.farm_id == farm_id && r.number == number)
    }

    pub fn find_farm(&self, id: &str) -> Option<&Farm> {
        self.farms.iter().find(|f| f.id == id)
    }
}

/// What a repair pass changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RepairReport {
    pub rooms_patched: usize,
    pub farms_patched: usize,
}

/// Orchestrates every worker-affecting write so that the worker document,
/// the touched room documents, and the farm aggregate land in one atomic
/// batch — and runs the reconciliation pass that repairs whatever drift
/// slips through anyway.
pub struct Engine {
    store: Arc<dyn DocumentStore>,
    /// Collapses re-entrant repair sweeps; not a cancellation token.
    sweep_busy: AtomicBool,
}

impl Engine {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            sweep_busy: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub async fn load(&self) -> Result<Snapshot, EngineError> {
        Ok(Snapshot {
            workers: self.load_collection(WORKERS).await?,
            rooms: self.load_collection(ROOMS).await?,
            farms: self.load_collection(FARMS).await?,
        })
    }

    async fn load_collection<T: DeserializeOwned>(
        &self,
        collection: &'static str,
    ) -> Result<Vec<T>, EngineError> {
        let docs = self.store.get_all(collection).await?;
        docs.into_iter()
            .map(|doc| {
                serde_json::from_value(doc).map_err(|e| EngineError::Decode {
                    collection,
                    detail: e.to_string(),
                })
            })
            .collect()
    }

    pub(super) async fn commit(&self, batch: Vec<WriteOp>) -> Result<(), EngineError> {
        metrics::histogram!(BATCH_WRITES).record(batch.len() as f64);
        self.store.commit(batch).await?;
        Ok(())
    }

    /// One full repair pass: drop invalid room occupants, fix counters,
    /// recompute stale farm aggregates. Returns `None` when a sweep is
    /// already in flight (concurrent triggers collapse instead of
    /// double-submitting overlapping patches).
    pub async fn repair_now(&self) -> Result<Option<RepairReport>, EngineError> {
        if self.sweep_busy.swap(true, Ordering::SeqCst) {
            metrics::counter!(SWEEPS_SKIPPED_TOTAL).increment(1);
            return Ok(None);
        }
        let result = self.repair_pass().await;
        self.sweep_busy.store(false, Ordering::SeqCst);
        result.map(Some)
    }

    async fn repair_pass(&self) -> Result<RepairReport, EngineError> {
        let snap = self.load().await?;
        let mut report = RepairReport::default();

        for patch in plan_room_repairs(&snap.workers, &snap.rooms) {
            match self.store.update(ROOMS, &patch.room_id, patch.to_value()).await {
                Ok(()) => {
                    info!(
                        room = %patch.room_id,
                        occupants = patch.occupant_count,
                        "repaired room occupancy"
                    );
                    report.rooms_patched += 1;
                }
                // A concurrent writer may have deleted the room since the load
                Err(e) => warn!(room = %patch.room_id, "room repair failed: {e}"),
            }
        }

        for patch in plan_farm_repairs(&snap.workers, &snap.rooms, &snap.farms) {
            match self.store.update(FARMS, &patch.farm_id, patch.to_value()).await {
                Ok(()) => report.farms_patched += 1,
                Err(e) => warn!(farm = %patch.farm_id, "farm repair failed: {e}"),
            }
        }

        metrics::counter!(SWEEPS_TOTAL).increment(1);
        metrics::counter!(ROOMS_PATCHED_TOTAL).increment(report.rooms_patched as u64);
        metrics::counter!(FARMS_PATCHED_TOTAL).increment(report.farms_patched as u64);
        Ok(report)
    }

    /// Force `status = inactive` on every worker with a set exit date still
    /// marked active. Runs once per load of the worker collection; reads a
    /// stable snapshot, so no debouncing.
    pub async fn heal_statuses(&self) -> Result<usize, EngineError> {
        let workers: Vec<Worker> = self.load_collection(WORKERS).await?;
        let mut fixed = 0;
        for id in plan_status_fixes(&workers) {
            match self
                .store
                .update(WORKERS, &id, json!({ "status": WorkerStatus::Inactive }))
                .await
            {
                Ok(()) => fixed += 1,
                Err(e) => warn!(worker = %id, "status fix failed: {e}"),
            }
        }
        if fixed > 0 {
            info!(fixed, "forced inactive status on exited workers");
            metrics::counter!(STATUS_FIXES_TOTAL).increment(fixed as u64);
        }
        Ok(fixed)
    }
}
