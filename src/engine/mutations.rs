use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Instant;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::limits::*;
use crate::model::{DocId, Room, Worker, new_doc_id, valid_date};
use crate::observability::{MUTATION_DURATION_SECONDS, MUTATIONS_TOTAL};
use crate::store::{FARMS, ROOMS, WORKERS, WriteOp};

use super::{Engine, EngineError};

/// Result of a single-worker operation. Warnings carry the skipped
/// sub-actions (gender mismatches) that deliberately do not fail the write.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub worker_id: DocId,
    pub warnings: Vec<String>,
}

/// Result of a bulk operation. The batch commits for the successful subset;
/// every per-record failure is enumerated here, never silently dropped.
#[derive(Debug, Clone, Default)]
pub struct BulkReport {
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

fn encode<T: serde::Serialize>(collection: &'static str, value: &T) -> Result<Value, EngineError> {
    serde_json::to_value(value).map_err(|e| EngineError::Decode {
        collection,
        detail: e.to_string(),
    })
}

/// Room patch appending one occupant.
fn assign(room: &Room, worker_id: &str) -> Value {
    let mut occupants = room.occupants.clone();
    occupants.push(worker_id.to_string());
    json!({ "occupants": occupants, "occupant_count": room.occupant_count + 1 })
}

/// Room patch for the update transition: drop the id, floor the counter at zero.
fn unassign(room: &Room, worker_id: &str) -> Value {
    let occupants: Vec<&DocId> = room.occupants.iter().filter(|o| *o != worker_id).collect();
    json!({ "occupants": occupants, "occupant_count": room.occupant_count.saturating_sub(1) })
}

/// Room patch for deletes: also strips legacy rows that stored the CIN
/// instead of the id, and clamps the counter to the surviving list length.
/// The list is authoritative when the stored counter disagrees with it.
fn unassign_deleted(room: &Room, worker: &Worker) -> Value {
    let kept: Vec<&DocId> = room
        .occupants
        .iter()
        .filter(|o| **o != worker.id && **o != worker.cin)
        .collect();
    let count = room
        .occupant_count
        .saturating_sub(1)
        .min(kept.len() as u32);
    json!({ "occupants": kept, "occupant_count": count })
}

fn op_metrics(op: &'static str, start: Instant) {
    metrics::counter!(MUTATIONS_TOTAL, "op" => op).increment(1);
    metrics::histogram!(MUTATION_DURATION_SECONDS, "op" => op).record(start.elapsed().as_secs_f64());
}

impl Engine {
    /// Persist a new worker. If the draft is active and names a room, the
    /// room's occupant list is updated in the same batch, but only when the
    /// room accepts the worker; on gender mismatch the assignment is
    /// silently skipped (permissive by design) and a warning is returned.
    pub async fn create_worker(&self, draft: Worker) -> Result<MutationOutcome, EngineError> {
        let start = Instant::now();
        let snap = self.load().await?;

        let mut worker = draft;
        worker.id = new_doc_id();
        worker.normalize();

        let mut warnings = Vec::new();
        let mut batch = vec![WriteOp::Add {
            collection: WORKERS,
            id: worker.id.clone(),
            doc: encode(WORKERS, &worker)?,
        }];

        if worker.is_housed() {
            match snap.find_room(&worker.farm_id, &worker.room) {
                Some(room) if room.accepts(&worker) => {
                    if !room.occupants.contains(&worker.id) {
                        if room.is_full() {
                            // soft capacity: assignment proceeds anyway
                            debug!(room = %room.number, "assigning into a full room");
                        }
                        batch.push(WriteOp::Update {
                            collection: ROOMS,
                            id: room.id.clone(),
                            patch: assign(room, &worker.id),
                        });
                    }
                }
                Some(room) => {
                    warn!(
                        room = %room.number,
                        worker = %worker.name,
                        "gender mismatch, skipping room assignment"
                    );
                    warnings.push(format!(
                        "room {} is {}: assignment skipped for {}",
                        room.number, room.gender, worker.name
                    ));
                }
                None => {
                    debug!(room = %worker.room, farm = %worker.farm_id, "room not found, skipping assignment");
                }
            }
        }

        self.commit(batch).await?;
        info!(worker = %worker.name, id = %worker.id, "created worker");
        op_metrics("create_worker", start);
        Ok(MutationOutcome {
            worker_id: worker.id,
            warnings,
        })
    }

    /// Persist an edit of `old` into the state described by `changes` (a
    /// full replacement document; the id is taken from `old`). A set exit
    /// date forces `inactive`. When the room assignment changed, the status
    /// transitioned, or an exit date was newly added, the affected rooms
    /// are patched in the same batch. A gender-mismatched target room
    /// clears the worker's room/sector fields instead of failing.
    pub async fn update_worker(
        &self,
        old: &Worker,
        changes: Worker,
    ) -> Result<MutationOutcome, EngineError> {
        let start = Instant::now();
        let snap = self.load().await?;

        let mut new = changes;
        new.id = old.id.clone();
        new.normalize();

        let room_changed = old.room != new.room || old.farm_id != new.farm_id;
        let status_changed = old.status != new.status;
        let exit_added = !old.has_exit() && new.has_exit();

        let mut warnings = Vec::new();
        let mut room_ops = Vec::new();

        if room_changed || status_changed || exit_added {
            // Leave the old room first
            if old.is_housed() {
                if let Some(room) = snap.find_room(&old.farm_id, &old.room) {
                    room_ops.push(WriteOp::Update {
                        collection: ROOMS,
                        id: room.id.clone(),
                        patch: unassign(room, &old.id),
                    });
                }
            }

            // Join the new room, if it will have this worker
            if new.is_housed() {
                match snap.find_room(&new.farm_id, &new.room) {
                    Some(room) if room.accepts(&new) => {
                        if !room.occupants.contains(&new.id) {
                            room_ops.push(WriteOp::Update {
                                collection: ROOMS,
                                id: room.id.clone(),
                                patch: assign(room, &new.id),
                            });
                        }
                    }
                    Some(room) => {
                        warn!(
                            room = %room.number,
                            worker = %new.name,
                            "gender mismatch, clearing room assignment"
                        );
                        warnings.push(format!(
                            "room {} is {}: cleared room assignment for {}",
                            room.number, room.gender, new.name
                        ));
                        new.room.clear();
                        new.sector.clear();
                    }
                    None => {
                        debug!(room = %new.room, farm = %new.farm_id, "room not found, skipping assignment");
                    }
                }
            }
        }

        // Encode after the transition logic so a cleared assignment lands
        // in the worker document too.
        let mut batch = vec![WriteOp::Update {
            collection: WORKERS,
            id: new.id.clone(),
            patch: encode(WORKERS, &new)?,
        }];
        batch.extend(room_ops);

        self.commit(batch).await?;
        info!(worker = %new.name, id = %new.id, "updated worker");
        op_metrics("update_worker", start);
        Ok(MutationOutcome {
            worker_id: new.id,
            warnings,
        })
    }

    /// Delete one worker: the worker document, its room membership, and the
    /// farm's active-worker total all change in one batch.
    pub async fn delete_worker(&self, id: &str) -> Result<(), EngineError> {
        let start = Instant::now();
        let snap = self.load().await?;
        let worker = snap
            .find_worker(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        let mut batch = vec![WriteOp::Delete {
            collection: WORKERS,
            id: worker.id.clone(),
        }];

        if worker.is_housed() {
            match snap.find_room(&worker.farm_id, &worker.room) {
                Some(room) => batch.push(WriteOp::Update {
                    collection: ROOMS,
                    id: room.id.clone(),
                    patch: unassign_deleted(room, worker),
                }),
                None => debug!(room = %worker.room, "room not found for deleted worker"),
            }
        }

        // Recompute even when the deleted worker was inactive: the delete is
        // a chance to refresh a farm cache that was already stale.
        if let Some(farm) = snap.find_farm(&worker.farm_id) {
            let remaining = snap
                .workers
                .iter()
                .filter(|w| w.farm_id == farm.id && w.is_active() && w.id != worker.id)
                .count();
            batch.push(WriteOp::Update {
                collection: FARMS,
                id: farm.id.clone(),
                patch: json!({ "total_workers": remaining }),
            });
        }

        self.commit(batch).await?;
        info!(worker = %worker.name, id = %worker.id, "deleted worker");
        op_metrics("delete_worker", start);
        Ok(())
    }

    /// Delete a set of workers in one batch. Room adjustments accumulate
    /// across the set, so two deletions from the same room both land. Farm
    /// totals are recomputed afterwards, one update per affected farm.
    /// Unknown ids are collected into the report; the rest still commits.
    pub async fn bulk_delete_workers(&self, ids: &[DocId]) -> Result<BulkReport, EngineError> {
        let start = Instant::now();
        if ids.len() > MAX_BATCH_OPS {
            return Err(EngineError::LimitExceeded("bulk delete too large"));
        }
        let snap = self.load().await?;

        let mut report = BulkReport::default();
        let mut deleted: Vec<&Worker> = Vec::new();
        // Working copies of touched rooms, keyed by room id, so successive
        // removals see each other instead of the stale snapshot.
        let mut touched: HashMap<DocId, (Vec<DocId>, u32)> = HashMap::new();
        let mut batch = Vec::new();

        for id in ids {
            let Some(worker) = snap.find_worker(id) else {
                report.failed += 1;
                report.errors.push(format!("worker {id} not found"));
                continue;
            };
            batch.push(WriteOp::Delete {
                collection: WORKERS,
                id: worker.id.clone(),
            });

            if worker.is_housed() {
                if let Some(room) = snap.find_room(&worker.farm_id, &worker.room) {
                    let (occupants, count) = touched
                        .entry(room.id.clone())
                        .or_insert_with(|| (room.occupants.clone(), room.occupant_count));
                    occupants.retain(|o| *o != worker.id && *o != worker.cin);
                    *count = count.saturating_sub(1).min(occupants.len() as u32);
                }
            }
            deleted.push(worker);
        }

        for (room_id, (occupants, count)) in touched {
            batch.push(WriteOp::Update {
                collection: ROOMS,
                id: room_id,
                patch: json!({ "occupants": occupants, "occupant_count": count }),
            });
        }

        if !batch.is_empty() {
            // Deletes plus one patch per touched room must still fit one
            // batch; rejected here, before anything commits.
            if batch.len() > MAX_BATCH_OPS {
                return Err(EngineError::LimitExceeded(
                    "bulk delete with room updates exceeds one batch",
                ));
            }
            self.commit(batch).await?;
        }
        report.succeeded = deleted.len();

        // Farm aggregates after the commit, per distinct affected farm.
        // Individual failures are logged, not fatal: the next repair sweep
        // recomputes the same totals.
        let deleted_ids: HashSet<&str> = deleted.iter().map(|w| w.id.as_str()).collect();
        let affected: BTreeSet<&str> = deleted.iter().map(|w| w.farm_id.as_str()).collect();
        for farm_id in affected {
            if snap.find_farm(farm_id).is_none() {
                continue;
            }
            let remaining = snap
                .workers
                .iter()
                .filter(|w| {
                    w.farm_id == farm_id && w.is_active() && !deleted_ids.contains(w.id.as_str())
                })
                .count();
            if let Err(e) = self
                .store()
                .update(FARMS, farm_id, json!({ "total_workers": remaining }))
                .await
            {
                warn!(farm = %farm_id, "farm total update failed: {e}");
            }
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "bulk delete finished"
        );
        op_metrics("bulk_delete_workers", start);
        Ok(report)
    }

    /// Import a set of records as new workers in one batch. Room occupancy
    /// is deliberately not touched here; with many records mapping to few
    /// rooms the per-room patches would conflict inside one batch, so the
    /// repair sweep owns the follow-up instead.
    pub async fn bulk_import_workers(
        &self,
        records: Vec<Worker>,
    ) -> Result<BulkReport, EngineError> {
        let start = Instant::now();
        if records.len() > MAX_BATCH_OPS {
            return Err(EngineError::LimitExceeded("import too large"));
        }

        let mut report = BulkReport::default();
        let mut batch = Vec::new();

        for mut record in records {
            if let Err(reason) = validate_import(&record) {
                report.failed += 1;
                report.errors.push(format!("{}: {reason}", record.name));
                continue;
            }
            record.id = new_doc_id();
            record.normalize();
            batch.push(WriteOp::Add {
                collection: WORKERS,
                id: record.id.clone(),
                doc: encode(WORKERS, &record)?,
            });
            report.succeeded += 1;
        }

        if !batch.is_empty() {
            self.commit(batch).await?;
        }
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "imported workers; room occupancy left to the repair sweep"
        );
        op_metrics("bulk_import_workers", start);
        Ok(report)
    }
}

fn validate_import(record: &Worker) -> Result<(), &'static str> {
    if record.name.trim().is_empty() {
        return Err("missing name");
    }
    if record.cin.trim().is_empty() {
        return Err("missing CIN");
    }
    if record.name.len() > MAX_NAME_LEN {
        return Err("name too long");
    }
    if record.cin.len() > MAX_CIN_LEN {
        return Err("CIN too long");
    }
    if !record.entry_date.is_empty() && !valid_date(&record.entry_date) {
        return Err("bad entry date");
    }
    Ok(())
}
