use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::model::{DocId, new_doc_id};
use crate::notify::{ChangeEvent, ChangeHub, ChangeKind};

pub const WORKERS: &str = "workers";
pub const ROOMS: &str = "rooms";
pub const FARMS: &str = "fermes";

/// One write in an atomic batch. Adds carry a pre-generated id so the
/// orchestrator can cross-reference the new document inside the same batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    Add {
        collection: &'static str,
        id: DocId,
        doc: Value,
    },
    Update {
        collection: &'static str,
        id: DocId,
        patch: Value,
    },
    Delete {
        collection: &'static str,
        id: DocId,
    },
}

#[derive(Debug)]
pub enum StoreError {
    NotFound {
        collection: &'static str,
        id: DocId,
    },
    /// The whole batch was rejected; nothing was applied.
    BatchCommit(String),
    Backend(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound { collection, id } => {
                write!(f, "not found: {collection}/{id}")
            }
            StoreError::BatchCommit(msg) => write!(f, "batch commit rejected: {msg}"),
            StoreError::Backend(msg) => write!(f, "store backend error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// The document collection abstraction the occupancy core is built on.
/// Collections are flat sets of JSON documents keyed by an opaque id, with
/// top-level field-merge patches and an all-or-nothing batch write — the
/// contract a hosted document database offers an untrusted client.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every document in the collection, id included, in stable id order.
    async fn get_all(&self, collection: &'static str) -> Result<Vec<Value>, StoreError>;

    /// Insert with a freshly generated id; the id is injected into the
    /// document and returned.
    async fn add(&self, collection: &'static str, doc: Value) -> Result<DocId, StoreError>;

    /// Merge `patch`'s top-level fields into an existing document.
    async fn update(
        &self,
        collection: &'static str,
        id: &str,
        patch: Value,
    ) -> Result<(), StoreError>;

    async fn delete(&self, collection: &'static str, id: &str) -> Result<(), StoreError>;

    /// Apply a batch atomically: if any single write is invalid, nothing
    /// applies and the error is [`StoreError::BatchCommit`].
    async fn commit(&self, batch: Vec<WriteOp>) -> Result<(), StoreError>;

    /// Live change feed for one collection.
    fn watch(&self, collection: &'static str) -> broadcast::Receiver<ChangeEvent>;
}

type Collection = Arc<DashMap<DocId, Value>>;

/// DashMap-backed reference store: the embedded default and the test double
/// standing in for the hosted database.
pub struct MemoryStore {
    collections: DashMap<&'static str, Collection>,
    hub: ChangeHub,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
            hub: ChangeHub::new(),
        }
    }

    fn collection(&self, name: &'static str) -> Collection {
        self.collections
            .entry(name)
            .or_insert_with(|| Arc::new(DashMap::new()))
            .clone()
    }

    fn merge(doc: &mut Value, patch: &Value) {
        if let (Some(obj), Some(fields)) = (doc.as_object_mut(), patch.as_object()) {
            for (key, value) in fields {
                obj.insert(key.clone(), value.clone());
            }
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_all(&self, collection: &'static str) -> Result<Vec<Value>, StoreError> {
        let col = self.collection(collection);
        let mut docs: Vec<(DocId, Value)> = col
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        docs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(docs.into_iter().map(|(_, doc)| doc).collect())
    }

    async fn add(&self, collection: &'static str, mut doc: Value) -> Result<DocId, StoreError> {
        let id = new_doc_id();
        if let Some(obj) = doc.as_object_mut() {
            obj.insert("id".into(), Value::String(id.clone()));
        }
        self.collection(collection).insert(id.clone(), doc);
        self.hub.send(ChangeEvent {
            collection,
            id: id.clone(),
            kind: ChangeKind::Added,
        });
        Ok(id)
    }

    async fn update(
        &self,
        collection: &'static str,
        id: &str,
        patch: Value,
    ) -> Result<(), StoreError> {
        let col = self.collection(collection);
        let Some(mut doc) = col.get_mut(id) else {
            return Err(StoreError::NotFound {
                collection,
                id: id.to_string(),
            });
        };
        Self::merge(&mut doc, &patch);
        drop(doc);
        self.hub.send(ChangeEvent {
            collection,
            id: id.to_string(),
            kind: ChangeKind::Updated,
        });
        Ok(())
    }

    async fn delete(&self, collection: &'static str, id: &str) -> Result<(), StoreError> {
        let col = self.collection(collection);
        if col.remove(id).is_none() {
            return Err(StoreError::NotFound {
                collection,
                id: id.to_string(),
            });
        }
        self.hub.send(ChangeEvent {
            collection,
            id: id.to_string(),
            kind: ChangeKind::Deleted,
        });
        Ok(())
    }

    async fn commit(&self, batch: Vec<WriteOp>) -> Result<(), StoreError> {
        // Validate everything first so a rejected write leaves no partial state.
        for op in &batch {
            match *op {
                WriteOp::Add {
                    collection,
                    ref id,
                    ..
                } => {
                    if self.collection(collection).contains_key(id) {
                        return Err(StoreError::BatchCommit(format!(
                            "{collection}/{id} already exists"
                        )));
                    }
                }
                WriteOp::Update {
                    collection, ref id, ..
                }
                | WriteOp::Delete { collection, ref id } => {
                    if !self.collection(collection).contains_key(id) {
                        return Err(StoreError::BatchCommit(format!(
                            "{collection}/{id} not found"
                        )));
                    }
                }
            }
        }

        let mut events = Vec::with_capacity(batch.len());
        for op in batch {
            match op {
                WriteOp::Add {
                    collection,
                    id,
                    mut doc,
                } => {
                    if let Some(obj) = doc.as_object_mut() {
                        obj.insert("id".into(), Value::String(id.clone()));
                    }
                    self.collection(collection).insert(id.clone(), doc);
                    events.push(ChangeEvent {
                        collection,
                        id,
                        kind: ChangeKind::Added,
                    });
                }
                WriteOp::Update {
                    collection,
                    id,
                    patch,
                } => {
                    if let Some(mut doc) = self.collection(collection).get_mut(&id) {
                        Self::merge(&mut doc, &patch);
                    }
                    events.push(ChangeEvent {
                        collection,
                        id,
                        kind: ChangeKind::Updated,
                    });
                }
                WriteOp::Delete { collection, id } => {
                    self.collection(collection).remove(&id);
                    events.push(ChangeEvent {
                        collection,
                        id,
                        kind: ChangeKind::Deleted,
                    });
                }
            }
        }
        for event in events {
            self.hub.send(event);
        }
        Ok(())
    }

    fn watch(&self, collection: &'static str) -> broadcast::Receiver<ChangeEvent> {
        self.hub.subscribe(collection)
    }
}
