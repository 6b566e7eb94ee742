use crate::model::DocId;
use crate::store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    NotFound(DocId),
    Decode {
        collection: &'static str,
        detail: String,
    },
    LimitExceeded(&'static str),
    Store(StoreError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "worker not found: {id}"),
            EngineError::Decode { collection, detail } => {
                write!(f, "malformed document in {collection}: {detail}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Store(e)
    }
}
