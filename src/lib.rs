//! Occupancy consistency core for a multi-site dormitory dashboard:
//! workers, gender-restricted rooms, and per-farm aggregates kept mutually
//! consistent through batched writes and a background repair sweep.

pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod store;
pub mod sweep;
