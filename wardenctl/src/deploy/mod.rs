//! Deploy and decommission pipelines

pub mod compose;
pub mod decommission;
pub mod edge;
pub mod fsm;
pub mod nginx;
pub mod pipeline;
pub mod preflight;
pub mod verify;
pub mod workload;
