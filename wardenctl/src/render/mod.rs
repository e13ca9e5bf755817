//! Renderers for the files wardenctl writes to the host

pub mod compose;
pub mod nginx;
