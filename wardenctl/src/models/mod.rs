//! Data model

pub mod config;
pub mod step;
