//! Persisted state

pub mod layout;
pub mod secret;
pub mod settings;
