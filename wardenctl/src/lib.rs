//! wardenctl library
//!
//! Deploys and decommissions a self-hosted Vaultwarden instance behind an
//! nginx reverse proxy with a certbot-issued certificate.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod host;
pub mod input;
pub mod installer;
pub mod logs;
pub mod models;
pub mod process;
pub mod render;
pub mod storage;
pub mod utils;
