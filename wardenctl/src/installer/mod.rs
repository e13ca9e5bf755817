//! Host dependency installation

pub mod install;
