//! Integration tests against fake host collaborators

mod common;
mod test_collector;
mod test_decommission;
mod test_fsm;
mod test_installer;
mod test_pipeline;
mod test_preflight;
