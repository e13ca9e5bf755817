//! Dependency provisioning tests

use std::time::Duration;

use wardenctl::errors::DeployError;
use wardenctl::installer::install::{ensure_dependencies, ToolSpec};
use wardenctl::models::step::StepStatus;

use crate::common::FakeRunner;

const TIMEOUT: Duration = Duration::from_secs(5);

fn count(runner: &FakeRunner, prefix: &str) -> usize {
    runner.calls().iter().filter(|c| c.starts_with(prefix)).count()
}

#[tokio::test]
async fn test_missing_tool_is_installed_and_enabled() {
    let runner = FakeRunner::new().fail_times("docker --version", 1, 127, "docker: not found");

    let result = ensure_dependencies(&runner, &ToolSpec::default_tools(), TIMEOUT).await;

    assert_eq!(result.status, StepStatus::Success, "{}", result.message);
    assert!(result.message.starts_with("installed: [docker];"));
    assert_eq!(count(&runner, "apt-get update"), 1);
    assert_eq!(count(&runner, "apt-get install"), 1);
    assert!(runner.called("apt-get install -y --no-install-recommends docker.io"));

    let update = runner.position("apt-get update").unwrap();
    let install = runner.position("apt-get install").unwrap();
    let enable = runner.position("systemctl enable --now docker").unwrap();
    assert!(update < install && install < enable);
    assert!(runner.called("systemctl enable --now nginx"));
}

#[tokio::test]
async fn test_present_tools_are_not_reinstalled() {
    let runner = FakeRunner::new();

    let result = ensure_dependencies(&runner, &ToolSpec::default_tools(), TIMEOUT).await;

    assert_eq!(result.status, StepStatus::Success);
    assert!(result.message.starts_with("installed: [];"));
    assert!(!runner.called("apt-get"));
    assert!(runner.called("systemctl enable --now docker"));
    assert!(runner.called("systemctl enable --now nginx"));
}

#[tokio::test]
async fn test_install_failure_names_the_tool() {
    let runner = FakeRunner::new()
        .fail("docker --version", 127, "docker: not found")
        .fail("apt-get install", 100, "E: Unable to locate package docker.io");

    let result = ensure_dependencies(&runner, &ToolSpec::default_tools(), TIMEOUT).await;

    assert_eq!(result.status, StepStatus::Failed);
    match result.cause {
        Some(DeployError::DependencyInstallError { tool, diagnostic }) => {
            assert_eq!(tool, "docker");
            assert_eq!(diagnostic, "E: Unable to locate package docker.io");
        }
        other => panic!("unexpected cause: {:?}", other),
    }
    assert!(!runner.called("systemctl enable"));
}

#[tokio::test]
async fn test_tool_still_absent_after_install_fails() {
    let runner = FakeRunner::new().fail("certbot --version", 127, "certbot: not found");

    let result = ensure_dependencies(&runner, &ToolSpec::default_tools(), TIMEOUT).await;

    assert!(matches!(
        result.cause,
        Some(DeployError::DependencyInstallError { ref tool, .. }) if tool == "certbot"
    ));
    assert_eq!(count(&runner, "certbot --version"), 2);
}

#[tokio::test]
async fn test_empty_tool_list_skips_the_step() {
    let runner = FakeRunner::new();
    let result = ensure_dependencies(&runner, &[], TIMEOUT).await;
    assert_eq!(result.status, StepStatus::Skipped);
    assert!(runner.calls().is_empty());
}
