//! Preflight tests

use std::sync::Arc;
use std::time::Duration;

use wardenctl::deploy::preflight::run_preflight;
use wardenctl::errors::DeployError;
use wardenctl::host::{HostFacts, PortStatus, SystemHost};
use wardenctl::models::step::StepStatus;

use crate::common::{FakeHost, FakeRunner};

fn managed() -> Vec<String> {
    vec!["nginx".to_string(), "docker-proxy".to_string()]
}

#[tokio::test]
async fn test_foreign_listener_on_custom_port_is_conflict() {
    let host = FakeHost::new().with_bound(8443, Some("java"));
    let result = run_preflight(&host, &[80, 8443, 8080], &[], &managed(), Duration::ZERO).await;

    assert_eq!(result.status, StepStatus::Failed);
    match result.cause {
        Some(DeployError::PortConflictError { port, owner }) => {
            assert_eq!(port, 8443);
            assert_eq!(owner.as_deref(), Some("java"));
        }
        other => panic!("unexpected cause: {:?}", other),
    }
    assert!(result.message.contains("8443"));
}

#[tokio::test]
async fn test_unknown_owner_is_conflict() {
    let host = FakeHost::new().with_bound(80, None);
    let result = run_preflight(&host, &[80, 443], &[], &managed(), Duration::ZERO).await;
    assert!(matches!(
        result.cause,
        Some(DeployError::PortConflictError { port: 80, owner: None })
    ));
}

#[tokio::test]
async fn test_managed_owner_is_not_conflict() {
    let host = FakeHost::new()
        .with_bound(80, Some("nginx"))
        .with_bound(8080, Some("docker-proxy"));
    let result = run_preflight(&host, &[80, 443, 8080], &[], &managed(), Duration::ZERO).await;
    assert_eq!(result.status, StepStatus::Success, "{}", result.message);
}

#[tokio::test]
async fn test_busy_default_ports_are_only_noted() {
    let host = FakeHost::new()
        .with_bound(80, Some("apache2"))
        .with_bound(443, Some("apache2"))
        .with_bound(8080, Some("docker-proxy"));
    let result = run_preflight(&host, &[], &[80, 443, 8080, 3012], &managed(), Duration::ZERO).await;

    assert_eq!(result.status, StepStatus::Success, "{}", result.message);
    assert!(result.message.contains("default ports busy: 80, 443"));
    assert!(!result.message.contains("8080"));
}

#[tokio::test]
async fn test_unprivileged_fails_before_port_checks() {
    let mut host = FakeHost::new().with_bound(80, Some("apache2"));
    host.elevated = false;
    let result = run_preflight(&host, &[80], &[], &managed(), Duration::ZERO).await;
    assert!(matches!(result.cause, Some(DeployError::PermissionError(_))));
}

#[tokio::test]
async fn test_unsynchronized_clock_only_warns() {
    let mut host = FakeHost::new();
    host.clock = Some(false);
    let result = run_preflight(&host, &[80], &[], &managed(), Duration::ZERO).await;
    assert_eq!(result.status, StepStatus::Success);
    assert!(result.message.contains("warning"));

    host.clock = None;
    let result = run_preflight(&host, &[80], &[], &managed(), Duration::ZERO).await;
    assert_eq!(result.status, StepStatus::Success);
    assert!(result.message.contains("warning"));
}

#[tokio::test]
async fn test_system_host_sees_real_listener() {
    let listener = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let host = SystemHost::new(Arc::new(FakeRunner::new()));
    assert!(matches!(
        host.port_status(port).await,
        PortStatus::Bound { owner: None }
    ));

    drop(listener);
    assert_eq!(host.port_status(port).await, PortStatus::Free);
}
