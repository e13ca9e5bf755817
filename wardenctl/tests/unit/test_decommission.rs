//! Decommission tests

use std::sync::Arc;

use wardenctl::deploy::decommission::{ActionOutcome, DecommissionAction};
use wardenctl::deploy::pipeline::Orchestrator;
use wardenctl::errors::DeployError;
use wardenctl::input::scripted::ScriptedPrompts;
use wardenctl::process::CommandRunner;
use wardenctl::storage::layout::StorageLayout;

use crate::common::{
    deploy_answers, issuing_runner, test_options, workload_listener, FakeHost, FakeRunner, DOMAIN,
};

fn orchestrator(runner: &Arc<FakeRunner>, host: FakeHost, root: &std::path::Path) -> Orchestrator {
    let runner: Arc<dyn CommandRunner> = runner.clone();
    Orchestrator::new(runner, Arc::new(host), test_options(root))
}

fn confirm_all(answer: &str) -> ScriptedPrompts {
    DecommissionAction::ALL
        .iter()
        .fold(ScriptedPrompts::new(), |prompts, action| prompts.answer(action.key(), answer))
}

async fn deployed(root: &std::path::Path) {
    let layout = StorageLayout::rooted(root);
    let listener = workload_listener();
    let app_port = listener.local_addr().unwrap().port();
    orchestrator(&Arc::new(issuing_runner(&layout)), FakeHost::new(), root)
        .deploy(&mut deploy_answers(app_port))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_confirmed_decommission_removes_everything() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::rooted(dir.path());
    deployed(dir.path()).await;

    let runner = Arc::new(FakeRunner::new());
    let report = orchestrator(&runner, FakeHost::new(), dir.path())
        .decommission(&mut confirm_all("yes"), Some(DOMAIN))
        .await
        .unwrap();

    assert_eq!(report.domain, DOMAIN);
    assert!(!report.has_failures());
    for action in DecommissionAction::ALL {
        assert!(
            matches!(report.outcome(action), Some(ActionOutcome::Done(_))),
            "{} was {:?}",
            action,
            report.outcome(action)
        );
    }

    assert!(!layout.compose_file().exists().await);
    assert!(!layout.secret_file().exists().await);
    assert!(!layout.data_dir().exists().await);
    assert!(!layout.site_file(DOMAIN).exists().await);
    assert!(std::fs::symlink_metadata(layout.site_link(DOMAIN)).is_err());
    assert!(std::fs::symlink_metadata(layout.default_site_link()).is_ok());
    assert!(!layout.cert_live_dir(DOMAIN).exists().await);
    assert!(!layout.cert_archive_dir(DOMAIN).exists().await);
    assert!(!layout.cert_renewal_file(DOMAIN).exists().await);

    assert!(runner.called("docker compose -f"));
    assert!(runner.calls().iter().any(|c| c.ends_with("down --remove-orphans")));
    assert!(runner.called("certbot revoke"));
    assert!(!runner.called("certbot delete"));
}

#[tokio::test]
async fn test_withheld_confirmations_leave_everything() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::rooted(dir.path());
    deployed(dir.path()).await;

    let runner = Arc::new(FakeRunner::new());
    let report = orchestrator(&runner, FakeHost::new(), dir.path())
        .decommission(&mut confirm_all("n"), Some(DOMAIN))
        .await
        .unwrap();

    for action in DecommissionAction::ALL {
        assert!(matches!(report.outcome(action), Some(ActionOutcome::Declined)));
    }
    assert!(layout.compose_file().exists().await);
    assert!(layout.secret_file().exists().await);
    assert!(layout.data_dir().exists().await);
    assert!(layout.site_file(DOMAIN).exists().await);
    assert!(layout.fullchain(DOMAIN).exists().await);
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_missing_targets_are_not_asked_about() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(FakeRunner::new());
    let mut prompts = ScriptedPrompts::new().answer("domain", DOMAIN);

    let report = orchestrator(&runner, FakeHost::new(), dir.path())
        .decommission(&mut prompts, None)
        .await
        .unwrap();

    for action in DecommissionAction::ALL {
        assert!(matches!(report.outcome(action), Some(ActionOutcome::AlreadyRemoved)));
    }
    assert_eq!(prompts.asked(), ["domain"]);
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_failed_revocation_falls_back_to_delete() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::rooted(dir.path());
    deployed(dir.path()).await;

    let runner = Arc::new(FakeRunner::new().fail("certbot revoke", 1, "unauthorized"));
    let mut prompts = ScriptedPrompts::new().answer("delete_certificate", "y");
    let report = orchestrator(&runner, FakeHost::new(), dir.path())
        .decommission(&mut prompts, Some(DOMAIN))
        .await
        .unwrap();

    match report.outcome(DecommissionAction::DeleteCertificate) {
        Some(ActionOutcome::Done(message)) => assert!(message.contains("not revoked")),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(runner.called("certbot delete"));
    assert!(!layout.cert_live_dir(DOMAIN).exists().await);
    assert!(matches!(
        report.outcome(DecommissionAction::RemoveWorkload),
        Some(ActionOutcome::Declined)
    ));
}

#[tokio::test]
async fn test_unprivileged_decommission_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let mut host = FakeHost::new();
    host.elevated = false;
    let runner = Arc::new(FakeRunner::new());

    let err = orchestrator(&runner, host, dir.path())
        .decommission(&mut confirm_all("yes"), Some(DOMAIN))
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::PermissionError(_)));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_invalid_domain_argument_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(FakeRunner::new());

    let err = orchestrator(&runner, FakeHost::new(), dir.path())
        .decommission(&mut ScriptedPrompts::new(), Some("not a domain"))
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::ValidationError(_)));
}
