use deta_client::{ServiceError, setup_logging};
use tempfile::tempdir;

/// The global subscriber can only be installed once per process, so both
/// calls live in one test.
#[test]
fn test_setup_logging_with_file_then_reinit_fails() {
    let temp_dir = tempdir().unwrap();
    let log_file = temp_dir.path().join("logs").join("client.log");

    let guard = setup_logging(Some(&log_file)).unwrap();
    assert!(guard.is_some());
    assert!(temp_dir.path().join("logs").is_dir());

    tracing::info!("logging initialized");

    let second = setup_logging(None);
    assert!(matches!(second, Err(ServiceError::LogSetup(_))));
}
