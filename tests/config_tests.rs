//! Layered configuration loading and P-Mode documents read from disk.

use ebms_core::config::{ConfigManager, ConfigurationError};
use ebms_core::models::{LegLabel, MessageUnitType};
use ebms_core::pmode::{PModeLookup, PModeSet, ProcessingMode};
use std::io::Write;
use std::time::Duration;

#[test]
fn test_yaml_file_with_global_handlers() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    write!(
        file,
        r#"
validator_set: default
purge:
  retention_days: 7
event_handlers:
  - factory: log
    handled_events: [MissingReceipt, DeliveryFailure]
    applies_to: [UserMessage]
    continue_processing: false
    settings:
      level: warn
"#
    )
    .unwrap();

    let manager = ConfigManager::load_with(Some(file.path()), "test", "EBMS_CFG_IT_A").unwrap();
    let config = manager.config();

    assert_eq!(config.purge.retention_days, 7);
    assert_eq!(config.event_handlers.len(), 1);
    let handler = &config.event_handlers[0];
    assert_eq!(handler.factory, "log");
    assert_eq!(handler.handled_events, vec!["MissingReceipt", "DeliveryFailure"]);
    assert_eq!(handler.applies_to, vec![MessageUnitType::UserMessage]);
    assert!(!handler.continue_processing);
    assert_eq!(handler.settings.get("level").map(String::as_str), Some("warn"));
    assert_eq!(manager.config_file(), Some(file.path()));
}

#[test]
fn test_environment_overrides_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[retry]\nsweep_interval_ms = 250").unwrap();

    std::env::set_var("EBMS_CFG_IT_B__RETRY__SWEEP_INTERVAL_MS", "1200");
    std::env::set_var("EBMS_CFG_IT_B__STRICT_HEADER_VALIDATION", "true");
    let manager = ConfigManager::load_with(Some(file.path()), "test", "EBMS_CFG_IT_B").unwrap();
    std::env::remove_var("EBMS_CFG_IT_B__RETRY__SWEEP_INTERVAL_MS");
    std::env::remove_var("EBMS_CFG_IT_B__STRICT_HEADER_VALIDATION");

    assert_eq!(
        manager.config().retry.sweep_interval(),
        Duration::from_millis(1200)
    );
    assert!(manager.config().strict_header_validation);
}

#[test]
fn test_malformed_file_is_a_load_error() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "retry = [not toml").unwrap();

    let result = ConfigManager::load_with(Some(file.path()), "test", "EBMS_CFG_IT_C");
    assert!(matches!(result, Err(ConfigurationError::LoadError { .. })));
}

#[test]
fn test_pmode_documents_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    let document = r#"{
        "id": "pm-from-disk",
        "strict_header_validation": true,
        "legs": [{
            "label": "REQUEST",
            "receipt": { "notify_business_application": true },
            "reception_awareness": { "wait_intervals": [1000, 2000, 4000], "duplicate_detection": true }
        }]
    }"#;
    let path = dir.path().join("pm-from-disk.json");
    std::fs::write(&path, document).unwrap();

    let pmode: ProcessingMode =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let set = PModeSet::with_pmodes([pmode]);

    let found = set.resolve("pm-from-disk").unwrap();
    assert!(found.strict_header_validation);
    let leg = found.leg(LegLabel::Request).unwrap();
    assert!(leg.expects_receipt());
    assert!(leg.duplicate_detection());
    assert_eq!(
        leg.reception_awareness.as_ref().unwrap().wait_intervals,
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4)
        ]
    );
    assert!(set.resolve("unknown").is_none());
}
