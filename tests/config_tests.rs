use std::env;

use viewgraph::{EngineConfig, GraphQueryError};

#[test]
fn test_defaults() {
    let config = EngineConfig::default();
    assert_eq!(config.max_batch_limit, 10_000);
    assert_eq!(config.search_limit, 10_000);
    assert_eq!(config.in_filter_chunk_size, 100);
    assert_eq!(config.progress_threshold().as_secs(), 30);
    assert!(config.estimate_total);
    assert!(!config.remove_not_connected);
    assert!(config.validate().is_ok());
}

#[test]
fn test_from_json_fills_missing_fields() {
    let config =
        EngineConfig::from_json(r#"{"max_batch_limit": 500, "remove_not_connected": true}"#)
            .unwrap();
    assert_eq!(config.max_batch_limit, 500);
    assert!(config.remove_not_connected);
    assert_eq!(config.in_filter_chunk_size, 100);
}

#[test]
fn test_invalid_values_are_rejected() {
    let err = EngineConfig::from_json(r#"{"max_batch_limit": 0}"#).unwrap_err();
    assert!(matches!(err, GraphQueryError::Configuration(_)));
    let err = EngineConfig::from_json(r#"{"progress_smoothing": 1.5}"#).unwrap_err();
    assert!(matches!(err, GraphQueryError::Configuration(_)));
    let err = EngineConfig::from_json("not json").unwrap_err();
    assert!(matches!(err, GraphQueryError::Configuration(_)));
    assert!(
        EngineConfig::default()
            .max_batch_limit(0)
            .validate()
            .is_err()
    );
}

#[test]
fn test_env_overrides() {
    // SAFETY: no other test in this binary reads or writes these variables.
    unsafe {
        env::set_var("VIEWGRAPH_MAX_BATCH_LIMIT", "250");
        env::set_var("VIEWGRAPH_REMOVE_NOT_CONNECTED", "true");
    }
    let config = EngineConfig::default().with_env_overrides().unwrap();
    assert_eq!(config.max_batch_limit, 250);
    assert!(config.remove_not_connected);

    unsafe {
        env::set_var("VIEWGRAPH_MAX_BATCH_LIMIT", "lots");
    }
    let err = EngineConfig::default().with_env_overrides().unwrap_err();
    assert!(matches!(err, GraphQueryError::Configuration(_)));

    unsafe {
        env::remove_var("VIEWGRAPH_MAX_BATCH_LIMIT");
        env::remove_var("VIEWGRAPH_REMOVE_NOT_CONNECTED");
    }
}
