//! Table-driven tests for configuration loading, validation and
//! environment overrides.

mod common;

use std::io::Write;

use serial_test::serial;
use tempfile::NamedTempFile;

use sitegen::config::{load_config_from_str, EntityFailurePolicy, LogFormat};
use sitegen::{apply_env_overrides, load_config, Config, JobStatus, Orchestrator, SitegenError};

use common::{businesses, default_stages, request, supplied, StaticDiscovery, TestHarness};

/// Represents a single config loading test case.
struct ConfigTestCase {
    /// Test case name for identification.
    name: &'static str,
    /// The config JSON content to test.
    config_json: &'static str,
    /// Whether loading should succeed.
    should_succeed: bool,
    /// Expected error substring (if should_succeed is false).
    expected_error: Option<&'static str>,
}

const JSON_CONFIG_TESTS: &[ConfigTestCase] = &[
    ConfigTestCase {
        name: "valid_empty_object",
        config_json: "{}",
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "valid_full",
        config_json: r#"{
            "version": "1.0",
            "log": {
                "level": "info,sitegen::pipeline=debug",
                "format": "json",
                "forward_level": "debug"
            },
            "pipeline": {
                "max_references": 3,
                "default_limit": 10,
                "entity_failure_policy": "abort",
                "tolerate_analysis_failure": false
            }
        }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "invalid_syntax",
        config_json: r#"{ "version": "1.0", "#,
        should_succeed: false,
        expected_error: Some("parse config JSON"),
    },
    ConfigTestCase {
        name: "invalid_version",
        config_json: r#"{ "version": "2.0" }"#,
        should_succeed: false,
        expected_error: Some("Unsupported config version"),
    },
    ConfigTestCase {
        name: "invalid_zero_default_limit",
        config_json: r#"{ "pipeline": { "default_limit": 0 } }"#,
        should_succeed: false,
        expected_error: Some("default_limit"),
    },
    ConfigTestCase {
        name: "invalid_empty_level",
        config_json: r#"{ "log": { "level": "  " } }"#,
        should_succeed: false,
        expected_error: Some("log.level"),
    },
    ConfigTestCase {
        name: "invalid_forward_level",
        config_json: r#"{ "log": { "forward_level": "chatty" } }"#,
        should_succeed: false,
        expected_error: Some("forward_level"),
    },
    ConfigTestCase {
        name: "invalid_failure_policy",
        config_json: r#"{ "pipeline": { "entity_failure_policy": "retry" } }"#,
        should_succeed: false,
        expected_error: Some("unknown variant"),
    },
    ConfigTestCase {
        name: "invalid_log_format",
        config_json: r#"{ "log": { "format": "xml" } }"#,
        should_succeed: false,
        expected_error: Some("unknown variant"),
    },
];

#[test]
fn test_json_config_loading() {
    for test_case in JSON_CONFIG_TESTS {
        let result = load_config_from_str(test_case.config_json);

        if test_case.should_succeed {
            assert!(
                result.is_ok(),
                "Test '{}': Expected success but got error: {:?}",
                test_case.name,
                result.err()
            );
        } else {
            assert!(
                result.is_err(),
                "Test '{}': Expected error but got success",
                test_case.name
            );

            if let Some(expected_error) = test_case.expected_error {
                let error_msg = result.err().unwrap().to_string();
                assert!(
                    error_msg.contains(expected_error),
                    "Test '{}': Expected error containing '{}', got '{}'",
                    test_case.name,
                    expected_error,
                    error_msg
                );
            }
        }
    }
}

#[test]
fn test_valid_config_field_values() {
    let config = load_config_from_str(JSON_CONFIG_TESTS[1].config_json).unwrap();

    assert_eq!(config.log.level, "info,sitegen::pipeline=debug");
    assert_eq!(config.log.format, LogFormat::Json);
    assert_eq!(config.log.forward_level, "debug");
    assert_eq!(config.pipeline.max_references, 3);
    assert_eq!(config.pipeline.default_limit, Some(10));
    assert_eq!(
        config.pipeline.entity_failure_policy,
        EntityFailurePolicy::Abort
    );
    assert!(!config.pipeline.tolerate_analysis_failure);
}

#[test]
fn test_config_defaults_applied() {
    let config = load_config_from_str("{}").unwrap();

    assert_eq!(config.version, "1.0");
    assert_eq!(config.log.level, "info");
    assert_eq!(config.log.format, LogFormat::Text);
    assert_eq!(config.log.forward_level, "info");
    assert_eq!(config.pipeline.max_references, 5);
    assert_eq!(config.pipeline.default_limit, None);
    assert_eq!(
        config.pipeline.entity_failure_policy,
        EntityFailurePolicy::Continue
    );
    assert!(config.pipeline.tolerate_analysis_failure);
}

#[test]
fn test_load_config_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, r#"{{ "pipeline": {{ "max_references": 2 }} }}"#).unwrap();

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.pipeline.max_references, 2);
}

#[test]
fn test_load_config_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sitegen.json");

    let err = load_config(&path).unwrap_err().to_string();
    assert!(err.contains("sitegen.json"), "unexpected error: {}", err);
}

/// Environment override cases: variable, value, whether it applies.
const ENV_OVERRIDE_TESTS: &[(&str, &str, bool)] = &[
    ("SITEGEN_LOG_LEVEL", "debug", true),
    ("SITEGEN_LOG_FORMAT", "JSON", true),
    ("SITEGEN_LOG_FORMAT", "yaml", false),
    ("SITEGEN_MAX_REFERENCES", "7", true),
    ("SITEGEN_MAX_REFERENCES", "many", false),
    ("SITEGEN_DEFAULT_LIMIT", "0", false),
    ("SITEGEN_ENTITY_FAILURE_POLICY", "abort", true),
    ("SITEGEN_ENTITY_FAILURE_POLICY", "ignore", false),
];

#[test]
#[serial]
fn test_env_overrides() {
    for (name, value, should_succeed) in ENV_OVERRIDE_TESTS {
        std::env::set_var(name, value);
        let result = apply_env_overrides(Config::default());
        std::env::remove_var(name);

        assert_eq!(
            result.is_ok(),
            *should_succeed,
            "{}={}: unexpected result {:?}",
            name,
            value,
            result
        );
    }
}

#[test]
#[serial]
fn test_env_overrides_take_precedence_over_file() {
    let config = load_config_from_str(
        r#"{ "pipeline": { "max_references": 3, "entity_failure_policy": "abort" } }"#,
    )
    .unwrap();

    std::env::set_var("SITEGEN_MAX_REFERENCES", "9");
    std::env::set_var("SITEGEN_ENTITY_FAILURE_POLICY", "continue");
    let result = apply_env_overrides(config);
    std::env::remove_var("SITEGEN_MAX_REFERENCES");
    std::env::remove_var("SITEGEN_ENTITY_FAILURE_POLICY");

    let config = result.unwrap();
    assert_eq!(config.pipeline.max_references, 9);
    assert_eq!(
        config.pipeline.entity_failure_policy,
        EntityFailurePolicy::Continue
    );
}

#[tokio::test]
async fn test_loaded_config_drives_orchestrator() {
    let config = load_config_from_str(r#"{ "pipeline": { "default_limit": 1 } }"#).unwrap();
    let harness = TestHarness::with_config(
        &config,
        default_stages().discovery(StaticDiscovery::new(businesses(3))),
    );

    let job_id = harness.orchestrator.submit(request()).unwrap();
    let job = harness.wait(&job_id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.results.len(), 1);

    // Supplied lists are processed as given.
    let job_id = harness.orchestrator.submit(supplied(businesses(3))).unwrap();
    let job = harness.wait(&job_id).await;
    assert_eq!(job.results.len(), 3);
}

#[tokio::test]
#[serial]
async fn test_orchestrator_from_config_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, r#"{{ "pipeline": {{ "default_limit": 2 }} }}"#).unwrap();

    let orchestrator = Orchestrator::from_config_file(
        file.path(),
        default_stages().discovery(StaticDiscovery::new(businesses(4))),
    )
    .unwrap();
    let job_id = orchestrator.submit(request()).unwrap();
    let job = orchestrator.wait(&job_id).await.unwrap();
    assert_eq!(job.results.len(), 2);
}

#[test]
#[serial]
fn test_orchestrator_from_config_file_errors() {
    let dir = tempfile::tempdir().unwrap();
    let result = Orchestrator::from_config_file(dir.path().join("missing.json"), default_stages());
    assert!(matches!(result, Err(SitegenError::Config(_))));

    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{{}}").unwrap();
    let result = Orchestrator::from_config_file(
        file.path(),
        sitegen::PipelineStages::builder().discovery(StaticDiscovery::new(Vec::new())),
    );
    assert!(matches!(result, Err(SitegenError::Config(_))));
}
