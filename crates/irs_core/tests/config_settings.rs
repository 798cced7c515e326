use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use irs_core::config::IrsSettings;
use pretty_assertions::assert_eq;

#[test]
fn defaults_match_the_reference_deployment() {
    let s = IrsSettings::default();
    assert_eq!(s.remediation.ssh_user, "ubuntu");
    assert_eq!(s.remediation.service_name, "loadsim");
    assert_eq!(s.remediation.target_instance_type, "m5.large");
    assert_eq!(s.remediation.connect_timeout_secs, 30);
    assert_eq!(s.remediation.settle_delay_secs, 3);
    assert_eq!(s.remediation.log_tail_lines, 5);
    assert_eq!(s.remediation.log_tail_chars, 500);
    assert_eq!(s.ai.model, "phi4-mini");
    assert_eq!(s.ai.timeout_secs, 120);
    assert!(!s.intake.admit_other);
    s.validate().expect("defaults are valid");
}

#[test]
fn partial_toml_keeps_defaults_for_missing_keys() {
    let s = IrsSettings::from_toml_str(
        r#"
[intake]
admit_other = true

[remediation]
service_name = "api"
"#,
    )
    .expect("parse");
    assert!(s.intake.admit_other);
    assert!(s.classifier_policy().admit_other);
    assert_eq!(s.remediation.service_name, "api");
    assert_eq!(s.remediation.ssh_user, "ubuntu");
    assert_eq!(s.store.db_path, PathBuf::from("incidents.sqlite"));
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let err = IrsSettings::from_toml_str("[remediation\nservice_name=").expect_err("should fail");
    assert_eq!(err.code, "CONFIG_PARSE_FAILED");
}

#[test]
fn env_overrides_apply_and_blank_endpoints_unset() {
    let mut s = IrsSettings::default();
    s.ai.ollama_endpoint = Some("http://127.0.0.1:11434".to_string());
    let env: HashMap<&str, &str> = [
        ("IRS_DB_PATH", "/tmp/irs.sqlite"),
        ("IRS_OLLAMA_ENDPOINT", " "),
        ("IRS_NOTIFY_WEBHOOK", "https://hooks.example.com/irs"),
        ("IRS_SERVICE_NAME", "worker"),
    ]
    .into_iter()
    .collect();
    s.apply_env(|k| env.get(k).map(|v| v.to_string()));

    assert_eq!(s.store.db_path, PathBuf::from("/tmp/irs.sqlite"));
    assert_eq!(s.ai.ollama_endpoint, None);
    assert_eq!(s.notify.webhook_url.as_deref(), Some("https://hooks.example.com/irs"));
    assert_eq!(s.remediation.service_name, "worker");
    s.validate().expect("valid");
}

#[test]
fn validation_rejects_zero_timeouts_and_bad_urls() {
    let mut s = IrsSettings::default();
    s.remediation.connect_timeout_secs = 0;
    assert_eq!(s.validate().expect_err("zero").code, "CONFIG_INVALID");

    let mut s = IrsSettings::default();
    s.notify.webhook_url = Some("ftp://example.com".to_string());
    assert_eq!(s.validate().expect_err("url").code, "CONFIG_INVALID");

    let mut s = IrsSettings::default();
    s.remediation.service_name = "  ".to_string();
    assert_eq!(s.validate().expect_err("service").code, "CONFIG_INVALID");
}

#[test]
fn load_reads_file_from_disk() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    writeln!(file, "[notify]\naction_base_url = \"https://irs.example.com\"").expect("write");

    let s = IrsSettings::load(Some(file.path())).expect("load");
    assert_eq!(s.notify.action_base_url, "https://irs.example.com");

    let err = IrsSettings::load(Some(std::path::Path::new("/nonexistent/irs.toml"))).expect_err("missing");
    assert_eq!(err.code, "CONFIG_READ_FAILED");
}
