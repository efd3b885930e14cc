use std::io::Write;

use sip_cli::config::SipConfig;
use sip_model::Path;

fn path(text: &str) -> Path {
    Path::parse(text).unwrap()
}

const CONFIG: &str = r#"
[parse]
record_root = "/harvest/record"
unique_element = "/harvest/record/@id"

[runner]
workers = 3
input_capacity = 16

[stats]
sample_size = 20
sample_seed = 7
"#;

#[test]
fn file_values_fill_the_library_options() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();
    let config = SipConfig::load(Some(file.path())).unwrap();

    assert_eq!(config.parse.record_root, path("/harvest/record"));
    assert_eq!(config.parse.unique_element, Some(path("/harvest/record/@id")));
    assert_eq!(config.parse.default_prefix, None);
    assert_eq!(config.runner.workers, 3);
    assert_eq!(config.runner.input_capacity, 16);
    assert_eq!(config.runner.output_capacity, 64);
    assert_eq!(config.stats.sample_size, 20);
    assert_eq!(config.stats.sample_seed, Some(7));
    assert_eq!(config.stats.histogram_max_size, 1000);
}

#[test]
fn flags_override_file_values() {
    let config = SipConfig::from_toml(CONFIG)
        .unwrap()
        .with_record_overrides(Some(&path("/oai/record")), None)
        .with_workers(Some(1));
    assert_eq!(config.parse.record_root, path("/oai/record"));
    assert_eq!(config.parse.unique_element, Some(path("/harvest/record/@id")));
    assert_eq!(config.runner.workers, 1);

    let untouched = SipConfig::from_toml(CONFIG).unwrap().with_workers(None);
    assert_eq!(untouched.runner.workers, 3);
}

#[test]
fn no_file_means_defaults() {
    assert_eq!(SipConfig::load(None).unwrap(), SipConfig::default());
}

#[test]
fn invalid_paths_are_reported_with_the_file_name() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"[parse]\nrecord_root = \"/a/@b/c\"\n").unwrap();
    let err = SipConfig::load(Some(file.path())).unwrap_err();
    assert!(err.to_string().starts_with("parse config"));
}

#[test]
fn unreadable_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = SipConfig::load(Some(&dir.path().join("missing.toml"))).unwrap_err();
    assert!(err.to_string().starts_with("read config"));
}
