use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;

use ninox_dart_reconcile::config::{Config, ConfigLoader};
use ninox_dart_reconcile::domain::CanonicalField;
use ninox_dart_reconcile::error::ReconcileError;

#[test]
fn parse_config_file_with_custom_category() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("ndr.json");
    fs::write(
        &path,
        r#"{
            "schema_version": 1,
            "source_dir": "exports",
            "categories": [
                {
                    "name": "Dog",
                    "primary_file": "dog.csv",
                    "secondary_file": "dog_extractions.csv",
                    "extras": ["Council"],
                    "primary_aliases": { "Sample": "Sample.Name", "Date": "Survey.Date" },
                    "secondary_aliases": { "Sample": "Sample.Name" }
                }
            ],
            "anchors": { "row": ["AlleleID"], "column": ["RepAvg", "AvgCount"] },
            "prompt_timeout_secs": 3,
            "regather_on_timeout": false
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.source_dir, "exports");
    assert_eq!(resolved.ledger_dir, "ninox_merged");
    assert_eq!(resolved.categories.len(), 1);
    let dog = &resolved.categories[0];
    assert_eq!(dog.extras, vec![CanonicalField::Council]);
    assert_eq!(
        dog.primary_aliases.get("Date"),
        Some(&CanonicalField::SurveyDate)
    );
    assert_eq!(resolved.anchors.column, vec!["RepAvg", "AvgCount"]);
    assert_eq!(resolved.prompt_timeout, Duration::from_secs(3));
    assert!(!resolved.regather_on_timeout);
}

#[test]
fn explicit_missing_config_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, ReconcileError::ConfigRead(_));
    assert!(err.is_fatal());
}

#[test]
fn malformed_json_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("ndr.json");
    fs::write(&path, "{ not json").unwrap();
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, ReconcileError::ConfigParse(_));
}

#[test]
fn duplicate_category_names_are_rejected() {
    let defaults = ConfigLoader::resolve_config(Config::default()).unwrap();
    let mut categories = defaults.categories.clone();
    categories.push(defaults.categories[0].clone());
    let config = Config {
        categories: Some(categories),
        ..Config::default()
    };
    let err = ConfigLoader::resolve_config(config).unwrap_err();
    assert_matches!(err, ReconcileError::InvalidConfig(_));
}

#[test]
fn empty_anchor_lists_are_rejected() {
    let config: Config =
        serde_json::from_str(r#"{ "anchors": { "row": [], "column": ["RepAvg"] } }"#).unwrap();
    let err = ConfigLoader::resolve_config(config).unwrap_err();
    assert_matches!(err, ReconcileError::InvalidConfig(_));
}
