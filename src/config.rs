use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::batch::AnchorTokens;
use crate::domain::{AliasMap, CanonicalField, CategorySpec};
use crate::error::ReconcileError;

pub const DEFAULT_CONFIG_FILE: &str = "ndr.json";
pub const DEFAULT_BATCH_FOLDER_PATTERN: &str = r"^DKo[0-9]+-[0-9]+$";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub source_dir: Option<String>,
    #[serde(default)]
    pub ledger_dir: Option<String>,
    #[serde(default)]
    pub batch_dir: Option<String>,
    #[serde(default)]
    pub batch_output_dir: Option<String>,
    #[serde(default)]
    pub categories: Option<Vec<CategorySpec>>,
    #[serde(default)]
    pub anchors: Option<AnchorTokens>,
    #[serde(default)]
    pub anchor_scan_rows: Option<usize>,
    #[serde(default)]
    pub batch_folder_pattern: Option<String>,
    #[serde(default)]
    pub prompt_timeout_secs: Option<u64>,
    #[serde(default)]
    pub regather_on_timeout: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub source_dir: String,
    pub ledger_dir: String,
    pub batch_dir: String,
    pub batch_output_dir: String,
    pub categories: Vec<CategorySpec>,
    pub anchors: AnchorTokens,
    pub anchor_scan_rows: usize,
    pub batch_folder_pattern: String,
    pub prompt_timeout: Duration,
    pub regather_on_timeout: bool,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            source_dir: "ninox".to_string(),
            ledger_dir: "ninox_merged".to_string(),
            batch_dir: "DArT".to_string(),
            batch_output_dir: "dart_merged".to_string(),
            categories: default_categories(),
            anchors: AnchorTokens::default(),
            anchor_scan_rows: 10,
            batch_folder_pattern: DEFAULT_BATCH_FOLDER_PATTERN.to_string(),
            prompt_timeout: Duration::from_secs(10),
            regather_on_timeout: true,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, ReconcileError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| ReconcileError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| ReconcileError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, ReconcileError> {
        let defaults = ResolvedConfig::default();

        let categories = config.categories.unwrap_or(defaults.categories);
        if categories.is_empty() {
            return Err(ReconcileError::InvalidConfig(
                "at least one survey category is required".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for category in &categories {
            if !seen.insert(category.name.as_str()) {
                return Err(ReconcileError::InvalidConfig(format!(
                    "duplicate survey category {}",
                    category.name
                )));
            }
        }

        let anchors = config.anchors.unwrap_or(defaults.anchors);
        if anchors.row.is_empty() || anchors.column.is_empty() {
            return Err(ReconcileError::InvalidConfig(
                "anchor token lists must not be empty".to_string(),
            ));
        }

        let batch_folder_pattern = config
            .batch_folder_pattern
            .unwrap_or(defaults.batch_folder_pattern);
        Regex::new(&batch_folder_pattern)
            .map_err(|err| ReconcileError::InvalidConfig(err.to_string()))?;

        Ok(ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            source_dir: config.source_dir.unwrap_or(defaults.source_dir),
            ledger_dir: config.ledger_dir.unwrap_or(defaults.ledger_dir),
            batch_dir: config.batch_dir.unwrap_or(defaults.batch_dir),
            batch_output_dir: config.batch_output_dir.unwrap_or(defaults.batch_output_dir),
            categories,
            anchors,
            anchor_scan_rows: config
                .anchor_scan_rows
                .unwrap_or(defaults.anchor_scan_rows)
                .max(1),
            batch_folder_pattern,
            prompt_timeout: config
                .prompt_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.prompt_timeout),
            regather_on_timeout: config
                .regather_on_timeout
                .unwrap_or(defaults.regather_on_timeout),
        })
    }
}

pub fn default_primary_aliases() -> AliasMap {
    [
        ("Projects", CanonicalField::Project),
        ("Sample Name", CanonicalField::SampleName),
        ("Genetic Latitude Pin", CanonicalField::Latitude),
        ("Genetic Longitude Pin", CanonicalField::Longitude),
        ("Genetics Survey Type", CanonicalField::SurveyType),
        ("Survey Date", CanonicalField::SurveyDate),
        ("Genetic ID", CanonicalField::GeneticId),
        ("Scat ID", CanonicalField::ScatId),
    ]
    .into_iter()
    .map(|(source, field)| (source.to_string(), field))
    .collect()
}

pub fn default_secondary_aliases() -> AliasMap {
    [
        ("Sample Name", CanonicalField::SampleName),
        ("Protocol", CanonicalField::ExtractionMethod),
        ("Date extracted", CanonicalField::ExtractionDate),
        (
            "DART Sample ID (Sample name returned by DArT)",
            CanonicalField::DartSampleId,
        ),
        ("Extraction ID", CanonicalField::ExtractionId),
        ("Genetic ID", CanonicalField::GeneticId),
        ("DART Order Number", CanonicalField::OrderNumber),
    ]
    .into_iter()
    .map(|(source, field)| (source.to_string(), field))
    .collect()
}

pub fn default_categories() -> Vec<CategorySpec> {
    let category = |name: &str, primary: &str, secondary: &str, extras: Vec<CanonicalField>| {
        CategorySpec {
            name: name.to_string(),
            primary_file: primary.to_string(),
            secondary_file: secondary.to_string(),
            extras,
            primary_aliases: default_primary_aliases(),
            secondary_aliases: default_secondary_aliases(),
        }
    };
    vec![
        category(
            "Dog",
            "4 - Genetics.csv",
            "5 - Extractions.csv",
            vec![CanonicalField::Council, CanonicalField::ScatId],
        ),
        category(
            "Drone",
            "6 - Drone Genetics.csv",
            "7 - Drone Extractions.csv",
            Vec::new(),
        ),
        category(
            "Opportunistic",
            "9 - Opportunistic Genetics.csv",
            "9b - Opportunistic Extractions.csv",
            Vec::new(),
        ),
        category(
            "Tracking",
            "2 - TK Genetics.csv",
            "3 - TK Extractions.csv",
            Vec::new(),
        ),
        category(
            "Partner",
            "Partners Genetic data.csv",
            "Partner Extraction.csv",
            Vec::new(),
        ),
    ]
}
