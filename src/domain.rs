use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;

pub const ABSENT: &str = "NA";

pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SampleKey(String);

impl SampleKey {
    pub fn normalize(raw: &str) -> Self {
        Self(normalize_key(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SampleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SampleKey {
    fn from(value: &str) -> Self {
        Self::normalize(value)
    }
}

pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_uppercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DateFormat {
    DayFirst,
    MonthFirst,
    Iso,
}

impl DateFormat {
    pub fn pattern(self) -> &'static str {
        match self {
            DateFormat::DayFirst => "%d/%m/%Y",
            DateFormat::MonthFirst => "%m/%d/%Y",
            DateFormat::Iso => "%Y-%m-%d",
        }
    }

    pub fn parse(self, raw: &str) -> Option<NaiveDate> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        NaiveDate::parse_from_str(trimmed, self.pattern()).ok()
    }
}

pub fn format_iso(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CanonicalField {
    #[serde(rename = "Project")]
    Project,
    #[serde(rename = "Council")]
    Council,
    #[serde(rename = "Sample.Name")]
    SampleName,
    #[serde(rename = "Genetic.ID")]
    GeneticId,
    #[serde(rename = "Scat.ID")]
    ScatId,
    #[serde(rename = "Latitude")]
    Latitude,
    #[serde(rename = "Longitude")]
    Longitude,
    #[serde(rename = "Survey.Type")]
    SurveyType,
    #[serde(rename = "Survey.Date")]
    SurveyDate,
    #[serde(rename = "Date.Extraction")]
    ExtractionDate,
    #[serde(rename = "Extraction.Method")]
    ExtractionMethod,
    #[serde(rename = "Dart.Sample.ID")]
    DartSampleId,
    #[serde(rename = "Dart.Order.Number")]
    OrderNumber,
    #[serde(rename = "Extraction.ID")]
    ExtractionId,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 14] = [
        CanonicalField::Project,
        CanonicalField::Council,
        CanonicalField::SampleName,
        CanonicalField::GeneticId,
        CanonicalField::ScatId,
        CanonicalField::Latitude,
        CanonicalField::Longitude,
        CanonicalField::SurveyType,
        CanonicalField::SurveyDate,
        CanonicalField::ExtractionDate,
        CanonicalField::ExtractionMethod,
        CanonicalField::DartSampleId,
        CanonicalField::OrderNumber,
        CanonicalField::ExtractionId,
    ];

    pub fn column(self) -> &'static str {
        match self {
            CanonicalField::Project => "Project",
            CanonicalField::Council => "Council",
            CanonicalField::SampleName => "Sample.Name",
            CanonicalField::GeneticId => "Genetic.ID",
            CanonicalField::ScatId => "Scat.ID",
            CanonicalField::Latitude => "Latitude",
            CanonicalField::Longitude => "Longitude",
            CanonicalField::SurveyType => "Survey.Type",
            CanonicalField::SurveyDate => "Survey.Date",
            CanonicalField::ExtractionDate => "Date.Extraction",
            CanonicalField::ExtractionMethod => "Extraction.Method",
            CanonicalField::DartSampleId => "Dart.Sample.ID",
            CanonicalField::OrderNumber => "Dart.Order.Number",
            CanonicalField::ExtractionId => "Extraction.ID",
        }
    }

    pub fn is_category_extra(self) -> bool {
        matches!(self, CanonicalField::Council | CanonicalField::ScatId)
    }

    pub fn from_column(column: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.column() == column)
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.column())
    }
}

impl FromStr for CanonicalField {
    type Err = ReconcileError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_column(value.trim())
            .ok_or_else(|| ReconcileError::InvalidConfig(format!("unknown field {value}")))
    }
}

pub type AliasMap = BTreeMap<String, CanonicalField>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySpec {
    pub name: String,
    pub primary_file: String,
    pub secondary_file: String,
    #[serde(default)]
    pub extras: Vec<CanonicalField>,
    #[serde(default)]
    pub primary_aliases: AliasMap,
    #[serde(default)]
    pub secondary_aliases: AliasMap,
}

impl CategorySpec {
    pub fn keeps_extra(&self, field: CanonicalField) -> bool {
        self.extras.contains(&field)
    }
}

pub fn harmonize_order_labels(values: &mut [String], preferred: &[String]) -> usize {
    let mut spellings: HashMap<String, BTreeMap<String, usize>> = HashMap::new();
    for value in values.iter() {
        let trimmed = value.trim();
        if is_missing(trimmed) {
            continue;
        }
        *spellings
            .entry(trimmed.to_uppercase())
            .or_default()
            .entry(trimmed.to_string())
            .or_insert(0) += 1;
    }

    let mut canonical: HashMap<String, String> = HashMap::new();
    for (folded, counts) in &spellings {
        let preferred_spelling = preferred
            .iter()
            .map(|label| label.trim())
            .find(|label| label.to_uppercase() == *folded);
        let mut variants = counts.len();
        if let Some(label) = preferred_spelling {
            if !counts.contains_key(label) {
                variants += 1;
            }
        }
        if variants < 2 {
            continue;
        }
        let chosen = match preferred_spelling {
            Some(label) => label.to_string(),
            None => counts
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(spelling, _)| spelling.clone())
                .unwrap_or_default(),
        };
        canonical.insert(folded.clone(), chosen);
    }

    let mut changed = 0;
    for value in values.iter_mut() {
        let trimmed = value.trim();
        if is_missing(trimmed) {
            continue;
        }
        if let Some(chosen) = canonical.get(&trimmed.to_uppercase()) {
            if value != chosen {
                *value = chosen.clone();
                changed += 1;
            }
        }
    }
    changed
}

pub fn is_missing(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed == ABSENT || trimmed.eq_ignore_ascii_case("nan")
}
