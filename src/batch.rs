use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{SampleKey, UNKNOWN};
use crate::error::ReconcileError;
use crate::table::Table;

pub const SAMPLE_COLUMN: &str = "sample_names";
pub const ORDER_COLUMN: &str = "dart_order_number";
pub const TISSUE_COLUMN: &str = "tissue";

pub const METADATA_SAMPLE_COLUMN: &str = "Genotype";
pub const METADATA_TISSUE_COLUMN: &str = "Tissue";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorTokens {
    pub row: Vec<String>,
    pub column: Vec<String>,
}

impl Default for AnchorTokens {
    fn default() -> Self {
        Self {
            row: vec!["AlleleID".to_string(), "MarkerName".to_string()],
            column: vec![
                "RepAvg".to_string(),
                "RatioAvgCountRefAvgCountSnp".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportLayout {
    pub anchor_row: usize,
    pub anchor_column: usize,
    pub row_token: String,
    pub column_token: String,
}

#[derive(Debug, Clone)]
pub struct ReportSamples {
    pub layout: ReportLayout,
    pub samples: Vec<SampleKey>,
    pub duplicates: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSample {
    pub sample: SampleKey,
    pub order: String,
    pub tissue: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum MetadataStatus {
    Joined { unmatched_report_samples: usize },
    Absent,
    Malformed { reason: String },
}

#[derive(Debug, Clone)]
pub struct BatchExtraction {
    pub order: String,
    pub report_file: PathBuf,
    pub layout: ReportLayout,
    pub samples: Vec<BatchSample>,
    pub duplicate_identifiers: usize,
    pub metadata: MetadataStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFiles {
    pub order: String,
    pub report: Option<PathBuf>,
    pub metadata: Option<PathBuf>,
}

pub fn read_prefix(path: &Path, rows: usize) -> Result<Vec<Vec<String>>, ReconcileError> {
    let read_err = |message: String| ReconcileError::TableRead {
        path: path.to_path_buf(),
        message,
    };
    let file = File::open(path).map_err(|err| read_err(err.to_string()))?;
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let mut prefix = Vec::with_capacity(rows);
    for record in reader.records().take(rows) {
        let record = record.map_err(|err| read_err(err.to_string()))?;
        prefix.push(record.iter().map(str::to_string).collect());
    }
    Ok(prefix)
}

pub fn locate_anchor(
    path: &Path,
    prefix: &[Vec<String>],
    tokens: &AnchorTokens,
) -> Result<ReportLayout, ReconcileError> {
    let (anchor_row, row_token) = prefix
        .iter()
        .enumerate()
        .find_map(|(index, row)| {
            let first = row.first()?.trim();
            tokens
                .row
                .iter()
                .find(|token| token.as_str() == first)
                .map(|token| (index, token.clone()))
        })
        .ok_or_else(|| ReconcileError::MalformedLayout {
            path: path.to_path_buf(),
            reason: format!(
                "no anchor row ({}) in the first {} rows",
                tokens.row.join("|"),
                prefix.len()
            ),
        })?;

    let header = &prefix[anchor_row];
    let (anchor_column, column_token) = header
        .iter()
        .enumerate()
        .find_map(|(index, cell)| {
            let cell = cell.trim();
            tokens
                .column
                .iter()
                .find(|token| token.as_str() == cell)
                .map(|token| (index, token.clone()))
        })
        .ok_or_else(|| ReconcileError::MalformedLayout {
            path: path.to_path_buf(),
            reason: format!(
                "no anchor column ({}) in row {anchor_row}",
                tokens.column.join("|")
            ),
        })?;

    Ok(ReportLayout {
        anchor_row,
        anchor_column,
        row_token,
        column_token,
    })
}

pub fn parse_report(
    path: &Path,
    tokens: &AnchorTokens,
    scan_rows: usize,
) -> Result<ReportSamples, ReconcileError> {
    let prefix = read_prefix(path, scan_rows)?;
    let layout = locate_anchor(path, &prefix, tokens)?;
    let header = &prefix[layout.anchor_row];

    let mut seen = HashSet::new();
    let mut samples = Vec::new();
    let mut duplicates = 0;
    for cell in header.iter().skip(layout.anchor_column + 1) {
        let key = SampleKey::normalize(cell);
        if key.is_empty() {
            continue;
        }
        if seen.insert(key.clone()) {
            samples.push(key);
        } else {
            duplicates += 1;
        }
    }

    Ok(ReportSamples {
        layout,
        samples,
        duplicates,
    })
}

pub fn read_tissue_map(path: &Path) -> Result<HashMap<SampleKey, String>, ReconcileError> {
    let table = Table::read(path)?;
    let missing = |column: &str| ReconcileError::MalformedMetadata {
        path: path.to_path_buf(),
        reason: format!("no {column} column"),
    };
    let sample = table
        .column_index(METADATA_SAMPLE_COLUMN)
        .ok_or_else(|| missing(METADATA_SAMPLE_COLUMN))?;
    let tissue = table
        .column_index(METADATA_TISSUE_COLUMN)
        .ok_or_else(|| missing(METADATA_TISSUE_COLUMN))?;

    let mut map = HashMap::new();
    for row in table.rows() {
        let key = SampleKey::normalize(&row[sample]);
        if key.is_empty() {
            continue;
        }
        map.entry(key).or_insert_with(|| row[tissue].trim().to_string());
    }
    Ok(map)
}

pub fn extract_batch(
    files: &BatchFiles,
    tokens: &AnchorTokens,
    scan_rows: usize,
) -> Result<BatchExtraction, ReconcileError> {
    let report_file = files
        .report
        .clone()
        .ok_or_else(|| ReconcileError::NoReport(files.order.clone()))?;
    let report = parse_report(&report_file, tokens, scan_rows)?;
    info!(
        order = %files.order,
        row = report.layout.anchor_row,
        column = report.layout.anchor_column,
        samples = report.samples.len(),
        "report parsed"
    );
    if report.duplicates > 0 {
        warn!(order = %files.order, count = report.duplicates, "repeated identifiers in report header");
    }

    let tissue_map = match &files.metadata {
        Some(path) => match read_tissue_map(path) {
            Ok(map) => Ok(Some(map)),
            Err(err) => {
                warn!(order = %files.order, error = %err, "metadata unusable, tissue left unknown");
                Err(err.to_string())
            }
        },
        None => Ok(None),
    };

    let (samples, metadata) = match tissue_map {
        Ok(Some(map)) => {
            let mut unmatched = 0;
            let samples = report
                .samples
                .into_iter()
                .filter_map(|sample| match map.get(&sample) {
                    Some(tissue) => Some(BatchSample {
                        tissue: tissue.clone(),
                        order: files.order.clone(),
                        sample,
                    }),
                    None => {
                        unmatched += 1;
                        None
                    }
                })
                .collect::<Vec<_>>();
            (
                samples,
                MetadataStatus::Joined {
                    unmatched_report_samples: unmatched,
                },
            )
        }
        Ok(None) => (
            with_unknown_tissue(report.samples, &files.order),
            MetadataStatus::Absent,
        ),
        Err(reason) => (
            with_unknown_tissue(report.samples, &files.order),
            MetadataStatus::Malformed { reason },
        ),
    };

    Ok(BatchExtraction {
        order: files.order.clone(),
        report_file,
        layout: report.layout,
        samples,
        duplicate_identifiers: report.duplicates,
        metadata,
    })
}

fn with_unknown_tissue(samples: Vec<SampleKey>, order: &str) -> Vec<BatchSample> {
    samples
        .into_iter()
        .map(|sample| BatchSample {
            sample,
            order: order.to_string(),
            tissue: UNKNOWN.to_string(),
        })
        .collect()
}

pub fn batch_table_headers() -> Vec<String> {
    vec![
        SAMPLE_COLUMN.to_string(),
        ORDER_COLUMN.to_string(),
        TISSUE_COLUMN.to_string(),
    ]
}

pub fn to_table(samples: &[BatchSample]) -> Table {
    Table::from_rows(
        batch_table_headers(),
        samples
            .iter()
            .map(|s| vec![s.sample.to_string(), s.order.clone(), s.tissue.clone()])
            .collect(),
    )
}

pub fn from_table(table: &Table) -> Result<Vec<BatchSample>, ReconcileError> {
    let sample = table.require_column("batch-sample table", SAMPLE_COLUMN)?;
    let order = table.require_column("batch-sample table", ORDER_COLUMN)?;
    let tissue = table.column_index(TISSUE_COLUMN);
    Ok(table
        .rows()
        .iter()
        .map(|row| BatchSample {
            sample: SampleKey::normalize(&row[sample]),
            order: row[order].trim().to_string(),
            tissue: tissue
                .map(|index| row[index].clone())
                .unwrap_or_else(|| UNKNOWN.to_string()),
        })
        .collect())
}
