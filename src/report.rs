use serde::Serialize;
use tracing::warn;

use crate::batch::MetadataStatus;
use crate::error::ReconcileError;
use crate::merge::{CategoryOutcome, UnionOutcome};
use crate::reconcile::Diagnostics;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Condition {
    MissingSource { scope: String, path: String },
    MalformedSource { scope: String, message: String },
    SchemaGap { scope: String, field: String },
    UnparsableDates { scope: String, column: String, count: usize },
    DuplicateRows { scope: String, count: usize },
    MissingCategoryLedger { category: String },
    NoReport { order: String },
    MalformedLayout { order: String, reason: String },
    MalformedMetadata { order: String, reason: String },
    MissingInput { path: String },
}

impl Condition {
    pub fn from_error(scope: &str, error: &ReconcileError) -> Self {
        let condition = match error {
            ReconcileError::MissingSource(path) => Condition::MissingSource {
                scope: scope.to_string(),
                path: path.display().to_string(),
            },
            ReconcileError::NoReport(order) => Condition::NoReport {
                order: order.clone(),
            },
            ReconcileError::MalformedLayout { reason, .. } => Condition::MalformedLayout {
                order: scope.to_string(),
                reason: reason.clone(),
            },
            ReconcileError::MalformedMetadata { reason, .. } => Condition::MalformedMetadata {
                order: scope.to_string(),
                reason: reason.clone(),
            },
            other => Condition::MalformedSource {
                scope: scope.to_string(),
                message: other.to_string(),
            },
        };
        warn!(scope, condition = ?condition, "condition recorded");
        condition
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Condition::MissingSource { .. } => "missing-source",
            Condition::MalformedSource { .. } => "malformed-source",
            Condition::SchemaGap { .. } => "schema-gap",
            Condition::UnparsableDates { .. } => "unparsable-dates",
            Condition::DuplicateRows { .. } => "duplicate-rows",
            Condition::MissingCategoryLedger { .. } => "missing-category-ledger",
            Condition::NoReport { .. } => "no-report",
            Condition::MalformedLayout { .. } => "malformed-layout",
            Condition::MalformedMetadata { .. } => "malformed-metadata",
            Condition::MissingInput { .. } => "missing-input",
        }
    }
}

pub fn category_conditions(outcome: &CategoryOutcome) -> Vec<Condition> {
    let scope = &outcome.category;
    let mut conditions = outcome
        .stats
        .unresolved_fields
        .iter()
        .map(|field| Condition::SchemaGap {
            scope: scope.clone(),
            field: field.clone(),
        })
        .collect::<Vec<_>>();
    if outcome.stats.unknown_survey_dates > 0 {
        conditions.push(Condition::UnparsableDates {
            scope: scope.clone(),
            column: "Survey.Date".to_string(),
            count: outcome.stats.unknown_survey_dates,
        });
    }
    if outcome.stats.unknown_extraction_dates > 0 {
        conditions.push(Condition::UnparsableDates {
            scope: scope.clone(),
            column: "Date.Extraction".to_string(),
            count: outcome.stats.unknown_extraction_dates,
        });
    }
    if outcome.write.duplicate_rows > 0 {
        conditions.push(Condition::DuplicateRows {
            scope: scope.clone(),
            count: outcome.write.duplicate_rows,
        });
    }
    conditions
}

pub fn union_conditions(outcome: &UnionOutcome) -> Vec<Condition> {
    let mut conditions = outcome
        .missing
        .iter()
        .map(|category| Condition::MissingCategoryLedger {
            category: category.clone(),
        })
        .collect::<Vec<_>>();
    conditions.extend(
        outcome
            .unreadable
            .iter()
            .map(|ledger| Condition::MalformedSource {
                scope: ledger.scope.clone(),
                message: ledger.message.clone(),
            }),
    );
    if outcome.write.duplicate_rows > 0 {
        conditions.push(Condition::DuplicateRows {
            scope: "global".to_string(),
            count: outcome.write.duplicate_rows,
        });
    }
    conditions
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerReport {
    pub categories: Vec<CategoryOutcome>,
    pub skipped_categories: Vec<String>,
    pub union: UnionOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub order: String,
    pub report_file: String,
    pub anchor_row: usize,
    pub anchor_column: usize,
    pub samples: usize,
    pub duplicate_identifiers: usize,
    pub metadata: MetadataStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub regathered: bool,
    pub batches: Vec<BatchSummary>,
    pub skipped_batches: Vec<String>,
    pub total_samples: usize,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CombineReport {
    pub path: String,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub ledger: Option<LedgerReport>,
    pub batches: Option<BatchReport>,
    pub combine: Option<CombineReport>,
    pub conditions: Vec<Condition>,
}

impl RunReport {
    pub fn condition_counts(&self) -> Vec<(&'static str, usize)> {
        let mut counts: Vec<(&'static str, usize)> = Vec::new();
        for condition in &self.conditions {
            let kind = condition.kind();
            match counts.iter_mut().find(|(seen, _)| *seen == kind) {
                Some((_, count)) => *count += 1,
                None => counts.push((kind, 1)),
            }
        }
        counts
    }
}
