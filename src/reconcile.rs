use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;
use tracing::{info, warn};

use crate::batch::{ORDER_COLUMN, SAMPLE_COLUMN};
use crate::domain::{CanonicalField, SampleKey, harmonize_order_labels, is_missing};
use crate::error::ReconcileError;
use crate::table::Table;

pub const BATCH_SUFFIX: &str = "_batch";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub ledger_rows: usize,
    pub batch_rows: usize,
    pub combined_rows: usize,
    pub combined_per_order: BTreeMap<String, usize>,
    pub unmatched_ledger: usize,
    pub unmatched_batch: usize,
    pub order_labels_normalized: usize,
    pub order_conflicts: usize,
    pub ledger_orders: Vec<String>,
    pub batch_orders: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Unmatched {
    pub ledger: BTreeSet<SampleKey>,
    pub batch: BTreeSet<SampleKey>,
}

pub fn reconcile(ledger: &Table, batch: &Table) -> Result<(Table, Diagnostics), ReconcileError> {
    let ledger_key = ledger.require_column("survey ledger", CanonicalField::SampleName.column())?;
    let batch_key = batch.require_column("batch-sample table", SAMPLE_COLUMN)?;
    let batch_order = batch.require_column("batch-sample table", ORDER_COLUMN)?;

    let ledger_keys = keys(ledger, ledger_key);
    let batch_keys = keys(batch, batch_key);

    let mut by_key: HashMap<&SampleKey, Vec<usize>> = HashMap::new();
    for (index, key) in batch_keys.iter().enumerate() {
        if !key.is_empty() {
            by_key.entry(key).or_default().push(index);
        }
    }

    let kept_batch_columns = (0..batch.headers().len())
        .filter(|index| *index != batch_key)
        .collect::<Vec<_>>();
    let mut headers = ledger.headers().to_vec();
    for index in &kept_batch_columns {
        let name = &batch.headers()[*index];
        if ledger.has_column(name) {
            headers.push(format!("{name}{BATCH_SUFFIX}"));
        } else {
            headers.push(name.clone());
        }
    }

    let mut combined = Table::new(headers);
    let mut diagnostics = Diagnostics {
        ledger_rows: ledger.len(),
        batch_rows: batch.len(),
        ..Diagnostics::default()
    };
    for (row, key) in ledger.rows().iter().zip(&ledger_keys) {
        let Some(matches) = by_key.get(key) else {
            diagnostics.unmatched_ledger += 1;
            continue;
        };
        for batch_index in matches {
            let batch_row = &batch.rows()[*batch_index];
            let mut out = row.clone();
            out.extend(kept_batch_columns.iter().map(|index| batch_row[*index].clone()));
            combined.push_row(out);
        }
    }

    let ledger_key_set = ledger_keys
        .iter()
        .filter(|key| !key.is_empty())
        .collect::<HashSet<_>>();
    diagnostics.unmatched_batch = batch_keys
        .iter()
        .filter(|key| !ledger_key_set.contains(key))
        .count();

    diagnostics.batch_orders = distinct(batch.rows().iter().map(|row| row[batch_order].as_str()));
    if let Some(index) = ledger.column_index(CanonicalField::OrderNumber.column()) {
        diagnostics.ledger_orders = distinct(ledger.rows().iter().map(|row| row[index].as_str()));
    }

    let combined_order = combined
        .column_index(&order_column_name(ledger))
        .ok_or_else(|| ReconcileError::MissingColumn {
            table: "combined table".to_string(),
            column: ORDER_COLUMN.to_string(),
        })?;
    diagnostics.order_labels_normalized =
        normalize_survey_orders(&mut combined, &diagnostics.batch_orders);
    if let Some(survey_order) = combined.column_index(CanonicalField::OrderNumber.column()) {
        diagnostics.order_conflicts = combined
            .rows()
            .iter()
            .filter(|row| !is_missing(&row[survey_order]))
            .filter(|row| row[survey_order].trim() != row[combined_order].trim())
            .count();
    }

    for row in combined.rows() {
        *diagnostics
            .combined_per_order
            .entry(row[combined_order].trim().to_string())
            .or_insert(0) += 1;
    }
    diagnostics.combined_rows = combined.len();

    info!(
        combined = diagnostics.combined_rows,
        unmatched_ledger = diagnostics.unmatched_ledger,
        unmatched_batch = diagnostics.unmatched_batch,
        "reconciled survey ledger with batch samples"
    );
    if diagnostics.order_conflicts > 0 {
        warn!(count = diagnostics.order_conflicts, "survey order numbers disagree with batch orders");
    }

    Ok((combined, diagnostics))
}

pub fn unmatched(ledger: &Table, batch: &Table) -> Result<Unmatched, ReconcileError> {
    let ledger_key = ledger.require_column("survey ledger", CanonicalField::SampleName.column())?;
    let batch_key = batch.require_column("batch-sample table", SAMPLE_COLUMN)?;
    let ledger_keys = keys(ledger, ledger_key).into_iter().collect::<BTreeSet<_>>();
    let batch_keys = keys(batch, batch_key).into_iter().collect::<BTreeSet<_>>();

    let only = |side: &BTreeSet<SampleKey>, other: &BTreeSet<SampleKey>| {
        side.iter()
            .filter(|key| key.is_empty() || !other.contains(*key))
            .cloned()
            .collect::<BTreeSet<_>>()
    };
    Ok(Unmatched {
        ledger: only(&ledger_keys, &batch_keys),
        batch: only(&batch_keys, &ledger_keys),
    })
}

fn normalize_survey_orders(combined: &mut Table, batch_orders: &[String]) -> usize {
    let column = CanonicalField::OrderNumber.column();
    if !combined.has_column(column) {
        return 0;
    }
    let mut values = combined.column_values(column);
    let changed = harmonize_order_labels(&mut values, batch_orders);
    if changed > 0 {
        combined.set_column(column, values);
    }
    changed
}

fn order_column_name(ledger: &Table) -> String {
    if ledger.has_column(ORDER_COLUMN) {
        format!("{ORDER_COLUMN}{BATCH_SUFFIX}")
    } else {
        ORDER_COLUMN.to_string()
    }
}

fn keys(table: &Table, index: usize) -> Vec<SampleKey> {
    table
        .rows()
        .iter()
        .map(|row| SampleKey::normalize(&row[index]))
        .collect()
}

fn distinct<'a, I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .map(str::trim)
        .filter(|value| !is_missing(value))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
