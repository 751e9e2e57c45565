use std::collections::{HashMap, HashSet};

use camino::Utf8Path;
use serde::Serialize;
use tracing::{info, warn};

use crate::currency::{Currency, currency_of, currency_of_table};
use crate::domain::{
    ABSENT, CanonicalField, CategorySpec, DateFormat, format_iso, harmonize_order_labels,
    normalize_key,
};
use crate::error::ReconcileError;
use crate::harmonize::{Harmonized, harmonize};
use crate::store::Store;
use crate::table::Table;

pub const SECONDARY_SUFFIX: &str = "_e";

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeStats {
    pub primary_rows: usize,
    pub secondary_rows: usize,
    pub joined_rows: usize,
    pub unmatched_primary: usize,
    pub unmatched_secondary: usize,
    pub latitude_corrections: usize,
    pub order_labels_normalized: usize,
    pub unknown_survey_dates: usize,
    pub unknown_extraction_dates: usize,
    pub unresolved_fields: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteMode {
    Overwrite,
    Append,
    UpToDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerWrite {
    pub path: String,
    pub mode: WriteMode,
    pub rows_written: usize,
    pub identity_collisions: usize,
    pub duplicate_rows: usize,
    pub ledger_rows: usize,
    pub currency_before: String,
    pub currency_after: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryOutcome {
    pub category: String,
    pub incremental: bool,
    pub stats: MergeStats,
    pub write: LedgerWrite,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnionOutcome {
    pub included: Vec<String>,
    pub missing: Vec<String>,
    pub unreadable: Vec<UnreadableLedger>,
    pub write: LedgerWrite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnreadableLedger {
    pub scope: String,
    pub message: String,
}

impl UnreadableLedger {
    fn new(scope: &str, error: &ReconcileError) -> Self {
        warn!(scope, error = %error, "ledger left out of union");
        Self {
            scope: scope.to_string(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedCategory {
    pub primary: Harmonized,
    pub secondary: Harmonized,
    pub unknown_survey_dates: usize,
    pub unknown_extraction_dates: usize,
}

enum Source {
    Primary(usize),
    Secondary(usize),
    Constant(&'static str),
}

pub fn load_category(
    store: &Store,
    category: &CategorySpec,
) -> Result<LoadedCategory, ReconcileError> {
    let primary_raw = Table::read(store.source_path(&category.primary_file).as_std_path())?;
    let secondary_raw = Table::read(store.source_path(&category.secondary_file).as_std_path())?;

    let mut primary = harmonize(primary_raw, &category.primary_aliases, category);
    let mut secondary = harmonize(secondary_raw, &category.secondary_aliases, category);
    primary.resolve_with(CanonicalField::SurveyType, &category.name);

    let mut unknown_survey_dates = 0;
    let mut unknown_extraction_dates = 0;
    for side in [&mut primary, &mut secondary] {
        unknown_survey_dates += normalize_dates(
            &mut side.table,
            CanonicalField::SurveyDate.column(),
            DateFormat::DayFirst,
        );
        unknown_extraction_dates += normalize_dates(
            &mut side.table,
            CanonicalField::ExtractionDate.column(),
            DateFormat::MonthFirst,
        );
    }

    info!(
        category = %category.name,
        primary_rows = primary.table.len(),
        secondary_rows = secondary.table.len(),
        unresolved = ?primary.unresolved,
        "loaded category sources"
    );

    Ok(LoadedCategory {
        primary,
        secondary,
        unknown_survey_dates,
        unknown_extraction_dates,
    })
}

pub fn normalize_dates(table: &mut Table, column: &str, source: DateFormat) -> usize {
    let Some(index) = table.column_index(column) else {
        return 0;
    };
    let values = table
        .rows()
        .iter()
        .map(|row| {
            let raw = &row[index];
            source.parse(raw).or_else(|| DateFormat::Iso.parse(raw))
        })
        .collect::<Vec<_>>();
    let unknown = values.iter().filter(|value| value.is_none()).count();
    table.set_column(column, values.into_iter().map(format_iso).collect());
    unknown
}

pub fn filter_delta(loaded: &mut LoadedCategory, currency: Currency) {
    if currency.is_absent() {
        return;
    }
    retain_newer(
        &mut loaded.primary.table,
        CanonicalField::SurveyDate.column(),
        currency,
    );
    retain_newer(
        &mut loaded.secondary.table,
        CanonicalField::ExtractionDate.column(),
        currency,
    );
}

fn retain_newer(table: &mut Table, column: &str, currency: Currency) {
    let index = table.column_index(column);
    table.retain_rows(|row| {
        let date = index.and_then(|index| DateFormat::Iso.parse(&row[index]));
        currency.admits(date)
    });
}

pub fn merge_category(
    category: &CategorySpec,
    primary: &Harmonized,
    secondary: &Harmonized,
) -> Result<(Table, MergeStats), ReconcileError> {
    let key_column = CanonicalField::SampleName.column();
    let primary_key =
        primary
            .table
            .require_column(&format!("{} primary", category.name), key_column)?;
    let secondary_key =
        secondary
            .table
            .require_column(&format!("{} secondary", category.name), key_column)?;

    let mut stats = MergeStats {
        primary_rows: primary.table.len(),
        secondary_rows: secondary.table.len(),
        ..MergeStats::default()
    };

    let mut plan: Vec<(String, Source)> = Vec::new();
    for field in CanonicalField::ALL {
        let column = field.column();
        let source = if field.is_category_extra() && !category.keeps_extra(field) {
            Source::Constant(ABSENT)
        } else if let Some(index) = primary.table.column_index(column) {
            Source::Primary(index)
        } else if let Some(index) = secondary.table.column_index(column) {
            Source::Secondary(index)
        } else {
            stats.unresolved_fields.push(column.to_string());
            Source::Constant(ABSENT)
        };
        plan.push((column.to_string(), source));
    }
    for field in CanonicalField::ALL {
        if field == CanonicalField::SampleName || field == CanonicalField::SurveyType {
            continue;
        }
        let column = field.column();
        if let (Some(_), Some(index)) = (
            primary.table.column_index(column),
            secondary.table.column_index(column),
        ) {
            plan.push((format!("{column}{SECONDARY_SUFFIX}"), Source::Secondary(index)));
        }
    }

    let primary_keys = primary
        .table
        .rows()
        .iter()
        .map(|row| normalize_key(&row[primary_key]))
        .collect::<Vec<_>>();
    let secondary_keys = secondary
        .table
        .rows()
        .iter()
        .map(|row| normalize_key(&row[secondary_key]))
        .collect::<Vec<_>>();

    let mut by_key: HashMap<&str, Vec<usize>> = HashMap::new();
    for (index, key) in secondary_keys.iter().enumerate() {
        if !key.is_empty() {
            by_key.entry(key.as_str()).or_default().push(index);
        }
    }
    let primary_set = primary_keys
        .iter()
        .filter(|key| !key.is_empty())
        .map(String::as_str)
        .collect::<HashSet<_>>();
    stats.unmatched_secondary = secondary_keys
        .iter()
        .filter(|key| !primary_set.contains(key.as_str()))
        .count();

    let mut order = (0..primary_keys.len()).collect::<Vec<_>>();
    order.sort_by(|a, b| primary_keys[*a].cmp(&primary_keys[*b]));

    let mut out = Table::new(plan.iter().map(|(name, _)| name.clone()).collect());
    for primary_index in order {
        let key = primary_keys[primary_index].as_str();
        let Some(matches) = by_key.get(key).filter(|_| !key.is_empty()) else {
            stats.unmatched_primary += 1;
            continue;
        };
        let primary_row = &primary.table.rows()[primary_index];
        for secondary_index in matches {
            let secondary_row = &secondary.table.rows()[*secondary_index];
            let row = plan
                .iter()
                .map(|(name, source)| {
                    if name == key_column {
                        return key.to_string();
                    }
                    match source {
                        Source::Primary(index) => primary_row[*index].clone(),
                        Source::Secondary(index) => secondary_row[*index].clone(),
                        Source::Constant(value) => value.to_string(),
                    }
                })
                .collect();
            out.push_row(row);
        }
    }
    stats.joined_rows = out.len();

    stats.latitude_corrections = correct_latitudes(&mut out);
    if stats.latitude_corrections > 0 {
        warn!(
            category = %category.name,
            count = stats.latitude_corrections,
            "positive latitudes negated (export without field settings?)"
        );
    }

    let mut labels = out.column_values(CanonicalField::OrderNumber.column());
    stats.order_labels_normalized = harmonize_order_labels(&mut labels, &[]);
    if stats.order_labels_normalized > 0 {
        out.set_column(CanonicalField::OrderNumber.column(), labels);
    }

    if stats.unmatched_secondary > 0 {
        info!(
            category = %category.name,
            count = stats.unmatched_secondary,
            "secondary rows without a primary match"
        );
    }

    Ok((out, stats))
}

pub fn correct_latitudes(table: &mut Table) -> usize {
    table.map_column(CanonicalField::Latitude.column(), |raw| {
        let value = raw.trim().parse::<f64>().ok()?;
        (value > 0.0).then(|| format!("{}", -value))
    })
}

/// Appends every `delta` row to `existing`. Rows whose (sample name, survey
/// date, extraction id) is already in the ledger are kept and only counted.
pub fn append_delta(existing: &Table, delta: &Table) -> (Table, usize) {
    let known = existing
        .rows()
        .iter()
        .map(|row| identity(existing, row))
        .collect::<HashSet<_>>();
    let collisions = delta
        .rows()
        .iter()
        .filter(|row| known.contains(&identity(delta, row)))
        .count();
    (Table::concat([existing, delta]), collisions)
}

fn identity(table: &Table, row: &[String]) -> (String, String, String) {
    let cell = |field: CanonicalField| {
        table
            .column_index(field.column())
            .map(|index| row[index].trim().to_string())
            .unwrap_or_default()
    };
    (
        normalize_key(&cell(CanonicalField::SampleName)),
        cell(CanonicalField::SurveyDate),
        cell(CanonicalField::ExtractionId),
    )
}

pub fn count_duplicate_rows(table: &Table) -> usize {
    let mut seen = HashSet::new();
    table
        .rows()
        .iter()
        .filter(|row| !seen.insert(row.as_slice()))
        .count()
}

/// Writes `delta` to the ledger at `path`: a full overwrite when there is no
/// ledger or its currency is absent, otherwise an append of every delta row.
pub fn persist_ledger(
    path: &Utf8Path,
    delta: &Table,
    currency: Currency,
) -> Result<LedgerWrite, ReconcileError> {
    let survey_date = CanonicalField::SurveyDate.column();
    let exists = path.as_std_path().is_file();

    let (ledger, mode, identity_collisions) = if !exists || currency.is_absent() {
        (delta.clone(), WriteMode::Overwrite, 0)
    } else {
        let existing = Table::read(path.as_std_path())?;
        let (ledger, collisions) = append_delta(&existing, delta);
        (ledger, WriteMode::Append, collisions)
    };

    Store::write_table(path, &ledger)?;

    let duplicate_rows = count_duplicate_rows(&ledger);
    if duplicate_rows > 0 {
        warn!(path = %path, duplicate_rows, "ledger contains repeated rows");
    }
    if identity_collisions > 0 {
        warn!(path = %path, identity_collisions, "appended rows repeat a sample already in the ledger");
    }

    Ok(LedgerWrite {
        path: path.to_string(),
        mode,
        rows_written: delta.len(),
        identity_collisions,
        duplicate_rows,
        ledger_rows: ledger.len(),
        currency_before: currency.to_string(),
        currency_after: currency_of_table(&ledger, survey_date, DateFormat::Iso).to_string(),
    })
}

fn untouched(path: &Utf8Path, currency: Currency) -> LedgerWrite {
    LedgerWrite {
        path: path.to_string(),
        mode: WriteMode::UpToDate,
        rows_written: 0,
        identity_collisions: 0,
        duplicate_rows: 0,
        ledger_rows: 0,
        currency_before: currency.to_string(),
        currency_after: currency.to_string(),
    }
}

pub fn run_category(
    store: &Store,
    category: &CategorySpec,
) -> Result<CategoryOutcome, ReconcileError> {
    let ledger_path = store.category_ledger_path(&category.name);
    let currency = currency_of(
        ledger_path.as_std_path(),
        CanonicalField::SurveyDate.column(),
        DateFormat::Iso,
    )?;
    let incremental = store.exists(&ledger_path) && !currency.is_absent();
    info!(category = %category.name, %currency, incremental, "merging category");

    let mut loaded = load_category(store, category)?;
    if incremental {
        filter_delta(&mut loaded, currency);
    }

    let (merged, mut stats) = merge_category(category, &loaded.primary, &loaded.secondary)?;
    stats.unknown_survey_dates = loaded.unknown_survey_dates;
    stats.unknown_extraction_dates = loaded.unknown_extraction_dates;

    let write = if incremental && merged.is_empty() {
        info!(category = %category.name, "no rows newer than ledger currency");
        untouched(&ledger_path, currency)
    } else {
        persist_ledger(&ledger_path, &merged, currency)?
    };
    info!(
        category = %category.name,
        mode = ?write.mode,
        rows = write.rows_written,
        "category ledger updated"
    );

    Ok(CategoryOutcome {
        category: category.name.clone(),
        incremental,
        stats,
        write,
    })
}

/// Unions the category ledgers into the global ledger, gated on the global
/// ledger's own currency. An unreadable category ledger is left out; an
/// unreadable global ledger is left untouched.
pub fn union_ledgers(
    store: &Store,
    categories: &[CategorySpec],
) -> Result<UnionOutcome, ReconcileError> {
    let survey_date = CanonicalField::SurveyDate.column();
    let global_path = store.global_ledger_path();
    let mut unreadable = Vec::new();
    let currency = match currency_of(global_path.as_std_path(), survey_date, DateFormat::Iso) {
        Ok(currency) => currency,
        Err(err) if err.is_fatal() => return Err(err),
        Err(err) => {
            unreadable.push(UnreadableLedger::new("global", &err));
            return Ok(UnionOutcome {
                included: Vec::new(),
                missing: Vec::new(),
                unreadable,
                write: untouched(&global_path, Currency::Absent),
            });
        }
    };
    let incremental = store.exists(&global_path) && !currency.is_absent();

    let mut included = Vec::new();
    let mut missing = Vec::new();
    let mut parts = Vec::new();
    for category in categories {
        let path = store.category_ledger_path(&category.name);
        if !store.exists(&path) {
            warn!(category = %category.name, "no category ledger to union");
            missing.push(category.name.clone());
            continue;
        }
        let mut ledger = match Table::read(path.as_std_path()) {
            Ok(ledger) => ledger,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                unreadable.push(UnreadableLedger::new(&category.name, &err));
                continue;
            }
        };
        if incremental {
            retain_newer(&mut ledger, survey_date, currency);
        }
        included.push(category.name.clone());
        parts.push(ledger);
    }

    let delta = Table::concat(parts.iter());
    info!(rows = delta.len(), %currency, incremental, "union of category ledgers");

    let write = if parts.is_empty() || (incremental && delta.is_empty()) {
        untouched(&global_path, currency)
    } else {
        persist_ledger(&global_path, &delta, currency)?
    };

    Ok(UnionOutcome {
        included,
        missing,
        unreadable,
        write,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn latitude_correction_is_idempotent() {
        let mut table = Table::from_rows(
            strings(&["Latitude"]),
            vec![
                strings(&["27.5"]),
                strings(&["-26.1"]),
                strings(&[""]),
                strings(&["0"]),
            ],
        );
        assert_eq!(correct_latitudes(&mut table), 1);
        let once = table.clone();
        assert_eq!(correct_latitudes(&mut table), 0);
        assert_eq!(table, once);
        assert_eq!(table.rows()[0][0], "-27.5");
    }

    #[test]
    fn dates_become_iso_or_unknown() {
        let mut table = Table::from_rows(
            strings(&["Survey.Date"]),
            vec![
                strings(&["03/04/2021"]),
                strings(&["2021-05-06"]),
                strings(&["not a date"]),
            ],
        );
        let unknown = normalize_dates(&mut table, "Survey.Date", DateFormat::DayFirst);
        assert_eq!(unknown, 1);
        assert_eq!(
            table.column_values("Survey.Date"),
            strings(&["2021-04-03", "2021-05-06", ""])
        );
    }

    #[test]
    fn append_keeps_rows_with_known_identity() {
        let headers = strings(&["Sample.Name", "Survey.Date", "Extraction.ID"]);
        let existing = Table::from_rows(
            headers.clone(),
            vec![strings(&["SMP001", "2021-01-01", "E1"])],
        );
        let delta = Table::from_rows(
            headers,
            vec![
                strings(&["smp001 ", "2021-01-01", "E1"]),
                strings(&["SMP001", "2021-01-01", "E2"]),
            ],
        );
        let (ledger, collisions) = append_delta(&existing, &delta);
        assert_eq!(collisions, 1);
        assert_eq!(ledger.len(), 3);
        assert_eq!(count_duplicate_rows(&ledger), 0);
    }
}
