use chrono::NaiveDate;

use ninox_dart_reconcile::currency::{Currency, currency_of_table};
use ninox_dart_reconcile::domain::DateFormat;
use ninox_dart_reconcile::merge::append_delta;
use ninox_dart_reconcile::table::Table;

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn ledger(rows: &[[&str; 3]]) -> Table {
    Table::from_rows(
        strings(&["Sample.Name", "Survey.Date", "Extraction.ID"]),
        rows.iter().map(|row| strings(row)).collect(),
    )
}

#[test]
fn append_never_lowers_currency() {
    let existing = ledger(&[["SMP001", "2021-04-05", "E1"], ["SMP002", "", "E2"]]);
    let before = currency_of_table(&existing, "Survey.Date", DateFormat::Iso);

    let older = ledger(&[["SMP003", "2020-01-01", "E3"]]);
    let (appended, _) = append_delta(&existing, &older);
    let after = currency_of_table(&appended, "Survey.Date", DateFormat::Iso);
    assert_eq!(after, before);

    let newer = ledger(&[["SMP004", "2021-09-01", "E4"], ["SMP005", "2021-07-01", "E5"]]);
    let (appended, _) = append_delta(&appended, &newer);
    let after = currency_of_table(&appended, "Survey.Date", DateFormat::Iso);
    assert!(after >= before);
    assert_eq!(after, Currency::Known(date(2021, 9, 1)));
}

#[test]
fn currency_ignores_unknown_dates_but_keeps_rows() {
    let table = ledger(&[["SMP001", "", "E1"], ["SMP002", "not-a-date", "E2"]]);
    assert_eq!(
        currency_of_table(&table, "Survey.Date", DateFormat::Iso),
        Currency::Absent
    );
    assert_eq!(table.len(), 2);
}
