use std::fs;
use std::path::Path;

use camino::Utf8PathBuf;
use chrono::NaiveDate;

use ninox_dart_reconcile::config::{ResolvedConfig, default_categories};
use ninox_dart_reconcile::currency::{Currency, currency_of};
use ninox_dart_reconcile::domain::{CategorySpec, DateFormat};
use ninox_dart_reconcile::merge::{WriteMode, persist_ledger, run_category, union_ledgers};
use ninox_dart_reconcile::store::Store;
use ninox_dart_reconcile::table::Table;

const DOG_PRIMARY: &str = "\
Projects,Council,Sample Name,Genetic ID,Scat ID,Genetic Latitude Pin,Genetic Longitude Pin,Survey Date
P1,Noosa,smp001 ,G1,S1,26.5,153.0,03/04/2021
P1,Noosa,SMP002,G2,S2,-26.6,153.1,05/04/2021
P1,Noosa,SMP009,G9,S9,-26.7,153.2,06/04/2021
";

const DOG_SECONDARY: &str = "\
Sample Name,Protocol,Date extracted,DART Sample ID (Sample name returned by DArT),Extraction ID,Genetic ID,DART Order Number
SMP001,Qiagen,04/10/2021,D1,E1,G1,DKo21-5970
smp002,Qiagen,04/11/2021,D2,E2,G2,Dko21-5970
SMP777,Qiagen,04/12/2021,D7,E7,G7,DKo21-5970
";

fn workspace() -> (tempfile::TempDir, Store) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let store = Store::new_with_root(root, &ResolvedConfig::default());
    (temp, store)
}

fn write_source(store: &Store, name: &str, content: &str) {
    let path = store.source_path(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn append_source(store: &Store, name: &str, line: &str) {
    let path = store.source_path(name);
    let mut content = fs::read_to_string(&path).unwrap();
    content.push_str(line);
    fs::write(path, content).unwrap();
}

fn category(name: &str) -> CategorySpec {
    default_categories()
        .into_iter()
        .find(|c| c.name == name)
        .unwrap()
}

fn ledger_currency(path: &Path) -> Currency {
    currency_of(path, "Survey.Date", DateFormat::Iso).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn first_run_writes_canonical_ledger() {
    let (_temp, store) = workspace();
    write_source(&store, "4 - Genetics.csv", DOG_PRIMARY);
    write_source(&store, "5 - Extractions.csv", DOG_SECONDARY);

    let outcome = run_category(&store, &category("Dog")).unwrap();
    assert!(!outcome.incremental);
    assert_eq!(outcome.write.mode, WriteMode::Overwrite);
    assert_eq!(outcome.stats.joined_rows, 2);
    assert_eq!(outcome.stats.unmatched_primary, 1);
    assert_eq!(outcome.stats.unmatched_secondary, 1);
    assert_eq!(outcome.stats.latitude_corrections, 1);
    assert_eq!(outcome.stats.order_labels_normalized, 1);

    let ledger = Table::read(store.category_ledger_path("Dog").as_std_path()).unwrap();
    assert_eq!(ledger.column_values("Sample.Name"), vec!["SMP001", "SMP002"]);
    assert_eq!(ledger.column_values("Latitude"), vec!["-26.5", "-26.6"]);
    assert_eq!(ledger.column_values("Survey.Type"), vec!["Dog", "Dog"]);
    assert_eq!(ledger.column_values("Survey.Date"), vec!["2021-04-03", "2021-04-05"]);
    assert_eq!(
        ledger.column_values("Date.Extraction"),
        vec!["2021-04-10", "2021-04-11"]
    );
    assert_eq!(
        ledger.column_values("Dart.Order.Number"),
        vec!["DKo21-5970", "DKo21-5970"]
    );
    assert_eq!(ledger.column_values("Council"), vec!["Noosa", "Noosa"]);
    assert_eq!(ledger.column_values("Genetic.ID_e"), vec!["G1", "G2"]);
    assert!(!ledger.has_column("Protocol"));
}

#[test]
fn merge_without_prior_ledger_is_idempotent() {
    let (_temp, store) = workspace();
    write_source(&store, "4 - Genetics.csv", DOG_PRIMARY);
    write_source(&store, "5 - Extractions.csv", DOG_SECONDARY);
    let path = store.category_ledger_path("Dog");

    run_category(&store, &category("Dog")).unwrap();
    let first = fs::read(&path).unwrap();
    fs::remove_file(&path).unwrap();
    run_category(&store, &category("Dog")).unwrap();
    let second = fs::read(&path).unwrap();

    assert_eq!(first, second);
}

#[test]
fn incremental_append_advances_currency() {
    let (_temp, store) = workspace();
    write_source(&store, "4 - Genetics.csv", DOG_PRIMARY);
    write_source(&store, "5 - Extractions.csv", DOG_SECONDARY);
    let path = store.category_ledger_path("Dog");

    run_category(&store, &category("Dog")).unwrap();
    let before = ledger_currency(path.as_std_path());
    assert_eq!(before, Currency::Known(date(2021, 4, 5)));

    append_source(
        &store,
        "4 - Genetics.csv",
        "P1,Noosa,SMP003,G3,S3,-26.8,153.3,10/06/2021\n",
    );
    append_source(
        &store,
        "5 - Extractions.csv",
        "SMP003,Qiagen,07/01/2021,D3,E3,G3,DKo21-6001\n",
    );

    let outcome = run_category(&store, &category("Dog")).unwrap();
    assert!(outcome.incremental);
    assert_eq!(outcome.write.mode, WriteMode::Append);
    assert_eq!(outcome.write.rows_written, 1);
    assert_eq!(outcome.write.ledger_rows, 3);

    let after = ledger_currency(path.as_std_path());
    assert!(after >= before);
    assert_eq!(after, Currency::Known(date(2021, 6, 10)));
}

#[test]
fn unchanged_sources_leave_ledger_untouched() {
    let (_temp, store) = workspace();
    write_source(&store, "4 - Genetics.csv", DOG_PRIMARY);
    write_source(&store, "5 - Extractions.csv", DOG_SECONDARY);
    let path = store.category_ledger_path("Dog");

    run_category(&store, &category("Dog")).unwrap();
    let first = fs::read(&path).unwrap();
    let outcome = run_category(&store, &category("Dog")).unwrap();

    assert_eq!(outcome.write.mode, WriteMode::UpToDate);
    assert_eq!(fs::read(&path).unwrap(), first);
}

#[test]
fn non_dog_categories_carry_absent_extras() {
    let (_temp, store) = workspace();
    write_source(&store, "6 - Drone Genetics.csv", DOG_PRIMARY);
    write_source(&store, "7 - Drone Extractions.csv", DOG_SECONDARY);

    run_category(&store, &category("Drone")).unwrap();
    let ledger = Table::read(store.category_ledger_path("Drone").as_std_path()).unwrap();
    assert_eq!(ledger.column_values("Council"), vec!["NA", "NA"]);
    assert_eq!(ledger.column_values("Scat.ID"), vec!["NA", "NA"]);
    assert_eq!(ledger.column_values("Survey.Type"), vec!["Drone", "Drone"]);
}

#[test]
fn union_respects_global_currency() {
    let (_temp, store) = workspace();
    write_source(&store, "4 - Genetics.csv", DOG_PRIMARY);
    write_source(&store, "5 - Extractions.csv", DOG_SECONDARY);
    let categories = vec![category("Dog"), category("Drone")];

    run_category(&store, &categories[0]).unwrap();
    let first = union_ledgers(&store, &categories).unwrap();
    assert_eq!(first.included, vec!["Dog"]);
    assert_eq!(first.missing, vec!["Drone"]);
    assert_eq!(first.write.mode, WriteMode::Overwrite);
    assert_eq!(first.write.ledger_rows, 2);

    let second = union_ledgers(&store, &categories).unwrap();
    assert_eq!(second.write.mode, WriteMode::UpToDate);

    write_source(&store, "6 - Drone Genetics.csv", DOG_PRIMARY);
    write_source(&store, "7 - Drone Extractions.csv", DOG_SECONDARY);
    append_source(
        &store,
        "6 - Drone Genetics.csv",
        "P2,,SMP004,G4,,-27.0,152.0,01/09/2021\n",
    );
    append_source(
        &store,
        "7 - Drone Extractions.csv",
        "SMP004,Qiagen,09/15/2021,D4,E4,G4,DKo21-6100\n",
    );
    run_category(&store, &categories[1]).unwrap();

    let third = union_ledgers(&store, &categories).unwrap();
    assert_eq!(third.write.mode, WriteMode::Append);
    assert_eq!(third.write.rows_written, 1);
    assert_eq!(third.write.ledger_rows, 3);
    assert_eq!(third.write.currency_after, "2021-09-01");
}

#[test]
fn append_keeps_repeated_identity_and_counts_it() {
    let (_temp, store) = workspace();
    let path = store.category_ledger_path("Dog");
    let headers = vec![
        "Sample.Name".to_string(),
        "Survey.Date".to_string(),
        "Extraction.ID".to_string(),
    ];
    let row = vec![
        "SMP001".to_string(),
        "2021-01-01".to_string(),
        "E1".to_string(),
    ];
    let existing = Table::from_rows(headers.clone(), vec![row.clone()]);
    persist_ledger(&path, &existing, Currency::Absent).unwrap();

    let delta = Table::from_rows(headers, vec![row]);
    let write = persist_ledger(&path, &delta, Currency::Known(date(2021, 1, 1))).unwrap();

    assert_eq!(write.mode, WriteMode::Append);
    assert_eq!(write.rows_written, 1);
    assert_eq!(write.identity_collisions, 1);
    assert_eq!(write.duplicate_rows, 1);
    assert_eq!(write.ledger_rows, 2);
    assert_eq!(Table::read(path.as_std_path()).unwrap().len(), 2);
}
