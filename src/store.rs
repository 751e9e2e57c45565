use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;

use crate::config::ResolvedConfig;
use crate::error::ReconcileError;
use crate::table::Table;

pub const GLOBAL_LEDGER_FILE: &str = "ninox_merged.csv";
pub const BATCH_TABLE_FILE: &str = "all_dart_data.csv";
pub const COMBINED_FILE: &str = "combined_ninox_and_dart_data.csv";

#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
    source_dir: Utf8PathBuf,
    ledger_dir: Utf8PathBuf,
    batch_dir: Utf8PathBuf,
    batch_output_dir: Utf8PathBuf,
}

impl Store {
    pub fn new(config: &ResolvedConfig) -> Result<Self, ReconcileError> {
        let cwd = std::env::current_dir()
            .map_err(|err| ReconcileError::Filesystem(err.to_string()))?;
        let root = Utf8PathBuf::from_path_buf(cwd)
            .map_err(|_| ReconcileError::Filesystem("invalid working directory".to_string()))?;
        Ok(Self::new_with_root(root, config))
    }

    pub fn new_with_root(root: Utf8PathBuf, config: &ResolvedConfig) -> Self {
        Self {
            source_dir: root.join(&config.source_dir),
            ledger_dir: root.join(&config.ledger_dir),
            batch_dir: root.join(&config.batch_dir),
            batch_output_dir: root.join(&config.batch_output_dir),
            root,
        }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn source_path(&self, file_name: &str) -> Utf8PathBuf {
        self.source_dir.join(file_name)
    }

    pub fn category_ledger_path(&self, category: &str) -> Utf8PathBuf {
        self.ledger_dir.join(format!("ninox_merged_{category}.csv"))
    }

    pub fn global_ledger_path(&self) -> Utf8PathBuf {
        self.ledger_dir.join(GLOBAL_LEDGER_FILE)
    }

    pub fn batch_dir(&self) -> &Utf8Path {
        &self.batch_dir
    }

    pub fn batch_table_path(&self) -> Utf8PathBuf {
        self.batch_output_dir.join(BATCH_TABLE_FILE)
    }

    pub fn combined_path(&self) -> Utf8PathBuf {
        self.batch_output_dir.join(COMBINED_FILE)
    }

    pub fn exists(&self, path: &Utf8Path) -> bool {
        path.as_std_path().is_file()
    }

    pub fn write_table(path: &Utf8Path, table: &Table) -> Result<(), ReconcileError> {
        let content = table.to_csv_bytes()?;
        Self::write_bytes_atomic(path, &content)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), ReconcileError> {
        let write_err = |message: String| ReconcileError::TableWrite {
            path: path.as_std_path().to_path_buf(),
            message,
        };
        let parent = path
            .parent()
            .ok_or_else(|| write_err("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path()).map_err(|err| write_err(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix("ndr-table")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| write_err(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| write_err(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| write_err(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let config = ResolvedConfig::default();
        let store = Store::new_with_root(Utf8PathBuf::from("/work"), &config);

        assert!(
            store
                .category_ledger_path("Dog")
                .ends_with("ninox_merged/ninox_merged_Dog.csv")
        );
        assert!(
            store
                .global_ledger_path()
                .ends_with("ninox_merged/ninox_merged.csv")
        );
        assert!(
            store
                .batch_table_path()
                .ends_with("dart_merged/all_dart_data.csv")
        );
        assert!(store.source_path("4 - Genetics.csv").starts_with("/work/ninox"));
    }

    #[test]
    fn write_table_creates_parent_and_replaces() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let path = root.join("nested").join("out.csv");
        let table = Table::from_rows(vec!["a".to_string()], vec![vec!["1".to_string()]]);
        Store::write_table(&path, &table).unwrap();
        Store::write_table(&path, &table).unwrap();
        assert_eq!(std::fs::read_to_string(path.as_std_path()).unwrap(), "a\n1\n");
    }
}
