use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;
use regex::Regex;
use tracing::{debug, warn};

use crate::batch::BatchFiles;
use crate::error::ReconcileError;

pub const METADATA_FALLBACK_PATTERN: &str = "DArT*extract*";

pub fn discover_batches(
    batch_dir: &Path,
    folder_pattern: &str,
) -> Result<Vec<BatchFiles>, ReconcileError> {
    let pattern = Regex::new(folder_pattern).map_err(|err| {
        ReconcileError::InvalidConfig(format!("batch folder pattern: {err}"))
    })?;
    if !batch_dir.is_dir() {
        warn!(dir = %batch_dir.display(), "batch directory not found");
        return Ok(Vec::new());
    }

    let mut folders = list_entries(batch_dir)?
        .into_iter()
        .filter(|(_, path)| path.is_dir())
        .filter(|(name, _)| pattern.is_match(name))
        .collect::<Vec<_>>();
    folders.sort_by(|a, b| a.0.cmp(&b.0));

    folders
        .into_iter()
        .map(|(order, path)| {
            let files = batch_files(&order, &path)?;
            debug!(
                order = %order,
                report = ?files.report,
                metadata = ?files.metadata,
                "batch discovered"
            );
            Ok(files)
        })
        .collect()
}

pub fn batch_files(order: &str, folder: &Path) -> Result<BatchFiles, ReconcileError> {
    let names = list_entries(folder)?
        .into_iter()
        .filter(|(_, path)| path.is_file())
        .map(|(name, _)| name)
        .collect::<Vec<_>>();

    let report_pattern = pattern(&format!("Report_{}*SNP*.csv", Pattern::escape(order)))?;
    let metadata_pattern = pattern(&format!("SampleFile*{}*", Pattern::escape(order)))?;
    let fallback_pattern = pattern(METADATA_FALLBACK_PATTERN)?;

    let report = pick(&names, &report_pattern);
    let metadata = pick(&names, &metadata_pattern).or_else(|| pick(&names, &fallback_pattern));

    Ok(BatchFiles {
        order: order.to_string(),
        report: report.map(|name| folder.join(name)),
        metadata: metadata.map(|name| folder.join(name)),
    })
}

fn pick<'a>(names: &'a [String], pattern: &Pattern) -> Option<&'a String> {
    names
        .iter()
        .filter(|name| pattern.matches(name))
        .min_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
}

fn pattern(raw: &str) -> Result<Pattern, ReconcileError> {
    Pattern::new(raw).map_err(|err| ReconcileError::InvalidConfig(format!("{raw}: {err}")))
}

fn list_entries(dir: &Path) -> Result<Vec<(String, PathBuf)>, ReconcileError> {
    let entries = fs::read_dir(dir)
        .map_err(|err| ReconcileError::Filesystem(format!("{}: {err}", dir.display())))?;
    let mut listed = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|err| ReconcileError::Filesystem(format!("{}: {err}", dir.display())))?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        listed.push((name, entry.path()));
    }
    Ok(listed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn shortest_report_name_wins() {
        let listed = names(&[
            "Report_DKo22-1234_SNP_mapping_2.csv",
            "Report_DKo22-1234_SNP_2.csv",
            "Report_DKo22-1234_SilicoDArT_1.csv",
        ]);
        let report = Pattern::new("Report_DKo22-1234*SNP*.csv").unwrap();
        assert_eq!(
            pick(&listed, &report).map(String::as_str),
            Some("Report_DKo22-1234_SNP_2.csv")
        );
    }

    #[test]
    fn equal_lengths_tie_break_by_name() {
        let listed = names(&["DArT_extract_b.csv", "DArT_extract_a.csv"]);
        let fallback = Pattern::new(METADATA_FALLBACK_PATTERN).unwrap();
        assert_eq!(
            pick(&listed, &fallback).map(String::as_str),
            Some("DArT_extract_a.csv")
        );
    }
}
