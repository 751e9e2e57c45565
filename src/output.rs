use std::io::{self, Write};

use serde::Serialize;

use crate::app::{Phase, ProgressEvent, ProgressSink};
use crate::merge::WriteMode;
use crate::report::RunReport;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &RunReport) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn event(&self, event: ProgressEvent) {
        let phase = match event.phase {
            Phase::Ledger => "ledger",
            Phase::Batches => "batches",
            Phase::Combine => "combine",
        };
        let mut stderr = io::stderr();
        let _ = match event.elapsed {
            Some(elapsed) => writeln!(
                stderr,
                "[{phase}] {} ({:.1}s)",
                event.message,
                elapsed.as_secs_f64()
            ),
            None => writeln!(stderr, "[{phase}] {}", event.message),
        };
    }
}

pub fn print_summary(report: &RunReport) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!("{cyan}ndr summary{reset}");

    if let Some(ledger) = &report.ledger {
        for outcome in &ledger.categories {
            let color = match outcome.write.mode {
                WriteMode::UpToDate => yellow,
                WriteMode::Overwrite | WriteMode::Append => green,
            };
            println!(
                "{color}  {:<14} {:<10} +{} rows (joined {}, latitudes fixed {}, currency {} -> {}){reset}",
                outcome.category,
                mode_label(outcome.write.mode),
                outcome.write.rows_written,
                outcome.stats.joined_rows,
                outcome.stats.latitude_corrections,
                outcome.write.currency_before,
                outcome.write.currency_after,
            );
        }
        for skipped in &ledger.skipped_categories {
            println!("{yellow}  {skipped:<14} skipped{reset}");
        }
        println!(
            "{green}  global ledger {} (+{} rows, {} total){reset}",
            mode_label(ledger.union.write.mode),
            ledger.union.write.rows_written,
            ledger.union.write.ledger_rows,
        );
    }

    if let Some(batches) = &report.batches {
        if batches.regathered {
            println!(
                "{green}  batches: {} parsed, {} skipped, {} samples{reset}",
                batches.batches.len(),
                batches.skipped_batches.len(),
                batches.total_samples
            );
        } else {
            println!(
                "{green}  batches: reused {} samples from {}{reset}",
                batches.total_samples, batches.path
            );
        }
    }

    if let Some(combine) = &report.combine {
        let d = &combine.diagnostics;
        println!(
            "{green}  combined: {} rows; unmatched ledger {}, unmatched batch {}, order conflicts {}{reset}",
            d.combined_rows, d.unmatched_ledger, d.unmatched_batch, d.order_conflicts
        );
        for (order, count) in &d.combined_per_order {
            println!("      {order}: {count}");
        }
    }

    let counts = report.condition_counts();
    if counts.is_empty() {
        println!("{green}  no conditions{reset}");
    } else {
        for (kind, count) in counts {
            println!("{yellow}  {kind}: {count}{reset}");
        }
    }
}

fn mode_label(mode: WriteMode) -> &'static str {
    match mode {
        WriteMode::Overwrite => "written",
        WriteMode::Append => "appended",
        WriteMode::UpToDate => "up to date",
    }
}
