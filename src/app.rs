use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::batch::{self, BatchSample, MetadataStatus, extract_batch};
use crate::config::ResolvedConfig;
use crate::discovery::discover_batches;
use crate::error::ReconcileError;
use crate::merge::{run_category, union_ledgers};
use crate::prompt::BatchDecision;
use crate::reconcile::reconcile;
use crate::report::{
    BatchReport, BatchSummary, CombineReport, Condition, LedgerReport, RunReport,
    category_conditions, union_conditions,
};
use crate::store::Store;
use crate::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Ledger,
    Batches,
    Combine,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone)]
pub struct Stage<T> {
    pub report: T,
    pub conditions: Vec<Condition>,
}

#[derive(Clone)]
pub struct App {
    store: Store,
    config: ResolvedConfig,
}

impl App {
    pub fn new(store: Store, config: ResolvedConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn batch_table_exists(&self) -> bool {
        self.store.exists(&self.store.batch_table_path())
    }

    pub fn run(
        &self,
        decision: BatchDecision,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, ReconcileError> {
        let started = Instant::now();
        let ledger = self.run_ledger(sink)?;
        let batches = self.run_batches(decision, sink)?;
        let combine = self.run_combine(sink)?;

        let mut conditions = ledger.conditions;
        conditions.extend(batches.conditions);
        conditions.extend(combine.conditions);
        info!(
            conditions = conditions.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "run finished"
        );

        Ok(RunReport {
            ledger: Some(ledger.report),
            batches: Some(batches.report),
            combine: combine.report,
            conditions,
        })
    }

    pub fn run_ledger(&self, sink: &dyn ProgressSink) -> Result<Stage<LedgerReport>, ReconcileError> {
        let started = Instant::now();
        let mut categories = Vec::new();
        let mut skipped_categories = Vec::new();
        let mut conditions = Vec::new();

        for category in &self.config.categories {
            emit(sink, Phase::Ledger, format!("merging {}", category.name), None);
            match run_category(&self.store, category) {
                Ok(outcome) => {
                    conditions.extend(category_conditions(&outcome));
                    categories.push(outcome);
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(category = %category.name, error = %err, "category skipped");
                    conditions.push(Condition::from_error(&category.name, &err));
                    skipped_categories.push(category.name.clone());
                }
            }
        }

        emit(sink, Phase::Ledger, "union of category ledgers".to_string(), None);
        let union = union_ledgers(&self.store, &self.config.categories)?;
        conditions.extend(union_conditions(&union));
        emit(
            sink,
            Phase::Ledger,
            format!("global ledger: {} rows", union.write.ledger_rows),
            Some(started.elapsed()),
        );

        Ok(Stage {
            report: LedgerReport {
                categories,
                skipped_categories,
                union,
            },
            conditions,
        })
    }

    pub fn run_batches(
        &self,
        decision: BatchDecision,
        sink: &dyn ProgressSink,
    ) -> Result<Stage<BatchReport>, ReconcileError> {
        let path = self.store.batch_table_path();
        if !decision.regathers() {
            emit(sink, Phase::Batches, "reusing batch-sample table".to_string(), None);
            let mut conditions = Vec::new();
            let total_samples = match Table::read(path.as_std_path())
                .and_then(|table| batch::from_table(&table))
            {
                Ok(samples) => samples.len(),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    conditions.push(Condition::from_error("batch-sample table", &err));
                    0
                }
            };
            return Ok(Stage {
                report: BatchReport {
                    regathered: false,
                    batches: Vec::new(),
                    skipped_batches: Vec::new(),
                    total_samples,
                    path: path.to_string(),
                },
                conditions,
            });
        }

        let started = Instant::now();
        let found = discover_batches(
            self.store.batch_dir().as_std_path(),
            &self.config.batch_folder_pattern,
        )?;
        info!(batches = found.len(), "extracting batches");

        let mut samples: Vec<BatchSample> = Vec::new();
        let mut batches = Vec::new();
        let mut skipped_batches = Vec::new();
        let mut conditions = Vec::new();
        for files in &found {
            emit(sink, Phase::Batches, format!("parsing {}", files.order), None);
            match extract_batch(files, &self.config.anchors, self.config.anchor_scan_rows) {
                Ok(extraction) => {
                    if let MetadataStatus::Malformed { reason } = &extraction.metadata {
                        conditions.push(Condition::MalformedMetadata {
                            order: extraction.order.clone(),
                            reason: reason.clone(),
                        });
                    }
                    batches.push(BatchSummary {
                        order: extraction.order.clone(),
                        report_file: extraction.report_file.display().to_string(),
                        anchor_row: extraction.layout.anchor_row,
                        anchor_column: extraction.layout.anchor_column,
                        samples: extraction.samples.len(),
                        duplicate_identifiers: extraction.duplicate_identifiers,
                        metadata: extraction.metadata,
                    });
                    samples.extend(extraction.samples);
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(order = %files.order, error = %err, "batch skipped");
                    conditions.push(Condition::from_error(&files.order, &err));
                    skipped_batches.push(files.order.clone());
                }
            }
        }

        Store::write_table(&path, &batch::to_table(&samples))?;
        emit(
            sink,
            Phase::Batches,
            format!("batch-sample table: {} rows", samples.len()),
            Some(started.elapsed()),
        );

        Ok(Stage {
            report: BatchReport {
                regathered: true,
                batches,
                skipped_batches,
                total_samples: samples.len(),
                path: path.to_string(),
            },
            conditions,
        })
    }

    pub fn run_combine(
        &self,
        sink: &dyn ProgressSink,
    ) -> Result<Stage<Option<CombineReport>>, ReconcileError> {
        emit(sink, Phase::Combine, "joining ledger with batch samples".to_string(), None);
        let mut conditions = Vec::new();

        let mut inputs = Vec::new();
        for path in [self.store.global_ledger_path(), self.store.batch_table_path()] {
            if !self.store.exists(&path) {
                warn!(path = %path, "combine input missing");
                conditions.push(Condition::MissingInput {
                    path: path.to_string(),
                });
                continue;
            }
            match Table::read(path.as_std_path()) {
                Ok(table) => inputs.push(table),
                Err(err) => conditions.push(Condition::from_error(path.as_str(), &err)),
            }
        }
        let [ledger, batch_samples] = inputs.as_slice() else {
            return Ok(Stage {
                report: None,
                conditions,
            });
        };

        let (combined, diagnostics) = match reconcile(ledger, batch_samples) {
            Ok(result) => result,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                conditions.push(Condition::from_error("combine", &err));
                return Ok(Stage {
                    report: None,
                    conditions,
                });
            }
        };

        let path = self.store.combined_path();
        Store::write_table(&path, &combined)?;
        emit(
            sink,
            Phase::Combine,
            format!("combined table: {} rows", combined.len()),
            None,
        );

        Ok(Stage {
            report: Some(CombineReport {
                path: path.to_string(),
                diagnostics,
            }),
            conditions,
        })
    }
}

fn emit(sink: &dyn ProgressSink, phase: Phase, message: String, elapsed: Option<Duration>) {
    sink.event(ProgressEvent {
        phase,
        message,
        elapsed,
    });
}
