//! # Workflow Orchestrator
//!
//! Orchestratore principale che costruisce la lista dei target, gestisce il
//! progresso e il flag `busy`, e delega l'elaborazione al `WorkerPool`.
//!
//! ## Entry point:
//! - `run_single`: elabora esattamente un task (pool di dimensione 1)
//! - `run_batch`: elabora tutti i task selezionati e non in elaborazione
//!
//! ## Flag busy:
//! Attivo per tutta la durata di un batch; blocca un secondo batch,
//! `clear_queue` e l'export.

use crate::{
    adapter::ImageEditor,
    config::WorkflowConfig,
    error::WorkflowError,
    json_output::{JsonConfig, JsonMessage},
    processor::{TaskOutcome, TaskProcessor},
    progress::{Progress, ProgressDisplay, ProgressTracker, RunStats},
    scheduler::{Target, WorkerPool},
    task::{ImageReference, ImageTask, TaskId, TaskStatus, TaskStore},
};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Result of a finished batch run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub progress: Progress,
    pub stats: RunStats,
}

/// One completed result handed to the exporter
#[derive(Debug, Clone)]
pub struct ExportItem {
    pub file_name: String,
    pub reference: ImageReference,
}

/// Clears the busy flag when the batch ends, also on error
struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self, WorkflowError> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| Self(flag.clone()))
            .map_err(|_| WorkflowError::Busy)
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Orchestratore del workflow
pub struct Workflow {
    config: WorkflowConfig,
    store: TaskStore,
    editor: Arc<dyn ImageEditor>,
    tracker: ProgressTracker,
    busy: Arc<AtomicBool>,
    input_dir: Option<PathBuf>,
}

impl Workflow {
    pub fn new(config: WorkflowConfig, editor: Arc<dyn ImageEditor>) -> Self {
        let display = if config.json_output {
            ProgressDisplay::Json
        } else {
            ProgressDisplay::Hidden
        };
        Self {
            config,
            store: TaskStore::default(),
            editor,
            tracker: ProgressTracker::new(display),
            busy: Arc::new(AtomicBool::new(false)),
            input_dir: None,
        }
    }

    /// Overrides how progress is reported
    pub fn with_display(mut self, display: ProgressDisplay) -> Self {
        self.tracker = ProgressTracker::new(display);
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub async fn progress(&self) -> Progress {
        self.tracker.snapshot().await
    }

    pub async fn tasks(&self) -> Vec<ImageTask> {
        self.store.snapshot().await
    }

    /// Appends loaded tasks to the queue
    pub async fn add_tasks(&mut self, input_dir: Option<PathBuf>, tasks: Vec<ImageTask>) {
        if input_dir.is_some() {
            self.input_dir = input_dir;
        }
        self.store.extend(tasks).await;
    }

    pub async fn set_selected(&self, id: TaskId, selected: bool) -> Result<(), WorkflowError> {
        self.store
            .update(id, |task| task.selected = selected)
            .await
            .ok_or(WorkflowError::UnknownTask(id))
    }

    pub async fn select_all(&self, selected: bool) {
        self.store
            .transform(|tasks| tasks.iter_mut().for_each(|t| t.selected = selected))
            .await;
    }

    /// Ids of tasks whose last attempt failed
    pub async fn retry_targets(&self) -> Vec<TaskId> {
        self.store
            .snapshot()
            .await
            .iter()
            .filter(|t| t.error().is_some())
            .map(ImageTask::id)
            .collect()
    }

    /// Drops every task; refused while a batch is running
    pub async fn clear_queue(&self) -> Result<usize, WorkflowError> {
        if self.is_busy() {
            return Err(WorkflowError::Busy);
        }
        Ok(self.store.clear().await)
    }

    /// Completed results, refused while a batch is running
    pub async fn export_items(&self) -> Result<Vec<ExportItem>, WorkflowError> {
        if self.is_busy() {
            return Err(WorkflowError::Busy);
        }
        Ok(self
            .store
            .snapshot()
            .await
            .into_iter()
            .filter_map(|task| {
                task.edited_reference().cloned().map(|reference| ExportItem {
                    file_name: task.file_name.clone(),
                    reference,
                })
            })
            .collect())
    }

    fn processor(&self) -> TaskProcessor {
        TaskProcessor::new(self.editor.clone(), self.store.clone(), &self.config.prompt)
    }

    fn check_prompt(&self) -> Result<(), WorkflowError> {
        if self.config.has_prompt() {
            Ok(())
        } else {
            Err(WorkflowError::EmptyPrompt)
        }
    }

    /// Elabora un solo task, come il retry inline
    pub async fn run_single(&self, id: TaskId) -> Result<TaskOutcome> {
        self.check_prompt()?;

        let task = self.store.get(id).await.ok_or(WorkflowError::UnknownTask(id))?;

        info!("Processing single image: {}", task.file_name);
        let target = Target {
            id,
            file_name: task.file_name.clone(),
        };
        let tracker = ProgressTracker::new(ProgressDisplay::Hidden);
        tracker.begin(1).await;
        WorkerPool::new(1).run(vec![target], self.processor(), tracker.clone()).await?;

        let stats = tracker.stats().await;
        if stats.in_flight > 0 {
            return Err(WorkflowError::TaskInFlight(id).into());
        }
        if stats.missing > 0 {
            return Ok(TaskOutcome::Missing);
        }

        let outcome = match self.store.get(id).await.map(|t| t.status().clone()) {
            Some(TaskStatus::Completed(_)) => TaskOutcome::Completed,
            Some(TaskStatus::Error(message)) => TaskOutcome::Failed(message),
            _ => TaskOutcome::Missing,
        };
        Ok(outcome)
    }

    /// Selected tasks that are not in flight, in queue order
    pub async fn batch_targets(&self) -> Vec<Target> {
        self.store
            .snapshot()
            .await
            .iter()
            .filter(|t| t.is_batch_target())
            .map(|t| Target {
                id: t.id(),
                file_name: t.file_name.clone(),
            })
            .collect()
    }

    /// Elabora tutti i task selezionati con concorrenza limitata
    pub async fn run_batch(&self) -> Result<BatchReport> {
        self.check_prompt()?;

        let targets = self.batch_targets().await;
        if targets.is_empty() {
            warn!("No images selected for processing");
            return Err(WorkflowError::NothingSelected.into());
        }

        let _busy = BusyGuard::acquire(&self.busy)?;
        let start_time = Instant::now();

        self.emit_start_message(targets.len());
        self.tracker.begin(targets.len()).await;

        WorkerPool::new(self.config.concurrency)
            .run(targets, self.processor(), self.tracker.clone())
            .await?;

        self.tracker.finish(start_time.elapsed()).await;
        let report = BatchReport {
            progress: self.tracker.snapshot().await,
            stats: self.tracker.stats().await,
        };

        if self.tracker.display() != ProgressDisplay::Json {
            info!(
                "{} in {:.1}s",
                report.stats.format_summary(),
                start_time.elapsed().as_secs_f64()
            );
        }
        Ok(report)
    }

    fn emit_start_message(&self, total: usize) {
        if self.tracker.display() == ProgressDisplay::Json {
            JsonMessage::Start {
                input_dir: self.input_dir.clone(),
                total_tasks: total,
                config: JsonConfig::from(&self.config),
            }
            .emit();
        } else {
            info!(
                "Editing {} images with provider {} (concurrency: {})",
                total, self.config.provider, self.config.concurrency
            );
        }
    }
}
