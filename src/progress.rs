//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il progress tracking e le statistiche di un run.
//!
//! ## Responsabilità:
//! - Progress bar visuale con `indicatif` per feedback real-time
//! - Contatori `{current, total}` condivisi tra i worker
//! - Eventi JSON quando il run è in modalità `json_output`
//! - Report finale con statistiche aggregate
//!
//! ## Regola di avanzamento:
//! `current` aumenta di uno a ogni esito del worker (successo, errore, task
//! sparito o già in elaborazione), quindi raggiunge `total` esattamente quando il pool termina.
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:42] [========================>---------------] 3/5 (60%) [OK] beach.jpg
//! ```

use crate::{
    json_output::JsonMessage,
    processor::TaskOutcome,
    task::TaskId,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Progresso del run corrente
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

impl Progress {
    pub fn is_done(&self) -> bool {
        self.current == self.total
    }
}

/// How progress is reported while a run is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressDisplay {
    Hidden,
    Bar,
    Json,
}

/// Manages the terminal progress bar
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    pub fn new(total: u64) -> Self {
        let bar = ProgressBar::new(total);

        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Advance by one with a message
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

/// Statistics for a finished run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub completed: usize,
    pub failed: usize,
    pub missing: usize,
    pub in_flight: usize,
}

impl RunStats {
    pub fn total(&self) -> usize {
        self.completed + self.failed + self.missing + self.in_flight
    }

    pub fn format_summary(&self) -> String {
        let mut summary = format!(
            "Processed: {} images | Completed: {} | Failed: {}",
            self.total(),
            self.completed,
            self.failed
        );
        if self.missing > 0 {
            summary.push_str(&format!(" | Removed before dispatch: {}", self.missing));
        }
        if self.in_flight > 0 {
            summary.push_str(&format!(" | Already processing: {}", self.in_flight));
        }
        summary
    }
}

#[derive(Debug, Default)]
struct Counters {
    progress: Progress,
    stats: RunStats,
}

/// Tracker condiviso tra i worker
#[derive(Clone)]
pub struct ProgressTracker {
    counters: Arc<Mutex<Counters>>,
    bar: Arc<Mutex<Option<ProgressManager>>>,
    display: ProgressDisplay,
}

impl ProgressTracker {
    pub fn new(display: ProgressDisplay) -> Self {
        Self {
            counters: Arc::new(Mutex::new(Counters::default())),
            bar: Arc::new(Mutex::new(None)),
            display,
        }
    }

    pub fn display(&self) -> ProgressDisplay {
        self.display
    }

    /// Resets to `{0, total}` for a new run
    pub async fn begin(&self, total: usize) {
        *self.counters.lock().await = Counters {
            progress: Progress { current: 0, total },
            stats: RunStats::default(),
        };

        if self.display == ProgressDisplay::Bar {
            *self.bar.lock().await = Some(ProgressManager::new(total as u64));
        }
    }

    pub async fn task_started(&self, id: TaskId, file_name: &str) {
        if self.display == ProgressDisplay::Json {
            JsonMessage::TaskStart {
                id,
                file_name: file_name.to_string(),
            }
            .emit();
        }
    }

    /// Counts one terminal outcome
    pub async fn record(&self, id: TaskId, file_name: &str, outcome: &TaskOutcome) {
        let (progress, stats) = {
            let mut counters = self.counters.lock().await;
            counters.progress.current += 1;
            match outcome {
                TaskOutcome::Completed => counters.stats.completed += 1,
                TaskOutcome::Failed(_) => counters.stats.failed += 1,
                TaskOutcome::Missing => counters.stats.missing += 1,
                TaskOutcome::InFlight => counters.stats.in_flight += 1,
            }
            (counters.progress, counters.stats.clone())
        };

        match self.display {
            ProgressDisplay::Hidden => {}
            ProgressDisplay::Bar => {
                let message = match outcome {
                    TaskOutcome::Completed => format!("[OK] {}", file_name),
                    TaskOutcome::Failed(_) => format!("[ERROR] {}", file_name),
                    TaskOutcome::Missing | TaskOutcome::InFlight => format!("[SKIP] {}", file_name),
                };
                if let Some(bar) = self.bar.lock().await.as_ref() {
                    bar.update(&message);
                }
            }
            ProgressDisplay::Json => {
                let (status, error) = match outcome {
                    TaskOutcome::Completed => ("completed", None),
                    TaskOutcome::Failed(message) => ("error", Some(message.clone())),
                    TaskOutcome::Missing => ("missing", None),
                    TaskOutcome::InFlight => ("in_flight", None),
                };
                JsonMessage::TaskComplete {
                    id,
                    file_name: file_name.to_string(),
                    status,
                    error,
                }
                .emit();
                JsonMessage::progress(progress.current, progress.total, stats.completed, stats.failed).emit();
            }
        }
    }

    pub async fn snapshot(&self) -> Progress {
        self.counters.lock().await.progress
    }

    pub async fn stats(&self) -> RunStats {
        self.counters.lock().await.stats.clone()
    }

    /// Finalizza la progress bar
    pub async fn finish(&self, elapsed: Duration) {
        let stats = self.stats().await;
        match self.display {
            ProgressDisplay::Hidden => {}
            ProgressDisplay::Bar => {
                if let Some(bar) = self.bar.lock().await.take() {
                    bar.finish(&stats.format_summary());
                }
            }
            ProgressDisplay::Json => JsonMessage::Complete {
                completed: stats.completed,
                failed: stats.failed,
                duration_seconds: elapsed.as_secs_f64(),
            }
            .emit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_outcome_advances_current() {
        let tracker = ProgressTracker::new(ProgressDisplay::Hidden);
        tracker.begin(4).await;
        assert_eq!(tracker.snapshot().await, Progress { current: 0, total: 4 });

        tracker.record(TaskId::new(), "a", &TaskOutcome::Completed).await;
        tracker.record(TaskId::new(), "b", &TaskOutcome::Failed("x".to_string())).await;
        tracker.record(TaskId::new(), "c", &TaskOutcome::Missing).await;
        tracker.record(TaskId::new(), "d", &TaskOutcome::InFlight).await;

        let progress = tracker.snapshot().await;
        assert!(progress.is_done());
        assert_eq!(
            tracker.stats().await,
            RunStats {
                completed: 1,
                failed: 1,
                missing: 1,
                in_flight: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_begin_resets_previous_run() {
        let tracker = ProgressTracker::new(ProgressDisplay::Hidden);
        tracker.begin(1).await;
        tracker.record(TaskId::new(), "a", &TaskOutcome::Completed).await;
        tracker.begin(4).await;
        assert_eq!(tracker.snapshot().await, Progress { current: 0, total: 4 });
        assert_eq!(tracker.stats().await.total(), 0);
    }

    #[test]
    fn test_summary_format() {
        let stats = RunStats {
            completed: 4,
            failed: 1,
            ..Default::default()
        };
        assert_eq!(stats.format_summary(), "Processed: 5 images | Completed: 4 | Failed: 1");
    }
}
