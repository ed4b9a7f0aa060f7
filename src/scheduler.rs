//! # Worker Pool Module
//!
//! Svuota una coda condivisa di target con N worker concorrenti.
//!
//! ## Algoritmo:
//! 1. La coda viene popolata con tutti i target, in ordine
//! 2. Vengono avviati `min(N, target)` worker
//! 3. Ogni worker estrae la testa della coda ed esegue il `TaskProcessor`
//!    finché la coda non è vuota
//! 4. `run` ritorna solo dopo il join di tutti i worker
//!
//! L'ordine di estrazione è first-come-first-served dalla testa; l'ordine di
//! completamento dipende dalla latenza di rete. Ogni target viene elaborato
//! esattamente una volta.

use crate::{
    processor::TaskProcessor,
    progress::ProgressTracker,
    task::TaskId,
};
use anyhow::Result;
use futures::future::join_all;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// One queued unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub id: TaskId,
    pub file_name: String,
}

/// Bounded pool of workers draining a shared queue
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Number of workers spawned for `targets` items
    pub fn worker_count(&self, targets: usize) -> usize {
        self.concurrency.min(targets)
    }

    /// Processes every target once; returns after all workers have drained the queue
    pub async fn run(
        &self,
        targets: Vec<Target>,
        processor: TaskProcessor,
        tracker: ProgressTracker,
    ) -> Result<()> {
        let workers = self.worker_count(targets.len());
        if workers == 0 {
            return Ok(());
        }

        info!("Starting {} workers for {} images", workers, targets.len());
        let queue = Arc::new(Mutex::new(VecDeque::from(targets)));

        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let queue = queue.clone();
                let processor = processor.clone();
                let tracker = tracker.clone();
                tokio::spawn(async move {
                    let mut handled = 0usize;
                    loop {
                        // Lock released before the edit is awaited
                        let next = queue.lock().await.pop_front();
                        let Some(target) = next else { break };

                        tracker.task_started(target.id, &target.file_name).await;
                        let outcome = processor.process_one(target.id).await;
                        tracker.record(target.id, &target.file_name, &outcome).await;
                        handled += 1;
                    }
                    debug!(worker, handled, "Worker drained queue");
                    handled
                })
            })
            .collect();

        let mut panicked = 0;
        for result in join_all(handles).await {
            if let Err(e) = result {
                error!("Worker task failed: {}", e);
                panicked += 1;
            }
        }

        if panicked > 0 {
            return Err(anyhow::anyhow!("{} worker(s) terminated abnormally", panicked));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ImageEditor;
    use crate::error::EditError;
    use crate::progress::ProgressDisplay;
    use crate::task::{ImageReference, ImageTask, SourceImage, TaskStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Editor that records how many edits overlap and which images it saw
    #[derive(Default)]
    struct CountingEditor {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        seen: std::sync::Mutex<Vec<u8>>,
    }

    #[async_trait]
    impl ImageEditor for CountingEditor {
        async fn edit(&self, image: &SourceImage, _: &str) -> Result<ImageReference, EditError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.seen.lock().unwrap().push(image.bytes[0]);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if image.bytes[0] % 2 == 0 {
                Ok(ImageReference::Url(format!("https://x/{}.png", image.bytes[0])))
            } else {
                Err(EditError::Request("odd".to_string()))
            }
        }
    }

    fn setup(count: u8) -> (TaskStore, Vec<Target>) {
        let tasks: Vec<ImageTask> = (0..count)
            .map(|i| ImageTask::new(format!("{}.png", i), SourceImage::new(vec![i], "image/png")))
            .collect();
        let targets = tasks
            .iter()
            .map(|t| Target {
                id: t.id(),
                file_name: t.file_name.clone(),
            })
            .collect();
        (TaskStore::new(tasks), targets)
    }

    #[test]
    fn test_worker_count_is_bounded_by_targets() {
        assert_eq!(WorkerPool::new(4).worker_count(2), 2);
        assert_eq!(WorkerPool::new(2).worker_count(5), 2);
        assert_eq!(WorkerPool::new(0).worker_count(5), 1);
        assert_eq!(WorkerPool::new(3).worker_count(0), 0);
    }

    #[tokio::test]
    async fn test_each_target_processed_exactly_once() {
        let (store, targets) = setup(9);
        let editor = Arc::new(CountingEditor::default());
        let processor = TaskProcessor::new(editor.clone(), store.clone(), "x");
        let tracker = ProgressTracker::new(ProgressDisplay::Hidden);
        tracker.begin(targets.len()).await;

        WorkerPool::new(3).run(targets, processor, tracker.clone()).await.unwrap();

        let mut seen = editor.seen.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..9).collect::<Vec<u8>>());

        assert_eq!(tracker.snapshot().await.current, 9);
        assert!(store.snapshot().await.iter().all(|t| t.status().is_terminal()));
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_pool_size() {
        let (store, targets) = setup(8);
        let editor = Arc::new(CountingEditor::default());
        let processor = TaskProcessor::new(editor.clone(), store, "x");

        WorkerPool::new(3)
            .run(targets, processor, ProgressTracker::new(ProgressDisplay::Hidden))
            .await
            .unwrap();

        let peak = editor.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency was {}", peak);
    }

    #[tokio::test]
    async fn test_single_worker_keeps_queue_order() {
        let (store, targets) = setup(5);
        let editor = Arc::new(CountingEditor::default());
        let processor = TaskProcessor::new(editor.clone(), store, "x");

        WorkerPool::new(1)
            .run(targets, processor, ProgressTracker::new(ProgressDisplay::Hidden))
            .await
            .unwrap();

        assert_eq!(*editor.seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_siblings() {
        let (store, targets) = setup(6);
        let processor = TaskProcessor::new(Arc::new(CountingEditor::default()), store.clone(), "x");
        let tracker = ProgressTracker::new(ProgressDisplay::Hidden);
        tracker.begin(6).await;

        WorkerPool::new(2).run(targets, processor, tracker.clone()).await.unwrap();

        let stats = tracker.stats().await;
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.failed, 3);
        let tasks = store.snapshot().await;
        assert_eq!(tasks.iter().filter(|t| t.error() == Some("odd")).count(), 3);
    }
}
