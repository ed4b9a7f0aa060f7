//! # Task Processor Module
//!
//! Worker per l'elaborazione di un singolo Image Task.
//! Avvolge una chiamata all'adapter con le transizioni di stato e la
//! normalizzazione degli errori; nessun errore esce da `process_one`.

use crate::{
    adapter::ImageEditor,
    task::{TaskId, TaskStatus, TaskStore},
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Esito terminale di un task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Failed(String),
    /// The task left the store before it was dispatched
    Missing,
    /// Another run already had the task in `processing`; nothing was sent
    InFlight,
}

/// Processes one task against the configured backend
#[derive(Clone)]
pub struct TaskProcessor {
    editor: Arc<dyn ImageEditor>,
    store: TaskStore,
    prompt: Arc<str>,
}

impl TaskProcessor {
    pub fn new(editor: Arc<dyn ImageEditor>, store: TaskStore, prompt: &str) -> Self {
        Self {
            editor,
            store,
            prompt: Arc::from(prompt),
        }
    }

    /// `processing`, then `completed` or `error`
    ///
    /// The in-flight check and the switch to `processing` happen under the same
    /// lock, so a task is never sent to the backend twice at once.
    pub async fn process_one(&self, id: TaskId) -> TaskOutcome {
        let dispatched = self
            .store
            .update(id, |task| {
                if task.status() == &TaskStatus::Processing {
                    return None;
                }
                task.begin();
                Some((task.original().clone(), task.file_name.clone()))
            })
            .await;

        let (image, file_name) = match dispatched {
            Some(Some(claimed)) => claimed,
            Some(None) => {
                warn!(task = %id, "Task already processing, skipping");
                return TaskOutcome::InFlight;
            }
            None => {
                warn!(task = %id, "Task no longer queued, skipping");
                return TaskOutcome::Missing;
            }
        };

        debug!(task = %id, file = %file_name, "Dispatching edit");

        match self.editor.edit(&image, &self.prompt).await {
            Ok(result) => {
                debug!(task = %id, result = %result, "Edit completed");
                self.store.update(id, |task| task.complete(result)).await;
                TaskOutcome::Completed
            }
            Err(e) => {
                let message = e.user_message();
                warn!(task = %id, file = %file_name, error = %message, "Edit failed");
                self.store.update(id, |task| task.fail(message.clone())).await;
                TaskOutcome::Failed(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EditError, PERMISSION_REMEDIATION};
    use crate::task::{ImageReference, ImageTask, SourceImage};
    use async_trait::async_trait;

    struct Scripted(fn() -> Result<ImageReference, EditError>);

    #[async_trait]
    impl ImageEditor for Scripted {
        async fn edit(&self, _: &SourceImage, _: &str) -> Result<ImageReference, EditError> {
            (self.0)()
        }
    }

    fn store_with_one() -> (TaskStore, TaskId) {
        let task = ImageTask::new("cat.png", SourceImage::new(vec![7], "image/png"));
        let id = task.id();
        (TaskStore::new(vec![task]), id)
    }

    #[tokio::test]
    async fn test_success_sets_completed() {
        let (store, id) = store_with_one();
        let editor = Arc::new(Scripted(|| Ok(ImageReference::Url("https://x/1.png".to_string()))));
        let processor = TaskProcessor::new(editor, store.clone(), "make it pop");

        assert_eq!(processor.process_one(id).await, TaskOutcome::Completed);
        let task = store.get(id).await.unwrap();
        assert_eq!(task.edited_reference().map(|r| r.as_str()), Some("https://x/1.png"));
        assert!(task.error().is_none());
        assert!(task.selected);
    }

    #[tokio::test]
    async fn test_failure_sets_error_with_remediation() {
        let (store, id) = store_with_one();
        let editor = Arc::new(Scripted(|| Err(EditError::PermissionDenied("forbidden".to_string()))));
        let processor = TaskProcessor::new(editor, store.clone(), "x");

        let outcome = processor.process_one(id).await;
        let task = store.get(id).await.unwrap();
        assert!(matches!(task.status(), TaskStatus::Error(_)));
        assert!(task.error().unwrap().contains(PERMISSION_REMEDIATION));
        assert_eq!(outcome, TaskOutcome::Failed(task.error().unwrap().to_string()));
        assert!(task.edited_reference().is_none());
    }

    #[tokio::test]
    async fn test_redispatch_overwrites_previous_error() {
        let (store, id) = store_with_one();
        store.update(id, |t| t.fail("old failure")).await;

        let editor = Arc::new(Scripted(|| Ok(ImageReference::Url("https://x/new.png".to_string()))));
        TaskProcessor::new(editor, store.clone(), "x").process_one(id).await;

        let task = store.get(id).await.unwrap();
        assert!(task.error().is_none());
        assert_eq!(task.edited_reference().unwrap().as_str(), "https://x/new.png");
    }

    #[tokio::test]
    async fn test_missing_task_is_skipped() {
        let (store, _) = store_with_one();
        let editor = Arc::new(Scripted(|| panic!("editor must not be called")));
        let processor = TaskProcessor::new(editor, store, "x");
        assert_eq!(processor.process_one(TaskId::new()).await, TaskOutcome::Missing);
    }

    #[tokio::test]
    async fn test_processing_task_is_not_dispatched_again() {
        let (store, id) = store_with_one();
        store.update(id, |t| t.begin()).await;

        let editor = Arc::new(Scripted(|| panic!("editor must not be called")));
        let processor = TaskProcessor::new(editor, store.clone(), "x");

        assert_eq!(processor.process_one(id).await, TaskOutcome::InFlight);
        assert_eq!(store.get(id).await.unwrap().status(), &TaskStatus::Processing);
    }
}
