//! # Task Model Module
//!
//! Questo modulo definisce gli Image Task e la collezione condivisa su cui
//! lavorano i worker.
//!
//! ## Responsabilità:
//! - `ImageTask`: un'immagine in coda con stato, risultato ed errore
//! - `TaskStatus`: macchina a stati `pending -> processing -> completed | error`
//! - `TaskStore`: collezione condivisa, ogni modifica è un read-modify-write
//!   atomico eseguito sotto lock
//!
//! ## Invarianti:
//! - il riferimento al risultato esiste solo in stato `completed`
//! - il messaggio di errore esiste solo in stato `error`
//! - `selected` non cambia mai come effetto dell'elaborazione
//!
//! Lo stato porta con sé il risultato o il messaggio, quindi le invarianti
//! valgono per costruzione.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Opaque task identity, generated at load time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Source image bytes with their declared mime type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl SourceImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Raw base64 payload
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    /// `data:<mime>;base64,<data>`
    pub fn to_data_uri(&self) -> String {
        data_uri(&self.mime_type, &self.to_base64())
    }
}

/// Builds a data URI from a mime type and an already encoded payload
pub fn data_uri(mime_type: &str, base64_data: &str) -> String {
    format!("data:{};base64,{}", mime_type, base64_data)
}

/// Handle to an edited image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ImageReference {
    /// Inline result, `data:<mime>;base64,<data>`
    DataUri(String),
    /// Remote result to be downloaded on export
    Url(String),
}

impl ImageReference {
    pub fn as_str(&self) -> &str {
        match self {
            ImageReference::DataUri(uri) => uri,
            ImageReference::Url(url) => url,
        }
    }

    /// Mime type declared by a data URI
    pub fn data_mime_type(&self) -> Option<&str> {
        match self {
            ImageReference::DataUri(uri) => uri
                .strip_prefix("data:")
                .and_then(|rest| rest.split_once(';'))
                .map(|(mime, _)| mime),
            ImageReference::Url(_) => None,
        }
    }

    /// Base64 payload of a data URI
    pub fn data_payload(&self) -> Option<&str> {
        match self {
            ImageReference::DataUri(uri) => uri.split_once(";base64,").map(|(_, data)| data),
            ImageReference::Url(_) => None,
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageReference::DataUri(uri) => {
                let head: String = uri.chars().take(32).collect();
                write!(f, "{}...", head)
            }
            ImageReference::Url(url) => f.write_str(url),
        }
    }
}

/// Per-task processing state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TaskStatus {
    #[default]
    Pending,
    Processing,
    Completed(ImageReference),
    Error(String),
}

impl TaskStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed(_) => "completed",
            TaskStatus::Error(_) => "error",
        }
    }

    /// `completed` or `error`
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed(_) | TaskStatus::Error(_))
    }
}

/// One queued image
#[derive(Debug, Clone)]
pub struct ImageTask {
    id: TaskId,
    pub file_name: String,
    original: Arc<SourceImage>,
    status: TaskStatus,
    pub selected: bool,
}

impl ImageTask {
    /// New pending, selected task
    pub fn new(file_name: impl Into<String>, original: SourceImage) -> Self {
        Self {
            id: TaskId::new(),
            file_name: file_name.into(),
            original: Arc::new(original),
            status: TaskStatus::Pending,
            selected: true,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn original(&self) -> &Arc<SourceImage> {
        &self.original
    }

    pub fn status(&self) -> &TaskStatus {
        &self.status
    }

    pub fn edited_reference(&self) -> Option<&ImageReference> {
        match &self.status {
            TaskStatus::Completed(reference) => Some(reference),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            TaskStatus::Error(message) => Some(message),
            _ => None,
        }
    }

    /// Eligible for a batch run: selected and not in flight
    pub fn is_batch_target(&self) -> bool {
        self.selected && self.status != TaskStatus::Processing
    }

    /// Dispatch: drops any previous result or error
    pub fn begin(&mut self) {
        self.status = TaskStatus::Processing;
    }

    pub fn complete(&mut self, result: ImageReference) {
        self.status = TaskStatus::Completed(result);
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = TaskStatus::Error(message.into());
    }
}

/// Shared task collection
///
/// Every mutation runs as one closure under the lock, so concurrent workers
/// updating different tasks never lose each other's writes.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    tasks: Arc<Mutex<Vec<ImageTask>>>,
}

impl TaskStore {
    pub fn new(tasks: Vec<ImageTask>) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(tasks)),
        }
    }

    /// Copy of the whole collection
    pub async fn snapshot(&self) -> Vec<ImageTask> {
        self.tasks.lock().await.clone()
    }

    pub async fn get(&self, id: TaskId) -> Option<ImageTask> {
        self.tasks.lock().await.iter().find(|t| t.id == id).cloned()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }

    /// Applies `f` to one task; `None` if the task is gone
    pub async fn update<R>(&self, id: TaskId, f: impl FnOnce(&mut ImageTask) -> R) -> Option<R> {
        let mut tasks = self.tasks.lock().await;
        tasks.iter_mut().find(|t| t.id == id).map(f)
    }

    /// Whole-collection transform
    pub async fn transform<R>(&self, f: impl FnOnce(&mut Vec<ImageTask>) -> R) -> R {
        let mut tasks = self.tasks.lock().await;
        f(&mut tasks)
    }

    pub async fn extend(&self, new_tasks: Vec<ImageTask>) {
        self.tasks.lock().await.extend(new_tasks);
    }

    /// Drops every task and its image bytes
    pub async fn clear(&self) -> usize {
        let mut tasks = self.tasks.lock().await;
        let removed = tasks.len();
        tasks.clear();
        removed
    }

    pub async fn count_processing(&self) -> usize {
        self.tasks
            .lock()
            .await
            .iter()
            .filter(|t| t.status == TaskStatus::Processing)
            .count()
    }
}
