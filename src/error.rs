//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce `EditError` per tutti i fallimenti di un singolo edit remoto
//! - Definisce `WorkflowError` per le condizioni che impediscono di avviare un run
//! - Normalizza i messaggi mostrati all'utente (`user_message`)
//!
//! ## Categorie di errori (`EditError`):
//! - `Config`: setup mancante o incompleto, fallisce prima di qualsiasi chiamata di rete
//! - `PermissionDenied`: autorizzazione rifiutata dal backend
//! - `ModelTextOnly`: il modello ha risposto solo con testo
//! - `NoImageData`: risposta senza contenuto immagine
//! - `Request`: status HTTP non 2xx
//! - `Network`: fallimento a livello di trasporto
//!
//! ## Esempio:
//! ```ignore
//! if api_key.is_none() {
//!     return Err(EditError::Config("missing credential".to_string()));
//! }
//! ```

use crate::task::TaskId;

/// Remediation appended to permission failures
pub const PERMISSION_REMEDIATION: &str =
    "Check that the API key belongs to a project with access to this model \
     (image models usually require billing to be enabled).";

/// Custom error types for a single remote edit
#[derive(thiserror::Error, Debug)]
pub enum EditError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("The model returned text instead of an image: {0}")]
    ModelTextOnly(String),

    #[error("No image data found in the response")]
    NoImageData,

    #[error("{0}")]
    Request(String),

    #[error("{0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EditError {
    /// Messaggio normalizzato salvato sul task in errore
    pub fn user_message(&self) -> String {
        match self {
            EditError::PermissionDenied(_) => format!("{} {}", self, PERMISSION_REMEDIATION),
            other => other.to_string(),
        }
    }
}

/// Conditions that stop a run before any work is dispatched
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("An edit prompt is required")]
    EmptyPrompt,

    #[error("No images selected for processing")]
    NothingSelected,

    #[error("A batch run is already in progress")]
    Busy,

    #[error("Unknown task: {0}")]
    UnknownTask(TaskId),

    #[error("Task {0} is already being processed")]
    TaskInFlight(TaskId),
}
