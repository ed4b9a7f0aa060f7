//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per l'uso programmatico.
//!
//! ## Responsabilità:
//! - Emette messaggi JSON (uno per riga) per gli eventi del run
//! - Fornisce un'interfaccia standardizzata per la comunicazione inter-processo
//!
//! ## Tipi di messaggi:
//! - `start`: inizio del run con il numero di target
//! - `task_start`: un worker ha preso in carico un task
//! - `task_complete`: task arrivato a stato terminale
//! - `progress`: progresso corrente `{current, total}`
//! - `complete`: fine del run con statistiche finali
//! - `error`: errore che ha impedito il run

use crate::config::{Provider, WorkflowConfig};
use crate::task::TaskId;
use serde::Serialize;
use std::path::PathBuf;

/// Tipo di messaggio JSON
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum JsonMessage {
    #[serde(rename = "start")]
    Start {
        input_dir: Option<PathBuf>,
        total_tasks: usize,
        config: JsonConfig,
    },

    #[serde(rename = "task_start")]
    TaskStart { id: TaskId, file_name: String },

    #[serde(rename = "task_complete")]
    TaskComplete {
        id: TaskId,
        file_name: String,
        status: &'static str,
        error: Option<String>,
    },

    #[serde(rename = "progress")]
    Progress {
        current: usize,
        total: usize,
        percentage: f64,
        completed: usize,
        failed: usize,
    },

    #[serde(rename = "complete")]
    Complete {
        completed: usize,
        failed: usize,
        duration_seconds: f64,
    },

    #[serde(rename = "error")]
    Error {
        message: String,
        details: Option<String>,
    },
}

/// Configurazione riportata nel messaggio `start`
#[derive(Debug, Serialize)]
pub struct JsonConfig {
    pub provider: Provider,
    pub model: String,
    pub concurrency: usize,
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    /// Crea un messaggio di progresso
    pub fn progress(current: usize, total: usize, completed: usize, failed: usize) -> Self {
        let percentage = if total > 0 {
            (current as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        Self::Progress {
            current,
            total,
            percentage,
            completed,
            failed,
        }
    }

    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }
}

impl From<&WorkflowConfig> for JsonConfig {
    fn from(config: &WorkflowConfig) -> Self {
        let model = match config.provider {
            Provider::Native => config.model.clone(),
            Provider::Custom => config.custom_model.clone().unwrap_or_default(),
        };
        Self {
            provider: config.provider,
            model,
            concurrency: config.concurrency,
        }
    }
}
