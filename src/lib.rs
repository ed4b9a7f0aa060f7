//! # Batch Image Editor Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: configurazione del workflow e validazione parametri
//! - `error`: tipi di errore custom (edit remoto e workflow)
//! - `credentials`: credenziale ambientale del backend nativo
//! - `task`: Image Task, macchina a stati e collezione condivisa
//! - `adapter`: backend `native` e `custom` dietro un unico contratto
//! - `processor`: elaborazione di un singolo task
//! - `scheduler`: pool di worker su coda condivisa
//! - `workflow`: orchestratore (run singolo e batch)
//! - `progress` / `json_output`: progress tracking ed eventi JSON
//! - `loader` / `exporter`: caricamento cartella ed export dei risultati
//!
//! ## Utilizzo:
//! ```ignore
//! use batch_image_editor::{Backend, EnvCredentialProvider, FolderLoader, Workflow, WorkflowConfig};
//!
//! let config = WorkflowConfig { prompt: "add snow".into(), ..Default::default() };
//! let backend = Backend::from_config(&config, Arc::new(EnvCredentialProvider));
//! let mut workflow = Workflow::new(config, Arc::new(backend));
//! workflow.add_tasks(Some(dir.clone()), FolderLoader::load(&dir).await?).await;
//! let report = workflow.run_batch().await?;
//! ```

pub mod adapter;
pub mod config;
pub mod credentials;
pub mod error;
pub mod exporter;
pub mod json_output;
pub mod loader;
pub mod processor;
pub mod progress;
pub mod scheduler;
pub mod task;
pub mod workflow;

pub use adapter::{Backend, ImageEditor};
pub use config::{Provider, WorkflowConfig};
pub use credentials::{CredentialProvider, EnvCredentialProvider};
pub use error::{EditError, WorkflowError};
pub use exporter::Exporter;
pub use loader::FolderLoader;
pub use task::{ImageReference, ImageTask, TaskId, TaskStatus, TaskStore};
pub use workflow::{BatchReport, Workflow};
