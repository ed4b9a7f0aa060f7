//! # Configuration Management Module
//!
//! Questo modulo gestisce la configurazione del workflow di editing.
//!
//! ## Responsabilità:
//! - Definisce la struct `WorkflowConfig` con tutti i parametri del run
//! - Fornisce validazione dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `prompt`: istruzione di editing (obbligatoria per avviare un run)
//! - `provider`: `native` o `custom`, seleziona il backend adapter
//! - `model`, `image_size`: parametri del backend nativo
//! - `custom_endpoint`, `custom_api_key`, `custom_model`: richiesti insieme per `custom`
//! - `concurrency`: numero di worker paralleli (default: 3)
//! - `output_path`: directory di export dei risultati
//! - `json_output`: eventi JSON su stdout invece della progress bar
//!
//! La configurazione è letta (mai modificata) dallo scheduler durante un run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_NATIVE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Which backend adapter handles the edits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// First-party model endpoint
    #[default]
    Native,
    /// Third-party HTTP endpoint
    Custom,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Native => write!(f, "native"),
            Provider::Custom => write!(f, "custom"),
        }
    }
}

/// Configuration for a batch editing session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Free-text edit instruction
    pub prompt: String,
    pub provider: Provider,
    /// Native model identifier
    pub model: String,
    /// Requested output resolution (only sent to models that support it)
    pub image_size: Option<String>,
    pub custom_endpoint: Option<String>,
    pub custom_api_key: Option<String>,
    pub custom_model: Option<String>,
    /// Number of parallel workers for batch runs
    pub concurrency: usize,
    /// Base URL of the native API
    pub api_base_url: String,
    /// Export directory for edited images
    pub output_path: Option<PathBuf>,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            provider: Provider::Native,
            model: DEFAULT_NATIVE_MODEL.to_string(),
            image_size: Some("1K".to_string()),
            custom_endpoint: None,
            custom_api_key: None,
            custom_model: None,
            concurrency: 3,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            output_path: None,
            json_output: false,
        }
    }
}

impl WorkflowConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(anyhow::anyhow!("Concurrency must be greater than 0"));
        }

        if self.provider == Provider::Native && self.model.trim().is_empty() {
            return Err(anyhow::anyhow!("A model name is required for the native provider"));
        }

        if let Some(ref output_path) = self.output_path {
            if output_path.exists() && !output_path.is_dir() {
                return Err(anyhow::anyhow!("Output path is not a directory: {}", output_path.display()));
            }
        }

        Ok(())
    }

    /// True when the prompt can start a run
    pub fn has_prompt(&self) -> bool {
        !self.prompt.trim().is_empty()
    }

    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("image-batch-edit").join("config.json"))
    }

    /// Load configuration from file, defaults if the file is missing
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: WorkflowConfig = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
