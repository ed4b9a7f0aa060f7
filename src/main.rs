//! # Batch Image Editor - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Merge della configurazione (default -> file JSON -> flag CLI)
//! - Caricamento della cartella, avvio del run ed export dei risultati
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI
//! 2. Configura il logging (INFO o DEBUG a seconda del flag verbose)
//! 3. Carica la configurazione e applica gli override
//! 4. Crea un task per ogni immagine della cartella
//! 5. Esegue il run (singolo o batch), opzionalmente ritenta i falliti
//! 6. Esporta i risultati completati
//!
//! ## Esempio di utilizzo:
//! ```bash
//! GEMINI_API_KEY=... image-batch-edit ./photos --prompt "make it look like winter" -j 4 -o ./edited
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use batch_image_editor::{
    json_output::JsonMessage,
    progress::ProgressDisplay,
    Backend, EnvCredentialProvider, Exporter, FolderLoader, Provider, Workflow, WorkflowConfig,
};

#[derive(Parser)]
#[command(name = "image-batch-edit")]
#[command(about = "Edit a folder of images with a generative image model")]
struct Args {
    /// Directory containing the images to edit
    input_directory: PathBuf,

    /// Edit instruction applied to every image
    #[arg(short, long)]
    prompt: Option<String>,

    /// Backend provider
    #[arg(long, value_enum)]
    provider: Option<Provider>,

    /// Native model name
    #[arg(short, long)]
    model: Option<String>,

    /// Output resolution (e.g. 1K, 2K, 4K) for models that support it
    #[arg(long)]
    image_size: Option<String>,

    /// Custom provider endpoint URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Custom provider API key
    #[arg(long, env = "CUSTOM_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Custom provider model identifier
    #[arg(long)]
    custom_model: Option<String>,

    /// Number of parallel requests
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Directory where edited images are written
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Config file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Persist the merged configuration to the config file
    #[arg(long)]
    save_config: bool,

    /// Process only this image (path relative to the input directory)
    #[arg(long, conflicts_with = "skip")]
    only: Option<String>,

    /// Leave these images out of the batch
    #[arg(long)]
    skip: Vec<String>,

    /// Re-run each failed image once after the batch
    #[arg(long)]
    retry_failed: bool,

    /// Output progress and results as JSON lines
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// CLI flags override the loaded configuration
    fn apply(&self, config: &mut WorkflowConfig) {
        if let Some(ref prompt) = self.prompt {
            config.prompt = prompt.clone();
        }
        if let Some(provider) = self.provider {
            config.provider = provider;
        }
        if let Some(ref model) = self.model {
            config.model = model.clone();
        }
        if self.image_size.is_some() {
            config.image_size = self.image_size.clone();
        }
        if self.endpoint.is_some() {
            config.custom_endpoint = self.endpoint.clone();
        }
        if self.api_key.is_some() {
            config.custom_api_key = self.api_key.clone();
        }
        if self.custom_model.is_some() {
            config.custom_model = self.custom_model.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if self.output.is_some() {
            config.output_path = self.output.clone();
        }
        if self.json {
            config.json_output = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; stderr keeps stdout clean for JSON events
    let level = if args.verbose { "debug" } else { "info" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let json_output = args.json;
    if let Err(e) = run(args).await {
        if json_output {
            JsonMessage::error(e.to_string(), Some(format!("{:#}", e))).emit();
        }
        return Err(e);
    }
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let config_path = args.config.clone().or_else(WorkflowConfig::default_path);
    let mut config = match config_path {
        Some(ref path) => WorkflowConfig::from_file(path).await?,
        None => WorkflowConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    if args.save_config {
        if let Some(ref path) = config_path {
            config.save_to_file(path).await?;
            info!("Saved configuration to {}", path.display());
        }
    }

    if !args.input_directory.exists() {
        return Err(anyhow::anyhow!(
            "Input directory does not exist: {}",
            args.input_directory.display()
        ));
    }

    let tasks = FolderLoader::load(&args.input_directory).await?;
    info!("Found {} images in {}", tasks.len(), args.input_directory.display());

    let backend = Backend::from_config(&config, Arc::new(EnvCredentialProvider));
    let display = if config.json_output {
        ProgressDisplay::Json
    } else {
        ProgressDisplay::Bar
    };
    let mut workflow = Workflow::new(config.clone(), Arc::new(backend)).with_display(display);
    workflow
        .add_tasks(Some(args.input_directory.clone()), tasks)
        .await;

    let all = workflow.tasks().await;
    if let Some(ref only) = args.only {
        let task = all
            .iter()
            .find(|t| &t.file_name == only)
            .ok_or_else(|| anyhow::anyhow!("No image named {} in the input directory", only))?;
        let outcome = workflow.run_single(task.id()).await?;
        info!("{}: {:?}", task.file_name, outcome);
    } else {
        for name in &args.skip {
            match all.iter().find(|t| &t.file_name == name) {
                Some(task) => workflow.set_selected(task.id(), false).await?,
                None => warn!("--skip {}: no such image", name),
            }
        }
        workflow.run_batch().await?;
    }

    if args.retry_failed {
        for id in workflow.retry_targets().await {
            workflow.run_single(id).await?;
        }
    }

    for task in workflow.tasks().await {
        if let Some(message) = task.error() {
            error!("{}: {}", task.file_name, message);
        }
    }

    if let Some(ref output_dir) = config.output_path {
        let items = workflow.export_items().await?;
        if items.is_empty() {
            warn!("Nothing to export");
        } else {
            let report = Exporter::default().export(&items, output_dir).await?;
            if !report.failed.is_empty() {
                warn!("{} results could not be exported", report.failed.len());
            }
        }
    }

    Ok(())
}
