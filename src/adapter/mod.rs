//! # Backend Adapter Module
//!
//! Due strategie intercambiabili dietro lo stesso contratto
//! `edit(image, prompt) -> ImageReference`:
//! - `native`: endpoint del modello first-party (credenziale ambientale)
//! - `custom`: endpoint HTTP di terze parti configurabile
//!
//! Ogni invocazione esegue esattamente una chiamata di rete, senza retry.
//! Gli errori di trasporto di entrambi i backend diventano un messaggio
//! di guida invece del testo grezzo di reqwest.

pub mod custom;
pub mod native;

use crate::{
    config::{Provider, WorkflowConfig},
    credentials::CredentialProvider,
    error::EditError,
    task::{ImageReference, SourceImage},
};
use async_trait::async_trait;
use std::sync::Arc;

pub use custom::CustomAdapter;
pub use native::NativeAdapter;

/// Uniform edit contract used by the processor
#[async_trait]
pub trait ImageEditor: Send + Sync {
    async fn edit(&self, image: &SourceImage, prompt: &str) -> Result<ImageReference, EditError>;
}

/// Backend selected by `WorkflowConfig::provider`
#[derive(Debug, Clone)]
pub enum Backend {
    Native(NativeAdapter),
    Custom(CustomAdapter),
}

impl Backend {
    pub fn from_config(config: &WorkflowConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        let client = reqwest::Client::new();
        match config.provider {
            Provider::Native => Backend::Native(NativeAdapter::new(config, credentials, client)),
            Provider::Custom => Backend::Custom(CustomAdapter::new(config, client)),
        }
    }

    pub fn provider(&self) -> Provider {
        match self {
            Backend::Native(_) => Provider::Native,
            Backend::Custom(_) => Provider::Custom,
        }
    }
}

#[async_trait]
impl ImageEditor for Backend {
    async fn edit(&self, image: &SourceImage, prompt: &str) -> Result<ImageReference, EditError> {
        match self {
            Backend::Native(adapter) => adapter.edit(image, prompt).await,
            Backend::Custom(adapter) => adapter.edit(image, prompt).await,
        }
    }
}

/// Connection-level failure signatures, matched case-insensitively
const UNREACHABLE_SIGNATURES: &[&str] = &[
    "error trying to connect",
    "connection refused",
    "dns error",
    "failed to lookup address",
    "no route to host",
    "network is unreachable",
];

/// Full error chain, the top-level reqwest message hides the cause
fn transport_message(e: &reqwest::Error) -> String {
    let mut message = e.to_string();
    let mut source = std::error::Error::source(e);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = std::error::Error::source(cause);
    }
    message
}

fn is_unreachable(message: &str, is_connect: bool) -> bool {
    let lower = message.to_lowercase();
    is_connect || UNREACHABLE_SIGNATURES.iter().any(|s| lower.contains(s))
}

/// Replaces the raw transport message with actionable guidance
fn network_error(endpoint: &str, message: &str, is_connect: bool) -> EditError {
    let guidance = if is_unreachable(message, is_connect) {
        format!(
            "Network error: could not reach {}. Check that the endpoint URL is correct \
             and that the host is online and reachable from this machine.",
            endpoint
        )
    } else {
        format!(
            "Network error: the request to {} was rejected before a response arrived. \
             The endpoint may block cross-origin (CORS) requests, or a proxy or TLS \
             policy refused the connection.",
            endpoint
        )
    };
    EditError::Network(guidance)
}

/// Transport failure of a backend call, mapped to guidance
pub(crate) fn transport_error(endpoint: &str, e: &reqwest::Error) -> EditError {
    network_error(endpoint, &transport_message(e), e.is_connect())
}
