//! # Exporter Module
//!
//! Scrive i risultati dei task `completed` nella directory di output.
//! I data URI vengono decodificati localmente, gli URL scaricati con una GET.

use crate::{task::ImageReference, workflow::ExportItem};
use anyhow::{Context, Result};
use base64::Engine;
use reqwest::Client;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Outcome of an export pass
#[derive(Debug, Default)]
pub struct ExportReport {
    pub written: Vec<PathBuf>,
    pub failed: Vec<(String, String)>,
}

pub struct Exporter {
    client: Client,
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

impl Exporter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn extension_for_mime(mime: &str) -> &'static str {
        match mime.split(';').next().unwrap_or("").trim() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "png",
        }
    }

    /// Extension taken from the URL path, when it is a known image one
    fn extension_from_url(url: &str) -> Option<&'static str> {
        let path = url.split(['?', '#']).next()?;
        let ext = path.rsplit_once('.')?.1.to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some("jpg"),
            "png" => Some("png"),
            "webp" => Some("webp"),
            "gif" => Some("gif"),
            _ => None,
        }
    }

    /// `sub/photo.jpg` -> `edited_sub_photo.<ext>`
    pub fn output_name(file_name: &str, extension: &str) -> String {
        format!("edited_{}.{}", Self::flat_stem(file_name), extension)
    }

    fn flat_stem(file_name: &str) -> String {
        let flat = file_name.replace(['/', '\\'], "_");
        match flat.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => flat,
        }
    }

    /// Output name not yet taken in this pass; `_1`, `_2`.. on collision
    fn unique_name(file_name: &str, extension: &str, taken: &mut HashSet<String>) -> String {
        let mut name = Self::output_name(file_name, extension);
        let mut n = 1;
        while taken.contains(&name) {
            name = format!("edited_{}_{}.{}", Self::flat_stem(file_name), n, extension);
            n += 1;
        }
        taken.insert(name.clone());
        name
    }

    async fn fetch(&self, reference: &ImageReference) -> Result<(Vec<u8>, &'static str)> {
        match reference {
            ImageReference::DataUri(_) => {
                let payload = reference
                    .data_payload()
                    .ok_or_else(|| anyhow::anyhow!("Malformed data URI"))?;
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(payload)
                    .context("Invalid base64 payload")?;
                let ext = Self::extension_for_mime(reference.data_mime_type().unwrap_or("image/png"));
                Ok((bytes, ext))
            }
            ImageReference::Url(url) => {
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("Failed to download {}", url))?
                    .error_for_status()?;
                let ext = match Self::extension_from_url(url) {
                    Some(ext) => ext,
                    None => response
                        .headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(Self::extension_for_mime)
                        .unwrap_or("png"),
                };
                let bytes = response.bytes().await?.to_vec();
                Ok((bytes, ext))
            }
        }
    }

    /// Writes every item; one failure does not stop the others
    pub async fn export(&self, items: &[ExportItem], output_dir: &Path) -> Result<ExportReport> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;

        let mut report = ExportReport::default();
        let mut taken = HashSet::new();
        for item in items {
            match self.fetch(&item.reference).await {
                Ok((bytes, ext)) => {
                    let path = output_dir.join(Self::unique_name(&item.file_name, ext, &mut taken));
                    tokio::fs::write(&path, bytes)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    report.written.push(path);
                }
                Err(e) => {
                    error!("Export failed for {}: {:#}", item.file_name, e);
                    report.failed.push((item.file_name.clone(), format!("{:#}", e)));
                }
            }
        }

        info!("Exported {} images to {}", report.written.len(), output_dir.display());
        Ok(report)
    }
}
