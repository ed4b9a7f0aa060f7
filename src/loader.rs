//! # Folder Loader Module
//!
//! Questo modulo crea gli Image Task a partire da una cartella.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva delle immagini in una directory
//! - Riconoscimento del mime type dal contenuto (fallback sull'estensione)
//! - Creazione di un task `pending` e selezionato per ogni immagine
//!
//! ## Formati supportati:
//! JPG, JPEG, PNG, WebP, GIF

use crate::task::{ImageTask, SourceImage};
use anyhow::{Context, Result};
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub struct FolderLoader;

impl FolderLoader {
    /// Check if a file extension is a supported image
    pub fn is_supported_image(path: &Path) -> bool {
        Self::mime_from_extension(path).is_some()
    }

    pub fn mime_from_extension(path: &Path) -> Option<&'static str> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some("image/jpeg"),
            "png" => Some("image/png"),
            "webp" => Some("image/webp"),
            "gif" => Some("image/gif"),
            _ => None,
        }
    }

    /// Mime type from the file signature
    pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
        match image::guess_format(bytes).ok()? {
            ImageFormat::Jpeg => Some("image/jpeg"),
            ImageFormat::Png => Some("image/png"),
            ImageFormat::WebP => Some("image/webp"),
            ImageFormat::Gif => Some("image/gif"),
            _ => None,
        }
    }

    /// Find all supported images in a directory, sorted by path
    pub fn find_images(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| Self::is_supported_image(p))
            .collect();
        files.sort();
        files
    }

    /// One task per accepted image file
    pub async fn load(dir: &Path) -> Result<Vec<ImageTask>> {
        if !dir.is_dir() {
            return Err(anyhow::anyhow!("Not a directory: {}", dir.display()));
        }

        let mut tasks = Vec::new();
        for path in Self::find_images(dir) {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;

            if bytes.is_empty() {
                warn!("Skipping empty file: {}", path.display());
                continue;
            }

            let mime = Self::sniff_mime(&bytes)
                .or_else(|| Self::mime_from_extension(&path))
                .unwrap_or("image/png");

            let file_name = path
                .strip_prefix(dir)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");

            debug!("Loaded {} ({}, {} bytes)", file_name, mime, bytes.len());
            tasks.push(ImageTask::new(file_name, SourceImage::new(bytes, mime)));
        }

        Ok(tasks)
    }
}
