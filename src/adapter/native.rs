//! Native model backend.
//!
//! Calls `models/{model}:generateContent` with the source image inline and
//! returns the first inline image of the response as a data URI.

use super::transport_error;
use crate::{
    config::WorkflowConfig,
    credentials::CredentialProvider,
    error::EditError,
    task::{data_uri, ImageReference, SourceImage},
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

/// Aspect ratio requested from image models
pub const ASPECT_RATIO: &str = "1:1";

/// Models that accept `imageSize`; any other model rejects the field
pub const VARIABLE_RESOLUTION_MODELS: &[&str] = &["gemini-3-pro-image-preview"];

const DEFAULT_RESPONSE_MIME: &str = "image/png";

/// True when the model name indicates image generation
pub fn is_image_model(model: &str) -> bool {
    model.to_lowercase().contains("image")
}

/// True when the model declares support for variable resolution
pub fn supports_image_size(model: &str) -> bool {
    VARIABLE_RESOLUTION_MODELS.contains(&model)
}

/// First-party model adapter
#[derive(Clone)]
pub struct NativeAdapter {
    model: String,
    image_size: Option<String>,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
    client: Client,
}

impl std::fmt::Debug for NativeAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeAdapter")
            .field("model", &self.model)
            .field("image_size", &self.image_size)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl NativeAdapter {
    pub fn new(config: &WorkflowConfig, credentials: Arc<dyn CredentialProvider>, client: Client) -> Self {
        Self {
            model: config.model.clone(),
            image_size: config.image_size.clone(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            credentials,
            client,
        }
    }

    /// Builds the request body; shape depends on model identity
    fn build_request(&self, image: &SourceImage, prompt: &str) -> GenerateRequest {
        let parts = vec![
            RequestPart::InlineData {
                inline_data: InlineData {
                    mime_type: image.mime_type.clone(),
                    data: image.to_base64(),
                },
            },
            RequestPart::Text {
                text: instruction(prompt),
            },
        ];

        let generation_config = is_image_model(&self.model).then(|| GenerationConfig {
            response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
            image_config: ImageConfig {
                aspect_ratio: ASPECT_RATIO.to_string(),
                image_size: if supports_image_size(&self.model) {
                    self.image_size.clone()
                } else {
                    None
                },
            },
        });

        GenerateRequest {
            contents: vec![RequestContent { parts }],
            generation_config,
        }
    }

    pub async fn edit(&self, image: &SourceImage, prompt: &str) -> Result<ImageReference, EditError> {
        let api_key = self
            .credentials
            .api_key()
            .ok_or_else(|| EditError::Config("missing credential".to_string()))?;

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = self.build_request(image, prompt);
        debug!(model = %self.model, bytes = image.bytes.len(), "Sending native edit request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to send request to native backend");
                transport_error(&self.base_url, &e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(status = %status, error = %error_text, "Native backend returned error status");
            return Err(classify_failure(status, &error_text));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse native backend response");
            EditError::Request(format!("Failed to parse response: {}", e))
        })?;

        extract_image(parsed)
    }
}

fn instruction(prompt: &str) -> String {
    format!("Edit this image according to the following instruction: {}", prompt.trim())
}

/// Maps a non-2xx response to the error taxonomy
fn classify_failure(status: StatusCode, body: &str) -> EditError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let denied_signal = envelope
        .as_ref()
        .and_then(|e| e.error.status.as_deref())
        .is_some_and(|s| s == "PERMISSION_DENIED");
    let message = envelope
        .and_then(|e| e.error.message)
        .unwrap_or_else(|| format_status(status));

    if status == StatusCode::FORBIDDEN || denied_signal {
        EditError::PermissionDenied(message)
    } else {
        EditError::Request(message)
    }
}

fn format_status(status: StatusCode) -> String {
    format!("{} {}", status.as_u16(), status.canonical_reason().unwrap_or(""))
        .trim_end()
        .to_string()
}

/// First inline image wins; text-only responses are reported as such
fn extract_image(response: GenerateResponse) -> Result<ImageReference, EditError> {
    let parts: Vec<ResponsePart> = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts)
        .unwrap_or_default();

    let mut first_text: Option<String> = None;
    for part in parts {
        if let Some(blob) = part.inline_data {
            let mime = blob
                .mime_type
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_RESPONSE_MIME.to_string());
            return Ok(ImageReference::DataUri(data_uri(&mime, &blob.data)));
        }
        if first_text.is_none() {
            first_text = part.text.filter(|t| !t.trim().is_empty());
        }
    }

    match first_text {
        Some(text) => Err(EditError::ModelTextOnly(text)),
        None => Err(EditError::NoImageData),
    }
}

// Wire structures

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart {
    InlineData { inline_data: InlineData },
    Text { text: String },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseModalities")]
    response_modalities: Vec<String>,
    #[serde(rename = "imageConfig")]
    image_config: ImageConfig,
}

#[derive(Debug, Serialize)]
struct ImageConfig {
    #[serde(rename = "aspectRatio")]
    aspect_ratio: String,
    #[serde(rename = "imageSize", skip_serializing_if = "Option::is_none")]
    image_size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(rename = "inlineData", alias = "inline_data")]
    inline_data: Option<ResponseBlob>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlob {
    #[serde(rename = "mimeType", alias = "mime_type")]
    mime_type: Option<String>,
    data: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentialProvider;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn adapter(model: &str, base_url: &str, key: Option<&str>) -> NativeAdapter {
        let config = WorkflowConfig {
            model: model.to_string(),
            image_size: Some("2K".to_string()),
            api_base_url: base_url.to_string(),
            ..Default::default()
        };
        let credentials: Arc<dyn CredentialProvider> = match key {
            Some(k) => Arc::new(StaticCredentialProvider::new(k)),
            None => Arc::new(StaticCredentialProvider::missing()),
        };
        NativeAdapter::new(&config, credentials, Client::new())
    }

    fn image() -> SourceImage {
        SourceImage::new(b"png-bytes".to_vec(), "image/png")
    }

    #[test]
    fn test_model_gating() {
        assert!(is_image_model("gemini-2.5-flash-image"));
        assert!(!is_image_model("gemini-2.0-flash"));
        assert!(supports_image_size("gemini-3-pro-image-preview"));
        assert!(!supports_image_size("gemini-2.5-flash-image"));
    }

    #[test]
    fn test_request_omits_resolution_for_unsupported_model() {
        let adapter = adapter("gemini-2.5-flash-image", "http://unused", Some("k"));
        let body = serde_json::to_value(adapter.build_request(&image(), "add a hat")).unwrap();

        let image_config = &body["generationConfig"]["imageConfig"];
        assert_eq!(image_config["aspectRatio"], ASPECT_RATIO);
        assert!(image_config.get("imageSize").is_none());
    }

    #[test]
    fn test_request_includes_resolution_for_supported_model() {
        let adapter = adapter("gemini-3-pro-image-preview", "http://unused", Some("k"));
        let body = serde_json::to_value(adapter.build_request(&image(), "add a hat")).unwrap();
        assert_eq!(body["generationConfig"]["imageConfig"]["imageSize"], "2K");
    }

    #[test]
    fn test_request_without_image_config_for_text_model() {
        let adapter = adapter("gemini-2.0-flash", "http://unused", Some("k"));
        let body = serde_json::to_value(adapter.build_request(&image(), "add a hat")).unwrap();
        assert!(body.get("generationConfig").is_none());
        assert_eq!(body["contents"][0]["parts"][0]["inline_data"]["mime_type"], "image/png");
        assert!(body["contents"][0]["parts"][1]["text"].as_str().unwrap().ends_with("add a hat"));
    }

    #[tokio::test]
    async fn test_missing_credential_fails_before_network() {
        let adapter = adapter("gemini-2.5-flash-image", "http://127.0.0.1:1", None);
        let err = adapter.edit(&image(), "x").await.unwrap_err();
        assert!(matches!(err, EditError::Config(ref m) if m == "missing credential"));
    }

    #[tokio::test]
    async fn test_unreachable_base_url_gives_guidance() {
        let adapter = adapter("gemini-2.5-flash-image", "http://127.0.0.1:1/v1beta", Some("k"));
        let err = adapter.edit(&image(), "x").await.unwrap_err();

        match err {
            EditError::Network(message) => {
                assert!(message.contains("could not reach http://127.0.0.1:1/v1beta"));
                assert!(!message.to_lowercase().contains("connection refused"));
            }
            other => panic!("expected network error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_returns_first_inline_image() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/models/gemini-2.5-flash-image:generateContent")
            .match_header("x-goog-api-key", "test-key")
            .match_body(Matcher::PartialJson(json!({
                "generationConfig": { "imageConfig": { "aspectRatio": "1:1" } }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "candidates": [{ "content": { "parts": [
                        { "text": "Here you go" },
                        { "inlineData": { "mimeType": "image/jpeg", "data": "AAAA" } },
                        { "inlineData": { "mimeType": "image/png", "data": "BBBB" } }
                    ]}}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let adapter = adapter("gemini-2.5-flash-image", &server.url(), Some("test-key"));
        let result = adapter.edit(&image(), "make it blue").await.unwrap();

        assert_eq!(result, ImageReference::DataUri("data:image/jpeg;base64,AAAA".to_string()));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_mime_defaults_to_png() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/models/gemini-2.5-flash-image:generateContent")
            .with_status(200)
            .with_body(r#"{"candidates":[{"content":{"parts":[{"inlineData":{"data":"CCCC"}}]}}]}"#)
            .create_async()
            .await;

        let adapter = adapter("gemini-2.5-flash-image", &server.url(), Some("k"));
        let result = adapter.edit(&image(), "x").await.unwrap();
        assert_eq!(result.as_str(), "data:image/png;base64,CCCC");
    }

    #[tokio::test]
    async fn test_text_only_and_empty_responses() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/models/text-only-image:generateContent")
            .with_status(200)
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"I cannot edit people"}]}}]}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/models/empty-image:generateContent")
            .with_status(200)
            .with_body(r#"{"candidates":[]}"#)
            .create_async()
            .await;

        let err = adapter("text-only-image", &server.url(), Some("k"))
            .edit(&image(), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, EditError::ModelTextOnly(ref t) if t == "I cannot edit people"));

        let err = adapter("empty-image", &server.url(), Some("k"))
            .edit(&image(), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, EditError::NoImageData));
    }

    #[tokio::test]
    async fn test_permission_denied_is_distinguished() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/models/gemini-2.5-flash-image:generateContent")
            .with_status(403)
            .with_body(r#"{"error":{"code":403,"message":"The caller does not have permission","status":"PERMISSION_DENIED"}}"#)
            .create_async()
            .await;

        let err = adapter("gemini-2.5-flash-image", &server.url(), Some("k"))
            .edit(&image(), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, EditError::PermissionDenied(ref m) if m == "The caller does not have permission"));
    }

    #[test]
    fn test_permission_signal_without_403() {
        let body = r#"{"error":{"message":"denied","status":"PERMISSION_DENIED"}}"#;
        assert!(matches!(
            classify_failure(StatusCode::BAD_REQUEST, body),
            EditError::PermissionDenied(_)
        ));
    }

    #[test]
    fn test_other_failures_keep_message() {
        let body = r#"{"error":{"message":"Invalid argument","status":"INVALID_ARGUMENT"}}"#;
        assert!(matches!(
            classify_failure(StatusCode::BAD_REQUEST, body),
            EditError::Request(ref m) if m == "Invalid argument"
        ));
        assert!(matches!(
            classify_failure(StatusCode::INTERNAL_SERVER_ERROR, "oops"),
            EditError::Request(ref m) if m == "500 Internal Server Error"
        ));
    }
}
