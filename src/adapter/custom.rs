//! Custom HTTP backend.
//!
//! `POST <endpoint>` with a bearer key and
//! `{model, prompt, image: <data uri>, size, watermark: false}`; the result
//! URL is read from `data[0].url` or `output[0].url`.

use super::transport_error;
use crate::{
    config::WorkflowConfig,
    error::EditError,
    task::{ImageReference, SourceImage},
};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

/// Third-party endpoint adapter
#[derive(Debug, Clone)]
pub struct CustomAdapter {
    endpoint: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    size: Option<String>,
    client: Client,
}

/// Fully specified custom target
struct CustomTarget<'a> {
    endpoint: &'a str,
    api_key: &'a str,
    model: &'a str,
}

impl CustomAdapter {
    pub fn new(config: &WorkflowConfig, client: Client) -> Self {
        Self {
            endpoint: config.custom_endpoint.clone(),
            api_key: config.custom_api_key.clone(),
            model: config.custom_model.clone(),
            size: config.image_size.clone(),
            client,
        }
    }

    fn target(&self) -> Result<CustomTarget<'_>, EditError> {
        fn present(value: &Option<String>) -> Option<&str> {
            value.as_deref().map(str::trim).filter(|v| !v.is_empty())
        }

        match (present(&self.endpoint), present(&self.api_key), present(&self.model)) {
            (Some(endpoint), Some(api_key), Some(model)) => Ok(CustomTarget {
                endpoint,
                api_key,
                model,
            }),
            _ => Err(EditError::Config("incomplete custom configuration".to_string())),
        }
    }

    pub async fn edit(&self, image: &SourceImage, prompt: &str) -> Result<ImageReference, EditError> {
        let target = self.target()?;

        let body = CustomRequest {
            model: target.model,
            prompt,
            image: image.to_data_uri(),
            size: self.size.as_deref(),
            watermark: false,
        };
        debug!(endpoint = %target.endpoint, model = %target.model, "Sending custom edit request");

        let response = self
            .client
            .post(target.endpoint)
            .header(reqwest::header::AUTHORIZATION, bearer(target.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, endpoint = %target.endpoint, "Custom endpoint request failed");
                transport_error(target.endpoint, &e)
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(target.endpoint, &e))?;

        if !status.is_success() {
            error!(status = %status, body = %text, "Custom endpoint returned error status");
            return Err(EditError::Request(failure_message(status, &text)));
        }

        let json: Value = serde_json::from_str(&text).map_err(|_| EditError::NoImageData)?;
        result_url(&json)
            .map(|url| ImageReference::Url(url.to_string()))
            .ok_or(EditError::NoImageData)
    }
}

#[derive(Debug, Serialize)]
struct CustomRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<&'a str>,
    watermark: bool,
}

/// `Bearer ` is prepended only when missing
fn bearer(api_key: &str) -> String {
    if api_key.starts_with("Bearer ") {
        api_key.to_string()
    } else {
        format!("Bearer {}", api_key)
    }
}

/// Server message if the body is `{"error":{"message":..}}`, else `"<status> <reason>"`
fn failure_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            format!("{} {}", status.as_u16(), status.canonical_reason().unwrap_or(""))
                .trim_end()
                .to_string()
        })
}

fn result_url(json: &Value) -> Option<&str> {
    ["/data/0/url", "/output/0/url"]
        .iter()
        .find_map(|path| json.pointer(path).and_then(Value::as_str))
        .filter(|url| !url.is_empty())
}
