// src/services/generation/chat.rs
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{
    GenerationProvider, MOCK_MODEL, TRY_ON_PROMPT, checked_output, parse_field, read_mock_image,
    stylize_prompt,
};
use crate::errors::{
    GenerationError, GenerationFailure, Operation, ProviderResponseError, TransportError,
};
use crate::models::{StylizeParams, TryOnParams};
use crate::services::codec;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const TEMPERATURE: f32 = 0.2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    pub fn image(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.into(),
                data: data.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<ContentPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub response_modalities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, TransportError>;
}

pub struct HttpChatClient {
    api_key: String,
    base_url: String,
    client: Client,
}

impl HttpChatClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, TransportError> {
        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, model))
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

/// Returns the payload of the first inline image in the first candidate.
pub fn first_inline_image(
    response: GenerateContentResponse,
) -> Result<String, ProviderResponseError> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(ProviderResponseError::NoCandidates)?;

    let parts = candidate
        .content
        .map(|content| content.parts)
        .filter(|parts| !parts.is_empty())
        .ok_or(ProviderResponseError::NoContentParts)?;

    parts
        .into_iter()
        .find_map(|part| part.inline_data)
        .map(|inline| inline.data)
        .filter(|data| !data.is_empty())
        .ok_or(ProviderResponseError::NoInlineImage)
}

pub struct ChatProvider {
    client: Arc<dyn ChatClient>,
    model: String,
    mock_image_path: PathBuf,
}

impl ChatProvider {
    pub fn new(client: Arc<dyn ChatClient>, model: String, mock_image_path: PathBuf) -> Self {
        Self {
            client,
            model,
            mock_image_path,
        }
    }

    fn is_mock(&self) -> bool {
        self.model == MOCK_MODEL
    }

    fn image_part(field: &str, image: &str) -> Result<ContentPart, GenerationFailure> {
        let blob = parse_field(field, image)?;
        Ok(ContentPart::image(blob.mime_type, codec::normalize(image)))
    }

    fn request(parts: Vec<ContentPart>) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
            },
        }
    }

    async fn send(&self, request: GenerateContentRequest) -> Result<String, GenerationFailure> {
        let response = self.client.generate_content(&self.model, &request).await?;
        checked_output(first_inline_image(response)?)
    }

    async fn try_on(&self, params: &TryOnParams) -> Result<String, GenerationFailure> {
        codec::validate_request(params)?;

        if self.is_mock() {
            return checked_output(read_mock_image(&self.mock_image_path).await?);
        }

        if params.apparel_images.len() > 1 {
            debug!(
                "{} apparel images supplied; only the first is sent",
                params.apparel_images.len()
            );
        }

        let request = Self::request(vec![
            ContentPart::text(TRY_ON_PROMPT),
            Self::image_part("modelImage", &params.model_image)?,
            Self::image_part("apparelImages[0]", &params.apparel_images[0])?,
        ]);
        info!("Sending try-on chat request to model '{}'", self.model);
        self.send(request).await
    }

    async fn restyle(&self, params: &StylizeParams) -> Result<String, GenerationFailure> {
        codec::validate_stylize(params)?;

        if self.is_mock() {
            return checked_output(read_mock_image(&self.mock_image_path).await?);
        }

        let request = Self::request(vec![
            ContentPart::text(stylize_prompt(&params.style)),
            Self::image_part("image", &params.image)?,
        ]);
        self.send(request).await
    }
}

#[async_trait]
impl GenerationProvider for ChatProvider {
    async fn generate(&self, params: &TryOnParams) -> Result<String, GenerationError> {
        self.try_on(params)
            .await
            .map_err(|e| GenerationError::new(Operation::TryOn, e))
    }

    async fn stylize(&self, params: &StylizeParams) -> Result<String, GenerationError> {
        self.restyle(params)
            .await
            .map_err(|e| GenerationError::new(Operation::Stylize, e))
    }

    fn name(&self) -> &str {
        "chat"
    }
}
