// src/services/generation/images_edit.rs
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use super::{
    GenerationProvider, MOCK_MODEL, TRY_ON_PROMPT, checked_output, parse_field, read_mock_image,
    stylize_prompt,
};
use crate::errors::{
    GenerationError, GenerationFailure, Operation, ProviderResponseError, TransportError,
};
use crate::models::{ImageBlob, StylizeParams, TryOnParams};
use crate::services::codec;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const OUTPUT_SIZE: &str = "1024x1536";
pub const INPUT_FIDELITY: &str = "high";

#[derive(Debug, Clone)]
pub struct EditImageFile {
    pub name: String,
    pub blob: ImageBlob,
}

impl EditImageFile {
    fn new(name: &str, blob: ImageBlob) -> Self {
        Self {
            name: format!("{}.{}", name, blob.extension()),
            blob,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImagesEditRequest {
    pub model: String,
    pub prompt: String,
    pub size: String,
    pub input_fidelity: Option<String>,
    pub images: Vec<EditImageFile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImagesEditResponse {
    #[serde(default)]
    pub data: Option<Vec<EditedImage>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EditedImage {
    #[serde(default)]
    pub b64_json: Option<String>,
}

#[async_trait]
pub trait ImagesEditClient: Send + Sync {
    async fn edit(&self, request: ImagesEditRequest) -> Result<ImagesEditResponse, TransportError>;
}

pub struct HttpImagesEditClient {
    api_key: String,
    base_url: String,
    client: Client,
}

impl HttpImagesEditClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl ImagesEditClient for HttpImagesEditClient {
    async fn edit(&self, request: ImagesEditRequest) -> Result<ImagesEditResponse, TransportError> {
        let mut form = Form::new()
            .text("model", request.model)
            .text("prompt", request.prompt)
            .text("size", request.size)
            .text("n", "1");
        if let Some(fidelity) = request.input_fidelity {
            form = form.text("input_fidelity", fidelity);
        }
        for image in request.images {
            let part = Part::bytes(image.blob.data)
                .file_name(image.name)
                .mime_str(&image.blob.mime_type)?;
            form = form.part("image[]", part);
        }

        let response = self
            .client
            .post(format!("{}/images/edits", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
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

pub fn first_image(response: ImagesEditResponse) -> Result<String, ProviderResponseError> {
    let data = response
        .data
        .filter(|items| !items.is_empty())
        .ok_or(ProviderResponseError::NoResponseData)?;

    data.into_iter()
        .next()
        .and_then(|item| item.b64_json)
        .filter(|b64| !b64.is_empty())
        .ok_or(ProviderResponseError::NoImageData)
}

pub struct ImagesEditProvider {
    client: Arc<dyn ImagesEditClient>,
    model: String,
    mock_image_path: PathBuf,
}

impl ImagesEditProvider {
    pub fn new(client: Arc<dyn ImagesEditClient>, model: String, mock_image_path: PathBuf) -> Self {
        Self {
            client,
            model,
            mock_image_path,
        }
    }

    fn is_mock(&self) -> bool {
        self.model == MOCK_MODEL
    }

    fn request(&self, prompt: String, images: Vec<EditImageFile>) -> ImagesEditRequest {
        ImagesEditRequest {
            model: self.model.clone(),
            prompt,
            size: OUTPUT_SIZE.to_string(),
            input_fidelity: Some(INPUT_FIDELITY.to_string()),
            images,
        }
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
        let model = parse_field("modelImage", &params.model_image)?;
        let apparel = parse_field("apparelImages[0]", &params.apparel_images[0])?;

        info!(
            "Sending try-on edit request ({} + {} bytes)",
            model.data.len(),
            apparel.data.len()
        );
        let request = self.request(
            TRY_ON_PROMPT.to_string(),
            vec![
                EditImageFile::new("model", model),
                EditImageFile::new("apparel", apparel),
            ],
        );
        let response = self.client.edit(request).await?;

        checked_output(first_image(response)?)
    }

    async fn restyle(&self, params: &StylizeParams) -> Result<String, GenerationFailure> {
        codec::validate_stylize(params)?;

        if self.is_mock() {
            return checked_output(read_mock_image(&self.mock_image_path).await?);
        }

        let image = parse_field("image", &params.image)?;
        let request = self.request(
            stylize_prompt(&params.style),
            vec![EditImageFile::new("image", image)],
        );
        let response = self.client.edit(request).await?;

        checked_output(first_image(response)?)
    }
}

#[async_trait]
impl GenerationProvider for ImagesEditProvider {
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
        "images-edit"
    }
}
