// src/services/generation/mod.rs
pub mod chat;
pub mod images_edit;
pub mod retry;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use log::info;

use crate::config::{Config, ProviderKind};
use crate::errors::{
    FieldError, GenerationError, GenerationFailure, ProviderResponseError, ValidationErrors,
};
use crate::models::{ImageBlob, StylizeParams, TryOnParams};
use crate::services::codec;

pub use chat::{ChatProvider, HttpChatClient};
pub use images_edit::{HttpImagesEditClient, ImagesEditProvider};
pub use retry::{RetryPolicy, RetryingProvider};

/// Reserved model id that switches every backend to the local demo image.
pub const MOCK_MODEL: &str = "mock";

pub const TRY_ON_PROMPT: &str = "Replace the garment worn by the person in the first image \
with the garment shown in the second image. Keep the person's pose, face, hair, body \
proportions, scale, lighting and background exactly as they are, and fit the new garment \
naturally with realistic folds and shadows. Do not extrapolate or add content beyond the \
original image crop.";

pub fn stylize_prompt(style: &str) -> String {
    format!(
        "Redraw this image in a {} style. Preserve the composition, subject, pose and \
         framing; change only the rendering style. Do not add content beyond the original crop.",
        style.trim()
    )
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Dresses the model in the first apparel image; returns raw base64.
    async fn generate(&self, params: &TryOnParams) -> Result<String, GenerationError>;

    async fn stylize(&self, params: &StylizeParams) -> Result<String, GenerationError>;

    fn name(&self) -> &str;
}

pub fn build_provider(config: &Config) -> Arc<dyn GenerationProvider> {
    let inner: Arc<dyn GenerationProvider> = match config.provider {
        ProviderKind::ImagesEdit => Arc::new(ImagesEditProvider::new(
            Arc::new(HttpImagesEditClient::new(
                config.openai_api_key.clone().unwrap_or_default(),
                config.openai_base_url.clone(),
            )),
            config.model.clone(),
            config.mock_image_path.clone(),
        )),
        ProviderKind::Chat => Arc::new(ChatProvider::new(
            Arc::new(HttpChatClient::new(
                config.gemini_api_key.clone().unwrap_or_default(),
                config.gemini_base_url.clone(),
            )),
            config.model.clone(),
            config.mock_image_path.clone(),
        )),
    };

    info!(
        "Using {} provider with model '{}'",
        inner.name(),
        config.model
    );

    Arc::new(RetryingProvider::new(
        inner,
        config.tryon_retry,
        config.stylize_retry,
    ))
}

pub(crate) async fn read_mock_image(path: &Path) -> Result<String, GenerationFailure> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| GenerationFailure::MockImage {
            path: path.to_path_buf(),
            source,
        })?;
    info!("Mock mode: returning {} ({} bytes)", path.display(), bytes.len());
    Ok(codec::encode(&bytes))
}

pub(crate) fn parse_field(field: &str, image: &str) -> Result<ImageBlob, ValidationErrors> {
    ImageBlob::parse(image)
        .map_err(|e| ValidationErrors(vec![FieldError::new(field, e.to_string())]))
}

/// Rejects malformed provider output and strips any data-URL prefix.
pub(crate) fn checked_output(image: String) -> Result<String, GenerationFailure> {
    codec::validate_result(&image)
        .map_err(|e| ProviderResponseError::InvalidImage(e.to_string()))?;
    Ok(codec::normalize(&image).to_string())
}
