// src/models.rs
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::errors::InvalidImage;
use crate::services::codec;

// MIME type is sniffed from the bytes, so a data URL and raw base64 of the
// same payload compare equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl ImageBlob {
    pub fn parse(image: &str) -> Result<Self, InvalidImage> {
        let data = codec::decode(image)?;
        let mime_type = codec::sniff_mime(&data).to_string();
        Ok(Self { data, mime_type })
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        let mime_type = codec::sniff_mime(&data).to_string();
        Self { data, mime_type }
    }

    pub fn to_base64(&self) -> String {
        codec::encode(&self.data)
    }

    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            "image/tiff" => "tiff",
            "image/bmp" => "bmp",
            _ => "png",
        }
    }
}

// Missing, null or wrong-typed fields become empty so validation reports
// them per field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TryOnParams {
    #[serde(deserialize_with = "lenient_string")]
    pub model_image: String,
    #[serde(deserialize_with = "lenient_strings")]
    pub apparel_images: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StylizeParams {
    #[serde(deserialize_with = "lenient_string")]
    pub image: String,
    #[serde(deserialize_with = "lenient_string")]
    pub style: String,
}

fn string_or_empty(value: Value) -> String {
    match value {
        Value::String(s) => s,
        _ => String::new(),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Value::deserialize(deserializer).map(string_or_empty)
}

fn lenient_strings<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().map(string_or_empty).collect(),
        _ => Vec::new(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TryOnResult {
    pub img_generated: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub size_bytes: usize,
    pub channels: Option<u8>,
    pub has_alpha: Option<bool>,
    pub color_space: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    #[default]
    Cover,
    /// Fit within both dimensions, letterboxing to the exact box.
    Contain,
    Fill,
    Inside,
    Outside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    Jpeg,
    Tiff,
}

impl OutputFormat {
    /// Format chosen when channel enforcement needs an alpha channel.
    pub const ALPHA_DEFAULT: OutputFormat = OutputFormat::Png;

    pub fn supports_alpha(self) -> bool {
        matches!(self, OutputFormat::Png | OutputFormat::Tiff)
    }

    pub fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Png => Some(OutputFormat::Png),
            image::ImageFormat::Jpeg => Some(OutputFormat::Jpeg),
            image::ImageFormat::Tiff => Some(OutputFormat::Tiff),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Tiff => "tiff",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessingOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fit: FitMode,
    pub format: Option<OutputFormat>,
    pub quality: Option<u8>,
    pub ensure_four_channel: bool,
    /// Takes precedence over `ensure_four_channel`.
    pub force_four_channel: bool,
}
