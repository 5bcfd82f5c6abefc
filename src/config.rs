// src/config.rs
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::services::generation::{MOCK_MODEL, RetryPolicy, chat, images_edit};

pub const DEFAULT_MOCK_IMAGE_PATH: &str = "public/demo/generated.png";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    ImagesEdit,
    Chat,
}

impl ProviderKind {
    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::ImagesEdit => "gpt-image-1",
            ProviderKind::Chat => "gemini-2.5-flash-image-preview",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "images-edit" | "openai" => Ok(ProviderKind::ImagesEdit),
            "chat" | "gemini" => Ok(ProviderKind::Chat),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub provider: ProviderKind,
    pub model: String,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub openai_base_url: String,
    pub gemini_base_url: String,
    pub app_base_url: Option<String>,
    pub environment: Environment,
    pub mock_image_path: PathBuf,
    pub tryon_retry: RetryPolicy,
    pub stylize_retry: RetryPolicy,
    pub input_max_dimension: Option<u32>,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    // Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = match get("TRYON_PROVIDER") {
            Some(value) => match value.parse() {
                Ok(kind) => kind,
                Err(reason) => {
                    return Err(ConfigError::Invalid {
                        key: "TRYON_PROVIDER",
                        value,
                        reason,
                    });
                }
            },
            None => ProviderKind::ImagesEdit,
        };
        let model = get("TRYON_MODEL").unwrap_or_else(|| provider.default_model().to_string());
        let openai_api_key = get("OPENAI_API_KEY");
        let gemini_api_key = get("GEMINI_API_KEY");

        if model != MOCK_MODEL {
            match provider {
                ProviderKind::ImagesEdit if openai_api_key.is_none() => {
                    return Err(ConfigError::Missing("OPENAI_API_KEY"));
                }
                ProviderKind::Chat if gemini_api_key.is_none() => {
                    return Err(ConfigError::Missing("GEMINI_API_KEY"));
                }
                _ => {}
            }
        }

        let environment = match get("APP_ENV").as_deref() {
            Some("production") => Environment::Production,
            _ => Environment::Development,
        };

        let base_delay =
            Duration::from_millis(parse_number(&get, "RETRY_BASE_DELAY_MS")?.unwrap_or(1000));
        let tryon_attempts = parse_number(&get, "TRYON_RETRY_ATTEMPTS")?.unwrap_or(1);
        let stylize_attempts = parse_number(&get, "STYLIZE_RETRY_ATTEMPTS")?.unwrap_or(3);

        Ok(Self {
            provider,
            model,
            openai_api_key,
            gemini_api_key,
            openai_base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| images_edit::DEFAULT_BASE_URL.to_string()),
            gemini_base_url: get("GEMINI_BASE_URL")
                .unwrap_or_else(|| chat::DEFAULT_BASE_URL.to_string()),
            app_base_url: get("APP_BASE_URL"),
            environment,
            mock_image_path: get("MOCK_IMAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MOCK_IMAGE_PATH)),
            tryon_retry: RetryPolicy::exponential(tryon_attempts, base_delay),
            stylize_retry: RetryPolicy::exponential(stylize_attempts, base_delay),
            input_max_dimension: parse_number(&get, "INPUT_MAX_DIMENSION")?,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn is_mock(&self) -> bool {
        self.model == MOCK_MODEL
    }
}

fn parse_number<T, G>(get: &G, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|value| match value.trim().parse::<T>() {
            Ok(parsed) => Ok(parsed),
            Err(e) => Err(ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            }),
        })
        .transpose()
}
