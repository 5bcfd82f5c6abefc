// src/lib.rs
use std::sync::Arc;

use actix_web::http::Method;
use actix_web::{HttpResponse, web};

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod services;

use crate::config::Config;
use crate::services::{GenerationProvider, ResizeService, generation};

pub const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub provider: Arc<dyn GenerationProvider>,
    pub resizer: Arc<ResizeService>,
}

impl AppState {
    pub fn new(config: Config, provider: Arc<dyn GenerationProvider>) -> Self {
        Self {
            config: Arc::new(config),
            provider,
            resizer: Arc::new(ResizeService::new()),
        }
    }

    pub fn from_config(config: Config) -> Self {
        let provider = generation::build_provider(&config);
        Self::new(config, provider)
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/tryon", web::post().to(handlers::try_on))
            .route("/tryon", web::method(Method::OPTIONS).to(handlers::preflight))
            .route("/stylize", web::post().to(handlers::stylize))
            .route("/stylize", web::method(Method::OPTIONS).to(handlers::preflight)),
    )
    .route("/health", web::get().to(health_check));
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "tryon",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
