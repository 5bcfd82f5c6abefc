// src/services/mod.rs
pub mod codec;
pub mod generation;
pub mod image_processor;
pub mod resize_service;

pub use generation::GenerationProvider;
pub use image_processor::ImageProcessor;
pub use resize_service::ResizeService;
