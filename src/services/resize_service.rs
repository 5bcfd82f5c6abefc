// src/services/resize_service.rs
use chrono::{DateTime, Utc};
use log::{error, info};
use serde::Serialize;

use crate::models::{FitMode, ImageMetadata, ProcessingOptions};
use crate::services::image_processor::ImageProcessor;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResizeMetadata {
    pub original: Option<ImageMetadata>,
    pub resized: Option<ImageMetadata>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeResult {
    pub success: bool,
    #[serde(skip)]
    pub resized_blob: Option<Vec<u8>>,
    pub metadata: ResizeMetadata,
    pub applied_options: ProcessingOptions,
    pub compression_ratio: f64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionReport {
    pub width: u32,
    pub height: u32,
    pub size: String,
}

impl From<&ImageMetadata> for DimensionReport {
    fn from(meta: &ImageMetadata) -> Self {
        Self {
            width: meta.width,
            height: meta.height,
            size: format_bytes(meta.size_bytes),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeReport {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub original: Option<DimensionReport>,
    pub resized: Option<DimensionReport>,
    pub compression_ratio: f64,
    pub options: ProcessingOptions,
    pub error: Option<String>,
}

impl ResizeResult {
    pub fn report(&self) -> ResizeReport {
        ResizeReport {
            timestamp: Utc::now(),
            success: self.success,
            original: self.metadata.original.as_ref().map(DimensionReport::from),
            resized: self.metadata.resized.as_ref().map(DimensionReport::from),
            compression_ratio: self.compression_ratio,
            options: self.applied_options.clone(),
            error: self.error.clone(),
        }
    }
}

/// Percentage saved, rounded to two decimals; 0 for an empty original.
pub fn compression_ratio(original_size: usize, resized_size: usize) -> f64 {
    if original_size == 0 {
        return 0.0;
    }
    let ratio = (1.0 - resized_size as f64 / original_size as f64) * 100.0;
    (ratio * 100.0).round() / 100.0
}

pub fn format_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

// Each candidate is rounded before it is checked against the other bound.
pub fn fit_dimensions(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    let aspect = f64::from(width) / f64::from(height.max(1));
    let round = |v: f64| (v.round() as u32).max(1);

    if aspect > 1.0 {
        let fitted_height = round(f64::from(max_width) / aspect);
        if fitted_height > max_height {
            (round(f64::from(max_height) * aspect), max_height)
        } else {
            (max_width, fitted_height)
        }
    } else {
        let fitted_width = round(f64::from(max_height) * aspect);
        if fitted_width > max_width {
            (max_width, round(f64::from(max_width) / aspect))
        } else {
            (fitted_width, max_height)
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ResizeService {
    processor: ImageProcessor,
}

impl ResizeService {
    pub fn new() -> Self {
        Self {
            processor: ImageProcessor::new(),
        }
    }

    pub fn resize(&self, data: &[u8], options: ProcessingOptions) -> ResizeResult {
        let result = match self.processor.process(data, &options) {
            Ok(processed) => ResizeResult {
                success: true,
                compression_ratio: compression_ratio(
                    processed.original.size_bytes,
                    processed.metadata.size_bytes,
                ),
                resized_blob: Some(processed.data),
                metadata: ResizeMetadata {
                    original: Some(processed.original),
                    resized: Some(processed.metadata),
                },
                applied_options: options,
                error: None,
            },
            Err(e) => ResizeResult {
                success: false,
                resized_blob: None,
                metadata: ResizeMetadata {
                    original: self.processor.read_metadata(data).ok(),
                    resized: None,
                },
                applied_options: options,
                compression_ratio: 0.0,
                error: Some(e.to_string()),
            },
        };

        log_report(&result.report());
        result
    }

    pub fn resize_to_fit(
        &self,
        data: &[u8],
        max_width: u32,
        max_height: u32,
        options: ProcessingOptions,
    ) -> ResizeResult {
        let original = match self.processor.read_metadata(data) {
            Ok(meta) => meta,
            Err(e) => {
                let result = ResizeResult {
                    success: false,
                    resized_blob: None,
                    metadata: ResizeMetadata::default(),
                    applied_options: ProcessingOptions {
                        width: Some(max_width),
                        height: Some(max_height),
                        fit: FitMode::Contain,
                        ..options
                    },
                    compression_ratio: 0.0,
                    error: Some(e.to_string()),
                };
                log_report(&result.report());
                return result;
            }
        };

        let (width, height) = fit_dimensions(original.width, original.height, max_width, max_height);

        self.resize(
            data,
            ProcessingOptions {
                width: Some(width),
                height: Some(height),
                fit: FitMode::Contain,
                ..options
            },
        )
    }
}

fn log_report(report: &ResizeReport) {
    let json = serde_json::to_string(report).unwrap_or_else(|e| format!("<unserializable: {}>", e));
    if report.success {
        info!("Image resized: {}", json);
    } else {
        error!("Image resize failed: {}", json);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OutputFormat;
    use crate::services::image_processor::tests::{jpeg_bytes, rgba_png_bytes};

    #[test]
    fn compression_ratio_is_percentage_saved() {
        assert_eq!(compression_ratio(1_024_000, 512_000), 50.0);
        assert_eq!(compression_ratio(3, 2), 33.33);
        assert_eq!(compression_ratio(100, 150), -50.0);
    }

    #[test]
    fn compression_ratio_of_empty_original_is_zero() {
        assert_eq!(compression_ratio(0, 512_000), 0.0);
        assert_eq!(compression_ratio(0, 0), 0.0);
    }

    #[test]
    fn formats_sizes_for_humans() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1_024_000), "1000.00 KB");
        assert_eq!(format_bytes(2 * 1024 * 1024), "2.00 MB");
    }

    #[test]
    fn landscape_fits_box_and_keeps_aspect() {
        let (w, h) = fit_dimensions(1920, 1080, 800, 600);

        assert_eq!((w, h), (800, 450));
        assert!(w <= 800 && h <= 600);
        let expected_h = f64::from(w) * 1080.0 / 1920.0;
        assert!((f64::from(h) - expected_h).abs() <= 1.0);
    }

    #[test]
    fn fit_falls_back_to_other_bound() {
        // Wide box, landscape image: width-first height would overflow.
        assert_eq!(fit_dimensions(1600, 1000, 1000, 300), (480, 300));
        // Portrait into a narrow box.
        assert_eq!(fit_dimensions(1000, 2000, 300, 1000), (300, 600));
        // Square takes the height-first branch.
        assert_eq!(fit_dimensions(500, 500, 400, 200), (200, 200));
    }

    #[test]
    fn resize_to_fit_never_exceeds_original() {
        let service = ResizeService::new();
        let result = service.resize_to_fit(&jpeg_bytes(192, 108), 800, 600, ProcessingOptions::default());

        assert!(result.success);
        let resized = result.metadata.resized.unwrap();
        assert_eq!((resized.width, resized.height), (192, 108));
        assert_eq!(result.applied_options.fit, FitMode::Contain);
    }

    #[test]
    fn resize_to_fit_shrinks_into_box() {
        let service = ResizeService::new();
        let result = service.resize_to_fit(&jpeg_bytes(192, 108), 80, 60, ProcessingOptions::default());

        assert!(result.success);
        let resized = result.metadata.resized.as_ref().unwrap();
        assert_eq!((resized.width, resized.height), (80, 45));
        assert_eq!(result.applied_options.width, Some(80));
        assert_eq!(result.applied_options.height, Some(45));
        assert!(result.resized_blob.is_some());
    }

    #[test]
    fn resize_to_fit_carries_channel_options() {
        let options = ProcessingOptions {
            ensure_four_channel: true,
            format: Some(OutputFormat::Jpeg),
            ..Default::default()
        };
        let result = ResizeService::new().resize_to_fit(&jpeg_bytes(64, 64), 32, 32, options);

        let resized = result.metadata.resized.unwrap();
        assert_eq!(resized.channels, Some(4));
        assert_eq!(resized.format, "png");
    }

    #[test]
    fn failure_produces_structured_result() {
        let options = ProcessingOptions {
            width: Some(10),
            ..Default::default()
        };
        let result = ResizeService::new().resize(b"garbage", options.clone());

        assert!(!result.success);
        assert!(result.resized_blob.is_none());
        assert!(result.metadata.original.is_none());
        assert_eq!(result.compression_ratio, 0.0);
        assert_eq!(result.applied_options, options);
        assert!(result.error.as_deref().unwrap().contains("Failed to read image metadata"));
    }

    #[test]
    fn report_has_expected_shape() {
        let data = rgba_png_bytes(40, 20);
        let options = ProcessingOptions {
            width: Some(20),
            height: Some(10),
            fit: FitMode::Inside,
            ..Default::default()
        };
        let result = ResizeService::new().resize(&data, options);
        let report = serde_json::to_value(result.report()).unwrap();

        let mut keys: Vec<_> = report.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "compressionRatio",
                "error",
                "options",
                "original",
                "resized",
                "success",
                "timestamp"
            ]
        );
        assert_eq!(report["success"], true);
        assert_eq!(report["original"]["width"], 40);
        assert_eq!(report["original"]["height"], 20);
        assert_eq!(report["original"]["size"], format_bytes(data.len()));
        assert_eq!(report["resized"]["width"], 20);
        assert_eq!(report["resized"]["height"], 10);
        assert_eq!(report["options"]["fit"], "inside");
        assert!(report["error"].is_null());
    }

    #[test]
    fn failed_report_carries_error_and_attempted_options() {
        let result = ResizeService::new().resize_to_fit(b"garbage", 100, 100, ProcessingOptions::default());
        let report = serde_json::to_value(result.report()).unwrap();

        assert_eq!(report["success"], false);
        assert!(report["resized"].is_null());
        assert_eq!(report["options"]["width"], 100);
        assert_eq!(report["options"]["fit"], "contain");
        assert!(report["error"].as_str().unwrap().contains("unrecognized image format"));
    }
}
