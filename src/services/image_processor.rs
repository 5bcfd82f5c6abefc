// src/services/image_processor.rs

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::codecs::tiff::TiffEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, DynamicImage, ImageBuffer, ImageEncoder, ImageFormat, Pixel};

use crate::errors::ImageProcessingError;
use crate::models::{FitMode, ImageMetadata, OutputFormat, ProcessingOptions};

const DEFAULT_JPEG_QUALITY: u8 = 80;

#[derive(Debug, Default, Clone, Copy)]
pub struct ImageProcessor;

#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub data: Vec<u8>,
    pub original: ImageMetadata,
    pub metadata: ImageMetadata,
    pub format: OutputFormat,
    pub alpha_enforced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelPlan {
    pub enforce_alpha: bool,
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResizePlan {
    Exact(u32, u32),
    Crop(u32, u32),
    Letterbox { inner: (u32, u32), outer: (u32, u32) },
}

struct Probe {
    image: DynamicImage,
    source: ImageFormat,
    metadata: ImageMetadata,
}

impl ImageProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn read_metadata(&self, data: &[u8]) -> Result<ImageMetadata, ImageProcessingError> {
        probe(data).map(|p| p.metadata)
    }

    pub fn process(
        &self,
        data: &[u8],
        options: &ProcessingOptions,
    ) -> Result<ProcessedImage, ImageProcessingError> {
        let Probe {
            mut image,
            source,
            metadata: original,
        } = probe(data)?;

        // The output format is settled here, before the single encode below.
        let plan = plan_channels(&original, OutputFormat::from_image_format(source), options);

        if plan.enforce_alpha {
            image = ensure_alpha(image);
        }

        if let Some(resize) = plan_resize(
            image.width(),
            image.height(),
            options.width,
            options.height,
            options.fit,
        ) {
            image = apply_resize(image, resize);
        }

        let encoded = encode(image, plan.format, options.quality)?;
        let metadata = probe(&encoded)?.metadata;

        Ok(ProcessedImage {
            data: encoded,
            original,
            metadata,
            format: plan.format,
            alpha_enforced: plan.enforce_alpha,
        })
    }
}

fn probe(data: &[u8]) -> Result<Probe, ImageProcessingError> {
    if data.is_empty() {
        return Err(ImageProcessingError::Probe("image buffer is empty".to_string()));
    }
    let source = image::guess_format(data)
        .map_err(|e| ImageProcessingError::Probe(format!("unrecognized image format: {}", e)))?;
    let image = image::load_from_memory_with_format(data, source)
        .map_err(|e| ImageProcessingError::Probe(format!("corrupt image data: {}", e)))?;

    let color = image.color();
    let metadata = ImageMetadata {
        width: image.width(),
        height: image.height(),
        format: format_name(source),
        size_bytes: data.len(),
        channels: Some(color.channel_count()),
        has_alpha: Some(color.has_alpha()),
        color_space: Some(if color.has_color() { "srgb" } else { "b-w" }.to_string()),
    };

    Ok(Probe {
        image,
        source,
        metadata,
    })
}

fn format_name(format: ImageFormat) -> String {
    match format {
        ImageFormat::Png => "png".to_string(),
        ImageFormat::Jpeg => "jpeg".to_string(),
        ImageFormat::Tiff => "tiff".to_string(),
        ImageFormat::WebP => "webp".to_string(),
        ImageFormat::Gif => "gif".to_string(),
        other => format!("{:?}", other).to_lowercase(),
    }
}

/// Decides alpha enforcement and the final output format before encoding.
pub fn plan_channels(
    original: &ImageMetadata,
    source: Option<OutputFormat>,
    options: &ProcessingOptions,
) -> ChannelPlan {
    let requested = options
        .format
        .or(source)
        .unwrap_or(OutputFormat::ALPHA_DEFAULT);

    let enforce_alpha = options.force_four_channel
        || (options.ensure_four_channel
            && (original.has_alpha != Some(true) || original.channels != Some(4)));

    let format = if enforce_alpha && !requested.supports_alpha() {
        OutputFormat::ALPHA_DEFAULT
    } else {
        requested
    };

    ChannelPlan {
        enforce_alpha,
        format,
    }
}

fn is_wide(color: ColorType) -> bool {
    color.bytes_per_pixel() > color.channel_count()
}

// Opaque alpha is added when missing; 16-bit sources stay 16-bit.
fn ensure_alpha(image: DynamicImage) -> DynamicImage {
    if is_wide(image.color()) {
        DynamicImage::ImageRgba16(image.to_rgba16())
    } else {
        DynamicImage::ImageRgba8(image.to_rgba8())
    }
}

fn scaled(value: u32, scale: f64) -> u32 {
    ((f64::from(value) * scale).round() as u32).max(1)
}

// Never enlarges: `None` when the box needs no downscale.
fn plan_resize(
    width: u32,
    height: u32,
    target_width: Option<u32>,
    target_height: Option<u32>,
    fit: FitMode,
) -> Option<ResizePlan> {
    let (w, h) = match (target_width, target_height) {
        (None, None) => return None,
        (Some(w), None) => {
            let scale = f64::from(w.max(1)) / f64::from(width);
            return (scale < 1.0).then(|| ResizePlan::Exact(w.max(1), scaled(height, scale)));
        }
        (None, Some(h)) => {
            let scale = f64::from(h.max(1)) / f64::from(height);
            return (scale < 1.0).then(|| ResizePlan::Exact(scaled(width, scale), h.max(1)));
        }
        (Some(w), Some(h)) => (w.max(1), h.max(1)),
    };

    let sx = f64::from(w) / f64::from(width);
    let sy = f64::from(h) / f64::from(height);

    match fit {
        FitMode::Fill => {
            let target = (w.min(width), h.min(height));
            (target != (width, height)).then_some(ResizePlan::Exact(target.0, target.1))
        }
        FitMode::Inside | FitMode::Contain => {
            let scale = sx.min(sy);
            if scale >= 1.0 {
                return None;
            }
            let inner = (scaled(width, scale).min(w), scaled(height, scale).min(h));
            if fit == FitMode::Contain && inner != (w, h) {
                Some(ResizePlan::Letterbox {
                    inner,
                    outer: (w, h),
                })
            } else {
                Some(ResizePlan::Exact(inner.0, inner.1))
            }
        }
        FitMode::Cover => (sx.max(sy) < 1.0).then_some(ResizePlan::Crop(w, h)),
        FitMode::Outside => {
            let scale = sx.max(sy);
            (scale < 1.0).then(|| ResizePlan::Exact(scaled(width, scale), scaled(height, scale)))
        }
    }
}

fn apply_resize(image: DynamicImage, plan: ResizePlan) -> DynamicImage {
    match plan {
        ResizePlan::Exact(w, h) => image.resize_exact(w, h, FilterType::Lanczos3),
        ResizePlan::Crop(w, h) => image.resize_to_fill(w, h, FilterType::Lanczos3),
        ResizePlan::Letterbox { inner, outer } => {
            let resized = image.resize_exact(inner.0, inner.1, FilterType::Lanczos3);
            letterbox(resized, outer.0, outer.1)
        }
    }
}

// Zeroed canvas: transparent with alpha, black without.
fn letterbox(image: DynamicImage, width: u32, height: u32) -> DynamicImage {
    let x = i64::from(width.saturating_sub(image.width()) / 2);
    let y = i64::from(height.saturating_sub(image.height()) / 2);

    match image {
        DynamicImage::ImageLuma8(img) => DynamicImage::ImageLuma8(pad(&img, width, height, x, y)),
        DynamicImage::ImageLumaA8(img) => {
            DynamicImage::ImageLumaA8(pad(&img, width, height, x, y))
        }
        DynamicImage::ImageRgb8(img) => DynamicImage::ImageRgb8(pad(&img, width, height, x, y)),
        DynamicImage::ImageRgba8(img) => DynamicImage::ImageRgba8(pad(&img, width, height, x, y)),
        DynamicImage::ImageLuma16(img) => {
            DynamicImage::ImageLuma16(pad(&img, width, height, x, y))
        }
        DynamicImage::ImageLumaA16(img) => {
            DynamicImage::ImageLumaA16(pad(&img, width, height, x, y))
        }
        DynamicImage::ImageRgb16(img) => DynamicImage::ImageRgb16(pad(&img, width, height, x, y)),
        other => DynamicImage::ImageRgba16(pad(&other.to_rgba16(), width, height, x, y)),
    }
}

fn pad<P: Pixel>(
    image: &ImageBuffer<P, Vec<P::Subpixel>>,
    width: u32,
    height: u32,
    x: i64,
    y: i64,
) -> ImageBuffer<P, Vec<P::Subpixel>> {
    let mut canvas = ImageBuffer::new(width, height);
    imageops::overlay(&mut canvas, image, x, y);
    canvas
}

// Pixel layout the target encoder accepts. PNG and TIFF keep 16-bit depth;
// TIFF has no grey+alpha layout so those widen to RGBA.
fn encodable(image: DynamicImage, format: OutputFormat) -> DynamicImage {
    let color = image.color();
    match (format, color) {
        (OutputFormat::Jpeg, ColorType::L8 | ColorType::Rgb8) => image,
        (OutputFormat::Jpeg, ColorType::L16) => DynamicImage::ImageLuma8(image.to_luma8()),
        (OutputFormat::Jpeg, _) => DynamicImage::ImageRgb8(image.to_rgb8()),
        (
            OutputFormat::Png,
            ColorType::L8
            | ColorType::La8
            | ColorType::Rgb8
            | ColorType::Rgba8
            | ColorType::L16
            | ColorType::La16
            | ColorType::Rgb16
            | ColorType::Rgba16,
        ) => image,
        (
            OutputFormat::Tiff,
            ColorType::L8
            | ColorType::Rgb8
            | ColorType::Rgba8
            | ColorType::L16
            | ColorType::Rgb16
            | ColorType::Rgba16,
        ) => image,
        (_, ColorType::La8) => DynamicImage::ImageRgba8(image.to_rgba8()),
        (_, color) if color.has_alpha() => DynamicImage::ImageRgba16(image.to_rgba16()),
        _ => DynamicImage::ImageRgb16(image.to_rgb16()),
    }
}

fn encode(
    image: DynamicImage,
    format: OutputFormat,
    quality: Option<u8>,
) -> Result<Vec<u8>, ImageProcessingError> {
    let image = encodable(image, format);
    let (width, height) = (image.width(), image.height());
    let mut output = Vec::new();

    let result = match format {
        // No palette reduction, so alpha survives.
        OutputFormat::Png => {
            PngEncoder::new_with_quality(&mut output, CompressionType::Default, PngFilter::Adaptive)
                .write_image(image.as_bytes(), width, height, image.color())
        }
        OutputFormat::Jpeg => {
            let quality = quality.unwrap_or(DEFAULT_JPEG_QUALITY).clamp(1, 100);
            JpegEncoder::new_with_quality(&mut output, quality).encode(
                image.as_bytes(),
                width,
                height,
                image.color(),
            )
        }
        OutputFormat::Tiff => TiffEncoder::new(Cursor::new(&mut output)).write_image(
            image.as_bytes(),
            width,
            height,
            image.color(),
        ),
    };

    result.map_err(|e| ImageProcessingError::Encode {
        format: format.name().to_string(),
        reason: e.to_string(),
    })?;

    Ok(output)
}
