// src/services/codec.rs
use base64::{Engine as _, engine::general_purpose};

use crate::errors::{FieldError, InvalidImage, ValidationErrors};
use crate::models::{StylizeParams, TryOnParams};

const DATA_URL_SCHEME: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

fn split_data_url(image: &str) -> Option<(&str, &str)> {
    image.strip_prefix(DATA_URL_SCHEME)?.split_once(BASE64_MARKER)
}

fn is_image_mime(mime: &str) -> bool {
    mime.strip_prefix("image/").is_some_and(|subtype| {
        !subtype.is_empty()
            && subtype
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

/// Strips a leading `data:image/<fmt>;base64,` prefix, if any.
pub fn normalize(image: &str) -> &str {
    match split_data_url(image) {
        Some((mime, payload)) if is_image_mime(mime) => payload,
        _ => image,
    }
}

fn validate_payload(payload: &str) -> Result<(), InvalidImage> {
    if payload.is_empty() {
        return Err(InvalidImage::Empty);
    }
    if let Some(c) = payload
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')))
    {
        return Err(InvalidImage::InvalidBase64(format!(
            "unexpected character {c:?}"
        )));
    }
    if payload.len() % 4 != 0 {
        return Err(InvalidImage::InvalidBase64(
            "length is not a multiple of 4".to_string(),
        ));
    }
    // Canonical padding: at most two '=' and only at the end.
    let body = payload.trim_end_matches('=');
    if payload.len() - body.len() > 2 || body.contains('=') {
        return Err(InvalidImage::InvalidBase64("malformed padding".to_string()));
    }
    general_purpose::STANDARD
        .decode(payload)
        .map(|_| ())
        .map_err(|e| InvalidImage::InvalidBase64(e.to_string()))
}

pub fn validate_image(image: &str) -> Result<(), InvalidImage> {
    if image.trim().is_empty() {
        return Err(InvalidImage::Empty);
    }
    if image.starts_with(DATA_URL_SCHEME) {
        let (mime, payload) = split_data_url(image).ok_or(InvalidImage::MalformedDataUrl)?;
        if !is_image_mime(mime) {
            return Err(InvalidImage::NotImage(mime.to_string()));
        }
        return validate_payload(payload);
    }
    validate_payload(image)
}

pub fn decode(image: &str) -> Result<Vec<u8>, InvalidImage> {
    validate_image(image)?;
    general_purpose::STANDARD
        .decode(normalize(image))
        .map_err(|e| InvalidImage::InvalidBase64(e.to_string()))
}

pub fn encode(data: &[u8]) -> String {
    general_purpose::STANDARD.encode(data)
}

pub fn sniff_mime(data: &[u8]) -> &'static str {
    match image::guess_format(data) {
        Ok(image::ImageFormat::Png) => "image/png",
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        Ok(image::ImageFormat::WebP) => "image/webp",
        Ok(image::ImageFormat::Gif) => "image/gif",
        Ok(image::ImageFormat::Tiff) => "image/tiff",
        Ok(image::ImageFormat::Bmp) => "image/bmp",
        _ => "application/octet-stream",
    }
}

fn check_field(field: String, image: &str, errors: &mut Vec<FieldError>) {
    if let Err(e) = validate_image(image) {
        errors.push(FieldError::new(field, e.to_string()));
    }
}

pub fn validate_request(params: &TryOnParams) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    check_field("modelImage".to_string(), &params.model_image, &mut errors);

    if params.apparel_images.is_empty() {
        errors.push(FieldError::new(
            "apparelImages",
            "At least one apparel image is required",
        ));
    }
    for (index, image) in params.apparel_images.iter().enumerate() {
        check_field(format!("apparelImages[{index}]"), image, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

pub fn validate_stylize(params: &StylizeParams) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    check_field("image".to_string(), &params.image, &mut errors);
    if params.style.trim().is_empty() {
        errors.push(FieldError::new("style", "Style is required"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

pub fn validate_result(image: &str) -> Result<(), InvalidImage> {
    validate_image(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImageBlob;

    // 1x1 transparent PNG.
    const PIXEL: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    fn data_url(payload: &str) -> String {
        format!("data:image/png;base64,{payload}")
    }

    #[test]
    fn normalize_strips_data_url_prefix() {
        assert_eq!(normalize(&data_url(PIXEL)), PIXEL);
        assert_eq!(normalize(PIXEL), PIXEL);
        assert_eq!(normalize("data:image/svg+xml;base64,QUJD"), "QUJD");
    }

    #[test]
    fn normalize_is_idempotent() {
        for input in [data_url(PIXEL), PIXEL.to_string(), "QUJD".to_string()] {
            let once = normalize(&input);
            assert_eq!(normalize(once), once);
        }
    }

    #[test]
    fn data_url_and_raw_payload_parse_to_the_same_blob() {
        let from_url = ImageBlob::parse(&data_url(PIXEL)).unwrap();
        let from_raw = ImageBlob::parse(PIXEL).unwrap();

        assert_eq!(from_url, from_raw);
        assert_eq!(from_raw.mime_type, "image/png");
    }

    #[test]
    fn validate_image_accepts_both_shapes() {
        assert!(validate_image(PIXEL).is_ok());
        assert!(validate_image(&data_url(PIXEL)).is_ok());
        assert!(validate_image("data:image/jpeg;base64,QUI=").is_ok());
    }

    #[test]
    fn validate_image_rejects_bad_input() {
        assert_eq!(validate_image(""), Err(InvalidImage::Empty));
        assert_eq!(validate_image("   "), Err(InvalidImage::Empty));
        assert_eq!(
            validate_image("data:image/png;base64,"),
            Err(InvalidImage::Empty)
        );
        assert_eq!(
            validate_image("data:text/plain;base64,QUJD"),
            Err(InvalidImage::NotImage("text/plain".to_string()))
        );
        assert_eq!(
            validate_image("data:image/png,QUJD"),
            Err(InvalidImage::MalformedDataUrl)
        );
        assert!(matches!(
            validate_image("not base64!"),
            Err(InvalidImage::InvalidBase64(_))
        ));
        assert!(matches!(
            validate_image("QUJ"),
            Err(InvalidImage::InvalidBase64(_))
        ));
        assert!(matches!(
            validate_image("Q==="),
            Err(InvalidImage::InvalidBase64(_))
        ));
        assert!(matches!(
            validate_image("QU=D"),
            Err(InvalidImage::InvalidBase64(_))
        ));
    }

    #[test]
    fn request_without_apparel_fails_on_apparel_field() {
        let params = TryOnParams {
            model_image: PIXEL.to_string(),
            apparel_images: vec![],
        };
        let errors = validate_request(&params).unwrap_err();

        assert_eq!(errors.0.len(), 1);
        assert_eq!(errors.0[0].field, "apparelImages");
    }

    #[test]
    fn request_with_bad_model_image_fails_on_model_field() {
        let params = TryOnParams {
            model_image: "%%%".to_string(),
            apparel_images: vec![PIXEL.to_string()],
        };
        let errors = validate_request(&params).unwrap_err();

        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["modelImage"]);
    }

    #[test]
    fn request_reports_every_offending_field() {
        let params = TryOnParams {
            model_image: String::new(),
            apparel_images: vec![PIXEL.to_string(), "bad".to_string(), data_url(PIXEL)],
        };
        let errors = validate_request(&params).unwrap_err();

        assert_eq!(
            errors.fields().collect::<Vec<_>>(),
            vec!["modelImage", "apparelImages[1]"]
        );
    }

    #[test]
    fn valid_request_passes() {
        let params = TryOnParams {
            model_image: data_url(PIXEL),
            apparel_images: vec![PIXEL.to_string()],
        };
        assert!(validate_request(&params).is_ok());
    }

    #[test]
    fn stylize_requires_image_and_style() {
        let errors = validate_stylize(&StylizeParams::default()).unwrap_err();
        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["image", "style"]);

        let params = StylizeParams {
            image: PIXEL.to_string(),
            style: "watercolor".to_string(),
        };
        assert!(validate_stylize(&params).is_ok());
    }

    #[test]
    fn malformed_result_is_rejected() {
        assert!(validate_result("").is_err());
        assert!(validate_result("<html>").is_err());
        assert!(validate_result(PIXEL).is_ok());
    }
}
