// src/handlers.rs
use actix_web::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    HeaderValue, ORIGIN,
};
use actix_web::{HttpRequest, HttpResponse, ResponseError, web};
use bytes::Bytes;
use log::{error, info, warn};
use uuid::Uuid;

use crate::errors::ApiError;
use crate::{AppState, MAX_BODY_BYTES};
use crate::models::{
    ImageBlob, OutputFormat, ProcessingOptions, StylizeParams, TryOnParams, TryOnResult,
};
use crate::services::codec;

// Request `Origin`, else the configured base URL, else empty.
fn cors_origin(req: &HttpRequest, data: &AppState) -> String {
    req.headers()
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| data.config.app_base_url.clone())
        .unwrap_or_default()
}

fn with_cors(mut response: HttpResponse, origin: &str) -> HttpResponse {
    let headers = response.headers_mut();
    headers.insert(
        ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_str(origin).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

fn respond(result: Result<TryOnResult, ApiError>, request_id: Uuid, origin: &str) -> HttpResponse {
    let response = match result {
        Ok(result) => {
            info!("[{}] Generation succeeded", request_id);
            HttpResponse::Ok().json(result)
        }
        Err(e) => {
            match &e {
                ApiError::Validation(errors) => warn!("[{}] {}", request_id, errors),
                ApiError::Internal(_) => error!("[{}] Request failed: {}", request_id, e),
            }
            e.error_response()
        }
    };
    with_cors(response, origin)
}

pub async fn preflight(req: HttpRequest, data: web::Data<AppState>) -> HttpResponse {
    with_cors(HttpResponse::Ok().finish(), &cors_origin(&req, &data))
}

// Read here rather than through an extractor so rejected bodies still get CORS headers.
async fn read_body(payload: web::Payload, request_id: Uuid) -> Result<Bytes, HttpResponse> {
    match payload.to_bytes_limited(MAX_BODY_BYTES).await {
        Ok(Ok(body)) => Ok(body),
        Ok(Err(e)) => {
            warn!("[{}] Failed to read request body: {}", request_id, e);
            Err(e.error_response())
        }
        Err(_) => {
            warn!("[{}] Request body exceeds {} bytes", request_id, MAX_BODY_BYTES);
            Err(HttpResponse::PayloadTooLarge().json(serde_json::json!({
                "error": "Payload Too Large"
            })))
        }
    }
}

pub async fn try_on(
    req: HttpRequest,
    payload: web::Payload,
    data: web::Data<AppState>,
) -> HttpResponse {
    let request_id = Uuid::new_v4();
    let origin = cors_origin(&req, &data);
    let body = match read_body(payload, request_id).await {
        Ok(body) => body,
        Err(response) => return with_cors(response, &origin),
    };
    let result = run_try_on(&body, &data, request_id).await;
    respond(result, request_id, &origin)
}

async fn run_try_on(
    body: &[u8],
    data: &AppState,
    request_id: Uuid,
) -> Result<TryOnResult, ApiError> {
    let production = data.config.is_production();

    let params: TryOnParams = serde_json::from_slice(body)
        .map_err(|e| ApiError::internal(format!("Invalid request body: {}", e), production))?;
    info!(
        "[{}] Try-on request with {} apparel image(s)",
        request_id,
        params.apparel_images.len()
    );

    codec::validate_request(&params)?;
    let params = prepare_try_on(params, data).await?;

    let img_generated = data
        .provider
        .generate(&params)
        .await
        .map_err(|e| ApiError::from_generation(e, production))?;

    Ok(TryOnResult { img_generated })
}

pub async fn stylize(
    req: HttpRequest,
    payload: web::Payload,
    data: web::Data<AppState>,
) -> HttpResponse {
    let request_id = Uuid::new_v4();
    let origin = cors_origin(&req, &data);
    let body = match read_body(payload, request_id).await {
        Ok(body) => body,
        Err(response) => return with_cors(response, &origin),
    };
    let result = run_stylize(&body, &data, request_id).await;
    respond(result, request_id, &origin)
}

async fn run_stylize(
    body: &[u8],
    data: &AppState,
    request_id: Uuid,
) -> Result<TryOnResult, ApiError> {
    let production = data.config.is_production();

    let params: StylizeParams = serde_json::from_slice(body)
        .map_err(|e| ApiError::internal(format!("Invalid request body: {}", e), production))?;
    info!("[{}] Stylize request: '{}'", request_id, params.style);

    codec::validate_stylize(&params)?;
    let params = StylizeParams {
        image: prepare_image(&params.image, data).await?,
        style: params.style,
    };

    let img_generated = data
        .provider
        .stylize(&params)
        .await
        .map_err(|e| ApiError::from_generation(e, production))?;

    Ok(TryOnResult { img_generated })
}

// Only the images the provider will consume are prepared.
async fn prepare_try_on(mut params: TryOnParams, data: &AppState) -> Result<TryOnParams, ApiError> {
    if data.config.input_max_dimension.is_none() {
        return Ok(params);
    }
    params.model_image = prepare_image(&params.model_image, data).await?;
    if let Some(first) = params.apparel_images.first_mut() {
        let prepared = prepare_image(first, data).await?;
        *first = prepared;
    }
    Ok(params)
}

async fn prepare_image(image: &str, data: &AppState) -> Result<String, ApiError> {
    let production = data.config.is_production();
    let Some(max) = data.config.input_max_dimension else {
        return Ok(image.to_string());
    };

    let blob = ImageBlob::parse(image).map_err(|e| ApiError::internal(e, production))?;
    let resizer = data.resizer.clone();
    let options = ProcessingOptions {
        format: Some(OutputFormat::Png),
        ensure_four_channel: true,
        ..Default::default()
    };

    let result =
        tokio::task::spawn_blocking(move || resizer.resize_to_fit(&blob.data, max, max, options))
            .await
            .map_err(|e| ApiError::internal(e, production))?;

    match result.resized_blob {
        Some(resized) if result.success => Ok(codec::encode(&resized)),
        _ => Err(ApiError::internal(
            format!(
                "Failed to prepare image: {}",
                result.error.unwrap_or_else(|| "unknown error".to_string())
            ),
            production,
        )),
    }
}
