use std::{collections::HashSet, sync::Arc};

use axum::{
    Form, Json, Router,
    body::Body,
    extract::{FromRequest, Multipart, Request, State},
    http::{
        HeaderMap, HeaderValue, Method, StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, LOCATION},
    },
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::StreamExt;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

use crate::{
    config::{AllowedOrigins, normalize_origin},
    error::{ApiError, ConversionError},
    job::{ConversionResult, Converter, DownloadedFile},
};

const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";
const MISSING_URL_MESSAGE: &str = "Form field `url` is required.";

#[derive(Clone)]
pub struct AppState {
    pub converter: Arc<dyn Converter>,
}

impl AppState {
    pub fn new(converter: Arc<dyn Converter>) -> Self {
        Self { converter }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConvertForm {
    url: String,
}

pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/convert", post(convert))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": format!(
            "YouTube MP3 Converter API ({}) is running.",
            state.converter.name()
        )
    }))
}

async fn convert(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ApiError> {
    let url = read_url_field(request).await?;
    let result = state.converter.convert(&url).await?;
    render(result).await
}

/// Browsers posting `FormData` send multipart; everything else is read as urlencoded.
async fn read_url_field(request: Request) -> Result<String, ApiError> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| {
            value
                .trim_start()
                .to_ascii_lowercase()
                .starts_with("multipart/form-data")
        });

    if !is_multipart {
        let Form(form) = Form::<ConvertForm>::from_request(request, &())
            .await
            .map_err(|rejection| {
                debug!("Rejected convert form: {rejection}");
                ApiError::bad_request(MISSING_URL_MESSAGE)
            })?;
        return Ok(form.url);
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|rejection| {
            debug!("Rejected multipart convert form: {rejection}");
            ApiError::bad_request(MISSING_URL_MESSAGE)
        })?;

    while let Some(field) = multipart.next_field().await.map_err(|error| {
        debug!("Failed to read multipart: {error}");
        ApiError::bad_request(MISSING_URL_MESSAGE)
    })? {
        if field.name() == Some("url") {
            return field.text().await.map_err(|error| {
                debug!("Failed to read multipart url field: {error}");
                ApiError::bad_request(MISSING_URL_MESSAGE)
            });
        }
    }

    Err(ApiError::bad_request(MISSING_URL_MESSAGE))
}

async fn render(result: ConversionResult) -> Result<Response, ApiError> {
    match result {
        ConversionResult::File(file) => stream_file(file).await,
        ConversionResult::Metadata(metadata) => Ok(Json(metadata).into_response()),
        ConversionResult::Redirect(location) => {
            let value = HeaderValue::from_str(&location).map_err(|_| {
                ApiError::from(ConversionError::Internal(format!(
                    "download link is not a valid header value: {location:?}"
                )))
            })?;
            Ok((StatusCode::SEE_OTHER, [(LOCATION, value)]).into_response())
        }
    }
}

/// Streams the converted file; the artifact guard rides inside the body so the file is
/// deleted once the body has been sent or dropped.
async fn stream_file(file: DownloadedFile) -> Result<Response, ApiError> {
    let metadata = tokio::fs::metadata(file.path()).await.map_err(|error| {
        ApiError::from(ConversionError::Internal(format!(
            "could not read metadata of {:?}: {error}",
            file.path()
        )))
    })?;
    let handle = tokio::fs::File::open(file.path()).await.map_err(|error| {
        ApiError::from(ConversionError::Internal(format!(
            "could not open {:?}: {error}",
            file.path()
        )))
    })?;

    let DownloadedFile { filename, artifact } = file;
    let stream = ReaderStream::new(handle).map(move |chunk| {
        let _artifact = &artifact;
        chunk
    });

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(AUDIO_CONTENT_TYPE));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(metadata.len()));
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&build_content_disposition(&filename))
            .map_err(|_| ApiError::internal("Could not build the download header."))?,
    );

    Ok((headers, Body::from_stream(stream)).into_response())
}

fn build_content_disposition(filename: &str) -> String {
    let safe_ascii = sanitize_ascii_filename(filename);
    format!(
        "attachment; filename=\"{safe_ascii}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}

fn sanitize_ascii_filename(value: &str) -> String {
    value
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() || matches!(character, '.' | '-' | '_') {
                character
            } else {
                '_'
            }
        })
        .collect()
}

pub fn build_cors_layer(allowed: &AllowedOrigins) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .expose_headers([CONTENT_DISPOSITION]);

    match allowed {
        AllowedOrigins::Any => {
            warn!("ALLOWED_ORIGINS is not restricted. Any origin may call the API.");
            layer.allow_origin(Any)
        }
        AllowedOrigins::List(origins) => {
            info!(
                "CORS allow-list loaded with {} origin(s): {:?}",
                origins.len(),
                origins
            );
            let allowed_origins: Arc<HashSet<String>> = Arc::new(origins.iter().cloned().collect());
            layer.allow_origin(AllowOrigin::predicate(
                move |origin: &HeaderValue, _| {
                    let normalized = origin.to_str().ok().and_then(normalize_origin);
                    let allowed = normalized
                        .as_ref()
                        .is_some_and(|value| allowed_origins.contains(value));
                    debug!(
                        "CORS origin check raw={:?} normalized={:?} allowed={}",
                        origin, normalized, allowed
                    );
                    allowed
                },
            ))
        }
    }
}
