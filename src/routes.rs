use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Multipart, State,
    },
    routing::{get, post},
    Json, Router,
};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    codec,
    error::{AppError, AppJsonResult, AppResult},
    interpreter::{now_millis, Gesture, InterpretationResult, Source},
    storage, AppState,
};

pub const ALLOWED_MODEL_EXTENSIONS: [&str; 3] = [".h5", ".tflite", ".pb"];

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.body_limit_bytes;

    Router::new()
        .route("/health", get(health))
        .route("/api/interpret", post(interpret_image))
        .route("/api/interpret/video", post(interpret_video))
        .route("/api/interpret/live", post(interpret_live))
        .route("/api/upload_model", post(upload_model))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

static LAST_HEALTH_MICROS: AtomicU64 = AtomicU64::new(0);

async fn health() -> Json<Value> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default();
    // never report a timestamp older than one already handed out
    let micros = LAST_HEALTH_MICROS.fetch_max(now, Ordering::Relaxed).max(now);

    Json(json!({
        "status": "healthy",
        "timestamp": micros as f64 / 1_000_000.0,
    }))
}

#[derive(Debug, Deserialize)]
pub struct InterpretRequest {
    image: Option<String>,
    source: Option<Source>,
}

#[derive(Debug, Deserialize)]
pub struct LiveRequest {
    image: Option<String>,
    /// Echoed back untouched, whatever JSON the client sent.
    #[serde(default = "first_frame")]
    frame_number: Value,
}

fn first_frame() -> Value {
    Value::from(0)
}

#[derive(Debug, Deserialize)]
pub struct VideoRequest {
    video: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ImageInterpretation {
    #[serde(flatten)]
    result: InterpretationResult,
    #[serde(rename = "imagePath")]
    image_path: String,
}

#[derive(Debug, Serialize)]
pub struct LiveInterpretation {
    #[serde(flatten)]
    result: InterpretationResult,
    frame_number: Value,
}

#[derive(Debug, Serialize)]
pub struct VideoInterpretation {
    #[serde(flatten)]
    result: InterpretationResult,
    #[serde(rename = "videoPath")]
    video_path: String,
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::BadRequest(format!("Invalid request body: {}", rejection.body_text())))
}

fn required(field: Option<String>, missing: &str) -> AppResult<String> {
    field.ok_or_else(|| AppError::BadRequest(missing.to_string()))
}

/// Runs the engine and applies the fallback policy: when inference fails and
/// fallback is enabled, the caller gets a simulated result instead.
async fn interpret_with_policy(
    state: &AppState,
    image: DynamicImage,
    source: Source,
) -> AppResult<InterpretationResult> {
    match state.interpreter.interpret(image, source).await {
        Ok(result) => Ok(result),
        Err(err) if state.config.fallback_to_simulation => {
            warn!(error = %err, "model inference failed, answering with simulated result");
            Ok(state.interpreter.simulated().await)
        }
        Err(err) => Err(err.into()),
    }
}

async fn interpret_image(
    State(state): State<AppState>,
    payload: Result<Json<InterpretRequest>, JsonRejection>,
) -> AppJsonResult<ImageInterpretation> {
    let request = json_body(payload)?;
    let image_data = required(request.image, "No image provided")?;
    let source = request.source.unwrap_or(Source::Camera);

    let filename = storage::capture_filename(now_millis());
    let upload_dir = state.config.upload_dir.clone();
    let capture_name = filename.clone();
    let image = tokio::task::spawn_blocking(move || -> AppResult<DynamicImage> {
        let image = codec::decode_image(&image_data)?;
        storage::save_capture(&upload_dir, &capture_name, &image)?;
        Ok(image)
    })
    .await??;

    let result = interpret_with_policy(&state, image, source).await?;

    Ok(Json(ImageInterpretation {
        result,
        image_path: filename,
    }))
}

async fn interpret_live(
    State(state): State<AppState>,
    payload: Result<Json<LiveRequest>, JsonRejection>,
) -> AppJsonResult<LiveInterpretation> {
    let request = json_body(payload)?;
    let image_data = required(request.image, "No image provided")?;

    let image = tokio::task::spawn_blocking(move || codec::decode_image(&image_data)).await??;
    let result = interpret_with_policy(&state, image, Source::Camera).await?;

    Ok(Json(LiveInterpretation {
        result,
        frame_number: request.frame_number,
    }))
}

async fn interpret_video(
    State(state): State<AppState>,
    payload: Result<Json<VideoRequest>, JsonRejection>,
) -> AppJsonResult<VideoInterpretation> {
    let request = json_body(payload)?;
    let video_data = required(request.video, "No video provided")?;

    let bytes = codec::decode_video(&video_data)?;
    let timestamp = now_millis();
    let filename = storage::video_filename(timestamp);
    storage::save_video(&state.config.upload_dir, &filename, &bytes).await?;

    // Videos are stored but not analysed; the answer is fixed.
    let result = InterpretationResult {
        text: "Video interpretation is not fully implemented yet".to_string(),
        confidence: 0.85,
        source: Source::Video,
        detected_gestures: vec![
            Gesture {
                label: "Hello".to_string(),
                confidence: 0.92,
            },
            Gesture {
                label: "Thank you".to_string(),
                confidence: 0.88,
            },
        ],
        timestamp,
        is_mock: None,
    };

    Ok(Json(VideoInterpretation {
        result,
        video_path: filename,
    }))
}

/// Compares fixed-size digests without early exit, so timing does not reveal
/// how much of the key matched.
fn keys_match(provided: &str, expected: &str) -> bool {
    let provided = Sha256::digest(provided.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    provided
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

fn allowed_model_file(filename: &str) -> bool {
    ALLOWED_MODEL_EXTENSIONS
        .iter()
        .any(|ext| filename.ends_with(ext))
}

async fn upload_model(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppJsonResult<Value> {
    // without a form there is no key to check
    let mut multipart = multipart.map_err(|_| AppError::Unauthorized)?;

    let mut api_key = None;
    let mut model = None;
    let read = async {
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some("api_key") => api_key = Some(field.text().await?),
                Some("model") => {
                    let filename = field.file_name().unwrap_or_default().to_string();
                    let bytes = field.bytes().await?;
                    model = Some((filename, bytes));
                }
                _ => {}
            }
        }
        Ok::<(), MultipartError>(())
    }
    .await;

    // The key decides first: a broken body from an unauthenticated caller is
    // still a 401.
    let authorized = api_key
        .as_deref()
        .map(|key| !key.is_empty() && keys_match(key, &state.config.upload_api_key))
        .unwrap_or(false);
    if !authorized {
        return Err(AppError::Unauthorized);
    }
    read?;

    let (filename, bytes) =
        model.ok_or_else(|| AppError::BadRequest("No model file provided".to_string()))?;
    if !allowed_model_file(&filename) {
        return Err(AppError::BadRequest("Invalid model file format".to_string()));
    }

    let gate = state.interpreter.gate().clone();
    let target = gate.path().to_path_buf();
    tokio::task::spawn_blocking(move || storage::replace_atomically(&target, &bytes)).await??;

    let model_loaded = gate.reload().await;
    info!(%filename, model_loaded, "model artifact replaced");

    Ok(Json(json!({
        "status": "success",
        "message": "Model uploaded successfully",
        "filename": filename,
        "model_loaded": model_loaded,
    })))
}
