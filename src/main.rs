//! Marksheet Extractor - OCR-driven subject/marks extraction server.

mod config;
mod error;
mod ocr;
mod parser;
mod pipeline;
mod preprocess;
mod schema;
mod scorer;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{HeaderValue, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use config::{AppConfig, ConfigStore, DEFAULT_PROFILE};
use ocr::tesseract::TesseractRecognizer;
use ocr::TextRecognizer;
use pipeline::MarksheetExtractor;
use schema::{MarksheetResult, SubjectRecord};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    /// One pipeline per profile name.
    extractors: Arc<HashMap<String, Arc<MarksheetExtractor>>>,
    configs: Arc<ConfigStore>,
    upload_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "marksheet_extractor=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app_config = AppConfig::from_env()?;

    let configs = ConfigStore::load_from_dir(&app_config.config_dir)?;
    info!("Loaded {} configs: {:?}", configs.list().len(), configs.list());

    let tesseract = TesseractRecognizer::new(app_config.tesseract.clone());
    if tesseract.is_available() {
        info!("Tesseract available at {:?}", app_config.tesseract.command);
    } else {
        warn!(
            "Tesseract not runnable at {:?}; uploads will fail until it is installed",
            app_config.tesseract.command
        );
    }
    let recognizer: Arc<dyn TextRecognizer> = Arc::new(tesseract);

    let extractors: HashMap<String, Arc<MarksheetExtractor>> = configs
        .all()
        .iter()
        .map(|c| {
            (
                c.name.clone(),
                Arc::new(MarksheetExtractor::new(c, recognizer.clone())),
            )
        })
        .collect();

    tokio::fs::create_dir_all(&app_config.upload_dir).await?;
    info!("Uploads stored in {:?}", app_config.upload_dir);

    // Build application state
    let state = AppState {
        extractors: Arc::new(extractors),
        configs: Arc::new(configs),
        upload_dir: app_config.upload_dir.clone(),
    };

    // Build router
    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/configs", get(list_configs))
        .route("/api/subjects", get(list_subjects))
        .route("/api/upload-marksheet", post(upload_marksheet))
        .route("/api/calculate-percentage", post(calculate_percentage))
        .layer(DefaultBodyLimit::max(app_config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&app_config.cors_origins))
        .with_state(state);

    // Run server
    let listener = tokio::net::TcpListener::bind(&app_config.bind_addr).await?;
    info!("Server listening on http://{}", app_config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Ignoring invalid CORS origin {:?}: {}", o, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

// ============================================================================
// Handlers
// ============================================================================

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Marksheet Analyzer API is running" }))
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// List available configs.
async fn list_configs(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.configs.list())
}

#[derive(serde::Deserialize)]
struct ProfileQuery {
    config: Option<String>,
}

#[derive(serde::Serialize)]
struct UploadResponse {
    success: bool,
    data: Option<MarksheetResult>,
    message: String,
    filename: String,
}

/// `{success, data, message}` body for the manual entry routes.
#[derive(serde::Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    message: String,
}

/// One row of the manual entry form.
#[derive(serde::Deserialize)]
struct ManualMark {
    subject: String,
    marks: MarksField,
}

/// Form inputs post marks as strings; API clients may send numbers.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum MarksField {
    Int(i64),
    Float(f64),
    Text(String),
}

impl MarksField {
    fn to_marks(&self) -> Option<u32> {
        match self {
            Self::Int(n) => u32::try_from(*n).ok(),
            Self::Float(f) if f.fract() == 0.0 && *f >= 0.0 && *f <= u32::MAX as f64 => {
                Some(*f as u32)
            }
            Self::Float(_) => None,
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    fn raw(&self) -> String {
        match self {
            Self::Int(n) => n.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

/// Subject names offered by the manual entry form.
async fn list_subjects(
    State(state): State<AppState>,
    Query(query): Query<ProfileQuery>,
) -> Result<Json<ApiResponse<Vec<String>>>, (StatusCode, String)> {
    let name = query.config.as_deref().unwrap_or(DEFAULT_PROFILE);
    let config = state
        .configs
        .get(name)
        .ok_or_else(|| unknown_profile(&state, name))?;

    Ok(Json(ApiResponse {
        success: true,
        data: Some(config.known_subjects),
        message: "Subjects loaded".to_string(),
    }))
}

/// Upload a marksheet image and extract its subjects and marks.
async fn upload_marksheet(
    State(state): State<AppState>,
    Query(query): Query<ProfileQuery>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, (StatusCode, String)> {
    let extractor = extractor_for(&state, query.config.as_deref())?;

    // Read the uploaded file
    let mut filename = String::new();
    let mut file_data = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e))
    })? {
        if field.name() == Some("file") {
            let content_type = field.content_type().unwrap_or_default().to_string();
            if !content_type.starts_with("image/") {
                return Err((StatusCode::BAD_REQUEST, "File must be an image".to_string()));
            }
            filename = field.file_name().unwrap_or("marksheet").to_string();
            file_data = field.bytes().await.map_err(|e| {
                (StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e))
            })?.to_vec();
            break;
        }
    }

    if file_data.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No file uploaded".to_string()));
    }

    let stored_name = format!("{}.{}", Uuid::new_v4(), file_extension(&filename));
    let path = state.upload_dir.join(&stored_name);
    tokio::fs::write(&path, &file_data).await.map_err(|e| {
        error!("Failed to store upload {:?}: {}", path, e);
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Error processing file: {}", e))
    })?;
    info!("Received file: {} ({} bytes) stored as {}", filename, file_data.len(), stored_name);

    // Decode, filter and tesseract are all blocking.
    let envelope = tokio::task::spawn_blocking(move || extractor.extract_marks(&path))
        .await
        .map_err(|e| {
            error!("Extraction task failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error processing file: {}", e))
        })?;

    Ok(Json(UploadResponse {
        success: envelope.success,
        data: envelope.results,
        message: envelope.message,
        filename: stored_name,
    }))
}

/// Score marks typed in by hand.
async fn calculate_percentage(
    State(state): State<AppState>,
    Query(query): Query<ProfileQuery>,
    Json(rows): Json<Vec<ManualMark>>,
) -> Result<Json<ApiResponse<MarksheetResult>>, (StatusCode, String)> {
    let extractor = extractor_for(&state, query.config.as_deref())?;

    let subjects = match manual_records(rows) {
        Ok(subjects) => subjects,
        Err(message) => {
            return Ok(Json(ApiResponse {
                success: false,
                data: None,
                message,
            }))
        }
    };
    let envelope = extractor.score_manual(subjects);

    Ok(Json(ApiResponse {
        success: envelope.success,
        data: envelope.results,
        message: envelope.message,
    }))
}

// ============================================================================
// Helper functions
// ============================================================================

/// Convert form rows, failing on the first mark that is not a whole number.
fn manual_records(rows: Vec<ManualMark>) -> Result<Vec<SubjectRecord>, String> {
    rows.into_iter()
        .map(|row| match row.marks.to_marks() {
            Some(marks) => Ok(SubjectRecord::new(row.subject.trim(), marks)),
            None => Err(format!(
                "Error: marks for {} are not a whole number: {:?}",
                row.subject,
                row.marks.raw()
            )),
        })
        .collect()
}

fn extractor_for(
    state: &AppState,
    name: Option<&str>,
) -> Result<Arc<MarksheetExtractor>, (StatusCode, String)> {
    let name = name.unwrap_or(DEFAULT_PROFILE);
    state
        .extractors
        .get(name)
        .cloned()
        .ok_or_else(|| unknown_profile(state, name))
}

fn unknown_profile(state: &AppState, name: &str) -> (StatusCode, String) {
    (
        StatusCode::BAD_REQUEST,
        format!("Unknown config: {}. Available: {:?}", name, state.configs.list()),
    )
}

/// Extension for the stored copy; only alphanumeric extensions are kept.
fn file_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_lowercase())
        .unwrap_or_else(|| "img".to_string())
}
