//! Route handlers.
//!
//! Handlers only translate between HTTP and the library: parse the request,
//! build [`ConversionParams`] with the boundary defaults, run the conversion
//! on its own task, and map the outcome to JSON.

use std::collections::HashMap;
use std::path::PathBuf;

use axum::body::Body;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use super::error::ApiError;
use super::files::{allowed_file, is_plain_file_name, sanitize_filename, short_id, stem};
use super::AppState;
use crate::config::ConversionParams;
use crate::error::Md2PdfError;
use crate::output::ConversionOutcome;
use crate::presets::PresetTable;

// ── Response bodies ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ConversionResponse {
    pub success: bool,
    pub message: String,
    pub download_url: String,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub active_jobs: usize,
}

// ── Request bodies ───────────────────────────────────────────────────────

/// JSON body of `POST /convert-text`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TextRequest {
    pub text: Option<String>,
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub options: ParamFields,
}

/// Conversion options in the web client's field vocabulary.
///
/// Booleans accept JSON booleans or the strings `"true"`/`"false"`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ParamFields {
    pub pdf_engine: Option<String>,
    pub document_class: Option<String>,
    pub geometry: Option<String>,
    pub fontsize: Option<String>,
    pub mainfont: Option<String>,
    pub linestretch: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    pub colorlinks: Option<bool>,
    #[serde(deserialize_with = "lenient_bool")]
    pub number_sections: Option<bool>,
    #[serde(deserialize_with = "lenient_bool")]
    pub toc: Option<bool>,
    pub language: Option<String>,
    pub cjk_mainfont: Option<String>,
    pub cjk_sansfont: Option<String>,
    pub cjk_monofont: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    pub east_asian_line_breaks: Option<bool>,
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Bool(b) => Some(b),
        serde_json::Value::String(s) => Some(s == "true"),
        serde_json::Value::Number(n) => Some(n.as_i64().is_some_and(|n| n != 0)),
        _ => None,
    })
}

impl ParamFields {
    /// Read options from multipart text fields. Booleans are true only for
    /// the literal string `"true"`.
    pub fn from_form(form: &HashMap<String, String>) -> Self {
        let text = |name: &str| form.get(name).cloned();
        let flag = |name: &str| form.get(name).map(|v| v == "true");
        Self {
            pdf_engine: text("pdf_engine"),
            document_class: text("document_class"),
            geometry: text("geometry"),
            fontsize: text("fontsize"),
            mainfont: text("mainfont"),
            linestretch: text("linestretch"),
            colorlinks: flag("colorlinks"),
            number_sections: flag("number_sections"),
            toc: flag("toc"),
            language: text("language"),
            cjk_mainfont: text("cjk_mainfont"),
            cjk_sansfont: text("cjk_sansfont"),
            cjk_monofont: text("cjk_monofont"),
            east_asian_line_breaks: flag("east_asian_line_breaks"),
        }
    }

    /// Build parameters; absent toggles take the boundary defaults
    /// (color links on, numbering and TOC off, east-Asian line breaks as
    /// given by `east_asian_default`).
    pub fn into_params(self, east_asian_default: bool) -> Result<ConversionParams, Md2PdfError> {
        ConversionParams::builder()
            .engine(self.pdf_engine.unwrap_or_default())
            .document_class(self.document_class.unwrap_or_default())
            .geometry(self.geometry.unwrap_or_default())
            .font_size(self.fontsize.unwrap_or_default())
            .main_font(self.mainfont.unwrap_or_default())
            .line_stretch(self.linestretch.unwrap_or_default())
            .color_links(self.colorlinks.unwrap_or(true))
            .number_sections(self.number_sections.unwrap_or(false))
            .toc(self.toc.unwrap_or(false))
            .language(self.language.unwrap_or_default())
            .cjk_main_font(self.cjk_mainfont.unwrap_or_default())
            .cjk_sans_font(self.cjk_sansfont.unwrap_or_default())
            .cjk_mono_font(self.cjk_monofont.unwrap_or_default())
            .east_asian_line_breaks(self.east_asian_line_breaks.unwrap_or(east_asian_default))
            .build()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CancelRequest {
    pub request_id: Option<String>,
}

// ── Handlers ─────────────────────────────────────────────────────────────

/// `POST /upload`: convert an uploaded Markdown file.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ConversionResponse>, ApiError> {
    let mut file: Option<(String, axum::body::Bytes)> = None;
    let mut form = HashMap::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let filename = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await.map_err(multipart_error)?;
            debug!("Received upload '{}' ({} bytes)", filename, data.len());
            file = Some((filename, data));
        } else {
            let value = field.text().await.map_err(multipart_error)?;
            form.insert(name, value);
        }
    }

    let (filename, data) = file.ok_or(Md2PdfError::MissingField {
        field: "file",
        message: "No file part",
    })?;
    if filename.is_empty() {
        return Err(Md2PdfError::MissingField {
            field: "file",
            message: "No selected file",
        }
        .into());
    }
    if !allowed_file(&filename) {
        return Err(Md2PdfError::UnsupportedFileType { filename }.into());
    }

    let params = ParamFields::from_form(&form).into_params(false)?;
    let request_id = form.get("request_id").cloned();

    let safe_name = sanitize_filename(&filename);
    if safe_name.is_empty() {
        return Err(Md2PdfError::InvalidFilename(filename).into());
    }

    let settings = &state.settings;
    settings.ensure_directories().await?;
    let unique_id = short_id();
    let input_path = settings.upload_dir.join(format!("{unique_id}_{safe_name}"));
    let output_filename = format!("{unique_id}_{}.pdf", stem(&safe_name));
    let output_path = settings.output_dir.join(&output_filename);

    tokio::fs::write(&input_path, &data)
        .await
        .map_err(|source| Md2PdfError::UploadWriteFailed {
            path: input_path.clone(),
            source,
        })?;

    let converter = state.converter.clone();
    let task_output = output_path.clone();
    let outcome = run_job(async move {
        let outcome = converter
            .invoke(&input_path, &task_output, &params, request_id.as_deref())
            .await;
        remove_upload(&input_path).await;
        outcome
    })
    .await?;

    respond(outcome, output_filename)
}

/// `POST /convert-text`: convert Markdown text from a JSON body.
pub async fn convert_text(
    State(state): State<AppState>,
    body: Result<Json<TextRequest>, JsonRejection>,
) -> Result<Json<ConversionResponse>, ApiError> {
    const NO_TEXT: &str = "No text provided";
    let Json(request) = body.map_err(|r| ApiError::from_rejection(r.status(), NO_TEXT))?;
    let text = request.text.ok_or(Md2PdfError::MissingField {
        field: "text",
        message: NO_TEXT,
    })?;
    let params = request.options.into_params(true)?;

    let settings = &state.settings;
    settings.ensure_directories().await?;
    let output_filename = format!("{}_converted.pdf", short_id());
    let output_path = settings.output_dir.join(&output_filename);

    let converter = state.converter.clone();
    let request_id = request.request_id;
    let outcome = run_job(async move {
        converter
            .invoke_from_text(&text, &output_path, request_id.as_deref(), &params)
            .await
    })
    .await?;

    respond(outcome, output_filename)
}

/// `POST /cancel`: terminate a running conversion by request id.
pub async fn cancel(
    State(state): State<AppState>,
    body: Result<Json<CancelRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    const NO_ID: &str = "No request_id provided";
    let Json(request) = body.map_err(|r| ApiError::from_rejection(r.status(), NO_ID))?;
    let request_id = request
        .request_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(Md2PdfError::MissingField {
            field: "request_id",
            message: NO_ID,
        })?;

    if state.converter.cancel(&request_id).await {
        info!("Cancelled conversion {} on request", request_id);
        Ok(Json(CancelResponse {
            success: true,
            message: format!("Conversion {request_id} cancelled"),
        })
        .into_response())
    } else {
        Ok((
            StatusCode::NOT_FOUND,
            Json(CancelResponse {
                success: false,
                message: format!("No running conversion found for {request_id}"),
            }),
        )
            .into_response())
    }
}

/// `GET /download/{filename}`: serve a generated PDF as an attachment.
pub async fn download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    if !is_plain_file_name(&filename) {
        return Err(Md2PdfError::InvalidFilename(filename).into());
    }
    let path: PathBuf = state.settings.output_dir.join(&filename);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound("File not found".into()));
        }
        Err(e) => return Err(ApiError::Internal(format!("reading {}: {e}", path.display()))),
    };

    let disposition = format!("attachment; filename=\"{filename}\"");
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from(bytes),
    )
        .into_response())
}

/// `GET /api/config-presets`
pub async fn config_presets() -> Json<PresetTable> {
    Json(PresetTable)
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        active_jobs: state.converter.registry().len(),
    })
}

/// Fallback for unknown routes.
pub async fn not_found() -> ApiError {
    ApiError::NotFound("Not found".into())
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// Run a conversion on its own task so a client disconnect cannot abort it
/// halfway through cleanup.
async fn run_job<F>(job: F) -> Result<ConversionOutcome, ApiError>
where
    F: std::future::Future<Output = ConversionOutcome> + Send + 'static,
{
    tokio::spawn(job)
        .await
        .map_err(|e| ApiError::Internal(format!("conversion task failed: {e}")))
}

fn respond(outcome: ConversionOutcome, output_filename: String) -> Result<Json<ConversionResponse>, ApiError> {
    if !outcome.success {
        return Err(ApiError::Conversion(outcome.message));
    }
    Ok(Json(ConversionResponse {
        success: true,
        message: outcome.message,
        download_url: format!("/download/{output_filename}"),
    }))
}

async fn remove_upload(path: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("Failed to remove upload {}: {}", path.display(), e);
    }
}

fn multipart_error(err: MultipartError) -> ApiError {
    ApiError::from_rejection(err.status(), &format!("Failed to read upload: {err}"))
}
