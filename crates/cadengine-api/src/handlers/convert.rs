//! Conversion handlers.
//!
//! Both endpoints take a multipart body with a `file` field and stream that
//! field straight into the conversion pipeline.

use axum::Json;
use axum::body::Body;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::{StatusCode, header};
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use cadengine_converter::{ConvertedArtifact, PipelineError, ValidationError};
use cadengine_core::error::AppError;

use crate::body::scoped_file_body;
use crate::dto::response::{Base64ConversionResponse, MeshQuality};
use crate::error::ApiError;
use crate::state::AppState;

/// Multipart field carrying the CAD file.
const FILE_FIELD: &str = "file";

/// POST /convert/step-to-stl
pub async fn convert_to_stl(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let artifact = convert_upload(&state, multipart).await?;

    let file = artifact.open_output().await?;
    let builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, artifact.output_size)
        .header(
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"{}\"",
                header_safe(&artifact.stl_filename)
            ),
        )
        .header("X-Original-Filename", header_safe(&artifact.original_filename))
        .header("X-Conversion-Engine", header_safe(&artifact.engine))
        .header("X-File-Size", artifact.output_size)
        .header("X-Mesh-Quality", artifact.mesh.quality_header());

    builder
        .body(scoped_file_body(file, artifact.into_scope()))
        .map_err(|e| AppError::internal(format!("Response build failed: {e}")).into())
}

/// POST /convert/step-to-stl-base64
pub async fn convert_to_base64(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Base64ConversionResponse>, ApiError> {
    let artifact = convert_upload(&state, multipart).await?;

    let stl = artifact.read_output().await;
    let original_filename = artifact.original_filename.clone();
    let stl_filename = artifact.stl_filename.clone();
    let mesh = artifact.mesh;
    artifact.release().await;
    let stl = stl?;

    Ok(Json(Base64ConversionResponse {
        success: true,
        original_filename,
        stl_filename,
        stl_size: stl.len() as u64,
        stl_base64: STANDARD.encode(&stl),
        mesh_quality: MeshQuality {
            linear_deflection: mesh.linear_deflection,
            angular_deflection: mesh.angular_deflection,
        },
    }))
}

/// Find the `file` field and run it through the pipeline.
async fn convert_upload(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ConvertedArtifact, ApiError> {
    let mut multipart = multipart.map_err(|e| malformed(e.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| malformed(e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        tracing::debug!(filename = %filename, "Received conversion upload");
        return Ok(state.pipeline.run(&filename, field).await?);
    }

    Err(PipelineError::from(ValidationError::MissingFile).into())
}

fn malformed(reason: String) -> ApiError {
    PipelineError::from(ValidationError::MalformedUpload { reason }).into()
}

/// Replace characters that cannot appear in a header value or a quoted
/// filename.
fn header_safe(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
