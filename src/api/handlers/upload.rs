use crate::AppState;
use crate::api::error::AppError;
use crate::models::UploadRequest;
use crate::services::reporter::{ResultReporter, UploadResponse};
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
};
use futures::TryStreamExt;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

#[utoipa::path(
    post,
    path = "/upload/{class}",
    params(
        ("class" = String, Path, description = "Content class: image or pdf")
    ),
    request_body(content = Multipart, description = "Optional `size` field followed by a `file` field"),
    responses(
        (status = 201, description = "File accepted and stored", body = UploadResponse),
        (status = 400, description = "Filename rejected", body = UploadResponse),
        (status = 404, description = "Unknown content class"),
        (status = 413, description = "File too large", body = UploadResponse),
        (status = 415, description = "Declared content type rejected", body = UploadResponse),
        (status = 422, description = "File content rejected", body = UploadResponse),
        (status = 500, description = "Storage failure")
    ),
    tag = "upload"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    Path(class_name): Path<String>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let class = state
        .registry
        .class(&class_name)
        .ok_or_else(|| AppError::NotFound(format!("Unknown content class: {}", class_name)))?;

    let mut declared_size: Option<u64> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if name == "size" {
            let text = field.text().await?;
            declared_size = Some(
                text.trim()
                    .parse()
                    .map_err(|_| AppError::BadRequest("Invalid size field".to_string()))?,
            );
        } else if name == "file" {
            let original_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().map(str::to_string);

            let mut reader = StreamReader::new(field.map_err(std::io::Error::other));
            let mut request =
                UploadRequest::new(original_name, content_type.as_deref(), &mut reader);
            if let Some(size) = declared_size {
                request = request.with_declared_size(size);
            }

            let outcome = state.pipeline.ingest(class, request).await?;

            // rejected early: the client is still sending, read it off before answering
            drain(&mut reader).await;
            drop(reader);
            while let Ok(Some(mut rest)) = multipart.next_field().await {
                while let Ok(Some(_)) = rest.chunk().await {}
            }

            let (status, body) = ResultReporter::report(&outcome);
            return Ok((status, Json(body)));
        }
    }

    Err(AppError::BadRequest("No file provided".to_string()))
}

async fn drain<R: AsyncRead + Unpin>(reader: &mut R) {
    if let Err(e) = tokio::io::copy(reader, &mut tokio::io::sink()).await {
        tracing::debug!("Stopped draining upload body: {}", e);
    }
}
