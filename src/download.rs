use std::path::Path;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use percent_encoding::{percent_encode, NON_ALPHANUMERIC};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::error::AppError;
use crate::storage;

// 1 MiB reader buffer for large transfers.
const CHUNK_SIZE: usize = 1024 * 1024;

/// Stream a stored file as an attachment under its original name.
///
/// A missing file answers 200 with a plain `File not found.` body, not a
/// 404; existing clients key off the body text.
pub async fn serve_file(dir: &Path, unique_name: &str) -> Result<Response, AppError> {
    let path = storage::file_path(dir, unique_name);
    let metadata = match tokio::fs::metadata(&path).await {
        Ok(metadata) => metadata,
        Err(_) => return Ok((StatusCode::OK, "File not found.").into_response()),
    };

    let file = File::open(&path).await?;
    let stream = ReaderStream::with_capacity(file, CHUNK_SIZE);

    let display = storage::display_name(unique_name);
    let encoded = percent_encode(display.as_bytes(), NON_ALPHANUMERIC);
    let content_disposition = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        display.replace('"', "\\\""),
        encoded
    );

    tracing::debug!(file = %unique_name, bytes = metadata.len(), "download");

    Ok(Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_DISPOSITION, content_disposition)
        .header(header::CONTENT_LENGTH, metadata.len())
        .header(header::EXPIRES, "0")
        .header(header::CACHE_CONTROL, "must-revalidate")
        .header(header::PRAGMA, "public")
        .body(Body::from_stream(stream))?)
}
