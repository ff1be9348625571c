use std::io;
use std::path::Path;

use axum::extract::multipart::{Field, Multipart};
use axum::extract::State;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;
use humansize::{format_size, BINARY};
use tokio::io::AsyncWriteExt;

use crate::error::AppError;
use crate::flash::{self, Flash};
use crate::storage;
use crate::AppState;

pub const UPLOAD_FIELD: &str = "fileToUpload";

/// `POST /`: store the uploaded file, set the outcome flash, and always
/// redirect back to `GET /` so a refresh cannot resubmit the form.
pub async fn upload(
    State(state): State<AppState>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    storage::ensure_dir(&state.config.storage_dir).await?;
    let (jar, session) = flash::session(jar);

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let raw_name = field.file_name().unwrap_or_default().to_string();
        let flash = store_field(field, &raw_name, &state).await;
        state.flashes.put(session, flash);
        break;
    }

    Ok((jar, Redirect::to("/")).into_response())
}

async fn store_field(field: Field<'_>, raw_name: &str, state: &AppState) -> Flash {
    let sanitized = storage::sanitize_name(raw_name);
    let token = storage::new_token();
    let unique_name = storage::storage_name(&token, &sanitized);
    let limit = state.config.max_upload_bytes;

    // Received bytes land in the system temp dir first; only a complete,
    // size-checked upload is moved into storage.
    let tmp_path = std::env::temp_dir().join(format!("filedrop-{token}.part"));

    match write_capped(field, &tmp_path, limit).await {
        Ok(written) => {
            let dest = storage::file_path(&state.config.storage_dir, &unique_name);
            match persist(&tmp_path, &dest).await {
                Ok(()) => {
                    tracing::info!(file = %unique_name, bytes = written, "uploaded");
                    Flash::success(format!(
                        "The file {} has been uploaded successfully.",
                        html_escape::encode_text(&sanitized)
                    ))
                }
                Err(err) => {
                    tracing::error!(error = %err, file = %unique_name, "persist failed");
                    Flash::danger("Sorry, there was an error uploading your file.")
                }
            }
        }
        Err(WriteError::TooLarge) => {
            tracing::warn!(file = %sanitized, limit, "upload over size ceiling");
            Flash::danger(format!(
                "Sorry, your file is too large. Maximum file size is {}.",
                format_size(limit, BINARY)
            ))
        }
        Err(WriteError::Io(err)) => {
            tracing::error!(error = %err, "upload write failed");
            Flash::danger("Sorry, there was an error uploading your file.")
        }
    }
}

enum WriteError {
    TooLarge,
    Io(io::Error),
}

/// Stream the field into `tmp_path`, counting bytes. Strictly more than
/// `limit` aborts; exactly `limit` is accepted. The temp file is removed on
/// any failure.
async fn write_capped(mut field: Field<'_>, tmp_path: &Path, limit: u64) -> Result<u64, WriteError> {
    let result = async {
        let mut file = tokio::fs::File::create(tmp_path).await.map_err(WriteError::Io)?;
        let mut written: u64 = 0;
        loop {
            let chunk = match field.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(err) => return Err(WriteError::Io(io::Error::other(err))),
            };
            written += chunk.len() as u64;
            if written > limit {
                return Err(WriteError::TooLarge);
            }
            file.write_all(&chunk).await.map_err(WriteError::Io)?;
        }
        file.flush().await.map_err(WriteError::Io)?;
        Ok(written)
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(tmp_path).await;
    }
    result
}

/// Move the finished temp file into storage. The temp dir may sit on
/// another filesystem, so a failed rename falls back to copy + remove; a
/// failed copy leaves no partial file behind.
async fn persist(tmp_path: &Path, dest: &Path) -> io::Result<()> {
    if tokio::fs::rename(tmp_path, dest).await.is_ok() {
        return Ok(());
    }
    match tokio::fs::copy(tmp_path, dest).await {
        Ok(_) => tokio::fs::remove_file(tmp_path).await,
        Err(err) => {
            let _ = tokio::fs::remove_file(dest).await;
            let _ = tokio::fs::remove_file(tmp_path).await;
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::flash::FlashStatus;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use std::io::Write as _;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn test_state(dir: &Path, max_upload_bytes: u64) -> AppState {
        AppState::new(Config {
            bind: "127.0.0.1:0".parse().unwrap(),
            storage_dir: dir.to_path_buf(),
            max_upload_bytes,
        })
    }

    fn upload_request(data: &[u8], filename: &str) -> Request<Body> {
        let boundary = "------------------------test_boundary";
        let mut content = Vec::new();
        write!(
            content,
            "--{boundary}\r\nContent-Disposition: form-data; name=\"fileToUpload\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .unwrap();
        content.extend_from_slice(data);
        write!(content, "\r\n--{boundary}--\r\n").unwrap();

        Request::builder()
            .uri("/")
            .method("POST")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(content))
            .unwrap()
    }

    fn session_of(response: &axum::response::Response) -> Uuid {
        let raw = response
            .headers()
            .get(header::SET_COOKIE)
            .expect("session cookie")
            .to_str()
            .unwrap();
        let value = raw
            .split(';')
            .next()
            .unwrap()
            .trim_start_matches(&format!("{}=", flash::SESSION_COOKIE));
        Uuid::parse_str(value).unwrap()
    }

    fn stored_names(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn upload_stores_file_and_redirects() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path(), 1024);
        let app = crate::app(state.clone());

        let data = b"Hello, this is a test file content!";
        let response = app
            .oneshot(upload_request(data, "test_file.txt"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/");

        let names = stored_names(tmp.path());
        assert_eq!(names.len(), 1);
        // Sanitization drops the underscore from the original name.
        assert!(names[0].ends_with("_testfile.txt"));
        let stored = std::fs::read(tmp.path().join(&names[0])).unwrap();
        assert_eq!(stored, data);

        let flash = state.flashes.take(session_of(&response)).unwrap();
        assert_eq!(flash.status, FlashStatus::Success);
        assert!(flash.message.contains("testfile.txt"));
    }

    #[tokio::test]
    async fn upload_sanitizes_the_claimed_filename() {
        let tmp = tempfile::tempdir().unwrap();
        let app = crate::app(test_state(tmp.path(), 8192));

        app.oneshot(upload_request(b"x", "report final!!.PDF"))
            .await
            .unwrap();

        let names = stored_names(tmp.path());
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with("_reportfinal.PDF"));
    }

    #[tokio::test]
    async fn upload_at_exact_ceiling_succeeds() {
        let tmp = tempfile::tempdir().unwrap();
        let data = b"12345678";
        let app = crate::app(test_state(tmp.path(), data.len() as u64));

        let response = app.oneshot(upload_request(data, "cap.bin")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(stored_names(tmp.path()).len(), 1);
    }

    #[tokio::test]
    async fn upload_over_ceiling_is_rejected_without_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let data = b"123456789";
        let state = test_state(tmp.path(), data.len() as u64 - 1);
        let app = crate::app(state.clone());

        let response = app.oneshot(upload_request(data, "big.bin")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(stored_names(tmp.path()).is_empty());

        let flash = state.flashes.take(session_of(&response)).unwrap();
        assert_eq!(flash.status, FlashStatus::Danger);
        assert!(flash.message.contains("too large"));
    }

    #[tokio::test]
    async fn same_name_twice_yields_two_independent_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path(), 1024);

        for _ in 0..2 {
            crate::app(state.clone())
                .oneshot(upload_request(b"ab", "dup.txt"))
                .await
                .unwrap();
        }

        let names = stored_names(tmp.path());
        assert_eq!(names.len(), 2);
        assert_ne!(names[0], names[1]);
        for name in &names {
            assert!(name.ends_with("_dup.txt"));
        }
    }

    #[tokio::test]
    async fn uploaded_bytes_download_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path(), 1024);
        let data = b"round trip payload \x00\x01\x02";

        crate::app(state.clone())
            .oneshot(upload_request(data, "trip.bin"))
            .await
            .unwrap();
        let unique_name = stored_names(tmp.path()).remove(0);

        let response = crate::app(state)
            .oneshot(
                Request::builder()
                    .uri(format!("/?download={unique_name}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains("filename=\"trip.bin\""));
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], data);
    }

    #[tokio::test]
    async fn post_without_upload_field_just_redirects() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path(), 1024);

        let boundary = "------------------------test_boundary";
        let mut content = Vec::new();
        write!(
            content,
            "--{boundary}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nvalue\r\n--{boundary}--\r\n"
        )
        .unwrap();
        let request = Request::builder()
            .uri("/")
            .method("POST")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(content))
            .unwrap();

        let response = crate::app(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(stored_names(tmp.path()).is_empty());
        assert!(state.flashes.take(session_of(&response)).is_none());
    }
}
