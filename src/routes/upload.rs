use std::str::FromStr;

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

/// Upload directories, one per kind of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Posts,
    Comments,
    Avatars,
    Groups,
}

impl UploadKind {
    pub fn dir(&self) -> &'static str {
        match self {
            UploadKind::Posts => "posts",
            UploadKind::Comments => "comments",
            UploadKind::Avatars => "avatars",
            UploadKind::Groups => "groups",
        }
    }
}

impl FromStr for UploadKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "posts" => Ok(UploadKind::Posts),
            "comments" => Ok(UploadKind::Comments),
            "avatars" => Ok(UploadKind::Avatars),
            "groups" => Ok(UploadKind::Groups),
            _ => Err(AppError::BadRequest("Invalid upload type".into())),
        }
    }
}

/// The image formats we store, detected from the leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
}

impl ImageFormat {
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(ImageFormat::Gif)
        } else {
            None
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageFormat::Jpeg),
            "image/png" => Some(ImageFormat::Png),
            "image/gif" => Some(ImageFormat::Gif),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
        }
    }
}

pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    // Leave the transport limit above the per-file cap so oversize files reach
    // the streaming check and get a 400 with a readable message.
    Router::new().route(
        "/upload",
        post(upload).layer(DefaultBodyLimit::max(max_upload_bytes.saturating_mul(2))),
    )
}

fn invalid_file() -> AppError {
    AppError::BadRequest("Invalid file. Must be JPG, PNG, or GIF".into())
}

/// Whole megabytes when the cap is a multiple of 1 MiB, else kilobytes, else bytes.
fn human_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * KB;
    if bytes >= MB && bytes % MB == 0 {
        format!("{}MB", bytes / MB)
    } else if bytes >= KB && bytes % KB == 0 {
        format!("{}KB", bytes / KB)
    } else {
        format!("{bytes} bytes")
    }
}

fn too_large(max: usize) -> AppError {
    AppError::BadRequest(format!("File too large. Maximum size: {}", human_size(max)))
}

fn multipart_error(err: MultipartError, max: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large(max)
    } else {
        AppError::BadRequest(err.body_text())
    }
}

/// Declared type from the part header, falling back to the file name.
fn declared_format(field: &Field<'_>) -> Option<ImageFormat> {
    match field.content_type() {
        Some(ct) if ct != "application/octet-stream" => ImageFormat::from_mime(ct),
        _ => field
            .file_name()
            .and_then(|name| mime_guess::from_path(name).first_raw())
            .and_then(ImageFormat::from_mime),
    }
}

/// Reads the part into memory, failing as soon as it grows past `max`.
async fn read_capped(field: &mut Field<'_>, max: usize) -> AppResult<Vec<u8>> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, max))? {
        if buf.len() + chunk.len() > max {
            return Err(too_large(max));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

/// POST /api/upload: multipart `file` plus optional `type`
async fn upload(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    let max = state.config.storage.max_upload_bytes;
    let mut kind = UploadKind::Posts;
    let mut file: Option<(ImageFormat, Vec<u8>)> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "type" => {
                let value = field.text().await.map_err(|e| multipart_error(e, max))?;
                kind = value.parse()?;
            }
            "file" => {
                if declared_format(&field).is_none() {
                    return Err(invalid_file());
                }
                let bytes = read_capped(&mut field, max).await?;
                let format = ImageFormat::sniff(&bytes).ok_or_else(invalid_file)?;
                file = Some((format, bytes));
            }
            _ => {}
        }
    }

    let (format, bytes) = file.ok_or_else(|| AppError::BadRequest("No file provided".into()))?;

    let dir = state.config.uploads_path().join(kind.dir());
    tokio::fs::create_dir_all(&dir).await?;
    let file_name = format!("{}.{}", uuid::Uuid::now_v7(), format.extension());
    tokio::fs::write(dir.join(&file_name), &bytes).await?;

    tracing::info!(
        user_id = %me.id,
        kind = kind.dir(),
        size = bytes.len(),
        "Stored upload {}",
        file_name
    );

    Ok(Json(json!({
        "url": format!("/uploads/{}/{}", kind.dir(), file_name),
        "message": "File uploaded successfully",
    })))
}
