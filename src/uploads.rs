//! Image upload rules, multipart reading and on-disk media storage.
//!
//! `ImageRule` is shared with the API client so that a file the server would
//! reject is caught before it is sent.

use axum::{extract::Multipart, http::StatusCode, Json};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::telemetry::record_upload;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpeg", "jpg", "webp"];
const IMAGE_CONTENT_TYPES: &[&str] = &["image/png", "image/jpeg", "image/jpg", "image/webp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRule {
    pub max_bytes: usize,
    pub allowed_extensions: &'static [&'static str],
    pub allowed_content_types: &'static [&'static str],
}

impl ImageRule {
    pub const BANNER: ImageRule = ImageRule::images(2 * 1024 * 1024);
    pub const COVER: ImageRule = ImageRule::images(800 * 1024);
    pub const PROFILE: ImageRule = ImageRule::images(2 * 1024 * 1024);
    pub const GALLERY: ImageRule = ImageRule::images(5 * 1024 * 1024);

    const fn images(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            allowed_extensions: IMAGE_EXTENSIONS,
            allowed_content_types: IMAGE_CONTENT_TYPES,
        }
    }

    /// Validates size first, then the filename extension and declared content type.
    /// Returns the lowercase extension to store the file under.
    pub fn check(
        &self,
        filename: &str,
        content_type: &str,
        size: usize,
    ) -> Result<String, UploadRejection> {
        if size > self.max_bytes {
            return Err(UploadRejection::TooLarge {
                size,
                max_bytes: self.max_bytes,
            });
        }

        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        if !self.allowed_extensions.contains(&extension.as_str()) {
            return Err(UploadRejection::UnsupportedType {
                found: if extension.is_empty() {
                    filename.to_string()
                } else {
                    format!(".{}", extension)
                },
            });
        }

        let mime = content_type
            .split(';')
            .next()
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_default();

        if !self.allowed_content_types.contains(&mime.as_str()) {
            return Err(UploadRejection::UnsupportedType { found: mime });
        }

        Ok(extension)
    }

    pub fn max_label(&self) -> String {
        if self.max_bytes >= 1024 * 1024 && self.max_bytes % (1024 * 1024) == 0 {
            format!("{}MB", self.max_bytes / (1024 * 1024))
        } else {
            format!("{}KB", self.max_bytes / 1024)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadRejection {
    TooLarge { size: usize, max_bytes: usize },
    UnsupportedType { found: String },
}

impl UploadRejection {
    pub fn code(&self) -> &'static str {
        match self {
            UploadRejection::TooLarge { .. } => "FILE_TOO_LARGE",
            UploadRejection::UnsupportedType { .. } => "UNSUPPORTED_FILE_TYPE",
        }
    }

    pub fn into_api_error(self) -> (StatusCode, Json<ApiError>) {
        let code = self.code();
        match self {
            UploadRejection::TooLarge { .. } => ApiError::payload_too_large(self.to_string(), code),
            UploadRejection::UnsupportedType { .. } => ApiError::bad_request(self.to_string(), code),
        }
    }
}

impl std::fmt::Display for UploadRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadRejection::TooLarge { size, max_bytes } => write!(
                f,
                "File is {} bytes; the limit is {} bytes",
                size, max_bytes
            ),
            UploadRejection::UnsupportedType { found } => write!(
                f,
                "Unsupported file type {}; allowed: {}",
                found,
                IMAGE_EXTENSIONS.join(", ")
            ),
        }
    }
}

impl std::error::Error for UploadRejection {}

/// Media categories and the directory each is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    EventBanner,
    ProjectCover,
    ProfileImage,
    GalleryImage,
}

impl MediaKind {
    pub fn dir(&self) -> &'static str {
        match self {
            MediaKind::EventBanner => "event_banners",
            MediaKind::ProjectCover => "project_covers",
            MediaKind::ProfileImage => "profile_images",
            MediaKind::GalleryImage => "gallery",
        }
    }

    pub fn rule(&self) -> ImageRule {
        match self {
            MediaKind::EventBanner => ImageRule::BANNER,
            MediaKind::ProjectCover => ImageRule::COVER,
            MediaKind::ProfileImage => ImageRule::PROFILE,
            MediaKind::GalleryImage => ImageRule::GALLERY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A fully buffered multipart body: file parts plus plain text fields.
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub files: Vec<UploadedFile>,
    pub fields: HashMap<String, String>,
}

impl MultipartForm {
    pub async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(|e| {
            ApiError::bad_request(format!("Failed to read multipart: {}", e), "INVALID_MULTIPART")
        })? {
            let name = field.name().unwrap_or_default().to_string();

            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let content_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let bytes = field.bytes().await.map_err(|e| {
                        ApiError::bad_request(
                            format!("Failed to read file data: {}", e),
                            "INVALID_MULTIPART",
                        )
                    })?;
                    form.files.push(UploadedFile {
                        field: name,
                        filename,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
                None => {
                    let text = field.text().await.map_err(|e| {
                        ApiError::bad_request(
                            format!("Failed to read field: {}", e),
                            "INVALID_MULTIPART",
                        )
                    })?;
                    form.fields.insert(name, text);
                }
            }
        }

        Ok(form)
    }

    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field == field)
    }

    pub fn files_named<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a UploadedFile> {
        self.files.iter().filter(move |f| f.field == field)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    pub fn require_file(&self, field: &str) -> ApiResult<&UploadedFile> {
        self.file(field).ok_or_else(|| {
            ApiError::bad_request(format!("No file provided in '{}'", field), "NO_FILE")
        })
    }
}

/// Writes validated uploads below the media root.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Checks `file` against the kind's rule and stores it, returning `<dir>/<uuid>.<ext>`.
    pub async fn save(&self, kind: MediaKind, file: &UploadedFile) -> ApiResult<String> {
        let extension = match kind
            .rule()
            .check(&file.filename, &file.content_type, file.bytes.len())
        {
            Ok(ext) => ext,
            Err(rejection) => {
                record_upload(kind.dir(), false);
                warn!(kind = kind.dir(), filename = %file.filename, reason = %rejection, "Upload rejected");
                return Err(rejection.into_api_error());
            }
        };

        let relative = format!("{}/{}.{}", kind.dir(), Uuid::new_v4(), extension);
        let dir = self.root.join(kind.dir());

        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            error!(error = %e, dir = %dir.display(), "Failed to create media directory");
            ApiError::internal("Failed to store file", "STORAGE_ERROR")
        })?;

        tokio::fs::write(self.root.join(&relative), &file.bytes)
            .await
            .map_err(|e| {
                error!(error = %e, path = %relative, "Failed to write upload");
                ApiError::internal("Failed to store file", "STORAGE_ERROR")
            })?;

        record_upload(kind.dir(), true);
        debug!(path = %relative, size = file.bytes.len(), "Upload stored");
        Ok(relative)
    }

    /// Best-effort removal of a previously stored file.
    pub async fn remove(&self, relative: &str) {
        if relative.is_empty() || relative.contains("..") {
            return;
        }
        if let Err(e) = tokio::fs::remove_file(self.root.join(relative)).await {
            debug!(error = %e, path = %relative, "Stored file not removed");
        }
    }
}
