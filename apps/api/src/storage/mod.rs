//! Attachment Store: uploads resume files to object storage and hands back a
//! durable URL plus the extracted text. Failure here is fatal only to the
//! resume-enrichment stage of the pipeline, never to the whole request.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to download attachment from {url}: {message}")]
    Download { url: String, message: String },

    #[error("Failed to upload attachment {filename}: {message}")]
    Upload { filename: String, message: String },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to extract text from {filename}: {message}")]
    Extraction { filename: String, message: String },
}

/// A resume persisted to object storage.
#[derive(Debug, Clone)]
pub struct StoredAttachment {
    /// Durable URL recorded on the attachment row, set exactly once.
    pub storage_path: String,
    /// Plain text extracted from the file, fed to the resume formatter.
    pub text: String,
}

/// Seam for object storage so pipeline tests can substitute a fake.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Downloads the file from its ATS source URL, uploads it to durable
    /// storage, and extracts its text.
    async fn store_resume(
        &self,
        filename: &str,
        source_url: &str,
    ) -> Result<StoredAttachment, StorageError>;
}

pub struct S3AttachmentStore {
    s3: S3Client,
    http: reqwest::Client,
    bucket: String,
    endpoint: String,
}

impl S3AttachmentStore {
    pub fn new(s3: S3Client, bucket: String, endpoint: String) -> Self {
        Self {
            s3,
            http: reqwest::Client::new(),
            bucket,
            endpoint,
        }
    }
}

#[async_trait]
impl AttachmentStore for S3AttachmentStore {
    async fn store_resume(
        &self,
        filename: &str,
        source_url: &str,
    ) -> Result<StoredAttachment, StorageError> {
        let response = self
            .http
            .get(source_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| StorageError::Download {
                url: source_url.to_string(),
                message: e.to_string(),
            })?;

        let data = response.bytes().await.map_err(|e| StorageError::Download {
            url: source_url.to_string(),
            message: e.to_string(),
        })?;

        let key = format!("resumes/{filename}");
        self.s3
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data.clone()))
            .send()
            .await
            .map_err(|e| StorageError::Upload {
                filename: filename.to_string(),
                message: e.to_string(),
            })?;

        let storage_path = format!("{}/{}/{}", self.endpoint, self.bucket, key);
        info!("Uploaded attachment {filename} to {storage_path}");

        let text = extract_text(filename, &data)?;
        Ok(StoredAttachment { storage_path, text })
    }
}

/// Extracts plain text from an attachment by file extension.
pub fn extract_text(filename: &str, data: &Bytes) -> Result<String, StorageError> {
    match file_extension(filename).as_deref() {
        Some("pdf") => pdf_extract::extract_text_from_mem(data)
            .map(|t| t.trim().to_string())
            .map_err(|e| StorageError::Extraction {
                filename: filename.to_string(),
                message: e.to_string(),
            }),
        Some("txt") | Some("text") => Ok(String::from_utf8_lossy(data).trim().to_string()),
        other => Err(StorageError::UnsupportedFormat(
            other.unwrap_or("<none>").to_string(),
        )),
    }
}

fn file_extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_plain() {
        let data = Bytes::from_static(b"  John Doe\nSoftware Engineer  ");
        let text = extract_text("resume.TXT", &data).unwrap();
        assert_eq!(text, "John Doe\nSoftware Engineer");
    }

    #[test]
    fn test_extract_text_unsupported_extension() {
        let data = Bytes::from_static(b"binary");
        let err = extract_text("resume.docx", &data).unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedFormat(ext) if ext == "docx"));
    }

    #[test]
    fn test_extract_text_no_extension() {
        let data = Bytes::from_static(b"binary");
        assert!(extract_text("resume", &data).is_err());
    }

    #[test]
    fn test_file_extension_case_insensitive() {
        assert_eq!(file_extension("r.PDF").as_deref(), Some("pdf"));
        assert_eq!(file_extension("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(file_extension("noext"), None);
    }
}
