//! One-shot batch path: upload a video, get back a downloadable annotated
//! result.
//!
//! Unlike the streaming session the batch path holds no state: one multipart
//! POST, one response. Failures surface per submission; there is nothing to
//! clean up.

use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::info;
use url::Url;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("failed to read video file: {0}")]
    Io(#[from] std::io::Error),

    #[error("upload request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("service rejected upload ({status}): {message}")]
    Rejected { status: StatusCode, message: String },

    #[error("service returned an unexpected response: {0}")]
    InvalidResponse(#[from] serde_json::Error),

    #[error("service response carried no download_url")]
    MissingDownloadUrl,

    #[error("invalid service url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct BatchClient {
    http: reqwest::Client,
    origin: Url,
}

impl BatchClient {
    pub fn new(origin: Url) -> Self {
        BatchClient {
            http: reqwest::Client::new(),
            origin,
        }
    }

    /// Upload a video file and return the absolute URL of the annotated
    /// result.
    pub async fn submit_file(&self, path: &Path) -> Result<Url, UploadError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.mp4".to_string());
        self.submit(file_name, bytes).await
    }

    /// Upload raw video bytes under the given filename. The service
    /// validates the extension server-side, so the name is preserved.
    pub async fn submit(&self, file_name: String, bytes: Vec<u8>) -> Result<Url, UploadError> {
        let endpoint = self.origin.join("/upload")?;
        info!(endpoint = %endpoint, bytes = bytes.len(), file = %file_name, "uploading video");

        let form = Form::new().part("video", Part::bytes(bytes).file_name(file_name));
        let response = self.http.post(endpoint).multipart(form).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<UploadResponse>(&text)
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| text.trim().to_string());
            return Err(UploadError::Rejected { status, message });
        }

        let body: UploadResponse = serde_json::from_str(&text)?;

        // The service returns a path like /download/output_<name>; resolve
        // it against the origin for the caller.
        let relative = body.download_url.ok_or(UploadError::MissingDownloadUrl)?;
        let resolved = self.origin.join(&relative)?;
        info!(download_url = %resolved, "upload processed");
        Ok(resolved)
    }

    /// Fetch the annotated artifact to a local file.
    pub async fn download(&self, url: &Url, dest: &Path) -> Result<(), UploadError> {
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Rejected {
                status,
                message: format!("download of {url} failed"),
            });
        }
        let bytes = response.bytes().await?;
        tokio::fs::write(dest, &bytes).await?;
        info!(dest = %dest.display(), bytes = bytes.len(), "annotated video saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_url_resolution() {
        let origin = Url::parse("http://127.0.0.1:5000").unwrap();
        let resolved = origin.join("/download/output_drive.mp4").unwrap();
        assert_eq!(
            resolved.as_str(),
            "http://127.0.0.1:5000/download/output_drive.mp4"
        );
    }
}
