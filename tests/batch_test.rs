//! Batch upload path against an in-process mock of the detection service.
//!
//! The mock mirrors the real `/upload` contract: multipart field `video`,
//! extension check, `{"download_url": ...}` on success and `{"error": ...}`
//! with a 400 otherwise.

use assert_matches::assert_matches;
use axum::extract::{Multipart, Path};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use url::Url;

use lanewatch::batch::{BatchClient, UploadError};

const ANNOTATED_BYTES: &[u8] = b"annotated-video-bytes";

async fn upload_handler(mut multipart: Multipart) -> (StatusCode, Json<serde_json::Value>) {
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("video") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let data = match field.bytes().await {
            Ok(data) => data,
            Err(_) => break,
        };
        if data.is_empty() || !file_name.ends_with(".mp4") {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Invalid file format. Upload a valid video file."})),
            );
        }
        return (
            StatusCode::OK,
            Json(json!({
                "message": "Processing complete!",
                "download_url": format!("/download/output_{file_name}"),
            })),
        );
    }
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": "No video file provided"})),
    )
}

async fn download_handler(Path(_name): Path<String>) -> Vec<u8> {
    ANNOTATED_BYTES.to_vec()
}

async fn spawn_mock_service() -> Url {
    let app = Router::new()
        .route("/upload", post(upload_handler))
        .route("/download/:name", get(download_handler));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Url::parse(&format!("http://{addr}/")).unwrap()
}

#[tokio::test]
async fn test_submit_returns_resolved_download_url() {
    let origin = spawn_mock_service().await;
    let client = BatchClient::new(origin.clone());

    let url = client
        .submit("drive.mp4".to_string(), b"fake mp4 bytes".to_vec())
        .await
        .unwrap();

    // relative download_url resolved against the service origin
    assert_eq!(url.host_str(), origin.host_str());
    assert!(url.path().ends_with("/download/output_drive.mp4"));
}

#[tokio::test]
async fn test_empty_upload_surfaces_upload_error() {
    let origin = spawn_mock_service().await;
    let client = BatchClient::new(origin);

    let result = client.submit("drive.mp4".to_string(), Vec::new()).await;
    assert_matches!(
        result,
        Err(UploadError::Rejected { status, .. }) if status.as_u16() == 400
    );
}

#[tokio::test]
async fn test_unsupported_extension_is_rejected() {
    let origin = spawn_mock_service().await;
    let client = BatchClient::new(origin);

    let result = client
        .submit("notes.txt".to_string(), b"some bytes".to_vec())
        .await;
    assert_matches!(result, Err(UploadError::Rejected { .. }));
}

#[tokio::test]
async fn test_download_saves_artifact() {
    let origin = spawn_mock_service().await;
    let client = BatchClient::new(origin);

    let url = client
        .submit("drive.mp4".to_string(), b"fake mp4 bytes".to_vec())
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("annotated.mp4");
    client.download(&url, &dest).await.unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), ANNOTATED_BYTES);
}
