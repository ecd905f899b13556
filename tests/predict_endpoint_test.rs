use std::collections::BTreeSet;
use std::io::Cursor;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use landcover_seg_rs::{
    mocks::MockSegmentationModel, server, ClassTable, DebugDump, ImageProcessor,
};

const BOUNDARY: &str = "landcover-test-boundary";

fn app_with(model: MockSegmentationModel, max_upload_bytes: usize) -> Router {
    let processor = ImageProcessor::new(model, ClassTable::landcover());
    server::router(Arc::new(processor), max_upload_bytes)
}

fn app() -> Router {
    app_with(MockSegmentationModel::new(512), 10 * 1024 * 1024)
}

fn multipart_body(field: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"{field}\"; filename=\"upload.png\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn predict_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/predict/")
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

/// Horizontal bands whose red values fall into classes 0, 1, 2 and 4.
fn banded_image() -> Vec<u8> {
    let image = RgbImage::from_fn(300, 200, |_, y| match y / 50 {
        0 => Rgb([10, 200, 30]),
        1 => Rgb([60, 10, 90]),
        2 => Rgb([120, 50, 50]),
        _ => Rgb([250, 250, 250]),
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn decode_png(value: &Value) -> RgbImage {
    let encoded = value.as_str().expect("base64 string");
    let bytes = STANDARD.decode(encoded).unwrap();
    assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
    image::load_from_memory(&bytes).unwrap().into_rgb8()
}

fn class_of_color(table: &ClassTable, color: &Rgb<u8>) -> Option<u32> {
    (0..table.len() as u32).find(|&index| table.color(index).as_ref() == Some(color))
}

#[tokio::test]
async fn test_valid_image_returns_prediction() {
    let (status, body) = send(app(), predict_request(multipart_body("image", &banded_image()))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert!(!body["classes"].as_object().unwrap().is_empty());
    assert!(!body["mask_image"].as_str().unwrap().is_empty());
    assert!(!body["input_image"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_mask_matches_resized_input_and_color_table() {
    let (status, body) = send(app(), predict_request(multipart_body("image", &banded_image()))).await;
    assert_eq!(status, StatusCode::OK);

    let table = ClassTable::landcover();
    let mask = decode_png(&body["mask_image"]);
    let input = decode_png(&body["input_image"]);
    assert_eq!(mask.dimensions(), (512, 512));
    assert_eq!(input.dimensions(), (512, 512));

    let model = MockSegmentationModel::new(512);
    let mut present = BTreeSet::new();
    for (x, y, color) in mask.enumerate_pixels() {
        let class = class_of_color(&table, color).expect("mask color must come from the table");
        assert_eq!(class, model.expected_class(input.get_pixel(x, y)[0]));
        present.insert(class);
    }

    let reported: BTreeSet<u32> = body["classes"]
        .as_object()
        .unwrap()
        .keys()
        .map(|key| key.parse().unwrap())
        .collect();
    assert_eq!(reported, present);
    for class in [0, 1, 2, 4] {
        assert!(present.contains(&class), "class {class} missing");
    }
    assert_eq!(body["classes"]["0"], "Background");
    assert_eq!(body["classes"]["4"], "Buildings");
}

#[tokio::test]
async fn test_prediction_is_deterministic() {
    let upload = banded_image();
    let (_, first) = send(app(), predict_request(multipart_body("image", &upload))).await;
    let (_, second) = send(app(), predict_request(multipart_body("image", &upload))).await;

    assert_eq!(first["mask_image"], second["mask_image"]);
    assert_eq!(first["classes"], second["classes"]);
}

#[tokio::test]
async fn test_route_without_trailing_slash() {
    let mut request = predict_request(multipart_body("image", &banded_image()));
    *request.uri_mut() = "/api/predict".parse().unwrap();
    let (status, _) = send(app(), request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_empty_payload_is_rejected() {
    let (status, body) = send(app(), predict_request(multipart_body("image", &[]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Invalid request");
}

#[tokio::test]
async fn test_non_image_is_rejected() {
    let (status, body) = send(
        app(),
        predict_request(multipart_body("image", b"this is a text file, not a picture")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_missing_image_field_is_rejected() {
    let (status, body) = send(app(), predict_request(multipart_body("file", &banded_image()))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid request");
}

#[tokio::test]
async fn test_non_multipart_request_is_rejected() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/predict/")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"image": "nope"}"#))
        .unwrap();
    let (status, body) = send(app(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let app = app_with(MockSegmentationModel::new(512), 1024);
    let (status, body) = send(app, predict_request(multipart_body("image", &[7u8; 8192]))).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_inference_failure_returns_structured_500() {
    let app = app_with(MockSegmentationModel::new(512).failing(), 10 * 1024 * 1024);
    let (status, body) = send(app, predict_request(multipart_body("image", &banded_image()))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Internal server error");
}

#[tokio::test]
async fn test_debug_images_written_per_request() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let processor = ImageProcessor::new(MockSegmentationModel::new(64), ClassTable::landcover())
        .with_debug_dump(DebugDump::new(temp_dir.path().join("debug"))?);
    let app = server::router(Arc::new(processor), 10 * 1024 * 1024);

    for _ in 0..2 {
        let (status, _) = send(
            app.clone(),
            predict_request(multipart_body("image", &banded_image())),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let mut names = std::fs::read_dir(temp_dir.path().join("debug"))?
        .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<Result<Vec<_>, _>>()?;
    names.sort();
    assert_eq!(names.len(), 4);
    assert_eq!(names.iter().filter(|n| n.ends_with("_mask.png")).count(), 2);
    assert_eq!(names.iter().filter(|n| n.ends_with("_original.png")).count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_health() {
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
