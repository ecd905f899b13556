//! HTTP surface: `POST /api/predict/` plus a health probe.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, info, warn};

use crate::{Config, ImageProcessor, ImageSegmentationModel, LandCoverError, Prediction};

/// Multipart field carrying the uploaded file.
pub const IMAGE_FIELD: &str = "image";

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub prediction: Prediction,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub message: &'static str,
}

/// Failure of a request, already classified by who is at fault.
#[derive(Debug)]
pub enum ApiError {
    TooLarge,
    Processing(LandCoverError),
}

impl From<LandCoverError> for ApiError {
    fn from(err: LandCoverError) -> Self {
        Self::Processing(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::TooLarge => {
                warn!("Rejected upload over the size limit");
                (StatusCode::PAYLOAD_TOO_LARGE, "Upload too large")
            }
            Self::Processing(err) if err.is_client_error() => {
                warn!("Rejected request: {}", err);
                (StatusCode::BAD_REQUEST, "Invalid request")
            }
            Self::Processing(err) => {
                match std::error::Error::source(&err) {
                    Some(source) => error!("Prediction failed: {}: {}", err, source),
                    None => error!("Prediction failed: {}", err),
                }
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };
        let body = ErrorResponse {
            status: "error",
            message,
        };
        (status, Json(body)).into_response()
    }
}

pub fn router<M>(processor: Arc<ImageProcessor<M>>, max_upload_bytes: usize) -> Router
where
    M: ImageSegmentationModel + 'static,
{
    Router::new()
        .route("/api/predict/", post(predict_handler::<M>))
        .route("/api/predict", post(predict_handler::<M>))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(processor)
}

/// Binds the configured address and serves until Ctrl-C.
pub async fn serve<M>(config: &Config, processor: ImageProcessor<M>) -> std::io::Result<()>
where
    M: ImageSegmentationModel + 'static,
{
    let app = router(Arc::new(processor), config.max_upload_bytes);
    let listener = TcpListener::bind(config.bind_addr()).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down"),
        Err(e) => {
            warn!("Cannot listen for Ctrl-C, running until killed: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// POST /api/predict/ - segment an uploaded image
///
/// Expects `multipart/form-data` with the file in the `image` field.
///
/// # Errors
/// - 400: no `image` field, malformed form, empty or undecodable file
/// - 413: upload above `--max-upload-bytes`
/// - 500: preprocessing, inference or encoding failed
async fn predict_handler<M>(
    State(processor): State<Arc<ImageProcessor<M>>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResponse>, ApiError>
where
    M: ImageSegmentationModel + 'static,
{
    info!("Received image for prediction");
    let multipart = multipart.map_err(|e| {
        LandCoverError::invalid_upload(format!("expected a multipart form: {e}"))
    })?;
    let bytes = read_image_field(multipart).await?;
    debug!("Read {} bytes from `{}` field", bytes.len(), IMAGE_FIELD);

    let prediction = tokio::task::spawn_blocking(move || processor.process_upload(&bytes))
        .await
        .map_err(|e| LandCoverError::model("prediction task", e))??;

    Ok(Json(PredictionResponse {
        status: "success",
        prediction,
    }))
}

async fn read_image_field(mut multipart: Multipart) -> Result<Bytes, ApiError> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => {
                return Err(LandCoverError::invalid_upload(format!(
                    "form has no `{IMAGE_FIELD}` field"
                ))
                .into())
            }
            Err(e) => return Err(multipart_error(e)),
        };

        if field.name() == Some(IMAGE_FIELD) {
            return field.bytes().await.map_err(multipart_error);
        }
    }
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::TooLarge
    } else {
        LandCoverError::invalid_upload(format!("malformed multipart body: {err}")).into()
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
