use std::sync::{Arc, OnceLock};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::{ErrorKind, ProverError};
use crate::prover::Prover;
use crate::types::{GenerateProofRequest, HealthResponse};

/// Shared application state passed to all route handlers.
///
/// The prover is set once artifacts are ready; until then proof requests
/// are refused with 503.
#[derive(Default)]
pub struct AppState {
    prover: OnceLock<Prover>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ready(prover: Prover) -> Self {
        let state = Self::new();
        state.set_prover(prover);
        state
    }

    /// Install the prover. Only the first call has an effect.
    pub fn set_prover(&self, prover: Prover) {
        if self.prover.set(prover).is_err() {
            tracing::warn!("Prover already installed, ignoring");
        }
    }

    pub fn prover(&self) -> Option<&Prover> {
        self.prover.get()
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, message).into_response()
}

fn status_for(err: &ProverError) -> StatusCode {
    match err.kind() {
        ErrorKind::Structural | ErrorKind::Range => StatusCode::BAD_REQUEST,
        ErrorKind::Backend => match err {
            ProverError::Witness(_) | ProverError::Proving(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
        ErrorKind::Io => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// POST /genProof: wrap a plonky2 proof.
///
/// Request body: `{verifier_only_circuit_data, proof_with_public_inputs}`
/// Response: the proof in Solidity calldata encoding, `application/octet-stream`
pub async fn gen_proof_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let Some(prover) = state.prover() else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "artifacts are not ready".to_string(),
        );
    };

    let request: GenerateProofRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            let err = ProverError::MalformedRequest(e.to_string());
            tracing::warn!("{}", err);
            return error_response(StatusCode::BAD_REQUEST, err.to_string());
        }
    };

    match prover.prove(request.into()).await {
        Ok(output) => {
            let bytes = output.proof.encode();
            tracing::info!("Returning proof ({} bytes)", bytes.len());
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/octet-stream")],
                bytes,
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("Proof generation failed: {}", e);
            error_response(status_for(&e), e.to_string())
        }
    }
}

/// GET /health: readiness and queue depth.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let prover = state.prover();
    let response = HealthResponse {
        status: if prover.is_some() { "ok" } else { "starting" }.to_string(),
        artifacts_ready: prover.is_some(),
        circuit_identity: prover.map(|p| p.pipeline().artifacts().identity().to_string()),
        pending_requests: prover.map(Prover::pending).unwrap_or(0),
    };
    (StatusCode::OK, Json(response))
}

/// Build the axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> axum::Router {
    use axum::routing::{get, post};
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    axum::Router::new()
        .route("/genProof", post(gen_proof_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::WrappedProof;
    use crate::circuit::StructuralVerifierChip;
    use crate::fixtures;
    use crate::prover::ProvingPipeline;
    use axum_test::TestServer;

    fn ready_state() -> Arc<AppState> {
        let pipeline = ProvingPipeline::new(
            fixtures::compiled_artifacts(),
            Arc::new(StructuralVerifierChip),
        );
        Arc::new(AppState::ready(Prover::new(pipeline)))
    }

    fn create_test_app(state: Arc<AppState>) -> TestServer {
        TestServer::new(build_router(state)).unwrap()
    }

    // ──────────────────────────────────────────────
    // GET /health
    // ──────────────────────────────────────────────

    #[tokio::test]
    async fn test_health_before_artifacts() {
        let server = create_test_app(Arc::new(AppState::new()));
        let response = server.get("/health").await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], "starting");
        assert_eq!(body["artifactsReady"], false);
        assert!(body["circuitIdentity"].is_null());
    }

    #[tokio::test]
    async fn test_health_when_ready() {
        let server = create_test_app(ready_state());
        let response = server.get("/health").await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["artifactsReady"], true);
        assert_eq!(
            body["circuitIdentity"],
            fixtures::compiled_artifacts().identity()
        );
        assert_eq!(body["pendingRequests"], 0);
    }

    // ──────────────────────────────────────────────
    // POST /genProof
    // ──────────────────────────────────────────────

    #[tokio::test]
    async fn test_gen_proof_not_ready_returns_503() {
        let server = create_test_app(Arc::new(AppState::new()));
        let response = server
            .post("/genProof")
            .json(&fixtures::generate_proof_request_json())
            .await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_gen_proof_malformed_body_returns_400() {
        let server = create_test_app(ready_state());
        let response = server.post("/genProof").text("{not json").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.text().contains("Error while parsing request body"));
    }

    #[tokio::test]
    async fn test_gen_proof_missing_field_returns_400() {
        let server = create_test_app(ready_state());
        let response = server
            .post("/genProof")
            .json(&serde_json::json!({
                "verifier_only_circuit_data": fixtures::verifier_only_circuit_data()
            }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_gen_proof_wrong_limb_count_returns_400() {
        let server = create_test_app(ready_state());
        let mut body = fixtures::generate_proof_request_json();
        body["proof_with_public_inputs"]["public_inputs"]
            .as_array_mut()
            .unwrap()
            .pop();
        let response = server.post("/genProof").json(&body).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.text(), "expected 32 public inputs, got 31");
    }

    #[tokio::test]
    async fn test_gen_proof_hash_overflow_returns_400() {
        let server = create_test_app(ready_state());
        let mut body = fixtures::generate_proof_request_json();
        body["proof_with_public_inputs"]["public_inputs"][0] = serde_json::json!(255);
        let response = server.post("/genProof").json(&body).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.text().contains("hash exceeds 253 bits"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_gen_proof_returns_octet_stream() {
        let server = create_test_app(ready_state());
        let response = server
            .post("/genProof")
            .json(&fixtures::generate_proof_request_json())
            .await;
        response.assert_status_ok();
        assert_eq!(
            response.header(header::CONTENT_TYPE),
            "application/octet-stream"
        );
        let bytes = response.as_bytes();
        assert_eq!(bytes.len(), 256);
        assert!(WrappedProof::decode(bytes).is_ok());
    }

    #[tokio::test]
    async fn test_get_on_gen_proof_returns_405() {
        let server = create_test_app(ready_state());
        let response = server.get("/genProof").await;
        response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_unknown_route_returns_404() {
        let server = create_test_app(ready_state());
        let response = server.get("/unknown").await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&ProverError::LimbOutOfRange {
                index: 0,
                value: 300
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ProverError::Proving("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ProverError::Internal("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
