use serde::{Deserialize, Serialize};

use crate::plonky2::{ProofWithPublicInputs, VerifierOnlyCircuitData};
use crate::prover::ProofRequest;

/// Body of `POST /genProof`.
#[derive(Debug, Deserialize, Serialize)]
pub struct GenerateProofRequest {
    pub verifier_only_circuit_data: VerifierOnlyCircuitData,
    pub proof_with_public_inputs: ProofWithPublicInputs,
}

impl From<GenerateProofRequest> for ProofRequest {
    fn from(value: GenerateProofRequest) -> Self {
        Self {
            verifier_data: value.verifier_only_circuit_data,
            proof: value.proof_with_public_inputs,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub artifacts_ready: bool,
    pub circuit_identity: Option<String>,
    pub pending_requests: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_generate_proof_request_deserialize() {
        let req: GenerateProofRequest =
            serde_json::from_value(fixtures::generate_proof_request_json()).unwrap();
        assert_eq!(
            req.verifier_only_circuit_data.circuit_digest,
            fixtures::CIRCUIT_DIGEST
        );
        assert_eq!(req.proof_with_public_inputs.public_inputs.len(), 32);

        let request = ProofRequest::from(req);
        assert_eq!(request.proof.public_inputs, fixtures::public_inputs());
    }

    #[test]
    fn test_generate_proof_request_missing_field() {
        let json = serde_json::json!({
            "verifier_only_circuit_data": fixtures::verifier_only_circuit_data(),
        });
        let result: Result<GenerateProofRequest, _> = serde_json::from_value(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_generate_proof_request_rejects_negative_limb() {
        let mut json = fixtures::generate_proof_request_json();
        json["proof_with_public_inputs"]["public_inputs"][0] = serde_json::json!(-1);
        let result: Result<GenerateProofRequest, _> = serde_json::from_value(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse {
            status: "ok".to_string(),
            artifacts_ready: true,
            circuit_identity: Some("abcd".to_string()),
            pending_requests: 3,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["artifactsReady"], true);
        assert_eq!(json["circuitIdentity"], "abcd");
        assert_eq!(json["pendingRequests"], 3);
    }

    #[test]
    fn test_health_response_not_ready() {
        let resp = HealthResponse {
            status: "starting".to_string(),
            artifacts_ready: false,
            circuit_identity: None,
            pending_requests: 0,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json["circuitIdentity"].is_null());
    }
}
