use std::sync::Arc;

use clap::Parser;

use wrapper_prover::artifacts::{ArtifactManager, Artifacts};
use wrapper_prover::circuit::StructuralVerifierChip;
use wrapper_prover::config::Cli;
use wrapper_prover::error::ProverError;
use wrapper_prover::prover::{ProofRequest, Prover, ProvingPipeline};
use wrapper_prover::routes::{build_router, AppState};
use wrapper_prover::verifier;

fn fail(stage: &str, err: ProverError) -> ! {
    tracing::error!("Failed to {}: {}", stage, err);
    std::process::exit(1);
}

/// Compile / persist / load, in that order. Runs on the blocking pool since
/// setup may download the SRS with a blocking client.
fn prepare_artifacts(cli: &Cli) -> Result<Option<Arc<Artifacts>>, (&'static str, ProverError)> {
    let circuit_dir = cli.circuit.clone().unwrap_or_default();
    let data_dir = cli.data.clone().unwrap_or_default();
    let mut manager = ArtifactManager::new(
        circuit_dir,
        data_dir,
        cli.srs_config(),
        Arc::new(StructuralVerifierChip),
    );

    if cli.compile {
        manager.compile().map_err(|e| ("compile circuit", e))?;
        if cli.savepk {
            manager.persist().map_err(|e| ("save circuit data", e))?;
        }
    } else if cli.savepk {
        tracing::warn!("--savepk without --compile, nothing to save");
    }

    if cli.loadpk {
        manager.load().map_err(|e| ("load circuit data", e))?;
    }

    Ok(manager.ready())
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wrapper_prover=info".into()),
        )
        .init();

    let cli = Cli::parse();
    tracing::debug!("{:?}", cli);

    if !cli.any_stage() {
        tracing::info!("No stage selected, nothing to do");
        return;
    }
    if let Err(e) = cli.validate() {
        fail("parse arguments", e);
    }

    let state = Arc::new(AppState::new());

    // Bind first so /health answers while artifacts are prepared.
    let server = if cli.server {
        let addr = format!("0.0.0.0:{}", cli.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .unwrap_or_else(|e| fail("bind listener", ProverError::io(&addr, e)));
        tracing::info!("Listening on {}", addr);
        let app = build_router(state.clone());
        Some(tokio::spawn(async move { axum::serve(listener, app).await }))
    } else {
        None
    };

    let cli = Arc::new(cli);
    let artifacts = {
        let cli = cli.clone();
        match tokio::task::spawn_blocking(move || prepare_artifacts(&cli)).await {
            Ok(Ok(artifacts)) => artifacts,
            Ok(Err((stage, e))) => fail(stage, e),
            Err(e) => fail("prepare artifacts", ProverError::Internal(e.to_string())),
        }
    };

    let prover = artifacts.as_ref().map(|artifacts| {
        Prover::new(ProvingPipeline::new(
            artifacts.clone(),
            Arc::new(StructuralVerifierChip),
        ))
    });

    if cli.proof {
        match (&prover, cli.circuit.as_deref()) {
            (Some(prover), Some(circuit_dir)) => {
                tracing::info!("Generating proof");
                let request = ProofRequest::from_dir(circuit_dir)
                    .unwrap_or_else(|e| fail("read proof inputs", e));
                let output = prover
                    .prove(request)
                    .await
                    .unwrap_or_else(|e| fail("generate proof", e));
                println!("{}", output.proof_hex());

                tracing::info!("Verifying proof");
                if let Err(e) = prover
                    .pipeline()
                    .verify(&output.proof, &output.public_witness)
                {
                    fail("verify proof", e);
                }
                if let Err(e) = output.write_to(circuit_dir) {
                    fail("write proof", e);
                }
                tracing::info!("Successfully verified proof");
            }
            _ => tracing::warn!("--proof requires compiled or loaded artifacts, skipping"),
        }
    }

    if cli.contract {
        match (&artifacts, cli.data.as_deref()) {
            (Some(artifacts), Some(data_dir)) => {
                tracing::info!("Generating solidity contract");
                if let Err(e) = verifier::write_contract(
                    data_dir,
                    artifacts.verifying_key(),
                    artifacts.identity(),
                ) {
                    fail("export contract", e);
                }
            }
            _ => tracing::warn!("--contract requires compiled or loaded artifacts, skipping"),
        }
    }

    if let Some(server) = server {
        match prover {
            Some(prover) => {
                state.set_prover(prover);
                tracing::info!("Ready to serve proof requests");
            }
            None => tracing::warn!("No artifacts available, /genProof will answer 503"),
        }
        match server.await {
            Ok(Ok(())) => tracing::info!("Server closed"),
            Ok(Err(e)) => fail("serve", ProverError::Internal(e.to_string())),
            Err(e) => fail("serve", ProverError::Internal(e.to_string())),
        }
    }
}
