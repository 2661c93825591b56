//! Plonky2 proof wrapper.
//!
//! Wraps a plonky2 recursive proof in a BN254 Groth16 proof that exposes two
//! public values, the inner circuit digest and a commitment to the inner
//! proof's 32 public input bytes, so it can be checked by an EVM contract.
//!
//! # Usage
//!
//! ## Compile, persist and export the verifier
//! ```bash
//! wrapper-prover --circuit ./circuit --data ./data --compile --savepk --contract
//! ```
//!
//! ## Serve proof requests from persisted artifacts
//! ```bash
//! wrapper-prover --data ./data --loadpk --server --port 3333
//! ```

pub mod artifacts;
pub mod backend;
pub mod binder;
pub mod circuit;
pub mod config;
pub mod error;
pub mod plonky2;
pub mod prover;
pub mod queue;
pub mod routes;
pub mod srs;
pub mod types;
pub mod verifier;

#[cfg(test)]
mod fixtures;
