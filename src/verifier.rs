//! Solidity export of the Groth16 verifying key.
//!
//! The generated contract takes the proof in the same 8-word layout
//! `WrappedProof::encode` produces and the public witness values in circuit
//! order, and checks the pairing equation with the EVM BN254 precompiles.

use std::fmt::Write as _;
use std::path::Path;

use ark_bn254::{Bn254, Fq, Fq2, Fr, G1Affine, G2Affine};
use ark_ec::AffineRepr;
use ark_ff::PrimeField;
use ark_groth16::VerifyingKey;
use num_bigint::BigUint;

use crate::error::ProverError;

pub const CONTRACT_FILE: &str = "verifier.sol";

fn decimal(value: &Fq) -> String {
    BigUint::from(value.into_bigint()).to_string()
}

fn g1(point: &G1Affine) -> [String; 2] {
    let (x, y) = point.xy().map(|(x, y)| (*x, *y)).unwrap_or_default();
    [decimal(&x), decimal(&y)]
}

/// EVM precompile order: imaginary part first.
fn g2(point: &G2Affine) -> [String; 4] {
    let (x, y): (Fq2, Fq2) = point.xy().map(|(x, y)| (*x, *y)).unwrap_or_default();
    [decimal(&x.c1), decimal(&x.c0), decimal(&y.c1), decimal(&y.c0)]
}

fn push_g2_constants(out: &mut String, name: &str, point: &G2Affine) {
    let [x1, x0, y1, y0] = g2(point);
    let _ = writeln!(out, "    uint256 constant {name}_X1 = {x1};");
    let _ = writeln!(out, "    uint256 constant {name}_X0 = {x0};");
    let _ = writeln!(out, "    uint256 constant {name}_Y1 = {y1};");
    let _ = writeln!(out, "    uint256 constant {name}_Y0 = {y0};");
}

/// Render a verifier contract for `vk`.
pub fn export_solidity(vk: &VerifyingKey<Bn254>, circuit_identity: &str) -> String {
    let inputs = vk.gamma_abc_g1.len().saturating_sub(1);
    let base_modulus = BigUint::from(Fq::MODULUS);
    let scalar_modulus = BigUint::from(Fr::MODULUS);

    let mut out = String::new();
    out.push_str("// SPDX-License-Identifier: MIT\n");
    out.push_str("pragma solidity ^0.8.0;\n\n");
    out.push_str("/// @title Groth16 verifier for the plonky2 wrapper circuit\n");
    let _ = writeln!(out, "/// @notice Circuit identity: 0x{circuit_identity}");
    out.push_str("contract Verifier {\n");
    let _ = writeln!(out, "    uint256 constant PRIME_Q = {base_modulus};");
    let _ = writeln!(out, "    uint256 constant SNARK_SCALAR_FIELD = {scalar_modulus};\n");

    let [alpha_x, alpha_y] = g1(&vk.alpha_g1);
    let _ = writeln!(out, "    uint256 constant ALPHA_X = {alpha_x};");
    let _ = writeln!(out, "    uint256 constant ALPHA_Y = {alpha_y};");
    push_g2_constants(&mut out, "BETA", &vk.beta_g2);
    push_g2_constants(&mut out, "GAMMA", &vk.gamma_g2);
    push_g2_constants(&mut out, "DELTA", &vk.delta_g2);
    out.push('\n');
    for (i, point) in vk.gamma_abc_g1.iter().enumerate() {
        let [x, y] = g1(point);
        let _ = writeln!(out, "    uint256 constant IC{i}_X = {x};");
        let _ = writeln!(out, "    uint256 constant IC{i}_Y = {y};");
    }

    out.push_str(
        r#"
    function ecAdd(uint256[2] memory a, uint256[2] memory b) internal view returns (uint256[2] memory r) {
        uint256[4] memory data = [a[0], a[1], b[0], b[1]];
        bool success;
        assembly {
            success := staticcall(gas(), 0x06, data, 0x80, r, 0x40)
        }
        require(success, "ecAdd failed");
    }

    function ecMul(uint256[2] memory p, uint256 s) internal view returns (uint256[2] memory r) {
        uint256[3] memory data = [p[0], p[1], s];
        bool success;
        assembly {
            success := staticcall(gas(), 0x07, data, 0x60, r, 0x40)
        }
        require(success, "ecMul failed");
    }

"#,
    );

    let _ = writeln!(
        out,
        "    /// @param proof a.x, a.y, b.x.c1, b.x.c0, b.y.c1, b.y.c0, c.x, c.y\n    \
         /// @param input verifier digest, public input hash\n    \
         function verifyProof(uint256[8] calldata proof, uint256[{inputs}] calldata input) public view returns (bool) {{"
    );
    out.push_str(
        r#"        for (uint256 i = 0; i < 8; i++) {
            require(proof[i] < PRIME_Q, "proof element out of range");
        }
        uint256[2] memory vkX = [IC0_X, IC0_Y];
"#,
    );
    for i in 0..inputs {
        let ic = i + 1;
        let _ = writeln!(
            out,
            "        require(input[{i}] < SNARK_SCALAR_FIELD, \"input out of range\");"
        );
        let _ = writeln!(
            out,
            "        vkX = ecAdd(vkX, ecMul([IC{ic}_X, IC{ic}_Y], input[{i}]));"
        );
    }
    out.push_str(
        r#"
        uint256[24] memory p = [
            proof[0], (PRIME_Q - proof[1]) % PRIME_Q, proof[2], proof[3], proof[4], proof[5],
            ALPHA_X, ALPHA_Y, BETA_X1, BETA_X0, BETA_Y1, BETA_Y0,
            vkX[0], vkX[1], GAMMA_X1, GAMMA_X0, GAMMA_Y1, GAMMA_Y0,
            proof[6], proof[7], DELTA_X1, DELTA_X0, DELTA_Y1, DELTA_Y0
        ];
        uint256[1] memory out;
        bool success;
        assembly {
            success := staticcall(gas(), 0x08, p, 768, out, 0x20)
        }
        return success && out[0] == 1;
    }
}
"#,
    );
    out
}

/// Write `verifier.sol` into `data_dir`.
pub fn write_contract(
    data_dir: &Path,
    vk: &VerifyingKey<Bn254>,
    circuit_identity: &str,
) -> Result<(), ProverError> {
    let path = data_dir.join(CONTRACT_FILE);
    std::fs::write(&path, export_solidity(vk, circuit_identity))
        .map_err(|e| ProverError::io(&path, e))?;
    tracing::info!("Wrote verifier contract to {}", path.display());
    Ok(())
}
