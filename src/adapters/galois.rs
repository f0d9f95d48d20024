//! GF(256) Algebra Adapter
//!
//! Implements the `AlgebraEngine` port on top of the `galois_8` field
//! arithmetic of the Reed-Solomon erasure coding library. Parity is a plain
//! linear combination of original blocks; reconstruction is Gaussian
//! elimination over the selected parity equations.

use reed_solomon_erasure::galois_8;
use tracing::{debug, instrument};

use crate::domain::ports::AlgebraEngine;
use crate::error::{Error, Result};
use crate::lrc::layout::{CodeLayout, ShardIndex};

/// GF(256) implementation of the parity equations.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaloisAlgebra;

impl GaloisAlgebra {
    /// Create the adapter.
    pub fn new() -> Self {
        Self
    }
}

/// One equation restricted to the unknowns: `coefficients · x = rhs`
struct Equation {
    coefficients: Vec<u8>,
    rhs: Vec<u8>,
}

impl AlgebraEngine for GaloisAlgebra {
    #[instrument(skip(self, layout, blocks), fields(original_count = layout.original_count()))]
    fn encode(&self, layout: &CodeLayout, blocks: &[&[u8]]) -> Result<Vec<Vec<u8>>> {
        if blocks.len() != layout.original_count() {
            return Err(Error::EngineFailure(format!(
                "expected {} original blocks, got {}",
                layout.original_count(),
                blocks.len()
            )));
        }
        let block_len = blocks.first().map(|b| b.len()).unwrap_or(0);
        if blocks.iter().any(|b| b.len() != block_len) {
            return Err(Error::EngineFailure(
                "original blocks differ in length".to_string(),
            ));
        }

        let mut parities = Vec::with_capacity(layout.parity_count());
        for parity in layout.parities() {
            let coefficients = layout.coefficients(parity)?;
            let mut out = vec![0u8; block_len];
            for (block, &c) in blocks.iter().zip(&coefficients) {
                if c != 0 {
                    galois_8::mul_slice_xor(c, block, &mut out);
                }
            }
            parities.push(out);
        }

        debug!(parities = parities.len(), block_len, "Encoded parity blocks");
        Ok(parities)
    }

    #[instrument(skip(self, layout, shards, equations), fields(equation_count = equations.len()))]
    fn reconstruct(
        &self,
        layout: &CodeLayout,
        shards: &[Option<Vec<u8>>],
        equations: &[ShardIndex],
    ) -> Result<Vec<(ShardIndex, Vec<u8>)>> {
        if shards.len() != layout.total_shards() {
            return Err(Error::EngineFailure(format!(
                "expected {} shard slots, got {}",
                layout.total_shards(),
                shards.len()
            )));
        }
        let block_len = shards
            .iter()
            .flatten()
            .map(Vec::len)
            .next()
            .ok_or_else(|| Error::EngineFailure("no shard data supplied".to_string()))?;
        if shards.iter().flatten().any(|s| s.len() != block_len) {
            return Err(Error::EngineFailure(
                "shard blocks differ in length".to_string(),
            ));
        }

        // Unknowns: originals referenced by an equation but not held
        let mut unknowns: Vec<ShardIndex> = Vec::new();
        for &parity in equations {
            if !layout.kind(parity)?.is_parity() {
                return Err(Error::EngineFailure(format!(
                    "shard {} is not a parity equation",
                    parity
                )));
            }
            if shards[parity].is_none() {
                return Err(Error::EngineFailure(format!(
                    "parity shard {} is not available",
                    parity
                )));
            }
            for member in layout.equation_members(parity)? {
                if shards[member].is_none() {
                    unknowns.push(member);
                }
            }
        }
        unknowns.sort_unstable();
        unknowns.dedup();

        if unknowns.is_empty() {
            return Ok(Vec::new());
        }

        let mut system = Vec::with_capacity(equations.len());
        for &parity in equations {
            system.push(build_equation(layout, shards, parity, &unknowns, block_len)?);
        }

        let rank = eliminate(&mut system, unknowns.len());
        if rank < unknowns.len() {
            return Err(Error::InsufficientEquations {
                unknowns: unknowns.len(),
                rank,
            });
        }

        debug!(solved = unknowns.len(), "Solved missing originals");
        Ok(unknowns
            .into_iter()
            .zip(system)
            .map(|(index, eq)| (index, eq.rhs))
            .collect())
    }

    fn name(&self) -> &'static str {
        "gf256"
    }
}

/// Move every known term of a parity equation to the right-hand side.
fn build_equation(
    layout: &CodeLayout,
    shards: &[Option<Vec<u8>>],
    parity: ShardIndex,
    unknowns: &[ShardIndex],
    block_len: usize,
) -> Result<Equation> {
    let full = layout.coefficients(parity)?;
    let mut rhs = shards[parity].clone().unwrap_or_else(|| vec![0u8; block_len]);

    for member in layout.equation_members(parity)? {
        if let Some(block) = &shards[member] {
            let c = full[member];
            if c != 0 {
                galois_8::mul_slice_xor(c, block, &mut rhs);
            }
        }
    }

    let coefficients = unknowns.iter().map(|&u| full[u]).collect();

    Ok(Equation { coefficients, rhs })
}

/// Reduce the system to identity form over the first `columns` rows.
///
/// Returns the rank. When the rank equals `columns`, row `j` holds the
/// solution for unknown `j`.
fn eliminate(system: &mut Vec<Equation>, columns: usize) -> usize {
    let mut rank = 0;

    for col in 0..columns {
        let Some(pivot) = (rank..system.len()).find(|&r| system[r].coefficients[col] != 0) else {
            continue;
        };
        system.swap(rank, pivot);

        let inv = galois_8::div(1, system[rank].coefficients[col]);
        if inv != 1 {
            let row = &mut system[rank];
            for c in row.coefficients.iter_mut() {
                *c = galois_8::mul(*c, inv);
            }
            let mut scaled = vec![0u8; row.rhs.len()];
            galois_8::mul_slice(inv, &row.rhs, &mut scaled);
            row.rhs = scaled;
        }

        let pivot_coefficients = system[rank].coefficients.clone();
        let pivot_rhs = system[rank].rhs.clone();
        for (r, row) in system.iter_mut().enumerate() {
            let factor = row.coefficients[col];
            if r == rank || factor == 0 {
                continue;
            }
            for (c, &p) in row.coefficients.iter_mut().zip(&pivot_coefficients) {
                *c = galois_8::add(*c, galois_8::mul(factor, p));
            }
            galois_8::mul_slice_xor(factor, &pivot_rhs, &mut row.rhs);
        }

        rank += 1;
    }

    if rank == columns {
        system.truncate(columns);
    }
    rank
}
