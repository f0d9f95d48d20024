//! Property-Based Tests for LRC Repair
//!
//! # Test Properties
//!
//! 1. **First Request**: a fresh session always asks for the target's row
//! 2. **Local Repair**: a lone loss is rebuilt without any global parity
//! 3. **Correctness**: whatever is declared lost, a completed repair returns
//!    the original bytes, and globals suffice while losses fit the pool
//! 4. **Decode Roundtrip**: decode(encode) reproduces a withheld original

#![cfg(test)]

use std::sync::Arc;

use proptest::prelude::*;

use super::decode::{DecodeProgress, DecodeSession};
use super::encode::Encoder;
use super::layout::{CodeLayout, ShardIndex};
use super::rebuild::{RebuildProgress, RepairSession};
use crate::adapters::GaloisAlgebra;
use crate::domain::ports::AlgebraEngine;
use crate::error::Error;

const GLOBALS: usize = 4;

// =============================================================================
// Property Strategies
// =============================================================================

/// Original count and a lost original within it
fn target_strategy() -> impl Strategy<Value = (usize, usize)> {
    (1usize..=120).prop_flat_map(|n| (Just(n), 0..n))
}

/// Small shard blocks for fast encoding
fn block_size_strategy() -> impl Strategy<Value = usize> {
    1usize..=48
}

/// Every shard of the code, unframed
fn encoded(original_count: usize, block_size: usize, seed: u8) -> Vec<Vec<u8>> {
    let layout = CodeLayout::new(original_count, GLOBALS).unwrap();
    let blocks: Vec<Vec<u8>> = (0..original_count)
        .map(|i| {
            (0..block_size)
                .map(|j| (i as u8).wrapping_mul(31) ^ (j as u8).wrapping_add(seed))
                .collect()
        })
        .collect();
    let refs: Vec<&[u8]> = blocks.iter().map(Vec::as_slice).collect();
    let parities = GaloisAlgebra.encode(&layout, &refs).unwrap();
    blocks.into_iter().chain(parities).collect()
}

/// Supply requested shards, declaring `lost` ones instead of sending them
fn drive(
    session: &mut RepairSession,
    shards: &[Vec<u8>],
    lost: &[ShardIndex],
) -> crate::error::Result<Vec<ShardIndex>> {
    let mut fetched = Vec::new();
    loop {
        let list = session.next_request_list()?;
        if list.is_empty() {
            return Ok(fetched);
        }
        let index = list[0];
        if lost.contains(&index) {
            session.declare_lost(index)?;
            continue;
        }
        fetched.push(index);
        if session.add_shard(index, &shards[index])? == RebuildProgress::Complete {
            return Ok(fetched);
        }
    }
}

fn session(original_count: usize, lost_index: usize, block_size: usize) -> RepairSession {
    RepairSession::begin(
        Arc::new(GaloisAlgebra),
        GLOBALS,
        original_count,
        lost_index,
        block_size,
    )
    .unwrap()
}

// =============================================================================
// Request Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// The first request list is the target's row group without the target
    #[test]
    fn prop_first_request_covers_row((n, lost) in target_strategy()) {
        let layout = CodeLayout::new(n, GLOBALS).unwrap();
        let mut session = session(n, lost, 8);

        let list = session.next_request_list().unwrap();
        let row = layout.row_of(lost).unwrap();
        let expected: Vec<ShardIndex> =
            layout.row_group(row).into_iter().filter(|&i| i != lost).collect();

        prop_assert!(!list.is_empty());
        prop_assert_eq!(list, expected);
    }

    /// Repeating the request without progress changes nothing
    #[test]
    fn prop_request_list_is_stable((n, lost) in target_strategy()) {
        let mut session = session(n, lost, 8);
        let first = session.next_request_list().unwrap();
        let second = session.next_request_list().unwrap();
        prop_assert_eq!(first, second);
    }
}

// =============================================================================
// Repair Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// A lone loss completes locally and never touches global parity
    #[test]
    fn prop_single_loss_repairs_locally(
        (n, lost) in target_strategy(),
        block_size in block_size_strategy(),
        seed in any::<u8>(),
    ) {
        let layout = CodeLayout::new(n, GLOBALS).unwrap();
        let shards = encoded(n, block_size, seed);
        let mut session = session(n, lost, block_size);

        let fetched = drive(&mut session, &shards, &[]).unwrap();
        let globals = layout.global_parities();

        prop_assert!(session.is_complete());
        prop_assert!(fetched.iter().all(|i| !globals.contains(i)));
        prop_assert_eq!(session.result().unwrap(), shards[lost].clone());
    }

    /// Extra losses either repair correctly or fail as unrecoverable
    #[test]
    fn prop_repair_is_correct_or_unrecoverable(
        (n, lost) in (8usize..=64).prop_flat_map(|n| (Just(n), 0..n)),
        extra in prop::collection::vec(0usize..64, 0..8),
        seed in any::<u8>(),
    ) {
        let layout = CodeLayout::new(n, GLOBALS).unwrap();
        let shards = encoded(n, 16, seed);
        let mut others: Vec<ShardIndex> = extra
            .into_iter()
            .map(|i| i % n)
            .filter(|&i| i != lost)
            .collect();
        others.sort_unstable();
        others.dedup();

        let mut session = session(n, lost, 16);
        match drive(&mut session, &shards, &others) {
            Ok(_) => {
                prop_assert!(session.is_complete());
                prop_assert_eq!(session.result().unwrap(), shards[lost].clone());
            }
            Err(Error::UnrecoverableTopology { lost_index, missing }) => {
                prop_assert_eq!(lost_index, lost);
                // Only originals are lost, so the global pool covers up to GLOBALS
                prop_assert!(missing > GLOBALS);
                prop_assert!(missing <= layout.original_count());
            }
            Err(e) => prop_assert!(false, "unexpected error: {}", e),
        }
    }
}

// =============================================================================
// Decode Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Decoding all shards but one original reproduces the original data
    #[test]
    fn prop_decode_roundtrip(
        (n, withheld) in target_strategy(),
        block_size in block_size_strategy(),
        seed in any::<u8>(),
    ) {
        let shard_size = block_size + 1;
        let blocks = encoded(n, block_size, seed);
        let mut framed_originals = Vec::with_capacity(n * shard_size);
        for (i, block) in blocks[..n].iter().enumerate() {
            framed_originals.push(i as u8);
            framed_originals.extend_from_slice(block);
        }

        let encoder = Encoder::new(Arc::new(GaloisAlgebra), GLOBALS, n, shard_size).unwrap();
        let parity = encoder.encode(&framed_originals).unwrap();

        let mut session =
            DecodeSession::begin(Arc::new(GaloisAlgebra), GLOBALS, n, shard_size).unwrap();
        let mut result = DecodeProgress::NeedMore;
        let inputs = framed_originals
            .chunks_exact(shard_size)
            .enumerate()
            .filter(|(i, _)| *i != withheld)
            .map(|(_, s)| s)
            .chain(parity.iter().map(|(_, s)| s));
        for shard in inputs {
            result = session.decode(shard).unwrap();
            if result != DecodeProgress::NeedMore {
                break;
            }
        }

        let DecodeProgress::Complete(data) = result else {
            return Err(TestCaseError::fail("decode did not complete"));
        };
        prop_assert_eq!(data.len(), n * block_size);
        prop_assert_eq!(
            &data[withheld * block_size..(withheld + 1) * block_size],
            blocks[withheld].as_slice()
        );
    }
}
