//! LRC Integration Tests
//!
//! End-to-end repair, encode and decode through the public engine API.

use assert_matches::assert_matches;
use lrc_repair::lrc::encode::frame;
use lrc_repair::{
    CodeLayout, DecodeProgress, Error, LrcConfig, LrcEngine, RebuildProgress, SessionHandle,
    ShardIndex, Stage,
};

// =============================================================================
// Helpers
// =============================================================================

/// Framed originals of `count` shards of `shard_size` bytes
fn framed_originals(count: usize, shard_size: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(count * shard_size);
    for i in 0..count {
        let block: Vec<u8> = (0..shard_size - 1)
            .map(|j| ((i * 251 + j * 13) ^ (j >> 8)) as u8)
            .collect();
        out.extend(frame(i, &block).expect("frame"));
    }
    out
}

/// Unframed block of every shard index, originals then parity
fn shard_blocks(engine: &LrcEngine, count: usize, shard_size: usize) -> Vec<Vec<u8>> {
    let originals = framed_originals(count, shard_size);
    let parity = engine
        .encode(count, shard_size, &originals)
        .expect("Failed to encode");

    originals
        .chunks_exact(shard_size)
        .map(|s| s[1..].to_vec())
        .chain(parity.iter().map(|(_, s)| s[1..].to_vec()))
        .collect()
}

/// Drive a repair session, declaring `lost` shards when they are requested
fn drive(
    engine: &LrcEngine,
    handle: SessionHandle,
    blocks: &[Vec<u8>],
    lost: &[ShardIndex],
) -> lrc_repair::Result<Vec<ShardIndex>> {
    let mut fetched = Vec::new();
    loop {
        let list = engine.next_request_list(handle)?;
        let Some(&index) = list.first() else {
            return Ok(fetched);
        };
        if lost.contains(&index) {
            engine.declare_lost(handle, index)?;
            continue;
        }
        fetched.push(index);
        if engine.add_shard(handle, index, &blocks[index])? == RebuildProgress::Complete {
            return Ok(fetched);
        }
    }
}

fn engine() -> LrcEngine {
    LrcEngine::init(LrcConfig::default()).expect("Failed to init engine")
}

// =============================================================================
// Repair Integration Tests
// =============================================================================

#[test]
fn test_rebuild_110_originals_lost_6() {
    let engine = engine();
    let shard_size = 16384;
    let blocks = shard_blocks(&engine, 110, shard_size + 1);
    let layout = CodeLayout::new(110, 10).unwrap();

    let handle = engine.begin_rebuild(110, 6, shard_size).unwrap();
    let list = engine.next_request_list(handle).unwrap();
    assert_eq!(list, vec![0, 1, 2, 3, 4, 5, 7, layout.row_parity(0)]);

    let mut progress = RebuildProgress::NeedMore;
    for index in list {
        progress = engine.add_shard(handle, index, &blocks[index]).unwrap();
    }

    assert_eq!(progress, RebuildProgress::Complete);
    assert!(progress.as_status() > 0);
    assert_eq!(engine.stage(handle).unwrap(), Stage::HorRebuild);

    let rebuilt = engine.get_result(handle).unwrap();
    assert_eq!(rebuilt.len(), shard_size);
    assert_eq!(rebuilt, blocks[6]);
    assert!(engine.free_handle(handle).unwrap());
}

#[test]
fn test_every_target_opens_with_its_row() {
    let engine = engine();
    let layout = CodeLayout::new(50, 10).unwrap();

    for lost in 0..50 {
        let handle = engine.begin_rebuild(50, lost, 64).unwrap();
        let list = engine.next_request_list(handle).unwrap();
        let row = layout.row_of(lost).unwrap();

        assert!(!list.is_empty());
        assert!(list.contains(&layout.row_parity(row)));
        assert!(layout
            .row_members(row)
            .iter()
            .all(|&i| i == lost || list.contains(&i)));
        assert!(engine.free_handle(handle).unwrap());
    }
}

#[test]
fn test_single_loss_never_requests_global_parity() {
    let engine = engine();
    let blocks = shard_blocks(&engine, 37, 129);
    let layout = CodeLayout::new(37, 10).unwrap();
    let globals = layout.global_parities();

    for lost in [0, 5, 18, 36] {
        let handle = engine.begin_rebuild(37, lost, 128).unwrap();
        let fetched = drive(&engine, handle, &blocks, &[]).unwrap();

        assert!(fetched.iter().all(|i| !globals.contains(i)));
        assert_eq!(engine.get_result(handle).unwrap(), blocks[lost]);
        engine.free_handle(handle).unwrap();
    }
}

#[test]
fn test_two_losses_in_row_use_column() {
    let engine = engine();
    let blocks = shard_blocks(&engine, 110, 257);
    let layout = CodeLayout::new(110, 10).unwrap();

    let handle = engine.begin_rebuild(110, 6, 256).unwrap();
    let fetched = drive(&engine, handle, &blocks, &[3]).unwrap();

    assert_eq!(engine.stage(handle).unwrap(), Stage::VerRebuild);
    assert!(fetched.contains(&layout.column_parity(6)));
    assert_eq!(engine.get_result(handle).unwrap(), blocks[6]);
}

#[test]
fn test_row_and_column_losses_use_cross_recovery() {
    let engine = engine();
    let blocks = shard_blocks(&engine, 110, 257);
    let layout = CodeLayout::new(110, 10).unwrap();

    let handle = engine.begin_rebuild(110, 6, 256).unwrap();
    for index in [3, 14] {
        engine.declare_lost(handle, index).unwrap();
    }
    let fetched = drive(&engine, handle, &blocks, &[]).unwrap();

    assert_eq!(engine.stage(handle).unwrap(), Stage::HorRecoveryRebuild);
    assert!(fetched.contains(&layout.column_parity(3)));
    assert!(fetched.iter().all(|i| !layout.global_parities().contains(i)));
    assert_eq!(engine.get_result(handle).unwrap(), blocks[6]);
}

#[test]
fn test_tangled_losses_use_global_recovery() {
    let engine = engine();
    let blocks = shard_blocks(&engine, 110, 257);
    let layout = CodeLayout::new(110, 10).unwrap();

    // 3 and 14 can only be rebuilt through groups that also lost 11
    let handle = engine.begin_rebuild(110, 6, 256).unwrap();
    for index in [3, 11, 14] {
        engine.declare_lost(handle, index).unwrap();
    }
    let fetched = drive(&engine, handle, &blocks, &[]).unwrap();

    assert_eq!(engine.stage(handle).unwrap(), Stage::GlobalRecoveryRebuild);
    let globals_fetched = fetched
        .iter()
        .filter(|i| layout.global_parities().contains(i))
        .count();
    assert_eq!(globals_fetched, 4);
    assert_eq!(engine.get_result(handle).unwrap(), blocks[6]);
}

#[test]
fn test_lost_global_is_replaced_from_pool() {
    let engine = engine();
    let blocks = shard_blocks(&engine, 110, 257);
    let layout = CodeLayout::new(110, 10).unwrap();
    let first_global = layout.global_parity(0);

    let handle = engine.begin_rebuild(110, 6, 256).unwrap();
    for index in [3, 11, 14] {
        engine.declare_lost(handle, index).unwrap();
    }
    let fetched = drive(&engine, handle, &blocks, &[first_global]).unwrap();

    assert!(!fetched.contains(&first_global));
    assert!(fetched.contains(&layout.global_parity(4)));
    assert_eq!(engine.get_result(handle).unwrap(), blocks[6]);
}

#[test]
fn test_unrecoverable_topology() {
    let engine = engine();
    let layout = CodeLayout::new(16, 10).unwrap();

    let handle = engine.begin_rebuild(16, 0, 64).unwrap();
    for parity in layout.parities() {
        engine.declare_lost(handle, parity).unwrap();
    }
    engine.declare_lost(handle, 1).unwrap();

    let err = engine.next_request_list(handle).unwrap_err();
    assert_matches!(
        err,
        Error::UnrecoverableTopology {
            lost_index: 0,
            missing: 2
        }
    );
    assert!(err.status_code() < 0);
    assert_matches!(
        engine.get_result(handle),
        Err(Error::UnrecoverableTopology { .. })
    );
    assert!(engine.free_handle(handle).unwrap());
}

// =============================================================================
// Protocol Integration Tests
// =============================================================================

#[test]
fn test_size_mismatch_keeps_request_list() {
    let engine = engine();
    let handle = engine.begin_rebuild(110, 6, 1024).unwrap();
    let before = engine.next_request_list(handle).unwrap();

    let err = engine.add_shard(handle, before[0], &[0u8; 1000]).unwrap_err();
    assert_matches!(
        err,
        Error::SizeMismatch {
            expected: 1024,
            actual: 1000
        }
    );
    assert_eq!(engine.next_request_list(handle).unwrap(), before);
}

#[test]
fn test_stale_handle_after_free() {
    let engine = engine();
    let blocks = shard_blocks(&engine, 16, 33);

    // Freed mid-session
    let open = engine.begin_rebuild(16, 2, 32).unwrap();
    engine.next_request_list(open).unwrap();
    assert!(engine.free_handle(open).unwrap());

    // Freed after completion
    let done = engine.begin_rebuild(16, 2, 32).unwrap();
    drive(&engine, done, &blocks, &[]).unwrap();
    assert!(engine.free_handle(done).unwrap());

    for handle in [open, done] {
        assert!(!engine.free_handle(handle).unwrap());
        assert_matches!(engine.next_request_list(handle), Err(Error::StaleHandle));
        assert_matches!(
            engine.add_shard(handle, 0, &blocks[0]),
            Err(Error::StaleHandle)
        );
        assert_matches!(engine.get_result(handle), Err(Error::StaleHandle));
    }
    assert_eq!(engine.active_sessions(), 0);
}

#[test]
fn test_result_before_completion() {
    let engine = engine();
    let handle = engine.begin_rebuild(16, 2, 32).unwrap();
    assert_matches!(engine.get_result(handle), Err(Error::NotReady));
}

#[test]
fn test_session_limit_from_config() {
    let engine = engine();
    let handles: Vec<_> = (0..3)
        .map(|i| engine.begin_rebuild(16, i, 32).unwrap())
        .collect();

    assert_matches!(
        engine.begin_rebuild(16, 5, 32),
        Err(Error::SessionLimit { max: 3 })
    );
    assert_matches!(
        engine.begin_decode(16, 33),
        Err(Error::SessionLimit { max: 3 })
    );

    for handle in handles {
        engine.free_handle(handle).unwrap();
    }
    assert_eq!(engine.active_sessions(), 0);
}

// =============================================================================
// Encode/Decode Integration Tests
// =============================================================================

#[test]
fn test_decode_reproduces_withheld_original() {
    let engine = engine();
    let shard_size = 513;
    let originals = framed_originals(110, shard_size);
    let parity = engine.encode(110, shard_size, &originals).unwrap();

    let handle = engine.begin_decode(110, shard_size).unwrap();
    let mut result = DecodeProgress::NeedMore;
    let inputs = originals
        .chunks_exact(shard_size)
        .filter(|s| s[0] != 42)
        .chain(parity.iter().map(|(_, s)| s));
    for shard in inputs {
        result = engine.decode(handle, shard).unwrap();
        if result.as_status() > 0 {
            break;
        }
    }

    let DecodeProgress::Complete(data) = result else {
        panic!("decode did not complete");
    };
    let block = shard_size - 1;
    assert_eq!(data.len(), 110 * block);
    assert_eq!(
        &data[42 * block..43 * block],
        &originals[42 * shard_size + 1..43 * shard_size]
    );
    assert_eq!(engine.active_sessions(), 0);
}

#[test]
fn test_decode_with_several_losses() {
    let engine = engine();
    let shard_size = 65;
    let originals = framed_originals(64, shard_size);
    let parity = engine.encode(64, shard_size, &originals).unwrap();
    let lost = [0u8, 9, 18, 27, 36, 45, 54, 63];

    let handle = engine.begin_decode(64, shard_size).unwrap();
    let mut result = DecodeProgress::NeedMore;
    let inputs = parity
        .iter()
        .map(|(_, s)| s)
        .chain(originals.chunks_exact(shard_size).filter(|s| !lost.contains(&s[0])));
    for shard in inputs {
        result = engine.decode(handle, shard).unwrap();
        if result != DecodeProgress::NeedMore {
            break;
        }
    }

    let expected: Vec<u8> = originals
        .chunks_exact(shard_size)
        .flat_map(|s| s[1..].to_vec())
        .collect();
    assert_eq!(result, DecodeProgress::Complete(expected));
}

#[test]
fn test_encode_rejects_mislabelled_original() {
    let engine = engine();
    let mut originals = framed_originals(16, 33);
    originals[33 * 4] = 9;
    assert_matches!(
        engine.encode(16, 33, &originals),
        Err(Error::InvalidArgument(_))
    );
}
