//! Cross-module scenario tests for the transaction staging and output
//! pipeline, exercised entirely through the public crate API.

use std::sync::Arc;

use bytes::Bytes;
use hex_literal::hex;
use once_cell::sync::Lazy;

use txnstage::ctx::tests_support::RecordingCtx;
use txnstage::lwn::LwnMembersManager;
use txnstage::redo_record::{FLG_MULTIBLOCKUNDOHEAD, FLG_MULTIBLOCKUNDOTAIL, OP_CODE_UNDO};
use txnstage::transaction_chunk::ROW_HEADER_TOTAL;
use txnstage::{BuilderBuffer, BuilderMessage, LobId, RedoLogRecord, TransactionBuffer, Xid};

/// One-time `tracing` subscriber install so a failing scenario test can be
/// re-run with `RUST_LOG=trace` to see the `Ctx::trace`/`warning` events a
/// real `TracingCtx` would emit, without every test paying init cost.
static INIT_TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
});

fn ctx() -> Arc<RecordingCtx> {
    Lazy::force(&INIT_TRACING);
    Arc::new(RecordingCtx::new(1024 * 1024, 4096))
}

fn record(op_code: u16, flg: u16, payload: &[u8]) -> RedoLogRecord {
    RedoLogRecord {
        op_code,
        flg,
        scn: 99,
        sub_scn: 0,
        dba: 0x4000,
        data_offset: 0,
        lob_id: LobId::default(),
        field_cnt: 0,
        field_pos: 0,
        field_sizes_delta: 0,
        data: Bytes::copy_from_slice(payload),
    }
}

#[test]
fn new_xid_scenario() {
    let tb = TransactionBuffer::new(ctx());
    let xid = Xid::new(1, 2, 3);
    let found = tb.find_transaction(xid, 0, false, true, false).unwrap();
    assert_eq!(found, Some(xid));
    assert_eq!(tb.transaction_count(), 1);
    assert_eq!(tb.transaction_size(xid, 0), Some(0));
}

#[test]
fn conflicting_xid_scenario() {
    let tb = TransactionBuffer::new(ctx());
    tb.find_transaction(Xid::new(1, 2, 3), 0, false, true, false)
        .unwrap();
    let err = tb
        .find_transaction(Xid::new(1, 2, 4), 0, true, true, false)
        .unwrap_err();
    assert_eq!(err.code(), 50039);
}

#[test]
fn rollback_scenario_matches_expected_size_and_clears_chain() {
    let tb = TransactionBuffer::new(ctx());
    let xid = Xid::new(1, 2, 3);
    tb.find_transaction(xid, 0, false, true, false).unwrap();
    let r = record(1, 0, &[0u8; 128]);
    tb.add_chunk(xid, 0, &r).unwrap();
    assert_eq!(
        tb.transaction_size(xid, 0),
        Some((128 + ROW_HEADER_TOTAL) as u64)
    );
    tb.rollback_transaction_chunk(xid, 0).unwrap();
    assert_eq!(tb.transaction_size(xid, 0), Some(0));
    assert_eq!(tb.transaction_element_count(xid, 0), Some(0));
}

/// Scenario 4 ("multi-block merge"): a TAIL-flagged record opens the
/// split, then a HEAD+paired-tail close it; the stale TAIL-only record is
/// rolled back and replaced with the merged result, and `last_split`
/// clears once the merge completes.
#[test]
fn multi_block_merge_scenario() {
    let tb = TransactionBuffer::new(ctx());
    let xid = Xid::new(7, 8, 9);
    tb.find_transaction(xid, 0, false, true, false).unwrap();

    let mut head = record(OP_CODE_UNDO, FLG_MULTIBLOCKUNDOTAIL, &[0u8; 24]);
    head.field_sizes_delta = 0;
    head.field_cnt = 2;
    head.field_pos = 8;
    tb.add_chunk(xid, 0, &head).unwrap();
    let size_after_first = tb.transaction_size(xid, 0).unwrap();
    assert!(size_after_first > 0);

    let mut new_head = record(OP_CODE_UNDO, FLG_MULTIBLOCKUNDOHEAD, &[0u8; 32]);
    new_head.field_sizes_delta = 0;
    new_head.field_cnt = 2;
    new_head.field_pos = 8;
    let tail = record(2, 0, &[0u8; 16]);

    tb.add_chunk_pair(xid, 0, &mut new_head, &tail).unwrap();

    // The stale 24-byte-payload record was rolled back and replaced by
    // one merged row: exactly one element remains on the chain.
    assert_eq!(tb.transaction_element_count(xid, 0), Some(1));
}

/// Scenario 5 ("builder expand, message fits"): a message still under
/// `OUTPUT_BUFFER_DATA_SIZE` gets relocated whole into the new chunk, and
/// the old chunk's committed size is untouched.
#[test]
fn builder_expand_relocates_message_that_fits() {
    let buffer = BuilderBuffer::new(ctx());
    buffer.initialize().unwrap();
    let mut message = BuilderMessage::default();
    buffer.write_message_bytes(&mut message, &[0x42u8; 1000]).unwrap();

    let old_id = buffer.last_chunk_id().unwrap();
    buffer.expand(true, &mut message).unwrap();

    assert_eq!(buffer.last_chunk_id(), Some(old_id + 1));
    assert_eq!(message.chunk_id, Some(old_id + 1));
    assert_eq!(message.start_offset, 0);
    assert_eq!(message.position, 1000);
}

/// Scenario 6 ("builder release"): chunks 0..4 exist; `releaseBuffers(3)`
/// advances `firstChunk` to id 3 and drops the count to 2.
#[test]
fn builder_release_scenario() {
    let buffer = BuilderBuffer::new(ctx());
    buffer.initialize().unwrap();
    for _ in 0..4 {
        let mut message = BuilderMessage {
            chunk_id: buffer.last_chunk_id(),
            start_offset: 0,
            position: 0,
            size: 0,
        };
        buffer.expand(false, &mut message).unwrap();
    }
    assert_eq!(buffer.chunks_allocated(), 5);
    buffer.release_buffers(3);
    assert_eq!(buffer.first_chunk_id(), Some(3));
    assert_eq!(buffer.chunks_allocated(), 2);
}

/// L3: appending then rolling back a record restores the transaction's
/// externally observable state (`size`, `elements`) to what it was
/// beforehand. `TransactionBuffer` doesn't expose raw chunk bytes outside
/// the crate, so this checks the public-surface proxy for byte-identity;
/// `transaction_chunk`'s own colocated tests check the byte layout directly.
#[test]
fn append_then_rollback_restores_prior_state() {
    let tb = TransactionBuffer::new(ctx());
    let xid = Xid::new(3, 3, 3);
    tb.find_transaction(xid, 0, false, true, false).unwrap();

    let first = record(1, 0, &hex!("0011223344556677"));
    tb.add_chunk(xid, 0, &first).unwrap();
    let size_before = tb.transaction_size(xid, 0).unwrap();
    let elements_before = tb.transaction_element_count(xid, 0).unwrap();

    let second = record(2, 0, &hex!("aabbccddeeff"));
    tb.add_chunk(xid, 0, &second).unwrap();
    tb.rollback_transaction_chunk(xid, 0).unwrap();

    assert_eq!(tb.transaction_size(xid, 0), Some(size_before));
    assert_eq!(tb.transaction_element_count(xid, 0), Some(elements_before));
}

/// P4-adjacent: builder chain ids are strictly increasing walking
/// `first_chunk_id -> ... -> last_chunk_id` after repeated expansion.
#[test]
fn builder_chain_ids_strictly_increase() {
    let buffer = BuilderBuffer::new(ctx());
    buffer.initialize().unwrap();
    let mut message = BuilderMessage::default();
    for _ in 0..8 {
        buffer.expand(false, &mut message).unwrap();
    }
    assert_eq!(buffer.first_chunk_id(), Some(0));
    assert_eq!(buffer.last_chunk_id(), Some(8));
    assert_eq!(buffer.chunks_allocated(), 9);
}

/// End-to-end ordering: redo records discovered out of physical order are
/// replayed back in `(scn, subScn, block, offset)` order by the LWN heap,
/// then staged into their owning transactions in that order.
#[test]
fn lwn_orders_records_before_staging_into_transactions() {
    let shared_ctx = ctx();
    let mut lwn = LwnMembersManager::new(shared_ctx.clone(), 1);
    let tb = TransactionBuffer::new(shared_ctx);
    let xid = Xid::new(1, 1, 1);
    tb.find_transaction(xid, 0, false, true, false).unwrap();

    let arrivals = [(50, 3u32), (10, 1u32), (30, 2u32)];
    for (scn, block) in arrivals {
        let h = lwn.allocate(0).unwrap();
        lwn.add(
            txnstage::lwn::LwnMember {
                scn: scn as u64,
                sub_scn: 0,
                block,
                offset: 0,
                size: 0,
            },
            h,
        )
        .unwrap();
    }

    let mut seen_blocks = Vec::new();
    while let Some((member, _)) = lwn.pop_min() {
        seen_blocks.push(member.block);
        tb.add_chunk(xid, 0, &record(1, 0, b"x")).unwrap();
    }
    assert_eq!(seen_blocks, vec![1, 2, 3]);
    assert_eq!(tb.transaction_element_count(xid, 0), Some(3));
}
