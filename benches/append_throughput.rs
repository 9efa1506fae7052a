use std::sync::Arc;

use bytes::Bytes;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};

use txnstage::ctx::tests_support::RecordingCtx;
use txnstage::{LobId, RedoLogRecord, TransactionBuffer, Xid};

fn sample_record(payload_len: usize) -> RedoLogRecord {
    RedoLogRecord {
        op_code: 0x0a16,
        flg: 0,
        scn: 12345,
        sub_scn: 0,
        dba: 0x2000,
        data_offset: 0,
        lob_id: LobId::default(),
        field_cnt: 0,
        field_pos: 0,
        field_sizes_delta: 0,
        data: Bytes::from(vec![0xab; payload_len]),
    }
}

fn append_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("transaction_buffer_add_chunk");
    for payload_len in [64usize, 512, 4096] {
        group.throughput(Throughput::Bytes(payload_len as u64));
        group.bench_function(format!("payload_{payload_len}"), |b| {
            b.iter_batched(
                || {
                    let ctx = Arc::new(RecordingCtx::new(1024 * 1024, 4096));
                    let buffer = TransactionBuffer::new(ctx);
                    let record = sample_record(payload_len);
                    (buffer, record)
                },
                |(buffer, record)| {
                    for i in 0..256u32 {
                        let xid = Xid::new(1, 1, i);
                        buffer
                            .find_transaction(xid, 0, false, true, false)
                            .expect("fresh xid never conflicts");
                        buffer
                            .add_chunk(xid, 0, &record)
                            .expect("append should not exhaust the pool mid-benchmark");
                    }
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, append_throughput);
criterion_main!(benches);
