//! Row layout and per-slot metadata for one transaction chunk.
//!
//! Grounded on `examples/original_source/src/parser/TransactionBuffer.h`'s
//! `TransactionChunk` and `TransactionChunkRecord`. A chunk's row data
//! lives inside a slot of a shared [`crate::transaction_buffer`] pool
//! chunk; this module only knows how to read and write rows within a
//! slot-sized byte slice — ownership of the slice itself belongs to
//! `transaction_buffer::PoolChunkSlots`.

use crate::redo_record::{RedoLogRecord, StoredHeader, REDO_HEADER_LEN};

/// Total bytes backing one slot, matching the original's
/// `FULL_BUFFER_SIZE`. Sixteen slots of this size fill exactly one 1 MiB
/// pool chunk.
pub const FULL_BUFFER_SIZE: usize = 65536;

/// Bytes of the original's in-band per-chunk header (`elements`, `size`,
/// `pos`, and three pointers on a 64-bit original). The Rust port keeps
/// this metadata in `TransactionChunkMeta` instead of inline in the byte
/// buffer, but keeps the same effective row-data capacity so the overflow
/// boundary (B1) behaves identically.
pub const HEADER_BUFFER_SIZE: usize = 48;

/// Usable row-data bytes per slot.
pub const DATA_BUFFER_SIZE: usize = FULL_BUFFER_SIZE - HEADER_BUFFER_SIZE;

pub const ROW_HEADER_OP: usize = 0;
pub const ROW_HEADER_REDO1: usize = ROW_HEADER_OP + 4;
pub const ROW_HEADER_REDO2: usize = ROW_HEADER_REDO1 + REDO_HEADER_LEN;
pub const ROW_HEADER_DATA: usize = ROW_HEADER_REDO2 + REDO_HEADER_LEN;
pub const ROW_HEADER_SIZE: usize = ROW_HEADER_DATA;
pub const ROW_HEADER_TOTAL: usize = ROW_HEADER_SIZE + 8;

/// Per-slot bookkeeping kept outside the raw byte buffer: element count,
/// bytes used, and the doubly-linked chain of chunks belonging to one
/// transaction.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransactionChunkMeta {
    pub elements: u32,
    pub size: u32,
    pub prev: Option<TxChunkId>,
    pub next: Option<TxChunkId>,
}

/// A handle identifying one transaction chunk: which pool chunk it lives
/// in, and which of the sixteen slots.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TxChunkId {
    pub pool_chunk: u64,
    pub slot: u8,
}

/// A read-only view of one stored record row (one or two merged
/// records) inside a slot buffer.
pub struct RecordRowRef<'a> {
    buf: &'a [u8],
}

impl<'a> RecordRowRef<'a> {
    pub fn op_code1(&self) -> u16 {
        u16::from_le_bytes([self.buf[0], self.buf[1]])
    }

    pub fn op_code2(&self) -> u16 {
        u16::from_le_bytes([self.buf[2], self.buf[3]])
    }

    pub fn redo1(&self) -> StoredHeader {
        RedoLogRecord::decode_header(&self.buf[ROW_HEADER_REDO1..ROW_HEADER_REDO1 + REDO_HEADER_LEN])
    }

    pub fn redo2(&self) -> StoredHeader {
        RedoLogRecord::decode_header(&self.buf[ROW_HEADER_REDO2..ROW_HEADER_REDO2 + REDO_HEADER_LEN])
    }

    pub fn data1(&self) -> &'a [u8] {
        let size = self.redo1().size as usize;
        &self.buf[ROW_HEADER_DATA..ROW_HEADER_DATA + size]
    }

    pub fn data2(&self) -> &'a [u8] {
        let size1 = self.redo1().size as usize;
        let size2 = self.redo2().size as usize;
        &self.buf[ROW_HEADER_DATA + size1..ROW_HEADER_DATA + size1 + size2]
    }

    /// Total on-disk size of this row, including the trailing size tail.
    pub fn row_len(&self) -> usize {
        let size1 = self.redo1().size as usize;
        let size2 = self.redo2().size as usize;
        ROW_HEADER_TOTAL + size1 + size2
    }

    /// Value stored in the trailing `u64` tail field, used for O(1)
    /// backward iteration during rollback.
    pub fn tail_size(&self) -> u64 {
        let len = self.row_len();
        u64::from_le_bytes(self.buf[len - 8..len].try_into().unwrap())
    }
}

/// Returns a view of the row starting at byte offset `at` within `buf`.
pub fn row_at(buf: &[u8], at: usize) -> RecordRowRef<'_> {
    RecordRowRef { buf: &buf[at..] }
}

/// Appends a single record's row at `buf[used..]`, returning the new
/// `used` offset. `buf` must have at least `DATA_BUFFER_SIZE` bytes free
/// starting at `used` for `r.size() + ROW_HEADER_TOTAL`, checked by the
/// caller (`TransactionBuffer::add_chunk`).
pub fn append_single(buf: &mut [u8], used: usize, r: &RedoLogRecord) -> usize {
    append_row(buf, used, r, None)
}

/// Appends a merged two-record row (a split multi-block undo HEAD/TAIL
/// pair), returning the new `used` offset.
pub fn append_pair(buf: &mut [u8], used: usize, r1: &RedoLogRecord, r2: &RedoLogRecord) -> usize {
    append_row(buf, used, r1, Some(r2))
}

fn append_row(buf: &mut [u8], used: usize, r1: &RedoLogRecord, r2: Option<&RedoLogRecord>) -> usize {
    let row = &mut buf[used..];
    row[0..2].copy_from_slice(&r1.op_code.to_le_bytes());
    let op2 = r2.map(|r| r.op_code).unwrap_or(0);
    row[2..4].copy_from_slice(&op2.to_le_bytes());
    r1.encode_header(&mut row[ROW_HEADER_REDO1..ROW_HEADER_REDO1 + REDO_HEADER_LEN]);
    let mut data_off = ROW_HEADER_DATA;
    row[data_off..data_off + r1.data.len()].copy_from_slice(&r1.data);
    data_off += r1.data.len();
    if let Some(r2) = r2 {
        r2.encode_header(&mut row[ROW_HEADER_REDO2..ROW_HEADER_REDO2 + REDO_HEADER_LEN]);
        row[data_off..data_off + r2.data.len()].copy_from_slice(&r2.data);
        data_off += r2.data.len();
    } else {
        let zero = [0u8; REDO_HEADER_LEN];
        row[ROW_HEADER_REDO2..ROW_HEADER_REDO2 + REDO_HEADER_LEN].copy_from_slice(&zero);
    }
    let row_len = data_off + 8;
    row[data_off..data_off + 8].copy_from_slice(&(row_len as u64).to_le_bytes());
    used + row_len
}

/// Bytes a row for `r1` (and optionally `r2`) will occupy once appended.
pub fn row_size(r1: &RedoLogRecord, r2: Option<&RedoLogRecord>) -> usize {
    ROW_HEADER_TOTAL + r1.data.len() + r2.map(|r| r.data.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::LobId;
    use bytes::Bytes;

    fn sample(op_code: u16, payload: &[u8]) -> RedoLogRecord {
        RedoLogRecord {
            op_code,
            flg: 0,
            scn: 100,
            sub_scn: 1,
            dba: 0,
            data_offset: 0,
            lob_id: LobId::default(),
            field_cnt: 0,
            field_pos: 0,
            field_sizes_delta: 0,
            data: Bytes::copy_from_slice(payload),
        }
    }

    #[test]
    fn append_single_then_read_back() {
        let mut buf = vec![0u8; DATA_BUFFER_SIZE];
        let r = sample(1, b"payload-bytes");
        let used = append_single(&mut buf, 0, &r);
        assert_eq!(used, row_size(&r, None));
        let row = row_at(&buf, 0);
        assert_eq!(row.op_code1(), 1);
        assert_eq!(row.data1(), b"payload-bytes");
        assert_eq!(row.row_len(), used);
        assert_eq!(row.tail_size(), used as u64);
    }

    #[test]
    fn append_pair_preserves_both_payloads() {
        let mut buf = vec![0u8; DATA_BUFFER_SIZE];
        let r1 = sample(0x0501, b"head");
        let r2 = sample(0x0502, b"tail-bytes");
        let used = append_pair(&mut buf, 0, &r1, &r2);
        let row = row_at(&buf, 0);
        assert_eq!(row.op_code1(), 0x0501);
        assert_eq!(row.op_code2(), 0x0502);
        assert_eq!(row.data1(), b"head");
        assert_eq!(row.data2(), b"tail-bytes");
        assert_eq!(row.row_len(), used);
    }
}
