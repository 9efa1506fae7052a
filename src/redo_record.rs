//! The redo/undo record value type and its fixed-width header encoding.
//!
//! `RedoLogRecord` is the unit of data the opcode-processing collaborator
//! hands to `TransactionBuffer::add_chunk`. Its header fields are encoded
//! with a fixed byte layout when stored inline in a `TransactionChunk`
//! row, so that `mergeBlocks`-equivalent logic can patch specific header
//! fields (`field_pos`, `field_cnt`, `flg`, `size`) by byte offset without
//! re-decoding the whole record — the same trick
//! `examples/original_source/src/parser/TransactionBuffer.cpp`'s
//! `mergeBlocks` relies on.

use std::io::Write;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;

use crate::ids::LobId;

/// Multi-block undo split markers. Not standardized anywhere in the
/// distilled spec; these are local bit assignments the core needs to be
/// internally consistent, not a reproduction of Oracle's real redo flag
/// byte values (those live in the out-of-scope opcode processor).
pub const FLG_MULTIBLOCKUNDOHEAD: u16 = 0x0001;
pub const FLG_MULTIBLOCKUNDOTAIL: u16 = 0x0002;
pub const FLG_MULTIBLOCKUNDOMID: u16 = 0x0004;
pub const FLG_LASTBUFFERSPLIT: u16 = 0x0008;

/// Opcode carried by a split undo HEAD record continuing a prior chunk;
/// `TransactionBuffer::add_chunk`'s two-record merge path only applies to
/// this opcode.
pub const OP_CODE_UNDO: u16 = 0x0501;

/// Encoded size of one record header inside a `TransactionChunk` row.
pub const REDO_HEADER_LEN: usize = 44;

/// One redo or undo log record, as handed to the core by the (external)
/// opcode processor.
#[derive(Clone)]
pub struct RedoLogRecord {
    pub op_code: u16,
    pub flg: u16,
    pub scn: u64,
    pub sub_scn: u16,
    pub dba: u32,
    pub data_offset: u64,
    pub lob_id: LobId,
    pub field_cnt: u16,
    pub field_pos: u16,
    pub field_sizes_delta: u16,
    pub data: Bytes,
}

impl RedoLogRecord {
    pub fn size(&self) -> u16 {
        self.data.len() as u16
    }

    /// Reads the field-size sub-table entry at `idx`, using the context's
    /// byte order since this sub-table is opaque payload straight from the
    /// log file.
    pub fn field_size(&self, ctx: &dyn crate::ctx::Ctx, idx: u16) -> u16 {
        let off = self.field_sizes_delta as usize + idx as usize * 2;
        ctx.read16(&self.data[off..off + 2])
    }

    pub(crate) fn encode_header(&self, out: &mut [u8]) {
        debug_assert!(out.len() >= REDO_HEADER_LEN);
        let mut w = out;
        w.write_u16::<LittleEndian>(self.size()).unwrap();
        w.write_u16::<LittleEndian>(self.field_cnt).unwrap();
        w.write_u16::<LittleEndian>(self.field_pos).unwrap();
        w.write_u16::<LittleEndian>(self.field_sizes_delta).unwrap();
        w.write_u16::<LittleEndian>(self.flg).unwrap();
        w.write_u16::<LittleEndian>(self.op_code).unwrap();
        w.write_u64::<LittleEndian>(self.scn).unwrap();
        w.write_u16::<LittleEndian>(self.sub_scn).unwrap();
        w.write_u32::<LittleEndian>(self.dba).unwrap();
        w.write_u64::<LittleEndian>(self.data_offset).unwrap();
        w.write_all(&self.lob_id.0).unwrap();
    }

    pub(crate) fn decode_header(input: &[u8]) -> StoredHeader {
        debug_assert!(input.len() >= REDO_HEADER_LEN);
        let mut r = input;
        let size = r.read_u16::<LittleEndian>().unwrap();
        let field_cnt = r.read_u16::<LittleEndian>().unwrap();
        let field_pos = r.read_u16::<LittleEndian>().unwrap();
        let field_sizes_delta = r.read_u16::<LittleEndian>().unwrap();
        let flg = r.read_u16::<LittleEndian>().unwrap();
        let op_code = r.read_u16::<LittleEndian>().unwrap();
        let scn = r.read_u64::<LittleEndian>().unwrap();
        let sub_scn = r.read_u16::<LittleEndian>().unwrap();
        let dba = r.read_u32::<LittleEndian>().unwrap();
        let data_offset = r.read_u64::<LittleEndian>().unwrap();
        let mut lob_id = [0u8; 10];
        std::io::Read::read_exact(&mut r, &mut lob_id).unwrap();
        StoredHeader {
            size,
            field_cnt,
            field_pos,
            field_sizes_delta,
            flg,
            op_code,
            scn,
            sub_scn,
            dba,
            data_offset,
            lob_id: LobId(lob_id),
        }
    }
}

/// A record header as decoded back out of a `TransactionChunk` row. Kept
/// distinct from `RedoLogRecord` because it has no owned `data` — the
/// payload bytes stay in place inside the row buffer.
#[derive(Clone, Copy, Debug)]
pub struct StoredHeader {
    pub size: u16,
    pub field_cnt: u16,
    pub field_pos: u16,
    pub field_sizes_delta: u16,
    pub flg: u16,
    pub op_code: u16,
    pub scn: u64,
    pub sub_scn: u16,
    pub dba: u32,
    pub data_offset: u64,
    pub lob_id: LobId,
}

/// Writes a field-size sub-table entry using the configured byte order,
/// the exact move `mergeBlocks` performs when folding a split field back
/// together.
pub fn patch_field_size(ctx: &dyn crate::ctx::Ctx, row_data: &mut [u8], delta: u16, idx: u16, value: u16) {
    let off = delta as usize + idx as usize * 2;
    ctx.write16(&mut row_data[off..off + 2], value);
}

pub fn read_field_size(ctx: &dyn crate::ctx::Ctx, row_data: &[u8], delta: u16, idx: u16) -> u16 {
    let off = delta as usize + idx as usize * 2;
    ctx.read16(&row_data[off..off + 2])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(op_code: u16, data: &[u8]) -> RedoLogRecord {
        RedoLogRecord {
            op_code,
            flg: 0,
            scn: 0x1122_3344_5566_7788,
            sub_scn: 7,
            dba: 0xdead_beef,
            data_offset: 42,
            lob_id: LobId::default(),
            field_cnt: 3,
            field_pos: 12,
            field_sizes_delta: 0,
            data: Bytes::copy_from_slice(data),
        }
    }

    #[test]
    fn header_round_trips() {
        let r = sample(0x0501, b"hello world");
        let mut buf = [0u8; REDO_HEADER_LEN];
        r.encode_header(&mut buf);
        let decoded = RedoLogRecord::decode_header(&buf);
        assert_eq!(decoded.op_code, r.op_code);
        assert_eq!(decoded.scn, r.scn);
        assert_eq!(decoded.sub_scn, r.sub_scn);
        assert_eq!(decoded.dba, r.dba);
        assert_eq!(decoded.data_offset, r.data_offset);
        assert_eq!(decoded.size, r.size());
        assert_eq!(decoded.field_cnt, r.field_cnt);
        assert_eq!(decoded.field_pos, r.field_pos);
    }
}
