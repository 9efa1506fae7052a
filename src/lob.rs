//! Orphaned-LOB bookkeeping: the owned blob type and its lookup key.
//!
//! Grounded on `examples/original_source/src/common/LobData.h` /
//! `LobData.cpp`. `Lob` there is a move-only, manually `new[]`/`delete[]`-
//! managed byte buffer holding `[lobSize:u64][RedoLogRecord header][payload]`;
//! the Rust port keeps the same on-wire layout backed by a `Vec<u8>` so
//! move-only-ness falls out of ordinary ownership instead of a deleted copy
//! constructor.

use crate::ids::LobId;
use crate::redo_record::{RedoLogRecord, StoredHeader, REDO_HEADER_LEN};

/// Bytes of the length prefix at the head of a [`Lob`] blob.
pub const LOB_SIZE_PREFIX_LEN: usize = 8;

/// `(LOB-ID, DBA)` — the key `TransactionBuffer::addOrphanedLob` uses to
/// park a LOB fragment seen before its owning transaction is known.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct LobKey {
    pub lob_id: LobId,
    pub dba: u32,
}

impl LobKey {
    pub fn new(lob_id: LobId, dba: u32) -> Self {
        LobKey { lob_id, dba }
    }
}

/// An owned `[u64 totalSize][RedoLogRecord header][payload]` blob, the
/// allocation `TransactionBuffer::allocateLob` produces. Deliberately
/// carries no `Clone`: the original forbids copying so a LOB is never
/// duplicated into two maps.
#[derive(Debug)]
pub struct Lob {
    data: Vec<u8>,
}

impl Lob {
    /// Builds the blob the way `Lob(const RedoLogRecord*)` does: an 8-byte
    /// total-length prefix, the record's header re-encoded, then a copy of
    /// its payload.
    pub fn from_record(r: &RedoLogRecord) -> Self {
        let payload_len = r.data.len();
        let total = LOB_SIZE_PREFIX_LEN + REDO_HEADER_LEN + payload_len;
        let mut data = vec![0u8; total];
        data[0..LOB_SIZE_PREFIX_LEN].copy_from_slice(&(total as u64).to_le_bytes());
        r.encode_header(&mut data[LOB_SIZE_PREFIX_LEN..LOB_SIZE_PREFIX_LEN + REDO_HEADER_LEN]);
        data[LOB_SIZE_PREFIX_LEN + REDO_HEADER_LEN..].copy_from_slice(&r.data);
        Lob { data }
    }

    pub fn lob_size(&self) -> u64 {
        u64::from_le_bytes(self.data[0..LOB_SIZE_PREFIX_LEN].try_into().unwrap())
    }

    pub fn redo_log_record(&self) -> StoredHeader {
        RedoLogRecord::decode_header(
            &self.data[LOB_SIZE_PREFIX_LEN..LOB_SIZE_PREFIX_LEN + REDO_HEADER_LEN],
        )
    }

    pub fn lob_data(&self) -> &[u8] {
        &self.data[LOB_SIZE_PREFIX_LEN + REDO_HEADER_LEN..]
    }
}

/// `(dba, offset)` ordering key for multi-fragment LOB reassembly, as used
/// by `LobData::dataMap`. Not named in spec.md's Data Model (which only
/// specifies the single orphaned-LOB blob and its key) but present in
/// `LobData.h`; kept here as a supplementary, self-contained piece since it
/// enriches the LOB story without re-scoping any spec.md module.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct LobDataElement {
    pub dba: u32,
    pub offset: u32,
}

impl LobDataElement {
    pub fn new(dba: u32, offset: u32) -> Self {
        LobDataElement { dba, offset }
    }
}

/// Multi-page LOB reassembly index: fragments keyed by `(dba, offset)` plus
/// a secondary `page index -> dba` lookup, and the page-size accounting the
/// original's `LobData` carries (`pageSize`/`sizePages`/`sizeRest`).
#[derive(Default)]
pub struct LobPageIndex {
    pub data_map: std::collections::BTreeMap<LobDataElement, Lob>,
    pub index_map: std::collections::BTreeMap<u32, u32>,
    pub page_size: u32,
    pub size_pages: u32,
    pub size_rest: u16,
}

impl LobPageIndex {
    pub fn new(page_size: u32) -> Self {
        LobPageIndex {
            page_size,
            ..Default::default()
        }
    }

    /// Inserts one fragment and records its page index, the way the
    /// original's opcode processors populate `dataMap`/`indexMap` in
    /// lockstep as fragments arrive (in any order).
    pub fn insert(&mut self, dba: u32, offset: u32, page_idx: u32, lob: Lob) {
        self.data_map.insert(LobDataElement::new(dba, offset), lob);
        self.index_map.insert(page_idx, dba);
    }

    pub fn is_complete(&self) -> bool {
        self.size_pages > 0 && self.index_map.len() as u32 >= self.size_pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn sample_record(payload: &[u8]) -> RedoLogRecord {
        RedoLogRecord {
            op_code: 0x1a02,
            flg: 0,
            scn: 42,
            sub_scn: 0,
            dba: 0x1000,
            data_offset: 0,
            lob_id: LobId::from_bytes([1, 2, 3, 4, 5, 6, 7, 8, 9, 10]),
            field_cnt: 0,
            field_pos: 0,
            field_sizes_delta: 0,
            data: Bytes::copy_from_slice(payload),
        }
    }

    #[test]
    fn round_trips_header_and_payload() {
        let r = sample_record(b"lob-fragment-bytes");
        let lob = Lob::from_record(&r);
        assert_eq!(
            lob.lob_size(),
            (LOB_SIZE_PREFIX_LEN + REDO_HEADER_LEN + r.data.len()) as u64
        );
        assert_eq!(lob.lob_data(), b"lob-fragment-bytes");
        assert_eq!(lob.redo_log_record().dba, 0x1000);
        assert_eq!(lob.redo_log_record().scn, 42);
    }

    #[test]
    fn lob_key_orders_by_id_then_dba() {
        let id_a = LobId::from_bytes([0; 10]);
        let mut id_b_bytes = [0u8; 10];
        id_b_bytes[9] = 1;
        let id_b = LobId::from_bytes(id_b_bytes);
        assert!(LobKey::new(id_a, 5) < LobKey::new(id_b, 0));
        assert!(LobKey::new(id_a, 5) < LobKey::new(id_a, 6));
    }

    #[test]
    fn page_index_completes_once_all_pages_seen() {
        let mut idx = LobPageIndex::new(8192);
        idx.size_pages = 2;
        idx.insert(1, 0, 0, Lob::from_record(&sample_record(b"a")));
        assert!(!idx.is_complete());
        idx.insert(2, 0, 1, Lob::from_record(&sample_record(b"b")));
        assert!(idx.is_complete());
    }
}
