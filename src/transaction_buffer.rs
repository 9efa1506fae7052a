//! Owns chunk sub-allocation, the XID→Transaction map, orphaned-LOB
//! parking, multi-block undo merge, and checkpoint scan.
//!
//! Grounded on `examples/original_source/src/parser/TransactionBuffer.h`/
//! `.cpp` and `Transaction.h` (fields only; the class itself wasn't
//! retrieved, so `Transaction` here is reconstructed from spec.md §3's
//! description plus the fields `TransactionBuffer.cpp` actually reads).
//!
//! The original guards `xidTransactionMap` inserts/erases with `mtx` but
//! reads it unsynchronized, relying on a single-writer/single-reader
//! discipline it never enforces in the type system (spec.md §9's open
//! question). This port resolves that the safe way spec.md allows: one
//! `parking_lot::Mutex` guards all mutable state, so every accessor —
//! lookup included — takes the lock. Given the mutex is uncontended outside
//! rare checkpoint-thread reads, this costs nothing observable and removes
//! an entire class of soundness bugs the C++ accepts by convention only.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::ctx::{Ctx, ModuleTag, TraceFlag};
use crate::error::{Error, Result};
use crate::ids::{xid_map_key, Xid, XidMapKey};
use crate::lob::{Lob, LobKey};
use crate::redo_record::{
    self, RedoLogRecord, FLG_LASTBUFFERSPLIT, FLG_MULTIBLOCKUNDOHEAD, FLG_MULTIBLOCKUNDOMID,
    FLG_MULTIBLOCKUNDOTAIL, OP_CODE_UNDO,
};
use crate::transaction_chunk::{
    self, RecordRowRef, TransactionChunkMeta, TxChunkId, DATA_BUFFER_SIZE, FULL_BUFFER_SIZE,
};

/// Slots per pool chunk: a `MEMORY_CHUNK_SIZE` (1 MiB) chunk divided into
/// sixteen fixed 64 KiB `TransactionChunk` slots.
pub const BUFFERS_PER_CHUNK: usize = 16;
/// All-free sentinel for a chunk's slot bitmap (`BUFFERS_FREE_MASK`).
pub const BUFFERS_FREE_MASK: u16 = 0xFFFF;

/// Hook for the opcode-specific re-processing `addTransactionChunk`'s
/// split-HEAD path re-runs after `mergeBlocks` (`OpCode0501::process0501`
/// in the original). Deliberately out of scope per spec.md §1; callers
/// that don't care about 0x0501 semantics can pass `None`.
pub trait Opcode0501Hook: Send + Sync {
    fn process_0501(&self, ctx: &dyn Ctx, record: &mut RedoLogRecord);
}

/// One in-flight transaction: its XID, the doubly-linked chain of
/// `TransactionChunk` slots holding its records, and the bookkeeping
/// `checkpoint`/`addTransactionChunk` need.
pub struct Transaction {
    pub xid: Xid,
    pub first_tc: Option<TxChunkId>,
    pub last_tc: Option<TxChunkId>,
    pub size: u64,
    pub first_sequence: u32,
    pub first_offset: u64,
    pub last_split: bool,
    pub dump: bool,
}

impl Transaction {
    fn new(xid: Xid) -> Self {
        Transaction {
            xid,
            first_tc: None,
            last_tc: None,
            size: 0,
            first_sequence: u32::MAX,
            first_offset: 0,
            last_split: false,
            dump: false,
        }
    }
}

struct PoolChunkEntry {
    chunk: crate::chunk_pool::PoolChunk,
}

struct Inner {
    pool_chunks: HashMap<u64, PoolChunkEntry>,
    next_pool_id: u64,
    /// Chunk id -> free-slot bitmap (bit set = free), for chunks with at
    /// least one free slot. A `BTreeMap` so "pick a partially-full chunk"
    /// is deterministic (lowest id first) rather than the original's
    /// "whatever `cbegin()` of an `unordered_map` happens to yield" — see
    /// SPEC_FULL.md §3 for why this strengthening is safe.
    partially_full: BTreeMap<u64, u16>,
    tx_chunks: HashMap<TxChunkId, TransactionChunkMeta>,
    xid_map: HashMap<XidMapKey, Transaction>,
    orphaned_lobs: BTreeMap<LobKey, Lob>,
    skip_xid_list: HashSet<Xid>,
    dump_xid_list: HashSet<Xid>,
    broken_xid_map_list: HashSet<XidMapKey>,
}

/// Owns the sub-allocated chunk pool backing every live transaction, the
/// XID→Transaction index, and the orphaned-LOB map.
pub struct TransactionBuffer {
    ctx: Arc<dyn Ctx>,
    opcode_0501: Option<Arc<dyn Opcode0501Hook>>,
    inner: parking_lot::Mutex<Inner>,
}

impl TransactionBuffer {
    pub fn new(ctx: Arc<dyn Ctx>) -> Self {
        TransactionBuffer::with_opcode_hook(ctx, None)
    }

    pub fn with_opcode_hook(
        ctx: Arc<dyn Ctx>,
        opcode_0501: Option<Arc<dyn Opcode0501Hook>>,
    ) -> Self {
        TransactionBuffer {
            ctx,
            opcode_0501,
            inner: parking_lot::Mutex::new(Inner {
                pool_chunks: HashMap::new(),
                next_pool_id: 0,
                partially_full: BTreeMap::new(),
                tx_chunks: HashMap::new(),
                xid_map: HashMap::new(),
                orphaned_lobs: BTreeMap::new(),
                skip_xid_list: HashSet::new(),
                dump_xid_list: HashSet::new(),
                broken_xid_map_list: HashSet::new(),
            }),
        }
    }

    pub fn mark_for_dump(&self, xid: Xid) {
        self.inner.lock().dump_xid_list.insert(xid);
    }

    pub fn mark_skip(&self, xid: Xid) {
        self.inner.lock().skip_xid_list.insert(xid);
    }

    pub fn is_skipped(&self, xid: Xid) -> bool {
        self.inner.lock().skip_xid_list.contains(&xid)
    }

    pub fn mark_broken(&self, xid: Xid, con_id: i16) {
        self.inner
            .lock()
            .broken_xid_map_list
            .insert(xid_map_key(xid, con_id));
    }

    pub fn is_broken(&self, xid: Xid, con_id: i16) -> bool {
        self.inner
            .lock()
            .broken_xid_map_list
            .contains(&xid_map_key(xid, con_id))
    }

    /// Drops every live transaction's chunk chain without requiring the
    /// caller to drop transactions one at a time first; mirrors
    /// `TransactionBuffer::purge()`.
    pub fn purge(&self) {
        let mut inner = self.inner.lock();
        let ids: Vec<TxChunkId> = inner
            .xid_map
            .drain()
            .flat_map(|(_, tx)| tx_chunk_chain(&inner, &tx))
            .collect();
        for id in ids {
            delete_transaction_chunk(&mut inner, &self.ctx, id);
        }
    }

    /// `findTransaction`: returns the transaction stored under
    /// `(conId, xid.usn, xid.slt)`, creating it when absent and `add`.
    /// Raises [`Error::ConflictingXid`] when a live transaction occupies
    /// the same slot under a different `xid` and this isn't a rollback.
    pub fn find_transaction(
        &self,
        xid: Xid,
        con_id: i16,
        old: bool,
        add: bool,
        rollback: bool,
    ) -> Result<Option<Xid>> {
        let key = xid_map_key(xid, con_id);
        let mut inner = self.inner.lock();
        if let Some(tx) = inner.xid_map.get(&key) {
            if !rollback && (!old || tx.xid != xid) {
                return Err(Error::ConflictingXid {
                    xid: xid.to_string(),
                    other: tx.xid.to_string(),
                });
            }
            return Ok(Some(tx.xid));
        }
        if !add {
            return Ok(None);
        }
        let dump = inner.dump_xid_list.contains(&xid);
        let mut tx = Transaction::new(xid);
        tx.dump = dump;
        inner.xid_map.insert(key, tx);
        Ok(Some(xid))
    }

    pub fn drop_transaction(&self, xid: Xid, con_id: i16) {
        let key = xid_map_key(xid, con_id);
        self.inner.lock().xid_map.remove(&key);
    }

    /// Appends a single, non-split record to `xid`'s chunk chain. The
    /// transaction must already exist (created via
    /// `find_transaction(.., add = true)`); the original's
    /// `addTransactionChunk` takes an already-resolved `Transaction*`; this
    /// port takes `xid` instead and re-resolves it, so it must reject an
    /// unresolved one explicitly rather than silently leak an unlinked
    /// chunk.
    pub fn add_chunk(&self, xid: Xid, con_id: i16, r1: &RedoLogRecord) -> Result<()> {
        let key = xid_map_key(xid, con_id);
        let mut inner = self.inner.lock();
        if !inner.xid_map.contains_key(&key) {
            return Err(Error::UnknownTransaction { xid: xid.to_string() });
        }
        let chunk_size = r1.data.len() + transaction_chunk::ROW_HEADER_TOTAL;
        if chunk_size > DATA_BUFFER_SIZE {
            return Err(Error::ChunkOverflow {
                size: chunk_size,
                max: DATA_BUFFER_SIZE,
            });
        }

        let last_split = inner
            .xid_map
            .get(&key)
            .map(|t| t.last_split)
            .unwrap_or(false);
        if last_split {
            if r1.flg & FLG_MULTIBLOCKUNDOMID == 0 {
                return Err(Error::BadSplit {
                    data_offset: r1.data_offset,
                    xid: xid.to_string(),
                });
            }
            let mut r1_owned = r1.clone();
            let merged = merge_with_last(&mut inner, &self.ctx, key, &mut r1_owned)?;
            r1_owned.data = bytes::Bytes::from(merged);
            rollback_transaction_chunk(&mut inner, &self.ctx, key)?;
            if let Some(tx) = inner.xid_map.get_mut(&key) {
                tx.last_split = r1_owned.flg & (FLG_MULTIBLOCKUNDOTAIL | FLG_MULTIBLOCKUNDOMID) != 0;
            }
            append_row(&mut inner, &self.ctx, key, &r1_owned, None)?;
            return Ok(());
        }

        if let Some(tx) = inner.xid_map.get_mut(&key) {
            tx.last_split = r1.flg & (FLG_MULTIBLOCKUNDOTAIL | FLG_MULTIBLOCKUNDOMID) != 0;
        }
        append_row(&mut inner, &self.ctx, key, r1, None)?;
        Ok(())
    }

    /// Appends a merged pair — the split-HEAD continuation path — to
    /// `xid`'s chunk chain.
    pub fn add_chunk_pair(
        &self,
        xid: Xid,
        con_id: i16,
        r1: &mut RedoLogRecord,
        r2: &RedoLogRecord,
    ) -> Result<()> {
        let key = xid_map_key(xid, con_id);
        let mut inner = self.inner.lock();
        if !inner.xid_map.contains_key(&key) {
            return Err(Error::UnknownTransaction { xid: xid.to_string() });
        }
        let chunk_size = r1.data.len() + r2.data.len() + transaction_chunk::ROW_HEADER_TOTAL;
        if chunk_size > DATA_BUFFER_SIZE {
            return Err(Error::ChunkOverflow {
                size: chunk_size,
                max: DATA_BUFFER_SIZE,
            });
        }

        let last_split = inner
            .xid_map
            .get(&key)
            .map(|t| t.last_split)
            .unwrap_or(false);
        if last_split {
            if r1.op_code != OP_CODE_UNDO {
                return Err(Error::SplitNot0501 {
                    data_offset: r1.data_offset,
                });
            }
            if r1.flg & FLG_MULTIBLOCKUNDOHEAD == 0 {
                return Err(Error::BadSplit2 {
                    data_offset: r1.data_offset,
                    xid: xid.to_string(),
                });
            }
            let merged = merge_with_last(&mut inner, &self.ctx, key, r1)?;
            r1.data = bytes::Bytes::from(merged);

            let field_size =
                redo_record::read_field_size(&*self.ctx, &r1.data, r1.field_sizes_delta, 1);
            let field_pos = r1.field_pos as usize + align4(field_size as usize);
            if field_pos + 22 <= r1.data.len() {
                let mut patched = r1.data.to_vec();
                self.ctx
                    .write16(&mut patched[field_pos + 20..field_pos + 22], r1.flg);
                r1.data = bytes::Bytes::from(patched);
            }
            if let Some(hook) = &self.opcode_0501 {
                hook.process_0501(&*self.ctx, r1);
            }

            rollback_transaction_chunk(&mut inner, &self.ctx, key)?;
            if let Some(tx) = inner.xid_map.get_mut(&key) {
                tx.last_split = false;
            }
        }

        append_row(&mut inner, &self.ctx, key, r1, Some(r2))?;
        Ok(())
    }

    pub fn rollback_transaction_chunk(&self, xid: Xid, con_id: i16) -> Result<()> {
        let key = xid_map_key(xid, con_id);
        let mut inner = self.inner.lock();
        rollback_transaction_chunk(&mut inner, &self.ctx, key)
    }

    /// `checkpoint`: the `(firstSequence, firstOffset, xid)` triple with
    /// the smallest `(firstSequence, firstOffset)` among live transactions.
    pub fn checkpoint(&self) -> Option<(u32, u64, Xid)> {
        let inner = self.inner.lock();
        let mut best: Option<(u32, u64, Xid)> = None;
        for tx in inner.xid_map.values() {
            let better = match best {
                None => true,
                Some((seq, off, _)) => {
                    tx.first_sequence < seq || (tx.first_sequence == seq && tx.first_offset < off)
                }
            };
            if better {
                best = Some((tx.first_sequence, tx.first_offset, tx.xid));
            }
        }
        best
    }

    pub fn add_orphaned_lob(&self, r: &RedoLogRecord) {
        self.ctx.trace(
            TraceFlag::Lob,
            &format!(
                "id: {} page: {} can't match, offset: {}",
                r.lob_id.upper(),
                r.dba,
                r.data_offset
            ),
        );
        let key = LobKey::new(r.lob_id, r.dba);
        let mut inner = self.inner.lock();
        if inner.orphaned_lobs.contains_key(&key) {
            self.ctx.warning(
                60009,
                &format!(
                    "duplicate orphaned lob: {}, page: {}",
                    r.lob_id.lower(),
                    r.dba
                ),
            );
            return;
        }
        inner.orphaned_lobs.insert(key, Lob::from_record(r));
    }

    pub fn orphaned_lob_count(&self) -> usize {
        self.inner.lock().orphaned_lobs.len()
    }

    pub fn transaction_count(&self) -> usize {
        self.inner.lock().xid_map.len()
    }

    /// `P2`: total size recorded against the transaction equals the sum of
    /// its chunks' `size` fields. Exposed for tests, not used by the core.
    pub fn transaction_size(&self, xid: Xid, con_id: i16) -> Option<u64> {
        let key = xid_map_key(xid, con_id);
        self.inner.lock().xid_map.get(&key).map(|t| t.size)
    }

    pub fn transaction_element_count(&self, xid: Xid, con_id: i16) -> Option<u64> {
        let key = xid_map_key(xid, con_id);
        let inner = self.inner.lock();
        let tx = inner.xid_map.get(&key)?;
        let mut total = 0u64;
        let mut cur = tx.first_tc;
        while let Some(id) = cur {
            total += inner.tx_chunks[&id].elements as u64;
            cur = inner.tx_chunks[&id].next;
        }
        Some(total)
    }
}

impl Drop for TransactionBuffer {
    fn drop(&mut self) {
        let inner = self.inner.lock();
        if !inner.partially_full.is_empty() {
            self.ctx.error(
                50062,
                &format!(
                    "non-free blocks in transaction buffer: {}",
                    inner.partially_full.len()
                ),
            );
        }
    }
}

fn tx_chunk_chain(inner: &Inner, tx: &Transaction) -> Vec<TxChunkId> {
    let mut out = Vec::new();
    let mut cur = tx.first_tc;
    while let Some(id) = cur {
        out.push(id);
        cur = inner.tx_chunks.get(&id).and_then(|m| m.next);
    }
    out
}

fn align4(x: usize) -> usize {
    (x + 3) & !3
}

/// Round `x` down to the nearest multiple of 4 (`& 0xFFFC` in the
/// original), as opposed to [`align4`]'s round-up. `mergeBlocks`'s first
/// `pos` advance (past the new field-size sub-table) uses this rounding;
/// its other two advances (past each record's payload tail) round up.
fn align4_down(x: usize) -> usize {
    x & !3
}

fn slot_bytes<'a>(inner: &'a mut Inner, id: TxChunkId) -> &'a mut [u8] {
    let entry = inner
        .pool_chunks
        .get_mut(&id.pool_chunk)
        .expect("pool chunk for TxChunkId must be live");
    let start = id.slot as usize * FULL_BUFFER_SIZE;
    &mut entry.chunk.as_mut_slice()[start..start + DATA_BUFFER_SIZE]
}

fn slot_bytes_ref<'a>(inner: &'a Inner, id: TxChunkId) -> &'a [u8] {
    let entry = &inner.pool_chunks[&id.pool_chunk];
    let start = id.slot as usize * FULL_BUFFER_SIZE;
    &entry.chunk.as_slice()[start..start + DATA_BUFFER_SIZE]
}

/// `newTransactionChunk`.
fn new_transaction_chunk(inner: &mut Inner, ctx: &Arc<dyn Ctx>) -> Result<TxChunkId> {
    let (pool_chunk_id, slot) =
        if let Some((&chunk_id, &bitmap)) = inner.partially_full.iter().next() {
            let slot = bitmap.trailing_zeros() as u8;
            let new_bitmap = bitmap & !(1u16 << slot);
            if new_bitmap == 0 {
                inner.partially_full.remove(&chunk_id);
            } else {
                inner.partially_full.insert(chunk_id, new_bitmap);
            }
            (chunk_id, slot)
        } else {
            let raw = ctx.get_memory_chunk(ModuleTag::TransactionBuffer, false)?;
            let chunk_id = inner.next_pool_id;
            inner.next_pool_id += 1;
            inner
                .pool_chunks
                .insert(chunk_id, PoolChunkEntry { chunk: raw });
            inner.partially_full.insert(chunk_id, BUFFERS_FREE_MASK & !1);
            (chunk_id, 0u8)
        };

    let id = TxChunkId {
        pool_chunk: pool_chunk_id,
        slot,
    };
    inner.tx_chunks.insert(id, TransactionChunkMeta::default());
    Ok(id)
}

/// `deleteTransactionChunk`.
fn delete_transaction_chunk(inner: &mut Inner, ctx: &Arc<dyn Ctx>, id: TxChunkId) {
    inner.tx_chunks.remove(&id);
    let bitmap = inner
        .partially_full
        .get(&id.pool_chunk)
        .copied()
        .unwrap_or(0);
    let new_bitmap = bitmap | (1u16 << id.slot);
    if new_bitmap == BUFFERS_FREE_MASK {
        if let Some(entry) = inner.pool_chunks.remove(&id.pool_chunk) {
            ctx.free_memory_chunk(ModuleTag::TransactionBuffer, entry.chunk);
        }
        inner.partially_full.remove(&id.pool_chunk);
    } else {
        inner.partially_full.insert(id.pool_chunk, new_bitmap);
    }
}

/// Reads the previously stored "last501" record out of the transaction's
/// last chunk and runs `mergeBlocks` against it, returning the merged
/// bytes. Leaves the stale trailing record in place; the caller rolls it
/// back afterwards, matching the original's merge-then-rollback order.
fn merge_with_last(
    inner: &mut Inner,
    ctx: &Arc<dyn Ctx>,
    key: XidMapKey,
    r1: &mut RedoLogRecord,
) -> Result<Vec<u8>> {
    let last_tc = inner
        .xid_map
        .get(&key)
        .and_then(|t| t.last_tc)
        .ok_or(Error::EmptyRollback {
            size: None,
            elements: None,
        })?;
    let buf = slot_bytes_ref(inner, last_tc);
    let used = inner.tx_chunks[&last_tc].size as usize;
    let row_len = last_row_len(buf, used);
    let row = transaction_chunk::row_at(buf, used - row_len);
    let last501 = build_record_from_row(&row);

    Ok(merge_blocks(&**ctx, r1, &last501))
}

fn last_row_len(buf: &[u8], used: usize) -> usize {
    let tail = u64::from_le_bytes(buf[used - 8..used].try_into().unwrap());
    tail as usize
}

fn build_record_from_row(row: &RecordRowRef<'_>) -> RedoLogRecord {
    let h = row.redo1();
    RedoLogRecord {
        op_code: h.op_code,
        flg: h.flg,
        scn: h.scn,
        sub_scn: h.sub_scn,
        dba: h.dba,
        data_offset: h.data_offset,
        lob_id: h.lob_id,
        field_cnt: h.field_cnt,
        field_pos: h.field_pos,
        field_sizes_delta: h.field_sizes_delta,
        data: bytes::Bytes::copy_from_slice(row.data1()),
    }
}

/// `mergeBlocks`: byte-exact fold of a split undo HEAD/TAIL pair.
///
/// `r2`'s field-size table is never mutated in place (unlike the original,
/// which patches `redoLogRecord2->data()` through a `const` pointer): the
/// `FLG_LASTBUFFERSPLIT` patch to `r2.fieldSize[2]` is applied to a local
/// copy that's used only as the copy source for the merged table, which is
/// observationally identical since the original never reads that patched
/// byte from `r2` again afterwards.
pub fn merge_blocks(ctx: &dyn Ctx, r1: &mut RedoLogRecord, r2: &RedoLogRecord) -> Vec<u8> {
    let mut merge_buffer = vec![0u8; r1.data.len() + r2.data.len() + 16];
    let mut pos = r1.field_sizes_delta as usize;
    merge_buffer[0..pos].copy_from_slice(&r1.data[0..pos]);

    let mut r1_field_cnt = r1.field_cnt;
    let mut r1_flg = r1.flg;

    let r2_sizes_len = r2.field_cnt as usize * 2;
    let r2_sizes_start = r2.field_sizes_delta as usize + 2;
    let mut r2_sizes: Vec<u8> = r2.data[r2_sizes_start..r2_sizes_start + r2_sizes_len].to_vec();

    if r1_flg & FLG_LASTBUFFERSPLIT != 0 {
        r1_flg &= !FLG_LASTBUFFERSPLIT;
        let last_off = r1.field_sizes_delta as usize + r1_field_cnt as usize * 2;
        let size1 = ctx.read16(&r1.data[last_off..last_off + 2]);
        let size2 = ctx.read16(&r2_sizes[4..6]);
        ctx.write16(&mut r2_sizes[4..6], size1 + size2);
        r1_field_cnt -= 1;
    }

    let field_cnt = r1_field_cnt + r2.field_cnt - 2;
    ctx.write16(&mut merge_buffer[pos..pos + 2], field_cnt);

    let r1_sizes_src = r1.field_sizes_delta as usize + 2;
    let r1_sizes_len = r1_field_cnt as usize * 2;
    merge_buffer[pos + 2..pos + 2 + r1_sizes_len]
        .copy_from_slice(&r1.data[r1_sizes_src..r1_sizes_src + r1_sizes_len]);

    let copy_len = r2.field_cnt as usize * 2 - 4;
    merge_buffer[pos + 2 + r1_sizes_len..pos + 2 + r1_sizes_len + copy_len]
        .copy_from_slice(&r2_sizes[4..4 + copy_len]);

    pos += align4_down(((field_cnt as usize + 1) * 2) + 2);
    let field_pos1 = pos as u16;

    let tail1 = &r1.data[r1.field_pos as usize..r1.data.len()];
    merge_buffer[pos..pos + tail1.len()].copy_from_slice(tail1);
    pos += align4(tail1.len());

    let field_pos2 = r2.field_pos as usize
        + align4(
            ctx.read16(
                &r2.data[r2.field_sizes_delta as usize + 2..r2.field_sizes_delta as usize + 4],
            ) as usize,
        )
        + align4(
            ctx.read16(
                &r2.data[r2.field_sizes_delta as usize + 4..r2.field_sizes_delta as usize + 6],
            ) as usize,
        );
    let tail2 = &r2.data[field_pos2..r2.data.len()];
    merge_buffer[pos..pos + tail2.len()].copy_from_slice(tail2);
    pos += align4(tail2.len());

    merge_buffer.truncate(pos);

    r1.field_cnt = field_cnt;
    r1.field_pos = field_pos1;
    r1.flg = r1_flg | r2.flg;
    if r1.flg & FLG_MULTIBLOCKUNDOTAIL != 0 {
        r1.flg &= !(FLG_MULTIBLOCKUNDOHEAD | FLG_MULTIBLOCKUNDOMID | FLG_MULTIBLOCKUNDOTAIL);
    }
    merge_buffer
}

fn append_row(
    inner: &mut Inner,
    ctx: &Arc<dyn Ctx>,
    key: XidMapKey,
    r1: &RedoLogRecord,
    r2: Option<&RedoLogRecord>,
) -> Result<()> {
    let chunk_size = transaction_chunk::row_size(r1, r2);

    let last_tc = inner.xid_map.get(&key).and_then(|t| t.last_tc);
    let tc_id = match last_tc {
        None => {
            let id = new_transaction_chunk(inner, ctx)?;
            if let Some(tx) = inner.xid_map.get_mut(&key) {
                tx.first_tc = Some(id);
                tx.last_tc = Some(id);
            }
            id
        }
        Some(id) => {
            let used = inner.tx_chunks[&id].size as usize;
            if used + chunk_size > DATA_BUFFER_SIZE {
                let new_id = new_transaction_chunk(inner, ctx)?;
                inner.tx_chunks.get_mut(&id).unwrap().next = Some(new_id);
                inner.tx_chunks.get_mut(&new_id).unwrap().prev = Some(id);
                if let Some(tx) = inner.xid_map.get_mut(&key) {
                    tx.last_tc = Some(new_id);
                }
                new_id
            } else {
                id
            }
        }
    };

    let used = inner.tx_chunks[&tc_id].size as usize;
    let buf = slot_bytes(inner, tc_id);
    let new_used = match r2 {
        Some(r2) => transaction_chunk::append_pair(buf, used, r1, r2),
        None => transaction_chunk::append_single(buf, used, r1),
    };
    let meta = inner.tx_chunks.get_mut(&tc_id).unwrap();
    meta.size = new_used as u32;
    meta.elements += 1;
    if let Some(tx) = inner.xid_map.get_mut(&key) {
        tx.size += chunk_size as u64;
    }
    Ok(())
}

/// `rollbackTransactionChunk`.
fn rollback_transaction_chunk(inner: &mut Inner, ctx: &Arc<dyn Ctx>, key: XidMapKey) -> Result<()> {
    let last_tc = inner
        .xid_map
        .get(&key)
        .and_then(|t| t.last_tc)
        .ok_or(Error::EmptyRollback {
            size: None,
            elements: None,
        })?;
    let meta = inner.tx_chunks[&last_tc];
    if (meta.size as usize) < transaction_chunk::ROW_HEADER_TOTAL || meta.elements == 0 {
        return Err(Error::EmptyRollback {
            size: Some(meta.size as u64),
            elements: Some(meta.elements as u64),
        });
    }

    let buf = slot_bytes_ref(inner, last_tc);
    let used = meta.size as usize;
    let row_len = last_row_len(buf, used);

    let meta = inner.tx_chunks.get_mut(&last_tc).unwrap();
    meta.size -= row_len as u32;
    meta.elements -= 1;
    let elements_now = meta.elements;
    if let Some(tx) = inner.xid_map.get_mut(&key) {
        tx.size -= row_len as u64;
    }

    if elements_now == 0 {
        let prev = inner.tx_chunks[&last_tc].prev;
        if let Some(tx) = inner.xid_map.get_mut(&key) {
            tx.last_tc = prev;
        }
        if let Some(prev_id) = prev {
            inner.tx_chunks.get_mut(&prev_id).unwrap().next = None;
        } else if let Some(tx) = inner.xid_map.get_mut(&key) {
            tx.first_tc = None;
        }
        delete_transaction_chunk(inner, ctx, last_tc);
    }
    Ok(())
}
