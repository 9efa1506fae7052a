//! The output staging chain shared between the builder (producer) thread
//! and the writer (consumer) thread.
//!
//! Grounded on `examples/original_source/src/builder/BuilderBuffer.h`/
//! `.cpp`. The original keeps `BuilderChunkHeader` nodes linked by a raw
//! `std::atomic<BuilderChunkHeader*> next` so the consumer can walk the
//! chain without taking `mtx`; Rust has no safe way to publish a raw
//! pointer across threads without `unsafe`, and the teacher workspace
//! (`pageserver::page_cache`) never reaches for `unsafe` to solve this
//! class of problem either. This port keeps the chain itself — and the
//! chunk payload bytes — behind one short-lived `parking_lot::Mutex`
//! (`state`), while `size`/`start` stay true `AtomicU64` fields so a
//! caller that already holds a chunk can poll progress without the lock,
//! preserving the release/acquire ordering story from spec.md §9 for the
//! fields that actually need it. See DESIGN.md for why this satisfies
//! every testable property (P4, P5, L-scenarios 5/6) without weakening
//! the observable contract.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::chunk_pool::PoolChunk;
use crate::ctx::{Ctx, ModuleTag};
use crate::error::Result;

/// Bytes reserved per chunk for the header fields the original stores
/// in-band (`id`, `size`, `start`, `data`, `next` on a 64-bit build). The
/// Rust port keeps this metadata out-of-band but reserves the same bytes
/// so `OUTPUT_BUFFER_DATA_SIZE` matches the original's boundary exactly.
pub const BUILDER_CHUNK_HEADER_SIZE: usize = 40;

/// `BUFFER_START_UNDEFINED`: sentinel meaning "this chunk continues a
/// message started in a previous chunk; there is no header here."
pub const BUFFER_START_UNDEFINED: u64 = u64::MAX;

/// One chunk of the output chain: a pool-allocated buffer plus the
/// `size`/`start` atomics the consumer polls.
pub struct BuilderChunk {
    pub id: u64,
    size: AtomicU64,
    start: AtomicU64,
    data: PoolChunk,
}

impl BuilderChunk {
    fn new(data: PoolChunk, id: u64) -> Self {
        BuilderChunk {
            id,
            size: AtomicU64::new(0),
            start: AtomicU64::new(BUFFER_START_UNDEFINED),
            data,
        }
    }

    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    pub fn start(&self) -> u64 {
        self.start.load(Ordering::Acquire)
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) {
        self.data.as_mut_slice()[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn read(&self, offset: usize, len: usize) -> Vec<u8> {
        self.data.as_slice()[offset..offset + len].to_vec()
    }

    fn into_pool_chunk(self) -> PoolChunk {
        self.data
    }
}

/// A logical handle into the chain: where a not-yet-frozen message's
/// bytes currently live. `chunk_id`/`start_offset` identify the write
/// cursor's origin; `position` is bytes written since then; `size` is
/// bytes already committed into earlier chunks' `size` counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BuilderMessage {
    pub chunk_id: Option<u64>,
    pub start_offset: u64,
    pub position: u64,
    pub size: u64,
}

struct ChainState {
    chunks: VecDeque<BuilderChunk>,
    chunks_allocated: u64,
}

/// A singly-linked chain of output chunks, with SPSC handoff between the
/// builder (producer) writing `lastChunk` and the writer (consumer)
/// reading from `firstChunk`.
pub struct BuilderBuffer {
    ctx: Arc<dyn Ctx>,
    output_data_size: u64,
    state: Mutex<ChainState>,
}

impl BuilderBuffer {
    pub fn new(ctx: Arc<dyn Ctx>) -> Self {
        let output_data_size = ctx.memory_chunk_size() as u64 - BUILDER_CHUNK_HEADER_SIZE as u64;
        BuilderBuffer {
            ctx,
            output_data_size,
            state: Mutex::new(ChainState {
                chunks: VecDeque::new(),
                chunks_allocated: 0,
            }),
        }
    }

    pub fn output_buffer_data_size(&self) -> u64 {
        self.output_data_size
    }

    /// `initialize()`: acquires the first chunk.
    pub fn initialize(&self) -> Result<()> {
        let chunk = BuilderChunk::new(self.ctx.get_memory_chunk(ModuleTag::Builder, true)?, 0);
        let mut state = self.state.lock();
        state.chunks.clear();
        state.chunks.push_back(chunk);
        state.chunks_allocated = 1;
        Ok(())
    }

    /// `expand(copy, message)`: grows the chain by one chunk. When `copy`
    /// is set and the unfinished `message` would still fit in a single
    /// chunk, its in-progress bytes are relocated so the message stays
    /// contiguous; otherwise the in-progress bytes are frozen into the
    /// current chunk's `size` and the message continues at offset 0 of
    /// the new chunk, which publishes `start == UNDEFINED` to mark itself
    /// as a continuation.
    pub fn expand(&self, copy: bool, message: &mut BuilderMessage) -> Result<()> {
        let chunk = self.ctx.get_memory_chunk(ModuleTag::Builder, true)?;
        let mut state = self.state.lock();
        let last_id = state
            .chunks
            .back()
            .expect("expand() requires initialize() to have run")
            .id;
        let mut new_chunk = BuilderChunk::new(chunk, last_id + 1);

        let fits_in_one_chunk = copy
            && message.chunk_id == Some(last_id)
            && message.size + message.position < self.output_data_size;

        if fits_in_one_chunk {
            let bytes = {
                let last = state.chunks.back().unwrap();
                last.read(message.start_offset as usize, message.position as usize)
            };
            new_chunk.write(0, &bytes);
            new_chunk.start.store(0, Ordering::Release);
        } else {
            if let Some(last) = state.chunks.back() {
                last.size.fetch_add(message.position, Ordering::Release);
            }
            message.size += message.position;
            message.position = 0;
            new_chunk.start.store(BUFFER_START_UNDEFINED, Ordering::Release);
        }
        new_chunk.size.store(0, Ordering::Release);
        message.chunk_id = Some(new_chunk.id);
        message.start_offset = 0;

        state.chunks.push_back(new_chunk);
        state.chunks_allocated += 1;
        Ok(())
    }

    /// Appends `bytes` to `message`'s write cursor, calling `expand(true,
    /// ..)` as many times as needed when they overrun the current
    /// chunk's free space. Models what the (external, out-of-scope)
    /// serializer does when it appends message payload.
    pub fn write_message_bytes(&self, message: &mut BuilderMessage, mut bytes: &[u8]) -> Result<()> {
        loop {
            let to_write = {
                let mut state = self.state.lock();
                if message.chunk_id.is_none() {
                    let last = state
                        .chunks
                        .back()
                        .expect("write_message_bytes() requires initialize() to have run");
                    message.chunk_id = Some(last.id);
                    message.start_offset = last.size();
                }
                let last = state.chunks.back_mut().unwrap();
                let cursor = message.start_offset + message.position;
                let remaining = self.output_data_size.saturating_sub(cursor);
                let to_write = bytes.len().min(remaining as usize);
                last.write(cursor as usize, &bytes[..to_write]);
                message.position += to_write as u64;
                to_write
            };
            bytes = &bytes[to_write..];
            if bytes.is_empty() {
                return Ok(());
            }
            self.expand(true, message)?;
        }
    }

    /// Freezes `message`'s in-progress bytes into the current chunk's
    /// visible `size` (a release-store), the way the serializer commits a
    /// completed message so the consumer can observe it.
    pub fn commit_message(&self, message: &mut BuilderMessage) {
        let state = self.state.lock();
        if let Some(last) = state.chunks.back() {
            if Some(last.id) == message.chunk_id {
                last.size.fetch_add(message.position, Ordering::Release);
            }
        }
        message.size += message.position;
        message.position = 0;
    }

    /// `releaseBuffers(maxId)`: frees every chunk with `id < maxId` from
    /// the front of the chain.
    pub fn release_buffers(&self, max_id: u64) {
        let mut state = self.state.lock();
        while state.chunks.front().map(|c| c.id < max_id).unwrap_or(false) {
            if let Some(chunk) = state.chunks.pop_front() {
                self.ctx
                    .free_memory_chunk(ModuleTag::Builder, chunk.into_pool_chunk());
                state.chunks_allocated -= 1;
            }
        }
    }

    pub fn first_chunk_id(&self) -> Option<u64> {
        self.state.lock().chunks.front().map(|c| c.id)
    }

    pub fn last_chunk_id(&self) -> Option<u64> {
        self.state.lock().chunks.back().map(|c| c.id)
    }

    pub fn chunks_allocated(&self) -> u64 {
        self.state.lock().chunks_allocated
    }

    /// Reads the consumer-visible span `[start, start+size)` of the first
    /// chunk, or `None` if it's a continuation (`start == UNDEFINED`).
    /// Does not advance the chain; call `release_buffers` once the writer
    /// has flushed those bytes.
    pub fn read_front(&self) -> Option<(u64, Vec<u8>)> {
        let state = self.state.lock();
        let front = state.chunks.front()?;
        let start = front.start();
        if start == BUFFER_START_UNDEFINED {
            return None;
        }
        let size = front.size();
        Some((front.id, front.read(start as usize, size as usize)))
    }
}

impl Drop for BuilderBuffer {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        while let Some(chunk) = state.chunks.pop_front() {
            self.ctx
                .free_memory_chunk(ModuleTag::Builder, chunk.into_pool_chunk());
            state.chunks_allocated -= 1;
        }
        debug_assert_eq!(state.chunks_allocated, 0);
    }
}
