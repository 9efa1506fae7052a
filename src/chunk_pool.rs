//! Process-wide source of fixed-size memory chunks.
//!
//! Grounded on `examples/original_source/src/builder/BuilderBuffer.h`'s
//! `MEMORY_CHUNK_SIZE` constant and on the pooling discipline of
//! `pageserver::page_cache` (a single free-list guarded by one lock,
//! module-tagged acquisition, no per-tag sub-pools). Unlike `page_cache`,
//! which hands out long-lived slot handles behind `RwLock`, this pool
//! hands out owned buffers: the borrower (`TransactionBuffer`,
//! `BuilderBuffer`, `LwnMembersManager`) is responsible for returning them.

use parking_lot::Mutex;

use crate::ctx::ModuleTag;
use crate::error::{Error, Result};

/// An owned, fixed-size memory chunk handed out by a [`ChunkPool`].
///
/// `PoolChunk` is a thin wrapper around a boxed byte slice so that callers
/// get a concrete, movable value (rather than a borrow tied to the pool's
/// lifetime) while still allowing the pool to recycle the backing
/// allocation on release.
pub struct PoolChunk {
    buf: Box<[u8]>,
}

impl PoolChunk {
    fn new(size: usize) -> Self {
        PoolChunk {
            buf: vec![0u8; size].into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

struct Inner {
    free: Vec<PoolChunk>,
    outstanding: usize,
}

/// A pool of same-sized chunks, thread-safe, with a hard cap on the
/// number of chunks that may be outstanding plus free at once. Exhaustion
/// is surfaced to the caller as [`Error::PoolExhausted`] rather than
/// growing unboundedly, matching the original's "exhaustion is fatal"
/// contract.
pub struct ChunkPool {
    chunk_size: usize,
    max_chunks: usize,
    inner: Mutex<Inner>,
}

impl ChunkPool {
    pub fn new(chunk_size: usize, max_chunks: usize) -> Self {
        ChunkPool {
            chunk_size,
            max_chunks,
            inner: Mutex::new(Inner {
                free: Vec::new(),
                outstanding: 0,
            }),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Acquires a chunk, reusing a free one when available. `hot` only
    /// affects which free chunk is reused (last-released first, for cache
    /// warmth); `false` still draws from the same free list.
    pub fn acquire(&self, tag: ModuleTag, hot: bool) -> Result<PoolChunk> {
        let mut inner = self.inner.lock();
        if let Some(chunk) = inner.free.pop() {
            inner.outstanding += 1;
            let _ = hot;
            return Ok(chunk);
        }
        if inner.outstanding >= self.max_chunks {
            return Err(Error::PoolExhausted {
                module: tag.as_str(),
                limit: self.max_chunks,
            });
        }
        inner.outstanding += 1;
        Ok(PoolChunk::new(self.chunk_size))
    }

    pub fn release(&self, chunk: PoolChunk) {
        let mut inner = self.inner.lock();
        inner.outstanding -= 1;
        inner.free.push(chunk);
    }

    pub fn outstanding(&self) -> usize {
        self.inner.lock().outstanding
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_released_chunks() {
        let pool = ChunkPool::new(1024, 2);
        let a = pool.acquire(ModuleTag::Builder, false).unwrap();
        assert_eq!(pool.outstanding(), 1);
        pool.release(a);
        assert_eq!(pool.outstanding(), 0);
        let b = pool.acquire(ModuleTag::Builder, true).unwrap();
        assert_eq!(b.len(), 1024);
    }

    #[test]
    fn exhaustion_is_an_error() {
        let pool = ChunkPool::new(64, 1);
        let _a = pool.acquire(ModuleTag::Lwn, false).unwrap();
        let err = pool.acquire(ModuleTag::Lwn, false).unwrap_err();
        assert_eq!(err.code(), 50061);
    }
}
