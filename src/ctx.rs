//! The external collaborator surface.
//!
//! Everything the core needs from the rest of the system — memory chunks,
//! byte-order-aware field reads, and the log sinks — is reached through
//! `Ctx`. Production code is expected to hand the core a `TracingCtx`;
//! tests use `RecordingCtx` (see `tests/support.rs`) to assert on emitted
//! events without scraping log output.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::chunk_pool::{ChunkPool, PoolChunk};
use crate::error::Result;

/// Tags a memory chunk with the component that owns it, for pool
/// accounting and for log correlation when a leak or an exhaustion is
/// reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleTag {
    TransactionBuffer,
    Builder,
    Lwn,
}

impl ModuleTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleTag::TransactionBuffer => "transaction-buffer",
            ModuleTag::Builder => "builder",
            ModuleTag::Lwn => "lwn",
        }
    }
}

/// Coarse severity for the `trace` sink; mirrors the original's trace-flag
/// bitmask, kept narrow since the core only ever emits a handful of kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceFlag {
    Lob,
    TransactionBuffer,
    Lwn,
}

/// The collaborator surface the core is handed at construction time.
///
/// `hot` parameterizes chunk acquisition the way the original does:
/// `true` requests a chunk likely to be reused shortly (kept warm in the
/// pool's free list rather than returned to the allocator), `false` asks
/// for a cold chunk.
pub trait Ctx: Send + Sync {
    fn get_memory_chunk(&self, tag: ModuleTag, hot: bool) -> Result<PoolChunk>;
    fn free_memory_chunk(&self, tag: ModuleTag, chunk: PoolChunk);

    fn memory_chunk_size(&self) -> usize;

    /// Reads a little- or big-endian 16-bit field depending on the source
    /// log's byte order. The redo/undo field-size sub-table is payload
    /// bytes straight from the log file, so its endianness is a property
    /// of the log, not of this process.
    fn read16(&self, bytes: &[u8]) -> u16;
    fn write16(&self, bytes: &mut [u8], value: u16);

    fn trace(&self, flag: TraceFlag, message: &str);
    fn warning(&self, code: u32, message: &str);
    fn error(&self, code: u32, message: &str);
}

/// Byte order of the redo-log source, selecting which `byteorder`
/// implementation `TracingCtx::read16`/`write16` use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Default `Ctx` implementation: logs through `tracing`, backs chunk
/// acquisition with an owned `ChunkPool`.
pub struct TracingCtx {
    pool: ChunkPool,
    endian: Endian,
}

impl TracingCtx {
    pub fn new(chunk_size: usize, max_chunks: usize, endian: Endian) -> Self {
        TracingCtx {
            pool: ChunkPool::new(chunk_size, max_chunks),
            endian,
        }
    }
}

impl Ctx for TracingCtx {
    fn get_memory_chunk(&self, tag: ModuleTag, hot: bool) -> Result<PoolChunk> {
        let chunk = self.pool.acquire(tag, hot)?;
        tracing::trace!(module = tag.as_str(), hot, "acquired memory chunk");
        Ok(chunk)
    }

    fn free_memory_chunk(&self, tag: ModuleTag, chunk: PoolChunk) {
        tracing::trace!(module = tag.as_str(), "releasing memory chunk");
        self.pool.release(chunk);
    }

    fn memory_chunk_size(&self) -> usize {
        self.pool.chunk_size()
    }

    fn read16(&self, bytes: &[u8]) -> u16 {
        match self.endian {
            Endian::Little => LittleEndian::read_u16(bytes),
            Endian::Big => BigEndian::read_u16(bytes),
        }
    }

    fn write16(&self, bytes: &mut [u8], value: u16) {
        match self.endian {
            Endian::Little => LittleEndian::write_u16(bytes, value),
            Endian::Big => BigEndian::write_u16(bytes, value),
        }
    }

    fn trace(&self, flag: TraceFlag, message: &str) {
        tracing::trace!(?flag, "{message}");
    }

    fn warning(&self, code: u32, message: &str) {
        tracing::warn!(code, "{message}");
    }

    fn error(&self, code: u32, message: &str) {
        tracing::error!(code, "{message}");
    }
}

/// Test-only `Ctx`: backs chunk acquisition with a real [`ChunkPool`] (so
/// pool-exhaustion tests still exercise real behavior) but captures every
/// `warning`/`error`/`trace` event in memory instead of going through
/// `tracing`, so tests can assert on emitted events directly. Exposed
/// unconditionally (not behind `#[cfg(test)]`) so both inline unit tests
/// and `tests/` integration tests can use the same implementation.
pub mod tests_support {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct Events {
        warnings: Vec<(u32, String)>,
        errors: Vec<(u32, String)>,
        traces: Vec<String>,
    }

    pub struct RecordingCtx {
        pool: ChunkPool,
        endian: Endian,
        events: Mutex<Events>,
    }

    impl RecordingCtx {
        pub fn new(chunk_size: usize, max_chunks: usize) -> Self {
            RecordingCtx {
                pool: ChunkPool::new(chunk_size, max_chunks),
                endian: Endian::Little,
                events: Mutex::new(Events::default()),
            }
        }

        pub fn with_endian(chunk_size: usize, max_chunks: usize, endian: Endian) -> Self {
            RecordingCtx {
                pool: ChunkPool::new(chunk_size, max_chunks),
                endian,
                events: Mutex::new(Events::default()),
            }
        }

        pub fn warnings(&self) -> Vec<(u32, String)> {
            self.events.lock().warnings.clone()
        }

        pub fn errors(&self) -> Vec<(u32, String)> {
            self.events.lock().errors.clone()
        }

        pub fn traces(&self) -> Vec<String> {
            self.events.lock().traces.clone()
        }
    }

    impl Ctx for RecordingCtx {
        fn get_memory_chunk(&self, tag: ModuleTag, hot: bool) -> Result<PoolChunk> {
            self.pool.acquire(tag, hot)
        }

        fn free_memory_chunk(&self, _tag: ModuleTag, chunk: PoolChunk) {
            self.pool.release(chunk);
        }

        fn memory_chunk_size(&self) -> usize {
            self.pool.chunk_size()
        }

        fn read16(&self, bytes: &[u8]) -> u16 {
            match self.endian {
                Endian::Little => LittleEndian::read_u16(bytes),
                Endian::Big => BigEndian::read_u16(bytes),
            }
        }

        fn write16(&self, bytes: &mut [u8], value: u16) {
            match self.endian {
                Endian::Little => LittleEndian::write_u16(bytes, value),
                Endian::Big => BigEndian::write_u16(bytes, value),
            }
        }

        fn trace(&self, _flag: TraceFlag, message: &str) {
            self.events.lock().traces.push(message.to_string());
        }

        fn warning(&self, code: u32, message: &str) {
            self.events.lock().warnings.push((code, message.to_string()));
        }

        fn error(&self, code: u32, message: &str) {
            self.events.lock().errors.push((code, message.to_string()));
        }
    }
}
