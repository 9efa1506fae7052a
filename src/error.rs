//! Error taxonomy for the transaction staging and output pipeline.
//!
//! Every variant keeps the numeric code carried by the original
//! implementation's exceptions, since downstream log/alerting tooling
//! matches on the code rather than the message text.

use thiserror::Error;

/// Errors raised by the core. All are fatal to the operation that raised
/// them; callers decide whether that means skipping a record, aborting a
/// log file, or terminating the process.
#[derive(Debug, Error)]
pub enum Error {
    #[error("bad XID value: {0}")]
    BadXid(String),

    #[error("block size ({size}) exceeding max block size ({max}), try increasing the chunk size")]
    ChunkOverflow { size: usize, max: usize },

    #[error("bad split offset: {data_offset} xid: {xid}")]
    BadSplit { data_offset: u64, xid: String },

    #[error("split undo HEAD no 5.1 offset: {data_offset}")]
    SplitNot0501 { data_offset: u64 },

    #[error("bad split offset: {data_offset} xid: {xid} second position")]
    BadSplit2 { data_offset: u64, xid: String },

    #[error("trying to remove from empty buffer size: {size:?} elements: {elements:?}")]
    EmptyRollback {
        size: Option<u64>,
        elements: Option<u64>,
    },

    #[error("transaction {xid} conflicts with {other}")]
    ConflictingXid { xid: String, other: String },

    #[error("all {max} lwn buffers allocated")]
    LwnChunksExhausted { max: usize },

    #[error("too big redo log record, size: {size}")]
    LwnRecordTooBig { size: usize },

    #[error("all {max} records in lwn were used")]
    LwnOverflow { max: usize },

    #[error("memory chunk pool for module {module:?} is exhausted (limit {limit})")]
    PoolExhausted { module: &'static str, limit: usize },

    #[error("operation on unknown transaction xid: {xid}")]
    UnknownTransaction { xid: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    /// Reported (not thrown) when a `TransactionBuffer` is torn down with
    /// non-empty `partiallyFullChunks` — `Drop` cannot fail in Rust, so
    /// this variant only ever reaches `Ctx::error` from `Drop`, never a
    /// caller's `Result`.
    #[error("non-free blocks in transaction buffer: {remaining}")]
    FatalPoolLeak { remaining: usize },
}

impl Error {
    /// The numeric code carried over from the original implementation's
    /// exception taxonomy, for log correlation.
    pub fn code(&self) -> u32 {
        match self {
            Error::BadXid(_) => 20002,
            Error::ChunkOverflow { .. } => 50040,
            Error::BadSplit { .. } => 50041,
            Error::SplitNot0501 { .. } => 50042,
            Error::BadSplit2 { .. } => 50043,
            Error::EmptyRollback { .. } => 50044,
            Error::ConflictingXid { .. } => 50039,
            Error::LwnChunksExhausted { .. } => 50052,
            Error::LwnRecordTooBig { .. } => 50053,
            Error::LwnOverflow { .. } => 50054,
            Error::PoolExhausted { .. } => 50061,
            Error::FatalPoolLeak { .. } => 50062,
            Error::UnknownTransaction { .. } => 50045,
            Error::Config(_) => 50070,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
