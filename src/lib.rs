//! In-memory transaction staging and output buffer core for a redo/undo
//! log change-data-capture engine.
//!
//! The crate is split the way the source system's parser core is split:
//! a [`chunk_pool`] of fixed-size memory chunks feeds a [`transaction_buffer`]
//! (per-XID redo record staging, multi-block merge, rollback, checkpoint)
//! and a [`builder_buffer`] (the SPSC output chain handed to a writer
//! thread), ordered within one log-writer-number boundary by [`lwn`].
//! Everything outside the process — chunk acquisition, logging, byte
//! order — is reached through [`ctx::Ctx`], which production callers
//! implement once (`ctx::TracingCtx` is the default) and tests replace
//! with `ctx::tests_support::RecordingCtx`.

pub mod builder_buffer;
pub mod chunk_pool;
pub mod config;
pub mod ctx;
pub mod error;
pub mod ids;
pub mod lob;
pub mod lwn;
pub mod redo_record;
pub mod transaction_buffer;
pub mod transaction_chunk;

pub use builder_buffer::{BuilderBuffer, BuilderChunk, BuilderMessage};
pub use chunk_pool::{ChunkPool, PoolChunk};
pub use config::Config;
pub use ctx::{Ctx, Endian, ModuleTag, TraceFlag, TracingCtx};
pub use error::{Error, Result};
pub use ids::{LobId, ScnValue, Sqn, Slt, Usn, Xid, XidMapKey};
pub use lob::{Lob, LobDataElement, LobKey, LobPageIndex};
pub use lwn::{LwnHandle, LwnMember, LwnMembersManager};
pub use redo_record::{RedoLogRecord, StoredHeader};
pub use transaction_buffer::{Opcode0501Hook, Transaction, TransactionBuffer};
pub use transaction_chunk::{RecordRowRef, TransactionChunkMeta, TxChunkId};
