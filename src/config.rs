//! Tunables the core reads once at construction time. The core never
//! reads files itself; `from_toml` is provided for embedding applications
//! that want to load these alongside their own configuration, the way
//! `pageserver`'s `PageServerConf` loads its TOML config through
//! `toml_edit`.

use anyhow::{ensure, Context};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Trace event categories, combined as a bitmask in [`Config::trace_flags`].
pub mod trace_flag {
    pub const LOB: u32 = 1 << 0;
    pub const TRANSACTION_BUFFER: u32 = 1 << 1;
    pub const LWN: u32 = 1 << 2;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Size in bytes of one pool-allocated memory chunk. Must stay a
    /// multiple of `TransactionChunk::FULL_BUFFER_SIZE` so the
    /// transaction buffer's sub-allocation bitmap covers it exactly.
    pub memory_chunk_size: usize,

    /// Size in megabytes used only to size the LWN member arena
    /// (`LwnMembersManager::MAX_LWN_CHUNKS` scales off this).
    pub memory_chunk_size_mb: usize,

    /// Bitmask of `trace_flag::*` values gating optional trace events.
    pub trace_flags: u32,

    /// Hard cap on outstanding memory chunks per module tag.
    pub max_chunks_per_module: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            memory_chunk_size: 1024 * 1024,
            memory_chunk_size_mb: 1,
            trace_flags: 0,
            max_chunks_per_module: 4096,
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml_edit::de::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn trace_enabled(&self, flag: u32) -> bool {
        self.trace_flags & flag != 0
    }

    /// Setup-time sanity checks, run once at startup rather than on every
    /// fallible core operation — the teacher workspace (`pageserver`'s
    /// `tenant_mgr`/`layered_repository` setup paths) reaches for
    /// `anyhow::ensure!`/`Context` for exactly this class of "fail fast
    /// before doing any work" bootstrap validation, distinct from the
    /// per-operation `Error` taxonomy.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.memory_chunk_size % crate::transaction_chunk::FULL_BUFFER_SIZE == 0,
            "memory_chunk_size ({}) must be a multiple of the transaction chunk slot size ({})",
            self.memory_chunk_size,
            crate::transaction_chunk::FULL_BUFFER_SIZE,
        );
        ensure!(self.memory_chunk_size_mb > 0, "memory_chunk_size_mb must be non-zero");
        ensure!(
            self.max_chunks_per_module > 0,
            "max_chunks_per_module must be non-zero"
        );
        Ok(())
    }

    pub fn from_toml_validated(text: &str) -> anyhow::Result<Self> {
        let cfg = Self::from_toml(text).context("parsing configuration")?;
        cfg.validate().context("validating configuration")?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_chunk_size_is_one_mebibyte() {
        assert_eq!(Config::default().memory_chunk_size, 1024 * 1024);
    }

    #[test]
    fn loads_from_toml() {
        let cfg = Config::from_toml("memory_chunk_size = 2097152\ntrace_flags = 3\n").unwrap();
        assert_eq!(cfg.memory_chunk_size, 2_097_152);
        assert!(cfg.trace_enabled(trace_flag::LOB));
        assert!(cfg.trace_enabled(trace_flag::TRANSACTION_BUFFER));
        assert!(!cfg.trace_enabled(trace_flag::LWN));
    }

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn chunk_size_not_a_multiple_of_slot_size_fails_validation() {
        let mut cfg = Config::default();
        cfg.memory_chunk_size = 100;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn malformed_toml_is_rejected() {
        let err = Config::from_toml("not valid toml === !!!").unwrap_err();
        assert_eq!(err.code(), 50070);
    }
}
