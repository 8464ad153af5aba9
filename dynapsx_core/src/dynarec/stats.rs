// SPDX-License-Identifier: GPL-3.0
// stats.rs - Copyright Phillip Potter, 2025, under GPLv3 only.

/// Counters kept by the dispatcher.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DynarecStats {
    pub blocks_compiled: u64,

    /// Compiles that replaced a block made stale by a write to its code.
    pub recompiles: u64,

    pub cache_hits: u64,
    pub cache_misses: u64,
    pub flushes: u64,
    pub links_patched: u64,
    pub blocks_executed: u64,
    pub idle_skips: u64,
    pub host_ops_emitted: u64,
    pub hle_calls: u64,
}

impl DynarecStats {

    /// One-line rendering for logs.
    pub fn summary_line(&self) -> String {
        format!(
            "compiled {} (recompiled {}), hits {}, misses {}, flushes {}, links {}, executed {}, idle skips {}, host ops {}, hle {}",
            self.blocks_compiled,
            self.recompiles,
            self.cache_hits,
            self.cache_misses,
            self.flushes,
            self.links_patched,
            self.blocks_executed,
            self.idle_skips,
            self.host_ops_emitted,
            self.hle_calls,
        )
    }
}
