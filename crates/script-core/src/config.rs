//! Process-wide configuration, read once from the environment the way the
//! teacher's `BytecodeCache::global()`/`InterpreterPool::global()` read
//! `PYEXEC_BYTECODE_CACHE_SIZE`/`PYEXEC_POOL_SIZE`.

/// Tunables governing the cache, debugger, and reclamation pool.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Maximum number of ephemeral (unpinned) cache entries before the
    /// oldest is evicted. Matches `LRU_LIST_LENGTH` in `eval.c`.
    pub lru_bound: usize,
    /// Maximum number of simultaneously-set debugger breakpoints.
    pub breakpoint_capacity: usize,
    /// Entry count above which `SCRIPT FLUSH`/engine `reset_env` defaults to
    /// asynchronous reclamation rather than an inline free.
    pub async_flush_threshold: usize,
    /// Number of background reclamation worker threads.
    pub reclamation_workers: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            lru_bound: 500,
            breakpoint_capacity: 64,
            async_flush_threshold: 64,
            reclamation_workers: 4,
        }
    }
}

impl CacheConfig {
    /// Builds a config from the environment, falling back to [`Default`]
    /// for any variable that is absent or unparseable.
    pub fn from_env() -> Self {
        let defaults = CacheConfig::default();
        CacheConfig {
            lru_bound: env_usize("SCRIPT_CACHE_LRU_BOUND").unwrap_or(defaults.lru_bound).max(1),
            breakpoint_capacity: env_usize("SCRIPT_DEBUG_BREAKPOINT_CAP")
                .unwrap_or(defaults.breakpoint_capacity)
                .max(1),
            async_flush_threshold: env_usize("SCRIPT_FLUSH_ASYNC_THRESHOLD")
                .unwrap_or(defaults.async_flush_threshold),
            reclamation_workers: env_usize("SCRIPT_RECLAIM_WORKERS")
                .unwrap_or(defaults.reclamation_workers)
                .max(1),
        }
    }
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|v| v.parse::<usize>().ok())
}
