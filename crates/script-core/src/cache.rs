//! Content-addressed script cache: compile-once, run-many storage for
//! script bodies, with a bounded LRU over ephemeral entries and permanent
//! pinned entries for explicitly `SCRIPT LOAD`ed scripts.
//!
//! Grounded on `eval.c`'s `evalCtx`/`scriptsLRUAdd`/`evalRegisterNewScript`/
//! `evalDeleteScript`/`evalGenericCommand`. The LRU is a hand-rolled
//! FIFO-on-touch ordering over a `VecDeque<Digest>` rather than the
//! off-the-shelf `lru` crate: that crate promotes-on-read (true LRU), but
//! spec §4.1 requires promotion only on a *successful run*, and only for
//! entries that still carry an LRU node (pinned entries are exempt) — a
//! distinction the `lru` crate's API doesn't expose.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::CacheConfig;
use crate::digest::Digest;
use crate::engine::{CompiledHandle, EngineDescriptor, EngineRegistry, SubsystemMode};
use crate::error::CacheError;
use crate::header::{parse_header, FlagSet};
use crate::reclaim::ReclamationPool;
use crate::value::Value;

/// Whether a `SCRIPT FLUSH`/cache-wide teardown happens inline or is handed
/// off to the reclamation pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    Sync,
    Async,
}

struct CacheEntry {
    body: Arc<[u8]>,
    descriptor: Arc<EngineDescriptor>,
    engine_name: String,
    compiled: CompiledHandle,
    flags: FlagSet,
    /// `true` once promoted by `SCRIPT LOAD`/re-registration; pinned entries
    /// never sit in the LRU order and are never evicted.
    pinned: bool,
}

/// A read-only summary of a cache entry, for `SCRIPT SHOW`/`EXISTS`.
#[derive(Debug, Clone)]
pub struct ScriptInfo {
    pub digest: Digest,
    pub engine_name: String,
    pub flags: FlagSet,
    pub pinned: bool,
    pub body: Arc<[u8]>,
}

struct CacheState {
    entries: HashMap<Digest, CacheEntry>,
    lru_order: VecDeque<Digest>,
}

/// The script cache: compile-once storage shared by `EVAL`/`EVALSHA`/
/// `SCRIPT *`.
pub struct ScriptCache {
    state: Mutex<CacheState>,
    config: CacheConfig,
    reclaim: Arc<ReclamationPool>,
    evicted_count: AtomicU64,
}

impl ScriptCache {
    pub fn new(config: CacheConfig, reclaim: Arc<ReclamationPool>) -> Self {
        ScriptCache {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                lru_order: VecDeque::new(),
            }),
            config,
            reclaim,
            evicted_count: AtomicU64::new(0),
        }
    }

    /// Number of scripts evicted from the LRU since creation.
    pub fn evicted_count(&self) -> u64 {
        self.evicted_count.load(Ordering::Relaxed)
    }

    /// Looks up a script by digest without side effects (no LRU touch),
    /// used to answer `SCRIPT EXISTS`.
    pub fn exists(&self, digest: &Digest) -> bool {
        self.state.lock().expect("cache mutex poisoned").entries.contains_key(digest)
    }

    /// Returns metadata about a cached script, including its original body,
    /// for `SCRIPT SHOW`.
    pub fn show(&self, digest: &Digest) -> Option<ScriptInfo> {
        let state = self.state.lock().expect("cache mutex poisoned");
        state.entries.get(digest).map(|e| ScriptInfo {
            digest: *digest,
            engine_name: e.engine_name.clone(),
            flags: e.flags,
            pinned: e.pinned,
            body: Arc::clone(&e.body),
        })
    }

    /// The flag set a request should be evaluated under, per §4.1
    /// `pre-resolve`: if `digest` is already cached, its stored flags win;
    /// else if `body` is available, flags are derived from its header; else
    /// `base_flags` passes through unchanged.
    pub fn pre_resolve(&self, digest: &Digest, body: Option<&[u8]>, base_flags: FlagSet) -> Result<FlagSet, CacheError> {
        if let Some(info) = self.show(digest) {
            return Ok(info.flags);
        }
        match body {
            Some(body) => Ok(parse_header(body)?.flags),
            None => Ok(base_flags),
        }
    }

    /// Compiles `body` (or promotes an existing ephemeral entry to pinned,
    /// without recompiling) and stores it under its content digest.
    ///
    /// `script_load` marks the `SCRIPT LOAD` path: the resulting entry is
    /// pinned from the start (never enters the LRU), and an already-cached
    /// entry is promoted rather than recompiled — the exact behavior of
    /// `evalRegisterNewScript`.
    pub fn compile_and_store(
        &self,
        registry: &EngineRegistry,
        body: &[u8],
        mode: SubsystemMode,
        script_load: bool,
    ) -> Result<Digest, CacheError> {
        let digest = Digest::of(body);
        let mut state = self.state.lock().expect("cache mutex poisoned");

        if let Some(entry) = state.entries.get_mut(&digest) {
            if !entry.pinned {
                remove_from_order(&mut state.lru_order, &digest);
                entry.pinned = true;
            }
            return Ok(digest);
        }
        drop(state);

        let header = parse_header(body)?;
        let engine_name = header.engine.clone().unwrap_or_else(|| crate::header::DEFAULT_ENGINE.to_string());
        let descriptor = registry.find(&engine_name).ok_or_else(|| CacheError::UnknownEngine {
            engine: engine_name.clone(),
        })?;

        let code = std::str::from_utf8(&body[header.header_len..])
            .map_err(|_| CacheError::CompileError { message: "script body is not valid UTF-8".to_string() })?;
        let mut compiled = registry
            .compile(&descriptor, mode, code)
            .map_err(|message| CacheError::CompileError { message })?;
        let compiled_unit = compiled.pop().expect("compile() returns at least one unit or an error");

        let entry = CacheEntry {
            body: Arc::from(body),
            descriptor,
            engine_name,
            compiled: compiled_unit,
            flags: header.flags,
            pinned: script_load,
        };

        let mut state = self.state.lock().expect("cache mutex poisoned");
        // Another caller may have raced us to compile the same digest; keep
        // the first writer's entry, discard ours.
        if state.entries.contains_key(&digest) {
            return Ok(digest);
        }
        state.entries.insert(digest, entry);
        if !script_load {
            state.lru_order.push_back(digest);
            self.evict_if_needed(&mut state);
        }
        tracing::debug!(%digest, pinned = script_load, "script compiled and stored");
        Ok(digest)
    }

    fn evict_if_needed(&self, state: &mut CacheState) {
        while state.lru_order.len() > self.config.lru_bound {
            if let Some(victim) = state.lru_order.pop_front() {
                state.entries.remove(&victim);
                self.evicted_count.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(digest = %victim, "evicted script from LRU");
            } else {
                break;
            }
        }
    }

    /// Runs a cached script by digest, touching its LRU position to the
    /// tail on success (only for entries that still carry an LRU node).
    pub fn run(&self, registry: &EngineRegistry, digest: &Digest, keys: &[String], args: &[String]) -> Result<Value, CacheError> {
        let mut state = self.state.lock().expect("cache mutex poisoned");

        let (pinned, call_result) = {
            let entry = state.entries.get(digest).ok_or_else(|| CacheError::script_missing(*digest))?;
            let result = registry.call(&entry.descriptor, &entry.compiled, keys, args);
            (entry.pinned, result)
        };

        if call_result.is_ok() && !pinned {
            remove_from_order(&mut state.lru_order, digest);
            state.lru_order.push_back(*digest);
        }
        call_result.map_err(|message| CacheError::CompileError { message })
    }

    /// Deletes a single cached entry regardless of pinned status.
    pub fn delete(&self, digest: &Digest) -> bool {
        let mut state = self.state.lock().expect("cache mutex poisoned");
        remove_from_order(&mut state.lru_order, digest);
        state.entries.remove(digest).is_some()
    }

    /// Empties the cache and asks every registered engine to reset its
    /// execution environment (§4.1: "Drop the entire cache and request
    /// every registered engine to reset its execution environment").
    /// `Sync` frees entries on the calling thread; `Async` hands the old map
    /// off to the reclamation pool and replaces live state with fresh empty
    /// collections before returning.
    pub fn flush(&self, registry: &EngineRegistry, mode: FlushMode) {
        let mut state = self.state.lock().expect("cache mutex poisoned");
        let old_entries = std::mem::take(&mut state.entries);
        let old_order = std::mem::take(&mut state.lru_order);
        drop(state);

        let is_async = matches!(mode, FlushMode::Async);
        registry.for_each(|d| registry.reset_env(d, is_async));

        match mode {
            FlushMode::Sync => {
                drop(old_entries);
                drop(old_order);
                tracing::info!("script cache flushed synchronously");
            }
            FlushMode::Async => {
                tracing::info!(count = old_entries.len(), "script cache flush handed off for reclamation");
                self.reclaim.submit(Box::new(move || {
                    drop(old_entries);
                    drop(old_order);
                }));
            }
        }
    }

    /// `SCRIPT FLUSH` with no explicit `SYNC`/`ASYNC` argument: the default
    /// mode is taken from `config.async_flush_threshold` (§5: "cache flushes
    /// where entry count exceeds a small threshold" default to async; §6:
    /// "the default mode is taken from a system configuration flag").
    pub fn flush_default(&self, registry: &EngineRegistry) {
        let mode = if self.len() > self.config.async_flush_threshold { FlushMode::Async } else { FlushMode::Sync };
        self.flush(registry, mode);
    }

    /// Approximate memory usage: per-entry body size plus each engine's
    /// self-reported per-unit overhead, matching `evalScriptsMemory`.
    pub fn memory_usage(&self, registry: &EngineRegistry) -> usize {
        let state = self.state.lock().expect("cache mutex poisoned");
        state
            .entries
            .values()
            .map(|e| e.body.len() + registry.memory_overhead(&e.descriptor, &e.compiled))
            .sum()
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("cache mutex poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn remove_from_order(order: &mut VecDeque<Digest>, digest: &Digest) {
    if let Some(pos) = order.iter().position(|d| d == digest) {
        order.remove(pos);
    }
}
