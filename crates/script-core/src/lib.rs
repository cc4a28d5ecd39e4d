//! Server-side scripting subsystem: a content-addressed script cache, a
//! pluggable scripting-engine registry, and an interactive line debugger.
//!
//! Grounded on `eval.c` (cache lifecycle), `scripting_engine.c` (engine
//! vtable and registry), and `debug_lua.c` (REPL debugger), with the
//! ambient stack (errors, config, logging, background reclamation) carried
//! over from the teacher crate's own conventions.

pub mod cache;
pub mod config;
pub mod debugger;
pub mod demo_engine;
pub mod digest;
pub mod engine;
pub mod error;
pub mod header;
pub mod reclaim;
pub mod resp;
pub mod timeout;
pub mod value;

pub use cache::{FlushMode, ScriptCache, ScriptInfo};
pub use config::CacheConfig;
pub use debugger::{ChildId, DebugSession, DebugSingleton, SessionMode, SessionOutcome};
pub use demo_engine::DemoEngine;
pub use digest::{Digest, DigestError, DIGEST_HEX_LEN};
pub use engine::{
    CompiledHandle, EngineDescriptor, EngineOwner, EngineRegistry, FakeClient, MemoryInfo, ScriptEngine,
    SubsystemMode,
};
pub use error::{CacheError, DebugError, RegistryError};
pub use header::{parse_header, FlagSet, ParsedHeader, HeaderError, DEFAULT_ENGINE};
pub use reclaim::{ReclaimJob, ReclamationPool};
pub use resp::{resp_to_human, RespError};
pub use timeout::run_with_timeout;
pub use value::{map_from_pairs, render_value, Value, RENDER_DEPTH_CAP};

use std::sync::Arc;

/// Bundles the cache, registry, and reclamation pool a process needs to
/// serve `EVAL`/`EVALSHA`/`SCRIPT *`, wired together from one
/// [`CacheConfig`]. Mirrors the teacher's `BytecodeCache::global()` +
/// `InterpreterPool::global()` pairing, collapsed into a single owned
/// value rather than two independent statics, since the cache and the
/// registry it dispatches through are always used together here.
pub struct ScriptingSubsystem {
    pub cache: ScriptCache,
    pub registry: EngineRegistry,
}

impl ScriptingSubsystem {
    pub fn new(config: CacheConfig) -> Self {
        let reclaim = Arc::new(ReclamationPool::new(config.reclamation_workers));
        ScriptingSubsystem {
            cache: ScriptCache::new(config, reclaim),
            registry: EngineRegistry::new(),
        }
    }

    /// Builds a subsystem from the process environment and registers the
    /// built-in demo engine under its default name, so the cache always has
    /// at least one usable engine out of the box.
    pub fn with_demo_engine() -> Self {
        let subsystem = ScriptingSubsystem::new(CacheConfig::from_env());
        subsystem
            .registry
            .register("demo", EngineOwner::Builtin, Arc::new(DemoEngine::new()), false)
            .expect("the demo engine name is unique on a freshly built registry");
        subsystem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subsystem_with_demo_engine_compiles_and_runs() {
        let subsystem = ScriptingSubsystem::with_demo_engine();
        let digest = subsystem
            .cache
            .compile_and_store(&subsystem.registry, b"#!demo\nreturn 5", SubsystemMode::AdHoc, false)
            .expect("compile");
        let result = subsystem.cache.run(&subsystem.registry, &digest, &[], &[]).expect("run");
        assert_eq!(result, Value::Integer(5));
    }
}
