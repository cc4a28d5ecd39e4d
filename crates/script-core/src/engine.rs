//! Pluggable scripting-engine registry.
//!
//! Grounded on `scripting_engine.c`: engines register a small vtable
//! (`compile`/`call`/`free`/`memory_overhead`/`reset_env`/`memory_info`),
//! are looked up case-insensitively by name, and every vtable dispatch is
//! wrapped in a scoped module-context acquisition with guaranteed release —
//! here expressed as the RAII [`ModuleCallGuard`] rather than manual
//! setup/teardown calls, so teardown runs on every exit path including an
//! unwinding panic.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::RegistryError;
use crate::value::Value;

/// Opaque result of [`ScriptEngine::compile`]; downcast by the engine that
/// produced it, never interpreted by the registry itself.
pub type CompiledHandle = Box<dyn Any + Send>;

/// Whether a compiled unit is being run ad hoc (`EVAL`) or as a named
/// library function (`FUNCTION`/`FCALL`), mirroring `subsystemType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsystemMode {
    AdHoc,
    Library,
}

/// Memory accounting an engine reports about itself, per `engineMemoryInfo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryInfo {
    pub engine_memory_overhead: usize,
    pub function_memory_overhead: usize,
}

/// The vtable a scripting engine implements, per spec §4.2.
pub trait ScriptEngine: Send + Sync {
    /// Compiles `code` into one or more callable units. `AdHoc` mode must
    /// yield exactly one compiled unit (the registry asserts this).
    fn compile(&self, mode: SubsystemMode, code: &str) -> Result<Vec<CompiledHandle>, String>;

    /// Invokes a previously compiled unit with the given keys/args.
    fn call(&self, compiled: &CompiledHandle, keys: &[String], args: &[String]) -> Result<Value, String>;

    /// Releases a compiled unit's resources.
    fn free(&self, compiled: CompiledHandle);

    /// Per-unit memory overhead, used to answer `SCRIPT SHOW`/memory-usage queries.
    fn memory_overhead(&self, compiled: &CompiledHandle) -> usize;

    /// Tears down and rebuilds the engine's execution environment, either
    /// synchronously or handed off for background reclamation.
    fn reset_env(&self, is_async: bool);

    /// Whole-engine memory accounting.
    fn memory_info(&self) -> MemoryInfo;
}

/// Who owns an engine: the crate's own built-ins, or an external module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOwner {
    Builtin,
    Module(String),
}

/// A synthetic client used to attribute host commands an engine issues on
/// its own behalf (e.g. from inside the debugger's `server`/`redis` command)
/// rather than on behalf of the caller that invoked the script.
#[derive(Debug, Clone, Copy)]
pub struct FakeClient {
    pub deny_blocking: bool,
    pub is_script: bool,
    pub is_fake: bool,
}

impl Default for FakeClient {
    fn default() -> Self {
        FakeClient {
            deny_blocking: true,
            is_script: true,
            is_fake: true,
        }
    }
}

/// A registered scripting engine: its name, owner, vtable, and whether
/// vtable calls need a module-context guard around them.
pub struct EngineDescriptor {
    pub name: String,
    pub owner: EngineOwner,
    pub methods: Arc<dyn ScriptEngine>,
    pub fake_client: FakeClient,
    /// `true` only for module-owned engines; builtin engines have no
    /// module context to set up or tear down.
    pub module_context: bool,
}

struct ModuleCallGuard<'a> {
    descriptor: &'a EngineDescriptor,
}

impl<'a> ModuleCallGuard<'a> {
    fn enter(descriptor: &'a EngineDescriptor) -> Self {
        if descriptor.module_context {
            tracing::trace!(engine = %descriptor.name, "module context setup");
        }
        ModuleCallGuard { descriptor }
    }
}

impl Drop for ModuleCallGuard<'_> {
    fn drop(&mut self) {
        if self.descriptor.module_context {
            tracing::trace!(engine = %self.descriptor.name, "module context teardown");
        }
    }
}

struct RegistryState {
    engines: HashMap<String, Arc<EngineDescriptor>>,
    total_memory_overhead: usize,
}

/// Process-wide table of registered scripting engines.
pub struct EngineRegistry {
    inner: Mutex<RegistryState>,
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineRegistry {
    pub fn new() -> Self {
        EngineRegistry {
            inner: Mutex::new(RegistryState {
                engines: HashMap::new(),
                total_memory_overhead: 0,
            }),
        }
    }

    /// Registers a new engine. Lookups are case-insensitive, so registration
    /// is keyed by the lowercased name; a name that already exists (under
    /// any case) is rejected.
    pub fn register(
        &self,
        name: impl Into<String>,
        owner: EngineOwner,
        methods: Arc<dyn ScriptEngine>,
        module_context: bool,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        let key = name.to_ascii_lowercase();
        let mut state = self.inner.lock().expect("engine registry mutex poisoned");
        if state.engines.contains_key(&key) {
            return Err(RegistryError::DuplicateName { name });
        }

        let descriptor = Arc::new(EngineDescriptor {
            name: name.clone(),
            owner,
            methods,
            fake_client: FakeClient::default(),
            module_context,
        });
        let mem = descriptor.methods.memory_info();
        state.total_memory_overhead += mem.engine_memory_overhead;
        state.engines.insert(key, descriptor);
        tracing::info!(engine = %name, "scripting engine registered");
        Ok(())
    }

    /// Unregisters an engine by name (case-insensitive).
    pub fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        let key = name.to_ascii_lowercase();
        let mut state = self.inner.lock().expect("engine registry mutex poisoned");
        let descriptor = state.engines.remove(&key).ok_or_else(|| RegistryError::NotFound {
            name: name.to_string(),
        })?;
        let mem = descriptor.methods.memory_info();
        state.total_memory_overhead = state.total_memory_overhead.saturating_sub(mem.engine_memory_overhead);
        tracing::info!(engine = %descriptor.name, "scripting engine unregistered");
        Ok(())
    }

    /// Case-insensitive lookup.
    pub fn find(&self, name: &str) -> Option<Arc<EngineDescriptor>> {
        let key = name.to_ascii_lowercase();
        let state = self.inner.lock().expect("engine registry mutex poisoned");
        state.engines.get(&key).cloned()
    }

    pub fn for_each(&self, mut f: impl FnMut(&EngineDescriptor)) {
        let state = self.inner.lock().expect("engine registry mutex poisoned");
        for descriptor in state.engines.values() {
            f(descriptor);
        }
    }

    pub fn num_engines(&self) -> usize {
        self.inner.lock().expect("engine registry mutex poisoned").engines.len()
    }

    pub fn total_memory_overhead(&self) -> usize {
        self.inner.lock().expect("engine registry mutex poisoned").total_memory_overhead
    }

    pub fn compile(
        &self,
        descriptor: &EngineDescriptor,
        mode: SubsystemMode,
        code: &str,
    ) -> Result<Vec<CompiledHandle>, String> {
        let _guard = ModuleCallGuard::enter(descriptor);
        let compiled = descriptor.methods.compile(mode, code)?;
        if matches!(mode, SubsystemMode::AdHoc) {
            assert_eq!(compiled.len(), 1, "ad hoc compilation must yield exactly one unit");
        }
        Ok(compiled)
    }

    pub fn call(
        &self,
        descriptor: &EngineDescriptor,
        compiled: &CompiledHandle,
        keys: &[String],
        args: &[String],
    ) -> Result<Value, String> {
        let _guard = ModuleCallGuard::enter(descriptor);
        descriptor.methods.call(compiled, keys, args)
    }

    pub fn free(&self, descriptor: &EngineDescriptor, compiled: CompiledHandle) {
        let _guard = ModuleCallGuard::enter(descriptor);
        descriptor.methods.free(compiled);
    }

    pub fn memory_overhead(&self, descriptor: &EngineDescriptor, compiled: &CompiledHandle) -> usize {
        let _guard = ModuleCallGuard::enter(descriptor);
        descriptor.methods.memory_overhead(compiled)
    }

    pub fn reset_env(&self, descriptor: &EngineDescriptor, is_async: bool) {
        let _guard = ModuleCallGuard::enter(descriptor);
        descriptor.methods.reset_env(is_async);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo_engine::DemoEngine;

    fn demo() -> Arc<dyn ScriptEngine> {
        Arc::new(DemoEngine::new())
    }

    #[test]
    fn test_register_then_find_case_insensitive() {
        let registry = EngineRegistry::new();
        registry.register("Demo", EngineOwner::Builtin, demo(), false).expect("register");
        assert!(registry.find("demo").is_some());
        assert!(registry.find("DEMO").is_some());
        assert!(registry.find("DeMo").is_some());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = EngineRegistry::new();
        registry.register("demo", EngineOwner::Builtin, demo(), false).expect("first register");
        let err = registry.register("DEMO", EngineOwner::Builtin, demo(), false).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateName { name: "DEMO".to_string() });
    }

    #[test]
    fn test_unregister_unknown_is_not_found() {
        let registry = EngineRegistry::new();
        let err = registry.unregister("nope").unwrap_err();
        assert_eq!(err, RegistryError::NotFound { name: "nope".to_string() });
    }

    #[test]
    fn test_unregister_removes_from_lookup() {
        let registry = EngineRegistry::new();
        registry.register("demo", EngineOwner::Builtin, demo(), false).expect("register");
        registry.unregister("demo").expect("unregister");
        assert!(registry.find("demo").is_none());
        assert_eq!(registry.num_engines(), 0);
    }

    #[test]
    fn test_for_each_visits_all_engines() {
        let registry = EngineRegistry::new();
        registry.register("a", EngineOwner::Builtin, demo(), false).expect("register a");
        registry.register("b", EngineOwner::Builtin, demo(), false).expect("register b");
        let mut seen = Vec::new();
        registry.for_each(|d| seen.push(d.name.clone()));
        seen.sort();
        assert_eq!(seen, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_ad_hoc_compile_must_yield_one_unit() {
        let registry = EngineRegistry::new();
        registry.register("demo", EngineOwner::Builtin, demo(), false).expect("register");
        let descriptor = registry.find("demo").unwrap();
        let compiled = registry.compile(&descriptor, SubsystemMode::AdHoc, "set x 1").expect("compile");
        assert_eq!(compiled.len(), 1);
    }
}
