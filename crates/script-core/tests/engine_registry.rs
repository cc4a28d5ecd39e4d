//! Integration coverage of the registry's public contract: case-insensitive
//! lookup, memory accounting across register/unregister, and dispatch
//! through the vtable.

use std::sync::Arc;

use script_core::{EngineOwner, EngineRegistry, RegistryError, SubsystemMode, Value};
use script_core::DemoEngine;

#[test]
fn registering_two_engines_with_different_names_succeeds() {
    let registry = EngineRegistry::new();
    registry.register("demo", EngineOwner::Builtin, Arc::new(DemoEngine::new()), false).expect("register demo");
    registry
        .register("other", EngineOwner::Module("my_module".to_string()), Arc::new(DemoEngine::new()), true)
        .expect("register other");
    assert_eq!(registry.num_engines(), 2);
}

#[test]
fn case_insensitive_collision_is_rejected() {
    let registry = EngineRegistry::new();
    registry.register("Demo", EngineOwner::Builtin, Arc::new(DemoEngine::new()), false).expect("register");
    let err = registry.register("DEMO", EngineOwner::Builtin, Arc::new(DemoEngine::new()), false).unwrap_err();
    assert_eq!(err, RegistryError::DuplicateName { name: "DEMO".to_string() });
}

#[test]
fn total_memory_overhead_tracks_register_and_unregister() {
    let registry = EngineRegistry::new();
    assert_eq!(registry.total_memory_overhead(), 0);
    registry.register("demo", EngineOwner::Builtin, Arc::new(DemoEngine::new()), false).expect("register");
    let after_register = registry.total_memory_overhead();
    assert!(after_register > 0);
    registry.unregister("demo").expect("unregister");
    assert_eq!(registry.total_memory_overhead(), 0);
    let _ = after_register;
}

#[test]
fn compile_and_call_round_trip_through_registry_dispatch() {
    let registry = EngineRegistry::new();
    registry.register("demo", EngineOwner::Builtin, Arc::new(DemoEngine::new()), false).expect("register");
    let descriptor = registry.find("demo").expect("engine present");

    let compiled = registry.compile(&descriptor, SubsystemMode::AdHoc, "return 3").expect("compile");
    let result = registry.call(&descriptor, &compiled[0], &[], &[]).expect("call");
    assert_eq!(result, Value::Integer(3));
}
