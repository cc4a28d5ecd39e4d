//! A minimal, line-oriented demo scripting engine.
//!
//! Exists only so the cache, registry, and debugger have a concrete
//! `ScriptEngine` to compile and run in tests and the CLI — it is not a
//! general-purpose scripting language and must not grow into one. Grounded
//! on the shape of the teacher's `PyInterp` (a fully concrete, testable
//! backend rather than a mocked-out vtable).
//!
//! ## Language
//!
//! Each line is one of:
//! - `set <name> <value>` — assigns an integer to a variable.
//! - `get <name>` — returns the variable's value, or nil if unset.
//! - `call <name> [args...]` — issues a host command through the fake
//!   client (recorded, not actually dispatched — host command execution is
//!   out of scope per spec §1).
//! - `return <value>` — returns an integer literal.
//!
//! A compiled unit is the parsed line list; `call` replays it against a
//! fresh per-invocation variable table (no persisted state between runs,
//! matching "NEVER fall back to the standard library" n/a here since this
//! engine owns no Python-style state-reset contract).

use std::collections::HashMap;
use std::sync::Mutex;

use crate::engine::{CompiledHandle, MemoryInfo, ScriptEngine, SubsystemMode};
use crate::value::Value;

#[derive(Debug, Clone)]
enum Stmt {
    Set(String, i64),
    Get(String),
    Call(String, Vec<String>),
    Return(i64),
}

struct CompiledProgram {
    stmts: Vec<Stmt>,
}

/// A trivial, deterministic scripting engine used for tests and the CLI demo.
pub struct DemoEngine {
    calls_issued: Mutex<Vec<String>>,
}

impl Default for DemoEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoEngine {
    pub fn new() -> Self {
        DemoEngine { calls_issued: Mutex::new(Vec::new()) }
    }

    /// Host commands issued by scripts via `call`, for test inspection.
    pub fn calls_issued(&self) -> Vec<String> {
        self.calls_issued.lock().expect("demo engine mutex poisoned").clone()
    }
}

fn parse_program(code: &str) -> Result<CompiledProgram, String> {
    let mut stmts = Vec::new();
    for (lineno, raw_line) in code.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let keyword = parts.next().unwrap();
        match keyword {
            "set" => {
                let name = parts.next().ok_or_else(|| format!("line {}: set requires a name", lineno + 1))?;
                let value_str = parts.next().ok_or_else(|| format!("line {}: set requires a value", lineno + 1))?;
                let value: i64 = value_str
                    .parse()
                    .map_err(|_| format!("line {}: '{value_str}' is not an integer", lineno + 1))?;
                stmts.push(Stmt::Set(name.to_string(), value));
            }
            "get" => {
                let name = parts.next().ok_or_else(|| format!("line {}: get requires a name", lineno + 1))?;
                stmts.push(Stmt::Get(name.to_string()));
            }
            "call" => {
                let name = parts.next().ok_or_else(|| format!("line {}: call requires a command name", lineno + 1))?;
                let args: Vec<String> = parts.map(|s| s.to_string()).collect();
                stmts.push(Stmt::Call(name.to_string(), args));
            }
            "return" => {
                let value_str = parts.next().ok_or_else(|| format!("line {}: return requires a value", lineno + 1))?;
                let value: i64 = value_str
                    .parse()
                    .map_err(|_| format!("line {}: '{value_str}' is not an integer", lineno + 1))?;
                stmts.push(Stmt::Return(value));
            }
            other => return Err(format!("line {}: unknown statement '{other}'", lineno + 1)),
        }
    }
    Ok(CompiledProgram { stmts })
}

impl ScriptEngine for DemoEngine {
    fn compile(&self, _mode: SubsystemMode, code: &str) -> Result<Vec<CompiledHandle>, String> {
        let program = parse_program(code)?;
        let handle: CompiledHandle = Box::new(program);
        Ok(vec![handle])
    }

    fn call(&self, compiled: &CompiledHandle, _keys: &[String], args: &[String]) -> Result<Value, String> {
        let program: &CompiledProgram = compiled
            .downcast_ref()
            .ok_or_else(|| "compiled handle was not produced by DemoEngine".to_string())?;

        let mut vars: HashMap<String, i64> = HashMap::new();
        let mut last_get: Option<i64> = None;
        let mut explicit_return: Option<i64> = None;

        for stmt in &program.stmts {
            match stmt {
                Stmt::Set(name, value) => {
                    vars.insert(name.clone(), *value);
                }
                Stmt::Get(name) => {
                    last_get = vars.get(name).copied();
                }
                Stmt::Call(name, call_args) => {
                    let mut rendered = name.clone();
                    for a in call_args.iter().chain(args.iter()) {
                        rendered.push(' ');
                        rendered.push_str(a);
                    }
                    self.calls_issued.lock().expect("demo engine mutex poisoned").push(rendered);
                }
                Stmt::Return(value) => {
                    explicit_return = Some(*value);
                }
            }
        }

        match explicit_return.or(last_get) {
            Some(v) => Ok(Value::Integer(v)),
            None => Ok(Value::Nil),
        }
    }

    fn free(&self, compiled: CompiledHandle) {
        drop(compiled);
    }

    fn memory_overhead(&self, compiled: &CompiledHandle) -> usize {
        compiled
            .downcast_ref::<CompiledProgram>()
            .map(|p| p.stmts.len() * std::mem::size_of::<Stmt>())
            .unwrap_or(0)
    }

    fn reset_env(&self, _is_async: bool) {
        self.calls_issued.lock().expect("demo engine mutex poisoned").clear();
    }

    fn memory_info(&self) -> MemoryInfo {
        MemoryInfo { engine_memory_overhead: std::mem::size_of::<Self>(), function_memory_overhead: 0 }
    }
}
