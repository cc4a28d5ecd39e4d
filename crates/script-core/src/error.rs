//! Structured error variants shared across the cache, registry, and debugger.
//!
//! Serialized with an internally-tagged `"type"` discriminator, the same
//! convention the teacher used for `ExecutionError`, so that wire-protocol
//! consumers can switch on `error.type` directly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::digest::Digest;
use crate::header::HeaderError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "type")]
pub enum CacheError {
    #[error("script body produced a malformed header: {message}")]
    BadHeader { message: String },

    #[error("Could not find scripting engine '{engine}'")]
    UnknownEngine { engine: String },

    #[error("Error compiling script (new function): {message}")]
    CompileError { message: String },

    #[error("NOSCRIPT No matching script. Please use EVAL.")]
    ScriptMissing { digest: String },

    #[error("invalid digest '{digest}'")]
    BadDigest { digest: String },

    #[error("Number of keys can't be greater than number of args")]
    TooManyKeys,

    #[error("Number of keys can't be negative")]
    NegativeKeys,
}

impl From<HeaderError> for CacheError {
    fn from(e: HeaderError) -> Self {
        CacheError::BadHeader { message: e.to_string() }
    }
}

impl CacheError {
    pub fn script_missing(digest: Digest) -> Self {
        CacheError::ScriptMissing { digest: digest.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "type")]
pub enum RegistryError {
    #[error("Scripting engine '{name}' is already registered")]
    DuplicateName { name: String },

    #[error("There's no engine registered with name {name}")]
    NotFound { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "type")]
pub enum DebugError {
    #[error("SCRIPT DEBUG must be called outside a pipeline")]
    InsidePipeline,

    #[error("Use SCRIPT DEBUG YES/SYNC/NO")]
    BadMode,

    #[error("Please use EVAL instead of EVALSHA for debugging")]
    EvalShaNotSupported,

    #[error("max client buffer reached")]
    BufferOverflow,

    #[error("protocol error")]
    ProtocolError,
}
