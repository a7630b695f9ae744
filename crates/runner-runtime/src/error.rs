//! Error types for the runner runtime.

use crate::value::DecodeError;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while loading or driving a runner.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A runner source file could not be read.
    #[error("Runner source unavailable: {}: {source}", path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a runner manifest.
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// The context could not produce a usable root object.
    #[error("Runner class init failed: {0}")]
    RunnerClassInitFailed(ClassInitFailure),

    /// The runner's `info` declaration is missing or malformed.
    #[error("Runner info init failed: {0}")]
    RunnerInfoInitFailed(String),

    /// The runner's intents declaration is missing or malformed.
    #[error("Failed to parse runner intents: {0}")]
    FailedToParseRunnerIntents(String),

    /// A required method is absent from the root object.
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// A capability-gated method is absent or declared unimplemented.
    #[error("Method not implemented: {0}")]
    MethodNotImplemented(String),

    /// The script threw or the returned promise rejected.
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// A resolved value did not match the expected shape.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A native value could not be converted to a dynamic value.
    #[error("Encode error: {0}")]
    Encode(String),

    /// The store backend failed.
    #[error("Store error: {0}")]
    Store(String),

    /// The execution context was torn down before the operation finished.
    #[error("Context closed: {0}")]
    ContextClosed(String),

    /// The caller stopped waiting for a call.
    #[error("Call to '{method}' timed out after {after:?}")]
    CallTimedOut { method: String, after: Duration },

    /// No runner is registered under the given id.
    #[error("Runner not found: {0}")]
    RunnerNotFound(String),

    /// The runner exists but is not of the requested kind.
    #[error("Runner '{id}' is not a {expected} runner")]
    RunnerKindMismatch { id: String, expected: String },

    /// Internal script engine failure.
    #[error("Engine error: {0}")]
    Engine(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<rquickjs::Error> for RuntimeError {
    fn from(err: rquickjs::Error) -> Self {
        RuntimeError::Engine(err.to_string())
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

/// An error thrown by script code, normalised to `{name, message}`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("[{name}] {message}")]
pub struct ScriptError {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
}

impl ScriptError {
    /// Name used when the thrown value carries none.
    pub const UNKNOWN_NAME: &'static str = "UnknownError";

    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }
}

/// Evaluation step during context creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalStage {
    Commons,
    Prelude,
    Runner,
    Auxiliary(String),
    Bootstrap,
}

impl fmt::Display for EvalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalStage::Commons => f.write_str("commons"),
            EvalStage::Prelude => f.write_str("prelude"),
            EvalStage::Runner => f.write_str("runner source"),
            EvalStage::Auxiliary(name) => write!(f, "auxiliary script '{}'", name),
            EvalStage::Bootstrap => f.write_str("bootstrap"),
        }
    }
}

/// Why a context failed to produce a root object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassInitFailure {
    /// Script code threw while being evaluated.
    Evaluation { stage: EvalStage, error: ScriptError },
    /// The bootstrap yielded something other than an object.
    NoRootObject { found: String },
    /// The engine itself could not be set up.
    Engine(String),
}

impl fmt::Display for ClassInitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassInitFailure::Evaluation { stage, error } => {
                write!(f, "{} threw during initialization: {}", stage, error)
            }
            ClassInitFailure::NoRootObject { found } => {
                write!(f, "bootstrap returned {} instead of an object", found)
            }
            ClassInitFailure::Engine(message) => write!(f, "engine setup failed: {}", message),
        }
    }
}
