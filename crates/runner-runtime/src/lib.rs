//! # runner-runtime
//!
//! Script runtime for executing content runners.
//!
//! This crate provides:
//! - Isolated execution contexts, one per runner, each on its own thread
//! - Capability handlers (network, store, log, timer) injected per context
//! - Typed marshaling between script values and Rust types
//! - Runner descriptor extraction and the method invocation protocol
//! - Runner manifests and discovery from well-known paths
//!
//! ## Runner Structure
//!
//! Runners are directories containing:
//! - `manifest.toml` - Runner id, kind, scripts and capabilities
//! - `runner.js` - Main script (name configurable)
//! - optional commons, auxiliary and bootstrap scripts
//!
//! ## Security Model
//!
//! A context only sees the handlers for the capabilities it was granted,
//! and every handler is bound to the owning runner's id.

pub mod capability;
pub mod context;
pub mod descriptor;
pub mod discovery;
pub mod error;
pub mod handlers;
pub mod host;
pub mod invoke;
pub mod manifest;
pub mod marshal;
pub mod scripts;
pub mod sources;
pub mod value;

pub use capability::{Capability, CapabilitySet};
pub use context::{ContextOptions, ExecutionContext};
pub use descriptor::{
    AuthenticationMethod, BasicAuthLabel, CatalogRating, RunnerConfig, RunnerDescriptor,
    RunnerInfo, RunnerIntents,
};
pub use discovery::{discover_in_directory, discover_runners, RunnerPath};
pub use error::{ClassInitFailure, EvalStage, RuntimeError, RuntimeResult, ScriptError};
pub use handlers::{ScopedStore, TimerHandle, UnauthorizedPolicy};
pub use host::{
    HostServices, HttpRequest, HttpTransport, LogLevel, MemoryStore, NetworkError,
    NetworkErrorKind, NetworkRequest, NetworkResponse, ReqwestTransport, StoreBackend,
};
pub use manifest::{RunnerKind, RunnerManifest};
pub use sources::RunnerSources;
pub use value::{decode, encode, DecodeError, DynamicValue};
