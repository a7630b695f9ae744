//! # runner-host
//!
//! Host-side layer of the runner bridge.
//!
//! This crate is responsible for:
//! - Loading runners into execution contexts and reading their descriptors
//! - Typed fronts for source and tracker runners
//! - The registry that owns every loaded runner
//! - Configuration file handling and logging setup
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      RunnerRegistry                       │
//! │                                                           │
//! │   ┌───────────────┐               ┌────────────────┐      │
//! │   │ ContentSource │               │ ContentTracker │      │
//! │   └───────┬───────┘               └───────┬────────┘      │
//! │           └──────────────┬────────────────┘               │
//! │                    ┌─────▼─────┐                          │
//! │                    │  Runner   │  intents, call timeout   │
//! │                    └─────┬─────┘                          │
//! └──────────────────────────┼────────────────────────────────┘
//!                            ▼
//!              ┌───────────────────────────┐
//!              │ ExecutionContext (thread) │
//!              │ network · store · log ·   │
//!              │ timer handlers            │
//!              └─────────────┬─────────────┘
//!                            ▼
//!                  HostServices (transport, store)
//! ```
//!
//! ## Configuration
//!
//! The host reads configuration from
//! `$XDG_CONFIG_HOME/runner-bridge/config.toml`; see [`config::BridgeConfig`].

pub mod config;
pub mod logging;
pub mod models;
pub mod registry;
pub mod runner;
pub mod source;
pub mod tracker;

pub use config::{BridgeConfig, LoggingConfig, RunnersConfig, RuntimeConfig};
pub use registry::{LoadedRunner, RunnerRegistry, RunnerSummary};
pub use runner::Runner;
pub use source::ContentSource;
pub use tracker::ContentTracker;
