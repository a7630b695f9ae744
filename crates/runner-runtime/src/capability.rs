//! Capabilities injectable into a runner context.
//!
//! A context only receives the handlers for the capabilities granted to it,
//! so the surface a runner can reach is exactly the set listed here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A capability handler that can be injected into a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// HTTP requests through the host transport.
    Network,

    /// Per-runner key/value storage.
    Store,

    /// Logging into the host's tracing output.
    Log,

    /// `setTimeout` / `setInterval` timers.
    Timer,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Network,
        Capability::Store,
        Capability::Log,
        Capability::Timer,
    ];

    /// Parse a capability from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "network" => Some(Capability::Network),
            "store" => Some(Capability::Store),
            "log" => Some(Capability::Log),
            "timer" => Some(Capability::Timer),
            _ => None,
        }
    }

    /// Convert capability to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Network => "network",
            Capability::Store => "store",
            Capability::Log => "log",
            Capability::Timer => "timer",
        }
    }

    /// Global name the handler object is installed under.
    pub fn global_name(&self) -> &'static str {
        match self {
            Capability::Network => "__bridge_network",
            Capability::Store => "__bridge_store",
            Capability::Log => "__bridge_log",
            Capability::Timer => "__bridge_timer",
        }
    }
}

/// A set of capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    capabilities: BTreeSet<Capability>,
}

impl CapabilitySet {
    /// Create an empty capability set.
    pub fn new() -> Self {
        Self {
            capabilities: BTreeSet::new(),
        }
    }

    /// Every capability the bridge knows about.
    pub fn all() -> Self {
        Capability::ALL.into_iter().collect()
    }

    /// Create a capability set from capability names, returning unknown names separately.
    pub fn from_strings<I, S>(strings: I) -> (Self, Vec<String>)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        let mut unknown = Vec::new();
        for s in strings {
            match Capability::parse(s.as_ref()) {
                Some(cap) => set.add(cap),
                None => unknown.push(s.as_ref().to_string()),
            }
        }
        (set, unknown)
    }

    /// Add a capability to the set.
    pub fn add(&mut self, cap: Capability) {
        self.capabilities.insert(cap);
    }

    /// Check if the set contains a capability.
    pub fn has(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }

    /// Get all capabilities in the set.
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.capabilities.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

impl Default for CapabilitySet {
    fn default() -> Self {
        Self::all()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self {
            capabilities: iter.into_iter().collect(),
        }
    }
}
