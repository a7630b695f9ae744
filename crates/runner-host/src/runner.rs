//! # Runner Handle
//!
//! A loaded runner: its execution context plus the descriptor read out of it
//! at load time. Every call the host makes goes through this handle, which
//! applies intent gating and the optional caller-side timeout.

use crate::models::User;
use runner_runtime::{
    ContextOptions, DynamicValue, ExecutionContext, HostServices, RunnerConfig, RunnerDescriptor,
    RunnerInfo, RunnerIntents, RunnerKind, RunnerSources, RuntimeError, RuntimeResult,
};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A runner with a live execution context.
pub struct Runner {
    context: ExecutionContext,
    descriptor: RunnerDescriptor,
    kind: RunnerKind,
    call_timeout: Option<Duration>,
}

impl Runner {
    /// Create the runner's context and extract its descriptor.
    ///
    /// If the descriptor cannot be read the context is destroyed before the
    /// error is returned.
    pub async fn load(
        sources: RunnerSources,
        services: HostServices,
        options: ContextOptions,
    ) -> RuntimeResult<Self> {
        let kind = sources.kind;
        let id = sources.id.clone();

        let context = ExecutionContext::create(sources, services, options).await?;
        let descriptor = match context.extract_descriptor().await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(runner = %id, "Descriptor extraction failed: {}", e);
                context.destroy();
                return Err(e);
            }
        };

        info!(
            runner = %id,
            kind = %kind,
            name = %descriptor.info.name,
            version = descriptor.info.version,
            "Runner loaded"
        );
        Ok(Self {
            context,
            descriptor,
            kind,
            call_timeout: None,
        })
    }

    /// Stop waiting for any call after `timeout`.
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn id(&self) -> &str {
        self.context.runner_id()
    }

    pub fn descriptor(&self) -> &RunnerDescriptor {
        &self.descriptor
    }

    pub fn info(&self) -> &RunnerInfo {
        &self.descriptor.info
    }

    pub fn intents(&self) -> &RunnerIntents {
        &self.descriptor.intents
    }

    pub fn config(&self) -> Option<&RunnerConfig> {
        self.descriptor.config.as_ref()
    }

    pub fn kind(&self) -> RunnerKind {
        self.kind
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout
    }

    pub fn is_closed(&self) -> bool {
        self.context.is_closed()
    }

    /// Call a required method and decode its result.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        args: Vec<DynamicValue>,
    ) -> RuntimeResult<T> {
        debug!(runner = %self.id(), method = %method, "Calling runner method");
        self.bounded(method, self.context.call_returning_decodable(method, args))
            .await
    }

    /// Call an optional hook. Missing hooks are a no-op.
    pub async fn notify(&self, method: &str, args: Vec<DynamicValue>) -> RuntimeResult<()> {
        debug!(runner = %self.id(), method = %method, "Notifying runner");
        self.bounded(method, self.context.call_optional_void(method, args))
            .await
    }

    pub async fn has_method(&self, method: &str) -> RuntimeResult<bool> {
        self.bounded(method, self.context.method_exists(method)).await
    }

    /// Call a method that belongs to an optional capability.
    ///
    /// `declared` is the runner's intent for that capability. An undeclared
    /// capability fails without entering the context.
    pub async fn call_gated<T: DeserializeOwned>(
        &self,
        method: &str,
        declared: bool,
        args: Vec<DynamicValue>,
    ) -> RuntimeResult<T> {
        if !declared {
            debug!(runner = %self.id(), method = %method, "Capability not declared");
            return Err(RuntimeError::MethodNotImplemented(method.to_string()));
        }
        self.bounded(method, self.context.call_capability(method, args))
            .await
    }

    /// Call an optional hook that is only delivered when `declared`.
    pub async fn notify_gated(
        &self,
        method: &str,
        declared: bool,
        args: Vec<DynamicValue>,
    ) -> RuntimeResult<()> {
        if !declared {
            return Ok(());
        }
        self.notify(method, args).await
    }

    /// The account currently signed in to the runner's service, if any.
    pub async fn get_authenticated_user(&self) -> RuntimeResult<Option<User>> {
        self.call_gated(
            "getAuthenticatedUser",
            self.intents().is_authenticatable,
            Vec::new(),
        )
        .await
    }

    pub async fn handle_basic_auth(&self, identifier: &str, password: &str) -> RuntimeResult<()> {
        let _: DynamicValue = self
            .call_gated(
                "handleBasicAuth",
                self.intents().uses_basic_auth(),
                vec![identifier.into(), password.into()],
            )
            .await?;
        Ok(())
    }

    pub async fn handle_user_sign_out(&self) -> RuntimeResult<()> {
        self.notify_gated(
            "handleUserSignOut",
            self.intents().is_authenticatable,
            Vec::new(),
        )
        .await
    }

    /// Destroy the context. Calls still in flight fail with `ContextClosed`.
    pub fn unload(&self) {
        self.context.destroy();
    }

    async fn bounded<T>(
        &self,
        method: &str,
        call: impl Future<Output = RuntimeResult<T>>,
    ) -> RuntimeResult<T> {
        match self.call_timeout {
            Some(after) => tokio::time::timeout(after, call).await.map_err(|_| {
                warn!(runner = %self.id(), method = %method, "Call timed out after {:?}", after);
                RuntimeError::CallTimedOut {
                    method: method.to_string(),
                    after,
                }
            })?,
            None => call.await,
        }
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("id", &self.id())
            .field("kind", &self.kind)
            .field("version", &self.descriptor.info.version)
            .field("closed", &self.is_closed())
            .finish()
    }
}
