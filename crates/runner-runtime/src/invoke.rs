//! Method invocation protocol.
//!
//! Every call goes through the same path: look the method up on the root
//! object, call it with the runner as `this`, and wait for the result to
//! settle. The variants below differ only in what a missing method means
//! and what is done with the settled value.

use crate::context::{ExecutionContext, MissingMethod};
use crate::error::RuntimeResult;
use crate::value::{decode, DynamicValue};
use serde::de::DeserializeOwned;

impl ExecutionContext {
    /// Call a required method and decode its result.
    ///
    /// A missing method is [`RuntimeError::MethodNotFound`](crate::RuntimeError::MethodNotFound);
    /// a throw or rejection is [`RuntimeError::Script`](crate::RuntimeError::Script).
    pub async fn call_returning_decodable<T: DeserializeOwned>(
        &self,
        method: &str,
        args: Vec<DynamicValue>,
    ) -> RuntimeResult<T> {
        let value = self.invoke(method, args, MissingMethod::NotFound).await?;
        Ok(decode(&value)?)
    }

    /// Call an optional hook, discarding whatever it returns.
    ///
    /// A missing method is a no-op.
    pub async fn call_optional_void(
        &self,
        method: &str,
        args: Vec<DynamicValue>,
    ) -> RuntimeResult<()> {
        self.notify(method, args, MissingMethod::Ignore).await
    }

    /// Call a method belonging to an optional capability.
    ///
    /// A missing method is [`RuntimeError::MethodNotImplemented`](crate::RuntimeError::MethodNotImplemented).
    pub async fn call_capability<T: DeserializeOwned>(
        &self,
        method: &str,
        args: Vec<DynamicValue>,
    ) -> RuntimeResult<T> {
        let value = self
            .invoke(method, args, MissingMethod::NotImplemented)
            .await?;
        Ok(decode(&value)?)
    }

    /// Call a method and hand back the raw settled value.
    pub async fn call_dynamic(
        &self,
        method: &str,
        args: Vec<DynamicValue>,
    ) -> RuntimeResult<DynamicValue> {
        self.invoke(method, args, MissingMethod::NotFound).await
    }

    /// Whether the root object has a callable member named `method`.
    pub async fn method_exists(&self, method: &str) -> RuntimeResult<bool> {
        self.probe_method(method).await
    }
}
