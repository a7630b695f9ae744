//! Store capability: per-runner key/value access.

use crate::capability::Capability;
use crate::error::RuntimeResult;
use crate::host::StoreBackend;
use crate::value::DynamicValue;
use rquickjs::{Ctx, Exception, Function, Object};
use std::fmt;
use std::sync::Arc;

/// A view of the shared backend restricted to one runner's keys.
#[derive(Clone)]
pub struct ScopedStore {
    runner_id: String,
    backend: Arc<dyn StoreBackend>,
}

impl ScopedStore {
    pub fn new(runner_id: impl Into<String>, backend: Arc<dyn StoreBackend>) -> Self {
        Self {
            runner_id: runner_id.into(),
            backend,
        }
    }

    pub fn runner_id(&self) -> &str {
        &self.runner_id
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}::{}", self.runner_id, key)
    }

    pub fn get(&self, key: &str) -> RuntimeResult<Option<String>> {
        self.backend.get(&self.scoped(key))
    }

    pub fn set(&self, key: &str, value: &str) -> RuntimeResult<()> {
        self.backend.set(&self.scoped(key), value)
    }

    pub fn remove(&self, key: &str) -> RuntimeResult<()> {
        self.backend.remove(&self.scoped(key))
    }
}

impl fmt::Debug for ScopedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedStore")
            .field("runner_id", &self.runner_id)
            .finish_non_exhaustive()
    }
}

pub(crate) fn install<'js>(ctx: &Ctx<'js>, store: ScopedStore) -> rquickjs::Result<()> {
    let object = Object::new(ctx.clone())?;

    let get = store.clone();
    object.set(
        "get",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, key: String| -> rquickjs::Result<DynamicValue> {
                get.get(&key)
                    .map(DynamicValue::from)
                    .map_err(|e| Exception::throw_message(&ctx, &e.to_string()))
            },
        )?,
    )?;

    let set = store.clone();
    object.set(
        "set",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, key: String, value: String| -> rquickjs::Result<()> {
                set.set(&key, &value)
                    .map_err(|e| Exception::throw_message(&ctx, &e.to_string()))
            },
        )?,
    )?;

    object.set(
        "remove",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, key: String| -> rquickjs::Result<()> {
                store
                    .remove(&key)
                    .map_err(|e| Exception::throw_message(&ctx, &e.to_string()))
            },
        )?,
    )?;

    ctx.globals().set(Capability::Store.global_name(), object)?;
    Ok(())
}
