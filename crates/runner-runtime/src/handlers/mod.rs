//! Capability handlers injected into execution contexts.
//!
//! Each handler is constructed per context with the owning runner id baked
//! in, and only the handlers for granted capabilities are installed.

pub mod log;
pub mod network;
pub mod store;
pub mod timer;

use crate::capability::{Capability, CapabilitySet};
use crate::value::DynamicValue;
use rquickjs::{Ctx, Function, Persistent};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use tokio::runtime::Handle;

pub use log::LogHandler;
pub use network::{NetworkHandler, UnauthorizedPolicy};
pub use store::ScopedStore;
pub use timer::{TimerHandle, TimerRegistry};

use crate::context::Mailbox;

/// Everything needed to install the handlers into one context.
pub(crate) struct HandlerEnv {
    pub capabilities: CapabilitySet,
    pub network: Arc<NetworkHandler>,
    pub store: ScopedStore,
    pub log: LogHandler,
    pub timers: Rc<TimerRegistry>,
    pub hostcalls: Rc<PendingHostcalls>,
    pub mailbox: Mailbox,
    pub spawner: Handle,
}

/// Install every granted handler under its global name.
pub(crate) fn install<'js>(ctx: &Ctx<'js>, env: &HandlerEnv) -> rquickjs::Result<()> {
    for capability in env.capabilities.iter() {
        match capability {
            Capability::Network => network::install(
                ctx,
                Arc::clone(&env.network),
                Rc::clone(&env.hostcalls),
                env.mailbox.clone(),
                env.spawner.clone(),
            )?,
            Capability::Store => store::install(ctx, env.store.clone())?,
            Capability::Log => log::install(ctx, env.log.clone())?,
            Capability::Timer => timer::install(ctx, Rc::clone(&env.timers))?,
        }
    }
    Ok(())
}

struct HostcallSlot {
    resolve: Persistent<Function<'static>>,
    reject: Persistent<Function<'static>>,
}

/// Script promises waiting on native work running off the context thread.
#[derive(Default)]
pub(crate) struct PendingHostcalls {
    next_id: Cell<u64>,
    slots: RefCell<HashMap<String, HostcallSlot>>,
}

impl PendingHostcalls {
    pub(crate) fn register<'js>(
        &self,
        ctx: &Ctx<'js>,
        resolve: Function<'js>,
        reject: Function<'js>,
    ) -> String {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let id = format!("hostcall-{}", id);
        self.slots.borrow_mut().insert(
            id.clone(),
            HostcallSlot {
                resolve: Persistent::save(ctx, resolve),
                reject: Persistent::save(ctx, reject),
            },
        );
        id
    }

    /// Settle a pending promise; unknown ids were torn down and are ignored.
    pub(crate) fn complete<'js>(
        &self,
        ctx: &Ctx<'js>,
        id: &str,
        outcome: Result<DynamicValue, DynamicValue>,
    ) -> rquickjs::Result<()> {
        let slot = self.slots.borrow_mut().remove(id);
        let Some(slot) = slot else {
            return Ok(());
        };
        match outcome {
            Ok(value) => slot.resolve.restore(ctx)?.call::<_, ()>((value,)),
            Err(reason) => slot.reject.restore(ctx)?.call::<_, ()>((reason,)),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub(crate) fn clear(&self) {
        self.slots.borrow_mut().clear();
    }
}
