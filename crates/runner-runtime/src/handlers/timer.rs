//! Timer capability.
//!
//! Sleeping happens in tasks on the host runtime; when a timer is due the
//! task posts `FireTimer` into the context mailbox and the callback runs on
//! the context thread like any other command.

use crate::capability::Capability;
use crate::context::{Command, Mailbox};
use rquickjs::function::Opt;
use rquickjs::{Ctx, Function, Object, Persistent, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::trace;

/// Shortest period an interval may have.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Snapshot of an active timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerHandle {
    pub id: String,
    pub repeat: bool,
    pub interval: Duration,
}

struct TimerEntry {
    callback: Persistent<Function<'static>>,
    repeat: bool,
    interval: Duration,
    task: AbortHandle,
}

/// Active timers of one context.
pub struct TimerRegistry {
    runner_id: String,
    next_id: Cell<u64>,
    timers: RefCell<HashMap<String, TimerEntry>>,
    mailbox: Mailbox,
    spawner: Handle,
}

impl TimerRegistry {
    pub(crate) fn new(runner_id: impl Into<String>, mailbox: Mailbox, spawner: Handle) -> Self {
        Self {
            runner_id: runner_id.into(),
            next_id: Cell::new(0),
            timers: RefCell::new(HashMap::new()),
            mailbox,
            spawner,
        }
    }

    /// Register a callback and start its sleeper. Returns the new timer id.
    pub(crate) fn schedule<'js>(
        &self,
        ctx: &Ctx<'js>,
        callback: Function<'js>,
        delay: Duration,
        repeat: bool,
    ) -> String {
        let next = self.next_id.get() + 1;
        self.next_id.set(next);
        let id = next.to_string();

        let interval = if repeat { delay.max(MIN_INTERVAL) } else { delay };
        let mailbox = self.mailbox.clone();
        let timer_id = id.clone();
        let task = self.spawner.spawn(async move {
            if repeat {
                let mut ticker = time::interval_at(Instant::now() + interval, interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    if !mailbox.post(Command::FireTimer {
                        id: timer_id.clone(),
                    }) {
                        break;
                    }
                }
            } else {
                time::sleep(interval).await;
                mailbox.post(Command::FireTimer { id: timer_id });
            }
        });

        trace!(runner = %self.runner_id, timer = %id, repeat, ?interval, "Timer scheduled");
        self.timers.borrow_mut().insert(
            id.clone(),
            TimerEntry {
                callback: Persistent::save(ctx, callback),
                repeat,
                interval,
                task: task.abort_handle(),
            },
        );
        id
    }

    /// Cancel a timer. Unknown ids are ignored.
    pub fn clear(&self, id: &str) {
        let entry = self.timers.borrow_mut().remove(id);
        if let Some(entry) = entry {
            entry.task.abort();
            trace!(runner = %self.runner_id, timer = %id, "Timer cleared");
        }
    }

    /// Callback to run for a due timer; one-shot timers are removed.
    pub(crate) fn take_due(&self, id: &str) -> Option<Persistent<Function<'static>>> {
        let mut timers = self.timers.borrow_mut();
        if timers.get(id)?.repeat {
            timers.get(id).map(|entry| entry.callback.clone())
        } else {
            timers.remove(id).map(|entry| entry.callback)
        }
    }

    pub fn active(&self) -> Vec<TimerHandle> {
        let mut handles: Vec<TimerHandle> = self
            .timers
            .borrow()
            .iter()
            .map(|(id, entry)| TimerHandle {
                id: id.clone(),
                repeat: entry.repeat,
                interval: entry.interval,
            })
            .collect();
        handles.sort_by_key(|handle| handle.id.parse::<u64>().unwrap_or(u64::MAX));
        handles
    }

    pub fn len(&self) -> usize {
        self.timers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.borrow().is_empty()
    }

    /// Abort every sleeper and release every callback.
    pub(crate) fn clear_all(&self) {
        let drained: Vec<TimerEntry> = self.timers.borrow_mut().drain().map(|(_, e)| e).collect();
        for entry in &drained {
            entry.task.abort();
        }
    }
}

/// Delay argument as script code passes it: missing or invalid means zero.
fn delay_from(value: Option<Value<'_>>) -> Duration {
    value
        .and_then(|v| v.as_number())
        .filter(|ms| ms.is_finite() && *ms > 0.0)
        .map(|ms| Duration::from_millis(ms as u64))
        .unwrap_or(Duration::ZERO)
}

/// Timer ids arrive as strings, or as numbers from code that coerced them.
fn id_from(value: Option<Value<'_>>) -> Option<String> {
    let value = value?;
    if let Some(s) = value.as_string() {
        return s.to_string().ok();
    }
    value
        .as_number()
        .filter(|n| n.is_finite() && n.fract() == 0.0 && *n >= 0.0)
        .map(|n| (n as u64).to_string())
}

pub(crate) fn install<'js>(ctx: &Ctx<'js>, timers: Rc<TimerRegistry>) -> rquickjs::Result<()> {
    let object = Object::new(ctx.clone())?;

    for (name, repeat) in [("setTimeout", false), ("setInterval", true)] {
        let registry = Rc::clone(&timers);
        object.set(
            name,
            Function::new(
                ctx.clone(),
                move |ctx: Ctx<'js>, callback: Function<'js>, delay: Opt<Value<'js>>| {
                    registry.schedule(&ctx, callback, delay_from(delay.0), repeat)
                },
            )?,
        )?;
    }

    for name in ["clearTimeout", "clearInterval"] {
        let registry = Rc::clone(&timers);
        object.set(
            name,
            Function::new(ctx.clone(), move |id: Opt<Value<'js>>| {
                if let Some(id) = id_from(id.0) {
                    registry.clear(&id);
                }
            })?,
        )?;
    }

    ctx.globals().set(Capability::Timer.global_name(), object)?;
    Ok(())
}
