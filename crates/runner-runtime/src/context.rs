//! Execution contexts.
//!
//! Every runner gets its own QuickJS runtime and context living on a
//! dedicated thread. The [`ExecutionContext`] handle talks to that thread
//! through a mailbox; async native work (HTTP, timer sleeps) runs on the
//! host's tokio runtime and posts its result back into the same mailbox, so
//! every callback into script code happens on the context's own thread.

use crate::capability::CapabilitySet;
use crate::descriptor::{self, RunnerDescriptor};
use crate::error::{ClassInitFailure, EvalStage, RuntimeError, RuntimeResult, ScriptError};
use crate::handlers::{
    self, HandlerEnv, LogHandler, NetworkHandler, PendingHostcalls, ScopedStore, TimerHandle,
    TimerRegistry, UnauthorizedPolicy,
};
use crate::host::HostServices;
use crate::marshal::{describe, is_plain_object, to_dynamic};
use crate::scripts::{INTENTS_ACCESSOR, RUNNER_ID_GLOBAL, SETTLE_SHIM};
use crate::sources::RunnerSources;
use crate::value::DynamicValue;
use rquickjs::function::{Rest, This};
use rquickjs::{CatchResultExt, Context, Ctx, Function, IntoJs, Object, Persistent, Runtime, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Per-context limits and grants.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// Handlers injected into the context.
    pub capabilities: CapabilitySet,

    /// Heap limit for the script runtime, in bytes.
    pub memory_limit: Option<usize>,

    /// Stack limit for the script runtime, in bytes.
    pub max_stack_size: Option<usize>,

    /// Timeout for network requests that do not set one.
    pub default_network_timeout: Duration,

    pub unauthorized_policy: UnauthorizedPolicy,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            capabilities: CapabilitySet::default(),
            memory_limit: None,
            max_stack_size: None,
            default_network_timeout: handlers::network::DEFAULT_NETWORK_TIMEOUT,
            unauthorized_policy: UnauthorizedPolicy::default(),
        }
    }
}

/// How an invocation treats a root object without the requested method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MissingMethod {
    NotFound,
    NotImplemented,
    Ignore,
}

impl MissingMethod {
    fn outcome(self, method: &str) -> RuntimeResult<DynamicValue> {
        match self {
            MissingMethod::NotFound => Err(RuntimeError::MethodNotFound(method.to_string())),
            MissingMethod::NotImplemented => {
                Err(RuntimeError::MethodNotImplemented(method.to_string()))
            }
            MissingMethod::Ignore => Ok(DynamicValue::Null),
        }
    }
}

type Reply<T> = oneshot::Sender<RuntimeResult<T>>;

/// Work items processed by a context thread, in arrival order.
pub(crate) enum Command {
    Describe {
        reply: Reply<RunnerDescriptor>,
    },
    Invoke {
        method: String,
        args: Vec<DynamicValue>,
        on_missing: MissingMethod,
        discard: bool,
        reply: Reply<DynamicValue>,
    },
    MethodExists {
        method: String,
        reply: Reply<bool>,
    },
    ActiveTimers {
        reply: Reply<Vec<TimerHandle>>,
    },
    PendingCalls {
        reply: Reply<usize>,
    },
    FireTimer {
        id: String,
    },
    CompleteHostcall {
        id: String,
        outcome: Result<DynamicValue, DynamicValue>,
    },
    Shutdown,
}

/// Sending half of a context mailbox.
#[derive(Clone)]
pub(crate) struct Mailbox {
    sender: mpsc::UnboundedSender<Command>,
}

impl Mailbox {
    /// Queue a command; false once the context thread has exited.
    pub(crate) fn post(&self, command: Command) -> bool {
        self.sender.send(command).is_ok()
    }
}

/// Handle to a runner's isolated script context.
pub struct ExecutionContext {
    runner_id: String,
    mailbox: Mailbox,
    closed: Arc<AtomicBool>,
}

impl ExecutionContext {
    /// Create a context and evaluate the runner's scripts into it.
    ///
    /// Must be called from within a tokio runtime; that runtime carries all
    /// of the context's async native work.
    pub async fn create(
        sources: RunnerSources,
        services: HostServices,
        options: ContextOptions,
    ) -> RuntimeResult<Self> {
        let spawner = Handle::try_current().map_err(|e| {
            RuntimeError::RunnerClassInitFailed(ClassInitFailure::Engine(format!(
                "no async runtime available: {}",
                e
            )))
        })?;

        let options = sources.apply_to(options);
        let runner_id = sources.id.clone();
        let (sender, inbox) = mpsc::unbounded_channel();
        let mailbox = Mailbox { sender };
        let closed = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel();

        let thread_mailbox = mailbox.clone();
        let thread_closed = Arc::clone(&closed);
        std::thread::Builder::new()
            .name(format!("runner-{}", runner_id))
            .spawn(move || {
                let actor = match ContextActor::boot(&sources, services, &options, thread_mailbox, spawner)
                {
                    Ok(actor) => actor,
                    Err(e) => {
                        thread_closed.store(true, Ordering::SeqCst);
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                actor.run(inbox);
                thread_closed.store(true, Ordering::SeqCst);
            })
            .map_err(|e| {
                RuntimeError::RunnerClassInitFailed(ClassInitFailure::Engine(format!(
                    "failed to start context thread: {}",
                    e
                )))
            })?;

        ready_rx.await.map_err(|_| {
            RuntimeError::RunnerClassInitFailed(ClassInitFailure::Engine(
                "context thread exited during initialization".to_string(),
            ))
        })??;

        info!(runner = %runner_id, "Execution context created");
        Ok(Self {
            runner_id,
            mailbox,
            closed,
        })
    }

    pub fn runner_id(&self) -> &str {
        &self.runner_id
    }

    /// Tear the context down. Outstanding calls fail with `ContextClosed`.
    pub fn destroy(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.mailbox.post(Command::Shutdown);
            info!(runner = %self.runner_id, "Execution context destroyed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Read `info`, intents and `config` from the runner.
    pub async fn extract_descriptor(&self) -> RuntimeResult<RunnerDescriptor> {
        self.request(|reply| Command::Describe { reply }).await
    }

    /// Timers currently registered in the context.
    pub async fn active_timers(&self) -> RuntimeResult<Vec<TimerHandle>> {
        self.request(|reply| Command::ActiveTimers { reply }).await
    }

    /// Calls started in the context whose caller is still waiting.
    pub async fn pending_calls(&self) -> RuntimeResult<usize> {
        self.request(|reply| Command::PendingCalls { reply }).await
    }

    pub(crate) async fn invoke(
        &self,
        method: &str,
        args: Vec<DynamicValue>,
        on_missing: MissingMethod,
    ) -> RuntimeResult<DynamicValue> {
        self.dispatch(method, args, on_missing, false).await
    }

    /// Invoke for effect only. The settled value is never converted, so a
    /// result script code cannot marshal does not fail the call.
    pub(crate) async fn notify(
        &self,
        method: &str,
        args: Vec<DynamicValue>,
        on_missing: MissingMethod,
    ) -> RuntimeResult<()> {
        self.dispatch(method, args, on_missing, true).await.map(|_| ())
    }

    async fn dispatch(
        &self,
        method: &str,
        args: Vec<DynamicValue>,
        on_missing: MissingMethod,
        discard: bool,
    ) -> RuntimeResult<DynamicValue> {
        let method = method.to_string();
        self.request(|reply| Command::Invoke {
            method,
            args,
            on_missing,
            discard,
            reply,
        })
        .await
    }

    pub(crate) async fn probe_method(&self, method: &str) -> RuntimeResult<bool> {
        let method = method.to_string();
        self.request(|reply| Command::MethodExists { method, reply })
            .await
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> RuntimeResult<T> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        let (reply, response) = oneshot::channel();
        if !self.mailbox.post(build(reply)) {
            return Err(self.closed_error());
        }
        response.await.map_err(|_| self.closed_error())?
    }

    fn closed_error(&self) -> RuntimeError {
        RuntimeError::ContextClosed(self.runner_id.clone())
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("runner_id", &self.runner_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct PendingCall {
    method: String,
    discard: bool,
    reply: Reply<DynamicValue>,
}

/// Calls waiting for their result to settle inside the context.
#[derive(Default)]
struct CallTable {
    next_id: Cell<u64>,
    pending: RefCell<HashMap<String, PendingCall>>,
    settled: RefCell<Vec<(String, RuntimeResult<DynamicValue>)>>,
}

impl CallTable {
    fn next_id(&self) -> String {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        format!("call-{}", id)
    }

    fn settle(&self, id: String, outcome: RuntimeResult<DynamicValue>) {
        self.settled.borrow_mut().push((id, outcome));
    }

    /// Whether someone still waits for the value `id` settles with.
    fn wants_value(&self, id: &str) -> bool {
        self.pending
            .borrow()
            .get(id)
            .is_some_and(|call| !call.discard && !call.reply.is_closed())
    }

    /// Drop calls whose caller gave up; their results are not delivered.
    fn prune_abandoned(&self) -> usize {
        let mut pending = self.pending.borrow_mut();
        let before = pending.len();
        pending.retain(|_, call| !call.reply.is_closed());
        before - pending.len()
    }

    fn clear(&self) {
        self.pending.borrow_mut().clear();
        self.settled.borrow_mut().clear();
    }
}

enum CallStart {
    Pending(String),
    Missing,
}

/// State owned by the context thread.
///
/// Persistent handles must be released before the context and runtime they
/// belong to, so teardown clears them first and the runtime is declared last.
struct ContextActor {
    runner_id: String,
    root: Option<Persistent<Object<'static>>>,
    settle: Option<Persistent<Function<'static>>>,
    calls: Rc<CallTable>,
    hostcalls: Rc<PendingHostcalls>,
    timers: Rc<TimerRegistry>,
    context: Context,
    runtime: Runtime,
}

impl ContextActor {
    fn boot(
        sources: &RunnerSources,
        services: HostServices,
        options: &ContextOptions,
        mailbox: Mailbox,
        spawner: Handle,
    ) -> RuntimeResult<Self> {
        let engine = |e: rquickjs::Error| {
            RuntimeError::RunnerClassInitFailed(ClassInitFailure::Engine(e.to_string()))
        };
        let runtime = Runtime::new().map_err(engine)?;
        if let Some(limit) = options.memory_limit {
            runtime.set_memory_limit(limit);
        }
        if let Some(size) = options.max_stack_size {
            runtime.set_max_stack_size(size);
        }
        let context = Context::full(&runtime).map_err(engine)?;

        let mut actor = Self {
            runner_id: sources.id.clone(),
            root: None,
            settle: None,
            calls: Rc::new(CallTable::default()),
            hostcalls: Rc::new(PendingHostcalls::default()),
            timers: Rc::new(TimerRegistry::new(
                sources.id.clone(),
                mailbox.clone(),
                spawner.clone(),
            )),
            context,
            runtime,
        };

        let store = ScopedStore::new(sources.id.clone(), services.store);
        let env = HandlerEnv {
            capabilities: options.capabilities.clone(),
            network: Arc::new(NetworkHandler::new(
                sources.id.clone(),
                services.transport,
                store.clone(),
                options.default_network_timeout,
                options.unauthorized_policy.clone(),
            )),
            store,
            log: LogHandler::new(sources.id.clone()),
            timers: Rc::clone(&actor.timers),
            hostcalls: Rc::clone(&actor.hostcalls),
            mailbox,
            spawner,
        };

        actor.initialize(sources, &env)?;
        actor.pump();
        Ok(actor)
    }

    fn initialize(&mut self, sources: &RunnerSources, env: &HandlerEnv) -> RuntimeResult<()> {
        let calls = Rc::clone(&self.calls);
        let (root, settle) = self.context.with(|ctx| -> RuntimeResult<_> {
            let settle = settle_function(&ctx, calls).map_err(|e| {
                RuntimeError::RunnerClassInitFailed(ClassInitFailure::Engine(e.to_string()))
            })?;

            ctx.globals()
                .set(RUNNER_ID_GLOBAL, sources.id.as_str())
                .map_err(|e| {
                    RuntimeError::RunnerClassInitFailed(ClassInitFailure::Engine(e.to_string()))
                })?;

            evaluate(&ctx, EvalStage::Commons, &sources.commons)?;

            handlers::install(&ctx, env).map_err(|e| {
                RuntimeError::RunnerClassInitFailed(ClassInitFailure::Engine(e.to_string()))
            })?;
            evaluate(&ctx, EvalStage::Prelude, crate::scripts::PRELUDE)?;

            evaluate(&ctx, EvalStage::Runner, &sources.main)?;
            for (name, text) in &sources.auxiliary {
                evaluate(&ctx, EvalStage::Auxiliary(name.clone()), text)?;
            }

            let root = evaluate(&ctx, EvalStage::Bootstrap, sources.bootstrap())?;
            if !is_plain_object(&root) {
                return Err(RuntimeError::RunnerClassInitFailed(
                    ClassInitFailure::NoRootObject {
                        found: describe(&root).to_string(),
                    },
                ));
            }
            let root = root.into_object().ok_or_else(|| {
                RuntimeError::RunnerClassInitFailed(ClassInitFailure::NoRootObject {
                    found: "a non-object".to_string(),
                })
            })?;

            Ok((Persistent::save(&ctx, root), Persistent::save(&ctx, settle)))
        })?;

        self.root = Some(root);
        self.settle = Some(settle);
        Ok(())
    }

    fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = inbox.blocking_recv() {
            if matches!(command, Command::Shutdown) {
                break;
            }
            self.handle(command);
            self.pump();
        }
        debug!(
            runner = %self.runner_id,
            timers = self.timers.len(),
            hostcalls = self.hostcalls.len(),
            calls = self.calls.pending.borrow().len(),
            "Context thread shutting down"
        );
        self.teardown();
    }

    fn handle(&self, command: Command) {
        match command {
            Command::Describe { reply } => {
                let _ = reply.send(self.describe());
            }
            Command::Invoke {
                method,
                args,
                on_missing,
                discard,
                reply,
            } => self.start_call(method, args, on_missing, discard, reply),
            Command::MethodExists { method, reply } => {
                let _ = reply.send(self.method_exists(&method));
            }
            Command::ActiveTimers { reply } => {
                let _ = reply.send(Ok(self.timers.active()));
            }
            Command::PendingCalls { reply } => {
                self.calls.prune_abandoned();
                let _ = reply.send(Ok(self.calls.pending.borrow().len()));
            }
            Command::FireTimer { id } => self.fire_timer(&id),
            Command::CompleteHostcall { id, outcome } => {
                let result = self
                    .context
                    .with(|ctx| self.hostcalls.complete(&ctx, &id, outcome));
                if let Err(e) = result {
                    warn!(runner = %self.runner_id, hostcall = %id, "Failed to settle hostcall: {}", e);
                }
            }
            Command::Shutdown => {}
        }
    }

    fn root(&self) -> RuntimeResult<Persistent<Object<'static>>> {
        self.root
            .clone()
            .ok_or_else(|| RuntimeError::ContextClosed(self.runner_id.clone()))
    }

    fn start_call(
        &self,
        method: String,
        args: Vec<DynamicValue>,
        on_missing: MissingMethod,
        discard: bool,
        reply: Reply<DynamicValue>,
    ) {
        let (Ok(root), Some(settle)) = (self.root(), self.settle.clone()) else {
            let _ = reply.send(Err(RuntimeError::ContextClosed(self.runner_id.clone())));
            return;
        };

        let started = self.context.with(|ctx| -> RuntimeResult<CallStart> {
            let root = root.restore(&ctx)?;
            let member: Value = root
                .get(method.as_str())
                .catch(&ctx)
                .map_err(|caught| RuntimeError::Script(ScriptError::from_caught(caught)))?;
            let Some(function) = member.as_function() else {
                return Ok(CallStart::Missing);
            };

            let args = args
                .into_iter()
                .map(|arg| arg.into_js(&ctx))
                .collect::<rquickjs::Result<Vec<_>>>()?;
            let result: Value = function
                .call((This(root.clone()), Rest(args)))
                .catch(&ctx)
                .map_err(|caught| RuntimeError::Script(ScriptError::from_caught(caught)))?;

            let id = self.calls.next_id();
            settle
                .restore(&ctx)?
                .call::<_, ()>((id.as_str(), result))?;
            Ok(CallStart::Pending(id))
        });

        match started {
            Ok(CallStart::Pending(id)) => {
                debug!(runner = %self.runner_id, method = %method, call = %id, "Call started");
                let call = PendingCall {
                    method,
                    discard,
                    reply,
                };
                self.calls.pending.borrow_mut().insert(id, call);
            }
            Ok(CallStart::Missing) => {
                debug!(runner = %self.runner_id, method = %method, "Method not present");
                let _ = reply.send(on_missing.outcome(&method));
            }
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        }
    }

    fn method_exists(&self, method: &str) -> RuntimeResult<bool> {
        let root = self.root()?;
        self.context.with(|ctx| {
            let root = root.restore(&ctx)?;
            let member: Value = root
                .get(method)
                .catch(&ctx)
                .map_err(|caught| RuntimeError::Script(ScriptError::from_caught(caught)))?;
            Ok(member.is_function())
        })
    }

    fn describe(&self) -> RuntimeResult<RunnerDescriptor> {
        let root = self.root()?;
        let (info, intents, config) = self.context.with(|ctx| -> RuntimeResult<_> {
            let root = root.restore(&ctx)?;

            let info: Value = root.get("info").catch(&ctx).map_err(|caught| {
                RuntimeError::RunnerInfoInitFailed(ScriptError::from_caught(caught).to_string())
            })?;
            if !is_plain_object(&info) {
                return Err(RuntimeError::RunnerInfoInitFailed(format!(
                    "expected `info` to be an object, found {}",
                    describe(&info)
                )));
            }
            let info = to_dynamic(&info)
                .map_err(|e| RuntimeError::RunnerInfoInitFailed(e.to_string()))?;

            let intents: Value = ctx.eval(INTENTS_ACCESSOR).catch(&ctx).map_err(|caught| {
                RuntimeError::FailedToParseRunnerIntents(
                    ScriptError::from_caught(caught).to_string(),
                )
            })?;
            if !is_plain_object(&intents) {
                return Err(RuntimeError::FailedToParseRunnerIntents(format!(
                    "expected intents to be an object, found {}",
                    describe(&intents)
                )));
            }
            let intents = to_dynamic(&intents)
                .map_err(|e| RuntimeError::FailedToParseRunnerIntents(e.to_string()))?;

            let config = match root.get::<_, Value>("config").catch(&ctx) {
                Ok(value) if value.is_undefined() || value.is_null() => None,
                Ok(value) => match to_dynamic(&value) {
                    Ok(config) => Some(config),
                    Err(e) => {
                        warn!(runner = %self.runner_id, "Ignoring unreadable config: {}", e);
                        None
                    }
                },
                Err(caught) => {
                    warn!(
                        runner = %self.runner_id,
                        "Ignoring config that threw: {}",
                        ScriptError::from_caught(caught)
                    );
                    None
                }
            };

            Ok((info, intents, config))
        })?;

        descriptor::assemble(&self.runner_id, info, intents, config)
    }

    fn fire_timer(&self, id: &str) {
        let Some(callback) = self.timers.take_due(id) else {
            return;
        };
        let result = self.context.with(|ctx| -> Result<(), ScriptError> {
            let callback = callback
                .restore(&ctx)
                .map_err(|e| ScriptError::new("EngineError", e.to_string()))?;
            callback
                .call::<_, ()>(())
                .catch(&ctx)
                .map_err(ScriptError::from_caught)
        });
        if let Err(e) = result {
            warn!(runner = %self.runner_id, timer = %id, "Timer callback threw: {}", e);
        }
    }

    /// Run queued promise jobs, then deliver every call that settled.
    fn pump(&self) {
        loop {
            match self.runtime.execute_pending_job() {
                Ok(true) => continue,
                Ok(false) => break,
                Err(_) => {
                    let error = self.context.with(|ctx| ScriptError::from_value(&ctx.catch()));
                    warn!(runner = %self.runner_id, "Pending job failed: {}", error);
                }
            }
        }

        let settled: Vec<_> = self.calls.settled.borrow_mut().drain(..).collect();
        for (id, outcome) in settled {
            let call = self.calls.pending.borrow_mut().remove(&id);
            if let Some(call) = call {
                debug!(
                    runner = %self.runner_id,
                    method = %call.method,
                    call = %id,
                    ok = outcome.is_ok(),
                    "Call settled"
                );
                let _ = call.reply.send(outcome);
            }
        }

        let abandoned = self.calls.prune_abandoned();
        if abandoned > 0 {
            debug!(runner = %self.runner_id, abandoned, "Dropped calls nobody awaits");
        }
    }

    fn teardown(&mut self) {
        self.timers.clear_all();
        self.hostcalls.clear();
        self.calls.clear();
        self.settle = None;
        self.root = None;
    }
}

impl Drop for ContextActor {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn evaluate<'js>(ctx: &Ctx<'js>, stage: EvalStage, source: &str) -> RuntimeResult<Value<'js>> {
    ctx.eval::<Value, _>(source).catch(ctx).map_err(|caught| {
        RuntimeError::RunnerClassInitFailed(ClassInitFailure::Evaluation {
            stage,
            error: ScriptError::from_caught(caught),
        })
    })
}

/// Build the function every call result is routed through.
fn settle_function<'js>(ctx: &Ctx<'js>, calls: Rc<CallTable>) -> rquickjs::Result<Function<'js>> {
    let resolved = Rc::clone(&calls);
    let resolve = Function::new(ctx.clone(), move |id: String, value: Value<'js>| {
        let outcome = if resolved.wants_value(&id) {
            to_dynamic(&value).map_err(|e| RuntimeError::Encode(e.to_string()))
        } else {
            Ok(DynamicValue::Null)
        };
        resolved.settle(id, outcome);
    })?;
    let reject = Function::new(ctx.clone(), move |id: String, reason: Value<'js>| {
        calls.settle(id, Err(RuntimeError::Script(ScriptError::from_value(&reason))));
    })?;

    let factory: Function = ctx.eval(SETTLE_SHIM)?;
    factory.call((resolve, reject))
}
