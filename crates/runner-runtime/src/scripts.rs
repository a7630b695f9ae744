//! Script snippets evaluated by the bridge itself.

/// Global holding the runner's identifier.
pub const RUNNER_ID_GLOBAL: &str = "RUNNER_ID";

/// Expression yielding the runner's declared intents.
///
/// Intents are a top-level declaration (`const RunnerIntents = {...}`) in the
/// runner's global scope rather than a member of the root object, so they
/// are read by evaluating an expression in the context.
pub const INTENTS_ACCESSOR: &str =
    r#"typeof RunnerIntents === "undefined" ? undefined : RunnerIntents"#;

/// Bootstrap used when the loader does not supply one.
///
/// Accepts either a class (instantiated) or a plain object bound to the
/// top-level name `RunnerTarget`.
pub const DEFAULT_BOOTSTRAP: &str = r#"(function () {
  if (typeof RunnerTarget === "function") {
    return new RunnerTarget();
  }
  if (typeof RunnerTarget === "object" && RunnerTarget !== null) {
    return RunnerTarget;
  }
  return undefined;
})()"#;

/// Conventional globals layered over the injected handlers.
pub(crate) const PRELUDE: &str = r#"(function (global) {
  "use strict";
  const timer = global.__bridge_timer;
  if (timer) {
    global.setTimeout = (callback, ms) => timer.setTimeout(callback, ms);
    global.clearTimeout = (id) => timer.clearTimeout(id);
    global.setInterval = (callback, ms) => timer.setInterval(callback, ms);
    global.clearInterval = (id) => timer.clearInterval(id);
  }

  const log = global.__bridge_log;
  if (log) {
    global.console = {
      log: (...args) => log.write("info", ...args),
      trace: (...args) => log.write("trace", ...args),
      debug: (...args) => log.write("debug", ...args),
      info: (...args) => log.write("info", ...args),
      warn: (...args) => log.write("warn", ...args),
      error: (...args) => log.write("error", ...args),
    };
  }

  const network = global.__bridge_network;
  if (network) {
    global.NetworkClient = {
      request: (request) => network.performRequest(request),
      get: (url, options) =>
        network.performRequest(Object.assign({}, options, { url, method: "GET" })),
      post: (url, options) =>
        network.performRequest(Object.assign({}, options, { url, method: "POST" })),
    };
  }

  const store = global.__bridge_store;
  if (store) {
    global.RunnerStore = {
      get: (key) => store.get(key),
      set: (key, value) => store.set(key, value),
      remove: (key) => store.remove(key),
    };
  }
})(globalThis);"#;

/// Factory for the per-context settle function.
///
/// Every method result (plain value or promise) is funnelled through
/// `Promise.resolve(...).then(...)` so exactly one of the native callbacks
/// fires, once, from the job queue.
pub(crate) const SETTLE_SHIM: &str = r#"(function (resolve, reject) {
  const P = Promise;
  const settleWith = P.resolve.bind(P);
  return function (id, value) {
    settleWith(value).then(
      function (result) { resolve(id, result); },
      function (error) { reject(id, error); }
    );
  };
})"#;
