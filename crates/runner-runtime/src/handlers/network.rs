//! Network capability: `__bridge_network.performRequest(request)`.

use super::store::ScopedStore;
use super::PendingHostcalls;
use crate::capability::Capability;
use crate::context::{Command, Mailbox};
use crate::host::{HttpTransport, NetworkError, NetworkRequest, NetworkResponse};
use crate::marshal::error_value;
use crate::value::{decode, encode, DynamicValue};
use rquickjs::{Ctx, Function, Object, Promise};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Default request timeout when the runner gives none.
pub const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(30);

/// What to do when a response comes back `401 Unauthorized`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UnauthorizedPolicy {
    /// Hand the response to the runner untouched.
    #[default]
    Ignore,

    /// Remove these keys from the runner's store before resolving.
    ClearStoreKeys(Vec<String>),
}

/// Per-runner network handler.
pub struct NetworkHandler {
    runner_id: String,
    transport: Arc<dyn HttpTransport>,
    store: ScopedStore,
    default_timeout: Duration,
    unauthorized: UnauthorizedPolicy,
}

impl NetworkHandler {
    pub fn new(
        runner_id: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        store: ScopedStore,
        default_timeout: Duration,
        unauthorized: UnauthorizedPolicy,
    ) -> Self {
        Self {
            runner_id: runner_id.into(),
            transport,
            store,
            default_timeout,
            unauthorized,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Send a request through the host transport.
    pub async fn perform(&self, request: NetworkRequest) -> Result<NetworkResponse, NetworkError> {
        let request = request.prepare(self.default_timeout);
        debug!(
            runner = %self.runner_id,
            method = %request.method,
            url = %request.url,
            timeout_ms = request.timeout.as_millis() as u64,
            "Performing request"
        );

        let response = self.transport.send(request).await?;
        if response.status == 401 {
            self.on_unauthorized();
        }
        Ok(response)
    }

    fn on_unauthorized(&self) {
        let UnauthorizedPolicy::ClearStoreKeys(keys) = &self.unauthorized else {
            return;
        };
        for key in keys {
            if let Err(e) = self.store.remove(key) {
                warn!(runner = %self.runner_id, key = %key, "Failed to clear key after 401: {}", e);
            }
        }
        debug!(runner = %self.runner_id, cleared = keys.len(), "Cleared stored credentials after 401");
    }
}

/// Error object a failed request rejects with.
pub(crate) fn network_error_value(err: &NetworkError) -> DynamicValue {
    let mut value = error_value("NetworkError", &err.message);
    if let DynamicValue::Map(map) = &mut value {
        map.insert("kind".to_string(), err.kind.as_str().into());
    }
    value
}

pub(crate) fn install<'js>(
    ctx: &Ctx<'js>,
    handler: Arc<NetworkHandler>,
    hostcalls: Rc<PendingHostcalls>,
    mailbox: Mailbox,
    spawner: Handle,
) -> rquickjs::Result<()> {
    let object = Object::new(ctx.clone())?;
    object.set(
        "performRequest",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, request: DynamicValue| -> rquickjs::Result<Promise<'js>> {
                perform_request(&ctx, &handler, &hostcalls, &mailbox, &spawner, request)
            },
        )?,
    )?;
    ctx.globals().set(Capability::Network.global_name(), object)?;
    Ok(())
}

fn perform_request<'js>(
    ctx: &Ctx<'js>,
    handler: &Arc<NetworkHandler>,
    hostcalls: &PendingHostcalls,
    mailbox: &Mailbox,
    spawner: &Handle,
    request: DynamicValue,
) -> rquickjs::Result<Promise<'js>> {
    let (promise, resolve, reject) = ctx.promise()?;

    let request: NetworkRequest = match decode(&request) {
        Ok(request) => request,
        Err(e) => {
            let reason = error_value("TypeError", &format!("invalid network request: {}", e));
            reject.call::<_, ()>((reason,))?;
            return Ok(promise);
        }
    };

    let id = hostcalls.register(ctx, resolve, reject);
    let handler = Arc::clone(handler);
    let mailbox = mailbox.clone();
    spawner.spawn(async move {
        let outcome = match handler.perform(request).await {
            Ok(response) => encode(&response)
                .map_err(|e| error_value("EncodeError", &e.to_string())),
            Err(e) => Err(network_error_value(&e)),
        };
        mailbox.post(Command::CompleteHostcall { id, outcome });
    });

    Ok(promise)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HttpRequest, MemoryStore, NetworkErrorKind, StoreBackend};
    use async_trait::async_trait;

    struct FixedStatus(u16);

    #[async_trait]
    impl HttpTransport for FixedStatus {
        async fn send(&self, _request: HttpRequest) -> Result<NetworkResponse, NetworkError> {
            Ok(NetworkResponse {
                data: String::new(),
                status: self.0,
                headers: Default::default(),
            })
        }
    }

    fn handler(status: u16, policy: UnauthorizedPolicy, backend: Arc<MemoryStore>) -> NetworkHandler {
        NetworkHandler::new(
            "p1",
            Arc::new(FixedStatus(status)),
            ScopedStore::new("p1", backend),
            DEFAULT_NETWORK_TIMEOUT,
            policy,
        )
    }

    fn request() -> NetworkRequest {
        NetworkRequest {
            url: "https://example.com".to_string(),
            method: "GET".to_string(),
            headers: None,
            params: None,
            body: None,
            timeout: None,
        }
    }

    #[tokio::test]
    async fn test_unauthorized_clears_configured_keys() {
        let backend = Arc::new(MemoryStore::new());
        backend.set("p1::token", "secret").unwrap();
        backend.set("p1::theme", "dark").unwrap();

        let handler = handler(
            401,
            UnauthorizedPolicy::ClearStoreKeys(vec!["token".to_string()]),
            backend.clone(),
        );
        let response = handler.perform(request()).await.unwrap();

        assert_eq!(response.status, 401);
        assert_eq!(backend.get("p1::token").unwrap(), None);
        assert_eq!(backend.get("p1::theme").unwrap(), Some("dark".to_string()));
    }

    #[tokio::test]
    async fn test_unauthorized_ignored_by_default() {
        let backend = Arc::new(MemoryStore::new());
        backend.set("p1::token", "secret").unwrap();

        let handler = handler(401, UnauthorizedPolicy::Ignore, backend.clone());
        handler.perform(request()).await.unwrap();

        assert_eq!(backend.get("p1::token").unwrap(), Some("secret".to_string()));
    }

    #[test]
    fn test_network_error_value_carries_kind() {
        let value = network_error_value(&NetworkError::new(NetworkErrorKind::Timeout, "slow"));
        assert_eq!(value.get("name").and_then(|v| v.as_str()), Some("NetworkError"));
        assert_eq!(value.get("kind").and_then(|v| v.as_str()), Some("timeout"));
        assert_eq!(value.get("message").and_then(|v| v.as_str()), Some("slow"));
    }
}
