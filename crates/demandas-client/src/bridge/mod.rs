//! Remote call bridge to the spreadsheet script endpoint.
//!
//! Each call carries an action name, a callback identifier and its payload as
//! request parameters. The backend answers with a script that invokes the named
//! callback; the bridge reads that script and completes the matching pending call.
//! A call ends exactly once: with the callback's argument, a transport failure,
//! or a timeout.

mod jsonp;
mod payload;
mod pending;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::response::RemoteResult;

pub use jsonp::{CallbackInvocation, ScriptParseError, parse_script, parse_script_prefix};
pub use payload::{Payload, RESERVED_PARAMS};
pub use pending::{CALLBACK_PREFIX, CallOutcome, CallbackId, CallbackIdGenerator, PendingCalls};

pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_PAYLOAD_PARAM: &str = "dados";

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("remote call `{action}` timed out after {timeout_ms} ms")]
    Timeout { action: String, timeout_ms: u64 },
    #[error("remote call `{action}` failed to load: {message}")]
    Network { action: String, message: String },
    #[error("remote call `{action}` returned http {status}: {body}")]
    Http {
        action: String,
        status: u16,
        body: String,
    },
    #[error("remote call `{action}` returned an unreadable body: {message}")]
    Decode { action: String, message: String },
    #[error("remote call `{action}` ended without a response")]
    Abandoned { action: String },
    #[error("payload encoding failed: {0}")]
    Encode(String),
    #[error("endpoint url must not be empty")]
    EndpointMissing,
    #[error("endpoint url must use http:// or https:// and include a host")]
    InvalidEndpoint,
    #[error("callback identifier already pending: {callback_id}")]
    DuplicateCallback { callback_id: String },
}

impl BridgeError {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The script could not be loaded: connection failure or a non-2xx answer.
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Http { .. })
    }

    /// Failures a caller may answer with cached data instead of an error.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.is_timeout() || self.is_network() || matches!(self, Self::Abandoned { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CallMethod {
    /// Everything in the query string.
    #[default]
    Get,
    /// `action` and `callback` in the query string, payload form-encoded in the body.
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallOptions {
    pub timeout: Duration,
    pub method: CallMethod,
}

impl CallOptions {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            method: CallMethod::Get,
        }
    }

    #[must_use]
    pub fn with_method(mut self, method: CallMethod) -> Self {
        self.method = method;
        self
    }
}

impl Default for CallOptions {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub endpoint_url: String,
    pub timeout_ms: u64,
    pub payload_param: String,
}

impl BridgeConfig {
    #[must_use]
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            payload_param: DEFAULT_PAYLOAD_PARAM.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteBridge {
    inner: Arc<BridgeInner>,
}

#[derive(Debug)]
struct BridgeInner {
    endpoint: String,
    default_timeout: Duration,
    payload_param: String,
    http: reqwest::Client,
    pending: PendingCalls,
    ids: CallbackIdGenerator,
}

impl RemoteBridge {
    pub fn new(config: BridgeConfig) -> Result<Self, BridgeError> {
        let endpoint = normalize_endpoint(&config.endpoint_url)?;
        let payload_param = config.payload_param.trim();
        if payload_param.is_empty() || RESERVED_PARAMS.contains(&payload_param) {
            return Err(BridgeError::Encode(format!(
                "`{payload_param}` cannot be used as the payload parameter"
            )));
        }
        Ok(Self {
            inner: Arc::new(BridgeInner {
                endpoint,
                default_timeout: Duration::from_millis(config.timeout_ms),
                payload_param: payload_param.to_string(),
                http: reqwest::Client::new(),
                pending: PendingCalls::new(),
                ids: CallbackIdGenerator::default(),
            }),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    #[must_use]
    pub fn default_options(&self) -> CallOptions {
        CallOptions::new(self.inner.default_timeout)
    }

    /// Calls still waiting for their terminal event.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    pub async fn invoke(&self, action: &str, payload: Payload) -> Result<RemoteResult, BridgeError> {
        self.invoke_with(action, payload, self.default_options())
            .await
    }

    pub async fn invoke_with(
        &self,
        action: &str,
        payload: Payload,
        options: CallOptions,
    ) -> Result<RemoteResult, BridgeError> {
        self.call_raw(action, payload, options)
            .await
            .map(RemoteResult::from_value)
    }

    /// Issues one call and returns the callback's argument untouched.
    pub async fn call_raw(
        &self,
        action: &str,
        payload: Payload,
        options: CallOptions,
    ) -> Result<Value, BridgeError> {
        let action = action.trim();
        if action.is_empty() {
            return Err(BridgeError::Encode("action must not be empty".to_string()));
        }
        let fields = payload.into_fields(&self.inner.payload_param)?;

        let callback_id = self.inner.ids.next_id();
        let receiver = self.inner.pending.register(callback_id.clone(), action)?;
        let request = self.build_request(action, &callback_id, &fields, options.method);

        tracing::debug!(
            action,
            callback_id = %callback_id,
            method = ?options.method,
            timeout_ms = options.timeout.as_millis() as u64,
            "remote call issued"
        );

        let task = tokio::spawn(deliver(
            Arc::clone(&self.inner),
            action.to_string(),
            callback_id.clone(),
            request,
        ));
        let mut guard = InFlight {
            inner: &self.inner,
            callback_id: &callback_id,
            task: Some(task),
        };

        match tokio::time::timeout(options.timeout, receiver).await {
            Ok(Ok(outcome)) => {
                // Let the transport finish any remaining deliveries in the same body.
                guard.detach();
                outcome
            }
            Ok(Err(_)) => Err(BridgeError::Abandoned {
                action: action.to_string(),
            }),
            Err(_) => {
                tracing::warn!(
                    action,
                    callback_id = %callback_id,
                    timeout_ms = options.timeout.as_millis() as u64,
                    "remote call timed out"
                );
                Err(BridgeError::Timeout {
                    action: action.to_string(),
                    timeout_ms: options.timeout.as_millis() as u64,
                })
            }
        }
    }

    fn build_request(
        &self,
        action: &str,
        callback_id: &CallbackId,
        fields: &[(String, String)],
        method: CallMethod,
    ) -> reqwest::RequestBuilder {
        let control = [("action", action), ("callback", callback_id.as_str())];
        let request = match method {
            CallMethod::Get => self
                .inner
                .http
                .get(self.inner.endpoint.as_str())
                .query(&control)
                .query(fields),
            CallMethod::Post => self
                .inner
                .http
                .post(self.inner.endpoint.as_str())
                .query(&control)
                .form(fields),
        };
        request.header("x-request-id", format!("req_{}", Uuid::new_v4().simple()))
    }
}

/// Removes the pending entry and stops the transport when a call ends without
/// its callback, including when the invoking future is dropped.
struct InFlight<'a> {
    inner: &'a BridgeInner,
    callback_id: &'a CallbackId,
    task: Option<JoinHandle<()>>,
}

impl InFlight<'_> {
    fn detach(&mut self) {
        self.task = None;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.inner.pending.deregister(self.callback_id.as_str());
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn deliver(
    inner: Arc<BridgeInner>,
    action: String,
    callback_id: CallbackId,
    request: reqwest::RequestBuilder,
) {
    let response = match request.send().await {
        Ok(response) => response,
        Err(error) => {
            inner.pending.settle(
                callback_id.as_str(),
                Err(BridgeError::Network {
                    action,
                    message: error.to_string(),
                }),
            );
            return;
        }
    };

    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(error) => {
            inner.pending.settle(
                callback_id.as_str(),
                Err(BridgeError::Network {
                    action,
                    message: error.to_string(),
                }),
            );
            return;
        }
    };

    if !status.is_success() {
        let body = body.trim();
        inner.pending.settle(
            callback_id.as_str(),
            Err(BridgeError::Http {
                action,
                status: status.as_u16(),
                body: if body.is_empty() {
                    "<empty>".to_string()
                } else {
                    body.to_string()
                },
            }),
        );
        return;
    }

    dispatch_body(&inner.pending, &action, &callback_id, &body);
}

/// Routes a response body to the pending calls it names.
///
/// A script settles every callback it invokes; names with no pending call (already
/// settled, timed out, or never issued) are ignored. Statements after the first
/// unreadable one are dropped. A body that is plain JSON settles the issuing call
/// directly.
pub(crate) fn dispatch_body(
    pending: &PendingCalls,
    action: &str,
    callback_id: &CallbackId,
    body: &str,
) {
    let (invocations, error) = parse_script_prefix(body);
    if !invocations.is_empty() {
        if let Some(error) = error {
            tracing::warn!(action, reason = %error, "ignoring unreadable script tail");
        }
        for invocation in invocations {
            if !pending.settle(&invocation.callback, Ok(invocation.argument)) {
                tracing::debug!(
                    action,
                    callback = %invocation.callback,
                    "ignoring invocation with no pending call"
                );
            }
        }
        return;
    }

    match serde_json::from_str::<Value>(body) {
        Ok(value) => {
            pending.settle(callback_id.as_str(), Ok(value));
        }
        Err(error) => {
            pending.settle(
                callback_id.as_str(),
                Err(BridgeError::Decode {
                    action: action.to_string(),
                    message: error.to_string(),
                }),
            );
        }
    }
}

pub fn normalize_endpoint(raw: &str) -> Result<String, BridgeError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(BridgeError::EndpointMissing);
    }
    let Some((scheme, remainder)) = trimmed.split_once("://") else {
        return Err(BridgeError::InvalidEndpoint);
    };
    if !matches!(scheme, "http" | "https") {
        return Err(BridgeError::InvalidEndpoint);
    }
    if remainder.trim().is_empty() || remainder.starts_with('/') {
        return Err(BridgeError::InvalidEndpoint);
    }
    Ok(trimmed.to_string())
}
