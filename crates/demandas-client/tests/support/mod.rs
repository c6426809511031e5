#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Form, Query, State};
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use demandas_client::{BridgeConfig, DemandasClient, KeyValueStore, MemoryStore, RemoteBridge};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub query: HashMap<String, String>,
    pub form: HashMap<String, String>,
}

impl RecordedCall {
    pub fn action(&self) -> &str {
        self.param("action").unwrap_or_default()
    }

    pub fn callback(&self) -> &str {
        self.param("callback").unwrap_or_default()
    }

    /// Query first, then form body.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .or_else(|| self.form.get(name))
            .map(String::as_str)
    }

    pub fn json_param(&self, name: &str) -> Option<Value> {
        self.param(name)
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}

#[derive(Debug, Clone)]
pub enum StubReply {
    /// `/**/<callback>(<value>);`
    Jsonp(Value),
    /// Verbatim body; `{callback}` is replaced with the call's callback name.
    Script(String),
    Json(Value),
    Status(u16, String),
    Delayed(Duration, Box<StubReply>),
}

type Responder = Arc<dyn Fn(&RecordedCall) -> StubReply + Send + Sync>;

#[derive(Clone)]
struct StubState {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    responder: Responder,
}

pub struct StubBackend {
    pub url: String,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl StubBackend {
    pub async fn spawn<F>(responder: F) -> anyhow::Result<Self>
    where
        F: Fn(&RecordedCall) -> StubReply + Send + Sync + 'static,
    {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let state = StubState {
            calls: Arc::clone(&calls),
            responder: Arc::new(responder),
        };
        let app = Router::new()
            .route("/exec", any(handle))
            .layer(DefaultBodyLimit::disable())
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            let _ = server.await;
        });

        Ok(Self {
            url: format!("http://{addr}/exec"),
            calls,
            shutdown: Some(shutdown_tx),
        })
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn calls_for(&self, action: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.action() == action)
            .collect()
    }

    pub fn bridge(&self, timeout_ms: u64) -> anyhow::Result<RemoteBridge> {
        let mut config = BridgeConfig::new(self.url.clone());
        config.timeout_ms = timeout_ms;
        Ok(RemoteBridge::new(config)?)
    }

    pub fn client(&self, timeout_ms: u64) -> anyhow::Result<DemandasClient> {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        Ok(DemandasClient::new(self.bridge(timeout_ms)?, store)?)
    }

    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// An address nothing listens on.
pub async fn closed_endpoint() -> anyhow::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{addr}/exec"))
}

async fn handle(
    State(state): State<StubState>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    form: Option<Form<HashMap<String, String>>>,
) -> Response {
    let form = match (&method, form) {
        (&Method::POST, Some(Form(form))) => form,
        _ => HashMap::new(),
    };
    let call = RecordedCall {
        method,
        query,
        form,
    };
    state
        .calls
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(call.clone());

    let reply = (state.responder)(&call);
    render(reply, call.callback()).await
}

async fn render(mut reply: StubReply, callback: &str) -> Response {
    while let StubReply::Delayed(delay, inner) = reply {
        tokio::time::sleep(delay).await;
        reply = *inner;
    }
    match reply {
        StubReply::Jsonp(value) => script(format!("/**/{callback}({value});")),
        StubReply::Script(template) => script(template.replace("{callback}", callback)),
        StubReply::Json(value) => (
            [(header::CONTENT_TYPE, "application/json")],
            value.to_string(),
        )
            .into_response(),
        StubReply::Status(code, body) => (
            StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body,
        )
            .into_response(),
        StubReply::Delayed(..) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn script(body: String) -> Response {
    Response::builder()
        .header(header::CONTENT_TYPE, "application/javascript")
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
