//! Caller flows over the bridge: validate, call, then cache or fall back.

mod auth;
mod demands;
mod notifications;
mod upload;

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tokio::sync::broadcast;

use crate::bridge::{Payload, RemoteBridge};
use crate::cache::DemandCache;
use crate::config::{ClientConfig, DEFAULT_UPLOAD_TIMEOUT_MS};
use crate::error::{ClientError, Result};
use crate::model::Demand;
use crate::response::RemoteResult;
use crate::session::SessionContext;
use crate::store::{FileStore, KeyValueStore};

pub use demands::{LOCAL_ID_PREFIX, SyncReport, is_local_id};
pub use upload::UploadedFile;

const EVENT_CAPACITY: usize = 64;

pub mod actions {
    pub const LOGIN: &str = "login";
    pub const LISTAR_DEMANDAS: &str = "listarDemandas";
    pub const CRIAR_DEMANDA: &str = "criarDemanda";
    pub const ATUALIZAR_DEMANDA: &str = "atualizarDemanda";
    pub const SALVAR_SUBSCRIPTION: &str = "salvarSubscription";
    pub const ENVIAR_EMAIL: &str = "enviarEmail";
    pub const ENVIAR_NOTIFICACAO: &str = "enviarNotificacao";
    pub const UPLOAD_ARQUIVO: &str = "uploadArquivo";
}

/// Emitted after state changes a UI would refresh on.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    SessionChanged { email: Option<String> },
    DemandsRefreshed { total: usize, offline: bool },
    DemandCreated { demand: Demand, offline: bool },
    DemandUpdated { demand_id: String },
    FileUploaded { nome: String, url: String },
}

#[derive(Debug, Clone)]
pub struct DemandasClient {
    bridge: RemoteBridge,
    cache: DemandCache,
    session: Arc<SessionContext>,
    events: broadcast::Sender<ClientEvent>,
    upload_timeout: Duration,
}

impl DemandasClient {
    /// Builds a client and restores any persisted session from `store`.
    pub fn new(bridge: RemoteBridge, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let session = SessionContext::new(Arc::clone(&store));
        session.load()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            bridge,
            cache: DemandCache::new(store),
            session: Arc::new(session),
            events,
            upload_timeout: Duration::from_millis(DEFAULT_UPLOAD_TIMEOUT_MS),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let bridge = RemoteBridge::new(config.bridge_config())?;
        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(config.store_path.clone()));
        Ok(Self::new(bridge, store)?.with_upload_timeout(config.upload_timeout()))
    }

    #[must_use]
    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn bridge(&self) -> &RemoteBridge {
        &self.bridge
    }

    #[must_use]
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    #[must_use]
    pub fn cache(&self) -> &DemandCache {
        &self.cache
    }

    fn emit(&self, event: ClientEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn call(&self, action: &str, payload: Payload) -> Result<RemoteResult> {
        let result = self.bridge.invoke(action, payload).await?;
        expect_success(action, result)
    }
}

/// Turns an explicit backend failure into `ClientError::Backend`.
fn expect_success(action: &str, result: RemoteResult) -> Result<RemoteResult> {
    match result {
        RemoteResult::Failure { message } => Err(ClientError::Backend {
            action: action.to_string(),
            message,
        }),
        other => Ok(other),
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}
