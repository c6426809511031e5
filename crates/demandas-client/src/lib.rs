pub mod bridge;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod response;
pub mod session;
pub mod store;
pub mod validation;

pub use bridge::{
    BridgeConfig, BridgeError, CallMethod, CallOptions, CallbackId, Payload, RemoteBridge,
};
pub use cache::DemandCache;
pub use client::{
    ClientEvent, DemandasClient, LOCAL_ID_PREFIX, SyncReport, UploadedFile, actions, is_local_id,
};
pub use config::{ClientConfig, ConfigError};
pub use error::{ClientError, Result};
pub use model::{
    Demand, DemandDraft, DemandPatch, DemandStats, DemandStatus, Fetched, Origin, PushKeys,
    PushSubscription, User,
};
pub use response::RemoteResult;
pub use session::{SessionContext, SessionError, UserSession};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use validation::{MAX_UPLOAD_BYTES, ValidationError};
