//! Pending-call registry keyed by callback identifier.
//!
//! Every remote call registers one entry before its request leaves the process.
//! The entry is removed by whichever terminal event reaches it first (callback
//! delivery, transport failure, timeout, or the caller going away), so a second
//! delivery for the same identifier finds nothing and has no effect.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::oneshot;

use super::BridgeError;

pub const CALLBACK_PREFIX: &str = "demandas_cb";

pub type CallOutcome = Result<Value, BridgeError>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallbackId(String);

impl CallbackId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for CallbackId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Timestamp plus a process-wide sequence number; two calls issued in the same
/// millisecond still differ in the suffix, even across bridges.
#[derive(Debug, Default, Clone, Copy)]
pub struct CallbackIdGenerator;

impl CallbackIdGenerator {
    #[must_use]
    pub fn next_id(&self) -> CallbackId {
        let seq = NEXT_SEQ.fetch_add(1, Ordering::Relaxed);
        CallbackId(format!(
            "{CALLBACK_PREFIX}_{}_{seq}",
            Utc::now().timestamp_millis()
        ))
    }
}

#[derive(Debug)]
pub struct PendingCall {
    action: String,
    created_at: Instant,
    sender: oneshot::Sender<CallOutcome>,
}

#[derive(Debug, Default)]
pub struct PendingCalls {
    calls: Mutex<HashMap<CallbackId, PendingCall>>,
}

impl PendingCalls {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CallbackId, PendingCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(
        &self,
        callback_id: CallbackId,
        action: &str,
    ) -> Result<oneshot::Receiver<CallOutcome>, BridgeError> {
        let mut calls = self.lock();
        if calls.contains_key(&callback_id) {
            return Err(BridgeError::DuplicateCallback {
                callback_id: callback_id.to_string(),
            });
        }
        let (sender, receiver) = oneshot::channel();
        calls.insert(
            callback_id,
            PendingCall {
                action: action.to_string(),
                created_at: Instant::now(),
                sender,
            },
        );
        Ok(receiver)
    }

    /// Completes the call registered under `callback_id`. Returns `false` when
    /// no such call is pending, which is the case for every delivery after the first.
    pub fn settle(&self, callback_id: &str, outcome: CallOutcome) -> bool {
        let Some(call) = self.lock().remove(callback_id) else {
            return false;
        };
        tracing::debug!(
            callback_id,
            action = %call.action,
            elapsed_ms = call.created_at.elapsed().as_millis() as u64,
            ok = outcome.is_ok(),
            "remote call settled"
        );
        // The waiting side may already be gone; the entry is consumed regardless.
        let _ = call.sender.send(outcome);
        true
    }

    pub fn deregister(&self, callback_id: &str) -> bool {
        self.lock().remove(callback_id).is_some()
    }

    #[must_use]
    pub fn contains(&self, callback_id: &str) -> bool {
        self.lock().contains_key(callback_id)
    }

    #[must_use]
    pub fn age(&self, callback_id: &str) -> Option<Duration> {
        self.lock()
            .get(callback_id)
            .map(|call| call.created_at.elapsed())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
