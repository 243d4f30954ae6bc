//! Ollama availability checking with a single-slot TTL cache.
//!
//! Status queries within the TTL reuse the last poll instead of hitting the
//! service again; staleness is the accepted trade for reduced load.

use serde::Serialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::ollama::OllamaClient;

/// Snapshot of the Ollama service: reachable or not, and which models it serves.
#[derive(Debug, Clone, Serialize)]
pub struct OllamaStatus {
    pub available: bool,
    pub models: Vec<String>,
}

impl OllamaStatus {
    pub fn unavailable() -> Self {
        Self {
            available: false,
            models: Vec::new(),
        }
    }
}

/// Poll the model-listing endpoint. Any failure means "not available";
/// this never returns an error.
pub async fn check_status(client: &OllamaClient) -> OllamaStatus {
    match client.list_models().await {
        Ok(models) => OllamaStatus {
            available: true,
            models,
        },
        Err(e) => {
            tracing::error!(error = %e, "error checking Ollama status");
            OllamaStatus::unavailable()
        }
    }
}

struct CacheSlot {
    checked_at: Instant,
    status: OllamaStatus,
}

/// Single-slot cache for the last status poll.
pub struct StatusCache {
    ttl: Duration,
    slot: Mutex<Option<CacheSlot>>,
}

impl StatusCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// Return the cached status if it is still within the TTL.
    pub fn get(&self) -> Option<OllamaStatus> {
        let slot = self.slot.lock().expect("status cache lock poisoned");
        slot.as_ref()
            .filter(|s| s.checked_at.elapsed() < self.ttl)
            .map(|s| s.status.clone())
    }

    pub fn store(&self, status: OllamaStatus) {
        let mut slot = self.slot.lock().expect("status cache lock poisoned");
        *slot = Some(CacheSlot {
            checked_at: Instant::now(),
            status,
        });
    }

    /// Drop the cached value so the next query polls again.
    pub fn reset(&self) {
        let mut slot = self.slot.lock().expect("status cache lock poisoned");
        *slot = None;
    }

    /// Cached status when fresh, otherwise poll and refill the slot.
    /// The lock is never held across the network call.
    pub async fn get_or_refresh(&self, client: &OllamaClient) -> OllamaStatus {
        if let Some(status) = self.get() {
            return status;
        }
        let status = check_status(client).await;
        self.store(status.clone());
        status
    }
}
