//! Peer-side prekey store.
//!
//! Each `issue` answers one client handshake with fresh keys and parks the
//! resulting session under a random index. `take` removes it again, so a
//! prekey opens at most one request. Entries older than the TTL are treated
//! as missing and dropped by `purge_expired`.

use std::collections::HashMap;
use std::time::Duration;

use dx_envelope::{PrekeyBundle, PrekeyRequest, PrekeyResponse, Session};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::SessionError;

pub const PREKEY_INDEX_BYTES: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrekeyStoreConfig {
    pub ttl: Duration,
    /// Oldest entries are evicted once this many are outstanding.
    pub max_outstanding: usize,
}

impl Default for PrekeyStoreConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_outstanding: 10_000,
        }
    }
}

struct Entry {
    session: Session,
    issued_at: Instant,
}

pub struct PrekeyStore {
    config: PrekeyStoreConfig,
    entries: Mutex<HashMap<String, Entry>>,
}

impl PrekeyStore {
    pub fn new(config: PrekeyStoreConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PrekeyStoreConfig {
        &self.config
    }

    /// Answer a client's `{a0, a1, a2}` and remember the session.
    pub async fn issue(&self, request: &PrekeyRequest) -> Result<PrekeyResponse, SessionError> {
        let index = new_index()?;
        let (response, session) = PrekeyBundle::generate().respond(index.clone(), request)?;

        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, e| now.duration_since(e.issued_at) <= self.config.ttl);
        while entries.len() >= self.config.max_outstanding.max(1) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.issued_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    entries.remove(&k);
                }
                None => break,
            }
        }
        entries.insert(
            index.clone(),
            Entry {
                session,
                issued_at: now,
            },
        );
        debug!(prekey = %index, outstanding = entries.len(), "issued prekey");
        Ok(response)
    }

    /// Remove and return the session for `index`. Single use.
    pub async fn take(&self, index: &str) -> Result<Session, SessionError> {
        let entry = self
            .entries
            .lock()
            .await
            .remove(index)
            .ok_or(SessionError::PrekeyNotFound)?;
        if entry.issued_at.elapsed() > self.config.ttl {
            return Err(SessionError::PrekeyNotFound);
        }
        Ok(entry.session)
    }

    /// Drop expired entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| now.duration_since(e.issued_at) <= self.config.ttl);
        let removed = before - entries.len();
        if removed > 0 {
            info!(removed, remaining = entries.len(), "purged expired prekeys");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl Default for PrekeyStore {
    fn default() -> Self {
        Self::new(PrekeyStoreConfig::default())
    }
}

fn new_index() -> Result<String, SessionError> {
    let mut raw = [0u8; PREKEY_INDEX_BYTES];
    getrandom::getrandom(&mut raw).map_err(|_| SessionError::Random)?;
    Ok(hex::encode(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PrekeyRequest {
        PrekeyBundle::generate().request()
    }

    #[tokio::test]
    async fn issue_then_take_once() {
        let store = PrekeyStore::default();
        let response = store.issue(&request()).await.unwrap();
        assert_eq!(response.i.len(), PREKEY_INDEX_BYTES * 2);
        assert_eq!(store.len().await, 1);

        let session = store.take(&response.i).await.unwrap();
        assert_eq!(session.prekey_index(), response.i);
        assert!(matches!(store.take(&response.i).await, Err(SessionError::PrekeyNotFound)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn unknown_index() {
        let store = PrekeyStore::default();
        assert!(matches!(store.take("nope").await, Err(SessionError::PrekeyNotFound)));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_gone() {
        let store = PrekeyStore::new(PrekeyStoreConfig {
            ttl: Duration::from_secs(10),
            max_outstanding: 8,
        });
        let stale = store.issue(&request()).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        let fresh = store.issue(&request()).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;

        assert!(matches!(store.take(&stale.i).await, Err(SessionError::PrekeyNotFound)));
        assert!(store.take(&fresh.i).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_counts_removed() {
        let store = PrekeyStore::new(PrekeyStoreConfig {
            ttl: Duration::from_secs(1),
            max_outstanding: 8,
        });
        store.issue(&request()).await.unwrap();
        store.issue(&request()).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        store.issue(&request()).await.unwrap();
        // issue() already dropped the two stale ones.
        assert_eq!(store.len().await, 1);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired().await, 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn oldest_evicted_at_capacity() {
        let store = PrekeyStore::new(PrekeyStoreConfig {
            ttl: Duration::from_secs(60),
            max_outstanding: 2,
        });
        let first = store.issue(&request()).await.unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;
        let second = store.issue(&request()).await.unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;
        let third = store.issue(&request()).await.unwrap();

        assert_eq!(store.len().await, 2);
        assert!(store.take(&first.i).await.is_err());
        assert!(store.take(&second.i).await.is_ok());
        assert!(store.take(&third.i).await.is_ok());
    }
}
