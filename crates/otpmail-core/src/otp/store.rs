//! Code persistence with expiry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::{Error, Result};

/// Persists issued codes until they are verified or expire.
pub trait CodeStore: Send + Sync {
    /// Records `code` for `email`, replacing any earlier code.
    fn save(&self, email: &str, code: &str) -> impl Future<Output = Result<()>> + Send;

    /// Checks `code` for `email`. A match consumes the code.
    fn verify(&self, email: &str, code: &str) -> impl Future<Output = Result<bool>> + Send;
}

#[derive(Debug)]
struct Entry {
    code: String,
    expires_at: Instant,
}

/// In-process store keyed by lower-cased email.
#[derive(Debug)]
pub struct MemoryCodeStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCodeStore {
    /// Creates a store whose codes live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the number of unexpired codes.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        let now = Instant::now();
        let entries = self.lock()?;
        Ok(entries.values().filter(|e| e.expires_at > now).count())
    }

    /// Returns true if no unexpired code is held.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Store("code store lock poisoned".into()))
    }
}

impl CodeStore for MemoryCodeStore {
    async fn save(&self, email: &str, code: &str) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        entries.retain(|_, e| e.expires_at > now);
        entries.insert(
            email.trim().to_lowercase(),
            Entry {
                code: code.to_string(),
                expires_at: now + self.ttl,
            },
        );
        Ok(())
    }

    async fn verify(&self, email: &str, code: &str) -> Result<bool> {
        let key = email.trim().to_lowercase();
        let mut entries = self.lock()?;
        let Some(entry) = entries.get(&key) else {
            return Ok(false);
        };
        if entry.expires_at <= Instant::now() {
            debug!("code expired");
            entries.remove(&key);
            return Ok(false);
        }
        if entry.code != code.trim() {
            return Ok(false);
        }
        entries.remove(&key);
        Ok(true)
    }
}
