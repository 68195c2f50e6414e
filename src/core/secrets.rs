//! Secret storage behind a trait.
//!
//! Strategies only ever see `SecretStore`; the OS credential store is an
//! implementation detail. `KeyringStore` backs production, `MemoryStore`
//! backs tests and headless environments without a keychain.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::error::{EngineError, Result};

/// Key-value secret storage. Keys are stable strings such as
/// `"claude-oauth-token"` or `"codex-session-cookie"`.
pub trait SecretStore: Send + Sync {
    /// Fetch a secret. `Ok(None)` means "not stored", which is an expected
    /// state, not an error.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store or overwrite a secret.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a secret. Removing an absent key succeeds.
    fn delete(&self, key: &str) -> Result<()>;
}

// =============================================================================
// Keyring-backed store
// =============================================================================

/// OS credential store, namespaced under one service name.
pub struct KeyringStore {
    service: &'static str,
}

impl KeyringStore {
    pub const SERVICE: &'static str = "traymeter";

    #[must_use]
    pub const fn new() -> Self {
        Self {
            service: Self::SERVICE,
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(self.service, key)
            .map_err(|e| EngineError::SecretStore(format!("keyring entry for {key}: {e}")))
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for KeyringStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(EngineError::SecretStore(format!(
                "failed to read secret {key}: {e}"
            ))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| EngineError::SecretStore(format!("failed to store secret {key}: {e}")))
    }

    fn delete(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(EngineError::SecretStore(format!(
                "failed to delete secret {key}: {e}"
            ))),
        }
    }
}

// =============================================================================
// In-memory store
// =============================================================================

/// Process-local secret storage for tests and keychain-less environments.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor pre-seeded with secrets.
    #[must_use]
    pub fn with_secrets<I, K, V>(secrets: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        {
            let mut values = store.values.lock().unwrap_or_else(PoisonError::into_inner);
            for (k, v) in secrets {
                values.insert(k.into(), v.into());
            }
        }
        store
    }
}

impl SecretStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);

        store.set("k", "v1").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v1"));

        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));

        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn deleting_absent_key_succeeds() {
        let store = MemoryStore::new();
        assert!(store.delete("never-set").is_ok());
    }

    #[test]
    fn seeded_store_serves_initial_secrets() {
        let store = MemoryStore::with_secrets([("a", "1"), ("b", "2")]);
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(store.get("b").unwrap().as_deref(), Some("2"));
    }
}
