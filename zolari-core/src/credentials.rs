//! Durable storage for the identity session.
//!
//! Provides a trait-based abstraction over credential storage with two implementations:
//! - `KeyringCredentialStore`: Uses the OS-native credential store (macOS Keychain,
//!   Windows Credential Manager, Linux Secret Service), so a session survives restarts.
//! - `InMemoryCredentialStore`: In-memory store for testing.

use std::collections::HashMap;
use std::sync::Mutex;

/// Service name under which all entries are filed.
pub const CREDENTIAL_SERVICE: &str = "zolari";

/// Errors from credential storage operations.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Credential not found for {service}:{account}")]
    NotFound { service: String, account: String },

    #[error("Failed to store credential: {message}")]
    StoreFailed { message: String },

    #[error("Failed to delete credential: {message}")]
    DeleteFailed { message: String },

    #[error("Keyring backend not available: {message}")]
    BackendUnavailable { message: String },
}

/// Trait for credential storage backends.
pub trait CredentialStore: Send + Sync {
    /// Store a secret under the given key, replacing any previous value.
    fn store(&self, key: &str, secret: &str) -> Result<(), CredentialError>;

    /// Retrieve the secret stored under the given key.
    fn get(&self, key: &str) -> Result<String, CredentialError>;

    /// Delete the secret stored under the given key. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), CredentialError>;

    /// Check whether a secret exists for the given key.
    fn contains(&self, key: &str) -> bool {
        self.get(key).is_ok()
    }
}

/// OS-native credential store using the `keyring` crate.
pub struct KeyringCredentialStore {
    service: String,
}

impl KeyringCredentialStore {
    pub fn new() -> Self {
        Self {
            service: CREDENTIAL_SERVICE.to_string(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry, CredentialError> {
        keyring::Entry::new(&self.service, key).map_err(|e| CredentialError::BackendUnavailable {
            message: e.to_string(),
        })
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn store(&self, key: &str, secret: &str) -> Result<(), CredentialError> {
        self.entry(key)?
            .set_password(secret)
            .map_err(|e| CredentialError::StoreFailed {
                message: e.to_string(),
            })
    }

    fn get(&self, key: &str) -> Result<String, CredentialError> {
        self.entry(key)?.get_password().map_err(|e| match e {
            keyring::Error::NoEntry => CredentialError::NotFound {
                service: self.service.clone(),
                account: key.to_string(),
            },
            other => CredentialError::StoreFailed {
                message: other.to_string(),
            },
        })
    }

    fn delete(&self, key: &str) -> Result<(), CredentialError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CredentialError::DeleteFailed {
                message: e.to_string(),
            }),
        }
    }
}

/// In-memory credential store for testing.
///
/// Does not persist across process restarts.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned map is still structurally valid.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn store(&self, key: &str, secret: &str) -> Result<(), CredentialError> {
        self.lock().insert(key.to_string(), secret.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<String, CredentialError> {
        self.lock()
            .get(key)
            .cloned()
            .ok_or_else(|| CredentialError::NotFound {
                service: CREDENTIAL_SERVICE.to_string(),
                account: key.to_string(),
            })
    }

    fn delete(&self, key: &str) -> Result<(), CredentialError> {
        self.lock().remove(key);
        Ok(())
    }

    fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }
}
