//! OS secure-credential store for the unlock shortcut.
//!
//! The raw master password can be saved in the operating system's
//! credential store so later unlocks skip the prompt:
//! - macOS: Keychain
//! - Windows: Credential Manager
//! - Linux: Secret Service (GNOME Keyring / KDE Wallet)
//!
//! Anything read back is untrusted until the credential gate has verified
//! it again, because the password may have changed since it was saved.

use std::sync::Mutex;

use zeroize::Zeroizing;

use crate::errors::Result;

/// Service name used in the OS credential store.
pub const SERVICE_NAME: &str = "GeoSync";

/// Account name used in the OS credential store.
pub const ACCOUNT_NAME: &str = "MasterKey";

/// A place to keep the master password between sessions.
pub trait SecretStore: Send + Sync {
    /// Whether the backing store can be used on this machine.
    fn is_available(&self) -> bool;

    /// Ask the platform to confirm the user's presence before a read.
    ///
    /// Returns `Ok(false)` when the user declines.
    fn authenticate(&self, reason: &str) -> Result<bool>;

    fn save(&self, secret: &str) -> Result<()>;

    /// `None` if nothing is stored.
    fn get(&self) -> Result<Option<Zeroizing<String>>>;

    /// Deleting a missing entry is not an error.
    fn delete(&self) -> Result<()>;
}

/// Process-local store, used in tests and when no OS store is compiled in.
#[derive(Default)]
pub struct MemorySecretStore {
    secret: Mutex<Option<Zeroizing<String>>>,
    deny_authentication: bool,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose presence check always fails, as if the user cancelled.
    pub fn denying() -> Self {
        Self {
            deny_authentication: true,
            ..Self::default()
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Zeroizing<String>>> {
        self.secret
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl SecretStore for MemorySecretStore {
    fn is_available(&self) -> bool {
        true
    }

    fn authenticate(&self, _reason: &str) -> Result<bool> {
        Ok(!self.deny_authentication)
    }

    fn save(&self, secret: &str) -> Result<()> {
        *self.slot() = Some(Zeroizing::new(secret.to_string()));
        Ok(())
    }

    fn get(&self) -> Result<Option<Zeroizing<String>>> {
        Ok(self.slot().clone())
    }

    fn delete(&self) -> Result<()> {
        *self.slot() = None;
        Ok(())
    }
}

#[cfg(feature = "keyring-store")]
pub use os::KeyringSecretStore;

#[cfg(feature = "keyring-store")]
mod os {
    use zeroize::Zeroizing;

    use super::{SecretStore, ACCOUNT_NAME, SERVICE_NAME};
    use crate::errors::{Result, VaultError};

    /// The OS credential store, through the `keyring` crate.
    ///
    /// The OS decides whether a read triggers a biometric or login prompt;
    /// `authenticate` only checks that the store can be reached.
    pub struct KeyringSecretStore {
        service: String,
        account: String,
    }

    impl Default for KeyringSecretStore {
        fn default() -> Self {
            Self {
                service: SERVICE_NAME.to_string(),
                account: ACCOUNT_NAME.to_string(),
            }
        }
    }

    impl KeyringSecretStore {
        pub fn new() -> Self {
            Self::default()
        }

        fn entry(&self) -> Result<keyring::Entry> {
            keyring::Entry::new(&self.service, &self.account).map_err(|e| {
                VaultError::KeyringError(format!("failed to create keyring entry: {e}"))
            })
        }
    }

    impl SecretStore for KeyringSecretStore {
        fn is_available(&self) -> bool {
            self.entry().is_ok()
        }

        fn authenticate(&self, reason: &str) -> Result<bool> {
            tracing::debug!(reason, "Keyring access requested");
            Ok(self.is_available())
        }

        fn save(&self, secret: &str) -> Result<()> {
            self.entry()?.set_password(secret).map_err(|e| {
                VaultError::KeyringError(format!("failed to store password in keyring: {e}"))
            })
        }

        fn get(&self) -> Result<Option<Zeroizing<String>>> {
            match self.entry()?.get_password() {
                Ok(password) => Ok(Some(Zeroizing::new(password))),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(VaultError::KeyringError(format!(
                    "failed to read from keyring: {e}"
                ))),
            }
        }

        fn delete(&self) -> Result<()> {
            match self.entry()?.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(VaultError::KeyringError(format!(
                    "failed to delete from keyring: {e}"
                ))),
            }
        }
    }
}

/// The secret store this build uses by default.
pub fn default_store() -> Box<dyn SecretStore> {
    #[cfg(feature = "keyring-store")]
    {
        Box::new(KeyringSecretStore::new())
    }
    #[cfg(not(feature = "keyring-store"))]
    {
        Box::new(UnavailableSecretStore)
    }
}

/// Stand-in used when the binary is built without an OS store.
pub struct UnavailableSecretStore;

impl SecretStore for UnavailableSecretStore {
    fn is_available(&self) -> bool {
        false
    }

    fn authenticate(&self, _reason: &str) -> Result<bool> {
        Ok(false)
    }

    fn save(&self, _secret: &str) -> Result<()> {
        Err(unavailable())
    }

    fn get(&self) -> Result<Option<Zeroizing<String>>> {
        Ok(None)
    }

    fn delete(&self) -> Result<()> {
        Ok(())
    }
}

fn unavailable() -> crate::errors::VaultError {
    crate::errors::VaultError::KeyringError(
        "this build has no OS keyring support (rebuild with --features keyring-store)".into(),
    )
}
