use std::path::PathBuf;

use color_eyre::Result;
use dirs::data_dir;
use lectern_store::{
    encrypted_store::EncryptedDocumentStore,
    key_provider::{EnvKeyProvider, KeyMaterial, KeyProvider, KeyringProvider},
};
use tracing::debug;

const KEYRING_SERVICE: &str = "lectern";
const KEYRING_ACCOUNT: &str = "store-key";

/// Resolve the default directory for the collection files.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("lectern"))
}

/// Data directory honoring a config override.
pub fn resolve_data_dir(config: &crate::config::Config) -> Result<PathBuf> {
    match &config.data_dir {
        Some(dir) => Ok(dir.clone()),
        None => default_data_dir(),
    }
}

/// Resolve the process-wide key, in precedence order: explicit hex in the
/// config file, the OS keyring (when enabled), then the environment
/// variable with its transient-key fallback.
pub async fn resolve_key(config: &crate::config::Config) -> Result<KeyMaterial> {
    if let Some(encryption) = &config.encryption {
        if let Some(key_hex) = &encryption.key_hex {
            return Ok(KeyMaterial::from_hex("config", key_hex)?);
        }
        if encryption.use_keyring == Some(true) {
            let provider = KeyringProvider::new(KEYRING_SERVICE, KEYRING_ACCOUNT);
            return Ok(provider.get_or_create().await?);
        }
    }
    Ok(EnvKeyProvider::default().get_or_create().await?)
}

/// Build the encrypted store, resolving the key exactly once for the
/// process lifetime.
pub async fn store_from_config(config: &crate::config::Config) -> Result<EncryptedDocumentStore> {
    let key = resolve_key(config).await?;
    debug!(key_id = %key.id, "initializing encrypted document store");
    Ok(EncryptedDocumentStore::new(key))
}
