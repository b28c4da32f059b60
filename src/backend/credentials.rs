//! Bearer-token loading from the OS keychain with an env-var fallback.

use std::env;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::CredentialProvider;
use crate::{AppError, Result};

/// Keychain service name under which the access token is stored.
pub const KEYRING_SERVICE: &str = "gemini-acp-bridge";
/// Keychain entry holding the access token.
pub const KEYRING_ENTRY: &str = "access_token";
/// Environment variable consulted when the keychain has no token.
pub const TOKEN_ENV_VAR: &str = "GEMINI_ACCESS_TOKEN";

#[derive(Debug)]
struct CachedToken {
    value: String,
    fetched_at: Instant,
}

/// Token provider backed by the OS keychain, falling back to
/// [`TOKEN_ENV_VAR`].
///
/// A fetched token is reused until `ttl` has elapsed, after which both
/// sources are consulted again so that an externally refreshed token is
/// picked up without restarting the process.
#[derive(Debug)]
pub struct KeychainCredentials {
    ttl: Duration,
    cached: Mutex<Option<CachedToken>>,
}

impl KeychainCredentials {
    /// Create a provider that re-reads its sources every `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cached: Mutex::new(None),
        }
    }
}

impl CredentialProvider for KeychainCredentials {
    fn valid_token(&self) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + '_>> {
        Box::pin(async move {
            let mut cached = self.cached.lock().await;
            if let Some(token) = cached.as_ref() {
                if token.fetched_at.elapsed() < self.ttl {
                    return Ok(Some(token.value.clone()));
                }
                debug!("cached access token expired, refreshing");
            }

            let fresh = load_token().await?;
            *cached = fresh.clone().map(|value| CachedToken {
                value,
                fetched_at: Instant::now(),
            });
            Ok(fresh)
        })
    }
}

/// Load the access token from OS keychain with env-var fallback.
async fn load_token() -> Result<Option<String>> {
    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(|| {
        keyring::Entry::new(KEYRING_SERVICE, KEYRING_ENTRY).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.trim().is_empty() => return Ok(Some(value.trim().to_owned())),
        Ok(_) => {
            warn!(key = KEYRING_ENTRY, "keychain entry is empty, trying env var");
        }
        Err(keyring::Error::NoEntry) => {
            debug!(key = KEYRING_ENTRY, "no keychain entry, trying env var");
        }
        Err(err) => {
            warn!(key = KEYRING_ENTRY, ?err, "keychain lookup failed, trying env var");
        }
    }

    Ok(env::var(TOKEN_ENV_VAR)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty()))
}
