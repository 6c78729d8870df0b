//! Bearer-token lifecycle for the IOL API.
//!
//! [`TokenManager`] owns the current access/refresh credential pair. Workers
//! read a consistently-published snapshot and, on expiry, funnel through a
//! single-flight refresh: concurrent detections collapse into one token
//! exchange and every caller resumes with the same new credential.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::AuthError;

/// An access/refresh token pair as issued by the token endpoint.
///
/// Replaced wholesale on every grant; never mutated field-by-field.
#[derive(Debug, Clone, Deserialize)]
pub struct Credential {
    /// Bearer token for API requests.
    pub access_token: String,
    /// Token exchanged for a new pair when the access token expires.
    pub refresh_token: String,
}

/// Read view of the current credential handed to workers.
///
/// The epoch identifies which installed credential the token came from, so a
/// worker that detected expiry can tell whether someone else already
/// refreshed on its behalf.
#[derive(Debug, Clone)]
pub struct TokenSnapshot {
    /// The access token current at snapshot time.
    pub access_token: String,
    /// Install generation of that token.
    pub epoch: u64,
}

/// The two OAuth exchanges the token endpoint supports.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Exchange username/password for an initial credential.
    async fn password_grant(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Credential, AuthError>;

    /// Exchange a refresh token for a new credential.
    async fn refresh_grant(&self, refresh_token: &str) -> Result<Credential, AuthError>;
}

/// Token exchange against the real IOL `/token` endpoint.
#[derive(Debug, Clone)]
pub struct IolTokenExchange {
    /// Shared HTTP client.
    http: reqwest::Client,
    /// Token endpoint URL.
    token_url: String,
}

impl IolTokenExchange {
    /// Create an exchange backed by the given HTTP client.
    pub fn new(http: reqwest::Client, token_url: impl Into<String>) -> Self {
        Self {
            http,
            token_url: token_url.into(),
        }
    }

    async fn grant(
        &self,
        form: &[(&str, &str)],
        reject: impl FnOnce(u16, String) -> AuthError,
    ) -> Result<Credential, AuthError> {
        let response = self.http.post(&self.token_url).form(form).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(reject(status, body));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl TokenExchange for IolTokenExchange {
    async fn password_grant(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Credential, AuthError> {
        self.grant(
            &[
                ("grant_type", "password"),
                ("username", username),
                ("password", password),
            ],
            |status, body| AuthError::LoginRejected { status, body },
        )
        .await
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<Credential, AuthError> {
        self.grant(
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ],
            |status, body| AuthError::RefreshRejected { status, body },
        )
        .await
    }
}

/// Credential plus its install generation.
#[derive(Debug)]
struct Slot {
    credential: Credential,
    epoch: u64,
}

/// Owns the current credential and coordinates refresh across workers.
pub struct TokenManager {
    exchange: Arc<dyn TokenExchange>,
    username: String,
    password: String,
    /// Current credential; `None` until `acquire` succeeds.
    slot: RwLock<Option<Slot>>,
    /// Serializes refresh exchanges. Installs happen only while holding this,
    /// after re-checking the epoch, so a slow refresh can never overwrite a
    /// newer credential.
    refresh_lock: Mutex<()>,
}

impl TokenManager {
    /// Create a manager; no network I/O happens until [`acquire`](Self::acquire).
    pub fn new(
        exchange: Arc<dyn TokenExchange>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            exchange,
            username: username.into(),
            password: password.into(),
            slot: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Perform the initial password grant and install the credential.
    ///
    /// Must succeed once before any quote fetch.
    pub async fn acquire(&self) -> Result<(), AuthError> {
        let credential = self
            .exchange
            .password_grant(&self.username, &self.password)
            .await?;

        let mut slot = self.slot.write().await;
        let epoch = slot.as_ref().map_or(1, |s| s.epoch + 1);
        info!(epoch, "credential acquired");
        *slot = Some(Slot { credential, epoch });
        Ok(())
    }

    /// Current access token without network I/O.
    pub async fn snapshot(&self) -> Result<TokenSnapshot, AuthError> {
        let slot = self.slot.read().await;
        slot.as_ref()
            .map(|s| TokenSnapshot {
                access_token: s.credential.access_token.clone(),
                epoch: s.epoch,
            })
            .ok_or(AuthError::NotAuthenticated)
    }

    /// Exchange the refresh token for a new credential, single-flight.
    ///
    /// `stale` is the snapshot whose token was rejected. If another caller
    /// already installed a newer credential, that one is returned without a
    /// network exchange.
    pub async fn refresh(&self, stale: &TokenSnapshot) -> Result<TokenSnapshot, AuthError> {
        let _flight = self.refresh_lock.lock().await;

        // Someone else may have refreshed while we waited for the lock.
        let refresh_token = {
            let slot = self.slot.read().await;
            let current = slot.as_ref().ok_or(AuthError::NotAuthenticated)?;
            if current.epoch > stale.epoch {
                debug!(epoch = current.epoch, "refresh already performed by another worker");
                return Ok(TokenSnapshot {
                    access_token: current.credential.access_token.clone(),
                    epoch: current.epoch,
                });
            }
            current.credential.refresh_token.clone()
        };

        let credential = self.exchange.refresh_grant(&refresh_token).await?;

        let mut slot = self.slot.write().await;
        let epoch = slot.as_ref().map_or(1, |s| s.epoch + 1);
        info!(epoch, "credential refreshed");
        let snapshot = TokenSnapshot {
            access_token: credential.access_token.clone(),
            epoch,
        };
        *slot = Some(Slot { credential, epoch });
        Ok(snapshot)
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Exchange that counts grants and issues numbered tokens.
    struct CountingExchange {
        logins: AtomicUsize,
        refreshes: AtomicUsize,
        /// Simulated exchange latency, to widen the race window.
        latency: Duration,
        fail_refresh: bool,
    }

    impl CountingExchange {
        fn new() -> Self {
            Self {
                logins: AtomicUsize::new(0),
                refreshes: AtomicUsize::new(0),
                latency: Duration::from_millis(0),
                fail_refresh: false,
            }
        }

        fn with_latency(latency: Duration) -> Self {
            Self {
                latency,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl TokenExchange for CountingExchange {
        async fn password_grant(
            &self,
            _username: &str,
            _password: &str,
        ) -> Result<Credential, AuthError> {
            let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Credential {
                access_token: format!("access-{n}"),
                refresh_token: format!("refresh-{n}"),
            })
        }

        async fn refresh_grant(&self, refresh_token: &str) -> Result<Credential, AuthError> {
            if self.latency > Duration::ZERO {
                tokio::time::sleep(self.latency).await;
            }
            if self.fail_refresh {
                return Err(AuthError::RefreshRejected {
                    status: 400,
                    body: "invalid_grant".to_string(),
                });
            }
            let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Credential {
                access_token: format!("refreshed-{n}-from-{refresh_token}"),
                refresh_token: format!("refresh-next-{n}"),
            })
        }
    }

    fn manager(exchange: Arc<CountingExchange>) -> TokenManager {
        TokenManager::new(exchange, "user", "pass")
    }

    #[tokio::test]
    async fn snapshot_before_acquire_fails() {
        let tokens = manager(Arc::new(CountingExchange::new()));
        assert!(matches!(
            tokens.snapshot().await,
            Err(AuthError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn acquire_then_snapshot() {
        let exchange = Arc::new(CountingExchange::new());
        let tokens = manager(exchange.clone());

        tokens.acquire().await.unwrap();
        let snap = tokens.snapshot().await.unwrap();

        assert_eq!(snap.access_token, "access-1");
        assert_eq!(snap.epoch, 1);
        assert_eq!(exchange.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_installs_new_credential() {
        let exchange = Arc::new(CountingExchange::new());
        let tokens = manager(exchange.clone());
        tokens.acquire().await.unwrap();

        let stale = tokens.snapshot().await.unwrap();
        let fresh = tokens.refresh(&stale).await.unwrap();

        assert_eq!(fresh.access_token, "refreshed-1-from-refresh-1");
        assert_eq!(fresh.epoch, 2);
        // The installed refresh token was rotated too.
        let again = tokens.refresh(&fresh).await.unwrap();
        assert_eq!(again.access_token, "refreshed-2-from-refresh-next-1");
    }

    #[tokio::test]
    async fn superseded_snapshot_skips_exchange() {
        let exchange = Arc::new(CountingExchange::new());
        let tokens = manager(exchange.clone());
        tokens.acquire().await.unwrap();

        let stale = tokens.snapshot().await.unwrap();
        let fresh = tokens.refresh(&stale).await.unwrap();

        // A second worker still holding the original snapshot must get the
        // already-installed credential, not trigger another exchange.
        let observed = tokens.refresh(&stale).await.unwrap();
        assert_eq!(observed.access_token, fresh.access_token);
        assert_eq!(observed.epoch, fresh.epoch);
        assert_eq!(exchange.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_refreshes_collapse_into_one() {
        let exchange = Arc::new(CountingExchange::with_latency(Duration::from_millis(20)));
        let tokens = Arc::new(manager(exchange.clone()));
        tokens.acquire().await.unwrap();

        let stale = tokens.snapshot().await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let tokens = Arc::clone(&tokens);
            let stale = stale.clone();
            handles.push(tokio::spawn(
                async move { tokens.refresh(&stale).await },
            ));
        }

        let mut observed = Vec::new();
        for handle in handles {
            observed.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(exchange.refreshes.load(Ordering::SeqCst), 1);
        assert!(observed.iter().all(|s| s.epoch == 2));
        assert!(observed
            .iter()
            .all(|s| s.access_token == observed[0].access_token));
    }

    #[tokio::test]
    async fn failed_refresh_leaves_credential_in_place() {
        let exchange = Arc::new(CountingExchange {
            fail_refresh: true,
            ..CountingExchange::new()
        });
        let tokens = manager(exchange);
        tokens.acquire().await.unwrap();

        let stale = tokens.snapshot().await.unwrap();
        assert!(tokens.refresh(&stale).await.is_err());

        // The old credential stays installed; the next cycle can retry.
        let snap = tokens.snapshot().await.unwrap();
        assert_eq!(snap.access_token, "access-1");
        assert_eq!(snap.epoch, 1);
    }
}
