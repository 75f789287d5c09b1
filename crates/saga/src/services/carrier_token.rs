//! Carrier API credentials with lazy refresh.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::error::SagaError;

/// A bearer token and the instant it stops being accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

/// Obtains a fresh token from the carrier's auth endpoint.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue(&self) -> Result<AccessToken, SagaError>;
}

/// Owns one carrier token and refreshes it when it nears expiry.
///
/// Concurrent callers that find the token stale wait on the same refresh.
pub struct CarrierSession<I> {
    issuer: I,
    refresh_margin: Duration,
    cached: Mutex<Option<AccessToken>>,
}

impl<I: TokenIssuer> CarrierSession<I> {
    pub fn new(issuer: I) -> Self {
        Self {
            issuer,
            refresh_margin: Duration::seconds(60),
            cached: Mutex::new(None),
        }
    }

    /// Returns a token valid for at least the refresh margin.
    pub async fn token(&self) -> Result<String, SagaError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && token.expires_at - self.refresh_margin > Utc::now()
        {
            return Ok(token.value.clone());
        }

        let fresh = self.issuer.issue().await?;
        tracing::debug!(expires_at = %fresh.expires_at, "carrier token refreshed");
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    /// Drops the cached token, e.g. after the carrier answers 401.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

/// Issues locally generated tokens with a fixed lifetime.
#[derive(Debug, Clone)]
pub struct LocalTokenIssuer {
    ttl: Duration,
    issued: Arc<AtomicU32>,
}

impl LocalTokenIssuer {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            issued: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Number of tokens issued so far.
    pub fn issued(&self) -> u32 {
        self.issued.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenIssuer for LocalTokenIssuer {
    async fn issue(&self) -> Result<AccessToken, SagaError> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AccessToken {
            value: format!("tok-{n}"),
            expires_at: Utc::now() + self.ttl,
        })
    }
}
