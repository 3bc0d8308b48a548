//! Upload pipeline with retry, backoff, and token refresh.
//!
//! At most one successful upload per collection cycle. An upload gets up to
//! three attempts with linear backoff on server errors; a 401 triggers a
//! token refresh and an immediate re-send that does *not* consume an
//! attempt, since the stale token was the pipeline's own fault rather than
//! the collector's.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use sr08_types::{HealthPayload, HealthRecord, TokenPair};

use crate::collector::{CollectorApi, CollectorError};
use crate::validation::{ValidationError, validate_record};

/// Delivery tuning knobs.
#[derive(Debug, Clone)]
pub struct DeliveryOptions {
    /// Upload attempts per cycle.
    pub max_attempts: u32,
    /// Backoff unit for server errors; attempt N waits N units.
    pub server_backoff_unit: Duration,
    /// Flat backoff after a transport-level failure.
    pub transport_backoff: Duration,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            server_backoff_unit: Duration::from_secs(2),
            transport_backoff: Duration::from_millis(1500),
        }
    }
}

/// Terminal outcome of one delivery request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    /// The collector accepted the payload.
    Delivered,
    /// This cycle already uploaded; nothing was sent.
    AlreadySent,
    /// The record failed plausibility validation; nothing was sent.
    Rejected(ValidationError),
    /// Token refresh failed; the cycle cannot authenticate.
    AuthFailed,
    /// All attempts consumed without acceptance.
    Exhausted,
}

/// Drives uploads to the collector for the current cycle.
pub struct DeliveryPipeline<C: CollectorApi> {
    collector: Arc<C>,
    user_id: String,
    tokens: Mutex<TokenPair>,
    /// Exactly-once guard, reset at each cycle start.
    sent: AtomicBool,
    options: DeliveryOptions,
}

impl<C: CollectorApi> DeliveryPipeline<C> {
    /// Create a pipeline with default options.
    pub fn new(collector: Arc<C>, user_id: &str, tokens: TokenPair) -> Self {
        Self::with_options(collector, user_id, tokens, DeliveryOptions::default())
    }

    /// Create a pipeline with custom options.
    pub fn with_options(
        collector: Arc<C>,
        user_id: &str,
        tokens: TokenPair,
        options: DeliveryOptions,
    ) -> Self {
        Self {
            collector,
            user_id: user_id.to_string(),
            tokens: Mutex::new(tokens),
            sent: AtomicBool::new(false),
            options,
        }
    }

    /// Arm the pipeline for a new cycle.
    pub fn begin_cycle(&self) {
        self.sent.store(false, Ordering::SeqCst);
    }

    /// Whether this cycle has already claimed its upload.
    pub fn already_sent(&self) -> bool {
        self.sent.load(Ordering::SeqCst)
    }

    /// Validate and upload one record.
    ///
    /// The first caller per cycle claims the upload slot before any network
    /// activity, so concurrent callers cannot double-send.
    pub async fn deliver(&self, record: &HealthRecord) -> DeliveryResult {
        if self.sent.swap(true, Ordering::SeqCst) {
            debug!("cycle already delivered; skipping");
            return DeliveryResult::AlreadySent;
        }

        if let Err(e) = validate_record(record) {
            warn!(error = %e, "record failed validation; not uploading");
            return DeliveryResult::Rejected(e);
        }

        let payload = HealthPayload::from_record(&self.user_id, record);
        let mut attempt = 1u32;
        let mut refreshed = false;
        while attempt <= self.options.max_attempts {
            let access = self.tokens.lock().await.access_token.clone();
            match self.collector.upload(&payload, &access).await {
                Ok(status) if (200..300).contains(&status) => {
                    info!(attempt, status, "record delivered");
                    return DeliveryResult::Delivered;
                }
                Ok(401) => {
                    if refreshed {
                        // A fresh token was rejected too; refreshing again
                        // cannot help.
                        warn!("collector rejected a freshly refreshed token");
                        return DeliveryResult::AuthFailed;
                    }
                    // Stale token; refresh and re-send on the same attempt.
                    debug!(attempt, "access token rejected; refreshing");
                    refreshed = true;
                    let refresh = self.tokens.lock().await.refresh_token.clone();
                    match self.collector.refresh(&self.user_id, &refresh).await {
                        Ok(pair) => {
                            *self.tokens.lock().await = pair;
                            continue;
                        }
                        Err(e) => {
                            warn!(error = %e, "token refresh failed");
                            return DeliveryResult::AuthFailed;
                        }
                    }
                }
                Ok(status) if status == 429 || (500..600).contains(&status) => {
                    warn!(attempt, status, "collector busy or failing");
                    if attempt < self.options.max_attempts {
                        sleep(self.options.server_backoff_unit * attempt).await;
                    }
                    attempt += 1;
                }
                Ok(status) => {
                    warn!(attempt, status, "unexpected collector status");
                    if attempt < self.options.max_attempts {
                        sleep(self.options.transport_backoff).await;
                    }
                    attempt += 1;
                }
                Err(CollectorError::RefreshRejected(status)) => {
                    warn!(status, "refresh status from upload path");
                    return DeliveryResult::AuthFailed;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "upload attempt failed");
                    if attempt < self.options.max_attempts {
                        sleep(self.options.transport_backoff).await;
                    }
                    attempt += 1;
                }
            }
        }

        warn!(
            attempts = self.options.max_attempts,
            "delivery exhausted; record remains local only"
        );
        DeliveryResult::Exhausted
    }
}
