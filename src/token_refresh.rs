//! # Refresh Coordinator
//!
//! Background task that periodically sweeps connected integrations and
//! refreshes tokens entering the expiry buffer. Also provides on-demand
//! refresh with single-flight protection for request paths that hit a 401.

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge, histogram};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{Duration as TokioDuration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{AdapterError, AdapterRegistry, RegistryError};
use crate::config::AppConfig;
use crate::crypto::TokenTuple;
use crate::models::integration;
use crate::models::provider::{IntegrationStatus, Provider};
use crate::repositories::{IntegrationRepository, SecurityEventRepository};
use crate::token_store::{TokenStore, TokenStoreError};

/// Errors from a single refresh attempt.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// The integration carries no refresh token; re-authorization is the
    /// only way forward.
    #[error("integration has no refresh token")]
    TokenMissing,
    /// The provider refused the grant. The integration has been marked
    /// expired and will not be retried.
    #[error("provider refused the refresh: {source}")]
    Terminal {
        #[source]
        source: AdapterError,
    },
    /// Transient failure. The integration stays connected and the next
    /// sweep will try again.
    #[error("refresh failed transiently: {source}")]
    Retryable {
        #[source]
        source: AdapterError,
    },
    #[error("stored provider '{0}' is not recognized")]
    UnknownProvider(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Store(#[from] TokenStoreError),
    #[error("refresh database operation failed: {0}")]
    Database(#[from] anyhow::Error),
}

/// Outcome counters for one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Whether a token with the given expiry needs refreshing at `now`.
///
/// An unknown expiry counts as expiring: the only way to learn the real
/// expiry is to refresh. The buffer boundary is inclusive.
pub fn needs_refresh(
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    buffer: Duration,
) -> bool {
    match expires_at {
        None => true,
        Some(expires_at) => expires_at - now <= buffer,
    }
}

/// Background refresh coordinator
pub struct RefreshCoordinator {
    config: Arc<AppConfig>,
    repo: IntegrationRepository,
    token_store: Arc<TokenStore>,
    registry: AdapterRegistry,
    security_events: SecurityEventRepository,
    /// Tracks ongoing refreshes for single-flight protection
    in_flight: Arc<Mutex<HashMap<Uuid, ()>>>,
}

impl RefreshCoordinator {
    pub fn new(
        config: Arc<AppConfig>,
        repo: IntegrationRepository,
        token_store: Arc<TokenStore>,
        registry: AdapterRegistry,
        security_events: SecurityEventRepository,
    ) -> Self {
        Self {
            config,
            repo,
            token_store,
            registry,
            security_events,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run the sweep loop until the provided shutdown token fires.
    #[instrument(skip_all)]
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Starting refresh coordinator");
        let tick_interval = TokioDuration::from_secs(self.config.token_refresh.tick_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Refresh coordinator shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let tick_started = std::time::Instant::now();
                    match self.sweep().await {
                        Ok(stats) => {
                            debug!(
                                total = stats.total,
                                succeeded = stats.succeeded,
                                failed = stats.failed,
                                "Refresh sweep completed"
                            );
                        }
                        Err(err) => error!(error = ?err, "Refresh sweep failed"),
                    }
                    histogram!("token_refresh_tick_duration_ms")
                        .record(tick_started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Refresh coordinator stopped");
    }

    /// Execute one sweep over all integrations due for refresh.
    ///
    /// Individual failures are counted, never propagated, so one bad
    /// integration cannot starve the rest of the batch.
    #[instrument(skip_all)]
    pub async fn sweep(&self) -> Result<SweepStats, RefreshError> {
        let now = Utc::now();
        let cutoff = now + Duration::seconds(self.config.token_refresh.buffer_seconds as i64);

        let due = self.repo.find_due_for_refresh(cutoff).await?;
        let mut stats = SweepStats {
            total: due.len() as u64,
            ..SweepStats::default()
        };

        info!(
            due_integrations = due.len(),
            buffer_seconds = self.config.token_refresh.buffer_seconds,
            "Found integrations due for token refresh"
        );
        gauge!("token_refresh_integrations_due_gauge").set(due.len() as f64);

        let semaphore = Arc::new(tokio::sync::Semaphore::new(
            self.config.token_refresh.concurrency as usize,
        ));

        let mut handles = Vec::new();
        for due_integration in due {
            let semaphore = semaphore.clone();
            let coordinator = self.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                coordinator.refresh_with_jitter(due_integration).await
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(Ok(_)) => stats.succeeded += 1,
                Ok(Err(e)) => {
                    stats.failed += 1;
                    error!(error = ?e, "Integration refresh failed");
                }
                Err(e) => {
                    stats.failed += 1;
                    error!(error = ?e, "Refresh task panicked or was cancelled");
                }
            }
        }

        counter!("token_refresh_attempts_total").increment(stats.total);
        counter!("token_refresh_success_total").increment(stats.succeeded);
        counter!("token_refresh_failure_total").increment(stats.failed);

        Ok(stats)
    }

    async fn refresh_with_jitter(
        &self,
        due_integration: integration::Model,
    ) -> Result<TokenTuple, RefreshError> {
        let jitter_seconds = self.compute_jitter();
        if jitter_seconds > 0 {
            debug!(
                integration_id = %due_integration.id,
                jitter_seconds,
                "Applying jitter before token refresh"
            );
            sleep(TokioDuration::from_secs(jitter_seconds)).await;
        }

        self.refresh_integration(due_integration).await
    }

    /// Refresh a single integration's tokens.
    #[instrument(skip_all, fields(integration_id = %due_integration.id))]
    pub async fn refresh_integration(
        &self,
        due_integration: integration::Model,
    ) -> Result<TokenTuple, RefreshError> {
        let refresh_start = std::time::Instant::now();

        let provider: Provider = due_integration
            .provider
            .parse()
            .map_err(|_| RefreshError::UnknownProvider(due_integration.provider.clone()))?;

        let current = self
            .token_store
            .retrieve(due_integration.id)
            .await?
            .ok_or(RefreshError::TokenMissing)?;
        let refresh_token = current
            .refresh_token
            .clone()
            .ok_or(RefreshError::TokenMissing)?;

        let adapter = self.registry.get(provider)?;

        match adapter.refresh(&refresh_token).await {
            Ok(renewed) => {
                // Providers that do not rotate refresh tokens omit them in
                // the response; keep the one we already hold.
                let merged = TokenTuple {
                    access_token: renewed.access_token,
                    refresh_token: renewed.refresh_token.or(Some(refresh_token)),
                    expires_at: renewed.expires_at,
                    scopes: if renewed.scopes.is_empty() {
                        current.scopes
                    } else {
                        renewed.scopes
                    },
                };

                self.token_store.store(due_integration.id, &merged).await?;

                histogram!("token_refresh_latency_ms")
                    .record(refresh_start.elapsed().as_secs_f64() * 1_000.0);
                info!(
                    integration_id = %due_integration.id,
                    provider = %provider,
                    "Successfully refreshed integration tokens"
                );
                counter!("token_refresh_success_total", "provider" => provider.as_str())
                    .increment(1);

                Ok(merged)
            }
            Err(source) if source.is_retryable() => {
                warn!(
                    integration_id = %due_integration.id,
                    provider = %provider,
                    error = %source,
                    "Transient token refresh failure, will retry next sweep"
                );
                counter!("token_refresh_transient_failure_total").increment(1);
                Err(RefreshError::Retryable { source })
            }
            Err(source) => {
                // The grant is dead or the request is structurally wrong.
                // Retrying cannot help; require re-authorization.
                error!(
                    integration_id = %due_integration.id,
                    provider = %provider,
                    error = %source,
                    invalid_grant = source.is_invalid_grant(),
                    "Terminal token refresh failure, marking integration expired"
                );

                self.repo
                    .mark_status(&due_integration.id, IntegrationStatus::Expired)
                    .await?;
                self.token_store.invalidate(due_integration.id);

                let kind = if source.is_invalid_grant() {
                    "token_refresh_invalid_grant"
                } else {
                    "token_refresh_rejected"
                };
                if let Err(audit_err) = self
                    .security_events
                    .record(
                        provider,
                        kind,
                        None,
                        Some(source.to_string()),
                        Some(serde_json::json!({
                            "integration_id": due_integration.id,
                        })),
                    )
                    .await
                {
                    warn!(error = ?audit_err, "Failed to record refresh audit event");
                }

                counter!("token_refresh_permanent_failure_total").increment(1);
                Err(RefreshError::Terminal { source })
            }
        }
    }

    /// On-demand refresh with single-flight protection, for request paths
    /// that just received a 401 from the provider.
    #[instrument(skip_all, fields(integration_id = %integration_id))]
    pub async fn refresh_on_demand(
        &self,
        integration_id: Uuid,
    ) -> Result<TokenTuple, RefreshError> {
        {
            let in_flight = self.in_flight.lock().await;
            if in_flight.contains_key(&integration_id) {
                info!(
                    integration_id = %integration_id,
                    "Refresh already in progress, waiting for result"
                );
                drop(in_flight);
                sleep(TokioDuration::from_millis(100)).await;

                return self
                    .token_store
                    .retrieve(integration_id)
                    .await?
                    .ok_or(RefreshError::TokenMissing);
            }
        }

        let due_integration = self
            .repo
            .get_by_id(&integration_id)
            .await?
            .ok_or(TokenStoreError::NotFound(integration_id))?;

        counter!("token_refresh_on_demand_attempts_total").increment(1);

        {
            let mut in_flight = self.in_flight.lock().await;
            in_flight.insert(integration_id, ());
        }

        let result = self.refresh_integration(due_integration).await;

        {
            let mut in_flight = self.in_flight.lock().await;
            in_flight.remove(&integration_id);
        }

        match &result {
            Ok(_) => counter!("token_refresh_on_demand_success_total").increment(1),
            Err(_) => counter!("token_refresh_on_demand_failure_total").increment(1),
        }

        result
    }

    fn compute_jitter(&self) -> u64 {
        if self.config.token_refresh.jitter_factor <= 0.0 {
            return 0;
        }

        let max_delay_seconds = (self.config.token_refresh.buffer_seconds as f64
            * self.config.token_refresh.jitter_factor) as u64;

        let mut rng = rand::thread_rng();
        rng.gen_range(0..=max_delay_seconds)
    }
}

impl Clone for RefreshCoordinator {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            repo: self.repo.clone(),
            token_store: self.token_store.clone(),
            registry: self.registry.clone(),
            security_events: self.security_events.clone(),
            in_flight: self.in_flight.clone(),
        }
    }
}
