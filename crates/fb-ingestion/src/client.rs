//! The provider client: one data source behind a shared rate budget and a
//! bounded retry policy.

use crate::config::ProviderConfig;
use crate::rate_limit::{deadline_after, RateBudget, TokenBucket};
use crate::{DataSource, FootballDataSource, IngestionError, RetryPolicy};
use fb_types::{Entity, EntityKey};
use std::time::Duration;
use tokio::time::Instant;

/// Fetches validated entities from a [`DataSource`].
///
/// Every attempt takes [`DataSource::request_cost`] tokens from the budget
/// in one step before touching the network, including attempts that go on
/// to fail.
/// Transient failures are retried per the [`RetryPolicy`]; everything else
/// is returned as-is on the first occurrence.
pub struct ProviderClient<S, B = TokenBucket> {
    source: S,
    budget: B,
    retry: RetryPolicy,
}

impl ProviderClient<FootballDataSource, TokenBucket> {
    /// Production client built from configuration.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, IngestionError> {
        Ok(Self::new(
            FootballDataSource::new(config)?,
            TokenBucket::new(config.rate_limit, config.rate_window),
            config.retry.clone(),
        ))
    }
}

impl<S: DataSource, B: RateBudget> ProviderClient<S, B> {
    pub fn new(source: S, budget: B, retry: RetryPolicy) -> Self {
        Self {
            source,
            budget,
            retry,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn budget(&self) -> &B {
        &self.budget
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Fetch one entity, bounded by `timeout` overall.
    ///
    /// # Errors
    ///
    /// - [`IngestionError::Timeout`] if the deadline passes while waiting for
    ///   budget, for the network, or before the next backoff would end
    /// - [`IngestionError::Exhausted`] once transient failures use up every
    ///   attempt
    /// - [`IngestionError::Malformed`] if the response fails validation or
    ///   describes a different key
    /// - `NotFound` / `Unauthorized` straight from the source
    pub async fn fetch(&self, key: &EntityKey, timeout: Duration) -> Result<Entity, IngestionError> {
        let deadline = deadline_after(timeout);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match self.attempt(key, deadline).await {
                Ok(entity) => return Ok(entity),
                Err(err) => err,
            };

            if !err.is_transient() {
                tracing::debug!("{} attempt {} failed permanently: {}", key, attempt, err);
                return Err(err);
            }
            if !self.retry.should_retry(attempt, &err) {
                tracing::warn!("{} giving up after {} attempts: {}", key, attempt, err);
                return Err(IngestionError::Exhausted {
                    attempts: attempt,
                    reason: err.to_string(),
                });
            }

            let delay = self.retry.delay_after(attempt, &err);
            if Instant::now() + delay > deadline {
                tracing::warn!("{} backoff of {:?} would pass the deadline", key, delay);
                return Err(IngestionError::Timeout);
            }
            tracing::warn!(
                "{} attempt {} failed: {}; retrying in {:?}",
                key,
                attempt,
                err,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// One budgeted, validated call to the source.
    async fn attempt(&self, key: &EntityKey, deadline: Instant) -> Result<Entity, IngestionError> {
        self.budget
            .acquire(self.source.request_cost(key), deadline)
            .await?;

        let entity = tokio::time::timeout_at(deadline, self.source.fetch_entity(key))
            .await
            .map_err(|_| IngestionError::Timeout)??;

        entity.validate()?;
        if entity.key() != *key {
            return Err(IngestionError::Malformed(format!(
                "asked for {}, provider answered {}",
                key,
                entity.key()
            )));
        }
        Ok(entity)
    }
}
