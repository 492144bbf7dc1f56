//! # fb-ingestion
//!
//! Provider client for football statistics.
//!
//! This crate provides a [`DataSource`] trait over the upstream provider
//! (football-data.org v4) and a [`ProviderClient`] that puts every source
//! behind a shared [`RateBudget`] and a bounded [`RetryPolicy`].
//!
//! ## Design Principles
//!
//! - **Native async traits**: `DataSource` and `RateBudget` return
//!   `impl Future + Send`, no boxing.
//!
//! - **Validate once**: responses are converted to the closed
//!   [`fb_types::Entity`] set and validated at this boundary. Callers never
//!   see raw provider JSON.
//!
//! - **Testable**: [`MockSource`] scripts responses per key and counts
//!   calls; [`TokenBucket`] is a `governor` limiter on a tokio clock, so
//!   paused-time tests act as a fake clock.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fb_ingestion::{ProviderClient, ProviderConfig};
//! use fb_types::EntityKey;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ProviderClient::from_config(&ProviderConfig::from_env()?)?;
//!     let team = client.fetch(&EntityKey::team("66"), Duration::from_secs(30)).await?;
//!     println!("{:?}", team.as_team().map(|t| &t.stats));
//!     Ok(())
//! }
//! ```
//!
//! ## Testing with MockSource
//!
//! ```rust
//! use fb_ingestion::{IngestionError, MockSource, ProviderClient, RetryPolicy, Unlimited};
//! use fb_types::EntityKey;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mock = MockSource::new();
//!     let client = ProviderClient::new(mock.clone(), Unlimited, RetryPolicy::none());
//!
//!     let result = client.fetch(&EntityKey::team("66"), Duration::from_secs(1)).await;
//!     assert!(matches!(result, Err(IngestionError::NotFound(_)))); // nothing configured
//!     assert_eq!(mock.calls(), 1);
//! }
//! ```
//!
//! ## Known Limitations
//!
//! The free football-data.org tier allows 10 requests per minute. A team
//! fetch costs two requests (details plus finished matches), so priming a
//! 20-team league takes several minutes of budget.

mod client;
pub mod config;
pub mod error;
mod football_data;
mod mock;
mod rate_limit;
mod retry;
mod wire;

pub use client::ProviderClient;
pub use config::{ApiKey, ProviderConfig};
pub use error::IngestionError;
pub use football_data::FootballDataSource;
pub use mock::MockSource;
pub use rate_limit::{deadline_after, RateBudget, TokenBucket, TokioClock, Unlimited};
pub use retry::RetryPolicy;

use fb_types::{Entity, EntityKey};
use std::sync::Arc;

/// Upstream provider abstraction.
///
/// One call is one attempt: implementations do not retry or rate limit.
/// The returned entity must describe `key`; [`ProviderClient`] validates
/// this along with the entity's own invariants.
///
/// ## Implementors
///
/// - [`FootballDataSource`]: football-data.org over HTTP
/// - [`MockSource`]: Test implementation with scripted responses
pub trait DataSource: Send + Sync {
    /// Fetch the current body of `key`.
    ///
    /// # Errors
    ///
    /// Transient variants (`Network`, `Server`, `RateLimited`) may be
    /// retried by the caller; all others are final.
    fn fetch_entity(
        &self,
        key: &EntityKey,
    ) -> impl std::future::Future<Output = Result<Entity, IngestionError>> + Send;

    /// Rate-budget tokens one attempt for `key` consumes.
    fn request_cost(&self, _key: &EntityKey) -> u32 {
        1
    }
}

impl<S: DataSource> DataSource for Arc<S> {
    fn fetch_entity(
        &self,
        key: &EntityKey,
    ) -> impl std::future::Future<Output = Result<Entity, IngestionError>> + Send {
        (**self).fetch_entity(key)
    }

    fn request_cost(&self, key: &EntityKey) -> u32 {
        (**self).request_cost(key)
    }
}
