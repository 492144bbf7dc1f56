//! fb-indexer: Fetch coordination and analysis for the football stats cache.
//!
//! This crate sits between consumers and the provider:
//!
//! - [`Coordinator`] decides per key whether to serve from the
//!   [`EntityStore`](fb_store::EntityStore) or fetch through the
//!   [`ProviderClient`](fb_ingestion::ProviderClient), with at most one fetch
//!   per key in flight
//! - [`Indexer`] builds league tables, team comparisons, match summaries and
//!   performance views on top of it
//!
//! # Example
//!
//! ```rust
//! use fb_indexer::{Coordinator, ResolveSource};
//! use fb_ingestion::{MockSource, ProviderClient, RetryPolicy, Unlimited};
//! use fb_store::{EntityStore, StoreConfig};
//! use fb_types::{EntityKey, Team, TeamStats};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let team = Team {
//!     id: "66".into(),
//!     name: "Manchester United FC".into(),
//!     short_name: None,
//!     tla: Some("MUN".into()),
//!     league_id: Some("PL".into()),
//!     stats: TeamStats::from_results(&[(2, 1)]),
//!     last_updated: chrono::Utc::now(),
//! };
//! let source = MockSource::default().with_entity(team);
//! let client = ProviderClient::new(source, Unlimited, RetryPolicy::none());
//! let store = Arc::new(EntityStore::new(StoreConfig::default()));
//! let coordinator = Coordinator::new(client, store);
//!
//! let key = EntityKey::team("66");
//! let first = coordinator
//!     .resolve(&key, Duration::from_secs(300), Duration::from_secs(5))
//!     .await
//!     .unwrap();
//! assert_eq!(first.source, ResolveSource::Network);
//! assert_eq!(first.version(), 1);
//!
//! let second = coordinator
//!     .resolve(&key, Duration::from_secs(300), Duration::from_secs(5))
//!     .await
//!     .unwrap();
//! assert_eq!(second.source, ResolveSource::Cache);
//! # }
//! ```

pub mod analysis;
mod coordinator;
mod error;
mod indexer;

pub use analysis::BIG_SIX;
pub use coordinator::{
    CacheStats, Coordinator, CoordinatorConfig, LeagueRefresh, ResolveSource, Resolved,
};
pub use error::{FetchError, IndexerError};
pub use indexer::{Indexer, IndexerConfig, ReadOptions};

// Re-export commonly used types from dependencies for convenience
pub use fb_store::SearchHit;
pub use fb_types::{EntityKey, EntityKind, Freshness};
