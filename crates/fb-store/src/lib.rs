//! # fb-store
//!
//! Freshness-aware store for football entities.
//!
//! [`EntityStore`] holds one versioned [`fb_types::CacheRecord`] per
//! [`fb_types::EntityKey`] and answers three questions without ever
//! touching the network:
//!
//! - **get**: what do we have for this key, and how old is it?
//! - **put**: replace it, but only with a strictly newer version
//! - **search**: which stored entities look most like this vector?
//!
//! Records are evicted lowest-version first once the configured capacity
//! is exceeded, skipping anything pinned by an in-flight fetch. With a
//! path configured, every committed write is mirrored to SQLite and
//! reloaded on start-up.

mod config;
mod error;
mod persistence;
mod similarity;
mod store;

pub use config::{StoreConfig, TtlPolicy, DEFAULT_CAPACITY, DEFAULT_TTL};
pub use error::StoreError;
pub use persistence::{NoopPersistence, Persistence, SqliteStorage};
pub use similarity::{ExactIndex, SearchHit, SimilarityIndex, SimilarityMetric};
pub use store::{EntityStore, PinGuard, PutOutcome, Record};
