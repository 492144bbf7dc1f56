//! Versioned cache records.

use crate::EntityKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Freshness label attached to every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// Within its freshness window.
    Fresh,
    /// Past its window but still usable when the caller allows it.
    Stale,
}

/// A cached entity body together with the metadata needed to judge it.
///
/// `version` increases strictly per key; `fetched_at` records when the
/// provider was asked, not when the record was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord<T> {
    pub key: EntityKey,
    pub entity: T,
    pub fetched_at: DateTime<Utc>,
    pub ttl: Duration,
    pub version: u64,
    pub embedding: Option<Vec<f32>>,
}

impl<T> CacheRecord<T> {
    /// Time elapsed since the fetch. Never negative.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.fetched_at).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| self.fetched_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.age(now) > self.ttl
    }

    /// Whether the record satisfies a caller's `max_age` bound.
    pub fn is_within(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) <= max_age
    }

    pub fn freshness(&self, now: DateTime<Utc>) -> Freshness {
        if self.is_stale(now) {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }

    /// Transform the body, keeping the metadata.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheRecord<U> {
        CacheRecord {
            key: self.key,
            entity: f(self.entity),
            fetched_at: self.fetched_at,
            ttl: self.ttl,
            version: self.version,
            embedding: self.embedding,
        }
    }
}
