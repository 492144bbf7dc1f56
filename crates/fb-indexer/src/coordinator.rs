//! Fetch coordination: cache-or-fetch decisions with single-flight.
//!
//! Per key the coordinator is either idle or fetching, never fetching
//! twice. The first caller to miss becomes the leader and spawns the fetch
//! as its own task; everyone arriving while it runs subscribes to the same
//! `watch` channel and receives the same outcome. Because the fetch is a
//! detached task, a caller that times out only stops waiting: the fetch
//! keeps going and still commits to the store.

use crate::error::FetchError;
use fb_ingestion::{DataSource, ProviderClient, RateBudget, TokenBucket};
use fb_store::{EntityStore, Record, SearchHit, StoreError};
use fb_types::{Clock, EntityKey, Freshness, SystemClock};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;

/// Result of one fetch, shared by every waiter.
type Outcome = Result<Record, FetchError>;

type InFlight = Arc<Mutex<HashMap<EntityKey, watch::Receiver<Option<Outcome>>>>>;

/// Where a resolved record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveSource {
    /// Stored record within the caller's `max_age`.
    Cache,
    /// This caller led a provider fetch.
    Network,
    /// This caller joined a fetch another caller started.
    Coalesced,
    /// Refresh failed; an older record was served on request.
    StaleFallback,
}

/// A record plus how it was obtained and how old it is.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub record: Record,
    pub source: ResolveSource,
    pub age: Duration,
    pub freshness: Freshness,
}

impl Resolved {
    fn new(record: Record, source: ResolveSource, clock: &dyn Clock) -> Self {
        let now = clock.now();
        Self {
            age: record.age(now),
            freshness: record.freshness(now),
            record,
            source,
        }
    }

    pub fn key(&self) -> &EntityKey {
        &self.record.key
    }

    pub fn version(&self) -> u64 {
        self.record.version
    }
}

/// Coordinator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Upper bound on one background fetch, retries included. Independent
    /// of any caller's timeout.
    pub fetch_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(60),
        }
    }
}

impl CoordinatorConfig {
    /// Reads `FB_FETCH_TIMEOUT_SECS` (default: 60).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        match env::var("FB_FETCH_TIMEOUT_SECS").map(|raw| raw.trim().parse::<u64>()) {
            Ok(Ok(secs)) => config.fetch_timeout = Duration::from_secs(secs),
            Ok(Err(e)) => tracing::warn!("Ignoring FB_FETCH_TIMEOUT_SECS: {}", e),
            Err(_) => {}
        }
        config
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    provider_calls: AtomicU64,
    coalesced: AtomicU64,
    stale_served: AtomicU64,
    stale_writes: AtomicU64,
    failures: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Snapshot of the cache monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Fetches started (each may make several provider requests).
    pub provider_calls: u64,
    pub coalesced: u64,
    pub stale_served: u64,
    pub stale_writes: u64,
    pub failures: u64,
    /// Percentage of lookups served from cache; `None` before any lookup.
    pub hit_rate: Option<Decimal>,
    pub records: usize,
    pub in_flight: usize,
}

/// Outcome of [`Coordinator::refresh_league`].
#[derive(Debug, Clone)]
pub struct LeagueRefresh {
    pub league: Resolved,
    /// One entry per team in the new table, in table order.
    pub teams: Vec<(EntityKey, Result<Resolved, FetchError>)>,
}

impl LeagueRefresh {
    pub fn succeeded(&self) -> usize {
        self.teams.iter().filter(|(_, r)| r.is_ok()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&EntityKey, &FetchError)> {
        self.teams
            .iter()
            .filter_map(|(key, r)| r.as_ref().err().map(|e| (key, e)))
    }
}

/// Decides per key whether to serve from the store or fetch, with at most
/// one fetch per key in flight.
///
/// Cloning is cheap; clones share the store, the provider client, the
/// in-flight table and the counters.
pub struct Coordinator<S, B = TokenBucket> {
    client: Arc<ProviderClient<S, B>>,
    store: Arc<EntityStore>,
    clock: Arc<dyn Clock>,
    in_flight: InFlight,
    counters: Arc<Counters>,
    config: CoordinatorConfig,
}

impl<S, B> Clone for Coordinator<S, B> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            store: self.store.clone(),
            clock: self.clock.clone(),
            in_flight: self.in_flight.clone(),
            counters: self.counters.clone(),
            config: self.config.clone(),
        }
    }
}

/// What a caller does after looking at the store and the in-flight table.
enum Plan {
    Serve(Record),
    Wait(watch::Receiver<Option<Outcome>>, ResolveSource),
}

/// Removes the in-flight entry when the fetch task ends, however it ends.
struct FlightGuard {
    in_flight: InFlight,
    key: EntityKey,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.key);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl<S, B> Coordinator<S, B>
where
    S: DataSource + 'static,
    B: RateBudget + 'static,
{
    pub fn new(client: ProviderClient<S, B>, store: Arc<EntityStore>) -> Self {
        Self {
            client: Arc::new(client),
            store,
            clock: Arc::new(SystemClock),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            counters: Arc::new(Counters::default()),
            config: CoordinatorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `clock` for record ages instead of the system clock.
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn client(&self) -> &ProviderClient<S, B> {
        &self.client
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Return the record for `key`, fetching it if the stored one is
    /// missing or older than `max_age`.
    ///
    /// `Duration::ZERO` forces a fetch whenever the stored record has any
    /// age; `Duration::MAX` never fetches once a record exists.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Timeout`] if `timeout` passes first; the fetch
    ///   carries on in the background
    /// - any error the fetch produced; a previously stored record is left
    ///   untouched and is *not* substituted (see [`Self::resolve_or_stale`])
    pub async fn resolve(
        &self,
        key: &EntityKey,
        max_age: Duration,
        timeout: Duration,
    ) -> Result<Resolved, FetchError> {
        self.resolve_inner(key, Some(max_age), timeout).await
    }

    /// Fetch `key` regardless of what is stored, joining a fetch already in
    /// flight for it.
    pub async fn refresh(&self, key: &EntityKey, timeout: Duration) -> Result<Resolved, FetchError> {
        self.resolve_inner(key, None, timeout).await
    }

    /// Like [`Self::resolve`], but when the refresh fails or times out and
    /// an older record exists, serve it labelled
    /// [`ResolveSource::StaleFallback`].
    pub async fn resolve_or_stale(
        &self,
        key: &EntityKey,
        max_age: Duration,
        timeout: Duration,
    ) -> Result<Resolved, FetchError> {
        match self.resolve(key, max_age, timeout).await {
            Ok(resolved) => Ok(resolved),
            Err(err) => match self.store.get(key) {
                Some(record) => {
                    bump(&self.counters.stale_served);
                    tracing::warn!("Serving stale {} v{} after: {}", key, record.version, err);
                    Ok(Resolved::new(
                        record,
                        ResolveSource::StaleFallback,
                        self.clock.as_ref(),
                    ))
                }
                None => Err(err),
            },
        }
    }

    async fn resolve_inner(
        &self,
        key: &EntityKey,
        max_age: Option<Duration>,
        timeout: Duration,
    ) -> Result<Resolved, FetchError> {
        if let Some(max_age) = max_age {
            if let Some(record) = self.fresh_enough(key, max_age) {
                bump(&self.counters.hits);
                tracing::debug!("Cache hit for {} v{}", key, record.version);
                return Ok(Resolved::new(record, ResolveSource::Cache, self.clock.as_ref()));
            }
        }
        let (mut rx, source) = match self.join_or_start(key, max_age) {
            Plan::Serve(record) => {
                bump(&self.counters.hits);
                return Ok(Resolved::new(record, ResolveSource::Cache, self.clock.as_ref()));
            }
            Plan::Wait(rx, source) => (rx, source),
        };
        bump(&self.counters.misses);

        let outcome = match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
            Err(_) => {
                tracing::debug!("Caller gave up waiting for {} after {:?}", key, timeout);
                return Err(FetchError::Timeout);
            }
            // Sender dropped without a value: the fetch task was aborted.
            Ok(Err(_)) => Err(FetchError::Transient {
                attempts: 0,
                reason: "fetch task ended without a result".to_string(),
            }),
            Ok(Ok(value)) => value.clone().unwrap_or(Err(FetchError::Timeout)),
        };

        outcome.map(|record| Resolved::new(record, source, self.clock.as_ref()))
    }

    fn fresh_enough(&self, key: &EntityKey, max_age: Duration) -> Option<Record> {
        self.store
            .get(key)
            .filter(|record| record.is_within(max_age, self.clock.now()))
    }

    /// Under the in-flight lock: serve a record committed since the first
    /// look, join the running fetch, or start one.
    fn join_or_start(&self, key: &EntityKey, max_age: Option<Duration>) -> Plan {
        let mut in_flight = lock(&self.in_flight);

        if let Some(rx) = in_flight.get(key) {
            bump(&self.counters.coalesced);
            tracing::debug!("Joining in-flight fetch for {}", key);
            return Plan::Wait(rx.clone(), ResolveSource::Coalesced);
        }
        if let Some(max_age) = max_age {
            if let Some(record) = self.fresh_enough(key, max_age) {
                return Plan::Serve(record);
            }
        }

        let (tx, rx) = watch::channel(None);
        in_flight.insert(key.clone(), rx.clone());
        bump(&self.counters.provider_calls);

        let task = FetchTask {
            client: self.client.clone(),
            store: self.store.clone(),
            clock: self.clock.clone(),
            counters: self.counters.clone(),
            fetch_timeout: self.config.fetch_timeout,
            guard: FlightGuard {
                in_flight: self.in_flight.clone(),
                key: key.clone(),
            },
        };
        tokio::spawn(async move {
            let outcome = task.run().await;
            // No receivers left is fine: the store already has the result.
            let _ = tx.send(Some(outcome));
        });

        Plan::Wait(rx, ResolveSource::Network)
    }

    /// Force-refresh a league's standings, then resolve every team in the
    /// new table concurrently with the team freshness window as `max_age`.
    ///
    /// Team failures are reported per key and do not affect the league
    /// record, which is committed before any team is looked at.
    pub async fn refresh_league(
        &self,
        league_id: &str,
        timeout: Duration,
    ) -> Result<LeagueRefresh, FetchError> {
        let league_key = EntityKey::league(league_id);
        let league = self.refresh(&league_key, timeout).await?;

        let team_keys: Vec<EntityKey> = match league.record.entity.as_league() {
            Some(body) => body.team_ids().map(EntityKey::team).collect(),
            None => {
                return Err(FetchError::Malformed(format!(
                    "{} holds a {} body",
                    league_key,
                    league.record.entity.kind()
                )))
            }
        };

        let team_ttl = self.store.ttl_policy().team;
        let teams = join_all(team_keys.into_iter().map(|key| async move {
            let result = self.resolve(&key, team_ttl, timeout).await;
            (key, result)
        }))
        .await;

        let refresh = LeagueRefresh { league, teams };
        tracing::info!(
            "Refreshed {} v{}: {}/{} teams resolved",
            league_key,
            refresh.league.version(),
            refresh.succeeded(),
            refresh.teams.len()
        );
        for (key, err) in refresh.failures() {
            tracing::warn!("Team {} not refreshed: {}", key, err);
        }
        Ok(refresh)
    }

    /// Nearest stored entities to `embedding`.
    pub fn search(&self, embedding: &[f32], k: usize) -> Vec<SearchHit> {
        self.store.search(embedding, k)
    }

    /// Entities of the same kind nearest to the stored `key`, excluding
    /// itself. `None` if `key` is not stored or has no embedding.
    pub fn similar_to(&self, key: &EntityKey, k: usize) -> Option<Vec<SearchHit>> {
        let record = self.store.get(key)?;
        let embedding = record.embedding.as_ref()?;
        let mut hits = self
            .store
            .search_kind(embedding, k.saturating_add(1), key.kind());
        hits.retain(|hit| &hit.key != key);
        hits.truncate(k);
        Some(hits)
    }

    /// Snapshot of the cache monitor.
    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        let hits = c.hits.load(Ordering::Relaxed);
        let misses = c.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        let hit_rate = (lookups > 0).then(|| {
            (Decimal::from(hits) * Decimal::from(100) / Decimal::from(lookups)).round_dp(2)
        });

        CacheStats {
            hits,
            misses,
            provider_calls: c.provider_calls.load(Ordering::Relaxed),
            coalesced: c.coalesced.load(Ordering::Relaxed),
            stale_served: c.stale_served.load(Ordering::Relaxed),
            stale_writes: c.stale_writes.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            hit_rate,
            records: self.store.len(),
            in_flight: lock(&self.in_flight).len(),
        }
    }
}

/// The body of one detached fetch.
struct FetchTask<S, B> {
    client: Arc<ProviderClient<S, B>>,
    store: Arc<EntityStore>,
    clock: Arc<dyn Clock>,
    counters: Arc<Counters>,
    fetch_timeout: Duration,
    guard: FlightGuard,
}

impl<S: DataSource, B: RateBudget> FetchTask<S, B> {
    async fn run(self) -> Outcome {
        let key = self.guard.key.clone();
        let _pin = self.store.pin(&key);
        let fetched_at = self.clock.now();

        let entity = match self.client.fetch(&key, self.fetch_timeout).await {
            Ok(entity) => entity,
            Err(err) => {
                bump(&self.counters.failures);
                tracing::warn!("Fetch for {} failed: {}", key, err);
                return Err(err.into());
            }
        };

        let version = self.store.next_version(&key);
        match self.store.put(key.clone(), entity, version, fetched_at) {
            Ok(outcome) => {
                tracing::info!(
                    "Committed {} v{} ({} evicted)",
                    key,
                    version,
                    outcome.evicted.len()
                );
                Ok(outcome.record)
            }
            Err(StoreError::StaleWrite {
                current, attempted, ..
            }) => {
                bump(&self.counters.stale_writes);
                tracing::warn!(
                    "Stale write for {}: v{} lost to v{}; serving the winner",
                    key,
                    attempted,
                    current
                );
                self.store
                    .get(&key)
                    .ok_or_else(|| FetchError::Store(format!("{} vanished after stale write", key)))
            }
            Err(err) => {
                bump(&self.counters.failures);
                tracing::warn!("Failed to commit {}: {}", key, err);
                Err(FetchError::Store(err.to_string()))
            }
        }
    }
}
