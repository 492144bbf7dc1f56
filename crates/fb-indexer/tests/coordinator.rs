//! Coordinator behaviour against a scripted source.
//!
//! Record ages come from a `ManualClock`; provider latency is simulated with
//! the mock's delay on paused tokio time.

use chrono::DateTime;
use fb_indexer::{Coordinator, FetchError, Freshness, ResolveSource};
use fb_ingestion::{IngestionError, MockSource, ProviderClient, RetryPolicy, Unlimited};
use fb_store::{EntityStore, StoreConfig};
use fb_types::{EntityKey, League, ManualClock, StandingEntry, Team, TeamRef, TeamStats};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

const FIVE_MIN: Duration = Duration::from_secs(300);
const HOUR: Duration = Duration::from_secs(3600);
const TIMEOUT: Duration = Duration::from_secs(10);

fn team(id: &str, results: &[(u32, u32)]) -> Team {
    Team {
        id: id.to_string(),
        name: format!("Team {}", id),
        short_name: None,
        tla: None,
        league_id: Some("PL".to_string()),
        stats: TeamStats::from_results(results),
        last_updated: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
    }
}

fn row(team_id: &str, rank: u32, won: u32) -> StandingEntry {
    StandingEntry {
        team: TeamRef::new(team_id, format!("Team {}", team_id)),
        rank,
        points: won * 3,
        goal_difference: won as i32,
        played: 10,
        won,
        draw: 0,
        lost: 10 - won,
        goals_for: 10 + won,
        goals_against: 10,
        form: Some("WWLDW".to_string()),
    }
}

fn league(team_ids: &[&str]) -> League {
    let rows = team_ids
        .iter()
        .enumerate()
        .map(|(i, id)| row(id, i as u32 + 1, 9 - i as u32))
        .collect::<Vec<_>>();
    League::new(
        "PL",
        "Premier League",
        "2024/2025",
        rows,
        team_ids.len(),
        DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
    )
    .unwrap()
}

struct Harness {
    coordinator: Coordinator<MockSource, Unlimited>,
    mock: MockSource,
    clock: ManualClock,
    store: Arc<EntityStore>,
}

fn harness(mock: MockSource) -> Harness {
    harness_with(mock, StoreConfig::default())
}

fn harness_with(mock: MockSource, config: StoreConfig) -> Harness {
    let clock = ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
    let store = Arc::new(EntityStore::new(config));
    let client = ProviderClient::new(mock.clone(), Unlimited, RetryPolicy::none());
    let coordinator = Coordinator::new(client, store.clone()).with_clock(clock.clone());
    Harness {
        coordinator,
        mock,
        clock,
        store,
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_one_fetch() {
    let h = harness(
        MockSource::new()
            .with_entity(team("66", &[(2, 1)]))
            .with_delay(Duration::from_millis(200)),
    );
    let key = EntityKey::team("66");

    let results = join_all((0..10).map(|_| h.coordinator.resolve(&key, FIVE_MIN, TIMEOUT))).await;

    assert_eq!(h.mock.calls(), 1);
    let resolved: Vec<_> = results.into_iter().map(Result::unwrap).collect();
    assert_eq!(resolved[0].source, ResolveSource::Network);
    assert!(resolved[1..]
        .iter()
        .all(|r| r.source == ResolveSource::Coalesced));
    assert!(resolved
        .iter()
        .all(|r| Arc::ptr_eq(&r.record, &resolved[0].record)));
    assert!(resolved.iter().all(|r| r.version() == 1));

    let stats = h.coordinator.stats();
    assert_eq!(stats.provider_calls, 1);
    assert_eq!(stats.coalesced, 9);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_flight_across_threads() {
    let h = harness(
        MockSource::new()
            .with_entity(team("64", &[(1, 0)]))
            .with_delay(Duration::from_millis(50)),
    );
    let key = EntityKey::team("64");

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let coordinator = h.coordinator.clone();
            let key = key.clone();
            tokio::spawn(async move { coordinator.resolve(&key, FIVE_MIN, TIMEOUT).await })
        })
        .collect();

    for handle in handles {
        let resolved = handle.await.unwrap().unwrap();
        assert_eq!(resolved.version(), 1);
    }
    assert_eq!(h.mock.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_two_callers_then_cached_read() {
    let h = harness(
        MockSource::new()
            .with_entity(team("66", &[(2, 1), (0, 0)]))
            .with_delay(Duration::from_millis(200)),
    );
    let key = EntityKey::team("66");

    let (a, b) = tokio::join!(
        h.coordinator.resolve(&key, FIVE_MIN, TIMEOUT),
        h.coordinator.resolve(&key, FIVE_MIN, TIMEOUT)
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(h.mock.calls(), 1);
    assert_eq!((a.version(), b.version()), (1, 1));
    assert_eq!(a.record.entity, b.record.entity);

    h.clock.advance(Duration::from_secs(600));
    let c = h.coordinator.resolve(&key, HOUR, TIMEOUT).await.unwrap();
    assert_eq!(c.source, ResolveSource::Cache);
    assert_eq!(c.version(), 1);
    assert_eq!(c.age, Duration::from_secs(600));
    assert_eq!(h.mock.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_versions_increase_per_refresh() {
    let h = harness(MockSource::new().with_entity(team("57", &[(3, 0)])));
    let key = EntityKey::team("57");

    let mut versions = Vec::new();
    for _ in 0..3 {
        let resolved = h.coordinator.resolve(&key, Duration::ZERO, TIMEOUT).await.unwrap();
        versions.push(resolved.version());
        h.clock.advance(Duration::from_secs(1));
    }
    let forced = h.coordinator.refresh(&key, TIMEOUT).await.unwrap();
    versions.push(forced.version());

    assert_eq!(versions, [1, 2, 3, 4]);
    assert_eq!(h.store.version_of(&key), Some(4));
    assert_eq!(h.mock.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_versions_keep_growing_after_eviction() {
    let h = harness_with(
        MockSource::new()
            .with_entity(team("a", &[(1, 0)]))
            .with_entity(team("b", &[(0, 1)])),
        StoreConfig::default().with_capacity(1),
    );
    let a = EntityKey::team("a");
    let b = EntityKey::team("b");

    h.coordinator.refresh(&a, TIMEOUT).await.unwrap();
    let before = h.coordinator.refresh(&a, TIMEOUT).await.unwrap();
    assert_eq!(before.version(), 2);

    h.coordinator.refresh(&b, TIMEOUT).await.unwrap();
    assert!(h.store.get(&a).is_none());

    let after = h.coordinator.refresh(&a, TIMEOUT).await.unwrap();
    assert_eq!(after.source, ResolveSource::Network);
    assert_eq!(after.version(), 3);
    assert_eq!(h.mock.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_max_age_zero_and_max() {
    let h = harness(MockSource::new().with_entity(team("57", &[(3, 0)])));
    let key = EntityKey::team("57");

    h.coordinator.resolve(&key, FIVE_MIN, TIMEOUT).await.unwrap();
    h.clock.advance(Duration::from_secs(1));

    let zero = h.coordinator.resolve(&key, Duration::ZERO, TIMEOUT).await.unwrap();
    assert_eq!(zero.source, ResolveSource::Network);
    assert_eq!(h.mock.calls(), 2);

    h.clock.advance(Duration::from_secs(10 * 365 * 24 * 3600));
    let max = h.coordinator.resolve(&key, Duration::MAX, TIMEOUT).await.unwrap();
    assert_eq!(max.source, ResolveSource::Cache);
    assert_eq!(max.freshness, Freshness::Stale);
    assert_eq!(h.mock.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_does_not_cancel_fetch() {
    let h = harness(
        MockSource::new()
            .with_entity(team("61", &[(1, 1)]))
            .with_delay(Duration::from_secs(5)),
    );
    let key = EntityKey::team("61");

    let err = h
        .coordinator
        .resolve(&key, FIVE_MIN, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert_eq!(err, FetchError::Timeout);
    assert!(h.store.get(&key).is_none());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.store.version_of(&key), Some(1));

    let cached = h.coordinator.resolve(&key, FIVE_MIN, TIMEOUT).await.unwrap();
    assert_eq!(cached.source, ResolveSource::Cache);
    assert_eq!(h.mock.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_is_never_cached() {
    let key = EntityKey::team("73");
    let h = harness(
        MockSource::new()
            .with_response(key.clone(), Err(IngestionError::Malformed("bad json".into()))),
    );

    let err = h.coordinator.resolve(&key, FIVE_MIN, TIMEOUT).await.unwrap_err();
    assert_eq!(err, FetchError::Malformed("bad json".into()));
    assert!(h.store.get(&key).is_none());
    assert_eq!(h.coordinator.stats().failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_partial_standings_keep_previous_table() {
    let key = EntityKey::league("PL");
    let h = harness(MockSource::new().with_entity(league(&["57", "64"])));
    h.coordinator.resolve(&key, FIVE_MIN, TIMEOUT).await.unwrap();

    // A table that lost a row: rank 3 of 2.
    let mut body = serde_json::to_value(league(&["57", "64", "66"])).unwrap();
    body["standings"].as_array_mut().unwrap().remove(1);
    let partial: League = serde_json::from_value(body).unwrap();
    h.mock.push_response(key.clone(), Ok(partial.into()));

    let err = h.coordinator.refresh(&key, TIMEOUT).await.unwrap_err();
    assert!(matches!(err, FetchError::Malformed(_)));

    let stored = h.store.get(&key).unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(stored.entity.as_league().unwrap().team_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_not_found_without_record() {
    let h = harness(MockSource::new());
    let key = EntityKey::fixture("1");

    let err = h.coordinator.resolve(&key, FIVE_MIN, TIMEOUT).await.unwrap_err();
    assert!(matches!(err, FetchError::NotFound(_)));

    let err = h
        .coordinator
        .resolve_or_stale(&key, FIVE_MIN, TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::NotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn test_stale_fallback_on_failed_refresh() {
    let key = EntityKey::team("65");
    let h = harness(MockSource::new().with_entity(team("65", &[(4, 0)])));
    h.coordinator.resolve(&key, FIVE_MIN, TIMEOUT).await.unwrap();

    h.clock.advance(Duration::from_secs(600));
    h.mock.push_response(key.clone(), Err(IngestionError::Server { status: 503 }));
    h.mock.push_response(key.clone(), Err(IngestionError::Server { status: 503 }));

    let err = h.coordinator.resolve(&key, FIVE_MIN, TIMEOUT).await.unwrap_err();
    assert!(matches!(err, FetchError::Transient { attempts: 1, .. }));

    let stale = h
        .coordinator
        .resolve_or_stale(&key, FIVE_MIN, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(stale.source, ResolveSource::StaleFallback);
    assert_eq!(stale.freshness, Freshness::Stale);
    assert_eq!(stale.version(), 1);
    assert_eq!(h.coordinator.stats().stale_served, 1);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_league_resolves_teams() {
    let h = harness(
        MockSource::new()
            .with_entity(league(&["57", "64", "66"]))
            .with_entity(team("57", &[(2, 0)]))
            .with_entity(team("66", &[(1, 1)])),
    );

    let refresh = h
        .coordinator
        .refresh_league("PL", TIMEOUT)
        .await
        .unwrap();
    assert_eq!(refresh.league.version(), 1);
    assert_eq!(refresh.teams.len(), 3);
    assert_eq!(refresh.succeeded(), 2);
    let failures: Vec<_> = refresh.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, &EntityKey::team("64"));
    assert!(matches!(failures[0].1, FetchError::NotFound(_)));

    // The league is always refetched; fresh teams come from cache.
    let again = h.coordinator.refresh_league("PL", TIMEOUT).await.unwrap();
    assert_eq!(again.league.version(), 2);
    assert_eq!(h.mock.calls_for(&EntityKey::team("57")), 1);
    assert_eq!(h.mock.calls_for(&EntityKey::team("64")), 2);
}

#[tokio::test(start_paused = true)]
async fn test_similar_to_excludes_self() {
    let h = harness(
        MockSource::new()
            .with_entity(team("57", &[(3, 0), (2, 0)]))
            .with_entity(team("64", &[(2, 0), (3, 1)]))
            .with_entity(team("66", &[(0, 2), (0, 1)])),
    );
    for id in ["57", "64", "66"] {
        h.coordinator
            .resolve(&EntityKey::team(id), FIVE_MIN, TIMEOUT)
            .await
            .unwrap();
    }

    let hits = h.coordinator.similar_to(&EntityKey::team("57"), 5).unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|hit| hit.key != EntityKey::team("57")));
    assert_eq!(hits[0].key, EntityKey::team("64"));

    assert!(h.coordinator.similar_to(&EntityKey::team("1"), 5).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stats_hit_rate() {
    let h = harness(MockSource::new().with_entity(team("57", &[(3, 0)])));
    let key = EntityKey::team("57");
    assert_eq!(h.coordinator.stats().hit_rate, None);

    h.coordinator.resolve(&key, FIVE_MIN, TIMEOUT).await.unwrap();
    h.coordinator.resolve(&key, FIVE_MIN, TIMEOUT).await.unwrap();
    h.coordinator.resolve(&key, FIVE_MIN, TIMEOUT).await.unwrap();
    h.coordinator.resolve(&key, FIVE_MIN, TIMEOUT).await.unwrap();

    let stats = h.coordinator.stats();
    assert_eq!((stats.hits, stats.misses), (3, 1));
    assert_eq!(stats.misses, stats.provider_calls + stats.coalesced);
    assert_eq!(stats.hit_rate, Some(rust_decimal::Decimal::from(75)));
    assert_eq!(stats.records, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_miss_waits_on_a_fetch() {
    let h = harness(
        MockSource::new()
            .with_entity(team("61", &[(2, 2)]))
            .with_delay(Duration::from_millis(5)),
    );
    let key = EntityKey::team("61");

    // Staggered starts land before, during and after the fetch commits.
    let handles: Vec<_> = (0..32u64)
        .map(|i| {
            let coordinator = h.coordinator.clone();
            let key = key.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(i % 10)).await;
                coordinator.resolve(&key, FIVE_MIN, TIMEOUT).await
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().version(), 1);
    }

    let stats = h.coordinator.stats();
    assert_eq!(stats.hits + stats.misses, 32);
    assert_eq!(stats.misses, stats.provider_calls + stats.coalesced);
    assert_eq!(stats.provider_calls, 1);
}
