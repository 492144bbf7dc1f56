//! Store behaviour across restarts and under concurrent writers.

use chrono::{DateTime, Utc};
use fb_store::{
    EntityStore, Persistence, SimilarityMetric, SqliteStorage, StoreConfig, StoreError, TtlPolicy,
};
use fb_types::{
    CacheRecord, Entity, EntityKey, EntityKind, League, StandingEntry, Team, TeamRef, TeamStats,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

fn team(id: &str, results: &[(u32, u32)]) -> Entity {
    Entity::Team(Team {
        id: id.to_string(),
        name: format!("Team {}", id),
        short_name: None,
        tla: None,
        league_id: Some("PL".to_string()),
        stats: TeamStats::from_results(results),
        last_updated: at(0),
    })
}

fn league(teams: &[&str]) -> Entity {
    let standings = teams
        .iter()
        .enumerate()
        .map(|(i, id)| StandingEntry {
            team: TeamRef::new(*id, format!("Team {}", id)),
            rank: i as u32 + 1,
            points: 0,
            goal_difference: 0,
            played: 0,
            won: 0,
            draw: 0,
            lost: 0,
            goals_for: 0,
            goals_against: 0,
            form: None,
        })
        .collect();
    Entity::League(
        League::new("PL", "Premier League", "2024/2025", standings, teams.len(), at(0)).unwrap(),
    )
}

#[test]
fn test_reload_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("store.db");
    let config = StoreConfig::default()
        .with_path(&path)
        .with_ttl(TtlPolicy::default().with_ttl(EntityKind::Team, Duration::from_secs(60)));

    {
        let store = EntityStore::open(config.clone()).unwrap();
        store.put_entity(team("66", &[(2, 0)]), 1, at(0)).unwrap();
        store.put_entity(team("66", &[(2, 0), (1, 1)]), 2, at(30)).unwrap();
        store.put_entity(league(&["57", "64", "66"]), 1, at(10)).unwrap();
    }

    let store = EntityStore::open(config).unwrap();
    assert_eq!(store.len(), 2);

    let record = store.get(&EntityKey::team("66")).unwrap();
    assert_eq!(record.version, 2);
    assert_eq!(record.fetched_at, at(30));
    assert_eq!(record.ttl, Duration::from_secs(60));
    assert!(record.is_stale(at(91)));
    assert!(!record.is_stale(at(90)));

    // Index rebuilt from the persisted vectors.
    let query = record.embedding.clone().unwrap();
    assert_eq!(store.search(&query, 1)[0].key, EntityKey::team("66"));

    // Versions continue from where they were.
    let stale = store.put_entity(team("66", &[]), 2, at(100));
    assert!(matches!(stale, Err(StoreError::StaleWrite { current: 2, .. })));

    let league = store.get(&EntityKey::league("PL")).unwrap();
    assert_eq!(league.entity.as_league().unwrap().team_count(), 3);
}

#[test]
fn test_eviction_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::default()
        .with_path(dir.path().join("store.db"))
        .with_capacity(1);

    {
        let store = EntityStore::open(config.clone()).unwrap();
        store.put_entity(team("1", &[(1, 0)]), 1, at(0)).unwrap();
        store.put_entity(team("2", &[(1, 0)]), 1, at(1)).unwrap();
    }

    let store = EntityStore::open(config).unwrap();
    assert_eq!(store.keys_of_kind(EntityKind::Team), vec![EntityKey::team("2")]);
}

#[test]
fn test_version_marks_survive_eviction_and_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::default()
        .with_path(dir.path().join("store.db"))
        .with_capacity(1);
    let a = EntityKey::team("a");

    {
        let store = EntityStore::open(config.clone()).unwrap();
        store.put_entity(team("a", &[(1, 0)]), 1, at(0)).unwrap();
        store.put_entity(team("a", &[(2, 0)]), 2, at(1)).unwrap();
        store.put_entity(team("b", &[(1, 0)]), 1, at(2)).unwrap();
        assert!(store.get(&a).is_none());
    }

    let store = EntityStore::open(config).unwrap();
    assert!(store.get(&a).is_none());
    assert_eq!(store.next_version(&a), 3);
}

/// SQLite storage whose deletes always fail.
struct StuckRows(SqliteStorage);

impl Persistence for StuckRows {
    fn load_all(&self) -> Result<Vec<CacheRecord<Entity>>, StoreError> {
        self.0.load_all()
    }

    fn upsert(&self, record: &CacheRecord<Entity>) -> Result<(), StoreError> {
        self.0.upsert(record)
    }

    fn delete(&self, _key: &EntityKey) -> Result<(), StoreError> {
        Err(StoreError::Storage("disk is read-only".to_string()))
    }

    fn load_versions(&self) -> Result<HashMap<EntityKey, u64>, StoreError> {
        self.0.load_versions()
    }
}

#[test]
fn test_rewrite_replaces_row_left_by_failed_eviction() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    let config = StoreConfig::default().with_path(&path).with_capacity(1);
    let a = EntityKey::team("a");

    {
        let storage = SqliteStorage::open(&path).unwrap();
        let store =
            EntityStore::with_persistence(config.clone(), Box::new(StuckRows(storage))).unwrap();
        store.put_entity(team("a", &[(1, 0)]), 1, at(0)).unwrap();
        store.put_entity(team("a", &[(1, 0), (1, 0)]), 2, at(1)).unwrap();
        // Evicts a; its v2 row stays on disk.
        store.put_entity(team("b", &[(1, 0)]), 1, at(2)).unwrap();
        assert!(store.get(&a).is_none());

        let version = store.next_version(&a);
        assert_eq!(version, 3);
        store
            .put_entity(team("a", &[(1, 0), (1, 0), (1, 0)]), version, at(3))
            .unwrap();
    }

    let store = EntityStore::open(config.with_capacity(10)).unwrap();
    let record = store.get(&a).unwrap();
    assert_eq!(record.version, 3);
    assert_eq!(record.fetched_at, at(3));
    assert_eq!(record.entity.as_team().unwrap().stats.played, 3);
}

#[test]
fn test_concurrent_writers_keep_highest_version() {
    let store = Arc::new(EntityStore::new(StoreConfig::default()));
    let key = EntityKey::team("66");

    let handles: Vec<_> = (1..=32u64)
        .map(|version| {
            let store = store.clone();
            thread::spawn(move || {
                let wins = vec![(1, 0); version as usize];
                store.put_entity(team("66", &wins), version, at(version as i64)).is_ok()
            })
        })
        .collect();
    let accepted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    let record = store.get(&key).unwrap();
    assert_eq!(record.version, 32);
    // The body always matches its version: never a mix of two writes.
    assert_eq!(record.entity.as_team().unwrap().stats.played, 32);
    assert!(accepted >= 1);
}

#[test]
fn test_comparable_teams_by_metric() {
    let store = EntityStore::new(StoreConfig::default().with_metric(SimilarityMetric::Euclidean));
    store.put_entity(team("strong", &[(3, 0), (2, 0), (4, 1)]), 1, at(0)).unwrap();
    store.put_entity(team("also-strong", &[(2, 0), (3, 1), (2, 0)]), 1, at(0)).unwrap();
    store.put_entity(team("weak", &[(0, 2), (0, 3), (1, 1)]), 1, at(0)).unwrap();

    let query = store
        .get(&EntityKey::team("strong"))
        .unwrap()
        .embedding
        .clone()
        .unwrap();
    let hits = store.search_kind(&query, 3, EntityKind::Team);

    let keys: Vec<String> = hits.iter().map(|h| h.key.to_string()).collect();
    assert_eq!(keys, ["team:strong", "team:also-strong", "team:weak"]);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
}
