//! Integration test to fetch real data from football-data.org.
//!
//! Run with: FOOTBALL_API_KEY=... cargo test -p fb-ingestion --test fetch_data -- --ignored --nocapture

use fb_ingestion::{DataSource, FootballDataSource, ProviderClient, ProviderConfig};
use fb_types::EntityKey;
use std::time::Duration;

fn source() -> FootballDataSource {
    let config = ProviderConfig::from_env().expect("valid provider config");
    FootballDataSource::new(&config).expect("http client")
}

#[tokio::test]
#[ignore] // Requires network access and FOOTBALL_API_KEY
async fn test_fetch_premier_league_standings() {
    println!("Fetching PL standings...");
    match source().fetch_entity(&EntityKey::league("PL")).await {
        Ok(entity) => {
            let league = entity.as_league().expect("league body");
            println!("   Success! {} {} teams", league.name, league.team_count());
            for row in league.standings() {
                println!("     {:>2}. {} {}pts", row.rank, row.team.name, row.points);
            }
            assert!(entity.validate().is_ok());
        }
        Err(e) => panic!("Failed to fetch standings: {}", e),
    }
}

#[tokio::test]
#[ignore] // Requires network access and FOOTBALL_API_KEY
async fn test_fetch_team_with_stats() {
    println!("Fetching Manchester United...");
    match source().fetch_entity(&EntityKey::team("66")).await {
        Ok(entity) => {
            let team = entity.as_team().expect("team body");
            println!("   Success! {} {:?}", team.name, team.stats);
            println!("   PPG: {:?}", team.stats.points_per_game());
        }
        Err(e) => panic!("Failed to fetch team: {}", e),
    }
}

#[tokio::test]
#[ignore] // Requires network access and FOOTBALL_API_KEY
async fn test_client_fetch_unknown_match() {
    let config = ProviderConfig::from_env().expect("valid provider config");
    let client = ProviderClient::from_config(&config).expect("client");

    let result = client
        .fetch(&EntityKey::fixture("999999999"), Duration::from_secs(30))
        .await;
    println!("   Result: {:?}", result.as_ref().map(|e| e.key()));
    assert!(result.is_err());
}
